//! Gno to Go translation: parse, apply the import policy, render.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codegen::{self, Header};
use crate::error::{AggregateError, PrecompileError, Result};
use crate::module::ModuleKind;
use crate::parser;
use crate::policy::{self, Disposition, ImportEdge, IMPORT_PREFIX};

/// Generated Go source and the imports of the translated tree
#[derive(Debug, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translated: String,
    pub imports: Vec<ImportEdge>,
    /// Whitelist violations and rewrite failures found while translating.
    /// The text is still generated when this is set.
    #[serde(skip)]
    pub policy_errors: Option<AggregateError>,
}

impl TranslationResult {
    /// Fail if the policy reported any violation
    pub fn check(self) -> Result<Self> {
        let Self {
            translated,
            imports,
            policy_errors,
        } = self;
        match policy_errors {
            Some(errors) => Err(PrecompileError::Aggregate(errors)),
            None => Ok(Self {
                translated,
                imports,
                policy_errors: None,
            }),
        }
    }

    /// Rewritten imports that point into the Gno repository
    pub fn repository_imports(&self) -> impl Iterator<Item = &str> {
        self.imports
            .iter()
            .filter(|edge| edge.disposition != Disposition::Rejected)
            .map(|edge| edge.target.as_str())
            .filter(|target| target.starts_with(IMPORT_PREFIX))
    }
}

/// Translate one Gno module to Go.
///
/// Parse failures are returned as errors. Policy violations are carried in
/// [`TranslationResult::policy_errors`] alongside the generated text; use
/// [`TranslationResult::check`] for strict rejection.
pub fn translate(source: &str, header: Header<'_>, filename: &str) -> Result<TranslationResult> {
    debug!("Translating {}", filename);

    let tree = parser::parse_file(filename, source)?;
    let kind = ModuleKind::from_filename(filename);
    let outcome = policy::apply_policy(&tree, kind);
    let translated = codegen::render(&outcome.tree, header)?;

    Ok(TranslationResult {
        translated,
        imports: outcome.edges,
        policy_errors: outcome.errors.into_option(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::STD_PKG_AFTER;

    const REALM: &str = r#"package hello

import (
	"strings"

	"gno.land/p/demo/avl"
	"gno.land/r/demo/users"
	"std"
)

func Render(path string) string {
	_ = avl.NewTree()
	_ = users.GetUser(std.GetOrigCaller())
	return strings.ToUpper(path)
}
"#;

    #[test]
    fn test_translate_realm() {
        let res = translate(REALM, Header::Tagged("gno"), "hello.gno").unwrap();

        assert!(res.policy_errors.is_none());
        assert!(res.translated.contains("//go:build gno"));
        assert!(res
            .translated
            .contains("\"github.com/gnolang/gno/examples/gno.land/p/demo/avl\""));
        assert!(res
            .translated
            .contains("\"github.com/gnolang/gno/examples/gno.land/r/demo/users\""));
        assert!(res.translated.contains(&format!("\"{}\"", STD_PKG_AFTER)));
        assert!(!res.translated.contains("\"std\""));
    }

    #[test]
    fn test_repository_imports() {
        let res = translate(REALM, Header::Tagged("gno"), "hello.gno").unwrap();
        let imports: Vec<_> = res.repository_imports().collect();
        assert_eq!(
            imports,
            vec![
                "github.com/gnolang/gno/examples/gno.land/p/demo/avl",
                "github.com/gnolang/gno/examples/gno.land/r/demo/users",
                STD_PKG_AFTER,
            ]
        );
    }

    #[test]
    fn test_std_alias_rewritten_regardless_of_position() {
        for src in [
            "package a\n\nimport (\n\t\"std\"\n\t\"fmt\"\n\t\"strings\"\n)\n",
            "package a\n\nimport (\n\t\"fmt\"\n\t\"std\"\n\t\"strings\"\n)\n",
            "package a\n\nimport (\n\t\"fmt\"\n\t\"strings\"\n\t\"std\"\n)\n",
        ] {
            let res = translate(src, Header::Suppressed, "a.gno").unwrap();
            let targets: Vec<_> = res.imports.iter().map(|e| e.target.as_str()).collect();
            assert!(targets.contains(&STD_PKG_AFTER));
            assert!(!targets.contains(&"std"));
            assert_eq!(res.translated.matches(STD_PKG_AFTER).count(), 1);
        }
    }

    #[test]
    fn test_rewritten_std_keeps_group_sorted() {
        let src = "package a\n\nimport (\n\t\"math\"\n\t\"std\"\n)\n\nvar _ = math.Pi\nvar _ std.Address\n";
        let res = translate(src, Header::Suppressed, "a.gno").unwrap();

        let shim = res.translated.find(STD_PKG_AFTER).unwrap();
        let math = res.translated.find("\"math\"").unwrap();
        assert!(shim < math, "{}", res.translated);
    }

    #[test]
    fn test_disallowed_import_carried_not_raised() {
        let src = "package a\n\nimport (\n\t\"os\"\n\t\"github.com/evil/lib\"\n)\n";
        let res = translate(src, Header::Tagged("gno"), "a.gno").unwrap();

        let errors = res.policy_errors.as_ref().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(res.translated.contains("\"github.com/evil/lib\""));

        let err = res.check().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"github.com/evil/lib\""));
        assert!(msg.contains("not in the whitelist"));
    }

    #[test]
    fn test_test_modules_skip_whitelist() {
        let src = "package a\n\nimport \"os\"\n";
        for name in ["a_test.gno", "a_filetest.gno"] {
            let res = translate(src, Header::Tagged("gno && test"), name).unwrap();
            assert!(res.policy_errors.is_none(), "{name}");
        }
    }

    #[test]
    fn test_parse_error_is_raised() {
        let err = translate("package a\nfunc (", Header::Suppressed, "bad.gno").unwrap_err();
        assert!(matches!(err, PrecompileError::Parse { ref filename, .. } if filename == "bad.gno"));
    }
}

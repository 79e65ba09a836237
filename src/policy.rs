//! Import policy: whitelist enforcement and import rewriting.
//!
//! Both passes run over the import specs of an immutable [`SourceTree`].
//! Rewrites are recorded as byte-span edits in a [`RewrittenTree`] overlay;
//! the parsed tree itself is never changed.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use crate::error::{AggregateError, PrecompileError};
use crate::module::ModuleKind;
use crate::parser::SourceTree;

pub const REALM_PREFIX_BEFORE: &str = "gno.land/r/";
pub const REALM_PREFIX_AFTER: &str = "github.com/gnolang/gno/examples/gno.land/r/";
pub const PACKAGE_PREFIX_BEFORE: &str = "gno.land/p/demo/";
pub const PACKAGE_PREFIX_AFTER: &str = "github.com/gnolang/gno/examples/gno.land/p/demo/";
pub const STD_PKG_BEFORE: &str = "std";
pub const STD_PKG_AFTER: &str = "github.com/gnolang/gno/gnovm/stdlibs/stdshim";

/// Module path of the Gno repository; rewritten imports live under it
pub const IMPORT_PREFIX: &str = "github.com/gnolang/gno";

/// Go and Gno standard packages importable from production modules
pub const STDLIB_WHITELIST: &[&str] = &[
    // go
    "bufio",
    "bytes",
    "compress/gzip",
    "context",
    "crypto/md5",
    "crypto/sha1",
    "crypto/sha256",
    "encoding/base64",
    "encoding/binary",
    "encoding/hex",
    "encoding/json",
    "encoding/xml",
    "errors",
    "flag",
    "fmt",
    "io",
    "io/util",
    "math",
    "math/big",
    "math/rand",
    "regexp",
    "sort",
    "strconv",
    "strings",
    "text/template",
    "time",
    "unicode/utf8",
    // gno
    "std",
];

/// Internal test-harness prefixes
pub const IMPORT_PREFIX_WHITELIST: &[&str] = &["github.com/gnolang/gno/_test"];

/// What the policy did with one import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    Unchanged,
    Rewritten,
    Rejected,
}

/// An import as written, its target after policy, and the decision taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEdge {
    pub source: String,
    pub target: String,
    pub disposition: Disposition,
}

/// Rule deciding how an import path is rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RewriteRule {
    Exact {
        before: &'static str,
        after: &'static str,
    },
    Prefix {
        before: &'static str,
        after: &'static str,
    },
}

impl RewriteRule {
    fn apply(&self, path: &str) -> Option<String> {
        match *self {
            RewriteRule::Exact { before, after } => (path == before).then(|| after.to_string()),
            RewriteRule::Prefix { before, after } => path
                .strip_prefix(before)
                .map(|rest| format!("{}{}", after, rest)),
        }
    }
}

/// Disjoint rewrite rules: at most one matches any path
const REWRITE_RULES: &[RewriteRule] = &[
    RewriteRule::Exact {
        before: STD_PKG_BEFORE,
        after: STD_PKG_AFTER,
    },
    RewriteRule::Prefix {
        before: PACKAGE_PREFIX_BEFORE,
        after: PACKAGE_PREFIX_AFTER,
    },
    RewriteRule::Prefix {
        before: REALM_PREFIX_BEFORE,
        after: REALM_PREFIX_AFTER,
    },
];

/// Whether `path` may be imported from an implementation module
pub fn is_whitelisted(path: &str) -> bool {
    path.starts_with(REALM_PREFIX_BEFORE)
        || path.starts_with(PACKAGE_PREFIX_BEFORE)
        || STDLIB_WHITELIST.contains(&path)
        || IMPORT_PREFIX_WHITELIST
            .iter()
            .any(|prefix| path.starts_with(prefix))
}

/// Target of `path` after the rewrite rules, if any rule applies
pub fn rewrite_target(path: &str) -> Option<String> {
    REWRITE_RULES.iter().find_map(|rule| rule.apply(path))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Edit {
    pub span: Range<usize>,
    pub replacement: String,
}

/// A parsed tree plus the import rewrites decided for it
#[derive(Debug)]
pub struct RewrittenTree<'a> {
    tree: &'a SourceTree,
    edits: Vec<Edit>,
}

impl<'a> RewrittenTree<'a> {
    pub fn new(tree: &'a SourceTree) -> Self {
        Self {
            tree,
            edits: Vec::new(),
        }
    }

    pub fn tree(&self) -> &'a SourceTree {
        self.tree
    }

    pub(crate) fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Point every import of `from` at `to`. Returns false when the tree
    /// has no import of `from`.
    pub fn rewrite_import(&mut self, from: &str, to: &str) -> bool {
        let tree = self.tree;
        let mut found = false;
        for spec in tree.imports_matching(from) {
            found = true;
            self.edits.push(Edit {
                span: spec.span.clone(),
                replacement: format!("{:?}", to),
            });
        }
        found
    }

    /// Import path of every spec after the recorded rewrites
    pub fn rewritten_imports(&self) -> Vec<String> {
        self.tree
            .imports()
            .iter()
            .map(|spec| {
                self.edits
                    .iter()
                    .find(|edit| edit.span == spec.span)
                    .map(|edit| edit.replacement.trim_matches('"').to_string())
                    .unwrap_or_else(|| spec.path.clone())
            })
            .collect()
    }
}

/// Outcome of applying the policy to one module
#[derive(Debug)]
pub struct PolicyOutcome<'a> {
    pub tree: RewrittenTree<'a>,
    pub edges: Vec<ImportEdge>,
    pub errors: AggregateError,
}

/// Run the whitelist check (implementation modules only) and then the
/// rewrite pass. Every violation and rewrite failure is collected.
pub fn apply_policy(tree: &SourceTree, kind: ModuleKind) -> PolicyOutcome<'_> {
    let mut errors = AggregateError::new();
    let distinct: IndexSet<&str> = tree.imports().iter().map(|s| s.path.as_str()).collect();

    let check_whitelist = kind.checks_whitelist();
    let mut rejected: IndexSet<&str> = IndexSet::new();
    if check_whitelist {
        for path in &distinct {
            if !is_whitelisted(path) {
                rejected.insert(*path);
                errors.push(PrecompileError::ImportNotWhitelisted {
                    path: path.to_string(),
                });
            }
        }
    }

    let mut rewritten = RewrittenTree::new(tree);
    let mut edges = Vec::with_capacity(distinct.len());
    for path in &distinct {
        if rejected.contains(path) {
            edges.push(ImportEdge {
                source: path.to_string(),
                target: path.to_string(),
                disposition: Disposition::Rejected,
            });
            continue;
        }

        match rewrite_target(path) {
            Some(target) => {
                debug!("Rewriting import {:?} -> {:?}", path, target);
                if !rewritten.rewrite_import(path, &target) {
                    errors.push(PrecompileError::ImportRewrite {
                        from: path.to_string(),
                        to: target.clone(),
                    });
                }
                edges.push(ImportEdge {
                    source: path.to_string(),
                    target,
                    disposition: Disposition::Rewritten,
                });
            }
            None => edges.push(ImportEdge {
                source: path.to_string(),
                target: path.to_string(),
                disposition: Disposition::Unchanged,
            }),
        }
    }

    PolicyOutcome {
        tree: rewritten,
        edges,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;

    fn parse(src: &str) -> SourceTree {
        parse_file("x.gno", src).unwrap()
    }

    #[test]
    fn test_whitelist_rules() {
        assert!(is_whitelisted("fmt"));
        assert!(is_whitelisted("std"));
        assert!(is_whitelisted("gno.land/r/demo/boards"));
        assert!(is_whitelisted("gno.land/p/demo/avl"));
        assert!(is_whitelisted("github.com/gnolang/gno/_test/foo"));
        assert!(!is_whitelisted("os"));
        assert!(!is_whitelisted("net/http"));
        assert!(!is_whitelisted("fmtx"));
        assert!(!is_whitelisted("gno.land/p/other/avl"));
    }

    #[test]
    fn test_rewrite_targets() {
        assert_eq!(rewrite_target("std").as_deref(), Some(STD_PKG_AFTER));
        assert_eq!(
            rewrite_target("gno.land/p/demo/avl").as_deref(),
            Some("github.com/gnolang/gno/examples/gno.land/p/demo/avl")
        );
        assert_eq!(
            rewrite_target("gno.land/r/demo/users").as_deref(),
            Some("github.com/gnolang/gno/examples/gno.land/r/demo/users")
        );
        assert_eq!(rewrite_target("stdx"), None);
        assert_eq!(rewrite_target("fmt"), None);
    }

    #[test]
    fn test_rules_are_disjoint() {
        for path in ["std", "gno.land/p/demo/a", "gno.land/r/a", "fmt"] {
            let matching = REWRITE_RULES.iter().filter(|r| r.apply(path).is_some()).count();
            assert!(matching <= 1, "{path} matched {matching} rules");
        }
    }

    #[test]
    fn test_violations_accumulate() {
        let tree = parse(
            "package a\n\nimport (\n\t\"os\"\n\t\"net/http\"\n\t\"fmt\"\n\t\"os/exec\"\n)\n",
        );
        let outcome = apply_policy(&tree, ModuleKind::Implementation);

        assert_eq!(outcome.errors.len(), 3);
        let rejected: Vec<_> = outcome
            .edges
            .iter()
            .filter(|e| e.disposition == Disposition::Rejected)
            .map(|e| e.source.as_str())
            .collect();
        assert_eq!(rejected, vec!["os", "net/http", "os/exec"]);
    }

    #[test]
    fn test_duplicate_import_reported_once() {
        let tree = parse("package a\n\nimport (\n\t\"os\"\n\tx \"os\"\n)\n");
        let outcome = apply_policy(&tree, ModuleKind::Implementation);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_tests_skip_whitelist() {
        let tree = parse("package a\n\nimport \"os\"\n");
        for kind in [ModuleKind::Test, ModuleKind::FileTest] {
            let outcome = apply_policy(&tree, kind);
            assert!(outcome.errors.is_empty());
            assert_eq!(outcome.edges[0].disposition, Disposition::Unchanged);
        }
    }

    #[test]
    fn test_rewrite_applies_to_all_matching_specs() {
        let tree = parse("package a\n\nimport (\n\t\"std\"\n\tstd2 \"std\"\n\t\"gno.land/r/demo/x\"\n)\n");
        let outcome = apply_policy(&tree, ModuleKind::Implementation);

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.tree.edits().len(), 3);
        assert_eq!(
            outcome.tree.rewritten_imports(),
            vec![
                STD_PKG_AFTER.to_string(),
                STD_PKG_AFTER.to_string(),
                "github.com/gnolang/gno/examples/gno.land/r/demo/x".to_string(),
            ]
        );
    }

    #[test]
    fn test_rewrite_missing_import_reports_false() {
        let tree = parse("package a\n\nimport \"fmt\"\n");
        let mut rewritten = RewrittenTree::new(&tree);
        assert!(!rewritten.rewrite_import("std", STD_PKG_AFTER));
        assert!(rewritten.edits().is_empty());
    }
}

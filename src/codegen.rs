//! Go code generation for translated Gno modules.

use std::path::Path;

use crate::error::{PrecompileError, Result};
use crate::module::ModuleKind;
use crate::policy::{Edit, RewrittenTree};

pub const GENERATED_HEADER: &str = "// Code generated by github.com/gnolang/gno. DO NOT EDIT.\n\n";

/// Suffix of generated implementation and filetest artifacts
pub const GENERATED_SUFFIX: &str = ".gno.gen.go";
/// Suffix of generated test artifacts
pub const GENERATED_TEST_SUFFIX: &str = ".gno.gen_test.go";

pub const TAGS_IMPLEMENTATION: &str = "gno";
pub const TAGS_TEST: &str = "gno && test";
pub const TAGS_FILETEST: &str = "gno && filetest";

/// Header prepended to generated Go source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header<'a> {
    /// No generated-code marker and no build constraint
    Suppressed,
    /// Generated-code marker, plus `//go:build <tags>` when tags is non-empty
    Tagged(&'a str),
}

impl Header<'_> {
    pub fn render(&self) -> String {
        match self {
            Header::Suppressed => String::new(),
            Header::Tagged(tags) if tags.is_empty() => GENERATED_HEADER.to_string(),
            Header::Tagged(tags) => format!("{}//go:build {}\n\n", GENERATED_HEADER, tags),
        }
    }
}

/// Build tags for a module kind
pub fn tags_for(kind: ModuleKind) -> &'static str {
    match kind {
        ModuleKind::Implementation => TAGS_IMPLEMENTATION,
        ModuleKind::Test => TAGS_TEST,
        ModuleKind::FileTest => TAGS_FILETEST,
    }
}

/// Generated filename and build tags for a Gno source path.
///
/// Depends only on the file name, never on contents.
pub fn precompile_filename_and_tags(gno_path: impl AsRef<Path>) -> (String, &'static str) {
    let gno_path = gno_path.as_ref();
    let file_name = gno_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let kind = ModuleKind::from_filename(&file_name);
    let base = file_name.strip_suffix(".gno").unwrap_or(&file_name);

    let target = match kind {
        ModuleKind::FileTest => format!(".{}{}", base, GENERATED_SUFFIX),
        ModuleKind::Test => format!(".{}{}", base, GENERATED_TEST_SUFFIX),
        ModuleKind::Implementation => format!("{}{}", base, GENERATED_SUFFIX),
    };
    (target, tags_for(kind))
}

/// Whether a filename is an artifact produced by this crate
pub fn is_generated_file(name: &str) -> bool {
    name.ends_with(GENERATED_SUFFIX) || name.ends_with(GENERATED_TEST_SUFFIX)
}

/// Render a rewritten tree to Go source, prefixed by `header`
pub fn render(tree: &RewrittenTree<'_>, header: Header<'_>) -> Result<String> {
    let source = tree.tree().source();
    let filename = tree.tree().filename();
    let codegen_error = |message: String| PrecompileError::CodeGen {
        filename: filename.to_string(),
        message,
    };

    let mut edits = import_edits(tree);
    edits.sort_by_key(|e| e.span.start);

    let mut out = header.render();
    out.reserve(source.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.span.start < cursor {
            return Err(codegen_error(format!(
                "overlapping rewrite at byte {}",
                edit.span.start
            )));
        }
        let before = source.get(cursor..edit.span.start).ok_or_else(|| {
            codegen_error(format!("rewrite span {:?} out of range", edit.span))
        })?;
        if source.get(edit.span.clone()).is_none() {
            return Err(codegen_error(format!(
                "rewrite span {:?} out of range",
                edit.span
            )));
        }
        out.push_str(before);
        out.push_str(&edit.replacement);
        cursor = edit.span.end;
    }
    out.push_str(&source[cursor..]);

    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

/// Whole-spec edits for every import: the rewritten path in place, and
/// each group of adjacent specs ordered by path then name as gofmt orders
/// them. Literal edits outside any spec are kept as they are.
fn import_edits(tree: &RewrittenTree<'_>) -> Vec<Edit> {
    let source = tree.tree().source();
    let specs = tree.tree().imports();
    let literal_edits = tree.edits();

    let mut covered = vec![false; literal_edits.len()];
    let mut rendered: Vec<(String, String)> = Vec::with_capacity(specs.len());
    for spec in specs {
        let whole = source.get(spec.spec_span.clone()).unwrap_or_default();
        match literal_edits.iter().position(|e| e.span == spec.span) {
            Some(idx) => {
                covered[idx] = true;
                let edit = &literal_edits[idx];
                let prefix = source.get(spec.spec_span.start..spec.span.start).unwrap_or_default();
                let suffix = source.get(spec.span.end..spec.spec_span.end).unwrap_or_default();
                rendered.push((
                    edit.replacement.trim_matches('"').to_string(),
                    format!("{}{}{}", prefix, edit.replacement, suffix),
                ));
            }
            None => rendered.push((spec.path.clone(), whole.to_string())),
        }
    }

    let mut edits = Vec::with_capacity(specs.len());
    let mut start = 0;
    while start < specs.len() {
        let group = specs[start].group;
        let end = specs[start..]
            .iter()
            .position(|s| s.group != group)
            .map_or(specs.len(), |n| start + n);

        let mut order: Vec<usize> = (start..end).collect();
        order.sort_by(|&a, &b| {
            (rendered[a].0.as_str(), specs[a].name.as_deref())
                .cmp(&(rendered[b].0.as_str(), specs[b].name.as_deref()))
        });
        for (slot, from) in (start..end).zip(order) {
            edits.push(Edit {
                span: specs[slot].spec_span.clone(),
                replacement: rendered[from].1.clone(),
            });
        }
        start = end;
    }

    edits.extend(
        literal_edits
            .iter()
            .zip(covered)
            .filter(|(_, covered)| !covered)
            .map(|(edit, _)| edit.clone()),
    );
    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleKind;
    use crate::parser::parse_file;
    use crate::policy::apply_policy;

    #[test]
    fn test_filename_and_tags_table() {
        assert_eq!(
            precompile_filename_and_tags("foo.gno"),
            ("foo.gno.gen.go".to_string(), "gno")
        );
        assert_eq!(
            precompile_filename_and_tags("pkg/foo_test.gno"),
            (".foo_test.gno.gen_test.go".to_string(), "gno && test")
        );
        assert_eq!(
            precompile_filename_and_tags("/abs/z1_filetest.gno"),
            (".z1_filetest.gno.gen.go".to_string(), "gno && filetest")
        );
    }

    #[test]
    fn test_generated_file_detection() {
        assert!(is_generated_file("foo.gno.gen.go"));
        assert!(is_generated_file(".foo_test.gno.gen_test.go"));
        assert!(!is_generated_file("foo.go"));
        assert!(!is_generated_file("foo.gno"));
    }

    #[test]
    fn test_header_variants() {
        assert_eq!(Header::Suppressed.render(), "");
        assert_eq!(Header::Tagged("").render(), GENERATED_HEADER);
        assert_eq!(
            Header::Tagged("gno").render(),
            format!("{}//go:build gno\n\n", GENERATED_HEADER)
        );
    }

    #[test]
    fn test_render_rewrites_imports_in_place() {
        let src = "package a\n\nimport (\n\t\"fmt\"\n\t\"std\"\n)\n\nfunc F() { fmt.Println(std.GetHeight()) }\n";
        let tree = parse_file("a.gno", src).unwrap();
        let outcome = apply_policy(&tree, ModuleKind::Implementation);

        let out = render(&outcome.tree, Header::Tagged("gno")).unwrap();

        assert!(out.starts_with(GENERATED_HEADER));
        assert!(out.contains("//go:build gno\n\npackage a\n"));
        assert!(out.contains("\t\"github.com/gnolang/gno/gnovm/stdlibs/stdshim\"\n"));
        assert!(out.contains("\t\"fmt\"\n"));
        assert!(out.ends_with("func F() { fmt.Println(std.GetHeight()) }\n"));
    }

    #[test]
    fn test_render_resorts_rewritten_group() {
        let src = "package a\n\nimport (\n\t\"math\"\n\t\"std\"\n\n\tufmt \"gno.land/p/demo/ufmt\"\n\t\"bytes\"\n)\n";
        let tree = parse_file("a.gno", src).unwrap();
        let outcome = apply_policy(&tree, ModuleKind::Implementation);

        let out = render(&outcome.tree, Header::Suppressed).unwrap();
        assert_eq!(
            out,
            "package a\n\nimport (\n\t\"github.com/gnolang/gno/gnovm/stdlibs/stdshim\"\n\t\"math\"\n\n\t\"bytes\"\n\tufmt \"github.com/gnolang/gno/examples/gno.land/p/demo/ufmt\"\n)\n"
        );
    }

    #[test]
    fn test_render_leaves_sorted_group_alone() {
        let src = "package a\n\nimport (\n\t\"fmt\"\n\t\"strings\"\n)\n";
        let tree = parse_file("a.gno", src).unwrap();
        let outcome = apply_policy(&tree, ModuleKind::Implementation);

        assert_eq!(render(&outcome.tree, Header::Suppressed).unwrap(), src);
    }

    #[test]
    fn test_render_suppressed_header_is_plain_source() {
        let src = "package main\n\nfunc main() {}\n";
        let tree = parse_file("main.gno", src).unwrap();
        let outcome = apply_policy(&tree, ModuleKind::Implementation);

        assert_eq!(render(&outcome.tree, Header::Suppressed).unwrap(), src);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_filename_derivation_is_pure(base in "[a-z][a-z0-9_]{0,15}") {
            let name = format!("{}.gno", base);
            prop_assert_eq!(
                precompile_filename_and_tags(&name),
                precompile_filename_and_tags(&name)
            );
        }

        #[test]
        fn prop_kinds_never_collide(base in "[a-z][a-z0-9]{0,15}") {
            let (implementation, t1) = precompile_filename_and_tags(format!("{}.gno", base));
            let (test, t2) = precompile_filename_and_tags(format!("{}_test.gno", base));
            let (filetest, t3) = precompile_filename_and_tags(format!("{}_filetest.gno", base));

            prop_assert_ne!(&implementation, &test);
            prop_assert_ne!(&implementation, &filetest);
            prop_assert_ne!(&test, &filetest);
            prop_assert!(t1 != t2 && t2 != t3 && t1 != t3);
            prop_assert!(is_generated_file(&implementation));
            prop_assert!(is_generated_file(&test));
            prop_assert!(is_generated_file(&filetest));
        }
    }
}

//! Gno module parser.
//!
//! Gno is syntactically Go, so modules are parsed with the tree-sitter Go
//! grammar. A parse either yields a complete tree or fails; there is no
//! recovery.

use std::ops::Range;
use tree_sitter::{Node, Parser, Tree};

use crate::error::{PrecompileError, Result};

/// One import spec as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Local name (`foo "path"`, `. "path"`, `_ "path"`)
    pub name: Option<String>,
    /// Unquoted import path
    pub path: String,
    /// Byte span of the quoted path literal
    pub span: Range<usize>,
    /// Byte span of the whole spec, name included
    pub spec_span: Range<usize>,
    /// 1-based line of the spec
    pub line: usize,
    /// Run of adjacent specs sorted together: a new group starts at every
    /// import declaration and after every blank or comment line
    pub group: usize,
}

/// A parsed Gno module. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceTree {
    filename: String,
    source: String,
    tree: Tree,
    imports: Vec<ImportSpec>,
}

impl SourceTree {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn imports(&self) -> &[ImportSpec] {
        &self.imports
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Name from the package clause
    pub fn package_name(&self) -> Option<&str> {
        let root = self.root();
        let mut cursor = root.walk();
        let clause = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "package_clause")?;
        let mut inner = clause.walk();
        let ident = clause
            .named_children(&mut inner)
            .find(|n| n.kind() == "package_identifier")?;
        self.source.get(ident.byte_range())
    }

    /// Import specs whose path equals `path`
    pub fn imports_matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ImportSpec> {
        self.imports.iter().filter(move |spec| spec.path == path)
    }
}

/// Parse `source` as a Go file named `filename`
pub fn parse_file(filename: &str, source: &str) -> Result<SourceTree> {
    let parse_error = |message: String| PrecompileError::Parse {
        filename: filename.to_string(),
        message,
    };

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| parse_error(format!("{}: load go grammar: {}", filename, e)))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| parse_error(format!("{}: parser returned no tree", filename)))?;

    let root = tree.root_node();
    if root.has_error() {
        if let Some(node) = first_error(root) {
            return Err(parse_error(describe_error(filename, source, node)));
        }
        return Err(parse_error(format!("{}: syntax error", filename)));
    }

    check_package_clause(filename, root).map_err(parse_error)?;

    let imports = collect_imports(source, root);
    Ok(SourceTree {
        filename: filename.to_string(),
        source: source.to_string(),
        tree,
        imports,
    })
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

fn describe_error(filename: &str, source: &str, node: Node<'_>) -> String {
    let pos = node.start_position();
    if node.is_missing() {
        return format!(
            "{}:{}:{}: missing {}",
            filename,
            pos.row + 1,
            pos.column + 1,
            node.kind()
        );
    }
    let near: String = source
        .get(node.byte_range())
        .and_then(|text| text.lines().next())
        .unwrap_or("")
        .chars()
        .take(32)
        .collect();
    if near.trim().is_empty() {
        format!("{}:{}:{}: syntax error", filename, pos.row + 1, pos.column + 1)
    } else {
        format!(
            "{}:{}:{}: syntax error near {:?}",
            filename,
            pos.row + 1,
            pos.column + 1,
            near.trim()
        )
    }
}

fn check_package_clause(filename: &str, root: Node<'_>) -> std::result::Result<(), String> {
    let mut cursor = root.walk();
    let first = root.named_children(&mut cursor).find(|n| n.kind() != "comment");
    match first {
        Some(node) if node.kind() == "package_clause" => Ok(()),
        Some(node) => {
            let pos = node.start_position();
            Err(format!(
                "{}:{}:{}: expected 'package', found {}",
                filename,
                pos.row + 1,
                pos.column + 1,
                node.kind()
            ))
        }
        None => Err(format!("{}:1:1: expected 'package', found EOF", filename)),
    }
}

fn collect_imports(source: &str, root: Node<'_>) -> Vec<ImportSpec> {
    let mut specs: Vec<ImportSpec> = Vec::new();
    let mut group = 0;
    let mut cursor = root.walk();
    for decl in root.named_children(&mut cursor) {
        if decl.kind() != "import_declaration" {
            continue;
        }
        if !specs.is_empty() {
            group += 1;
        }
        let mut decl_cursor = decl.walk();
        for child in decl.named_children(&mut decl_cursor) {
            match child.kind() {
                "import_spec" => specs.extend(import_spec(source, child, group)),
                "import_spec_list" => {
                    let mut list_cursor = child.walk();
                    let mut prev_line = None;
                    for spec in child.named_children(&mut list_cursor) {
                        if spec.kind() != "import_spec" {
                            continue;
                        }
                        let line = spec.start_position().row + 1;
                        if prev_line.is_some_and(|prev| line > prev + 1) {
                            group += 1;
                        }
                        prev_line = Some(spec.end_position().row + 1);
                        specs.extend(import_spec(source, spec, group));
                    }
                }
                _ => {}
            }
        }
    }
    specs
}

fn import_spec(source: &str, node: Node<'_>, group: usize) -> Option<ImportSpec> {
    let path_node = node.child_by_field_name("path")?;
    let literal = source.get(path_node.byte_range())?;
    let name = node
        .child_by_field_name("name")
        .and_then(|n| source.get(n.byte_range()))
        .map(|s| s.to_string());

    Some(ImportSpec {
        name,
        path: unquote(literal).to_string(),
        span: path_node.byte_range(),
        spec_span: node.byte_range(),
        line: node.start_position().row + 1,
        group,
    })
}

fn unquote(literal: &str) -> &str {
    literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| literal.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .unwrap_or(literal)
}

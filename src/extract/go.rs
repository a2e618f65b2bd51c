//! Go declaration and dependency extraction using tree-sitter-go

use std::collections::{BTreeSet, HashMap};

use tree_sitter::{Node, Parser, Tree};

use super::context::{ImportSpec, ImportTarget, ResolutionContext};
use crate::symbol::{DepKind, Symbol, SymbolDependency, SymbolKind};
use crate::{Error, Result};

/// Builtin functions and predeclared types. Calls to these are language
/// operations or conversions, never edges into the module.
const PREDECLARED: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover", "any", "bool", "byte",
    "comparable", "complex64", "complex128", "error", "float32", "float64", "int", "int8",
    "int16", "int32", "int64", "rune", "string", "uint", "uint8", "uint16", "uint32", "uint64",
    "uintptr",
];

/// Node kinds a well-formed Go file may hold at its top level.
const TOP_LEVEL_KINDS: &[&str] = &[
    "package_clause",
    "import_declaration",
    "function_declaration",
    "method_declaration",
    "type_declaration",
    "const_declaration",
    "var_declaration",
    "comment",
];

/// Reusable Go parser. Not `Sync`: each worker thread owns one.
pub struct GoParser {
    parser: Parser,
}

impl GoParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| Error::Worker(format!("failed to load Go grammar: {}", e)))?;
        Ok(Self { parser })
    }

    /// Parse `source`, rejecting any file whose tree contains a syntax error.
    pub fn parse<'a>(&mut self, path: &str, source: &'a str) -> Result<GoFile<'a>> {
        let tree = self.parser.parse(source, None).ok_or_else(|| Error::Parse {
            path: path.to_string(),
            line: 0,
            message: "parser returned no tree".to_string(),
        })?;

        if let Some(node) = first_error(tree.root_node()) {
            let message = if node.is_missing() {
                format!("missing {}", node.kind())
            } else {
                let snippet: String = text(node, source).chars().take(40).collect();
                format!("unexpected {:?}", snippet)
            };
            return Err(Error::Parse {
                path: path.to_string(),
                line: line_of(node.start_position().row),
                message,
            });
        }

        check_layout(tree.root_node(), path)?;

        Ok(GoFile { tree, source })
    }
}

/// A syntactically valid Go file.
pub struct GoFile<'a> {
    tree: Tree,
    source: &'a str,
}

impl<'a> GoFile<'a> {
    /// Name from the `package` clause
    pub fn package_name(&self) -> String {
        let root = self.tree.root_node();
        let mut cursor = root.walk();
        let clause = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "package_clause");
        clause
            .and_then(|c| c.named_child(0))
            .map(|n| text(n, self.source).to_string())
            .unwrap_or_default()
    }

    /// Import specs in source order.
    pub fn imports(&self) -> Vec<ImportSpec> {
        let root = self.tree.root_node();
        let mut imports = Vec::new();
        let mut cursor = root.walk();
        for decl in root.named_children(&mut cursor) {
            if decl.kind() != "import_declaration" {
                continue;
            }
            for spec in nested_specs(decl, "import_spec", "import_spec_list") {
                if let Some(import) = self.import_spec(spec) {
                    imports.push(import);
                }
            }
        }
        imports
    }

    fn import_spec(&self, spec: Node) -> Option<ImportSpec> {
        let path = text(spec.child_by_field_name("path")?, self.source);
        let alias = spec
            .child_by_field_name("name")
            .map(|n| text(n, self.source).to_string())
            .unwrap_or_default();
        Some(ImportSpec {
            path: path.trim_matches(|c| c == '"' || c == '`').to_string(),
            alias,
            line: line_of(spec.start_position().row),
        })
    }

    /// Extract every top-level declaration with its intra-module dependencies.
    ///
    /// Repeated `(kind, name, receiver)` identities (several `func init()`)
    /// are folded into the first declaration with their dependencies merged.
    pub fn extract(&self, ctx: &ResolutionContext) -> Vec<Symbol> {
        let root = self.tree.root_node();
        let mut symbols: Vec<Symbol> = Vec::new();
        let mut seen: HashMap<(SymbolKind, String, String), usize> = HashMap::new();

        let mut cursor = root.walk();
        for decl in root.named_children(&mut cursor) {
            let extracted = match decl.kind() {
                "function_declaration" | "method_declaration" => {
                    self.extract_function(decl, ctx).into_iter().collect::<Vec<_>>()
                }
                "type_declaration" => self.extract_types(decl),
                "const_declaration" => self.extract_values(decl, SymbolKind::Const, "const_spec", "const_spec_list"),
                "var_declaration" => self.extract_values(decl, SymbolKind::Var, "var_spec", "var_spec_list"),
                _ => Vec::new(),
            };

            for symbol in extracted {
                let (kind, name, receiver) = symbol.identity();
                let key = (kind, name.to_string(), receiver.to_string());
                match seen.get(&key) {
                    Some(&index) => {
                        tracing::debug!("Merging repeated declaration {} at line {}", symbol.display_name(), symbol.line_start);
                        let first = &mut symbols[index];
                        let merged: BTreeSet<SymbolDependency> =
                            first.deps.drain(..).chain(symbol.deps).collect();
                        first.deps = merged.into_iter().collect();
                    }
                    None => {
                        seen.insert(key, symbols.len());
                        symbols.push(symbol);
                    }
                }
            }
        }

        symbols
    }

    fn extract_function(&self, node: Node, ctx: &ResolutionContext) -> Option<Symbol> {
        let name = text(node.child_by_field_name("name")?, self.source);
        let body_node = node.child_by_field_name("body");

        let signature = match body_node {
            Some(body) => self.source[node.start_byte()..body.start_byte()].trim_end(),
            None => text(node, self.source),
        };

        let mut symbol = Symbol::new(
            SymbolKind::Func,
            name,
            line_of(node.start_position().row),
            line_of(node.end_position().row),
            text(node, self.source),
        )
        .with_signature(signature);

        if let Some(receiver) = node
            .child_by_field_name("receiver")
            .and_then(|r| self.receiver_type(r))
        {
            symbol = symbol.with_receiver(receiver);
        }

        if let Some(body) = body_node {
            let mut deps = BTreeSet::new();
            self.collect_calls(body, ctx, &mut deps);
            symbol.deps = deps.into_iter().collect();
        }

        Some(symbol)
    }

    /// Base type of a receiver list, with a leading `*` for pointer receivers.
    fn receiver_type(&self, receiver: Node) -> Option<String> {
        let mut cursor = receiver.walk();
        let param = receiver
            .named_children(&mut cursor)
            .find(|n| n.kind() == "parameter_declaration")?;
        let ty = param.child_by_field_name("type")?;
        Some(self.base_type_name(ty))
    }

    fn base_type_name(&self, ty: Node) -> String {
        match ty.kind() {
            "pointer_type" => match ty.named_child(0) {
                Some(inner) => format!("*{}", self.base_type_name(inner)),
                None => text(ty, self.source).to_string(),
            },
            "generic_type" => match ty.child_by_field_name("type") {
                Some(inner) => self.base_type_name(inner),
                None => text(ty, self.source).to_string(),
            },
            "parenthesized_type" => match ty.named_child(0) {
                Some(inner) => self.base_type_name(inner),
                None => text(ty, self.source).to_string(),
            },
            _ => text(ty, self.source).to_string(),
        }
    }

    fn extract_types(&self, decl: Node) -> Vec<Symbol> {
        let grouped = is_grouped(decl);
        let mut symbols = Vec::new();
        let mut cursor = decl.walk();
        for spec in decl.named_children(&mut cursor) {
            if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
                continue;
            }
            let Some(name_node) = spec.child_by_field_name("name") else {
                continue;
            };
            let span = if grouped { spec } else { decl };
            symbols.push(self.value_like(SymbolKind::Type, text(name_node, self.source), spec, span));
        }
        symbols
    }

    fn extract_values(&self, decl: Node, kind: SymbolKind, spec_kind: &str, list_kind: &str) -> Vec<Symbol> {
        let grouped = is_grouped(decl) || has_child_kind(decl, list_kind);
        let mut symbols = Vec::new();
        for spec in nested_specs(decl, spec_kind, list_kind) {
            let span = if grouped { spec } else { decl };
            let mut cursor = spec.walk();
            for name_node in spec.children_by_field_name("name", &mut cursor) {
                let name = text(name_node, self.source);
                if name == "_" {
                    continue;
                }
                symbols.push(self.value_like(kind, name, spec, span));
            }
        }
        symbols
    }

    /// Symbol for a type/const/var spec. `span` is the whole declaration when
    /// it declares a single spec, otherwise the spec itself.
    fn value_like(&self, kind: SymbolKind, name: &str, spec: Node, span: Node) -> Symbol {
        let header = text(spec, self.source).lines().next().unwrap_or("").trim();
        Symbol::new(
            kind,
            name,
            line_of(span.start_position().row),
            line_of(span.end_position().row),
            text(span, self.source),
        )
        .with_signature(format!("{} {}", kind.as_str(), header))
    }

    fn collect_calls(&self, node: Node, ctx: &ResolutionContext, deps: &mut BTreeSet<SymbolDependency>) {
        if node.kind() == "call_expression" {
            if let Some(dep) = node
                .child_by_field_name("function")
                .and_then(|f| self.classify_call(f, ctx))
            {
                deps.insert(dep);
            }
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.collect_calls(child, ctx, deps);
        }
    }

    /// Decide what a call target refers to:
    /// - `F()` is a function in the current package
    /// - `pkg.F()` is a function in `pkg` when it is a local import, and is
    ///   dropped when `pkg` is external
    /// - `x.M()` on anything else is a method on a local value
    fn classify_call(&self, func: Node, ctx: &ResolutionContext) -> Option<SymbolDependency> {
        match func.kind() {
            "identifier" => {
                let name = text(func, self.source);
                if PREDECLARED.contains(&name) {
                    return None;
                }
                Some(SymbolDependency::new(name, ctx.package_path(), DepKind::Func))
            }
            "selector_expression" => {
                let field = text(func.child_by_field_name("field")?, self.source);
                let operand = func.child_by_field_name("operand")?;
                if operand.kind() == "identifier" {
                    return match ctx.resolve_alias(text(operand, self.source)) {
                        Some(ImportTarget::Local(pkg)) => Some(SymbolDependency::new(field, pkg.as_str(), DepKind::Func)),
                        Some(ImportTarget::External) => None,
                        None => Some(SymbolDependency::new(field, ctx.package_path(), DepKind::Method)),
                    };
                }
                // pkg.Value.M(): a method on a package-level value
                let root = root_identifier(operand).and_then(|r| ctx.resolve_alias(text(r, self.source)));
                match root {
                    Some(ImportTarget::Local(pkg)) => Some(SymbolDependency::new(field, pkg.as_str(), DepKind::Method)),
                    Some(ImportTarget::External) => None,
                    None => Some(SymbolDependency::new(field, ctx.package_path(), DepKind::Method)),
                }
            }
            // Explicit instantiation: F[int](x)
            "index_expression" => self.classify_call(func.child_by_field_name("operand")?, ctx),
            "parenthesized_expression" => self.classify_call(func.named_child(0)?, ctx),
            _ => None,
        }
    }
}

fn text<'s>(node: Node, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

fn line_of(row: usize) -> u32 {
    row as u32 + 1
}

/// Leftmost identifier of a selector chain such as `a.b.c`.
fn root_identifier(node: Node) -> Option<Node> {
    match node.kind() {
        "identifier" => Some(node),
        "selector_expression" => root_identifier(node.child_by_field_name("operand")?),
        _ => None,
    }
}

fn first_error(node: Node) -> Option<Node> {
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

/// Reject trees the grammar accepts but the language does not: a file that
/// does not open with a package clause, imports after other declarations,
/// and statements at the top level.
fn check_layout(root: Node, path: &str) -> Result<()> {
    let mut seen_package = false;
    let mut seen_declaration = false;

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let kind = child.kind();
        let line = line_of(child.start_position().row);
        if kind == "comment" {
            continue;
        }
        if !TOP_LEVEL_KINDS.contains(&kind) {
            return Err(layout_error(path, line, format!("unexpected {} at top level", kind)));
        }
        if !seen_package {
            if kind != "package_clause" {
                return Err(layout_error(path, line, format!("expected package clause, found {}", kind)));
            }
            seen_package = true;
            continue;
        }
        match kind {
            "package_clause" => return Err(layout_error(path, line, "duplicate package clause".to_string())),
            "import_declaration" if seen_declaration => {
                return Err(layout_error(path, line, "import after declaration".to_string()));
            }
            "import_declaration" => {}
            _ => seen_declaration = true,
        }
    }

    if !seen_package {
        return Err(layout_error(path, 1, "missing package clause".to_string()));
    }
    Ok(())
}

fn layout_error(path: &str, line: u32, message: String) -> Error {
    Error::Parse {
        path: path.to_string(),
        line,
        message,
    }
}

/// `type ( ... )`, `const ( ... )` and `var ( ... )` forms.
fn is_grouped(decl: Node) -> bool {
    has_child_kind(decl, "(")
}

fn has_child_kind(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

/// Specs of `spec_kind` directly under `decl` or inside a `list_kind` child.
fn nested_specs<'t>(decl: Node<'t>, spec_kind: &str, list_kind: &str) -> Vec<Node<'t>> {
    let mut specs = Vec::new();
    let mut cursor = decl.walk();
    for child in decl.named_children(&mut cursor) {
        if child.kind() == spec_kind {
            specs.push(child);
        } else if child.kind() == list_kind {
            let mut inner = child.walk();
            specs.extend(child.named_children(&mut inner).filter(|n| n.kind() == spec_kind));
        }
    }
    specs
}

//! Symbol types - declarations extracted from Go source
//!
//! Every top-level declaration maps to one of five kinds:
//! - `Func`: free function
//! - `Method`: function with a receiver
//! - `Type`: named type (struct, interface, alias, ...)
//! - `Const`: constant
//! - `Var`: package-level variable
//!
//! A symbol is identified within its file by `(kind, name, receiver)`, so a
//! method `(*Server).Close` and a free function `Close` never collide.

use crate::{Error, Result};
use serde::Serialize;
use std::str::FromStr;

/// Declaration kinds stored in `symbols.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Func,
    Method,
    Type,
    Const,
    Var,
}

impl SymbolKind {
    /// Get the string representation of the symbol kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Func => "func",
            SymbolKind::Method => "method",
            SymbolKind::Type => "type",
            SymbolKind::Const => "const",
            SymbolKind::Var => "var",
        }
    }
}

impl FromStr for SymbolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "func" | "function" => Ok(SymbolKind::Func),
            "method" => Ok(SymbolKind::Method),
            "type" => Ok(SymbolKind::Type),
            "const" | "constant" => Ok(SymbolKind::Const),
            "var" | "variable" => Ok(SymbolKind::Var),
            _ => Err(Error::UnknownKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a dependency is invoked: a package-level function or a method on a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DepKind {
    Func,
    Method,
}

impl DepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepKind::Func => "func",
            DepKind::Method => "method",
        }
    }
}

impl FromStr for DepKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "func" => Ok(DepKind::Func),
            "method" => Ok(DepKind::Method),
            _ => Err(Error::UnknownKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for DepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A call made from a symbol's body to a name inside this module.
///
/// Ordering is `(name, package, kind)`, which is also the sort order used when
/// the dependency list is finalised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolDependency {
    /// Called identifier
    pub name: String,
    /// Repository-relative directory of the package the name lives in
    pub package: String,
    pub kind: DepKind,
}

impl SymbolDependency {
    pub fn new(name: impl Into<String>, package: impl Into<String>, kind: DepKind) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            kind,
        }
    }
}

/// A declaration extracted from one file.
#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    /// Declared identifier
    pub name: String,
    /// Declaration header (everything before the body for functions)
    pub signature: String,
    /// Verbatim source of the declaration
    pub body: String,
    /// Starting line number (1-indexed)
    pub line_start: u32,
    /// Ending line number (1-indexed, inclusive)
    pub line_end: u32,
    /// Whether the name is visible outside its package
    pub exported: bool,
    /// Receiver base type for methods (`*Server`, `Point`), empty otherwise
    pub receiver: String,
    /// Intra-module calls made from the body, sorted and de-duplicated
    pub deps: Vec<SymbolDependency>,
}

impl Symbol {
    /// Create a new symbol with minimal required fields
    pub fn new(
        kind: SymbolKind,
        name: impl Into<String>,
        line_start: u32,
        line_end: u32,
        body: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let exported = is_exported(&name);
        Self {
            kind,
            name,
            signature: String::new(),
            body: body.into(),
            line_start,
            line_end,
            exported,
            receiver: String::new(),
            deps: Vec::new(),
        }
    }

    /// Set the signature
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Set the receiver; the kind becomes `Method`
    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = receiver.into();
        self.kind = SymbolKind::Method;
        self
    }

    /// Identity of this symbol within its file
    pub fn identity(&self) -> (SymbolKind, &str, &str) {
        (self.kind, &self.name, &self.receiver)
    }

    /// Qualified display name, e.g. `(*Server).Close`
    pub fn display_name(&self) -> String {
        if self.receiver.is_empty() {
            self.name.clone()
        } else {
            format!("({}).{}", self.receiver, self.name)
        }
    }
}

/// Go's visibility rule: an identifier is exported when it starts with an
/// upper-case letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_kind_roundtrip() {
        for kind in [SymbolKind::Func, SymbolKind::Method, SymbolKind::Type, SymbolKind::Const, SymbolKind::Var] {
            let parsed: SymbolKind = kind.as_str().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_symbol_kind_aliases() {
        assert_eq!(SymbolKind::from_str("function").unwrap(), SymbolKind::Func);
        assert_eq!(SymbolKind::from_str("CONST").unwrap(), SymbolKind::Const);
        assert!(SymbolKind::from_str("class").is_err());
    }

    #[test]
    fn test_exported() {
        assert!(is_exported("Handler"));
        assert!(is_exported("Ärger"));
        assert!(!is_exported("handler"));
        assert!(!is_exported("_Hidden"));
        assert!(!is_exported(""));
    }

    #[test]
    fn test_method_identity_differs_from_func() {
        let func = Symbol::new(SymbolKind::Func, "Close", 1, 3, "func Close() {}");
        let method = Symbol::new(SymbolKind::Func, "Close", 5, 7, "func (s *Server) Close() {}")
            .with_receiver("*Server");

        assert_eq!(method.kind, SymbolKind::Method);
        assert_ne!(func.identity(), method.identity());
        assert_eq!(method.display_name(), "(*Server).Close");
    }
}

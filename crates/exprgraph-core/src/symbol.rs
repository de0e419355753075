//! Symbols and resolved values.
//!
//! A [`Symbol`] is a canonical dotted path (`json.dumps`, `os.path.join`)
//! identifying an importable entity. A [`GlobalValue`] is the result of
//! resolving an expression against import analysis: either the entity
//! itself, an instance of it, or the value returned by calling it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Path tail appended to the type label of an instance value.
pub const INSTANCE_TAIL: &str = "instance";

/// Path tail appended to the type label of a call's return value.
pub const RETURN_VALUE_TAIL: &str = "ret";

/// Canonical dotted path of an importable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(path: impl Into<String>) -> Self {
        Symbol(path.into())
    }

    /// The full dotted path.
    pub fn path(&self) -> &str {
        &self.0
    }

    /// The last path component (`dumps` for `json.dumps`).
    pub fn last(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// The symbol obtained by selecting `attr` on this symbol.
    pub fn with_attr(&self, attr: &str) -> Symbol {
        Symbol(format!("{}.{attr}", self.0))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved value attached to a graph node.
///
/// Kept on node attributes so later phases can match nodes back to symbols
/// without re-running resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalValue {
    /// The importable entity itself (a module, function, or class).
    External(Symbol),
    /// An instance of an external class.
    ExternalInstance(Symbol),
    /// The value returned by calling an external function.
    ExternalReturnValue(Symbol),
}

impl GlobalValue {
    /// The symbol this value is anchored on.
    pub fn symbol(&self) -> &Symbol {
        match self {
            GlobalValue::External(sym)
            | GlobalValue::ExternalInstance(sym)
            | GlobalValue::ExternalReturnValue(sym) => sym,
        }
    }

    /// The type label fed to the model for a node carrying this value.
    ///
    /// Instance and return-value labels carry a path tail so the feed layer
    /// can recover the flavor when splitting the label into subtokens.
    pub fn type_label(&self) -> String {
        match self {
            GlobalValue::External(sym) => sym.path().to_owned(),
            GlobalValue::ExternalInstance(sym) => format!("{}.{INSTANCE_TAIL}", sym.path()),
            GlobalValue::ExternalReturnValue(sym) => {
                format!("{}.{RETURN_VALUE_TAIL}", sym.path())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_last_component() {
        assert_eq!(Symbol::new("json.dumps").last(), "dumps");
        assert_eq!(Symbol::new("os").last(), "os");
    }

    #[test]
    fn symbol_with_attr() {
        let sym = Symbol::new("os.path");
        assert_eq!(sym.with_attr("join").path(), "os.path.join");
    }

    #[test]
    fn global_value_type_labels() {
        let sym = Symbol::new("requests.get");
        assert_eq!(GlobalValue::External(sym.clone()).type_label(), "requests.get");
        assert_eq!(
            GlobalValue::ExternalReturnValue(sym.clone()).type_label(),
            "requests.get.ret"
        );
        assert_eq!(
            GlobalValue::ExternalInstance(sym).type_label(),
            "requests.get.instance"
        );
    }
}

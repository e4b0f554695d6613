//! Lexical symbol resolution.
//!
//! Tables form a chain from the innermost function scope out to the global
//! scope. Resolution walks outward; a name found in an enclosing function
//! scope (neither global nor builtin) is captured as a free variable of the
//! current scope, which is what turns functions into closures.

use std::collections::HashMap;

/// Where a resolved name lives, which decides the load/store opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub outer: Option<Box<SymbolTable>>,
    /// Symbols captured from enclosing scopes, in capture order. The
    /// compiler replays this list when it emits the closure instruction.
    pub free_symbols: Vec<Symbol>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    /// Number of definitions made directly in this table; the compiler uses
    /// it as the frame's local-slot count.
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Define a name in this table. Indices are dense and scope-local,
    /// assigned in definition order.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Register a builtin under its fixed table index.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let name = original.name.clone();
        self.free_symbols.push(original);
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(name, symbol.clone());
        symbol
    }

    /// Resolve a name, searching outward. Global and builtin symbols pass
    /// through unchanged; anything else found in an enclosing table is
    /// redefined here as a free variable.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(symbol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define() {
        let mut global = SymbolTable::new();
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), symbol("b", SymbolScope::Global, 1));

        let mut first_local = SymbolTable::enclosed(global);
        assert_eq!(first_local.define("c"), symbol("c", SymbolScope::Local, 0));
        assert_eq!(first_local.define("d"), symbol("d", SymbolScope::Local, 1));

        let mut second_local = SymbolTable::enclosed(first_local);
        assert_eq!(second_local.define("e"), symbol("e", SymbolScope::Local, 0));
        assert_eq!(second_local.define("f"), symbol("f", SymbolScope::Local, 1));
    }

    #[test]
    fn test_resolve_global() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        assert_eq!(
            global.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            global.resolve("b"),
            Some(symbol("b", SymbolScope::Global, 1))
        );
        assert_eq!(global.resolve("c"), None);
    }

    #[test]
    fn test_resolve_local_shadows_outer() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut local = SymbolTable::enclosed(global);
        local.define("a");

        assert_eq!(local.resolve("a"), Some(symbol("a", SymbolScope::Local, 0)));
    }

    #[test]
    fn test_resolve_builtins_pass_through_unchanged() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        global.define_builtin(1, "puts");

        let mut first = SymbolTable::enclosed(global);
        let mut second = SymbolTable::enclosed(first.clone());

        assert_eq!(
            first.resolve("len"),
            Some(symbol("len", SymbolScope::Builtin, 0))
        );
        assert_eq!(
            second.resolve("puts"),
            Some(symbol("puts", SymbolScope::Builtin, 1))
        );
        assert!(second.free_symbols.is_empty());
    }

    #[test]
    fn test_resolve_free() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut first_local = SymbolTable::enclosed(global);
        first_local.define("c");
        first_local.define("d");

        let mut second_local = SymbolTable::enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        // Globals resolve unchanged
        assert_eq!(
            second_local.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        // Locals of the enclosing function are captured as free
        assert_eq!(
            second_local.resolve("c"),
            Some(symbol("c", SymbolScope::Free, 0))
        );
        assert_eq!(
            second_local.resolve("d"),
            Some(symbol("d", SymbolScope::Free, 1))
        );
        // Own locals stay local
        assert_eq!(
            second_local.resolve("e"),
            Some(symbol("e", SymbolScope::Local, 0))
        );

        // The captured originals are recorded in capture order
        let free: Vec<_> = second_local
            .free_symbols
            .iter()
            .map(|s| (s.name.as_str(), s.scope, s.index))
            .collect();
        assert_eq!(
            free,
            [("c", SymbolScope::Local, 0), ("d", SymbolScope::Local, 1)]
        );
    }

    #[test]
    fn test_resolve_free_is_idempotent() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first_local = SymbolTable::enclosed(global);
        first_local.define("b");

        let mut second_local = SymbolTable::enclosed(first_local);
        let once = second_local.resolve("b");
        let twice = second_local.resolve("b");
        assert_eq!(once, twice);
        assert_eq!(second_local.free_symbols.len(), 1);
    }

    #[test]
    fn test_resolve_unresolvable_free() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first_local = SymbolTable::enclosed(global);
        first_local.define("c");

        let mut second_local = SymbolTable::enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        assert_eq!(
            second_local.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            second_local.resolve("c"),
            Some(symbol("c", SymbolScope::Free, 0))
        );
        assert_eq!(second_local.resolve("b"), None);
        assert_eq!(second_local.resolve("d"), None);
    }
}

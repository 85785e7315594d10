//! Symbol table and scope management
//!
//! Bindings are keyed by (name, nesting level). The Global level
//! persists for the whole translation run; the Param and Local levels
//! are entered per function and purged on exit.

use std::collections::HashMap;

use string_interner::{DefaultStringInterner, DefaultSymbol};

use crate::cfg::BlockId;
use crate::frontend::TypeFlags;
use crate::ir;

/// Scope of a binding. Each scope maps to a fixed nesting level, so
/// deeper scopes carry higher levels and can be purged independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Param,
    Local,
}

impl Scope {
    pub fn level(self) -> usize {
        match self {
            Scope::Global => 0,
            Scope::Param => 1,
            Scope::Local => 2,
        }
    }
}

/// Handle of an installed symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(u32);

/// A symbol table entry
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: DefaultSymbol,
    pub scope: Scope,
    pub ty: TypeFlags,
    /// Element width in bytes; nonzero exactly for declared storage cells.
    pub width: u32,
    /// Element count for allocations (1 for scalars).
    pub numelem: u32,
    /// Owning block, for branch-label symbols.
    pub block: Option<BlockId>,
    /// IR type of the binding, populated lazily during lowering.
    pub lty: Option<ir::Ty>,
    /// IR handle, populated lazily during lowering. For declared
    /// storage cells this is the cell's address, not its contents.
    pub ir: Option<ir::Value>,
}

/// Scoped lookup/install table.
///
/// Reinstalling a name at a level it is already bound at replaces the
/// binding (intentional rebinding for lowering temporaries); a binding
/// never merges with an outer-level binding of the same name.
pub struct SymbolTable {
    interner: DefaultStringInterner,
    symbols: Vec<Symbol>,
    scopes: Vec<HashMap<DefaultSymbol, SymId>>,
    level: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            interner: DefaultStringInterner::default(),
            symbols: Vec::new(),
            scopes: vec![HashMap::new()],
            level: 0,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Enter a nesting level.
    pub fn enter_scope(&mut self) {
        self.level += 1;
        while self.scopes.len() <= self.level {
            self.scopes.push(HashMap::new());
        }
    }

    /// Exit the current nesting level, purging every binding whose
    /// level exceeds the new one.
    pub fn leave_scope(&mut self) {
        if self.level > 0 {
            self.scopes.truncate(self.level);
            self.level -= 1;
        }
    }

    /// Create a binding for `name` at the given scope, replacing a
    /// same-level binding if one exists.
    pub fn install(&mut self, name: &str, scope: Scope) -> SymId {
        let key = self.interner.get_or_intern(name);
        let level = scope.level();
        while self.scopes.len() <= level {
            self.scopes.push(HashMap::new());
        }

        let id = SymId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: key,
            scope,
            ty: TypeFlags::EMPTY,
            width: 0,
            numelem: 0,
            block: None,
            lty: None,
            ir: None,
        });
        self.scopes[level].insert(key, id);
        id
    }

    /// Look `name` up. With `None` the innermost visible binding at
    /// any level matches; an explicit scope requires an exact level
    /// match. Callers must treat `None` as a fatal translation error.
    pub fn lookup(&self, name: &str, scope: Option<Scope>) -> Option<SymId> {
        let key = self.interner.get(name)?;
        match scope {
            Some(s) => self.scopes.get(s.level())?.get(&key).copied(),
            None => self
                .scopes
                .iter()
                .rev()
                .find_map(|bindings| bindings.get(&key).copied()),
        }
    }

    pub fn symbol(&self, id: SymId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn name_of(&self, id: SymId) -> &str {
        self.interner
            .resolve(self.symbol(id).name)
            .expect("symbol name is interned")
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_default_lookup() {
        let mut table = SymbolTable::new();
        let id = table.install("x", Scope::Global);
        assert_eq!(table.lookup("x", None), Some(id));
        assert_eq!(table.lookup("y", None), None);
    }

    #[test]
    fn test_inner_binding_shadows_outer() {
        let mut table = SymbolTable::new();
        let outer = table.install("x", Scope::Global);
        table.enter_scope();
        table.enter_scope();
        let inner = table.install("x", Scope::Local);

        assert_eq!(table.lookup("x", None), Some(inner));
        assert_eq!(table.lookup("x", Some(Scope::Global)), Some(outer));
    }

    #[test]
    fn test_rebinding_at_same_level() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.enter_scope();
        let first = table.install("t0", Scope::Local);
        let second = table.install("t0", Scope::Local);
        assert_ne!(first, second);
        assert_eq!(table.lookup("t0", None), Some(second));
    }

    #[test]
    fn test_exact_scope_requires_level_match() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.enter_scope();
        table.install("x", Scope::Local);
        assert_eq!(table.lookup("x", Some(Scope::Param)), None);
        assert!(table.lookup("x", Some(Scope::Local)).is_some());
    }

    #[test]
    fn test_scope_round_trip() {
        // A binding at level N survives entering and leaving a deeper
        // level; only leaving level N itself removes it.
        let mut table = SymbolTable::new();
        table.enter_scope();
        let param = table.install("p", Scope::Param);

        table.enter_scope();
        table.install("loc", Scope::Local);
        table.leave_scope();

        assert_eq!(table.lookup("p", None), Some(param));
        assert_eq!(table.lookup("loc", None), None);

        table.leave_scope();
        assert_eq!(table.lookup("p", None), None);
    }

    #[test]
    fn test_globals_survive_function_exit() {
        let mut table = SymbolTable::new();
        let g = table.install("g", Scope::Global);
        table.enter_scope();
        table.enter_scope();
        table.install("t0", Scope::Local);
        table.leave_scope();
        table.leave_scope();
        assert_eq!(table.lookup("g", None), Some(g));
        assert_eq!(table.lookup("t0", None), None);
    }
}

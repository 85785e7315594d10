//! Symbol resolution

mod scope;

pub use scope::{Scope, SymId, Symbol, SymbolTable};

//! Translation driver
//!
//! Orchestrates the per-function pipeline: read the quadruple stream
//! into a block chain, resolve forward aliases, compute edges, lower.
//! The module and the global scope level persist across functions;
//! the Param and Local levels are purged after each one.

use crate::cfg::{FuncRead, backpatch, compute_edges, read_function};
use crate::common::TranslateResult;
use crate::frontend::TypeFlags;
use crate::frontend::parser::LineParser;
use crate::ir::{self, IrBuilder, Ty};
use crate::lower::LowerEngine;
use crate::sema::{Scope, SymbolTable};

/// Driver options; dumps go to stderr.
#[derive(Debug, Clone, Default)]
pub struct TranslateConfig {
    pub dump_quads: bool,
    pub dump_cfg: bool,
    pub verbose: bool,
}

/// Translate a whole quadruple stream into an IR module.
pub fn translate(source: &str) -> TranslateResult<ir::Module> {
    translate_with(source, &TranslateConfig::default())
}

pub fn translate_with(source: &str, config: &TranslateConfig) -> TranslateResult<ir::Module> {
    let mut table = SymbolTable::new();
    let mut builder = IrBuilder::new();
    install_externals(&mut table, &mut builder);

    let mut parser = LineParser::new(source);
    while let Some(mut func) = read_function(&mut parser, &mut table)? {
        backpatch(&mut func.graph, &mut func.aliases);
        compute_edges(&mut func.graph)?;

        if config.dump_quads {
            eprintln!("{}", func.graph);
        }
        if config.dump_cfg {
            dump_cfg(&func);
        }

        LowerEngine::new(&mut table, &mut builder).lower_function(&mut func)?;

        if config.verbose {
            eprintln!(
                "translated function '{}' ({} blocks)",
                func.name,
                func.graph.order().len()
            );
        }

        // purge the Local and Param levels; globals stay visible
        table.leave_scope();
        table.leave_scope();
    }

    Ok(builder.finish())
}

/// The runtime functions every module may call. They participate in
/// the global redefinition check.
fn install_externals(table: &mut SymbolTable, builder: &mut IrBuilder) {
    builder.declare_extern("printf", Ty::I32, vec![Ty::Ptr], true);
    let id = table.install("printf", Scope::Global);
    table.symbol_mut(id).ty = TypeFlags::INT | TypeFlags::PROC;

    builder.declare_extern("exit", Ty::Void, vec![Ty::I32], false);
    let id = table.install("exit", Scope::Global);
    table.symbol_mut(id).ty = TypeFlags::PROC;

    builder.declare_extern("getchar", Ty::I32, vec![], false);
    let id = table.install("getchar", Scope::Global);
    table.symbol_mut(id).ty = TypeFlags::INT | TypeFlags::PROC;
}

fn dump_cfg(func: &FuncRead) {
    eprintln!("function '{}':", func.name);
    for id in func.graph.order() {
        let blk = func.graph.block(id);
        let nums = |ids: &[crate::cfg::BlockId]| {
            ids.iter()
                .map(|&b| func.graph.block(b).num.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        eprintln!(
            "  block {} '{}': {} quads, preds [{}], succs [{}]",
            blk.num,
            blk.label.as_deref().unwrap_or("-"),
            blk.quads.len(),
            nums(&blk.preds),
            nums(&blk.succs),
        );
    }
}

//! Forward branch-target alias resolution
//!
//! A line `B=T` recorded while reading means: terminators naming `B`
//! must be rewritten to `T`, the label that actually got emitted.
//! Resolution follows chains and consumes each pair once. It must run
//! to completion before any terminator is lowered to a real control
//! transfer.

use std::collections::HashMap;

use super::block::FlowGraph;
use crate::frontend::QuadKind;

/// Rewrite every terminator target that has a pending alias.
pub fn backpatch(graph: &mut FlowGraph, aliases: &mut HashMap<String, String>) {
    for id in graph.order() {
        let Some(quad) = graph.block_mut(id).quads.last_mut() else {
            continue;
        };
        match &mut quad.kind {
            QuadKind::CondBranch {
                true_target,
                false_target,
                ..
            } => {
                resolve(aliases, true_target);
                resolve(aliases, false_target);
            }
            QuadKind::Jump { target } => resolve(aliases, target),
            _ => {}
        }
    }
}

fn resolve(aliases: &mut HashMap<String, String>, label: &mut String) {
    while let Some(next) = aliases.remove(label.as_str()) {
        *label = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{compute_edges, read_function};
    use crate::frontend::parser::LineParser;
    use crate::sema::SymbolTable;

    fn read(source: &str) -> crate::cfg::FuncRead {
        let mut table = SymbolTable::new();
        let mut parser = LineParser::new(source);
        read_function(&mut parser, &mut table)
            .unwrap()
            .expect("one function")
    }

    #[test]
    fn test_forward_alias_is_rewritten_and_consumed() {
        let mut func = read(
            "func f 1\n\
             bt t0 L10\n\
             br L11\n\
             L10=L1\n\
             L11=L2\n\
             label L1\n\
             label L2\n\
             reti retval\n\
             fend\n",
        );
        backpatch(&mut func.graph, &mut func.aliases);
        assert!(func.aliases.is_empty());

        let entry = func.graph.entry;
        assert_eq!(
            func.graph.block(entry).quads.last().unwrap().kind,
            QuadKind::CondBranch {
                cond: "t0".into(),
                true_target: "L1".into(),
                false_target: "L2".into(),
            }
        );
        compute_edges(&mut func.graph).unwrap();
    }

    #[test]
    fn test_chained_aliases_resolve_transitively() {
        let mut func = read(
            "func f 1\n\
             br L10\n\
             L10=L11\n\
             L11=L1\n\
             label L1\n\
             reti retval\n\
             fend\n",
        );
        backpatch(&mut func.graph, &mut func.aliases);
        let entry = func.graph.entry;
        assert_eq!(
            func.graph.block(entry).quads.last().unwrap().kind,
            QuadKind::Jump {
                target: "L1".into()
            }
        );
        assert!(func.aliases.is_empty());
    }

    #[test]
    fn test_no_pending_alias_after_resolution() {
        // backpatch totality: every terminator target names a real
        // label once resolution is done
        let mut func = read(
            "func f 1\n\
             bt t0 L5\n\
             br L6\n\
             L5=L1\n\
             L6=L2\n\
             label L1\n\
             br L3\n\
             label L2\n\
             label L3\n\
             reti retval\n\
             fend\n",
        );
        backpatch(&mut func.graph, &mut func.aliases);
        for id in func.graph.order() {
            if let Some(quad) = func.graph.block(id).quads.last() {
                match &quad.kind {
                    QuadKind::CondBranch {
                        true_target,
                        false_target,
                        ..
                    } => {
                        assert!(func.graph.find_target(true_target).is_some());
                        assert!(func.graph.find_target(false_target).is_some());
                    }
                    QuadKind::Jump { target } => {
                        assert!(func.graph.find_target(target).is_some());
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_duplicate_alias_keeps_first_binding() {
        let mut func = read(
            "func f 1\n\
             br L10\n\
             L10=L1\n\
             L10=L2\n\
             label L1\n\
             label L2\n\
             reti retval\n\
             fend\n",
        );
        backpatch(&mut func.graph, &mut func.aliases);
        let entry = func.graph.entry;
        assert_eq!(
            func.graph.block(entry).quads.last().unwrap().kind,
            QuadKind::Jump {
                target: "L1".into()
            }
        );
    }
}

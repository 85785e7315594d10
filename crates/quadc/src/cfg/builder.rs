//! Builds the block chain for one function from the line stream
//!
//! Splitting rules: a label starts a new block only if the current
//! block already has content, an unconditional jump always terminates
//! the current block, and a `bt`/`br` pair is fused into one
//! conditional branch that terminates the block.

use std::collections::HashMap;

use super::block::FlowGraph;
use crate::common::{Span, TranslateError, TranslateResult};
use crate::frontend::parser::{Line, LineParser};
use crate::frontend::{OpType, Operand, Quad, QuadKind, TypeFlags};
use crate::sema::{Scope, SymbolTable};

/// One function as read off the stream: its block chain plus the
/// forward-alias pairs recorded along the way.
#[derive(Debug)]
pub struct FuncRead {
    pub name: String,
    pub graph: FlowGraph,
    pub aliases: HashMap<String, String>,
    pub span: Span,
}

/// Read the next function off the stream, installing the symbols its
/// allocation lines declare. Returns `None` at end of input.
pub fn read_function(
    parser: &mut LineParser,
    table: &mut SymbolTable,
) -> TranslateResult<Option<FuncRead>> {
    let mut graph = FlowGraph::new();
    let mut aliases = HashMap::new();

    // Globals accumulate ahead of each function header; both land in
    // the entry block.
    let (func_name, func_span) = loop {
        let Some(line) = parser.next_line()? else {
            return Ok(None);
        };
        match line {
            Line::Quad(quad) => match &quad.kind {
                QuadKind::GlobalAlloc { name, ty, bytes } => {
                    install_storage(table, name, Scope::Global, *ty, *bytes, quad.span)?;
                    graph.push(quad);
                }
                QuadKind::FuncBegin { name, ty } => {
                    if table.lookup(name, Some(Scope::Global)).is_some() {
                        return Err(TranslateError::redefined(name, quad.span));
                    }
                    let id = table.install(name, Scope::Global);
                    table.symbol_mut(id).ty = *ty | TypeFlags::PROC;

                    let name = name.clone();
                    let span = quad.span;
                    graph.set_label(graph.entry, name.clone());
                    graph.push(quad);
                    table.enter_scope();
                    table.enter_scope();
                    break (name, span);
                }
                _ => {
                    return Err(TranslateError::structural(
                        "instruction outside a function",
                        quad.span,
                    ));
                }
            },
            Line::Branch { span, .. } | Line::Label { span, .. } | Line::Alias { span, .. } => {
                return Err(TranslateError::structural(
                    "instruction outside a function",
                    span,
                ));
            }
            Line::FuncEnd { span } => {
                return Err(TranslateError::structural("'fend' without 'func'", span));
            }
        }
    };

    let mut last_is_return = false;
    loop {
        let Some(line) = parser.next_line()? else {
            return Err(TranslateError::structural(
                format!("unexpected end of input inside function '{func_name}'"),
                func_span,
            ));
        };
        match line {
            Line::Quad(quad) => match &quad.kind {
                QuadKind::GlobalAlloc { .. } | QuadKind::FuncBegin { .. } => {
                    return Err(TranslateError::structural(
                        "global declaration inside a function body",
                        quad.span,
                    ));
                }
                QuadKind::LocalAlloc { name, ty, bytes } => {
                    install_storage(table, name, Scope::Local, *ty, *bytes, quad.span)?;
                    last_is_return = false;
                    graph.push(quad);
                }
                QuadKind::FormalAlloc { name, ty, bytes } => {
                    install_storage(table, name, Scope::Param, *ty, *bytes, quad.span)?;
                    last_is_return = false;
                    graph.push(quad);
                }
                QuadKind::Jump { .. } => {
                    last_is_return = false;
                    graph.push(quad);
                    graph.split(None);
                }
                QuadKind::Return { .. } => {
                    last_is_return = true;
                    graph.push(quad);
                }
                _ => {
                    last_is_return = false;
                    graph.push(quad);
                }
            },
            Line::Branch { cond, target, span } => {
                // the jump on the next line is the false edge
                let next = parser.next_line()?;
                let Some(Line::Quad(Quad {
                    kind: QuadKind::Jump {
                        target: false_target,
                    },
                    ..
                })) = next
                else {
                    return Err(TranslateError::structural(
                        "conditional branch not followed by an unconditional jump",
                        span,
                    ));
                };
                graph.push(Quad::new(
                    QuadKind::CondBranch {
                        cond,
                        true_target: target,
                        false_target,
                    },
                    span,
                ));
                graph.split(None);
                last_is_return = false;
            }
            Line::Label { name, span: _ } => {
                let tail = graph.tail;
                let block = if graph.block(tail).is_empty() && graph.block(tail).label.is_none() {
                    graph.set_label(tail, name.clone());
                    tail
                } else {
                    graph.split(Some(name.clone()))
                };
                let id = table.install(&name, Scope::Local);
                table.symbol_mut(id).ty = TypeFlags::LABEL;
                table.symbol_mut(id).block = Some(block);
            }
            Line::Alias {
                pending, resolved, ..
            } => {
                aliases.entry(pending).or_insert(resolved);
            }
            Line::FuncEnd { span } => {
                if !last_is_return {
                    // a function falling off the end returns 0
                    graph.push(Quad::new(
                        QuadKind::Assign {
                            dest: "retval".into(),
                            value: Operand::Int(0),
                        },
                        span,
                    ));
                    graph.push(Quad::new(
                        QuadKind::Return {
                            suffix: OpType::Int,
                            value: "retval".into(),
                        },
                        span,
                    ));
                }
                return Ok(Some(FuncRead {
                    name: func_name,
                    graph,
                    aliases,
                    span: func_span,
                }));
            }
        }
    }
}

fn install_storage(
    table: &mut SymbolTable,
    name: &str,
    scope: Scope,
    ty: TypeFlags,
    bytes: u32,
    span: Span,
) -> TranslateResult<()> {
    let width = ty.width();
    if width == 0 {
        return Err(TranslateError::malformed(
            format!("allocation of unsized type for '{name}'"),
            span,
        ));
    }
    if scope == Scope::Global && table.lookup(name, Some(Scope::Global)).is_some() {
        return Err(TranslateError::redefined(name, span));
    }
    let id = table.install(name, scope);
    let symbol = table.symbol_mut(id);
    symbol.ty = ty;
    symbol.width = width;
    symbol.numelem = bytes / width;
    Ok(())
}

/// Compute successor/predecessor edges from each block's terminator.
/// Runs after backpatching, so every target names a real block.
pub fn compute_edges(graph: &mut FlowGraph) -> TranslateResult<()> {
    for id in graph.order() {
        let last = graph.block(id).quads.last().cloned();
        match last {
            Some(Quad {
                kind:
                    QuadKind::CondBranch {
                        true_target,
                        false_target,
                        ..
                    },
                span,
            }) => {
                let t = graph
                    .find_target(&true_target)
                    .ok_or_else(|| TranslateError::bad_target(&true_target, span))?;
                let f = graph
                    .find_target(&false_target)
                    .ok_or_else(|| TranslateError::bad_target(&false_target, span))?;
                graph.add_edge(id, t);
                graph.add_edge(id, f);
            }
            Some(Quad {
                kind: QuadKind::Jump { target },
                span,
            }) => {
                let t = graph
                    .find_target(&target)
                    .ok_or_else(|| TranslateError::bad_target(&target, span))?;
                graph.add_edge(id, t);
            }
            Some(Quad {
                kind: QuadKind::Return { .. },
                ..
            }) => {}
            _ => {
                if let Some(down) = graph.block(id).down {
                    graph.add_edge(id, down);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::backpatch;

    fn read(source: &str) -> (FuncRead, SymbolTable) {
        let mut table = SymbolTable::new();
        let mut parser = LineParser::new(source);
        let func = read_function(&mut parser, &mut table)
            .unwrap()
            .expect("one function");
        (func, table)
    }

    #[test]
    fn test_single_block_function() {
        let (func, table) = read(
            "func f 1\n\
             formal x 1 4\n\
             retval := x\n\
             reti retval\n\
             fend\n",
        );
        assert_eq!(func.name, "f");
        assert_eq!(func.graph.order().len(), 1);
        let entry = func.graph.block(func.graph.entry);
        assert_eq!(entry.label.as_deref(), Some("f"));
        assert_eq!(entry.quads.len(), 4);
        assert!(table.lookup("x", Some(Scope::Param)).is_some());
    }

    #[test]
    fn test_jump_terminates_block() {
        let (func, _) = read(
            "func f 1\n\
             br L1\n\
             label L1\n\
             reti retval\n\
             fend\n",
        );
        // entry ends at the jump; L1 is a separate block
        let order = func.graph.order();
        assert_eq!(order.len(), 2);
        assert!(matches!(
            func.graph.block(order[0]).quads.last().unwrap().kind,
            QuadKind::Jump { .. }
        ));
        assert_eq!(func.graph.block(order[1]).label.as_deref(), Some("L1"));
    }

    #[test]
    fn test_label_attaches_to_empty_block() {
        let (func, _) = read(
            "func f 1\n\
             br L1\n\
             label L1\n\
             label L2\n\
             reti retval\n\
             fend\n",
        );
        // L1 attaches to the empty block the jump opened; L2 splits
        let order = func.graph.order();
        assert_eq!(order.len(), 3);
        assert_eq!(func.graph.block(order[1]).label.as_deref(), Some("L1"));
        assert!(func.graph.block(order[1]).is_empty());
        assert_eq!(func.graph.block(order[2]).label.as_deref(), Some("L2"));
    }

    #[test]
    fn test_branch_pair_is_fused() {
        let (func, _) = read(
            "func f 1\n\
             bt t0 L1\n\
             br L2\n\
             label L1\n\
             br L3\n\
             label L2\n\
             br L3\n\
             label L3\n\
             reti retval\n\
             fend\n",
        );
        let entry = func.graph.block(func.graph.entry);
        assert_eq!(
            entry.quads.last().unwrap().kind,
            QuadKind::CondBranch {
                cond: "t0".into(),
                true_target: "L1".into(),
                false_target: "L2".into(),
            }
        );
    }

    #[test]
    fn test_branch_without_jump_is_structural_error() {
        let mut table = SymbolTable::new();
        let mut parser = LineParser::new(
            "func f 1\n\
             bt t0 L1\n\
             reti retval\n\
             fend\n",
        );
        let err = read_function(&mut parser, &mut table).unwrap_err();
        assert!(matches!(err, TranslateError::Structural { .. }));
    }

    #[test]
    fn test_missing_return_is_synthesized() {
        let (func, _) = read(
            "func f 1\n\
             t0 := 3\n\
             fend\n",
        );
        let entry = func.graph.block(func.graph.entry);
        let kinds: Vec<_> = entry.quads.iter().map(|q| q.kind.tag()).collect();
        assert_eq!(kinds, vec!["FUNC_BEGIN", "ASSIGN", "ASSIGN", "RETURN"]);
    }

    #[test]
    fn test_eof_inside_function() {
        let mut table = SymbolTable::new();
        let mut parser = LineParser::new("func f 1\nt0 := 3\n");
        let err = read_function(&mut parser, &mut table).unwrap_err();
        assert!(matches!(err, TranslateError::Structural { .. }));
    }

    #[test]
    fn test_global_redefinition() {
        let mut table = SymbolTable::new();
        let mut parser = LineParser::new("alloc g 1 4\nalloc g 1 4\nfunc f 1\nfend\n");
        let err = read_function(&mut parser, &mut table).unwrap_err();
        assert!(matches!(err, TranslateError::Redefinition { .. }));
    }

    #[test]
    fn test_branch_edges() {
        let (mut func, _) = read(
            "func f 1\n\
             bt t0 L1\n\
             br L2\n\
             label L1\n\
             br L3\n\
             label L2\n\
             br L3\n\
             label L3\n\
             reti retval\n\
             fend\n",
        );
        compute_edges(&mut func.graph).unwrap();
        let order = func.graph.order();
        let entry = func.graph.block(order[0]);

        // conditional branch: exactly the two named successors
        assert_eq!(entry.succs.len(), 2);
        assert_eq!(
            entry.succs,
            vec![
                func.graph.find_target("L1").unwrap(),
                func.graph.find_target("L2").unwrap(),
            ]
        );
        // return block has no successors
        let l3 = func.graph.find_target("L3").unwrap();
        assert!(func.graph.block(l3).succs.is_empty());
        assert_eq!(func.graph.block(l3).preds.len(), 2);
    }

    #[test]
    fn test_fallthrough_edge() {
        let (mut func, _) = read(
            "func f 1\n\
             t0 := 1\n\
             label L1\n\
             reti retval\n\
             fend\n",
        );
        compute_edges(&mut func.graph).unwrap();
        let order = func.graph.order();
        assert_eq!(func.graph.block(order[0]).succs, vec![order[1]]);
        assert_eq!(func.graph.block(order[1]).preds, vec![order[0]]);
    }

    #[test]
    fn test_pred_succ_symmetry() {
        let (mut func, _) = read(
            "func f 1\n\
             bt t0 L1\n\
             br L2\n\
             label L1\n\
             label L2\n\
             reti retval\n\
             fend\n",
        );
        backpatch(&mut func.graph, &mut func.aliases);
        compute_edges(&mut func.graph).unwrap();
        for a in func.graph.order() {
            for &b in &func.graph.block(a).succs {
                assert!(func.graph.block(b).preds.contains(&a));
            }
            for &b in &func.graph.block(a).preds {
                assert!(func.graph.block(b).succs.contains(&a));
            }
        }
    }

    #[test]
    fn test_unresolved_branch_target() {
        let (mut func, _) = read(
            "func f 1\n\
             br L9\n\
             label L1\n\
             reti retval\n\
             fend\n",
        );
        let err = compute_edges(&mut func.graph).unwrap_err();
        assert!(matches!(err, TranslateError::UnresolvedBranchTarget { .. }));
    }

    #[test]
    fn test_every_nonentry_block_has_a_predecessor() {
        let (mut func, _) = read(
            "func f 1\n\
             t0 := 1\n\
             bt t0 L1\n\
             br L2\n\
             label L1\n\
             br L3\n\
             label L2\n\
             label L3\n\
             reti retval\n\
             fend\n",
        );
        compute_edges(&mut func.graph).unwrap();
        for id in func.graph.order().into_iter().skip(1) {
            assert!(
                !func.graph.block(id).preds.is_empty(),
                "block {id:?} has no predecessor"
            );
        }
    }
}

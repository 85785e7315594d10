//! Per-instruction lowering rules
//!
//! Walks the blocks of one function in program order and emits typed
//! IR through the builder. Target IR blocks are materialized lazily
//! the first time a terminator or fallthrough references them, so the
//! emitted block order follows first use, not program order.

use crate::cfg::{BlockId, FlowGraph, FuncRead};
use crate::common::{Span, TranslateError, TranslateResult};
use crate::frontend::{
    BinOp, ConvKind, OpType, Operand, Quad, QuadKind, TypeFlags, UnOp,
};
use crate::ir::{self, Inst, IrBuilder, Reg, Ty, Value};
use crate::sema::{Scope, SymbolTable};

/// Lowers one function's blocks into the accumulating module.
pub struct LowerEngine<'a> {
    table: &'a mut SymbolTable,
    builder: &'a mut IrBuilder,
    func_open: bool,
}

impl<'a> LowerEngine<'a> {
    pub fn new(table: &'a mut SymbolTable, builder: &'a mut IrBuilder) -> Self {
        Self {
            table,
            builder,
            func_open: false,
        }
    }

    /// Lower every block of `func`. The graph must already be
    /// backpatched; every terminator target names a real block.
    pub fn lower_function(&mut self, func: &mut FuncRead) -> TranslateResult<()> {
        for id in func.graph.order() {
            let quads = func.graph.block(id).quads.clone();

            if id != func.graph.entry {
                let blk = self.ir_block_for(&mut func.graph, id);
                self.builder.set_insert_point(blk);
            }

            for i in 0..quads.len() {
                self.lower_quad(&mut func.graph, id, &quads, i)?;
            }

            // Every emitted block ends with exactly one terminator: a
            // block falling off its end transfers to its down-link.
            let terminated = quads.last().is_some_and(|q| q.kind.is_terminator());
            if !terminated {
                if let Some(down) = func.graph.block(id).down {
                    let target = self.ir_block_for(&mut func.graph, down);
                    let label = self.builder.block_label(target);
                    self.builder.emit(Inst::Br { target: label });
                }
            }
        }
        Ok(())
    }

    fn lower_quad(
        &mut self,
        graph: &mut FlowGraph,
        block: BlockId,
        quads: &[Quad],
        i: usize,
    ) -> TranslateResult<()> {
        let Quad { kind, span } = &quads[i];
        let span = *span;

        match kind {
            QuadKind::GlobalAlloc { name, .. } => {
                let id = self.sym(name, Some(Scope::Global), span)?;
                let sym = self.table.symbol(id);
                let ty = cell_ty(sym.ty, sym.numelem);
                self.builder.declare_global(name, ty.clone());
                let sym = self.table.symbol_mut(id);
                sym.lty = Some(ty);
                sym.ir = Some(Value::Global(name.clone()));
                return Ok(());
            }
            QuadKind::FuncBegin { name, ty } => {
                let ret = elem_ty(*ty);
                let mut params = Vec::new();
                for quad in &quads[i + 1..] {
                    let QuadKind::FormalAlloc { name, ty, .. } = &quad.kind else {
                        break;
                    };
                    params.push((name.clone(), elem_ty(*ty)));
                }
                let entry = self.builder.begin_function(name.clone(), ret, params);
                graph.block_mut(block).ir_block = Some(entry);
                self.func_open = true;
                return Ok(());
            }
            _ => {}
        }

        if !self.func_open {
            return Err(TranslateError::structural(
                "instruction before function header",
                span,
            ));
        }

        match kind {
            QuadKind::GlobalAlloc { .. } | QuadKind::FuncBegin { .. } => unreachable!(),

            // Formals live in address cells initialized from the
            // incoming argument.
            QuadKind::FormalAlloc { name, .. } => {
                let id = self.sym(name, Some(Scope::Param), span)?;
                let ty = elem_ty(self.table.symbol(id).ty);
                let slot = Reg(format!("{name}.addr"));
                self.builder.emit(Inst::Alloca {
                    dst: slot.clone(),
                    ty: ty.clone(),
                });
                self.builder.emit(Inst::Store {
                    ty: ty.clone(),
                    val: Value::Reg(Reg(name.clone())),
                    addr: Value::Reg(slot.clone()),
                });
                let sym = self.table.symbol_mut(id);
                sym.lty = Some(ty);
                sym.ir = Some(Value::Reg(slot));
            }

            // Local arrays are sized by element count and not
            // zero-initialized.
            QuadKind::LocalAlloc { name, .. } => {
                let id = self.sym(name, Some(Scope::Local), span)?;
                let sym = self.table.symbol(id);
                let ty = cell_ty(sym.ty, sym.numelem);
                let slot = Reg(name.clone());
                self.builder.emit(Inst::Alloca {
                    dst: slot.clone(),
                    ty: ty.clone(),
                });
                let sym = self.table.symbol_mut(id);
                sym.lty = Some(ty);
                sym.ir = Some(Value::Reg(slot));
            }

            QuadKind::LocalRef { dest, name, .. } => {
                self.lower_ref(dest, name, Scope::Local, span)?;
            }
            QuadKind::ParamRef { dest, name, .. } => {
                self.lower_ref(dest, name, Scope::Param, span)?;
            }
            QuadKind::GlobalRef { dest, name } => {
                self.lower_ref(dest, name, Scope::Global, span)?;
            }

            QuadKind::Assign { dest, value } => match value {
                Operand::Int(v) => self.bind(dest, Ty::I32, Value::Int(*v)),
                Operand::Float(v) => self.bind(dest, Ty::F64, Value::Double(*v)),
                Operand::Name(name) => {
                    let id = self
                        .table
                        .lookup(name, None)
                        .ok_or_else(|| TranslateError::unresolved(name, span))?;
                    let sym = self.table.symbol(id);
                    if sym.width != 0 && !sym.ty.contains(TypeFlags::ARRAY) {
                        // a declared scalar cell: read through its address
                        let ty = elem_ty(sym.ty);
                        let addr = sym
                            .ir
                            .clone()
                            .ok_or_else(|| TranslateError::unresolved(name, span))?;
                        let dst = self.builder.new_temp();
                        self.builder.emit(Inst::Load {
                            dst: dst.clone(),
                            ty: ty.clone(),
                            addr,
                        });
                        self.bind(dest, ty, Value::Reg(dst));
                    } else {
                        let (ty, v) = self.value_of(name, span)?;
                        self.bind(dest, ty, v);
                    }
                }
            },

            QuadKind::Unary {
                dest,
                op,
                suffix,
                operand,
            } => {
                let (_, v) = self.value_of(operand, span)?;
                let dst = self.builder.new_temp();
                match (op, suffix) {
                    (UnOp::Neg, OpType::Int) => self.builder.emit(Inst::Bin {
                        dst: dst.clone(),
                        op: ir::BinOp::Sub,
                        ty: Ty::I32,
                        lhs: Value::Int(0),
                        rhs: v,
                    }),
                    (UnOp::Neg, OpType::Float) => self.builder.emit(Inst::FNeg {
                        dst: dst.clone(),
                        src: v,
                    }),
                    // bitwise not is integer regardless of suffix
                    (UnOp::BitNot, _) => self.builder.emit(Inst::Bin {
                        dst: dst.clone(),
                        op: ir::BinOp::Xor,
                        ty: Ty::I32,
                        lhs: v,
                        rhs: Value::Int(-1),
                    }),
                }
                let ty = match (op, suffix) {
                    (UnOp::Neg, OpType::Float) => Ty::F64,
                    _ => Ty::I32,
                };
                self.bind(dest, ty, Value::Reg(dst));
            }

            QuadKind::Binary {
                dest,
                lhs,
                op,
                suffix,
                rhs,
            } => {
                let (_, lhs) = self.value_of(lhs, span)?;
                let (_, rhs) = self.value_of(rhs, span)?;
                let dst = self.builder.new_temp();
                if op.is_comparison() {
                    let cond = cmp_op(*op);
                    match suffix {
                        OpType::Int => self.builder.emit(Inst::Icmp {
                            dst: dst.clone(),
                            cond,
                            lhs,
                            rhs,
                        }),
                        OpType::Float => self.builder.emit(Inst::Fcmp {
                            dst: dst.clone(),
                            cond,
                            lhs,
                            rhs,
                        }),
                    }
                    self.bind(dest, Ty::I1, Value::Reg(dst));
                } else {
                    let (op, ty) = arith_op(*op, *suffix);
                    self.builder.emit(Inst::Bin {
                        dst: dst.clone(),
                        op,
                        ty: ty.clone(),
                        lhs,
                        rhs,
                    });
                    self.bind(dest, ty, Value::Reg(dst));
                }
            }

            QuadKind::Store {
                dest,
                addr,
                suffix,
                value,
            } => {
                let (_, addr) = self.value_of(addr, span)?;
                let (_, val) = self.value_of(value, span)?;
                let ty = suffix_ty(*suffix);
                self.builder.emit(Inst::Store {
                    ty: ty.clone(),
                    val: val.clone(),
                    addr,
                });
                // dest keeps the stored value's identity
                self.bind(dest, ty, val);
            }

            QuadKind::Load { dest, suffix, addr } => {
                let (_, addr) = self.value_of(addr, span)?;
                let ty = suffix_ty(*suffix);
                let dst = self.builder.new_temp();
                self.builder.emit(Inst::Load {
                    dst: dst.clone(),
                    ty: ty.clone(),
                    addr,
                });
                self.bind(dest, ty, Value::Reg(dst));
            }

            QuadKind::ArrayIndex { dest, base, index } => {
                let (base_ty, base) = self.value_of(base, span)?;
                let Ty::Arr { elem, len } = base_ty else {
                    return Err(TranslateError::malformed(
                        "indexing a non-array base",
                        span,
                    ));
                };
                let (_, index) = self.value_of(index, span)?;
                let dst = self.builder.new_temp();
                self.builder.emit(Inst::Gep {
                    dst: dst.clone(),
                    elem: *elem,
                    len,
                    base,
                    index,
                });
                self.bind(dest, Ty::Ptr, Value::Reg(dst));
            }

            QuadKind::Conv { dest, kind, src } => {
                let (_, src) = self.value_of(src, span)?;
                let dst = self.builder.new_temp();
                let ty = match kind {
                    ConvKind::ToFloat => {
                        self.builder.emit(Inst::Sitofp {
                            dst: dst.clone(),
                            src,
                        });
                        Ty::F64
                    }
                    ConvKind::ToInt => {
                        self.builder.emit(Inst::Fptosi {
                            dst: dst.clone(),
                            src,
                        });
                        Ty::I32
                    }
                };
                self.bind(dest, ty, Value::Reg(dst));
            }

            QuadKind::Call {
                dest, callee, args, ..
            } => {
                let id = self
                    .table
                    .lookup(callee, Some(Scope::Global))
                    .ok_or_else(|| TranslateError::unresolved(callee, span))?;
                let callee_ty = self.table.symbol(id).ty;
                if !callee_ty.contains(TypeFlags::PROC) {
                    return Err(TranslateError::malformed(
                        format!("call to non-procedure '{callee}'"),
                        span,
                    ));
                }
                let ret = if callee_ty.contains(TypeFlags::INT) {
                    Ty::I32
                } else if callee_ty.contains(TypeFlags::DOUBLE) {
                    Ty::F64
                } else {
                    Ty::Void
                };

                let mut vals = Vec::with_capacity(args.len());
                for arg in args {
                    vals.push(self.value_of(arg, span)?);
                }

                let dst = if ret == Ty::Void {
                    None
                } else {
                    Some(self.builder.new_temp())
                };
                self.builder.emit(Inst::Call {
                    dst: dst.clone(),
                    ret: ret.clone(),
                    callee: callee.clone(),
                    args: vals,
                });
                if let Some(dst) = dst {
                    self.bind(dest, ret, Value::Reg(dst));
                }
            }

            QuadKind::StringLit { dest, text } => {
                let label = self.builder.global_string(&unescape(text));
                self.bind(dest, Ty::Ptr, Value::Global(label));
            }

            QuadKind::CondBranch {
                cond,
                true_target,
                false_target,
            } => {
                let (_, cond) = self.value_of(cond, span)?;
                let then_label = self.target_label(graph, true_target, span)?;
                let else_label = self.target_label(graph, false_target, span)?;
                self.builder.emit(Inst::CondBr {
                    cond,
                    then_label,
                    else_label,
                });
            }

            QuadKind::Jump { target } => {
                // a preceding terminator already transferred control
                if i > 0
                    && matches!(
                        quads[i - 1].kind,
                        QuadKind::Return { .. } | QuadKind::CondBranch { .. }
                    )
                {
                    return Ok(());
                }
                let label = self.target_label(graph, target, span)?;
                self.builder.emit(Inst::Br { target: label });
            }

            QuadKind::Return { suffix, value } => {
                let (_, val) = self.value_of(value, span)?;
                self.builder.emit(Inst::Ret {
                    ty: suffix_ty(*suffix),
                    val: Some(val),
                });
            }
        }

        Ok(())
    }

    /// A scoped reference binds the destination to the referenced
    /// cell's address at the referenced scope.
    fn lower_ref(
        &mut self,
        dest: &str,
        name: &str,
        scope: Scope,
        span: Span,
    ) -> TranslateResult<()> {
        let id = self.sym(name, Some(scope), span)?;
        let sym = self.table.symbol(id);
        let (lty, ir) = (sym.lty.clone(), sym.ir.clone());
        let dest_id = self.table.install(dest, scope);
        let dest_sym = self.table.symbol_mut(dest_id);
        dest_sym.lty = lty;
        dest_sym.ir = ir;
        Ok(())
    }

    /// The IR block for a graph block, created on first reference and
    /// named after the block's label (or its ordinal when unlabeled).
    fn ir_block_for(&mut self, graph: &mut FlowGraph, id: BlockId) -> ir::BlockRef {
        if let Some(blk) = graph.block(id).ir_block {
            return blk;
        }
        let name = match &graph.block(id).label {
            Some(label) => label.clone(),
            None => format!("bb{}", graph.block(id).num),
        };
        let blk = self.builder.add_block(name);
        graph.block_mut(id).ir_block = Some(blk);
        blk
    }

    fn target_label(
        &mut self,
        graph: &mut FlowGraph,
        target: &str,
        span: Span,
    ) -> TranslateResult<String> {
        let id = graph
            .find_target(target)
            .ok_or_else(|| TranslateError::bad_target(target, span))?;
        let blk = self.ir_block_for(graph, id);
        Ok(self.builder.block_label(blk))
    }

    fn sym(
        &self,
        name: &str,
        scope: Option<Scope>,
        span: Span,
    ) -> TranslateResult<crate::sema::SymId> {
        self.table
            .lookup(name, scope)
            .ok_or_else(|| TranslateError::unresolved(name, span))
    }

    fn value_of(&self, name: &str, span: Span) -> TranslateResult<(Ty, Value)> {
        let id = self.sym(name, None, span)?;
        let sym = self.table.symbol(id);
        match (sym.lty.clone(), sym.ir.clone()) {
            (Some(ty), Some(v)) => Ok((ty, v)),
            _ => Err(TranslateError::unresolved(name, span)),
        }
    }

    /// Install `dest` as a fresh lowering-time binding.
    fn bind(&mut self, dest: &str, ty: Ty, value: Value) {
        let id = self.table.install(dest, Scope::Local);
        let sym = self.table.symbol_mut(id);
        sym.lty = Some(ty);
        sym.ir = Some(value);
    }
}

fn elem_ty(ty: TypeFlags) -> Ty {
    if ty.contains(TypeFlags::INT) {
        Ty::I32
    } else {
        Ty::F64
    }
}

fn cell_ty(ty: TypeFlags, numelem: u32) -> Ty {
    if ty.contains(TypeFlags::ARRAY) {
        Ty::Arr {
            elem: Box::new(elem_ty(ty)),
            len: numelem,
        }
    } else {
        elem_ty(ty)
    }
}

fn suffix_ty(suffix: OpType) -> Ty {
    match suffix {
        OpType::Int => Ty::I32,
        OpType::Float => Ty::F64,
    }
}

fn cmp_op(op: BinOp) -> ir::CmpOp {
    match op {
        BinOp::Eq => ir::CmpOp::Eq,
        BinOp::Ne => ir::CmpOp::Ne,
        BinOp::Lt => ir::CmpOp::Lt,
        BinOp::Le => ir::CmpOp::Le,
        BinOp::Gt => ir::CmpOp::Gt,
        BinOp::Ge => ir::CmpOp::Ge,
        _ => unreachable!("not a comparison"),
    }
}

/// Arithmetic operators dispatch on the type suffix; shifts and
/// bitwise operators are always integer-typed.
fn arith_op(op: BinOp, suffix: OpType) -> (ir::BinOp, Ty) {
    match (op, suffix) {
        (BinOp::Add, OpType::Int) => (ir::BinOp::Add, Ty::I32),
        (BinOp::Add, OpType::Float) => (ir::BinOp::FAdd, Ty::F64),
        (BinOp::Sub, OpType::Int) => (ir::BinOp::Sub, Ty::I32),
        (BinOp::Sub, OpType::Float) => (ir::BinOp::FSub, Ty::F64),
        (BinOp::Mul, OpType::Int) => (ir::BinOp::Mul, Ty::I32),
        (BinOp::Mul, OpType::Float) => (ir::BinOp::FMul, Ty::F64),
        (BinOp::Div, OpType::Int) => (ir::BinOp::SDiv, Ty::I32),
        (BinOp::Div, OpType::Float) => (ir::BinOp::FDiv, Ty::F64),
        (BinOp::Mod, OpType::Int) => (ir::BinOp::SRem, Ty::I32),
        (BinOp::Mod, OpType::Float) => (ir::BinOp::FRem, Ty::F64),
        (BinOp::And, _) => (ir::BinOp::And, Ty::I32),
        (BinOp::Or, _) => (ir::BinOp::Or, Ty::I32),
        (BinOp::Shl, _) => (ir::BinOp::Shl, Ty::I32),
        (BinOp::Shr, _) => (ir::BinOp::LShr, Ty::I32),
        _ => unreachable!("comparisons are dispatched separately"),
    }
}

/// Unescape the sequences the wire format recognizes inside string
/// literals. Unrecognized escapes are kept raw.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\u{0c}'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

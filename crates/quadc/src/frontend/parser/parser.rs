//! Parser turning input lines into tagged quadruples
//!
//! Each line is tokenized and recognized by one dispatch keyed on the
//! leading token and operand shape. Statement-boundary markers
//! (`bgnstmt`) are dropped here; labels, alias bindings and the `fend`
//! sentinel are reported as distinct line kinds for the CFG builder.

use super::super::lexer::{Token, TokenKind, tokenize};
use super::super::quad::{
    BinOp, CallKind, ConvKind, OpType, Operand, Quad, QuadKind, TypeFlags, UnOp,
};
use crate::common::{Span, TranslateError, TranslateResult};

/// One recognized input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// An instruction that belongs to a basic block.
    Quad(Quad),
    /// A `bt` line; its false target is the `br` on the next line.
    Branch {
        cond: String,
        target: String,
        span: Span,
    },
    /// `label <name>`
    Label { name: String, span: Span },
    /// `<pending>=<resolved>` forward-alias binding
    Alias {
        pending: String,
        resolved: String,
        span: Span,
    },
    /// `fend`
    FuncEnd { span: Span },
}

/// Pulls recognized lines off the input stream.
pub struct LineParser<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> LineParser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, offset: 0 }
    }

    /// The next recognized line, or `None` at end of input. Blank
    /// lines and statement-boundary markers are skipped.
    pub fn next_line(&mut self) -> TranslateResult<Option<Line>> {
        while self.offset < self.source.len() {
            let rest = &self.source[self.offset..];
            let (line, consumed) = match rest.find('\n') {
                Some(pos) => (&rest[..pos], pos + 1),
                None => (rest, rest.len()),
            };
            let base = self.offset;
            self.offset += consumed;

            let span = Span::new(base, base + line.trim_end().len());
            let tokens = tokenize(line, base)?;
            if tokens.is_empty() {
                continue;
            }

            if let Some(parsed) = parse_line(&tokens, span)? {
                return Ok(Some(parsed));
            }
        }
        Ok(None)
    }
}

fn parse_line(tokens: &[Token], span: Span) -> TranslateResult<Option<Line>> {
    use TokenKind::*;

    let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
    let quad = |kind| Some(Line::Quad(Quad::new(kind, span)));

    let line = match kinds.as_slice() {
        [Ident(kw), Ident(name), IntLit(ty), IntLit(bytes)] if kw == "alloc" => {
            quad(QuadKind::GlobalAlloc {
                name: name.clone(),
                ty: type_flags(*ty, span)?,
                bytes: byte_count(*bytes, span)?,
            })
        }
        [Ident(kw), Ident(name), IntLit(ty), IntLit(bytes)] if kw == "localloc" => {
            quad(QuadKind::LocalAlloc {
                name: name.clone(),
                ty: type_flags(*ty, span)?,
                bytes: byte_count(*bytes, span)?,
            })
        }
        [Ident(kw), Ident(name), IntLit(ty), IntLit(bytes)] if kw == "formal" => {
            quad(QuadKind::FormalAlloc {
                name: name.clone(),
                ty: type_flags(*ty, span)?,
                bytes: byte_count(*bytes, span)?,
            })
        }
        [Ident(kw), Ident(name), IntLit(ty)] if kw == "func" => quad(QuadKind::FuncBegin {
            name: name.clone(),
            ty: type_flags(*ty, span)?,
        }),
        [Ident(kw), Ident(name)] if kw == "label" => Some(Line::Label {
            name: name.clone(),
            span,
        }),
        [Ident(kw), Ident(target)] if kw == "br" => quad(QuadKind::Jump {
            target: target.clone(),
        }),
        [Ident(kw), Ident(cond), Ident(target)] if kw == "bt" => Some(Line::Branch {
            cond: cond.clone(),
            target: target.clone(),
            span,
        }),
        [Ident(kw), ..] if kw == "bgnstmt" => None,
        [Ident(kw), Ident(value)] if kw == "reti" => quad(QuadKind::Return {
            suffix: OpType::Int,
            value: value.clone(),
        }),
        [Ident(kw), Ident(value)] if kw == "retf" => quad(QuadKind::Return {
            suffix: OpType::Float,
            value: value.clone(),
        }),
        [Ident(kw)] if kw == "fend" => Some(Line::FuncEnd { span }),
        [AliasPair(pair)] => {
            let (pending, resolved) = pair
                .split_once('=')
                .expect("alias token always carries '='");
            Some(Line::Alias {
                pending: pending.to_string(),
                resolved: resolved.to_string(),
                span,
            })
        }
        [Ident(dest), ColonEq, rest @ ..] => quad(parse_rhs(dest, rest, span)?),
        _ => {
            return Err(TranslateError::malformed(
                "unrecognized quadruple shape",
                span,
            ));
        }
    };

    Ok(line)
}

/// Recognize the right-hand side of a `<dest> := ...` line.
fn parse_rhs(dest: &str, rest: &[&TokenKind], span: Span) -> TranslateResult<QuadKind> {
    use TokenKind::*;

    let dest = dest.to_string();
    let kind = match rest {
        [Ident(kw), Ident(name), IntLit(offset)] if kw == "local" => QuadKind::LocalRef {
            dest,
            name: name.clone(),
            offset: *offset,
        },
        [Ident(kw), Ident(name), IntLit(offset)] if kw == "param" => QuadKind::ParamRef {
            dest,
            name: name.clone(),
            offset: *offset,
        },
        [Ident(kw), Ident(name)] if kw == "global" => QuadKind::GlobalRef {
            dest,
            name: name.clone(),
        },
        [Ident(kw), Ident(callee), call_rest @ ..] if kw == "fi" || kw == "ff" => QuadKind::Call {
            dest,
            kind: if kw == "fi" {
                CallKind::Int
            } else {
                CallKind::Float
            },
            callee: callee.clone(),
            args: parse_call_args(call_rest, span)?,
        },
        [Ident(kw), Ident(src)] if kw == "cvi" => QuadKind::Conv {
            dest,
            kind: ConvKind::ToInt,
            src: src.clone(),
        },
        [Ident(kw), Ident(src)] if kw == "cvf" => QuadKind::Conv {
            dest,
            kind: ConvKind::ToFloat,
            src: src.clone(),
        },
        [Str(text)] => QuadKind::StringLit {
            dest,
            text: text.clone(),
        },
        [IntLit(value)] => QuadKind::Assign {
            dest,
            value: Operand::Int(*value),
        },
        [FloatLit(value)] => QuadKind::Assign {
            dest,
            value: Operand::Float(*value),
        },
        [Ident(name)] => QuadKind::Assign {
            dest,
            value: Operand::Name(name.clone()),
        },
        [Op(op), Ident(operand)] => parse_prefix_op(dest, op, operand, span)?,
        [Ident(base), Subscript, Ident(index)] => QuadKind::ArrayIndex {
            dest,
            base: base.clone(),
            index: index.clone(),
        },
        [Ident(lhs), Op(op), Ident(rhs)] => {
            let (body, suffix) = split_suffix(op, span)?;
            if body == "=" {
                QuadKind::Store {
                    dest,
                    addr: lhs.clone(),
                    suffix,
                    value: rhs.clone(),
                }
            } else {
                QuadKind::Binary {
                    dest,
                    lhs: lhs.clone(),
                    op: binary_op(body, span)?,
                    suffix,
                    rhs: rhs.clone(),
                }
            }
        }
        _ => {
            return Err(TranslateError::malformed(
                "unrecognized quadruple shape",
                span,
            ));
        }
    };

    Ok(kind)
}

/// `@i`/`@f` loads and the unary operators `-` and `~`.
fn parse_prefix_op(dest: String, op: &str, operand: &str, span: Span) -> TranslateResult<QuadKind> {
    let (body, suffix) = split_suffix(op, span)?;
    let kind = match body {
        "@" => QuadKind::Load {
            dest,
            suffix,
            addr: operand.to_string(),
        },
        "-" => QuadKind::Unary {
            dest,
            op: UnOp::Neg,
            suffix,
            operand: operand.to_string(),
        },
        "~" => QuadKind::Unary {
            dest,
            op: UnOp::BitNot,
            suffix,
            operand: operand.to_string(),
        },
        _ => {
            return Err(TranslateError::malformed(
                format!("unknown operator '{op}'"),
                span,
            ));
        }
    };
    Ok(kind)
}

/// `[<argcount> <args...>]` after the callee; no count means no args.
fn parse_call_args(rest: &[&TokenKind], span: Span) -> TranslateResult<Vec<String>> {
    use TokenKind::*;

    match rest {
        [] => Ok(Vec::new()),
        [IntLit(count), names @ ..] => {
            let count = usize::try_from(*count).map_err(|_| {
                TranslateError::malformed("negative argument count", span)
            })?;
            if names.len() < count {
                return Err(TranslateError::malformed(
                    format!("call names {count} arguments but {} follow", names.len()),
                    span,
                ));
            }
            names[..count]
                .iter()
                .map(|t| match t {
                    Ident(name) => Ok(name.to_string()),
                    _ => Err(TranslateError::malformed("expected argument name", span)),
                })
                .collect()
        }
        _ => Err(TranslateError::malformed("expected argument count", span)),
    }
}

/// Split `<op><suffix>` into the operator body and its type suffix.
fn split_suffix(op: &str, span: Span) -> TranslateResult<(&str, OpType)> {
    let (body, last) = op.split_at(op.len() - 1);
    let suffix = match last {
        "i" => OpType::Int,
        "f" => OpType::Float,
        _ => {
            return Err(TranslateError::malformed(
                format!("operator '{op}' lacks a type suffix"),
                span,
            ));
        }
    };
    Ok((body, suffix))
}

fn binary_op(body: &str, span: Span) -> TranslateResult<BinOp> {
    let op = match body {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        "&" => BinOp::And,
        "|" => BinOp::Or,
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        _ => {
            return Err(TranslateError::malformed(
                format!("unknown binary operator '{body}'"),
                span,
            ));
        }
    };
    Ok(op)
}

fn type_flags(bits: i64, span: Span) -> TranslateResult<TypeFlags> {
    u32::try_from(bits)
        .map(TypeFlags)
        .map_err(|_| TranslateError::malformed("negative type mask", span))
}

fn byte_count(bytes: i64, span: Span) -> TranslateResult<u32> {
    u32::try_from(bytes).map_err(|_| TranslateError::malformed("negative byte size", span))
}

//! Token definitions for quadruple lines

use crate::common::Span;
use logos::Logos;

/// Token with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All token kinds appearing on a quadruple line.
///
/// Operator tokens carry their type suffix (`+i`, `==f`, `@i`, `=i`);
/// the parser splits them. An alias binding is a single token with an
/// embedded `=` and no surrounding whitespace.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
pub enum TokenKind {
    #[token(":=")]
    ColonEq,

    // Array subscript marker, optionally type-suffixed
    #[regex(r"\[[if]?\]")]
    Subscript,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*=[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    AliasPair(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse().ok())]
    FloatLit(f64),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse().ok())]
    IntLit(i64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    // Suffixed operator: +i -f *i /i %i |i &i ==i !=f <i <=f >i >=f <<i >>i =i @f ~i
    #[regex(r"[-+*/%|&~@=!<>]+[if]", |lex| lex.slice().to_string())]
    Op(String),
}

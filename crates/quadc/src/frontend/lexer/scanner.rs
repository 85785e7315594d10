//! Tokenizer implementation using logos

use super::token::{Token, TokenKind};
use crate::common::{Span, TranslateError, TranslateResult};
use logos::Logos;

/// Tokenize one input line. `base` is the byte offset of the line in
/// the whole stream, so token spans address the original input.
pub fn tokenize(line: &str, base: usize) -> TranslateResult<Vec<Token>> {
    let mut lexer = TokenKind::lexer(line);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(kind) => tokens.push(Token::new(kind, Span::new(span.start, span.end).offset(base))),
            Err(()) => {
                return Err(TranslateError::malformed(
                    format!("unexpected character '{}'", lexer.slice()),
                    Span::new(span.start, span.end).offset(base),
                ));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize(line, 0)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_alloc_line() {
        assert_eq!(
            kinds("alloc x 1 4"),
            vec![
                TokenKind::Ident("alloc".into()),
                TokenKind::Ident("x".into()),
                TokenKind::IntLit(1),
                TokenKind::IntLit(4),
            ]
        );
    }

    #[test]
    fn test_binary_op_line() {
        assert_eq!(
            kinds("t3 := t1 +i t2"),
            vec![
                TokenKind::Ident("t3".into()),
                TokenKind::ColonEq,
                TokenKind::Ident("t1".into()),
                TokenKind::Op("+i".into()),
                TokenKind::Ident("t2".into()),
            ]
        );
    }

    #[test]
    fn test_suffixed_operators() {
        assert_eq!(kinds("==f")[0], TokenKind::Op("==f".into()));
        assert_eq!(kinds(">=i")[0], TokenKind::Op(">=i".into()));
        assert_eq!(kinds("<<i")[0], TokenKind::Op("<<i".into()));
        assert_eq!(kinds("@i")[0], TokenKind::Op("@i".into()));
        assert_eq!(kinds("=f")[0], TokenKind::Op("=f".into()));
        assert_eq!(kinds("~i")[0], TokenKind::Op("~i".into()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("-5")[0], TokenKind::IntLit(-5));
        assert_eq!(kinds("3.5")[0], TokenKind::FloatLit(3.5));
        assert_eq!(kinds("-2.25")[0], TokenKind::FloatLit(-2.25));
    }

    #[test]
    fn test_alias_pair_is_one_token() {
        assert_eq!(kinds("L12=L13"), vec![TokenKind::AliasPair("L12=L13".into())]);
    }

    #[test]
    fn test_string_literal_keeps_escapes_raw() {
        assert_eq!(
            kinds(r#"t1 := "hi\n""#),
            vec![
                TokenKind::Ident("t1".into()),
                TokenKind::ColonEq,
                TokenKind::Str(r"hi\n".into()),
            ]
        );
    }

    #[test]
    fn test_subscript() {
        assert_eq!(kinds("[]")[0], TokenKind::Subscript);
        assert_eq!(kinds("[i]")[0], TokenKind::Subscript);
    }

    #[test]
    fn test_unexpected_character() {
        assert!(tokenize("t1 := ?", 0).is_err());
    }
}

//! A streaming tokenizer for LOL source
//!
//! The tokenizer is a small finite-state automaton fed one byte at a time.
//! Bytes are appended to the [`Source`] buffer before they are fed, so a
//! token is nothing but an offset into that buffer plus a kind; the lexeme
//! is recovered later by re-scanning. This keeps the token stream and the
//! AST free of owned strings.

use crate::core::{Error, Source, Token, TokenKind};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Normal,
    Symbol,
    Str,
    StrEscape,
    Comment,
}

pub struct Tokenizer {
    state: State,
    tokens: Vec<Token>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer { state: State::Normal, tokens: Vec::new() }
    }
}

impl Tokenizer {
    /// Process the byte at `at`, which must already be in the buffer.
    pub fn feed(&mut self, source: &Source, at: u32) -> Result<(), Error> {
        let b = match source.byte(at) {
            Some(b) => b,
            None => return Ok(()),
        };

        match self.state {
            State::Normal => self.normal(source, at, b),
            State::Symbol => {
                if Source::is_symbol_byte(b) {
                    Ok(())
                } else {
                    // The delimiter is not part of the symbol; hand the same
                    // byte back to the normal state.
                    self.state = State::Normal;
                    self.normal(source, at, b)
                }
            }
            State::Str => {
                match b {
                    b'\\' => self.state = State::StrEscape,
                    b'"' => self.state = State::Normal,
                    _ => {}
                }
                Ok(())
            }
            State::StrEscape => {
                // One escaped character, no matter which.
                self.state = State::Str;
                Ok(())
            }
            State::Comment => {
                if b == b'\r' || b == b'\n' {
                    self.state = State::Normal;
                }
                Ok(())
            }
        }
    }

    fn normal(&mut self, source: &Source, at: u32, b: u8) -> Result<(), Error> {
        match b {
            b'"' => {
                self.tokens.push(Token { index: at, kind: TokenKind::Str });
                self.state = State::Str;
            }
            b'(' => self.tokens.push(Token { index: at, kind: TokenKind::LeftParen }),
            b')' => self.tokens.push(Token { index: at, kind: TokenKind::RightParen }),
            b' ' | b'\t' | b'\r' | b'\n' => {}
            b';' => self.state = State::Comment,
            _ if Source::is_symbol_byte(b) => {
                self.tokens.push(Token { index: at, kind: TokenKind::Symbol });
                self.state = State::Symbol;
            }
            _ => {
                let (line, column) = source.position(at);
                return Err(Error::UnexpectedChar {
                    ch: b as char,
                    line,
                    column,
                    text: source.line_text(at).to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }
}

/// Tokenize everything currently in the buffer.
pub fn tokenize(source: &Source) -> Result<Vec<Token>, Error> {
    let mut t = Tokenizer::default();
    for at in 0..source.len() {
        t.feed(source, at)?;
    }
    Ok(t.into_tokens())
}

/// One line per token, for the stderr dump.
pub fn describe(source: &Source, token: &Token) -> String {
    match token.kind {
        TokenKind::LeftParen => format!("l_paren @ {}", token.index),
        TokenKind::RightParen => format!("r_paren @ {}", token.index),
        TokenKind::Symbol => {
            format!("symbol @ {} {}", token.index, source.symbol_at(token.index))
        }
        TokenKind::Str => {
            format!("string @ {} \"{}\"", token.index, source.string_at(token.index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TokenKind::*;
    use pretty_assertions::assert_eq;

    fn kinds(program: &str) -> Vec<TokenKind> {
        let source = Source::new(program);
        tokenize(&source).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn parens_and_symbols() {
        let source = Source::new("(+ x 1)");
        let tokens = tokenize(&source).unwrap();

        assert_eq!(
            tokens,
            vec![
                Token { index: 0, kind: LeftParen },
                Token { index: 1, kind: Symbol },
                Token { index: 3, kind: Symbol },
                Token { index: 5, kind: Symbol },
                Token { index: 6, kind: RightParen },
            ]
        );
    }

    #[test]
    fn delimiters_are_not_eaten() {
        // The closing paren right after a symbol must still come through.
        assert_eq!(kinds("(ab)"), vec![LeftParen, Symbol, RightParen]);
        assert_eq!(kinds("a(b"), vec![Symbol, LeftParen, Symbol]);
    }

    #[test]
    fn symbol_charset() {
        assert_eq!(kinds("a+b-c=d<e"), vec![Symbol]);
        assert_eq!(kinds("-42"), vec![Symbol]);
    }

    #[test]
    fn whitespace() {
        assert_eq!(kinds(" \t\r\n(  )"), vec![LeftParen, RightParen]);
    }

    #[test]
    fn strings() {
        let source = Source::new(r#"("hi" "a \" b")"#);
        let tokens = tokenize(&source).unwrap();

        assert_eq!(tokens[1], Token { index: 1, kind: Str });
        assert_eq!(tokens[2], Token { index: 6, kind: Str });
        assert_eq!(source.string_at(6), r#"a \" b"#);
    }

    #[test]
    fn comments() {
        assert_eq!(kinds("; nothing here (at all)\nx"), vec![Symbol]);
        assert_eq!(kinds("x ; trailing"), vec![Symbol]);
        // CR terminates a comment just like LF
        assert_eq!(kinds(";c\r(x)"), vec![LeftParen, Symbol, RightParen]);
    }

    #[test]
    fn unexpected_char() {
        let source = Source::new("(let (x @ 1) x)");
        match tokenize(&source) {
            Err(Error::UnexpectedChar { ch, line, column, text }) => {
                assert_eq!(ch, '@');
                assert_eq!(line, 1);
                assert_eq!(column, 9);
                assert_eq!(text, "(let (x @ 1) x)");
            }
            other => panic!("expected a tokenizer error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn error_positions_count_lines() {
        let source = Source::new("(let\n  (x @ 1)\n  x)");
        match tokenize(&source) {
            Err(Error::UnexpectedChar { line, column, text, .. }) => {
                assert_eq!((line, column), (2, 6));
                assert_eq!(text, "  (x @ 1)");
            }
            _ => panic!("expected a tokenizer error"),
        }
    }
}

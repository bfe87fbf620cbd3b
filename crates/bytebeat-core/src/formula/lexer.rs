//! Tokenizer for formula text.

use crate::error::CompileError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Ident(String),
    /// Operator or punctuation, longest match.
    Punct(&'static str),
    Eof,
}

/// A token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub pos: usize,
}

// Longest first, so a prefix never shadows a longer operator.
const PUNCTUATION: &[&str] = &[
    ">>>=", ">>>", "===", "!==", "**=", "<<=", ">>=", "**", "<<", ">>", "<=", ">=", "==", "!=",
    "=>", "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "+", "-", "*", "/", "%", "&",
    "|", "^", "~", "!", "<", ">", "=", "?", ":", ",", "(", ")",
];

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Skips whitespace, `// line` and `/* block */` comments.
    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match (self.peek_at(0), self.peek_at(1)) {
                (Some(b), _) if b.is_ascii_whitespace() => self.pos += 1,
                (Some(b'/'), Some(b'/')) => {
                    while let Some(b) = self.peek_at(0) {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match (self.peek_at(0), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => {
                                return Err(CompileError::syntax(start, "unterminated comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, CompileError> {
        self.skip_trivia()?;
        let pos = self.pos;
        let Some(b) = self.peek_at(0) else {
            return Ok(Spanned {
                token: Token::Eof,
                pos,
            });
        };

        let token = if b.is_ascii_digit()
            || (b == b'.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
        {
            self.number()?
        } else if is_ident_start(b) {
            while self.peek_at(0).is_some_and(is_ident_continue) {
                self.pos += 1;
            }
            // Identifier bytes are ASCII by construction.
            let name = String::from_utf8_lossy(&self.input[pos..self.pos]).into_owned();
            Token::Ident(name)
        } else {
            let rest = &self.input[self.pos..];
            let Some(p) = PUNCTUATION
                .iter()
                .copied()
                .find(|p| rest.starts_with(p.as_bytes()))
            else {
                let ch = std::str::from_utf8(rest)
                    .ok()
                    .and_then(|s| s.chars().next())
                    .unwrap_or(b as char);
                return Err(CompileError::syntax(
                    pos,
                    format!("unexpected character '{ch}'"),
                ));
            };
            self.pos += p.len();
            Token::Punct(p)
        };

        Ok(Spanned { token, pos })
    }

    /// Collects digits of the given radix, allowing `_` only between two digits.
    fn digits(&mut self, radix: u32) -> Result<String, CompileError> {
        let mut out = String::new();
        while let Some(b) = self.peek_at(0) {
            let c = b as char;
            if c.is_digit(radix) {
                out.push(c);
                self.pos += 1;
            } else if c == '_' {
                let next_ok = self.peek_at(1).is_some_and(|n| (n as char).is_digit(radix));
                if out.is_empty() || !next_ok {
                    return Err(CompileError::syntax(self.pos, "misplaced numeric separator"));
                }
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn number(&mut self) -> Result<Token, CompileError> {
        let start = self.pos;
        let radix = match (self.peek_at(0), self.peek_at(1).map(|b| b.to_ascii_lowercase())) {
            (Some(b'0'), Some(b'x')) => Some(16),
            (Some(b'0'), Some(b'b')) => Some(2),
            (Some(b'0'), Some(b'o')) => Some(8),
            _ => None,
        };

        let value = if let Some(radix) = radix {
            self.pos += 2;
            let digits = self.digits(radix)?;
            if digits.is_empty() {
                return Err(CompileError::syntax(start, "missing digits after radix prefix"));
            }
            digits
                .chars()
                .filter_map(|c| c.to_digit(radix))
                .fold(0.0_f64, |acc, d| acc * f64::from(radix) + f64::from(d))
        } else {
            let mut text = self.digits(10)?;
            if self.peek_at(0) == Some(b'.') {
                self.pos += 1;
                text.push('.');
                text.push_str(&self.digits(10)?);
            }
            if matches!(self.peek_at(0), Some(b'e' | b'E')) {
                let sign = self.peek_at(1);
                let has_sign = matches!(sign, Some(b'+' | b'-'));
                let exp_digit = self.peek_at(if has_sign { 2 } else { 1 });
                if exp_digit.is_some_and(|d| d.is_ascii_digit()) {
                    text.push('e');
                    self.pos += 1;
                    if has_sign {
                        text.push(sign.map_or('+', char::from));
                        self.pos += 1;
                    }
                    text.push_str(&self.digits(10)?);
                }
            }
            text.parse::<f64>()
                .map_err(|_| CompileError::syntax(start, format!("invalid number '{text}'")))?
        };

        if self.peek_at(0).is_some_and(is_ident_continue) {
            return Err(CompileError::syntax(
                self.pos,
                "identifier starts immediately after numeric literal",
            ));
        }
        Ok(Token::Number(value))
    }
}

/// Splits formula text into tokens, ending with [`Token::Eof`].
pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut lexer = Lexer {
        input: input.as_bytes(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn classic_bytebeat() {
        assert_eq!(
            kinds("t*(t>>5|t>>8)"),
            vec![
                Token::Ident("t".into()),
                Token::Punct("*"),
                Token::Punct("("),
                Token::Ident("t".into()),
                Token::Punct(">>"),
                Token::Number(5.0),
                Token::Punct("|"),
                Token::Ident("t".into()),
                Token::Punct(">>"),
                Token::Number(8.0),
                Token::Punct(")"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            kinds("a>>>=b"),
            vec![
                Token::Ident("a".into()),
                Token::Punct(">>>="),
                Token::Ident("b".into()),
                Token::Eof
            ]
        );
        assert_eq!(kinds("**")[0], Token::Punct("**"));
        assert_eq!(kinds("=>")[0], Token::Punct("=>"));
        assert_eq!(kinds("a>=b")[1], Token::Punct(">="));
        assert_eq!(kinds("!==")[0], Token::Punct("!=="));
    }

    #[test]
    fn number_forms() {
        assert_eq!(kinds("0xff")[0], Token::Number(255.0));
        assert_eq!(kinds("0b0011_0110")[0], Token::Number(54.0));
        assert_eq!(kinds("0o17")[0], Token::Number(15.0));
        assert_eq!(kinds("1.5")[0], Token::Number(1.5));
        assert_eq!(kinds(".25")[0], Token::Number(0.25));
        assert_eq!(kinds("1e3")[0], Token::Number(1000.0));
        assert_eq!(kinds("2.5E-1")[0], Token::Number(0.25));
        assert_eq!(kinds("1_000")[0], Token::Number(1000.0));
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(
            kinds("t // trailing\n & /* inline */ 255"),
            vec![
                Token::Ident("t".into()),
                Token::Punct("&"),
                Token::Number(255.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn division_is_not_a_comment() {
        assert_eq!(kinds("t/2")[1], Token::Punct("/"));
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = tokenize("  t + 1").unwrap();
        assert_eq!(tokens[0].pos, 2);
        assert_eq!(tokens[1].pos, 4);
        assert_eq!(tokens[2].pos, 6);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(tokenize("t # 1").is_err());
        assert!(tokenize("/* open").is_err());
        assert!(tokenize("0x").is_err());
        assert!(tokenize("1__0").is_err());
        assert!(tokenize("2t").is_err());
        assert!(tokenize("t ; t").is_err());
    }
}

// lexer.rs

use std::str::CharIndices;

use thiserror::Error;
use tracing::debug;

use crate::core::symbols::{decode, decode_name, is_alphabet, Role, SymbolTable};
use crate::core::token::{Token, TokenKind};

/// Lexer options.
#[derive(Debug, Clone, Default)]
pub struct LexerOptions {
    /// Accept a string literal that runs to end of input instead of failing.
    pub lenient_literals: bool,
}

/// Lexer error types with detailed location.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("Unexpected character {0:?} at {1}:{2}")]
    UnexpectedCharacter(char, usize, usize),
    #[error("Invalid number literal '{0}' at {1}:{2}")]
    InvalidNumber(String, usize, usize),
    #[error("Unterminated string starting at {0}:{1}")]
    UnterminatedString(usize, usize),
    #[error("Identifier escape not followed by a word at {0}:{1}")]
    DanglingEscape(usize, usize),
}

impl LexError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            LexError::UnexpectedCharacter(_, l, c)
            | LexError::InvalidNumber(_, l, c)
            | LexError::UnterminatedString(l, c)
            | LexError::DanglingEscape(l, c) => (*l, *c),
        }
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: CharIndices<'a>,
    current: Option<(usize, char)>,
    line: usize,
    col: usize,
    table: &'a SymbolTable,
    options: LexerOptions,
    consumed_eof: bool,
}

/// Tokenizes `source` with the standard table and default options.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_table(source, SymbolTable::standard(), LexerOptions::default())
    }

    pub fn with_options(source: &'a str, options: LexerOptions) -> Self {
        Self::with_table(source, SymbolTable::standard(), options)
    }

    pub fn with_table(source: &'a str, table: &'a SymbolTable, options: LexerOptions) -> Self {
        let mut lexer = Self {
            source,
            chars: source.char_indices(),
            current: None,
            line: 1,
            col: 0,
            table,
            options,
            consumed_eof: false,
        };
        lexer.advance_char();
        lexer
    }

    #[inline]
    fn pos(&self) -> (usize, usize) {
        (self.line, self.col)
    }

    #[inline]
    fn offset(&self) -> usize {
        self.current.map(|(i, _)| i).unwrap_or(self.source.len())
    }

    #[inline]
    fn advance_char(&mut self) {
        self.current = self.chars.next();
        if let Some((_, ch)) = self.current {
            if ch == '\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
        }
    }

    #[inline]
    fn is_word_char(&self, ch: char) -> bool {
        is_alphabet(ch) && !self.table.is_structural(ch)
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        if self.consumed_eof {
            return Ok(None);
        }
        loop {
            let ch = match self.current {
                Some((_, ch)) => ch,
                None => {
                    self.consumed_eof = true;
                    let (line, col) = self.pos();
                    return Ok(Some(Token::new(
                        TokenKind::EndOfInput,
                        String::new(),
                        self.source.len(),
                        line,
                        col.max(1),
                    )));
                }
            };

            if ch == self.table.comment {
                return self.lex_comment().map(Some);
            } else if ch == self.table.string_delimiter {
                return self.lex_string().map(Some);
            } else if ch == self.table.identifier_escape {
                return self.lex_escaped_identifier().map(Some);
            } else if is_alphabet(ch) {
                return self.lex_word().map(Some);
            } else if ch.is_whitespace() {
                self.advance_char();
                continue;
            } else {
                let (l, c) = self.pos();
                return Err(LexError::UnexpectedCharacter(ch, l, c));
            }
        }
    }

    /// Tokenizes the entire source; the last token is always `EndOfInput`.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            let is_eof = matches!(token.kind, TokenKind::EndOfInput);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        debug!(tokens = tokens.len(), table = self.table.version(), "tokenized");
        Ok(tokens)
    }

    fn read_word(&mut self) -> (usize, usize) {
        let start = self.offset();
        let mut count = 0;
        while let Some((_, ch)) = self.current {
            if !self.is_word_char(ch) {
                break;
            }
            count += 1;
            self.advance_char();
        }
        (start, count)
    }

    fn lex_word(&mut self) -> Result<Token, LexError> {
        let (line, col) = self.pos();
        let (start, count) = self.read_word();
        let raw = &self.source[start..self.offset()];
        let first = raw.chars().next().unwrap_or_default();

        let kind = if first == self.table.number_sign {
            self.number_value(raw, line, col)?
        } else if count == 1 {
            match self.table.role(first) {
                Some(Role::Keyword(k)) => TokenKind::Keyword(k),
                Some(Role::Operator(o)) => TokenKind::Operator(o),
                Some(Role::Delimiter(d)) => TokenKind::Delimiter(d),
                None => TokenKind::Identifier(decode_name(raw)),
            }
        } else {
            // Multi-cell words are names even when every cell is a keyword.
            TokenKind::Identifier(decode_name(raw))
        };
        Ok(Token::new(kind, raw.to_string(), start, line, col))
    }

    fn number_value(&self, raw: &str, line: usize, col: usize) -> Result<TokenKind, LexError> {
        let mut text = String::new();
        let mut has_decimal = false;
        for ch in raw.chars().skip(1) {
            if let Some(d) = self.table.digit(ch) {
                text.push((b'0' + d) as char);
            } else if ch == self.table.decimal_point && !has_decimal {
                has_decimal = true;
                text.push('.');
            } else {
                return Err(LexError::InvalidNumber(raw.to_string(), line, col));
            }
        }
        if !text.chars().any(|c| c.is_ascii_digit()) {
            return Err(LexError::InvalidNumber(raw.to_string(), line, col));
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| LexError::InvalidNumber(raw.to_string(), line, col))
    }

    fn lex_escaped_identifier(&mut self) -> Result<Token, LexError> {
        let (line, col) = self.pos();
        let start = self.offset();
        self.advance_char(); // consume escape
        while let Some((_, ch)) = self.current {
            if ch.is_whitespace() {
                self.advance_char();
            } else {
                break;
            }
        }
        let word_start = self.offset();
        let (_, count) = self.read_word();
        if count == 0 {
            return Err(LexError::DanglingEscape(line, col));
        }
        let word = &self.source[word_start..self.offset()];
        Ok(Token::new(
            TokenKind::Identifier(decode_name(word)),
            self.source[start..self.offset()].to_string(),
            start,
            line,
            col,
        ))
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        let (line, col) = self.pos();
        let start = self.offset();
        self.advance_char(); // consume opening delimiter
        let content_start = self.offset();
        while let Some((_, ch)) = self.current {
            if ch == self.table.string_delimiter {
                let content = decode(&self.source[content_start..self.offset()]);
                self.advance_char();
                return Ok(Token::new(
                    TokenKind::String(content),
                    self.source[start..self.offset()].to_string(),
                    start,
                    line,
                    col,
                ));
            }
            self.advance_char();
        }
        if self.options.lenient_literals {
            let content = decode(&self.source[content_start..]);
            return Ok(Token::new(
                TokenKind::String(content),
                self.source[start..].to_string(),
                start,
                line,
                col,
            ));
        }
        Err(LexError::UnterminatedString(line, col))
    }

    fn lex_comment(&mut self) -> Result<Token, LexError> {
        let (line, col) = self.pos();
        let start = self.offset();
        self.advance_char(); // consume comment symbol
        let content_start = self.offset();
        let mut content_end = self.source.len();
        while let Some((i, ch)) = self.current {
            if ch == '\n' {
                content_end = i;
                break;
            }
            if ch == self.table.comment {
                content_end = i;
                self.advance_char();
                break;
            }
            self.advance_char();
        }
        let text = decode(&self.source[content_start..content_end]);
        Ok(Token::new(
            TokenKind::Comment(text.trim().to_string()),
            self.source[start..self.offset()].to_string(),
            start,
            line,
            col,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbols::{encode, Keyword, Operator};

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn single_cells_resolve_roles() {
        let t = SymbolTable::standard();
        let src = t.spell("let x = 2");
        assert_eq!(
            kinds(&src),
            vec![
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Identifier("x".into()),
                TokenKind::Operator(Operator::Assign),
                TokenKind::Number(2.0),
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn string_and_comment_decode() {
        let t = SymbolTable::standard();
        let src = t.spell("print(\"hi there\") # done");
        let ks = kinds(&src);
        assert!(ks.contains(&TokenKind::String("hi there".into())));
        assert!(ks.contains(&TokenKind::Comment("done".into())));
    }

    #[test]
    fn comment_closed_by_repeated_symbol() {
        let src = format!("⣾{}⣾ {}", encode("note"), encode("y"));
        assert_eq!(
            kinds(&src),
            vec![
                TokenKind::Comment("note".into()),
                TokenKind::Identifier("y".into()),
                TokenKind::EndOfInput
            ]
        );
    }

    #[test]
    fn escape_forces_identifier_even_after_whitespace() {
        let t = SymbolTable::standard();
        let let_sym = t.symbol_of(Role::Keyword(Keyword::Let)).unwrap();
        let src = format!("⣽ {let_sym}");
        assert_eq!(
            kinds(&src)[0],
            TokenKind::Identifier(decode_name(&let_sym.to_string()))
        );
    }

    #[test]
    fn unterminated_string_strict_and_lenient() {
        let src = format!("⣿{}", encode("open"));
        assert_eq!(tokenize(&src), Err(LexError::UnterminatedString(1, 1)));
        let lenient = LexerOptions { lenient_literals: true };
        let toks = Lexer::with_options(&src, lenient).tokenize().unwrap();
        assert_eq!(toks[0].kind, TokenKind::String("open".into()));
    }

    #[test]
    fn bad_number_and_stray_character() {
        assert!(matches!(tokenize("⣼⡸"), Err(LexError::InvalidNumber(..))));
        assert!(matches!(tokenize("⣼"), Err(LexError::InvalidNumber(..))));
        assert_eq!(tokenize("a"), Err(LexError::UnexpectedCharacter('a', 1, 1)));
    }

    #[test]
    fn positions_track_lines() {
        let t = SymbolTable::standard();
        let src = t.spell("x\n  y");
        let toks = tokenize(&src).unwrap();
        assert_eq!((toks[0].line, toks[0].col, toks[0].offset), (1, 1, 0));
        assert_eq!((toks[1].line, toks[1].col), (2, 3));
    }
}

//! Symbol table v1: the braille cells U+2800..=U+28FF and the token roles
//! they play.
//!
//! - `encode`/`decode` → the byte ↔ cell bijection (cell = U+2800 + byte)
//! - `SymbolTable::standard()` → the immutable v1 table, built once
//! - `SymbolTable::spell(s)` → readable keyword spelling to cell source

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub const ALPHABET_START: u32 = 0x2800;
pub const ALPHABET_END: u32 = 0x28FF;
pub const TABLE_VERSION: u32 = 1;

const KEYWORD_BASE: u32 = 0x2880;
const OPERATOR_BASE: u32 = 0x28C0;
const DELIMITER_BASE: u32 = 0x28E0;

/// Braille a..j, which double as digits after the number sign.
const DIGIT_CELLS: [char; 10] = ['⠚', '⠁', '⠃', '⠉', '⠙', '⠑', '⠋', '⠛', '⠓', '⠊'];

#[inline]
pub fn is_alphabet(ch: char) -> bool {
    (ALPHABET_START..=ALPHABET_END).contains(&(ch as u32))
}

#[inline]
pub fn symbol_for_byte(b: u8) -> char {
    // Every value in 0x2800..=0x28FF is a valid scalar value.
    char::from_u32(ALPHABET_START + b as u32).unwrap_or('⠀')
}

#[inline]
pub fn byte_for_symbol(ch: char) -> Option<u8> {
    if is_alphabet(ch) {
        Some((ch as u32 - ALPHABET_START) as u8)
    } else {
        None
    }
}

/// Encodes arbitrary text as one cell per UTF-8 byte.
pub fn encode(text: &str) -> String {
    text.bytes().map(symbol_for_byte).collect()
}

/// Inverse of [`encode`]. Characters outside the alphabet pass through
/// unchanged; byte runs that are not valid UTF-8 decode lossily.
pub fn decode(cells: &str) -> String {
    String::from_utf8_lossy(&cell_bytes(cells)).into_owned()
}

fn cell_bytes(cells: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(cells.len());
    let mut buf = [0u8; 4];
    for ch in cells.chars() {
        match byte_for_symbol(ch) {
            Some(b) => bytes.push(b),
            None => bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes()),
        }
    }
    bytes
}

/// Decodes an identifier without losing information: distinct cell words
/// always give distinct names. Bytes that are not valid UTF-8 become
/// `\xNN` and a literal backslash doubles.
pub fn decode_name(cells: &str) -> String {
    let bytes = cell_bytes(cells);
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes.as_slice();
    loop {
        let (valid, bad) = match std::str::from_utf8(rest) {
            Ok(text) => (text, None),
            Err(e) => {
                let (head, tail) = rest.split_at(e.valid_up_to());
                let bad_len = e.error_len().unwrap_or(tail.len());
                // `head` was just validated.
                let head = std::str::from_utf8(head).unwrap_or_default();
                (head, Some(tail.split_at(bad_len)))
            }
        };
        for ch in valid.chars() {
            if ch == '\\' {
                out.push('\\');
            }
            out.push(ch);
        }
        match bad {
            Some((invalid, tail)) => {
                for b in invalid {
                    out.push_str(&format!("\\x{b:02x}"));
                }
                rest = tail;
            }
            None => return out,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Let,
    Const,
    Fn,
    Async,
    Await,
    Class,
    Extends,
    This,
    Super,
    Return,
    Yield,
    If,
    Else,
    While,
    Loop,
    For,
    In,
    Try,
    Catch,
    Print,
    Import,
    Halt,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    True,
    False,
    Null,
    // AI primitives
    Infer,
    Embed,
    Prompt,
    Compose,
    Reflect,
    Search,
}

impl Keyword {
    /// Table order; position `i` is assigned cell `U+2880 + i`.
    pub const ALL: [Keyword; 36] = [
        Keyword::Let,
        Keyword::Const,
        Keyword::Fn,
        Keyword::Async,
        Keyword::Await,
        Keyword::Class,
        Keyword::Extends,
        Keyword::This,
        Keyword::Super,
        Keyword::Return,
        Keyword::Yield,
        Keyword::If,
        Keyword::Else,
        Keyword::While,
        Keyword::Loop,
        Keyword::For,
        Keyword::In,
        Keyword::Try,
        Keyword::Catch,
        Keyword::Print,
        Keyword::Import,
        Keyword::Halt,
        Keyword::Switch,
        Keyword::Case,
        Keyword::Default,
        Keyword::Break,
        Keyword::Continue,
        Keyword::True,
        Keyword::False,
        Keyword::Null,
        Keyword::Infer,
        Keyword::Embed,
        Keyword::Prompt,
        Keyword::Compose,
        Keyword::Reflect,
        Keyword::Search,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Keyword::Let => "let",
            Keyword::Const => "const",
            Keyword::Fn => "fn",
            Keyword::Async => "async",
            Keyword::Await => "await",
            Keyword::Class => "class",
            Keyword::Extends => "extends",
            Keyword::This => "this",
            Keyword::Super => "super",
            Keyword::Return => "return",
            Keyword::Yield => "yield",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::Loop => "loop",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Try => "try",
            Keyword::Catch => "catch",
            Keyword::Print => "print",
            Keyword::Import => "import",
            Keyword::Halt => "halt",
            Keyword::Switch => "switch",
            Keyword::Case => "case",
            Keyword::Default => "default",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
            Keyword::Infer => "infer",
            Keyword::Embed => "embed",
            Keyword::Prompt => "prompt",
            Keyword::Compose => "compose",
            Keyword::Reflect => "reflect",
            Keyword::Search => "search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,
    Bang,
    Assign,
    Arrow,
    PipeForward,
    Dot,
}

impl Operator {
    pub const ALL: [Operator; 18] = [
        Operator::Plus,
        Operator::Minus,
        Operator::Star,
        Operator::Slash,
        Operator::Percent,
        Operator::EqEq,
        Operator::NotEq,
        Operator::Less,
        Operator::LessEq,
        Operator::Greater,
        Operator::GreaterEq,
        Operator::AndAnd,
        Operator::OrOr,
        Operator::Bang,
        Operator::Assign,
        Operator::Arrow,
        Operator::PipeForward,
        Operator::Dot,
    ];

    pub fn lexeme(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Percent => "%",
            Operator::EqEq => "==",
            Operator::NotEq => "!=",
            Operator::Less => "<",
            Operator::LessEq => "<=",
            Operator::Greater => ">",
            Operator::GreaterEq => ">=",
            Operator::AndAnd => "&&",
            Operator::OrOr => "||",
            Operator::Bang => "!",
            Operator::Assign => "=",
            Operator::Arrow => "=>",
            Operator::PipeForward => "|>",
            Operator::Dot => ".",
        }
    }

    /// Binding power, higher binds tighter. Assignment and the lambda arrow
    /// sit at the bottom and associate right-to-left.
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Assign | Operator::Arrow => 1,
            Operator::PipeForward => 2,
            Operator::OrOr => 3,
            Operator::AndAnd => 4,
            Operator::EqEq | Operator::NotEq => 5,
            Operator::Less | Operator::LessEq | Operator::Greater | Operator::GreaterEq => 6,
            Operator::Plus | Operator::Minus => 7,
            Operator::Star | Operator::Slash | Operator::Percent => 8,
            Operator::Bang => 9,
            Operator::Dot => 10,
        }
    }

    pub fn is_right_assoc(self) -> bool {
        matches!(self, Operator::Assign | Operator::Arrow)
    }

    /// Operators handled by the precedence-climbing loop.
    pub fn is_infix(self) -> bool {
        !matches!(self, Operator::Bang | Operator::Assign | Operator::Arrow | Operator::Dot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delimiter {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
}

impl Delimiter {
    pub const ALL: [Delimiter; 9] = [
        Delimiter::LParen,
        Delimiter::RParen,
        Delimiter::LBrace,
        Delimiter::RBrace,
        Delimiter::LBracket,
        Delimiter::RBracket,
        Delimiter::Comma,
        Delimiter::Colon,
        Delimiter::Semicolon,
    ];

    pub fn lexeme(self) -> &'static str {
        match self {
            Delimiter::LParen => "(",
            Delimiter::RParen => ")",
            Delimiter::LBrace => "{",
            Delimiter::RBrace => "}",
            Delimiter::LBracket => "[",
            Delimiter::RBracket => "]",
            Delimiter::Comma => ",",
            Delimiter::Colon => ":",
            Delimiter::Semicolon => ";",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Keyword(Keyword),
    Operator(Operator),
    Delimiter(Delimiter),
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    version: u32,
    roles: HashMap<char, Role>,
    symbols: HashMap<Role, char>,
    digits: HashMap<char, u8>,
    pub decimal_point: char,
    pub number_sign: char,
    pub identifier_escape: char,
    pub comment: char,
    pub string_delimiter: char,
}

static STANDARD: Lazy<SymbolTable> = Lazy::new(SymbolTable::v1);

impl SymbolTable {
    /// The process-wide v1 table.
    pub fn standard() -> &'static SymbolTable {
        &STANDARD
    }

    fn v1() -> Self {
        let mut roles = HashMap::new();
        let assign = |base: u32, i: usize| char::from_u32(base + i as u32).unwrap_or('⠀');
        for (i, kw) in Keyword::ALL.iter().enumerate() {
            roles.insert(assign(KEYWORD_BASE, i), Role::Keyword(*kw));
        }
        for (i, op) in Operator::ALL.iter().enumerate() {
            roles.insert(assign(OPERATOR_BASE, i), Role::Operator(*op));
        }
        for (i, d) in Delimiter::ALL.iter().enumerate() {
            roles.insert(assign(DELIMITER_BASE, i), Role::Delimiter(*d));
        }
        let symbols = roles.iter().map(|(c, r)| (*r, *c)).collect();
        let digits = DIGIT_CELLS
            .iter()
            .enumerate()
            .map(|(d, c)| (*c, d as u8))
            .collect();
        Self {
            version: TABLE_VERSION,
            roles,
            symbols,
            digits,
            decimal_point: '⠲',
            number_sign: '⣼',
            identifier_escape: '⣽',
            comment: '⣾',
            string_delimiter: '⣿',
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn role(&self, ch: char) -> Option<Role> {
        self.roles.get(&ch).copied()
    }

    pub fn symbol_of(&self, role: Role) -> Option<char> {
        self.symbols.get(&role).copied()
    }

    pub fn digit(&self, ch: char) -> Option<u8> {
        self.digits.get(&ch).copied()
    }

    pub fn digit_symbol(&self, d: u8) -> char {
        DIGIT_CELLS[(d % 10) as usize]
    }

    /// Symbols that terminate a word and are handled before word scanning.
    pub fn is_structural(&self, ch: char) -> bool {
        ch == self.comment || ch == self.string_delimiter || ch == self.identifier_escape
    }

    /// Resolves a readable name (`let`, `+`, `(`) to its role.
    pub fn role_by_name(&self, name: &str) -> Option<Role> {
        Keyword::ALL
            .iter()
            .find(|k| k.name() == name)
            .map(|k| Role::Keyword(*k))
            .or_else(|| {
                Operator::ALL
                    .iter()
                    .find(|o| o.lexeme() == name)
                    .map(|o| Role::Operator(*o))
            })
            .or_else(|| {
                Delimiter::ALL
                    .iter()
                    .find(|d| d.lexeme() == name)
                    .map(|d| Role::Delimiter(*d))
            })
    }

    /// Transliterates readable spelling into cell source.
    ///
    /// Words are separated by whitespace; the delimiters `( ) { } [ ] , : ;`
    /// and a member `.` split words on their own. Keyword names and operator
    /// lexemes map to their cells, digit words become number literals,
    /// `"…"` becomes a string literal, `#` starts a comment running to the
    /// end of the line, `@name` forces an identifier, and any other word is
    /// encoded as an identifier.
    pub fn spell(&self, readable: &str) -> String {
        let mut out = String::with_capacity(readable.len() * 3);
        let mut word = String::new();
        let mut need_space = false;
        let mut chars = readable.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch.is_whitespace() {
                self.flush_word(&mut word, &mut out, &mut need_space);
                out.push(ch);
                need_space = false;
            } else if ch == '"' && word.is_empty() {
                let mut text = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => {}
                        },
                        other => text.push(other),
                    }
                }
                if need_space {
                    out.push(' ');
                }
                out.push(self.string_delimiter);
                out.push_str(&encode(&text));
                out.push(self.string_delimiter);
                need_space = true;
            } else if ch == '#' && word.is_empty() {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                if need_space {
                    out.push(' ');
                }
                out.push(self.comment);
                out.push_str(&encode(text.trim()));
                need_space = false;
            } else if is_split_char(ch) && !is_decimal_point(ch, &word, chars.peek()) {
                self.flush_word(&mut word, &mut out, &mut need_space);
                word.push(ch);
                self.flush_word(&mut word, &mut out, &mut need_space);
            } else {
                word.push(ch);
            }
        }
        self.flush_word(&mut word, &mut out, &mut need_space);
        out
    }

    fn flush_word(&self, word: &mut String, out: &mut String, need_space: &mut bool) {
        if word.is_empty() {
            return;
        }
        if *need_space {
            out.push(' ');
        }
        out.push_str(&self.spell_word(word));
        word.clear();
        *need_space = true;
    }

    fn spell_word(&self, word: &str) -> String {
        if let Some(name) = word.strip_prefix('@') {
            let mut s = String::new();
            s.push(self.identifier_escape);
            s.push_str(&encode(name));
            return s;
        }
        if let Some(role) = self.role_by_name(word) {
            if let Some(sym) = self.symbol_of(role) {
                return sym.to_string();
            }
        }
        if is_number_word(word) {
            let mut s = String::new();
            s.push(self.number_sign);
            for c in word.chars() {
                match c.to_digit(10) {
                    Some(d) => s.push(self.digit_symbol(d as u8)),
                    None => s.push(self.decimal_point),
                }
            }
            return s;
        }
        let cells = encode(word);
        let mut it = cells.chars();
        match (it.next(), it.next()) {
            (Some(only), None) if self.role(only).is_some() || self.is_structural(only) => {
                let mut s = String::new();
                s.push(self.identifier_escape);
                s.push(only);
                s
            }
            _ => cells,
        }
    }
}

fn is_split_char(ch: char) -> bool {
    matches!(ch, '(' | ')' | '{' | '}' | '[' | ']' | ',' | ':' | ';' | '.')
}

fn is_decimal_point(ch: char, word: &str, next: Option<&char>) -> bool {
    ch == '.'
        && !word.is_empty()
        && word.chars().all(|c| c.is_ascii_digit())
        && next.map(|c| c.is_ascii_digit()).unwrap_or(false)
}

fn is_number_word(word: &str) -> bool {
    let mut seen_point = false;
    let mut digits = 0;
    for c in word.chars() {
        if c.is_ascii_digit() {
            digits += 1;
        } else if c == '.' && !seen_point {
            seen_point = true;
        } else {
            return false;
        }
    }
    digits > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_decode_without_collisions() {
        assert_eq!(decode_name(&encode("total")), "total");
        // 0x80 and 0x81 are lone continuation bytes.
        let a = decode_name("\u{2880}\u{2881}");
        let b = decode_name("\u{2882}\u{2883}");
        assert_eq!(a, "\\x80\\x81");
        assert_ne!(a, b);
        assert_ne!(decode_name(&encode("\\x80\\x81")), a);
        assert_eq!(decode(&encode("a\\b")), "a\\b");
        assert_eq!(decode_name(&encode("a\\b")), "a\\\\b");
    }

    #[test]
    fn roles_do_not_overlap_ascii_identifiers() {
        let table = SymbolTable::standard();
        for b in 0u8..0x80 {
            assert!(table.role(symbol_for_byte(b)).is_none(), "byte {b:#x} collides");
        }
    }

    #[test]
    fn every_role_round_trips_through_its_symbol() {
        let table = SymbolTable::standard();
        for kw in Keyword::ALL {
            let sym = table.symbol_of(Role::Keyword(kw)).unwrap();
            assert_eq!(table.role(sym), Some(Role::Keyword(kw)));
        }
        for op in Operator::ALL {
            let sym = table.symbol_of(Role::Operator(op)).unwrap();
            assert_eq!(table.role_by_name(op.lexeme()), Some(Role::Operator(op)));
            assert_eq!(table.role(sym), Some(Role::Operator(op)));
        }
    }

    #[test]
    fn encode_decode_printable_ascii() {
        let text: String = (0x20u8..0x7f).map(|b| b as char).collect();
        assert_eq!(decode(&encode(&text)), text);
        assert_eq!(decode(&encode("héllo ✓")), "héllo ✓");
    }

    #[test]
    fn spell_splits_delimiters_and_numbers() {
        let table = SymbolTable::standard();
        let src = table.spell("print(x + 1.5)");
        let words: Vec<&str> = src.split(' ').collect();
        assert_eq!(words.len(), 6);
        assert_eq!(words[2], "⡸");
        assert_eq!(words[4], "⣼⠁⠲⠑");
    }
}

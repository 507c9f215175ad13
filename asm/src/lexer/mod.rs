mod names;
mod traits;

#[cfg(test)]
mod tests;

use std::fmt::{self, Display, Formatter};

pub use self::{
    names::{Condition, DirectiveName, MacroFn, Mnemonic, PragmaName, Register, StatementName, TextFn},
    traits::TokenTraits,
};
use crate::source::{FileId, SourceLoc};

#[derive(thiserror::Error, Debug, Clone)]
pub enum LexerError {
    #[error("unrecognized string escape: `{escape}`")]
    UnrecognizedStringEscape { loc: SourceLoc, escape: String },

    #[error("unterminated string literal")]
    UnterminatedString { loc: SourceLoc },

    #[error("malformed character literal: `{value}`")]
    MalformedChar { loc: SourceLoc, value: String },

    #[error("malformed number: `{value}`")]
    MalformedNumber { loc: SourceLoc, value: String },

    #[error("unrecognized input: `{value}`")]
    UnrecognizedInput { loc: SourceLoc, value: String },
}

impl LexerError {
    #[inline]
    pub fn loc(&self) -> SourceLoc {
        match self {
            Self::UnrecognizedStringEscape { loc, .. }
            | Self::UnterminatedString { loc }
            | Self::MalformedChar { loc, .. }
            | Self::MalformedNumber { loc, .. }
            | Self::UnrecognizedInput { loc, .. } => *loc,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Punct {
    Comma,
    Colon,
    DoubleColon,
    Assign,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    Plus,
    Minus,
    Star,
    Div,
    Mod,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Equal,
    DoubleEqual,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
    DoubleAmpersand,
    DoublePipe,
    Question,
    Arrow,
    DoubleBraceOpen,
    DoubleBraceClose,
}

impl Punct {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "," => Some(Self::Comma),
            ":" => Some(Self::Colon),
            "::" => Some(Self::DoubleColon),
            ":=" => Some(Self::Assign),
            "(" => Some(Self::ParenOpen),
            ")" => Some(Self::ParenClose),
            "[" => Some(Self::BracketOpen),
            "]" => Some(Self::BracketClose),
            "+" => Some(Self::Plus),
            "-" => Some(Self::Minus),
            "*" => Some(Self::Star),
            "/" => Some(Self::Div),
            "%" => Some(Self::Mod),
            "&" => Some(Self::Ampersand),
            "|" => Some(Self::Pipe),
            "^" => Some(Self::Caret),
            "~" => Some(Self::Tilde),
            "!" => Some(Self::Bang),
            "=" => Some(Self::Equal),
            "==" => Some(Self::DoubleEqual),
            "!=" => Some(Self::NotEqual),
            "<" => Some(Self::LessThan),
            "<=" => Some(Self::LessEqual),
            ">" => Some(Self::GreaterThan),
            ">=" => Some(Self::GreaterEqual),
            "<<" => Some(Self::ShiftLeft),
            ">>" => Some(Self::ShiftRight),
            "&&" => Some(Self::DoubleAmpersand),
            "||" => Some(Self::DoublePipe),
            "?" => Some(Self::Question),
            "->" => Some(Self::Arrow),
            "{{" => Some(Self::DoubleBraceOpen),
            "}}" => Some(Self::DoubleBraceClose),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Comma => ",",
            Self::Colon => ":",
            Self::DoubleColon => "::",
            Self::Assign => ":=",
            Self::ParenOpen => "(",
            Self::ParenClose => ")",
            Self::BracketOpen => "[",
            Self::BracketClose => "]",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Ampersand => "&",
            Self::Pipe => "|",
            Self::Caret => "^",
            Self::Tilde => "~",
            Self::Bang => "!",
            Self::Equal => "=",
            Self::DoubleEqual => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
            Self::DoubleAmpersand => "&&",
            Self::DoublePipe => "||",
            Self::Question => "?",
            Self::Arrow => "->",
            Self::DoubleBraceOpen => "{{",
            Self::DoubleBraceClose => "}}",
        }
    }
}

impl Display for Punct {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Eol,
    Identifier,
    Number(i64),
    Real(f64),
    Bool(bool),
    Str(String),
    Mnemonic(Mnemonic),
    Register(Register),
    Condition(Condition),
    Pragma(PragmaName),
    Statement(StatementName),
    Directive(DirectiveName),
    MacroFn(MacroFn),
    TextFn(TextFn),
    CurrentAddress,
    LoopCounter,
    MacroParam(String),
    Punct(Punct),
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub loc: SourceLoc,
    /// Byte span within the line.
    pub start: usize,
    pub end: usize,
}

impl Token {
    #[inline]
    pub fn traits(&self) -> TokenTraits {
        self.kind.traits()
    }

    #[inline]
    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == TokenKind::Punct(punct)
    }

    #[inline]
    pub fn is_statement(&self, name: StatementName) -> bool {
        self.kind == TokenKind::Statement(name)
    }

    #[inline]
    pub fn is_eol(&self) -> bool {
        self.kind == TokenKind::Eol
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eol => write!(f, "end of line"),
            _ => write!(f, "\"{}\"", self.text),
        }
    }
}

enum State {
    Initial,
    InBlockComment,
    InString,
    InStringEscape,
    InChar,
    InNumber,
    InDollar,
    InHash,
    InPercent,
    InDotKeyword,
    InIdentifier,
    InMacroParam,
    InPunct,
}

/// Splits a single source line into tokens. Comments end the line.
pub struct Lexer<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    file: FileId,
    line: usize,
    buffer: String,
}

impl<'a> Lexer<'a> {
    pub fn new(file: FileId, line: usize, text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            pos: 0,
            file,
            line,
            buffer: String::new(),
        }
    }

    #[inline]
    fn char_at(&self, pos: usize) -> Option<char> {
        self.chars.get(pos).map(|(_, c)| *c)
    }

    #[inline]
    fn byte_at(&self, pos: usize) -> usize {
        self.chars
            .get(pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.text.len())
    }

    #[inline]
    fn loc_at(&self, pos: usize) -> SourceLoc {
        SourceLoc::new(self.file, self.line, pos + 1)
    }

    fn emit(&self, kind: TokenKind, start: usize) -> Option<Result<Token, LexerError>> {
        let (from, to) = (self.byte_at(start), self.byte_at(self.pos));
        Some(Ok(Token {
            kind,
            text: self.text[from..to].to_string(),
            loc: self.loc_at(start),
            start: from,
            end: to,
        }))
    }

    fn source(&self, start: usize) -> String {
        self.text[self.byte_at(start)..self.byte_at(self.pos)].to_string()
    }

    fn is_identifier_start(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_' || c == '@' || c == '`'
    }

    fn is_identifier_continue(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '@' || c == '.'
    }

    fn classify(name: &str) -> TokenKind {
        match name.to_ascii_lowercase().as_str() {
            "true" => return TokenKind::Bool(true),
            "false" => return TokenKind::Bool(false),
            _ => {}
        }
        if let Some(mnemonic) = Mnemonic::parse(name) {
            return TokenKind::Mnemonic(mnemonic);
        }
        if let Some(register) = Register::parse(name) {
            return TokenKind::Register(register);
        }
        if let Some(condition) = Condition::parse(name) {
            return TokenKind::Condition(condition);
        }
        if let Some(func) = MacroFn::parse(name) {
            return TokenKind::MacroFn(func);
        }
        if let Some(func) = TextFn::parse(name) {
            return TokenKind::TextFn(func);
        }
        if let Some(pragma) = PragmaName::parse(name) {
            return TokenKind::Pragma(pragma);
        }
        match StatementName::parse(name) {
            Some(statement) if statement.allows_bare() => TokenKind::Statement(statement),
            _ => TokenKind::Identifier,
        }
    }

    /// Interprets a literal that starts with a decimal digit.
    fn parse_number(text: &str) -> Option<i64> {
        let clean: String = text.chars().filter(|c| *c != '_').collect();
        let lower = clean.to_ascii_lowercase();
        let bytes = lower.as_bytes();
        let (digits, radix) = if let Some(hex) = lower.strip_suffix('h') {
            (hex, 16)
        } else if let Some(hex) = lower.strip_prefix("0x") {
            (hex, 16)
        } else if lower.starts_with("0b")
            && bytes.len() > 2
            && bytes[2..].iter().all(|b| *b == b'0' || *b == b'1')
        {
            (&lower[2..], 2)
        } else if let Some(bin) = lower
            .strip_suffix('b')
            .filter(|bin| !bin.is_empty() && bin.bytes().all(|b| b == b'0' || b == b'1'))
        {
            (bin, 2)
        } else if let Some(oct) = lower.strip_suffix('q').or_else(|| lower.strip_suffix('o')) {
            (oct, 8)
        } else {
            (lower.as_str(), 10)
        };
        if digits.is_empty() {
            return None;
        }
        i64::from_str_radix(digits, radix).ok()
    }

    /// Whether `sep` may extend `text` into a real literal: a fraction after
    /// the integer digits, or an exponent sign after `e`.
    fn continues_real(text: &str, sep: char) -> bool {
        match sep {
            '.' => text.bytes().all(|b| b.is_ascii_digit()),
            _ => text
                .strip_suffix(|c: char| c == 'e' || c == 'E')
                .map_or(false, |mantissa| {
                    !mantissa.is_empty() && mantissa.bytes().all(|b| b.is_ascii_digit() || b == b'.')
                }),
        }
    }

    /// `1.5`, `2e8`, `3.25E-2`
    fn parse_real(text: &str) -> Option<f64> {
        let shaped = text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
            && text.bytes().any(|b| matches!(b, b'.' | b'e' | b'E'));
        if !shaped {
            return None;
        }
        text.parse().ok()
    }

    fn escape(c: char) -> Option<char> {
        match c {
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            '0' => Some('\0'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            '\'' => Some('\''),
            _ => None,
        }
    }

    /// Reads `\xHH` after the backslash and `x` were consumed.
    fn hex_escape(&mut self, start: usize) -> Result<char, LexerError> {
        let hi = self.char_at(self.pos).and_then(|c| c.to_digit(16));
        let lo = self.char_at(self.pos + 1).and_then(|c| c.to_digit(16));
        match (hi, lo) {
            (Some(hi), Some(lo)) => {
                self.pos += 2;
                Ok(char::from((hi * 16 + lo) as u8))
            }
            _ => Err(LexerError::UnrecognizedStringEscape {
                loc: self.loc_at(start),
                escape: "\\x".to_string(),
            }),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = State::Initial;
        let mut start = self.pos;
        loop {
            let c = self.char_at(self.pos);
            match state {
                State::Initial => {
                    start = self.pos;
                    let c = c?;
                    let next = self.char_at(self.pos + 1);
                    match c {
                        _ if c.is_whitespace() => self.pos += 1,

                        ';' => {
                            self.pos = self.chars.len();
                            return None;
                        }

                        '/' if next == Some('/') => {
                            self.pos = self.chars.len();
                            return None;
                        }

                        '/' if next == Some('*') => {
                            self.pos += 2;
                            state = State::InBlockComment;
                        }

                        '"' => {
                            self.pos += 1;
                            self.buffer.clear();
                            state = State::InString;
                        }

                        '\'' => {
                            self.pos += 1;
                            state = State::InChar;
                        }

                        '0'..='9' => state = State::InNumber,

                        '$' => {
                            self.pos += 1;
                            state = State::InDollar;
                        }

                        '#' => {
                            self.pos += 1;
                            state = State::InHash;
                        }

                        '%' => {
                            self.pos += 1;
                            state = State::InPercent;
                        }

                        '{' if next == Some('{') => {
                            self.pos += 2;
                            state = State::InMacroParam;
                        }

                        '.' if next.map_or(false, |c| c.is_ascii_alphabetic()) => {
                            self.pos += 1;
                            state = State::InDotKeyword;
                        }

                        _ if Self::is_identifier_start(c) => state = State::InIdentifier,

                        _ => state = State::InPunct,
                    }
                }

                State::InBlockComment => match c {
                    None => return None,
                    Some('*') if self.char_at(self.pos + 1) == Some('/') => {
                        self.pos += 2;
                        state = State::Initial;
                    }
                    Some(_) => self.pos += 1,
                },

                State::InString => match c {
                    None => {
                        return Some(Err(LexerError::UnterminatedString {
                            loc: self.loc_at(start),
                        }))
                    }
                    Some('"') => {
                        self.pos += 1;
                        let value = self.buffer.clone();
                        return self.emit(TokenKind::Str(value), start);
                    }
                    Some('\\') => {
                        self.pos += 1;
                        state = State::InStringEscape;
                    }
                    Some(c) => {
                        self.pos += 1;
                        self.buffer.push(c);
                    }
                },

                State::InStringEscape => {
                    let c = match c {
                        None => {
                            return Some(Err(LexerError::UnterminatedString {
                                loc: self.loc_at(start),
                            }))
                        }
                        Some(c) => c,
                    };
                    self.pos += 1;
                    if c == 'x' {
                        match self.hex_escape(start) {
                            Ok(c) => self.buffer.push(c),
                            Err(e) => return Some(Err(e)),
                        }
                    } else if let Some(c) = Self::escape(c) {
                        self.buffer.push(c);
                    } else {
                        return Some(Err(LexerError::UnrecognizedStringEscape {
                            loc: self.loc_at(self.pos - 2),
                            escape: format!("\\{c}"),
                        }));
                    }
                    state = State::InString;
                }

                State::InChar => {
                    let value = match c {
                        Some('\\') => {
                            self.pos += 1;
                            match self.char_at(self.pos) {
                                Some('x') => {
                                    self.pos += 1;
                                    match self.hex_escape(start) {
                                        Ok(c) => Some(c),
                                        Err(e) => return Some(Err(e)),
                                    }
                                }
                                Some(c) => {
                                    self.pos += 1;
                                    Self::escape(c)
                                }
                                None => None,
                            }
                        }
                        Some(c) if c != '\'' => {
                            self.pos += 1;
                            Some(c)
                        }
                        _ => None,
                    };
                    match (value, self.char_at(self.pos)) {
                        (Some(value), Some('\'')) => {
                            self.pos += 1;
                            return self.emit(TokenKind::Number(value as i64), start);
                        }
                        _ => {
                            return Some(Err(LexerError::MalformedChar {
                                loc: self.loc_at(start),
                                value: self.source(start),
                            }))
                        }
                    }
                }

                State::InNumber => match c {
                    Some(c) if c.is_ascii_alphanumeric() || c == '_' => self.pos += 1,
                    Some(sep @ ('.' | '+' | '-'))
                        if self.char_at(self.pos + 1).map_or(false, |c| c.is_ascii_digit())
                            && Self::continues_real(&self.source(start), sep) =>
                    {
                        self.pos += 1
                    }
                    _ => {
                        let text = self.source(start);
                        if let Some(value) = Self::parse_number(&text) {
                            return self.emit(TokenKind::Number(value), start);
                        }
                        return match Self::parse_real(&text) {
                            Some(value) => self.emit(TokenKind::Real(value), start),
                            None => Some(Err(LexerError::MalformedNumber {
                                loc: self.loc_at(start),
                                value: text,
                            })),
                        };
                    }
                },

                State::InDollar => {
                    let rest: String = self.chars[self.pos..]
                        .iter()
                        .take(4)
                        .map(|(_, c)| c.to_ascii_lowercase())
                        .collect();
                    if rest.starts_with("cnt")
                        && !rest[3..].chars().next().map_or(false, Self::is_identifier_continue)
                    {
                        self.pos += 3;
                        return self.emit(TokenKind::LoopCounter, start);
                    }
                    let digits_start = self.pos;
                    while self.char_at(self.pos).map_or(false, |c| c.is_ascii_hexdigit()) {
                        self.pos += 1;
                    }
                    if self.pos == digits_start {
                        return self.emit(TokenKind::CurrentAddress, start);
                    }
                    if self.char_at(self.pos).map_or(false, Self::is_identifier_continue) {
                        return Some(Err(LexerError::MalformedNumber {
                            loc: self.loc_at(start),
                            value: self.source(start),
                        }));
                    }
                    let digits = self.source(digits_start);
                    return match i64::from_str_radix(&digits, 16) {
                        Ok(value) => self.emit(TokenKind::Number(value), start),
                        Err(_) => Some(Err(LexerError::MalformedNumber {
                            loc: self.loc_at(start),
                            value: self.source(start),
                        })),
                    };
                }

                State::InHash => {
                    let word_start = self.pos;
                    while self.char_at(self.pos).map_or(false, |c| c.is_ascii_alphanumeric()) {
                        self.pos += 1;
                    }
                    let word = self.source(word_start);
                    if !word.is_empty() && word.chars().all(|c| c.is_ascii_hexdigit()) {
                        return match i64::from_str_radix(&word, 16) {
                            Ok(value) => self.emit(TokenKind::Number(value), start),
                            Err(_) => Some(Err(LexerError::MalformedNumber {
                                loc: self.loc_at(start),
                                value: self.source(start),
                            })),
                        };
                    }
                    return match DirectiveName::parse(&word) {
                        Some(directive) => self.emit(TokenKind::Directive(directive), start),
                        None => Some(Err(LexerError::UnrecognizedInput {
                            loc: self.loc_at(start),
                            value: self.source(start),
                        })),
                    };
                }

                State::InPercent => {
                    let digits_start = self.pos;
                    while self
                        .char_at(self.pos)
                        .map_or(false, |c| c == '0' || c == '1' || c == '_')
                    {
                        self.pos += 1;
                    }
                    if self.pos == digits_start {
                        return self.emit(TokenKind::Punct(Punct::Mod), start);
                    }
                    let digits: String = self
                        .source(digits_start)
                        .chars()
                        .filter(|c| *c != '_')
                        .collect();
                    let malformed = digits.is_empty()
                        || self.char_at(self.pos).map_or(false, Self::is_identifier_continue);
                    return match i64::from_str_radix(&digits, 2) {
                        Ok(value) if !malformed => self.emit(TokenKind::Number(value), start),
                        _ => Some(Err(LexerError::MalformedNumber {
                            loc: self.loc_at(start),
                            value: self.source(start),
                        })),
                    };
                }

                State::InDotKeyword => match c {
                    Some(c) if Self::is_identifier_continue(c) && c != '.' => self.pos += 1,
                    _ => {
                        let name = self.source(start + 1);
                        if name.eq_ignore_ascii_case("cnt") {
                            return self.emit(TokenKind::LoopCounter, start);
                        }
                        if let Some(pragma) = PragmaName::parse(&name) {
                            return self.emit(TokenKind::Pragma(pragma), start);
                        }
                        if let Some(statement) = StatementName::parse(&name) {
                            return self.emit(TokenKind::Statement(statement), start);
                        }
                        return Some(Err(LexerError::UnrecognizedInput {
                            loc: self.loc_at(start),
                            value: self.source(start),
                        }));
                    }
                },

                State::InIdentifier => match c {
                    Some('`') if self.pos == start => self.pos += 1,
                    Some(c) if Self::is_identifier_continue(c) => self.pos += 1,
                    Some('\'') if self.source(start).eq_ignore_ascii_case("af") => {
                        self.pos += 1;
                        return self.emit(TokenKind::Register(Register::AfPrime), start);
                    }
                    _ => {
                        let name = self.source(start);
                        if name == "`" {
                            return Some(Err(LexerError::UnrecognizedInput {
                                loc: self.loc_at(start),
                                value: name,
                            }));
                        }
                        return self.emit(Self::classify(&name), start);
                    }
                },

                State::InMacroParam => {
                    let mut pos = self.pos;
                    while self.char_at(pos).map_or(false, char::is_whitespace) {
                        pos += 1;
                    }
                    let name_start = pos;
                    if self.char_at(pos).map_or(false, Self::is_identifier_start) {
                        while self
                            .char_at(pos)
                            .map_or(false, |c| Self::is_identifier_continue(c) && c != '.')
                        {
                            pos += 1;
                        }
                    }
                    let name_end = pos;
                    while self.char_at(pos).map_or(false, char::is_whitespace) {
                        pos += 1;
                    }
                    if name_end > name_start
                        && self.char_at(pos) == Some('}')
                        && self.char_at(pos + 1) == Some('}')
                    {
                        let name = self.text[self.byte_at(name_start)..self.byte_at(name_end)]
                            .to_string();
                        self.pos = pos + 2;
                        return self.emit(TokenKind::MacroParam(name), start);
                    }
                    return self.emit(TokenKind::Punct(Punct::DoubleBraceOpen), start);
                }

                State::InPunct => {
                    let first = self.char_at(self.pos).map(String::from).unwrap_or_default();
                    let mut two = first.clone();
                    if let Some(second) = self.char_at(self.pos + 1) {
                        two.push(second);
                    }
                    if let Some(punct) = Punct::parse(&two) {
                        self.pos += 2;
                        return self.emit(TokenKind::Punct(punct), start);
                    }
                    self.pos += 1;
                    return match Punct::parse(&first) {
                        Some(punct) => self.emit(TokenKind::Punct(punct), start),
                        None => Some(Err(LexerError::UnrecognizedInput {
                            loc: self.loc_at(start),
                            value: first,
                        })),
                    };
                }
            }
        }
    }
}

/// Buffered tokens of one line with arbitrary lookahead.
#[derive(Clone, Debug)]
pub struct TokenStream {
    tokens: Vec<Token>,
    index: usize,
    eol: Token,
    raw_tail: Option<String>,
}

impl TokenStream {
    /// Tokenizes `text`. Everything after a `.defg` keyword is kept as raw
    /// text since graphics patterns are not made of tokens.
    pub fn tokenize(file: FileId, line: usize, text: &str) -> Result<Self, LexerError> {
        let mut tokens = Vec::new();
        let mut raw_tail = None;
        for token in Lexer::new(file, line, text) {
            let token = token?;
            let end = token.end;
            let is_defg = token.kind == TokenKind::Pragma(PragmaName::Defg);
            tokens.push(token);
            if is_defg {
                let tail = &text[end..];
                let tail = tail.split(';').next().unwrap_or_default();
                raw_tail = Some(tail.trim().to_string());
                break;
            }
        }
        let column = text.chars().count() + 1;
        Ok(Self {
            tokens,
            index: 0,
            raw_tail,
            eol: Token {
                kind: TokenKind::Eol,
                text: String::new(),
                loc: SourceLoc::new(file, line, column),
                start: text.len(),
                end: text.len(),
            },
        })
    }

    /// The untokenized remainder of a `.defg` line.
    #[inline]
    pub fn raw_tail(&self) -> Option<&str> {
        self.raw_tail.as_deref()
    }

    #[inline]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[inline]
    pub fn peek(&self) -> &Token {
        self.ahead(0)
    }

    /// The token `k` positions past the current one.
    #[inline]
    pub fn ahead(&self, k: usize) -> &Token {
        self.tokens.get(self.index + k).unwrap_or(&self.eol)
    }

    #[inline]
    pub fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    #[inline]
    pub fn is_eol(&self) -> bool {
        self.index >= self.tokens.len()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn rewind(&mut self, position: usize) {
        self.index = position.min(self.tokens.len());
    }

    /// Byte offset where the token at `position` starts.
    #[inline]
    pub fn offset_of(&self, position: usize) -> usize {
        self.tokens
            .get(position)
            .map(|token| token.start)
            .unwrap_or(self.eol.start)
    }

    /// Byte offset just past the last consumed token.
    #[inline]
    pub fn consumed_end(&self) -> usize {
        if self.index == 0 {
            return 0;
        }
        self.tokens[self.index - 1].end
    }
}

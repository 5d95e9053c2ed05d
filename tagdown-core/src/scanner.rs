//! Mode-carrying tokenizer.
//!
//! The scanner works on raw bytes and reports lexical problems (NUL bytes,
//! malformed UTF-8) as [`ScanError`]s without stopping. How a character is
//! treated depends on two pieces of state: the [`ScanMode`] (what kind of
//! token is expected next) and the [`TextLayout`] (how lines of text are
//! grouped, set by the parser from the section mode of the open tag).

use crate::error::{ScanError, ScanRange};
use crate::grammar::PARAGRAPH_TAG;

/// A token produced by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Eof,
    Text(String),
    /// A `#...` or `>` tag name, or the synthetic `#p`
    Section(String),
    /// A `key:value` or bare attribute following a section, style or entity
    Value(String),
    /// List marker, `-` or `+`
    Enum(char),
    /// One of `{`, `}`, `*`, `_`
    Style(char),
    /// Entity reference `name[:value]`
    Entity(String),
    CodeText(String),
    MathText(String),
    ConfigText(String),
    /// Cell delimiter; the payload is the number of pipes (the colspan)
    TableCell(usize),
    /// Row delimiter; the payload is the number of pipes
    TableRow(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub range: ScanRange,
}

/// What the scanner expects next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Normal,
    /// Just saw a tag name; values may follow
    Section,
    /// A tag is expected; plain text starts a paragraph
    NewTag,
    Style,
    Embed,
    /// The next token is a synthetic paragraph section
    InjectSection,
    /// Raw configuration text up to the next blank line
    Config,
}

/// How lines of text are grouped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextLayout {
    Normal,
    Table,
    Code,
    Math,
    /// A line ending in `:` ends the paragraph
    Paragraph,
}

/// Splits markup into tokens
pub struct Scanner<'a> {
    src: &'a [u8],
    mode: ScanMode,
    next_mode: ScanMode,
    layout: TextLayout,

    ch: Option<char>,
    offset: usize,
    read_offset: usize,
    line_offset: usize,
    line_count: usize,
    indent: usize,
    started: bool,
    /// Line, column and offset where the current token begins
    token_start: (usize, usize, usize),

    errors: Vec<ScanError>,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            mode: ScanMode::NewTag,
            next_mode: ScanMode::Normal,
            layout: TextLayout::Normal,
            ch: None,
            offset: 0,
            read_offset: 0,
            line_offset: 0,
            line_count: 0,
            indent: 0,
            started: false,
            token_start: (1, 0, 0),
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<ScanError> {
        std::mem::take(&mut self.errors)
    }

    /// Column at which the most recent tag or list marker was opened
    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn layout(&self) -> TextLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: TextLayout) {
        self.layout = layout;
    }

    /// Current line, 1-based
    pub fn line(&self) -> usize {
        self.line_count + 1
    }

    /// Treat what follows as a raw configuration block followed by an
    /// indented template body. Used after `#define:` directives.
    pub fn begin_config_block(&mut self) {
        self.mode = ScanMode::Config;
        self.layout = TextLayout::Code;
        self.skip_whitespace(false);
    }

    /// Make the next token a synthetic paragraph section
    pub fn force_section(&mut self) {
        self.mode = ScanMode::InjectSection;
    }

    /// Advance to `offset`, keeping line accounting intact, then skip
    /// blank space. Used to step over front matter.
    pub fn skip_to(&mut self, offset: usize) {
        self.start();
        while self.ch.is_some() && self.offset < offset {
            self.next();
        }
        self.skip_whitespace(true);
    }

    /// Return the next token together with its position
    pub fn scan(&mut self) -> SpannedToken {
        self.mark();
        let token = self.scan_token();
        let (line, column, start) = self.token_start;
        SpannedToken {
            token,
            range: ScanRange::new(line, column, start, self.offset),
        }
    }

    /// Record the current position as the start of the token being scanned
    fn mark(&mut self) {
        self.token_start = (self.line(), self.offset - self.line_offset, self.offset);
    }

    fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.next();
            self.skip_whitespace(true);
        }
    }

    /// Read the next char into `ch`; `None` means end of input.
    fn next(&mut self) {
        self.offset = self.read_offset.min(self.src.len());
        if self.ch == Some('\n') {
            self.line_offset = self.offset;
            self.line_count += 1;
        }
        if self.read_offset >= self.src.len() {
            self.ch = None;
            return;
        }

        let (ch, width) = match self.src[self.read_offset] {
            0 => {
                self.error("illegal character NUL");
                ('\0', 1)
            }
            b if b < 0x80 => (b as char, 1),
            _ => match decode_utf8(&self.src[self.read_offset..]) {
                Some(decoded) => decoded,
                None => {
                    self.error("illegal UTF-8 encoding");
                    (char::REPLACEMENT_CHARACTER, 1)
                }
            },
        };
        self.read_offset += width;
        self.ch = Some(ch);
    }

    fn error(&mut self, message: &str) {
        self.errors.push(ScanError {
            range: ScanRange::new(
                self.line(),
                self.offset - self.line_offset,
                self.offset,
                self.offset,
            ),
            message: message.to_string(),
        });
    }

    fn skip_whitespace(&mut self, newline: bool) {
        while let Some(c) = self.ch {
            if c == ' ' || c == '\t' || c == '\r' || (newline && c == '\n') {
                self.next();
            } else {
                break;
            }
        }
    }

    fn at_column_zero(&self) -> bool {
        self.line_offset == self.offset
    }

    /// True if `ch` is the first non-blank character of its line
    fn is_start_of_line(&self) -> bool {
        self.src[self.line_offset..self.offset]
            .iter()
            .all(|&b| b == b' ' || b == b'\t' || b == b'\r')
    }

    fn skip_until_empty_line(&mut self) {
        while self.ch.is_some() {
            if self.ch == Some('\n') {
                self.next();
                self.skip_whitespace(false);
                if self.ch == Some('\n') {
                    self.next();
                    break;
                }
            }
            self.next();
        }
    }

    fn text(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.src[start..end]).into_owned()
    }

    fn scan_token(&mut self) -> Token {
        if self.layout == TextLayout::Code && matches!(self.mode, ScanMode::Normal | ScanMode::NewTag) {
            return Token::CodeText(self.scan_indented_block());
        }
        if self.layout == TextLayout::Math && self.mode == ScanMode::Normal {
            return Token::MathText(self.scan_indented_block());
        }
        if self.mode == ScanMode::Config {
            let start = self.offset;
            self.skip_until_empty_line();
            self.mode = self.next_mode;
            return Token::ConfigText(self.text(start, self.offset));
        }
        if self.mode == ScanMode::InjectSection {
            self.mode = ScanMode::Normal;
            return Token::Section(PARAGRAPH_TAG.to_string());
        }
        self.start();

        loop {
            if let Some(token) = self.scan_markup() {
                return token;
            }
            match self.mode {
                ScanMode::Style | ScanMode::Embed | ScanMode::Section => {
                    if let Some(value) = self.scan_value() {
                        return Token::Value(value);
                    }
                }
                ScanMode::NewTag => {
                    // no markup found, so this starts a paragraph
                    self.mode = ScanMode::Normal;
                    self.indent = self.offset - self.line_offset;
                    return Token::Section(PARAGRAPH_TAG.to_string());
                }
                _ => {
                    if let Some(token) = self.scan_text() {
                        return token;
                    }
                }
            }
        }
    }

    /// Code and math layout: everything through the next blank line, then
    /// every line indented deeper than the tag that opened the block.
    fn scan_indented_block(&mut self) -> String {
        let start = self.offset;
        self.skip_until_empty_line();
        while let Some(c) = self.ch {
            if self.offset - self.line_offset > self.indent || matches!(c, ' ' | '\t' | '\n' | '\r') {
                self.next();
            } else {
                break;
            }
        }
        self.layout = TextLayout::Normal;
        self.mode = ScanMode::NewTag;
        self.text(start, self.offset)
    }

    /// Markup characters. `None` means the current character is not markup
    /// in the current mode and must be scanned as value or text.
    fn scan_markup(&mut self) -> Option<Token> {
        loop {
            self.mark();
            let new_tag = self.mode == ScanMode::NewTag;
            match self.ch {
                None => return Some(Token::Eof),
                Some('\0') | Some('\r') => self.next(),
                Some('%') if self.at_column_zero() || new_tag => {
                    while !matches!(self.ch, None | Some('\n')) {
                        self.next();
                    }
                    if self.ch == Some('\n') {
                        self.next();
                    }
                }
                Some('#' | '>') if self.at_column_zero() || new_tag => return Some(self.scan_section()),
                Some(marker @ ('-' | '+')) if self.at_column_zero() || new_tag => {
                    return Some(self.scan_enum(marker))
                }
                Some(style @ ('_' | '*')) if self.mode == ScanMode::Normal => {
                    self.next();
                    return Some(Token::Style(style));
                }
                Some('|')
                    if self.mode == ScanMode::Normal
                        && (self.layout == TextLayout::Table || self.is_start_of_line()) =>
                {
                    return Some(self.scan_table_delimiter())
                }
                Some(' ' | '\t') if self.mode == ScanMode::Section => {
                    self.next();
                    self.mode = self.next_mode;
                    self.skip_whitespace(true);
                }
                Some(' ' | '\t') if matches!(self.mode, ScanMode::Embed | ScanMode::Style) => {
                    self.next();
                    self.mode = ScanMode::Normal;
                }
                Some(' ' | '\t') if new_tag => self.next(),
                Some('{') if self.mode == ScanMode::Normal => {
                    self.mode = ScanMode::Style;
                    self.next_mode = ScanMode::Normal;
                    self.next();
                    return Some(Token::Style('{'));
                }
                Some('}') if matches!(self.mode, ScanMode::Style | ScanMode::Normal) => {
                    self.mode = ScanMode::Normal;
                    self.next();
                    return Some(Token::Style('}'));
                }
                Some('~') if self.mode == ScanMode::Embed => {
                    self.mode = ScanMode::Normal;
                    self.next();
                }
                Some('~') if self.mode == ScanMode::Normal => return Some(self.scan_entity()),
                Some('`') if self.mode == ScanMode::Normal => {
                    return Some(Token::CodeText(self.scan_escaped('`', true)))
                }
                Some('$') if self.mode == ScanMode::Normal => {
                    return Some(Token::MathText(self.scan_escaped('$', false)))
                }
                _ => return None,
            }
        }
    }

    fn scan_section(&mut self) -> Token {
        self.indent = self.offset - self.line_offset;
        self.mode = ScanMode::Section;
        self.next_mode = ScanMode::Normal;
        self.layout = TextLayout::Normal;

        let start = self.offset;
        self.next();
        while let Some(c) = self.ch {
            if matches!(c, ' ' | '\r' | '\t' | '\n' | ';') {
                break;
            }
            self.next();
        }
        let name = self.text(start, self.offset);
        if matches!(self.ch, Some(' ' | '\r' | '\t' | '\n')) {
            self.mode = ScanMode::Normal;
            self.skip_whitespace(false);
        } else {
            // skip the ';'
            self.next();
        }
        Token::Section(name)
    }

    fn scan_enum(&mut self, marker: char) -> Token {
        let indent = self.offset - self.line_offset;
        self.next();
        // a blank means text follows, anything else is an attribute
        if matches!(self.ch, Some(' ' | '\t' | '\r' | '\n')) {
            self.mode = ScanMode::Normal;
        } else {
            self.mode = ScanMode::Section;
            self.next_mode = ScanMode::Normal;
        }
        self.layout = TextLayout::Normal;
        self.indent = indent;
        Token::Enum(marker)
    }

    fn scan_table_delimiter(&mut self) -> Token {
        self.layout = TextLayout::Table;
        let start = self.offset;
        self.next();
        while self.ch == Some('|') {
            self.next();
        }
        let pipes = self.offset - start;
        self.skip_whitespace(false);
        if self.ch == Some('\n') {
            self.next();
            self.skip_whitespace(false);
            // a blank line ends the table
            if self.ch == Some('\n') {
                self.layout = TextLayout::Normal;
                self.skip_whitespace(true);
                self.mode = ScanMode::NewTag;
            }
            return Token::TableRow(pipes);
        }
        Token::TableCell(pipes)
    }

    fn scan_entity(&mut self) -> Token {
        self.next();
        let start = self.offset;
        while let Some(c) = self.ch {
            if matches!(c, '~' | '\r' | '\n' | ';') {
                break;
            }
            self.next();
        }
        let name = self.text(start, self.offset);
        match self.ch {
            Some('~') => self.next(),
            Some(';') => {
                self.next();
                self.mode = ScanMode::Embed;
                self.next_mode = ScanMode::Normal;
            }
            _ => {}
        }
        Token::Entity(name)
    }

    /// Inline code or math up to `delim`; `\` before `delim` escapes it.
    fn scan_escaped(&mut self, delim: char, stop_at_newline: bool) -> String {
        self.next();
        let mut start = self.offset;
        let mut out = String::new();
        loop {
            match self.ch {
                None => break,
                Some(c) if c == delim => break,
                Some('\r' | '\n') if stop_at_newline => break,
                Some('\\') => {
                    self.next();
                    if self.ch == Some(delim) {
                        out.push_str(&self.text(start, self.offset - 1));
                        start = self.offset;
                        self.next();
                    }
                }
                Some(_) => self.next(),
            }
        }
        out.push_str(&self.text(start, self.offset));
        if self.ch == Some(delim) {
            self.next();
        }
        out
    }

    /// Attribute value after a section, style or entity. Returns `None` for
    /// an empty value.
    fn scan_value(&mut self) -> Option<String> {
        let mut start = self.offset;
        let mut out = String::new();
        while let Some(c) = self.ch {
            if matches!(c, ' ' | '\t' | '\r' | '\n' | ';')
                || (self.mode == ScanMode::Embed && c == '~')
                || (self.mode == ScanMode::Style && c == '}')
            {
                break;
            }
            if c == '\\' {
                out.push_str(&self.text(start, self.offset));
                self.next();
                start = self.offset;
            }
            self.next();
        }
        let closes_style = self.mode == ScanMode::Style && self.ch == Some('}');
        if self.ch != Some(';') {
            self.mode = self.next_mode;
        }
        out.push_str(&self.text(start, self.offset));
        // a closing brace is left for the style token
        if !closes_style {
            self.next();
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    fn scan_text(&mut self) -> Option<Token> {
        let mut start = self.offset;
        let mut newline = self.at_column_zero();

        if self.ch == Some('\n') {
            self.next();
            self.skip_whitespace(false);
            newline = true;
            if self.ch == Some('\n') {
                self.skip_whitespace(true);
                // markup after the blank line is scanned as a new tag
                if is_directive(self.ch) {
                    self.mode = ScanMode::NewTag;
                    return None;
                }
                self.mark();
                self.indent = self.offset - self.line_offset;
                return Some(Token::Section(PARAGRAPH_TAG.to_string()));
            }
        }

        let mut result = String::new();
        let mut colon = false;
        while let Some(c) = self.ch {
            if matches!(c, '{' | '}' | '~' | '`' | '$' | '_' | '*')
                || (newline && is_directive(Some(c)))
                || (self.layout == TextLayout::Table && c == '|')
                || (self.layout == TextLayout::Paragraph && c == '\n' && colon)
            {
                break;
            }
            if newline && c == '\n' {
                self.next();
                self.mode = ScanMode::NewTag;
                break;
            }
            if c == '\r' || c == '\n' || (newline && (c == ' ' || c == '\t')) {
                self.next();
                newline = true;
                continue;
            }
            newline = false;
            match c {
                ':' => colon = true,
                '\\' => {
                    colon = false;
                    result.push_str(&self.text(start, self.offset));
                    self.next();
                    start = self.offset;
                }
                ' ' | '\t' => {}
                _ => colon = false,
            }
            self.next();
        }
        result.push_str(&self.text(start, self.offset));

        if newline && is_directive(self.ch) {
            self.mode = ScanMode::NewTag;
        } else if colon && self.layout == TextLayout::Paragraph && self.ch == Some('\n') {
            self.skip_whitespace(true);
            self.mode = ScanMode::NewTag;
            self.layout = TextLayout::Normal;
            let trimmed = result.trim_end_matches([' ', '\r', '\t', '\n']).len();
            result.truncate(trimmed);
        }
        Some(Token::Text(result))
    }
}

fn is_directive(ch: Option<char>) -> bool {
    matches!(ch, Some('#' | '-' | '+' | '>' | '%'))
}

/// Decode one multi-byte UTF-8 sequence from the front of `bytes`
fn decode_utf8(bytes: &[u8]) -> Option<(char, usize)> {
    let width = match bytes.first()? {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return None,
    };
    let seq = bytes.get(..width)?;
    let ch = std::str::from_utf8(seq).ok()?.chars().next()?;
    Some((ch, width))
}

/// Scan a whole input in the initial mode. Useful for inspecting how a
/// snippet tokenizes; the parser drives the scanner itself.
pub fn tokenize(src: &[u8]) -> (Vec<SpannedToken>, Vec<ScanError>) {
    let mut scanner = Scanner::new(src);
    let mut tokens = Vec::new();
    loop {
        let token = scanner.scan();
        let done = token.token == Token::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }
    (tokens, scanner.take_errors())
}

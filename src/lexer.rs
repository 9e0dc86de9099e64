//! Tokenization of SystemVerilog source text into the coarse categories the
//! preprocessor operates on.
use std::fmt::{self, Display, Formatter};

use crate::source::BufferId;

/// A location in a loaded source buffer, 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub buffer: BufferId,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(buffer: BufferId, line: u32, column: u32) -> Self {
        Self {
            buffer,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriviaKind {
    Whitespace,
    LineComment,
    BlockComment,
}

/// Whitespace and comments preceding a token. Preserved so that the
/// preprocessed output can reproduce the original layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trivia {
    pub kind: TriviaKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A language keyword such as `module` or `wire`.
    Keyword,
    /// A simple identifier.
    Identifier,
    /// A `$name` system task or function reference.
    SystemName,
    /// A decimal number (also covers the digit runs of sized literals).
    Number,
    /// A `'b`/`'o`/`'d`/`'h` base specifier, optionally signed.
    IntegerBase,
    /// A double-quoted string literal, quotes included in the text.
    StringLiteral,
    /// A backtick directive reference; the text includes the backtick.
    Directive,
    /// A single punctuation character.
    Symbol,
    EndOfFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub trivia: Vec<Trivia>,
    pub location: SourceLocation,
    /// Name of the macro this token was expanded from, if any.
    pub expanded_from: Option<String>,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::EndOfFile
    }

    /// The token's text with its leading trivia, as it appears in source.
    pub fn write_to(&self, out: &mut String, include_comments: bool) {
        for trivia in &self.trivia {
            match trivia.kind {
                TriviaKind::Whitespace => out.push_str(&trivia.text),
                TriviaKind::LineComment | TriviaKind::BlockComment if include_comments => {
                    out.push_str(&trivia.text);
                }
                _ => {}
            }
        }
        out.push_str(&self.text);
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

const KEYWORDS: &[&str] = &[
    "alias", "always", "always_comb", "always_ff", "always_latch", "and", "assign", "automatic",
    "begin", "bit", "break", "byte", "case", "casex", "casez", "class", "const", "continue",
    "default", "defparam", "disable", "dist", "do", "edge", "else", "end", "endcase", "endclass",
    "endfunction", "endgenerate", "endinterface", "endmodule", "endpackage", "endprogram",
    "endtask", "enum", "event", "final", "for", "force", "foreach", "forever", "fork", "function",
    "generate", "genvar", "if", "iff", "import", "initial", "inout", "input", "int", "integer",
    "interface", "join", "join_any", "join_none", "localparam", "logic", "longint", "modport",
    "module", "negedge", "new", "nor", "not", "or", "output", "package", "packed", "parameter",
    "posedge", "program", "real", "realtime", "reg", "release", "repeat", "return", "shortint",
    "shortreal", "signed", "static", "string", "struct", "supply0", "supply1", "task", "time",
    "timeprecision", "timeunit", "tri", "typedef", "union", "unique", "unsigned", "var", "void",
    "wait", "while", "wire", "xnor", "xor",
];

pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.binary_search(&text).is_ok()
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

struct Cursor<'a> {
    rest: &'a str,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.rest.chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.rest = &self.rest[c.len_utf8()..];
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}

/// Lexes an entire buffer. The final token is always `EndOfFile`, carrying
/// any trailing trivia.
pub fn lex(text: &str, buffer: BufferId) -> Vec<Token> {
    let mut cursor = Cursor {
        rest: text,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();

    loop {
        let trivia = lex_trivia(&mut cursor);
        let location = SourceLocation::new(buffer, cursor.line, cursor.column);
        let Some(c) = cursor.peek() else {
            tokens.push(Token {
                kind: TokenKind::EndOfFile,
                text: String::new(),
                trivia,
                location,
                expanded_from: None,
            });
            return tokens;
        };

        let (kind, text) = if is_ident_start(c) {
            let word = cursor.take_while(is_ident_char);
            if is_keyword(&word) {
                (TokenKind::Keyword, word)
            } else {
                (TokenKind::Identifier, word)
            }
        } else if c.is_ascii_digit() {
            (TokenKind::Number, cursor.take_while(|c| c.is_ascii_digit() || c == '_'))
        } else if c == '$' {
            cursor.bump();
            let name = cursor.take_while(is_ident_char);
            (TokenKind::SystemName, format!("${}", name))
        } else if c == '`' {
            cursor.bump();
            let name = cursor.take_while(is_ident_char);
            (TokenKind::Directive, format!("`{}", name))
        } else if c == '\'' && is_base_char(&cursor) {
            (TokenKind::IntegerBase, lex_base(&mut cursor))
        } else if c == '"' {
            (TokenKind::StringLiteral, lex_string(&mut cursor))
        } else {
            cursor.bump();
            (TokenKind::Symbol, c.to_string())
        };

        tokens.push(Token {
            kind,
            text,
            trivia,
            location,
            expanded_from: None,
        });
    }
}

fn lex_trivia(cursor: &mut Cursor<'_>) -> Vec<Trivia> {
    let mut trivia = Vec::new();
    loop {
        match cursor.peek() {
            Some(c) if c.is_whitespace() => {
                let text = cursor.take_while(char::is_whitespace);
                trivia.push(Trivia {
                    kind: TriviaKind::Whitespace,
                    text,
                });
            }
            Some('/') if cursor.peek_second() == Some('/') => {
                let mut text = String::new();
                while let Some(c) = cursor.peek() {
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                    cursor.bump();
                }
                trivia.push(Trivia {
                    kind: TriviaKind::LineComment,
                    text,
                });
            }
            Some('/') if cursor.peek_second() == Some('*') => {
                let mut text = String::from("/*");
                cursor.bump();
                cursor.bump();
                let mut prev = '\0';
                while let Some(c) = cursor.bump() {
                    text.push(c);
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                trivia.push(Trivia {
                    kind: TriviaKind::BlockComment,
                    text,
                });
            }
            _ => return trivia,
        }
    }
}

fn is_base_char(cursor: &Cursor<'_>) -> bool {
    let mut chars = cursor.rest.chars();
    chars.next();
    match chars.next() {
        Some('s') | Some('S') => matches!(
            chars.next(),
            Some('b' | 'B' | 'o' | 'O' | 'd' | 'D' | 'h' | 'H')
        ),
        Some('b' | 'B' | 'o' | 'O' | 'd' | 'D' | 'h' | 'H') => true,
        _ => false,
    }
}

fn lex_base(cursor: &mut Cursor<'_>) -> String {
    let mut text = String::new();
    text.push(cursor.bump().expect("caller checked for a base literal"));
    if matches!(cursor.peek(), Some('s') | Some('S')) {
        text.push(cursor.bump().expect("peeked sign char"));
    }
    text.push(cursor.bump().expect("caller checked for a base char"));
    text
}

fn lex_string(cursor: &mut Cursor<'_>) -> String {
    let mut text = String::new();
    text.push(cursor.bump().expect("caller checked for a quote"));
    while let Some(c) = cursor.bump() {
        text.push(c);
        if c == '\\' {
            if let Some(escaped) = cursor.bump() {
                text.push(escaped);
            }
        } else if c == '"' {
            break;
        }
    }
    text
}

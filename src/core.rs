//! Core types shared by most of the program
use colored::Colorize;
use std::{fmt, io};

/// Sentinel node id: the empty list, and the end of every list chain.
pub const NONE: u32 = u32::MAX;

/// The append-only source buffer.
///
/// Tokens and AST nodes store 32-bit offsets into this buffer instead of
/// copies of the text, so the buffer has to outlive everything downstream.
/// Symbol and string extents are recovered by re-scanning from the offset.
#[derive(Default)]
pub struct Source {
    text: String,
}

impl Source {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Source { text: text.into() }
    }

    /// Append program text to the buffer, verbatim.
    pub fn feed(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn len(&self) -> u32 {
        self.text.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn byte(&self, offset: u32) -> Option<u8> {
        self.text.as_bytes().get(offset as usize).copied()
    }

    /// A character is part of a symbol if it is ASCII alphanumeric or one of
    /// `+ - = <`.
    pub fn is_symbol_byte(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'=' || b == b'<'
    }

    /// The maximal run of symbol characters starting at `offset`.
    pub fn symbol_at(&self, offset: u32) -> &str {
        let start = offset as usize;
        let bytes = self.text.as_bytes();
        let mut end = start;
        while end < bytes.len() && Self::is_symbol_byte(bytes[end]) {
            end += 1;
        }
        &self.text[start..end]
    }

    /// The raw lexeme of a string literal whose opening quote is at `offset`,
    /// without the quotes. Escape pairs are left as written.
    pub fn string_at(&self, offset: u32) -> &str {
        let start = offset as usize + 1;
        let bytes = self.text.as_bytes();
        let mut end = start;
        while end < bytes.len() && bytes[end] != b'"' {
            // An escape consumes the next character no matter what it is.
            if bytes[end] == b'\\' && end + 1 < bytes.len() {
                end += 1;
            }
            end += 1;
        }
        &self.text[start..end.min(bytes.len())]
    }

    /// 1-based line and column of an offset.
    pub fn position(&self, offset: u32) -> (u32, u32) {
        let mut line = 1;
        let mut start = 0;
        for (i, b) in self.text.bytes().enumerate().take(offset as usize) {
            if b == b'\n' {
                line += 1;
                start = i + 1;
            }
        }
        (line, offset - start as u32 + 1)
    }

    /// The full text of the line containing `offset`, without the newline.
    pub fn line_text(&self, offset: u32) -> &str {
        let bytes = self.text.as_bytes();
        let at = (offset as usize).min(bytes.len());
        let start = self.text[..at].rfind('\n').map_or(0, |i| i + 1);
        let end = self.text[at..].find('\n').map_or(self.text.len(), |i| at + i);
        self.text[start..end].trim_end_matches('\r')
    }
}

/// Token kinds produced by the tokenizer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Symbol,
    Str,
}

/// A token is a source offset plus a kind; the offset points at the first
/// character of the lexeme.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Token {
    pub index: u32,
    pub kind: TokenKind,
}

/// AST nodes, stored in a contiguous arena and addressed by 32-bit ids.
///
/// Lists are singly linked cells; `next` chains the cells of one list and
/// terminates at [`NONE`]. An empty list is `NONE` itself, never a cell.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Node {
    List { elem: u32, next: u32 },
    Symbol { offset: u32 },
    Str { offset: u32 },
}

#[derive(Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn push(&mut self, node: Node) -> u32 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> Node {
        self.nodes[id as usize]
    }

    pub fn set(&mut self, id: u32, node: Node) {
        self.nodes[id as usize] = node;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The element ids of the list starting at `id`, in source order.
    pub fn elems(&self, mut id: u32) -> Vec<u32> {
        let mut out = Vec::new();
        while id != NONE {
            match self.get(id) {
                Node::List { elem, next } => {
                    out.push(elem);
                    id = next;
                }
                // A non-list node has no chain to follow.
                _ => {
                    out.push(id);
                    break;
                }
            }
        }
        out
    }

    /// Render an expression back to surface syntax.
    pub fn pretty(&self, source: &Source, id: u32) -> String {
        if id == NONE {
            return String::from("()");
        }
        match self.get(id) {
            Node::Symbol { offset } => source.symbol_at(offset).to_string(),
            Node::Str { offset } => format!("\"{}\"", source.string_at(offset)),
            Node::List { .. } => {
                let inner: Vec<String> =
                    self.elems(id).iter().map(|&e| self.pretty(source, e)).collect();
                format!("({})", inner.join(" "))
            }
        }
    }
}

/// Control behavior and external interaction of the program.
pub struct Config {
    /// Program is the input source
    pub program: String,
    /// Name of the generated C unit and executable, stdout otherwise
    pub output: String,
}

impl Config {
    pub fn c_file(&self) -> String {
        let stdout = String::from("/dev/stdout");
        if self.output == stdout {
            stdout
        } else {
            format!("{}.c", self.output)
        }
    }
}

/// Custom error type for all of lolc
#[derive(Debug)]
pub enum Error {
    /// A byte the tokenizer has no transition for, with its position
    UnexpectedChar { ch: char, line: u32, column: u32, text: String },
    /// R-paren or end of stream where the parser needed an expression
    UnexpectedEndOfList,
    /// `()` in expression position
    EmptyCall,
    /// A special form with the wrong shape
    Lowering(String),
    /// A free symbol that is not a built-in
    UnknownPrimitive(String),
    /// An instruction the code generator must not see anymore
    Codegen(String),
    /// Unexpected errors within the compiler
    Internal { message: String, e: Option<io::Error> },
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Internal { message: String::new(), e: Some(error) }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnexpectedChar { ch, line, column, text } => {
                writeln!(f, "{}\n", "Failed to tokenize program".red().bold())?;
                writeln!(f, "char: \"{}\", line: {}, column: {}", ch, line, column)?;
                writeln!(f, "    {}", text)
            }
            Self::UnexpectedEndOfList => {
                writeln!(f, "{}\n", "Failed to parse program".red().bold())?;
                writeln!(f, "unexpected end of list")
            }
            Self::EmptyCall => {
                writeln!(f, "{}\n", "Failed to compile program".red().bold())?;
                writeln!(f, "empty call detected")
            }
            Self::Lowering(e) | Self::Codegen(e) => {
                writeln!(f, "{}\n", "Failed to compile program".red().bold())?;
                writeln!(f, "{}", e)
            }
            Self::UnknownPrimitive(sym) => {
                writeln!(f, "{}\n", "Failed to compile program".red().bold())?;
                writeln!(f, "unknown primitive: {}", sym)
            }
            Self::Internal { message, e } => {
                writeln!(f, "{}\n", "Something went wrong!".red().bold())?;
                writeln!(f, "{}", message)?;
                writeln!(f, "{:?}", e)
            }
        }
    }
}

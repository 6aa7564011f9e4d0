//! UTF-8 scanner for litua input syntax (spec §3, §4.1).
//!
//! The lexer is a hand-written recursive scanner rather than a
//! regex/pattern-table tokenizer like `lang_pt::lexeme::Pattern` — the
//! grammar's context-dependent delimiter family (`{<…>}`, `{<<…>>}`, … up to
//! 126 angle brackets, each needing an *exact*-length closing run) and the
//! brace-nesting needed to find a `Function`'s matching `}` are not well
//! served by a single regular expression.

use crate::error::{Diagnostic, LituaError};
use crate::source::Code;

/// Maximum number of `<` characters a raw-string opener may carry.
pub const MAX_RAW_STRING_DEPTH: u8 = 126;

/// One token of the litua input grammar, carrying the byte offset at which
/// it starts for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Text(String),
    CallOpen,
    CallName(String),
    ArgOpen,
    ArgKey(String),
    ArgEq,
    ArgClose,
    CallClose,
    Whitespace(String),
    /// `content` is the full literal span between the opening `<^k` and the
    /// closing `>^k` (it therefore already includes `leading_ws`/
    /// `trailing_ws`, which are broken out separately only so the parser can
    /// attach them as the `=whitespace`/`=whitespace-after` meta-args).
    RawString {
        content: String,
        depth: u8,
        leading_ws: String,
        trailing_ws: String,
    },
}

/// litua's whitespace grammar is "any of the 25 Unicode whitespace code
/// points", which is exactly the set `char::is_whitespace` recognizes (the
/// Unicode `White_Space` property).
fn is_litua_whitespace(c: char) -> bool {
    c.is_whitespace()
}

fn is_call_name_char(c: char) -> bool {
    !matches!(c, '{' | '}' | '[' | '<' | '=') && !is_litua_whitespace(c)
}

fn is_arg_key_char(c: char) -> bool {
    c != '=' && !is_litua_whitespace(c)
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LituaError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    lexer.scan_sequence(&mut tokens, Terminator::Eof)?;
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Eof,
    CallClose,
    ArgClose,
}

struct Lexer<'s> {
    code: Code<'s>,
    chars: Vec<(usize, char)>,
    pos: usize, // index into `chars`
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            code: Code::new(source),
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn src(&self) -> &'s str {
        self.code.value
    }

    fn byte_offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(o, _)| *o)
            .unwrap_or_else(|| self.src().len())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn lex_error(&self, offset: usize, message: impl Into<String>) -> LituaError {
        let position = self.code.position_at(offset);
        LituaError::Lex(Diagnostic::new(message.into()).at(position))
    }

    /// Scans a `(Text | RawString | Function)*` sequence until `terminator`
    /// is reached. The terminating delimiter itself (`}` or `]`) is left
    /// unconsumed for the caller to verify and consume.
    fn scan_sequence(
        &mut self,
        tokens: &mut Vec<Token>,
        terminator: Terminator,
    ) -> Result<(), LituaError> {
        loop {
            match self.peek() {
                None => {
                    if terminator == Terminator::Eof {
                        return Ok(());
                    }
                    return Err(self.lex_error(self.byte_offset(), "unbalanced braces: reached end of file while looking for a closing delimiter"));
                }
                Some('}') if terminator == Terminator::CallClose => return Ok(()),
                Some(']') if terminator == Terminator::ArgClose => return Ok(()),
                Some('}') => {
                    return Err(self.lex_error(self.byte_offset(), "unbalanced braces: unexpected '}' with no matching '{'"));
                }
                Some(']') => {
                    return Err(self.lex_error(self.byte_offset(), "unbalanced braces: unexpected ']' with no matching '['"));
                }
                Some('{') => self.scan_brace_construct(tokens)?,
                Some(_) => self.scan_text(tokens, terminator),
            }
        }
    }

    /// Scans a run of plain text up to the next structurally significant
    /// character for the current context.
    fn scan_text(&mut self, tokens: &mut Vec<Token>, terminator: Terminator) {
        let start_offset = self.byte_offset();
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('{') | Some('}') => break,
                Some(']') if terminator == Terminator::ArgClose => break,
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
                None => break,
            }
        }
        if !text.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Text(text),
                offset: start_offset,
            });
        }
    }

    /// Dispatches on `{`: either a raw string (`{<…`) or a function call.
    fn scan_brace_construct(&mut self, tokens: &mut Vec<Token>) -> Result<(), LituaError> {
        let open_offset = self.byte_offset();
        self.bump(); // consume '{'

        if self.peek() == Some('<') {
            return self.scan_raw_string(tokens, open_offset);
        }
        self.scan_function(tokens, open_offset)
    }

    fn scan_raw_string(
        &mut self,
        tokens: &mut Vec<Token>,
        open_offset: usize,
    ) -> Result<(), LituaError> {
        let mut depth: u32 = 0;
        while self.peek() == Some('<') {
            self.bump();
            depth += 1;
            if depth > MAX_RAW_STRING_DEPTH as u32 {
                return Err(self.lex_error(
                    open_offset,
                    format!(
                        "raw string opener exceeds the maximum depth of {MAX_RAW_STRING_DEPTH}"
                    ),
                ));
            }
        }
        let depth = depth as u8;

        match self.peek() {
            Some(c) if is_litua_whitespace(c) => {}
            _ => {
                return Err(self.lex_error(
                    self.byte_offset(),
                    "invalid raw-string opener: expected whitespace after '<' run",
                ));
            }
        }

        let content_start = self.byte_offset();

        // Find the earliest position where a whitespace run is immediately
        // followed by exactly `depth` '<'-matching '>' characters and a
        // closing '}'. Shorter or longer '>' runs are literal content.
        let mut ws_run_start: Option<usize> = None; // index into self.chars
        let (run_start_idx, run_start_offset, close_brace_offset, end_offset) = loop {
            let Some(c) = self.peek() else {
                return Err(self.lex_error(
                    open_offset,
                    "unterminated raw string: reached end of file before closing delimiter",
                ));
            };
            if is_litua_whitespace(c) {
                if ws_run_start.is_none() {
                    ws_run_start = Some(self.pos);
                }
                self.bump();
                continue;
            }
            if c == '>' && ws_run_start.is_some() {
                let run_start_idx = self.pos;
                let run_start_offset = self.byte_offset();
                let mut run_len: u32 = 0;
                while self.peek() == Some('>') {
                    self.bump();
                    run_len += 1;
                }
                if run_len == depth as u32 && self.peek() == Some('}') {
                    let close_brace_offset = self.byte_offset();
                    self.bump(); // consume '}'
                    let end_offset = self.byte_offset();
                    break (run_start_idx, run_start_offset, close_brace_offset, end_offset);
                } else {
                    // not a match: these '>' are literal, whitespace run breaks
                    ws_run_start = None;
                    continue;
                }
            }
            ws_run_start = None;
            self.bump();
        };
        let _ = close_brace_offset;

        let content = self.src()[content_start..run_start_offset].to_string();

        // leading_ws: the maximal whitespace run starting at content_start.
        let mut leading_end = content_start;
        for &(offset, c) in &self.chars[self.index_of(content_start)..] {
            if is_litua_whitespace(c) {
                leading_end = offset + c.len_utf8();
            } else {
                break;
            }
        }
        let leading_ws = self.src()[content_start..leading_end].to_string();

        let closing_ws_start_offset = self.chars[ws_run_start.unwrap_or(run_start_idx)].0;
        let trailing_ws = self.src()[closing_ws_start_offset..run_start_offset].to_string();

        tokens.push(Token {
            kind: TokenKind::RawString {
                content,
                depth,
                leading_ws,
                trailing_ws,
            },
            offset: open_offset,
        });
        let _ = end_offset;
        Ok(())
    }

    fn index_of(&self, byte_offset: usize) -> usize {
        self.chars
            .iter()
            .position(|(o, _)| *o == byte_offset)
            .unwrap_or(self.chars.len())
    }

    fn scan_function(
        &mut self,
        tokens: &mut Vec<Token>,
        open_offset: usize,
    ) -> Result<(), LituaError> {
        tokens.push(Token {
            kind: TokenKind::CallOpen,
            offset: open_offset,
        });

        if self.peek() == Some('}') {
            return Err(self.lex_error(
                open_offset,
                "empty call name: '{}' is not a valid function",
            ));
        }

        let name_offset = self.byte_offset();
        match self.peek() {
            Some(c) if matches!(c, '}' | '[' | '<') => {
                return Err(self.lex_error(
                    name_offset,
                    format!("invalid call name: cannot start with '{c}'"),
                ));
            }
            None => {
                return Err(self.lex_error(
                    name_offset,
                    "unbalanced braces: reached end of file while reading a call name",
                ));
            }
            _ => {}
        }

        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_call_name_char(c) {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.lex_error(name_offset, "empty call name"));
        }
        tokens.push(Token {
            kind: TokenKind::CallName(name),
            offset: name_offset,
        });

        while self.peek() == Some('[') {
            self.scan_arg_group(tokens)?;
        }

        if let Some(c) = self.peek() {
            if is_litua_whitespace(c) {
                let ws_offset = self.byte_offset();
                let mut ws = String::new();
                while let Some(c) = self.peek() {
                    if is_litua_whitespace(c) {
                        ws.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Whitespace(ws),
                    offset: ws_offset,
                });
            }
        }

        self.scan_sequence(tokens, Terminator::CallClose)?;

        match self.peek() {
            Some('}') => {
                let close_offset = self.byte_offset();
                self.bump();
                tokens.push(Token {
                    kind: TokenKind::CallClose,
                    offset: close_offset,
                });
                Ok(())
            }
            _ => Err(self.lex_error(
                open_offset,
                "unbalanced braces: missing closing '}' for function",
            )),
        }
    }

    fn scan_arg_group(&mut self, tokens: &mut Vec<Token>) -> Result<(), LituaError> {
        let open_offset = self.byte_offset();
        self.bump(); // consume '['
        tokens.push(Token {
            kind: TokenKind::ArgOpen,
            offset: open_offset,
        });

        let key_offset = self.byte_offset();
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if c == '=' || c == ']' {
                break;
            }
            if is_arg_key_char(c) {
                key.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if key.is_empty() {
            return Err(self.lex_error(key_offset, "empty argument key in '[...]' group"));
        }
        tokens.push(Token {
            kind: TokenKind::ArgKey(key),
            offset: key_offset,
        });

        match self.peek() {
            Some('=') => {
                let eq_offset = self.byte_offset();
                self.bump();
                tokens.push(Token {
                    kind: TokenKind::ArgEq,
                    offset: eq_offset,
                });
            }
            _ => {
                return Err(self.lex_error(
                    self.byte_offset(),
                    "expected '=' after argument key",
                ));
            }
        }

        self.scan_sequence(tokens, Terminator::ArgClose)?;

        match self.peek() {
            Some(']') => {
                let close_offset = self.byte_offset();
                self.bump();
                tokens.push(Token {
                    kind: TokenKind::ArgClose,
                    offset: close_offset,
                });
                Ok(())
            }
            _ => Err(self.lex_error(
                open_offset,
                "unbalanced braces: missing closing ']' for argument group",
            )),
        }
    }
}

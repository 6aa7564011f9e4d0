//! Token stream → `Node` tree (spec §4.2).

use crate::error::{Diagnostic, LituaError};
use crate::lexer::{Token, TokenKind};
use crate::node::{ArgValue, Child, Node, WHITESPACE_META_KEY};
use crate::source::Code;
use std::iter::Peekable;
use std::vec::IntoIter;

pub fn parse(tokens: Vec<Token>, source: &str) -> Result<Node, LituaError> {
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
        code: Code::new(source),
    };
    let content = parser.parse_sequence()?;
    if let Some(leftover) = parser.tokens.next() {
        return Err(parser.parse_error(
            leftover.offset,
            "unexpected trailing token after the top-level document",
        ));
    }
    Ok(Node::document(content))
}

struct Parser<'s> {
    tokens: Peekable<IntoIter<Token>>,
    code: Code<'s>,
}

impl<'s> Parser<'s> {
    fn parse_error(&self, offset: usize, message: impl Into<String>) -> LituaError {
        let position = self.code.position_at(offset);
        LituaError::Parse(Diagnostic::new(message.into()).at(position))
    }

    /// Parses a `(Text | RawString | Function)*` run, stopping (without
    /// consuming) at a `CallClose`/`ArgClose` that belongs to an enclosing
    /// construct, or at end of input.
    fn parse_sequence(&mut self) -> Result<Vec<Child>, LituaError> {
        let mut children = Vec::new();
        loop {
            match self.tokens.peek().map(|t| &t.kind) {
                None => break,
                Some(TokenKind::CallClose) | Some(TokenKind::ArgClose) => break,
                Some(TokenKind::Text(_)) => {
                    let token = self.tokens.next().unwrap();
                    let TokenKind::Text(text) = token.kind else {
                        unreachable!()
                    };
                    children.push(Child::Text(text));
                }
                Some(TokenKind::RawString { .. }) => {
                    let token = self.tokens.next().unwrap();
                    let TokenKind::RawString {
                        content,
                        depth,
                        leading_ws,
                        trailing_ws,
                    } = token.kind
                    else {
                        unreachable!()
                    };
                    let node = Node::raw_string(depth, content, leading_ws, trailing_ws);
                    children.push(Child::Node(node));
                }
                Some(TokenKind::CallOpen) => {
                    let node = self.parse_function()?;
                    children.push(Child::Node(node));
                }
                Some(TokenKind::Whitespace(_)) => {
                    // Only ever emitted by the lexer directly before a
                    // function's content, which `parse_function` consumes
                    // itself; a bare one here would mean the lexer produced
                    // a token outside its documented grammar.
                    let token = self.tokens.next().unwrap();
                    let TokenKind::Whitespace(ws) = token.kind else {
                        unreachable!()
                    };
                    children.push(Child::Text(ws));
                }
                Some(other) => {
                    let offset = self.tokens.peek().unwrap().offset;
                    return Err(self.parse_error(
                        offset,
                        format!("unexpected token in content position: {other:?}"),
                    ));
                }
            }
        }
        Ok(children)
    }

    fn expect_call_open(&mut self) -> Result<(), LituaError> {
        match self.tokens.next() {
            Some(Token {
                kind: TokenKind::CallOpen,
                ..
            }) => Ok(()),
            Some(token) => Err(self.parse_error(token.offset, "expected the start of a function")),
            None => Err(self.parse_error(0, "unexpected end of input, expected a function")),
        }
    }

    fn parse_function(&mut self) -> Result<Node, LituaError> {
        self.expect_call_open()?;

        let name_token = self.tokens.next().ok_or_else(|| {
            self.parse_error(0, "unexpected end of input, expected a call name")
        })?;
        let TokenKind::CallName(name) = name_token.kind else {
            return Err(self.parse_error(name_token.offset, "expected a call name"));
        };
        let mut node = Node::new(name);

        while matches!(self.tokens.peek().map(|t| &t.kind), Some(TokenKind::ArgOpen)) {
            self.parse_arg_group(&mut node)?;
        }

        if matches!(
            self.tokens.peek().map(|t| &t.kind),
            Some(TokenKind::Whitespace(_))
        ) {
            let token = self.tokens.next().unwrap();
            let TokenKind::Whitespace(ws) = token.kind else {
                unreachable!()
            };
            node.set_single_arg(WHITESPACE_META_KEY, ArgValue::Text(ws));
        }

        node.content = self.parse_sequence()?;

        match self.tokens.next() {
            Some(Token {
                kind: TokenKind::CallClose,
                ..
            }) => Ok(node),
            Some(token) => Err(self.parse_error(token.offset, "expected closing '}' for function")),
            None => Err(self.parse_error(0, "unexpected end of input, expected closing '}'")),
        }
    }

    fn parse_arg_group(&mut self, node: &mut Node) -> Result<(), LituaError> {
        let open = self.tokens.next().unwrap(); // ArgOpen, checked by caller
        let _ = open;

        let key_token = self
            .tokens
            .next()
            .ok_or_else(|| self.parse_error(0, "unexpected end of input, expected argument key"))?;
        let TokenKind::ArgKey(key) = key_token.kind else {
            return Err(self.parse_error(key_token.offset, "expected argument key"));
        };

        match self.tokens.next() {
            Some(Token {
                kind: TokenKind::ArgEq,
                ..
            }) => {}
            Some(token) => return Err(self.parse_error(token.offset, "expected '=' in argument group")),
            None => return Err(self.parse_error(0, "unexpected end of input, expected '='")),
        }

        let values = self.parse_sequence()?;
        for child in values {
            let value = match child {
                Child::Text(t) => ArgValue::Text(t),
                Child::Node(n) => ArgValue::Node(n),
            };
            node.push_arg(key.clone(), value);
        }

        match self.tokens.next() {
            Some(Token {
                kind: TokenKind::ArgClose,
                ..
            }) => Ok(()),
            Some(token) => Err(self.parse_error(token.offset, "expected closing ']' for argument group")),
            None => Err(self.parse_error(0, "unexpected end of input, expected closing ']'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(src: &str) -> Node {
        let tokens = tokenize(src).unwrap();
        parse(tokens, src).unwrap()
    }

    #[test]
    fn parses_plain_text_into_document() {
        let doc = parse_source("hello");
        assert_eq!(doc.call, "document");
        assert_eq!(doc.content.len(), 1);
        assert!(matches!(&doc.content[0], Child::Text(t) if t == "hello"));
    }

    #[test]
    fn parses_nested_calls() {
        let doc = parse_source("{outer {inner}}");
        let outer = doc.content[0].as_node().unwrap();
        assert_eq!(outer.call, "outer");
        assert_eq!(outer.get_arg(WHITESPACE_META_KEY).unwrap().len(), 1);
        let inner = outer.content[0].as_node().unwrap();
        assert_eq!(inner.call, "inner");
    }

    #[test]
    fn parses_args_in_order_with_repeats() {
        let doc = parse_source("{let[who=a][who=b]}");
        let node = doc.content[0].as_node().unwrap();
        let values = node.get_arg("who").unwrap();
        assert_eq!(values.len(), 2);
        assert!(matches!(&values[0], ArgValue::Text(t) if t == "a"));
        assert!(matches!(&values[1], ArgValue::Text(t) if t == "b"));
    }

    #[test]
    fn parses_raw_string_as_angle_call() {
        let doc = parse_source("{<< hi >>}");
        let node = doc.content[0].as_node().unwrap();
        assert_eq!(node.call, "<<");
        assert_eq!(node.raw_string_depth(), Some(2));
    }

    #[test]
    fn round_trips_identity_string() {
        let src = "{let[who=tajpulo]}Hello {who}";
        let doc = parse_source(src);
        let reparsed = {
            let out = doc.tostring();
            let tokens = tokenize(&out).unwrap();
            parse(tokens, &out).unwrap()
        };
        assert_eq!(doc.tostring(), reparsed.tostring());
    }
}

//! The `Node` tree entity (spec §3, §4.3).

use crate::error::{Diagnostic, LituaError};
use std::fmt;
use std::rc::Rc;

pub const DOCUMENT_CALL: &str = "document";
pub const LEFT_CURLY_BRACE_CALL: &str = "left-curly-brace";
pub const RIGHT_CURLY_BRACE_CALL: &str = "right-curly-brace";

pub const WHITESPACE_META_KEY: &str = "=whitespace";
pub const WHITESPACE_AFTER_META_KEY: &str = "=whitespace-after";

/// The published attribute surface of a `Node` (spec §4.3). Anything else
/// raises [`LituaError::NodeAccess`] — this is the restriction the extension
/// bridge enforces on script-visible field access.
const PUBLISHED_ATTRIBUTES: &[&str] = &["call", "args", "content", "copy", "is_node", "tostring", "totext"];

/// An argument value: either literal text or a nested call (spec §3).
#[derive(Clone)]
pub enum ArgValue {
    Text(String),
    Node(Node),
}

/// A content child: either literal text or a nested call. Also the variant
/// a phase-4 hook's "replace with text" return populates (spec §9,
/// "Replace-with-text").
#[derive(Clone)]
pub enum Child {
    Text(String),
    Node(Node),
}

impl Child {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Child::Node(n) => Some(n),
            Child::Text(_) => None,
        }
    }
}

type ToStringOverride = Rc<dyn Fn(&Node) -> String>;

/// The central tree entity.
///
/// `args` and `content` preserve source order (invariant 4); argument
/// iteration in contexts where order is observable goes through
/// [`Node::sorted_args`], which sorts keys lexicographically rather than
/// storing them pre-sorted, since the data structure itself need not be
/// ordered (spec §9, "Sorting of arguments").
#[derive(Clone)]
pub struct Node {
    pub call: String,
    args: Vec<(String, Vec<ArgValue>)>,
    pub content: Vec<Child>,
    tostring_override: Option<ToStringOverride>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("call", &self.call)
            .field("args", &self.args.len())
            .field("content", &self.content.len())
            .finish()
    }
}

impl Node {
    pub fn new(call: impl Into<String>) -> Self {
        Self {
            call: call.into(),
            args: Vec::new(),
            content: Vec::new(),
            tostring_override: None,
        }
    }

    /// Builds the synthetic root, whose `tostring` override flattens its
    /// children's string forms instead of wrapping them in `{document …}`
    /// (spec §4.5 "Root serialization", §9 "Implicit root").
    pub fn document(content: Vec<Child>) -> Self {
        let mut node = Self::new(DOCUMENT_CALL);
        node.content = content;
        node.tostring_override = Some(Rc::new(|node: &Node| {
            node.content
                .iter()
                .map(|child| match child {
                    Child::Text(text) => text.clone(),
                    Child::Node(n) => n.tostring(),
                })
                .collect()
        }));
        node
    }

    pub fn with_tostring_override(mut self, f: impl Fn(&Node) -> String + 'static) -> Self {
        self.tostring_override = Some(Rc::new(f));
        self
    }

    /// Builds a raw-string node (call is a run of `depth` `<` characters).
    /// Its `tostring` override returns the bare literal content rather than
    /// the `{<^k …>^k}` wrapper `identity_string` would produce — a raw
    /// string exists to inject verbatim text into the reduced document, not
    /// to re-assert its own lexical delimiters (spec §8 scenario 4).
    /// `identity_string` (for round-tripping) is unaffected by this
    /// override and still reconstructs the full delimited form.
    pub fn raw_string(depth: u8, content: String, leading_ws: String, trailing_ws: String) -> Self {
        let mut node = Self::new("<".repeat(depth as usize));
        node.content = vec![Child::Text(content)];
        node.set_single_arg(WHITESPACE_META_KEY, ArgValue::Text(leading_ws));
        node.set_single_arg(WHITESPACE_AFTER_META_KEY, ArgValue::Text(trailing_ws));
        node.with_tostring_override(|n: &Node| n.text_only())
    }

    pub fn push_arg(&mut self, key: impl Into<String>, value: ArgValue) {
        let key = key.into();
        if let Some((_, values)) = self.args.iter_mut().find(|(k, _)| *k == key) {
            values.push(value);
        } else {
            self.args.push((key, vec![value]));
        }
    }

    pub fn set_single_arg(&mut self, key: impl Into<String>, value: ArgValue) {
        self.args.push((key.into(), vec![value]));
    }

    pub fn get_arg(&self, key: &str) -> Option<&[ArgValue]> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
    }

    /// Raw insertion-order view, for callers that don't need determinism
    /// (e.g. `copy`, internal reducers that re-sort themselves anyway).
    pub fn args(&self) -> &[(String, Vec<ArgValue>)] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Vec<(String, Vec<ArgValue>)> {
        &mut self.args
    }

    /// Argument entries sorted lexicographically by key — the iteration
    /// order spec §4.5/§9 requires for serialization and reducer dispatch.
    /// Meta-keys (`=whitespace`, `=whitespace-after`) are excluded since
    /// they aren't real `[k=v]` groups.
    pub fn sorted_args(&self) -> Vec<(&str, &[ArgValue])> {
        let mut entries: Vec<(&str, &[ArgValue])> = self
            .args
            .iter()
            .filter(|(k, _)| !k.starts_with('='))
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// If `call` is a run of one or more `<` characters (the internal
    /// raw-string representation, invariant 1), its depth.
    pub fn raw_string_depth(&self) -> Option<u8> {
        if !self.call.is_empty() && self.call.chars().all(|c| c == '<') {
            Some(self.call.len() as u8)
        } else {
            None
        }
    }

    pub fn is_reserved_escape(&self) -> Option<char> {
        match self.call.as_str() {
            LEFT_CURLY_BRACE_CALL => Some('{'),
            RIGHT_CURLY_BRACE_CALL => Some('}'),
            _ => None,
        }
    }

    /// A deep, independent duplicate (spec §4.3 `copy`). The `tostring`
    /// override, if any, is behavior rather than owned state, so the `Rc` is
    /// shared rather than re-synthesized.
    pub fn copy(&self) -> Node {
        self.clone()
    }

    /// Reserialize to a form that lexes back to a structurally equivalent
    /// node, using meta-keys and sorted argument iteration (spec §4.3,
    /// §8 "Round-trip").
    ///
    /// `=whitespace-after` is populated only on raw-string nodes: the
    /// `Function` grammar (§4.1) exposes a single `Whitespace` slot before
    /// `Node`, with no separate closing-whitespace production, so an
    /// ordinary call's trailing whitespace is just part of its last text
    /// child rather than a split-out meta value (see DESIGN.md).
    pub fn identity_string(&self) -> String {
        if let Some(depth) = self.raw_string_depth() {
            let angle = self.call.clone();
            let body: String = self
                .content
                .iter()
                .map(|child| match child {
                    Child::Text(t) => t.clone(),
                    Child::Node(n) => n.identity_string(),
                })
                .collect();
            let closer = ">".repeat(depth as usize);
            return format!("{{{angle}{body}{closer}}}");
        }

        let mut out = String::new();
        out.push('{');
        out.push_str(&self.call);
        for (key, values) in self.sorted_args() {
            for value in values {
                out.push('[');
                out.push_str(key);
                out.push('=');
                match value {
                    ArgValue::Text(t) => out.push_str(t),
                    ArgValue::Node(n) => out.push_str(&n.identity_string()),
                }
                out.push(']');
            }
        }
        if let Some(ws) = self.get_arg(WHITESPACE_META_KEY) {
            for v in ws {
                if let ArgValue::Text(t) = v {
                    out.push_str(t);
                }
            }
        }
        for child in &self.content {
            match child {
                Child::Text(t) => out.push_str(t),
                Child::Node(n) => out.push_str(&n.identity_string()),
            }
        }
        if let Some(ws) = self.get_arg(WHITESPACE_AFTER_META_KEY) {
            for v in ws {
                if let ArgValue::Text(t) = v {
                    out.push_str(t);
                }
            }
        }
        out.push('}');
        out
    }

    /// Concatenation of all text in `content`, recursive for child nodes,
    /// discarding call names, arguments, and whitespace meta (spec §4.3,
    /// §8 "Text projection").
    pub fn text_only(&self) -> String {
        self.content
            .iter()
            .map(|child| match child {
                Child::Text(t) => t.clone(),
                Child::Node(n) => n.text_only(),
            })
            .collect()
    }

    /// Dispatches to identity serialization unless the node carries an
    /// instance-level override (spec §4.3 `tostring`).
    pub fn tostring(&self) -> String {
        match &self.tostring_override {
            Some(f) => f(self),
            None => self.identity_string(),
        }
    }

    /// Enforces the restricted attribute set of spec §4.3: anything outside
    /// `{call, args, content, copy, is_node, tostring, totext}` is a
    /// [`LituaError::NodeAccess`].
    pub fn get_attribute(&self, name: &str) -> Result<Attribute, LituaError> {
        match name {
            "call" => Ok(Attribute::Text(self.call.clone())),
            "args" => Ok(Attribute::Args(self.args.clone())),
            "content" => Ok(Attribute::Content(self.content.clone())),
            "copy" => Ok(Attribute::Node(self.copy())),
            "is_node" => Ok(Attribute::Bool(true)),
            "tostring" => Ok(Attribute::Text(self.tostring())),
            "totext" => Ok(Attribute::Text(self.text_only())),
            other => Err(LituaError::NodeAccess(
                Diagnostic::new(format!("'{other}' is not a published Node attribute"))
                    .with_expected(PUBLISHED_ATTRIBUTES.join(", "))
                    .with_actual(other),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Attribute {
    Text(String),
    Args(Vec<(String, Vec<ArgValue>)>),
    Content(Vec<Child>),
    Node(Node),
    Bool(bool),
}

//! Litua is a text-document transformer: UTF-8 source written in a
//! bracketed markup grammar is lexed and parsed into a tree of calls, text,
//! and raw strings, handed to an extension layer that registers hooks
//! against a fixed eight-phase pipeline, and reduced back to a string.
//!
//! # Example
//!
//! ```
//! use litua::bridge::{Config, Litua};
//! use litua::logger::Verbosity;
//! use litua::registry::ConverterHook;
//! use std::path::PathBuf;
//! use std::rc::Rc;
//!
//! let mut litua = Litua::new(Config {
//!     input_path: PathBuf::from("doc.litua"),
//!     output_path: None,
//!     dump_lexed: false,
//!     dump_parsed: false,
//!     verbosity: Verbosity::Silent,
//! });
//!
//! let hook: ConverterHook = Rc::new(|node| Ok(node.text_only()));
//! litua
//!     .convert_node_to_string("shout", "doc.litua:1", hook)
//!     .unwrap();
//!
//! let result = litua.run("{shout hello}".to_string());
//! assert!(result.outcome.is_success());
//! assert_eq!(result.output, "hello");
//! ```

pub mod bridge;
pub mod cli;
pub mod error;
pub mod lexer;
pub mod logger;
pub mod node;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod source;

pub use bridge::{Config, Litua, Value};
pub use error::{Diagnostic, LituaError, RunOutcome};
pub use node::{ArgValue, Attribute, Child, Node};
pub use pipeline::PipelineResult;
pub use registry::{HookRegistry, ModifyReturn, Phase};
pub use source::{Code, Position};

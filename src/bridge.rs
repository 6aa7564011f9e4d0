//! `Litua`, the façade an extension author builds hooks against (spec §4.6).
//!
//! Hooks are native Rust closures rather than script-language callables
//! (SPEC_FULL.md §4), so the typed `on_setup`/`read_new_node`/… methods below
//! are the primary surface; [`Litua::register`] additionally exposes the
//! spec's "one generic registration function keyed by phase name" shape,
//! which is where [`LituaError::UnknownPhase`] and [`LituaError::InvalidHook`]
//! actually become reachable from outside the registry itself.

use crate::error::{Diagnostic, LituaError};
use crate::logger::{self, Verbosity};
use crate::node::Node;
use crate::pipeline::{self, PipelineResult};
use crate::registry::{
    unknown_phase_error, ConverterHook, HookRegistry, MutatorHook, Phase, ReaderHook, SetupHook,
    StringHook,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;

/// A value that can live in `Litua.global` or be passed to [`Litua::format`].
/// No structural constraints are placed on `global` by the spec beyond "the
/// core is free to log reads and writes"; this enum is the Rust stand-in for
/// the dynamically-typed values a scripting runtime would hand around.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Integer(i64),
    Bool(bool),
    Node(Node),
    List(Vec<Value>),
    /// Rendered as `{ [k] = v, … }` by [`Value::stringify`], keys sorted
    /// lexicographically for the same determinism reason `Node::sorted_args`
    /// sorts argument keys (spec §9 "Sorting of arguments").
    Map(Vec<(String, Value)>),
}

impl Value {
    /// The stringification rule `format` uses for substituted values (spec
    /// §4.6): text is single-quoted with its own quotes backslash-escaped;
    /// mappings render as `{ [k] = v, … }`.
    pub fn stringify(&self) -> String {
        match self {
            Value::Text(t) => format!("'{}'", t.replace('\'', "\\'")),
            Value::Integer(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Node(n) => n.tostring(),
            Value::List(items) => {
                let joined: Vec<String> = items.iter().map(Value::stringify).collect();
                format!("[{}]", joined.join(", "))
            }
            Value::Map(entries) => {
                let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                let joined: Vec<String> = sorted
                    .iter()
                    .map(|(k, v)| format!("[{k}] = {}", v.stringify()))
                    .collect();
                format!("{{ {} }}", joined.join(", "))
            }
        }
    }
}

/// A read-only snapshot assembled by the CLI from parsed arguments and
/// handed to [`Litua::new`] (spec §4.6 `Litua.config`).
#[derive(Debug, Clone)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub dump_lexed: bool,
    pub dump_parsed: bool,
    pub verbosity: Verbosity,
}

/// The shape a hook closure must have, tagged by phase family, for the
/// dynamic [`Litua::register`] entry point.
pub enum Hook {
    Setup(SetupHook),
    String(StringHook),
    Reader(ReaderHook),
    Mutator(MutatorHook),
    Converter(ConverterHook),
}

fn expected_shape_for(phase: Phase) -> &'static str {
    match phase {
        Phase::OnSetup | Phase::OnTeardown => "a Hook::Setup closure (fn() -> Result<(), LituaError>)",
        Phase::ModifyInitialString | Phase::ModifyFinalString => {
            "a Hook::String closure (fn(String) -> Result<String, LituaError>)"
        }
        Phase::ReadNewNode | Phase::ReadModifiedNode => {
            "a Hook::Reader closure (fn(&Node, usize) -> Result<(), LituaError>)"
        }
        Phase::ModifyNode => "a Hook::Mutator closure (fn(&Node, usize, &str) -> Result<ModifyReturn, LituaError>)",
        Phase::ConvertNodeToString => "a Hook::Converter closure (fn(&Node) -> Result<String, LituaError>)",
    }
}

fn invalid_hook_error(phase: Phase) -> LituaError {
    LituaError::InvalidHook(
        Diagnostic::new(format!("hook shape does not match phase '{}'", phase.name()))
            .with_expected(expected_shape_for(phase)),
    )
}

/// The extension author's entry point: a user-controlled global mapping, a
/// read-only config snapshot, the eight registration methods of spec §4.5,
/// and the diagnostic helpers of §4.6.
pub struct Litua {
    pub global: RefCell<HashMap<String, Value>>,
    pub config: Config,
    registry: HookRegistry,
}

impl Litua {
    pub fn new(config: Config) -> Self {
        Self {
            global: RefCell::new(HashMap::new()),
            config,
            registry: HookRegistry::new(),
        }
    }

    pub fn global_get(&self, key: &str) -> Option<Value> {
        self.log("global", format!("read '{key}'"));
        self.global.borrow().get(key).cloned()
    }

    pub fn global_set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.log("global", format!("write '{key}'"));
        self.global.borrow_mut().insert(key, value);
    }

    pub fn on_setup(&mut self, source: impl Into<String>, hook: SetupHook) {
        self.registry.register_on_setup(source, hook);
    }

    pub fn on_teardown(&mut self, source: impl Into<String>, hook: SetupHook) {
        self.registry.register_on_teardown(source, hook);
    }

    pub fn modify_initial_string(&mut self, source: impl Into<String>, hook: StringHook) {
        self.registry.register_modify_initial_string(source, hook);
    }

    pub fn modify_final_string(&mut self, source: impl Into<String>, hook: StringHook) {
        self.registry.register_modify_final_string(source, hook);
    }

    pub fn read_new_node(
        &mut self,
        filter: &str,
        source: impl Into<String>,
        hook: ReaderHook,
    ) -> Result<(), LituaError> {
        self.registry.register_read_new_node(filter, source, hook)
    }

    pub fn read_modified_node(
        &mut self,
        filter: &str,
        source: impl Into<String>,
        hook: ReaderHook,
    ) -> Result<(), LituaError> {
        self.registry.register_read_modified_node(filter, source, hook)
    }

    pub fn modify_node(
        &mut self,
        filter: &str,
        source: impl Into<String>,
        hook: MutatorHook,
    ) -> Result<(), LituaError> {
        self.registry.register_modify_node(filter, source, hook)
    }

    pub fn convert_node_to_string(
        &mut self,
        filter: &str,
        source: impl Into<String>,
        hook: ConverterHook,
    ) -> Result<(), LituaError> {
        self.registry.register_convert_node_to_string(filter, source, hook)
    }

    /// The single by-name registration entry point of spec §4.6: unknown
    /// phase names fail `UnknownPhase`, and a hook whose shape doesn't match
    /// its phase fails `InvalidHook` — both only reachable through this path,
    /// since the typed methods above are checked by the Rust compiler instead.
    pub fn register(
        &mut self,
        phase: &str,
        filter: &str,
        source: impl Into<String>,
        hook: Hook,
    ) -> Result<(), LituaError> {
        let parsed = Phase::parse(phase).ok_or_else(|| unknown_phase_error(phase))?;
        let source = source.into();
        match (parsed, hook) {
            (Phase::OnSetup, Hook::Setup(h)) => {
                self.on_setup(source, h);
                Ok(())
            }
            (Phase::OnTeardown, Hook::Setup(h)) => {
                self.on_teardown(source, h);
                Ok(())
            }
            (Phase::ModifyInitialString, Hook::String(h)) => {
                self.modify_initial_string(source, h);
                Ok(())
            }
            (Phase::ModifyFinalString, Hook::String(h)) => {
                self.modify_final_string(source, h);
                Ok(())
            }
            (Phase::ReadNewNode, Hook::Reader(h)) => self.read_new_node(filter, source, h),
            (Phase::ReadModifiedNode, Hook::Reader(h)) => self.read_modified_node(filter, source, h),
            (Phase::ModifyNode, Hook::Mutator(h)) => self.modify_node(filter, source, h),
            (Phase::ConvertNodeToString, Hook::Converter(h)) => {
                self.convert_node_to_string(filter, source, h)
            }
            (phase, _) => Err(invalid_hook_error(phase)),
        }
    }

    /// Builds a user-raised diagnostic for a hook body to return via `Err`
    /// (spec §4.6 `error(message, details)`).
    pub fn error(&self, message: impl Into<String>, details: impl Into<String>) -> LituaError {
        LituaError::Hook(Diagnostic::new(message.into()).with_context(details.into()))
    }

    /// Prints `LOG[<component>]: <text>`, gated by `self.config.verbosity`
    /// (spec §4.6 `log(component, message)`).
    pub fn log(&self, component: impl Display, message: impl Display) {
        logger::log(self.config.verbosity, Verbosity::Default, component, message);
    }

    /// Positional substitution of `%1`…`%9` in `template` (spec §4.6
    /// `format`). More than nine arguments is fatal; a `%` not followed by a
    /// digit in `1..=9` (including `%%` and a stray trailing `%`) is passed
    /// through literally, and a placeholder beyond `args.len()` is left
    /// unsubstituted rather than erroring, since the spec only bounds the
    /// *argument count*, not which placeholders a template may reference.
    pub fn format(&self, template: &str, args: &[Value]) -> Result<String, LituaError> {
        if args.len() > 9 {
            return Err(LituaError::FormatOverflow(
                Diagnostic::new(format!("format received {} positional arguments", args.len()))
                    .with_expected("at most 9 positional arguments (%1..%9)")
                    .with_actual(args.len().to_string()),
            ));
        }

        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.peek().and_then(|d| d.to_digit(10)) {
                Some(digit) if (1..=9).contains(&digit) => {
                    chars.next();
                    match args.get(digit as usize - 1) {
                        Some(value) => out.push_str(&value.stringify()),
                        None => {
                            out.push('%');
                            out.push_str(&digit.to_string());
                        }
                    }
                }
                _ => out.push('%'),
            }
        }
        Ok(out)
    }

    /// Runs the full eight-phase pipeline over `source` using the hooks
    /// registered on this façade.
    pub fn run(&self, source: String) -> PipelineResult {
        pipeline::run(source, &self.registry)
    }
}

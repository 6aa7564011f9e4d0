use crate::source::Position;
use std::fmt::{Display, Formatter};

/// A structured diagnostic, rendered as a multi-line `ERROR:`-prefixed block.
///
/// Every fatal condition the core can raise — lexing, parsing, hook
/// registration, hook-contract violations, restricted field access — is
/// carried as one of these rather than a bare string, so that callers (the
/// CLI, or an embedding host) can inspect `expected`/`actual` programmatically
/// instead of scraping text.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub context: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub fix: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            expected: None,
            actual: None,
            fix: None,
            source: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.context = Some(match self.context.take() {
            Some(existing) => format!("{existing} (at {position})"),
            None => format!("at {position}"),
        });
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;
        if let Some(context) = &self.context {
            writeln!(f, "  context:  {context}")?;
        }
        if let Some(expected) = &self.expected {
            writeln!(f, "  expected: {expected}")?;
        }
        if let Some(actual) = &self.actual {
            writeln!(f, "  actual:   {actual}")?;
        }
        if let Some(fix) = &self.fix {
            writeln!(f, "  fix:      {fix}")?;
        }
        if let Some(source) = &self.source {
            writeln!(f, "  source:   {source}")?;
        }
        Ok(())
    }
}

/// The error taxonomy of spec §7.
#[derive(Debug, Clone)]
pub enum LituaError {
    /// Malformed grammar at a byte position: unbalanced braces, an empty
    /// call, an invalid raw-string terminator.
    Lex(Diagnostic),
    /// Well-lexed but ill-structured tokens.
    Parse(Diagnostic),
    /// `register(phase, ..)` named a phase outside the fixed set.
    UnknownPhase(Diagnostic),
    /// `register(.., filter, ..)` was not the empty string and did not match
    /// the call-name grammar.
    InvalidFilter(Diagnostic),
    /// `register(.., impl)` was not callable.
    InvalidHook(Diagnostic),
    /// A second `convert_node_to_string` hook was registered for a filter
    /// that already had one.
    DuplicateConverter(Diagnostic),
    /// A hook returned a value that does not match its phase's contract.
    HookReturnShape(Diagnostic),
    /// An attempt to read or write a `Node` field outside the published set.
    NodeAccess(Diagnostic),
    /// `format` was given more than 9 positional arguments.
    FormatOverflow(Diagnostic),
    /// A diagnostic a hook body raised itself via `Litua::error`, as opposed
    /// to one the core detected about the hook's return shape.
    Hook(Diagnostic),
}

impl LituaError {
    pub fn diagnostic(&self) -> &Diagnostic {
        match self {
            LituaError::Lex(d)
            | LituaError::Parse(d)
            | LituaError::UnknownPhase(d)
            | LituaError::InvalidFilter(d)
            | LituaError::InvalidHook(d)
            | LituaError::DuplicateConverter(d)
            | LituaError::HookReturnShape(d)
            | LituaError::NodeAccess(d)
            | LituaError::FormatOverflow(d)
            | LituaError::Hook(d) => d,
        }
    }

    /// Attaches the registering hook's source-site attribution (spec §4.4
    /// "Registration captures a human-readable 'source' string … for later
    /// error messages"; spec §9 "Source-site attribution … is embedded in
    /// every subsequent diagnostic about that hook"). Called at the point a
    /// hook's `Err` is about to propagate out of the pipeline.
    pub fn with_source(self, source: impl Into<String>) -> Self {
        let source = source.into();
        match self {
            LituaError::Lex(d) => LituaError::Lex(d.with_source(source)),
            LituaError::Parse(d) => LituaError::Parse(d.with_source(source)),
            LituaError::UnknownPhase(d) => LituaError::UnknownPhase(d.with_source(source)),
            LituaError::InvalidFilter(d) => LituaError::InvalidFilter(d.with_source(source)),
            LituaError::InvalidHook(d) => LituaError::InvalidHook(d.with_source(source)),
            LituaError::DuplicateConverter(d) => LituaError::DuplicateConverter(d.with_source(source)),
            LituaError::HookReturnShape(d) => LituaError::HookReturnShape(d.with_source(source)),
            LituaError::NodeAccess(d) => LituaError::NodeAccess(d.with_source(source)),
            LituaError::FormatOverflow(d) => LituaError::FormatOverflow(d.with_source(source)),
            LituaError::Hook(d) => LituaError::Hook(d.with_source(source)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LituaError::Lex(_) => "LexError",
            LituaError::Parse(_) => "ParseError",
            LituaError::UnknownPhase(_) => "UnknownPhase",
            LituaError::InvalidFilter(_) => "InvalidFilter",
            LituaError::InvalidHook(_) => "InvalidHook",
            LituaError::DuplicateConverter(_) => "DuplicateConverter",
            LituaError::HookReturnShape(_) => "HookReturnShape",
            LituaError::NodeAccess(_) => "NodeAccess",
            LituaError::FormatOverflow(_) => "FormatOverflow",
            LituaError::Hook(_) => "HookError",
        }
    }
}

impl Display for LituaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.diagnostic())
    }
}

impl std::error::Error for LituaError {}

/// Outcome of a full pipeline run: the primary failure (if any) plus any
/// errors raised while running `on_teardown`, which always runs regardless
/// of how phases 3-7 fared.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub primary: Option<LituaError>,
    pub teardown_errors: Vec<LituaError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.primary.is_none() && self.teardown_errors.is_empty()
    }

    /// The process exit code: 0 on full success, 1 otherwise. The spec
    /// requires the exit code to reflect the *first* failure, which is
    /// `primary` when present, else the first teardown failure.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn first_error(&self) -> Option<&LituaError> {
        self.primary.as_ref().or_else(|| self.teardown_errors.first())
    }
}

impl Display for RunOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(primary) = &self.primary {
            write!(f, "{primary}")?;
        }
        for err in &self.teardown_errors {
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_block() {
        let d = Diagnostic::new("unbalanced braces")
            .with_context("while lexing")
            .with_expected("'}'")
            .with_actual("end of file")
            .with_fix("close the call");
        let rendered = d.to_string();
        assert!(rendered.starts_with("ERROR: unbalanced braces\n"));
        assert!(rendered.contains("expected: '}'"));
        assert!(rendered.contains("actual:   end of file"));
    }

    #[test]
    fn outcome_exit_code_reflects_first_failure() {
        let outcome = RunOutcome {
            primary: Some(LituaError::Parse(Diagnostic::new("boom"))),
            teardown_errors: vec![LituaError::Parse(Diagnostic::new("teardown boom"))],
        };
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.first_error().unwrap().kind(), "ParseError");
    }

    #[test]
    fn with_source_attaches_to_the_diagnostic_and_preserves_variant() {
        let err = LituaError::Hook(Diagnostic::new("boom")).with_source("hooks.lua:7");
        assert!(matches!(err, LituaError::Hook(_)));
        assert_eq!(err.diagnostic().source.as_deref(), Some("hooks.lua:7"));
        assert!(err.to_string().contains("source:   hooks.lua:7"));
    }

    #[test]
    fn success_outcome() {
        let outcome = RunOutcome {
            primary: None,
            teardown_errors: vec![],
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), 0);
    }
}

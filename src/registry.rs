//! Typed, per-phase, per-filter hook storage with registration validation
//! (spec §4.4).

use crate::error::{Diagnostic, LituaError};
use crate::node::Node;
use std::collections::HashMap;
use std::rc::Rc;

/// The eight steps of the transformation pipeline (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    OnSetup,
    ModifyInitialString,
    ReadNewNode,
    ModifyNode,
    ReadModifiedNode,
    ConvertNodeToString,
    ModifyFinalString,
    OnTeardown,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::OnSetup,
        Phase::ModifyInitialString,
        Phase::ReadNewNode,
        Phase::ModifyNode,
        Phase::ReadModifiedNode,
        Phase::ConvertNodeToString,
        Phase::ModifyFinalString,
        Phase::OnTeardown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::OnSetup => "on_setup",
            Phase::ModifyInitialString => "modify_initial_string",
            Phase::ReadNewNode => "read_new_node",
            Phase::ModifyNode => "modify_node",
            Phase::ReadModifiedNode => "read_modified_node",
            Phase::ConvertNodeToString => "convert_node_to_string",
            Phase::ModifyFinalString => "modify_final_string",
            Phase::OnTeardown => "on_teardown",
        }
    }

    pub fn parse(name: &str) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| p.name() == name)
    }
}

pub fn unknown_phase_error(name: &str) -> LituaError {
    LituaError::UnknownPhase(
        Diagnostic::new(format!("'{name}' is not a known pipeline phase"))
            .with_expected(Phase::ALL.map(Phase::name).join(", "))
            .with_actual(name),
    )
}

/// `filter` must be the empty string ("matches every call") or satisfy the
/// call-name grammar: non-empty, no whitespace, and none of `{ } [ < =`.
fn validate_filter(filter: &str) -> Result<(), LituaError> {
    if filter.is_empty() {
        return Ok(());
    }
    let valid = filter
        .chars()
        .all(|c| !c.is_whitespace() && !matches!(c, '{' | '}' | '[' | '<' | '='));
    if valid {
        Ok(())
    } else {
        Err(LituaError::InvalidFilter(
            Diagnostic::new(format!("'{filter}' is not a valid hook filter"))
                .with_expected("the empty string, or a call name containing no whitespace and none of '{{}}[]<='")
                .with_actual(filter),
        ))
    }
}

pub type SetupHook = Rc<dyn Fn() -> Result<(), LituaError>>;
pub type StringHook = Rc<dyn Fn(String) -> Result<String, LituaError>>;
pub type ReaderHook = Rc<dyn Fn(&Node, usize) -> Result<(), LituaError>>;
pub type ConverterHook = Rc<dyn Fn(&Node) -> Result<String, LituaError>>;
pub type MutatorHook = Rc<dyn Fn(&Node, usize, &str) -> Result<ModifyReturn, LituaError>>;

/// The shape a `modify_node` hook must return: either leave the node alone,
/// replace it with another node, or replace it with literal text (spec §9
/// "Replace-with-text"); `HookReturnShape` covers anything else at the
/// pipeline layer (a hook signaling failure uses `Result::Err` instead).
#[derive(Clone)]
pub enum ModifyReturn {
    Unchanged,
    ReplaceWithNode(Node),
    ReplaceWithText(String),
}

struct HookEntry<H> {
    source: String,
    hook: H,
}

/// A per-phase `filter → ordered hook list` table (spec §4.4). Registration
/// order within a filter's list, and specific-filter-before-empty-filter
/// dispatch order, are both preserved by [`FilterDispatch::dispatch_order`].
struct FilterDispatch<H> {
    by_filter: HashMap<String, Vec<HookEntry<H>>>,
}

impl<H> Default for FilterDispatch<H> {
    fn default() -> Self {
        Self {
            by_filter: HashMap::new(),
        }
    }
}

impl<H> FilterDispatch<H> {
    fn register(&mut self, filter: &str, source: String, hook: H) {
        self.by_filter
            .entry(filter.to_string())
            .or_default()
            .push(HookEntry { source, hook });
    }

    fn has_filter(&self, filter: &str) -> bool {
        self.by_filter
            .get(filter)
            .is_some_and(|hooks| !hooks.is_empty())
    }

    /// Hooks for `call`'s specific filter, then the empty-filter hooks —
    /// the dispatch order spec §4.5/§5 mandates for every phase. Yields
    /// `(source, matched_filter, hook)`: `source` for diagnostics,
    /// `matched_filter` for the mutator contract's third argument.
    fn dispatch_order<'a>(&'a self, call: &'a str) -> Vec<(&'a str, &'a str, &'a H)> {
        let mut ordered = Vec::new();
        if !call.is_empty() {
            if let Some(hooks) = self.by_filter.get(call) {
                ordered.extend(hooks.iter().map(|e| (e.source.as_str(), call, &e.hook)));
            }
        }
        if let Some(hooks) = self.by_filter.get("") {
            ordered.extend(hooks.iter().map(|e| (e.source.as_str(), "", &e.hook)));
        }
        ordered
    }
}

#[derive(Default)]
pub struct HookRegistry {
    on_setup: Vec<HookEntry<SetupHook>>,
    modify_initial_string: Vec<HookEntry<StringHook>>,
    read_new_node: FilterDispatch<ReaderHook>,
    modify_node: FilterDispatch<MutatorHook>,
    read_modified_node: FilterDispatch<ReaderHook>,
    convert_node_to_string: FilterDispatch<ConverterHook>,
    modify_final_string: Vec<HookEntry<StringHook>>,
    on_teardown: Vec<HookEntry<SetupHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_on_setup(&mut self, source: impl Into<String>, hook: SetupHook) {
        self.on_setup.push(HookEntry {
            source: source.into(),
            hook,
        });
    }

    pub fn register_on_teardown(&mut self, source: impl Into<String>, hook: SetupHook) {
        self.on_teardown.push(HookEntry {
            source: source.into(),
            hook,
        });
    }

    pub fn register_modify_initial_string(&mut self, source: impl Into<String>, hook: StringHook) {
        self.modify_initial_string.push(HookEntry {
            source: source.into(),
            hook,
        });
    }

    pub fn register_modify_final_string(&mut self, source: impl Into<String>, hook: StringHook) {
        self.modify_final_string.push(HookEntry {
            source: source.into(),
            hook,
        });
    }

    pub fn register_read_new_node(
        &mut self,
        filter: &str,
        source: impl Into<String>,
        hook: ReaderHook,
    ) -> Result<(), LituaError> {
        validate_filter(filter)?;
        self.read_new_node.register(filter, source.into(), hook);
        Ok(())
    }

    pub fn register_read_modified_node(
        &mut self,
        filter: &str,
        source: impl Into<String>,
        hook: ReaderHook,
    ) -> Result<(), LituaError> {
        validate_filter(filter)?;
        self.read_modified_node.register(filter, source.into(), hook);
        Ok(())
    }

    pub fn register_modify_node(
        &mut self,
        filter: &str,
        source: impl Into<String>,
        hook: MutatorHook,
    ) -> Result<(), LituaError> {
        validate_filter(filter)?;
        self.modify_node.register(filter, source.into(), hook);
        Ok(())
    }

    /// At most one `convert_node_to_string` hook may exist per filter; a
    /// second registration fails `DuplicateConverter` (spec §4.4, §8
    /// "Converter uniqueness").
    pub fn register_convert_node_to_string(
        &mut self,
        filter: &str,
        source: impl Into<String>,
        hook: ConverterHook,
    ) -> Result<(), LituaError> {
        validate_filter(filter)?;
        if self.convert_node_to_string.has_filter(filter) {
            let label = if filter.is_empty() { "<empty filter>" } else { filter };
            return Err(LituaError::DuplicateConverter(
                Diagnostic::new(format!(
                    "a convert_node_to_string hook is already registered for filter '{label}'"
                ))
                .with_fix("remove one of the two registrations"),
            ));
        }
        self.convert_node_to_string
            .register(filter, source.into(), hook);
        Ok(())
    }

    pub fn on_setup(&self) -> impl Iterator<Item = (&str, &SetupHook)> {
        self.on_setup.iter().map(|e| (e.source.as_str(), &e.hook))
    }

    pub fn on_teardown(&self) -> impl Iterator<Item = (&str, &SetupHook)> {
        self.on_teardown.iter().map(|e| (e.source.as_str(), &e.hook))
    }

    pub fn modify_initial_string(&self) -> impl Iterator<Item = (&str, &StringHook)> {
        self.modify_initial_string
            .iter()
            .map(|e| (e.source.as_str(), &e.hook))
    }

    pub fn modify_final_string(&self) -> impl Iterator<Item = (&str, &StringHook)> {
        self.modify_final_string
            .iter()
            .map(|e| (e.source.as_str(), &e.hook))
    }

    /// `(source, matched_filter, hook)` triples in dispatch order.
    pub fn read_new_node_for<'a>(&'a self, call: &'a str) -> Vec<(&'a str, &'a str, &'a ReaderHook)> {
        self.read_new_node.dispatch_order(call)
    }

    pub fn read_modified_node_for<'a>(&'a self, call: &'a str) -> Vec<(&'a str, &'a str, &'a ReaderHook)> {
        self.read_modified_node.dispatch_order(call)
    }

    pub fn modify_node_for<'a>(&'a self, call: &'a str) -> Vec<(&'a str, &'a str, &'a MutatorHook)> {
        self.modify_node.dispatch_order(call)
    }

    /// At most one converter ever matches (enforced at registration time),
    /// so dispatch yields a single optional hook rather than a list.
    pub fn convert_node_to_string_for<'a>(&'a self, call: &'a str) -> Option<(&'a str, &'a str, &'a ConverterHook)> {
        self.convert_node_to_string.dispatch_order(call).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_phase_name() {
        assert!(Phase::parse("no_such_phase").is_none());
    }

    #[test]
    fn filter_grammar_rejects_whitespace_and_bracket() {
        assert!(validate_filter("has space").is_err());
        assert!(validate_filter("has[bracket").is_err());
        assert!(validate_filter("").is_ok());
        assert!(validate_filter("item").is_ok());
    }

    #[test]
    fn duplicate_converter_same_filter_fails() {
        let mut registry = HookRegistry::new();
        let hook: ConverterHook = Rc::new(|n: &Node| Ok(n.tostring()));
        registry
            .register_convert_node_to_string("item", "test:1", hook.clone())
            .unwrap();
        let err = registry
            .register_convert_node_to_string("item", "test:2", hook)
            .unwrap_err();
        assert!(matches!(err, LituaError::DuplicateConverter(_)));
    }

    #[test]
    fn duplicate_converter_distinct_filters_ok() {
        let mut registry = HookRegistry::new();
        let hook: ConverterHook = Rc::new(|n: &Node| Ok(n.tostring()));
        registry
            .register_convert_node_to_string("item", "test:1", hook.clone())
            .unwrap();
        assert!(registry
            .register_convert_node_to_string("other", "test:2", hook)
            .is_ok());
    }

    #[test]
    fn dispatch_order_is_specific_then_empty_filter() {
        let mut registry = HookRegistry::new();
        let calls = Rc::new(std::cell::RefCell::new(Vec::<&'static str>::new()));
        let calls_a = calls.clone();
        let calls_b = calls.clone();
        registry
            .register_read_new_node(
                "",
                "empty",
                Rc::new(move |_, _| {
                    calls_a.borrow_mut().push("empty");
                    Ok(())
                }),
            )
            .unwrap();
        registry
            .register_read_new_node(
                "item",
                "specific",
                Rc::new(move |_, _| {
                    calls_b.borrow_mut().push("specific");
                    Ok(())
                }),
            )
            .unwrap();
        let dispatch = registry.read_new_node_for("item");
        assert_eq!(dispatch.len(), 2);
        assert_eq!(dispatch[0].0, "specific");
        assert_eq!(dispatch[1].0, "empty");
    }
}

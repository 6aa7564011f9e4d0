//! The eight-phase reduction from source text to output text (spec §4.5).

use crate::error::{LituaError, RunOutcome};
use crate::lexer::tokenize;
use crate::node::{ArgValue, Child, Node, DOCUMENT_CALL, WHITESPACE_AFTER_META_KEY, WHITESPACE_META_KEY};
use crate::parser::parse;
use crate::registry::{HookRegistry, ModifyReturn};

pub struct PipelineResult {
    pub output: String,
    pub outcome: RunOutcome,
}

/// Runs phases 1-8 over `source`. Phases 3-7 abort at the first error (the
/// error becomes `outcome.primary`), but phase 8 (`on_teardown`) always
/// runs, per spec §4.5 and the "Teardown invariant" testable property.
pub fn run(source: String, registry: &HookRegistry) -> PipelineResult {
    let mut primary: Option<LituaError> = None;
    let mut output = String::new();

    'phases: {
        // Phase 1: on_setup
        for (source, hook) in registry.on_setup() {
            if let Err(e) = hook() {
                primary = Some(e.with_source(source));
                break 'phases;
            }
        }

        // Phase 2: modify_initial_string
        let mut text = source;
        for (source, hook) in registry.modify_initial_string() {
            match hook(text) {
                Ok(next) => text = next,
                Err(e) => {
                    primary = Some(e.with_source(source));
                    break 'phases;
                }
            }
        }

        // Parse (not itself a numbered phase, but the step between 2 and 3)
        let mut document = match tokenize(&text).and_then(|tokens| parse(tokens, &text)) {
            Ok(doc) => doc,
            Err(e) => {
                primary = Some(e);
                break 'phases;
            }
        };

        // Phase 3: read_new_node
        if let Err(e) = run_reader_pass(&document, ReaderPhase::New, registry) {
            primary = Some(e);
            break 'phases;
        }

        // Phase 4: modify_node
        if let Err(e) = run_modify_node_pass(&mut document, registry) {
            primary = Some(e);
            break 'phases;
        }

        // Phase 5: read_modified_node
        if let Err(e) = run_reader_pass(&document, ReaderPhase::Modified, registry) {
            primary = Some(e);
            break 'phases;
        }

        // Phase 6: convert_node_to_string
        let mut reduced = match reduce_node(&document, 0, registry) {
            Ok(s) => s,
            Err(e) => {
                primary = Some(e);
                break 'phases;
            }
        };

        // Phase 7: modify_final_string
        for (source, hook) in registry.modify_final_string() {
            match hook(reduced) {
                Ok(next) => reduced = next,
                Err(e) => {
                    primary = Some(e.with_source(source));
                    break 'phases;
                }
            }
        }
        output = reduced;
    }

    // Phase 8: on_teardown, unconditionally.
    let mut teardown_errors = Vec::new();
    for (source, hook) in registry.on_teardown() {
        if let Err(e) = hook() {
            teardown_errors.push(e.with_source(source));
        }
    }

    PipelineResult {
        output,
        outcome: RunOutcome {
            primary,
            teardown_errors,
        },
    }
}

#[derive(Debug, Clone, Copy)]
enum ReaderPhase {
    New,
    Modified,
}

/// Shared traversal for phases 3 and 5: pre-order, hands each hook a
/// snapshot (`node.copy()`) so mutation inside a reader cannot affect the
/// canonical tree (spec §5, §9 "Mutable vs observer tree"). The document
/// root is dispatched like any other call (depth 0) so that a hook
/// registered under the `document` filter — as in spec §8 scenario 5 —
/// fires; its children inherit depth 1.
fn run_reader_pass(root: &Node, phase: ReaderPhase, registry: &HookRegistry) -> Result<(), LituaError> {
    fn visit(node: &Node, depth: usize, phase: ReaderPhase, registry: &HookRegistry) -> Result<(), LituaError> {
        let snapshot = node.copy();
        let hooks = match phase {
            ReaderPhase::New => registry.read_new_node_for(&node.call),
            ReaderPhase::Modified => registry.read_modified_node_for(&node.call),
        };
        for (source, _, hook) in hooks {
            hook(&snapshot, depth).map_err(|e| e.with_source(source))?;
        }
        for child in &node.content {
            if let Child::Node(n) = child {
                visit(n, depth + 1, phase, registry)?;
            }
        }
        // Sorted lexicographically by key, per spec §4.5/§9: traversal order
        // must be deterministic even when a node's `[k=v]` groups carry
        // nested, side-effecting calls.
        for (_, values) in node.sorted_args() {
            for v in values {
                if let ArgValue::Node(n) = v {
                    visit(n, depth + 1, phase, registry)?;
                }
            }
        }
        Ok(())
    }
    visit(root, 0, phase, registry)
}

/// Phase 4: pre-order mutator pass. A hook returning a node updates the
/// live node in place and subsequent hooks in the same dispatch list still
/// see it; one returning text short-circuits the remaining hooks for this
/// position, since there is no longer a node to hand them (spec §4.5,
/// §9 "Replace-with-text"). `apply_modify` therefore only ever signals
/// `ReplaceWithText`/`Unchanged` back to its caller — a `ReplaceWithNode`
/// return is always absorbed in place as it's handled. At the root there is
/// no parent `Child` slot to absorb it into, so a hook matching `document`
/// can overwrite `root.call` directly; re-wrap it as the sole child of a
/// fresh document node afterward so phase 6's flattening override survives
/// (spec §9 "Implicit root").
fn run_modify_node_pass(root: &mut Node, registry: &HookRegistry) -> Result<(), LituaError> {
    if let ModifyReturn::ReplaceWithText(text) = apply_modify(root, 0, registry)? {
        *root = Node::document(vec![Child::Text(text)]);
    }
    if root.call != DOCUMENT_CALL {
        let replaced = root.copy();
        *root = Node::document(vec![Child::Node(replaced)]);
    }
    Ok(())
}

fn apply_modify(node: &mut Node, depth: usize, registry: &HookRegistry) -> Result<ModifyReturn, LituaError> {
    let call_name = node.call.clone();
    let hooks = registry.modify_node_for(&call_name);
    for (source, filter, hook) in hooks {
        match hook(node, depth, filter).map_err(|e| e.with_source(source))? {
            ModifyReturn::Unchanged => {}
            ModifyReturn::ReplaceWithNode(replacement) => {
                *node = replacement;
            }
            ModifyReturn::ReplaceWithText(text) => {
                return Ok(ModifyReturn::ReplaceWithText(text));
            }
        }
    }

    modify_children(&mut node.content, depth + 1, registry)?;
    let mut args = std::mem::take(node.args_mut());
    modify_arg_values(&mut args, depth + 1, registry)?;
    *node.args_mut() = args;
    Ok(ModifyReturn::Unchanged)
}

fn modify_children(children: &mut [Child], depth: usize, registry: &HookRegistry) -> Result<(), LituaError> {
    for child in children.iter_mut() {
        if let Child::Node(n) = child {
            if let ModifyReturn::ReplaceWithText(text) = apply_modify(n, depth, registry)? {
                *child = Child::Text(text);
            }
        }
    }
    Ok(())
}

/// Sorted lexicographically by key (spec §4.5/§9): a node's `[k=v]` groups
/// must be visited in that order wherever the visit can have a side effect,
/// not just at serialization time.
fn sorted_arg_indices(args: &[(String, Vec<ArgValue>)]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..args.len()).collect();
    order.sort_by(|&a, &b| args[a].0.cmp(&args[b].0));
    order
}

fn modify_arg_values(
    args: &mut [(String, Vec<ArgValue>)],
    depth: usize,
    registry: &HookRegistry,
) -> Result<(), LituaError> {
    for idx in sorted_arg_indices(args) {
        for v in args[idx].1.iter_mut() {
            if let ArgValue::Node(n) = v {
                if let ModifyReturn::ReplaceWithText(text) = apply_modify(n, depth, registry)? {
                    *v = ArgValue::Text(text);
                }
            }
        }
    }
    Ok(())
}

/// Phase 6: bottom-up reduction. `args` and `content` are reduced to
/// strings first (depth+1), then at most one converter hook runs for this
/// node; absent a match, the default is `tostring(node)` (spec §4.3,
/// §4.5). `left-curly-brace`/`right-curly-brace` short-circuit before any
/// hook is consulted (invariant 5).
fn reduce_node(node: &Node, depth: usize, registry: &HookRegistry) -> Result<String, LituaError> {
    if let Some(literal) = node.is_reserved_escape() {
        return Ok(literal.to_string());
    }

    let args = node.args();
    let mut reduced_args = Vec::with_capacity(args.len());
    for idx in sorted_arg_indices(args) {
        let (key, values) = &args[idx];
        let mut reduced_values = Vec::with_capacity(values.len());
        for value in values {
            let text = match value {
                ArgValue::Text(t) => t.clone(),
                ArgValue::Node(n) => reduce_node(n, depth + 1, registry)?,
            };
            reduced_values.push(ArgValue::Text(text));
        }
        reduced_args.push((key.clone(), reduced_values));
    }

    let mut reduced_content = Vec::with_capacity(node.content.len());
    for child in &node.content {
        let text = match child {
            Child::Text(t) => t.clone(),
            Child::Node(n) => reduce_node(n, depth + 1, registry)?,
        };
        reduced_content.push(Child::Text(text));
    }

    let mut reduced_node = if node.call == DOCUMENT_CALL {
        Node::document(reduced_content)
    } else if let Some(depth_k) = node.raw_string_depth() {
        let body: String = reduced_content
            .iter()
            .map(|c| match c {
                Child::Text(t) => t.as_str(),
                Child::Node(_) => "",
            })
            .collect();
        let leading_ws = meta_text(node, WHITESPACE_META_KEY);
        let trailing_ws = meta_text(node, WHITESPACE_AFTER_META_KEY);
        Node::raw_string(depth_k, body, leading_ws, trailing_ws)
    } else {
        let mut n = Node::new(node.call.clone());
        n.content = reduced_content;
        n
    };
    *reduced_node.args_mut() = reduced_args;

    match registry.convert_node_to_string_for(&node.call) {
        Some((source, _, hook)) => hook(&reduced_node).map_err(|e| e.with_source(source)),
        None => Ok(reduced_node.tostring()),
    }
}

/// Meta-args (`=whitespace`, `=whitespace-after`) are always set as a single
/// `ArgValue::Text` by the parser; this reads one back as plain text.
fn meta_text(node: &Node, key: &str) -> String {
    match node.get_arg(key) {
        Some([ArgValue::Text(t)]) => t.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostic;
    use crate::node::{LEFT_CURLY_BRACE_CALL, RIGHT_CURLY_BRACE_CALL};
    use crate::registry::{ConverterHook, MutatorHook};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn scenario_enumeration() {
        let mut registry = HookRegistry::new();
        let counter = Rc::new(RefCell::new(0));
        let counter_hook = counter.clone();
        let hook: ConverterHook = Rc::new(move |_node: &Node| {
            let mut n = counter_hook.borrow_mut();
            *n += 1;
            Ok(format!("({}) ", *n))
        });
        registry
            .register_convert_node_to_string("item", "test", hook)
            .unwrap();

        let result = run("{item} a{item} b{item} c".to_string(), &registry);
        assert!(result.outcome.is_success());
        assert_eq!(result.output, "(1) a(2) b(3) c");
    }

    #[test]
    fn scenario_escape_short_circuit() {
        let registry = HookRegistry::new();
        let result = run("a{left-curly-brace}b{right-curly-brace}c".to_string(), &registry);
        assert!(result.outcome.is_success());
        assert_eq!(result.output, "a{b}c");
    }

    #[test]
    fn scenario_raw_string_code_converter() {
        let mut registry = HookRegistry::new();
        let hook: ConverterHook = Rc::new(|node: &Node| Ok(node.text_only()));
        registry
            .register_convert_node_to_string("code", "test", hook)
            .unwrap();

        let result = run(r#"{code {< println!("{x}"); >}}"#.to_string(), &registry);
        assert!(result.outcome.is_success());
        assert_eq!(result.output, " println!(\"{x}\"); ");
    }

    #[test]
    fn scenario_replacement_via_modify_node() {
        let mut registry = HookRegistry::new();
        let who: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
        let who_capture = who.clone();
        let mutate: MutatorHook = Rc::new(move |node: &Node, _depth, _filter| {
            if let Some(values) = node.get_arg("who") {
                let text: String = values
                    .iter()
                    .map(|v| match v {
                        ArgValue::Text(t) => t.clone(),
                        ArgValue::Node(n) => n.text_only(),
                    })
                    .collect();
                *who_capture.borrow_mut() = Some(text);
            }
            Ok(ModifyReturn::ReplaceWithText(String::new()))
        });
        registry.register_modify_node("let", "test", mutate).unwrap();

        let convert_who: ConverterHook = {
            let who = who.clone();
            Rc::new(move |_node: &Node| Ok(who.borrow().clone().unwrap_or_default()))
        };
        registry
            .register_convert_node_to_string("who", "test", convert_who)
            .unwrap();

        let result = run("{let[who=tajpulo]}Hello {who}".to_string(), &registry);
        assert!(result.outcome.is_success());
        assert_eq!(result.output, "Hello tajpulo");
    }

    #[test]
    fn duplicate_converter_registration_aborts_invocation() {
        let mut registry = HookRegistry::new();
        let hook: ConverterHook = Rc::new(|n: &Node| Ok(n.tostring()));
        registry
            .register_convert_node_to_string("", "first", hook.clone())
            .unwrap();
        let err = registry
            .register_convert_node_to_string("", "second", hook)
            .unwrap_err();
        assert!(matches!(err, LituaError::DuplicateConverter(_)));
    }

    #[test]
    fn teardown_runs_even_after_lex_error() {
        let mut registry = HookRegistry::new();
        let ran = Rc::new(RefCell::new(false));
        let ran_hook = ran.clone();
        registry.register_on_teardown(
            "test",
            Rc::new(move || {
                *ran_hook.borrow_mut() = true;
                Ok(())
            }),
        );

        let result = run("{unterminated".to_string(), &registry);
        assert!(!result.outcome.is_success());
        assert!(*ran.borrow());
    }

    #[test]
    fn reserved_short_circuit_wins_over_empty_filter_converter() {
        let mut registry = HookRegistry::new();
        let hook: ConverterHook = Rc::new(|_node: &Node| Ok("SHOULD NOT RUN".to_string()));
        registry.register_convert_node_to_string("", "test", hook).unwrap();

        let src = format!("{{{LEFT_CURLY_BRACE_CALL}}}{{{RIGHT_CURLY_BRACE_CALL}}}");
        let result = run(src, &registry);
        assert!(result.outcome.is_success());
        assert_eq!(result.output, "{}");
    }

    /// spec.md §4.5/§9: argument groups are dispatched in sorted-key order,
    /// not source order — a side-effecting converter on a nested `[k=v]`
    /// call must see `a` (alphabetically first) before `z`, even though `z`
    /// appears first in the source.
    #[test]
    fn args_with_nested_calls_reduce_in_sorted_key_order() {
        let mut registry = HookRegistry::new();
        let counter = Rc::new(RefCell::new(0));
        let counter_hook = counter.clone();
        let hook: ConverterHook = Rc::new(move |_node: &Node| {
            let mut n = counter_hook.borrow_mut();
            *n += 1;
            Ok(n.to_string())
        });
        registry
            .register_convert_node_to_string("item", "test", hook)
            .unwrap();

        let result = run("{outer[z={item}][a={item}]}".to_string(), &registry);
        assert!(result.outcome.is_success());
        assert_eq!(result.output, "{outer[a=1][z=2]}");
    }

    #[test]
    fn converter_hook_error_is_tagged_with_its_registration_source() {
        let mut registry = HookRegistry::new();
        let hook: ConverterHook = Rc::new(|_node: &Node| Err(LituaError::Hook(Diagnostic::new("boom"))));
        registry
            .register_convert_node_to_string("item", "hooks.lua:7", hook)
            .unwrap();

        let result = run("{item}".to_string(), &registry);
        let err = result.outcome.primary.expect("expected a failure");
        assert_eq!(err.diagnostic().source.as_deref(), Some("hooks.lua:7"));
    }

    /// A `modify_node` hook that replaces the whole document root must not
    /// strip the root's flattening `tostring` override (spec §9 "Implicit
    /// root") — the replacement becomes the document's sole child instead
    /// of becoming the new root outright.
    #[test]
    fn modify_node_replacing_the_document_root_keeps_document_flattening() {
        let mut registry = HookRegistry::new();
        let mutate: MutatorHook = Rc::new(|_node: &Node, _depth, _filter| {
            let mut replacement = Node::new("wrapped");
            replacement.content = vec![Child::Text("hi".to_string())];
            Ok(ModifyReturn::ReplaceWithNode(replacement))
        });
        registry.register_modify_node(DOCUMENT_CALL, "test", mutate).unwrap();
        let wrapped_hook: ConverterHook = Rc::new(|node: &Node| Ok(node.text_only()));
        registry
            .register_convert_node_to_string("wrapped", "test", wrapped_hook)
            .unwrap();

        let result = run("anything".to_string(), &registry);
        assert!(result.outcome.is_success());
        assert_eq!(result.output, "hi");
    }

    #[test]
    fn on_setup_hook_error_is_tagged_with_its_registration_source() {
        let mut registry = HookRegistry::new();
        registry.register_on_setup(
            "hooks.lua:1",
            Rc::new(|| Err(LituaError::Hook(Diagnostic::new("setup failed")))),
        );

        let result = run("irrelevant".to_string(), &registry);
        let err = result.outcome.primary.expect("expected a failure");
        assert_eq!(err.diagnostic().source.as_deref(), Some("hooks.lua:1"));
    }
}

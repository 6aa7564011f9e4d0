//! End-to-end coverage of the six "Concrete scenarios" from spec §8, driven
//! entirely through the public `litua` API.

use litua::bridge::{Config, Litua};
use litua::logger::Verbosity;
use litua::registry::{ConverterHook, ModifyReturn, MutatorHook};
use litua::{ArgValue, LituaError};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

fn litua() -> Litua {
    Litua::new(Config {
        input_path: PathBuf::from("scenario.litua"),
        output_path: None,
        dump_lexed: false,
        dump_parsed: false,
        verbosity: Verbosity::Silent,
    })
}

#[test]
fn scenario_1_enumeration() {
    let mut app = litua();
    let counter = Rc::new(RefCell::new(0));
    let counter_hook = counter.clone();
    let item_hook: ConverterHook = Rc::new(move |_node| {
        let mut n = counter_hook.borrow_mut();
        *n += 1;
        Ok(format!("({}) ", *n))
    });
    app.convert_node_to_string("item", "scenario:1", item_hook).unwrap();

    let result = app.run("{item} a{item} b{item} c".to_string());
    assert!(result.outcome.is_success());
    assert_eq!(result.output, "(1) a(2) b(3) c");
}

#[test]
fn scenario_2_replacement() {
    let mut app = litua();
    let who: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

    let who_capture = who.clone();
    let let_hook: MutatorHook = Rc::new(move |node, _depth, _filter| {
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
    app.modify_node("let", "scenario:2", let_hook).unwrap();

    let who_read = who.clone();
    let who_converter: ConverterHook = Rc::new(move |_node| Ok(who_read.borrow().clone().unwrap_or_default()));
    app.convert_node_to_string("who", "scenario:2", who_converter).unwrap();

    let result = app.run("{let[who=tajpulo]}Hello {who}".to_string());
    assert!(result.outcome.is_success());
    assert_eq!(result.output, "Hello tajpulo");
}

#[test]
fn scenario_3_escape_short_circuit() {
    let app = litua();
    let result = app.run("a{left-curly-brace}b{right-curly-brace}c".to_string());
    assert!(result.outcome.is_success());
    assert_eq!(result.output, "a{b}c");
}

#[test]
fn scenario_4_raw_string_code_converter() {
    let mut app = litua();
    let code_hook: ConverterHook = Rc::new(|node| Ok(node.text_only()));
    app.convert_node_to_string("code", "scenario:4", code_hook).unwrap();

    let result = app.run(r#"{code {< println!("{x}"); >}}"#.to_string());
    assert!(result.outcome.is_success());
    assert_eq!(result.output, " println!(\"{x}\"); ");
}

/// "Nested XML build (with the documented substitution trick)": an
/// empty-filter converter renders every remaining call as an XML element
/// using private-use substitution bytes for `<`, `>`, and `&`, and a
/// `document`-filtered converter restores them once the whole tree has been
/// flattened to text, so intermediate literal `<`/`>`/`&` characters in the
/// source never get mistaken for the substitution markers.
#[test]
fn scenario_5_nested_xml_build() {
    const OPEN: char = '\u{E000}';
    const CLOSE: char = '\u{E001}';
    const SLASH: char = '\u{E002}';
    const AMP: char = '\u{E003}';

    let mut app = litua();

    let xml_hook: ConverterHook = Rc::new(|node| {
        let escaped: String = node
            .text_only()
            .chars()
            .flat_map(|c| {
                if c == '&' {
                    vec![AMP, 'a', 'm', 'p', ';']
                } else {
                    vec![c]
                }
            })
            .collect();
        Ok(format!(
            "{OPEN}{name}{CLOSE}{body}{OPEN}{SLASH}{name}{CLOSE}",
            name = node.call,
            body = escaped
        ))
    });
    app.convert_node_to_string("", "scenario:5", xml_hook).unwrap();

    let restore_hook: ConverterHook = Rc::new(|node| {
        let flattened: String = node
            .content
            .iter()
            .map(|child| match child {
                litua::Child::Text(t) => t.clone(),
                litua::Child::Node(_) => unreachable!("document content is already reduced to text"),
            })
            .collect();
        Ok(flattened
            .replace(OPEN, "<")
            .replace(CLOSE, ">")
            .replace(SLASH, "/")
            .replace(AMP, "&"))
    });
    app.convert_node_to_string("document", "scenario:5", restore_hook).unwrap();

    let result = app.run("{main {p Hello & World}}".to_string());
    assert!(result.outcome.is_success());
    assert_eq!(result.output, "<main><p>Hello &amp; World</p></main>");
}

#[test]
fn scenario_6_converter_uniqueness() {
    let mut app = litua();
    let hook_a: ConverterHook = Rc::new(|n| Ok(n.tostring()));
    let hook_b: ConverterHook = Rc::new(|n| Ok(n.tostring()));
    app.convert_node_to_string("", "scenario:6a", hook_a).unwrap();
    let err = app.convert_node_to_string("", "scenario:6b", hook_b).unwrap_err();
    assert!(matches!(err, LituaError::DuplicateConverter(_)));
}

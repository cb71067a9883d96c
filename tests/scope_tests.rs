//! Namespace scoping: imports, blocks, qualified names.

mod common;

use common::*;
use lexmac::diagnostics::Severity;
use lexmac::macros::MacroEntry;

fn namespaced_foo() -> MacroEntry {
    rewrite("Foo", "bar").in_namespace("N")
}

#[test]
fn namespaced_macros_are_invisible_until_imported() {
    let (processor, _) = processor([namespaced_foo()]);
    assert_eq!(expand(&processor, "Foo"), "Foo");
    assert_eq!(expand(&processor, "#import(N); Foo"), "#import(N); bar");
}

#[test]
fn imports_end_with_their_block() {
    let (processor, _) = processor([namespaced_foo()]);
    assert_eq!(
        expand(&processor, "{ #import(N); Foo }; Foo"),
        "{ #import(N); bar }; Foo"
    );
}

#[test]
fn imports_reach_nested_blocks() {
    let (processor, _) = processor([namespaced_foo()]);
    assert_eq!(
        expand(&processor, "{ #import(N); { f(Foo) }; Foo }"),
        "{ #import(N); { f(bar) }; bar }"
    );
}

#[test]
fn import_macros_vanishes_from_the_output() {
    let (processor, holder) = processor([namespaced_foo()]);
    assert_eq!(expand(&processor, "#importMacros(N); Foo"), "bar");
    assert!(holder.is_empty());
}

#[test]
fn each_input_starts_from_a_fresh_root_scope() {
    let (processor, _) = processor([namespaced_foo()]);
    assert_eq!(expand(&processor, "#importMacros(N); Foo"), "bar");
    assert_eq!(expand(&processor, "Foo"), "Foo");
}

#[test]
fn pre_opened_namespaces_apply_everywhere() {
    let mut cfg = config(lexmac::macros::DEFAULT_MAX_EXPANSIONS);
    cfg.pre_opened_namespaces = vec!["N".to_string()];
    let (processor, _) = processor_with(cfg, [namespaced_foo()]);
    assert_eq!(expand(&processor, "Foo; { Foo }"), "bar; { bar }");
}

#[test]
fn unimport_hides_a_namespace_until_the_block_ends() {
    let mut cfg = config(lexmac::macros::DEFAULT_MAX_EXPANSIONS);
    cfg.pre_opened_namespaces = vec!["N".to_string()];
    let (processor, _) = processor_with(cfg, [namespaced_foo()]);
    assert_eq!(
        expand(&processor, "{ #unimportMacros(N); Foo }; Foo"),
        "{ #unimportMacros(N); Foo }; bar"
    );
}

#[test]
fn unimport_stays_in_the_output_unlike_import_macros() {
    let (processor, _) = processor([namespaced_foo()]);
    assert_eq!(
        expand(&processor, "#importMacros(N); #unimportMacros(N); Foo"),
        "#unimportMacros(N); Foo"
    );
}

#[test]
fn unimport_of_unopened_namespace_is_noted_for_macro_style_calls() {
    let (processor, holder) = processor([namespaced_foo()]);
    assert_eq!(expand(&processor, "#unimportMacros!(Q)"), "#unimportMacros!(Q)");
    let debug = texts_at(&holder, Severity::Debug);
    assert_eq!(debug.len(), 1);
    assert!(debug[0].ends_with("Namespace not found to remove: Q"));
    assert_eq!(holder.count(Severity::Warning), 0);
}

#[test]
fn qualified_names_reach_closed_namespaces() {
    let (processor, _) = processor([namespaced_foo()]);
    assert_eq!(expand(&processor, "N.Foo(1); Foo"), "bar; Foo");
}

#[test]
fn qualified_names_only_match_their_own_namespace() {
    let (processor, _) = processor([namespaced_foo(), rewrite("Foo", "pee").in_namespace("P")]);
    assert_eq!(expand(&processor, "P.Foo(1)"), "pee");
    assert_eq!(expand(&processor, "N.Foo(1)"), "bar");
    assert_eq!(expand(&processor, "M.Foo(1)"), "M.Foo(1)");
}

#[test]
fn dotted_namespace_names_are_printed_forms() {
    let entry = rewrite("Foo", "deep").in_namespace("A.B");
    let (processor, _) = processor([entry]);
    assert_eq!(expand(&processor, "#import(A.B); Foo"), "#import(A.B); deep");
    assert_eq!(expand(&processor, "A.B.Foo()"), "deep");
}

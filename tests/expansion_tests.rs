//! End-to-end behavior of the expansion engine.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use lexmac::ast::{Node, NodeStyle};
use lexmac::diagnostics::Severity;
use lexmac::engine::{InputOutput, ProcessStatus};
use lexmac::macros::{
    MacroContext, MacroEntry, MacroError, MacroMode, MacroPriority, MacroResult, DEFAULT_MAX_EXPANSIONS,
};

// ============================================================================
// SHARING AND FIXPOINTS
// ============================================================================

#[test]
fn forest_without_matches_comes_back_unshared_nothing() {
    let (processor, holder) = processor([rewrite("Foo", "bar")]);
    let input = forest("f(x, g(1, \"s\")); { h(y) }; @[a] z");
    let output = processor.process_nodes(input.clone()).unwrap();
    assert_eq!(output.len(), input.len());
    for (before, after) in input.iter().zip(output.iter()) {
        assert!(Node::ptr_eq(before, after), "{} was rebuilt", before);
    }
    assert!(holder.is_empty());
}

#[test]
fn unchanged_siblings_keep_their_allocation() {
    let (processor, _) = processor([rewrite("Foo", "bar")]);
    let input = one("f(g(x), Foo, h(y))");
    let output = processor.process_nodes([input.clone()]).unwrap();
    let out = &output[0];
    assert_eq!(out.to_string(), "f(g(x), bar, h(y))");
    assert!(Node::ptr_eq(&input.args()[0], &out.args()[0]));
    assert!(Node::ptr_eq(&input.args()[2], &out.args()[2]));
}

#[test]
fn expanding_an_expanded_forest_changes_nothing() {
    let (processor, _) = processor([rewrite("Foo", "bar"), pair_splicer()]);
    let once = processor.process_nodes(forest("f(Foo, Pair(1, Foo)); Pair(a, b)")).unwrap();
    let twice = processor.process_nodes(once.iter().cloned()).unwrap();
    assert_eq!(once, twice);
    for (a, b) in once.iter().zip(twice.iter()) {
        assert!(Node::ptr_eq(a, b));
    }
}

// ============================================================================
// SPLICING
// ============================================================================

#[test]
fn splices_flatten_into_argument_lists_and_the_forest() {
    let (processor, _) = processor([pair_splicer()]);
    assert_eq!(expand(&processor, "f(Pair(1, 2), 3)"), "f(1, 2, 3)");
    assert_eq!(expand(&processor, "Pair(a, b); c"), "a; b; c");
    assert_eq!(expand(&processor, "{ Pair(a, b) }"), "{ a; b }");
}

#[test]
fn literal_splices_in_the_input_are_flattened_too() {
    let (processor, _) = processor([]);
    assert_eq!(expand(&processor, "f(#splice(1, 2), 3)"), "f(1, 2, 3)");
    assert_eq!(expand(&processor, "#splice(); x"), "x");
}

// ============================================================================
// BUDGET
// ============================================================================

#[test]
fn runaway_macro_stops_after_exactly_the_budget() {
    for budget in [1u32, 5, 1000] {
        let counter = Arc::new(AtomicUsize::new(0));
        let (processor, _) = processor_with(config(budget), [looping(counter.clone())]);
        let result = run(&processor, "Loop(x)");
        assert_eq!(result.status, ProcessStatus::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), budget as usize, "budget {}", budget);
    }
}

#[test]
fn macro_returning_an_equal_node_runs_once_at_any_budget() {
    for budget in [1u32, 5, 1000] {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let fixed = MacroEntry::new("Loop", move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Node::call_sym("Loop", [])))
        });
        let (processor, _) = processor_with(config(budget), [fixed]);
        assert_eq!(expand(&processor, "Loop()"), "Loop()", "budget {}", budget);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "budget {}", budget);
    }
}

#[test]
fn runaway_macro_at_the_default_budget_completes_on_the_calling_thread() {
    let counter = Arc::new(AtomicUsize::new(0));
    let (processor, _) = processor([counting(counter.clone())]);
    let output = processor.process_nodes([one("Count(0)")]).unwrap();
    let last = DEFAULT_MAX_EXPANSIONS as f64;
    assert_eq!(output[0], Node::call_sym("Count", [Node::number(last)]));
    assert_eq!(counter.load(Ordering::SeqCst), DEFAULT_MAX_EXPANSIONS as usize);
}

#[test]
fn deeply_nested_runaway_output_completes_on_the_calling_thread() {
    let counter = Arc::new(AtomicUsize::new(0));
    let (processor, _) = processor_with(config(5_000), [looping(counter.clone())]);
    let output = processor.process_nodes([one("Loop(x)")]).unwrap();
    assert_eq!(output.len(), 1);
    assert!(output[0].calls(&"Loop".into()));
    assert_eq!(counter.load(Ordering::SeqCst), 5_000);
}

#[test]
fn zero_budget_still_flattens_literal_splices() {
    let (processor, _) = processor_with(config(0), [rewrite("Foo", "bar")]);
    assert_eq!(expand(&processor, "#splice(Foo, a); b"), "Foo; a; b");
}

#[test]
fn zero_budget_leaves_the_input_alone() {
    let (processor, _) = processor_with(config(0), [rewrite("Foo", "bar")]);
    assert_eq!(expand(&processor, "Foo; f(Foo)"), "Foo; f(Foo)");
}

#[test]
fn output_equal_to_input_only_expands_children() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let same = MacroEntry::new("Same", move |node, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(Some(node.clone()))
    });
    let (processor, _) = processor([same, rewrite("Foo", "bar")]);
    assert_eq!(expand(&processor, "Same(Foo)"), "Same(bar)");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// MODES AND PRIORITIES
// ============================================================================

#[test]
fn children_after_does_not_redispatch_the_head() {
    let wrap = MacroEntry::new("A", |_, _| Ok(Some(Node::call_sym("A", [Node::id("Foo")]))))
        .with_mode(MacroMode::children_after());
    let (processor, _) = processor([wrap, rewrite("Foo", "bar")]);
    assert_eq!(expand(&processor, "A"), "A(bar)");
}

#[test]
fn children_before_sees_expanded_arguments() {
    let count = MacroEntry::new("Count", |node, _| Ok(Some(Node::number(node.args().len() as f64))))
        .with_mode(MacroMode::normal().process_children_before());
    let (processor, _) = processor([count, pair_splicer()]);
    assert_eq!(expand(&processor, "Count(Pair(1, 2), 3)"), "3");
}

#[test]
fn no_lexical_macros_protects_its_arguments() {
    let (processor, _) = processor([rewrite("Foo", "bar")]);
    assert_eq!(expand(&processor, "f(#noLexicalMacros(Foo), Foo)"), "f(Foo, bar)");
    assert_eq!(expand(&processor, "#noLexicalMacros(Foo, Foo); Foo"), "Foo; Foo; bar");
}

#[test]
fn higher_priority_tier_wins_and_fallback_waits() {
    let (processor, holder) = processor([
        rewrite("X", "normal"),
        rewrite("X", "override").with_mode(MacroMode::normal().with_priority(MacroPriority::Override)),
        rewrite("Y", "fallback").with_mode(MacroMode::normal().with_priority(MacroPriority::Fallback)),
        decliner("Y"),
    ]);
    assert_eq!(expand(&processor, "X; Y"), "override; fallback");
    assert!(holder.is_empty());
}

// ============================================================================
// AMBIGUITY
// ============================================================================

#[test]
fn allowed_duplicates_are_silent() {
    let (processor, holder) = processor([
        rewrite("Dup", "same").with_mode(MacroMode::normal().allow_duplicates()),
        rewrite("Dup", "same"),
    ]);
    assert_eq!(expand(&processor, "Dup"), "same");
    assert!(holder.is_empty(), "unexpected: {:?}", holder.messages());
}

#[test]
fn identical_results_without_permission_warn() {
    let (processor, holder) = processor([rewrite("Dup", "same"), rewrite("Dup", "same")]);
    assert_eq!(expand(&processor, "Dup"), "same");
    assert_eq!(holder.count(Severity::Warning), 1);
    assert_eq!(holder.count(Severity::Error), 0);
}

#[test]
fn conflicting_results_are_one_error_and_first_wins() {
    let (processor, holder) = processor([
        rewrite("Amb", "first").labelled("FirstMacro"),
        rewrite("Amb", "second").labelled("SecondMacro"),
    ]);
    assert_eq!(expand(&processor, "Amb"), "first");
    let errors = texts_at(&holder, Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("FirstMacro"));
    assert!(errors[0].contains("SecondMacro"));
}

fn amb_first(_: &Node, _: &mut MacroContext<'_>) -> MacroResult {
    Ok(Some(Node::id("first")))
}

fn amb_second(_: &Node, _: &mut MacroContext<'_>) -> MacroResult {
    Ok(Some(Node::id("second")))
}

#[test]
fn conflict_names_the_functions_behind_unlabelled_macros() {
    let (processor, holder) = processor([MacroEntry::new("Amb", amb_first), MacroEntry::new("Amb", amb_second)]);
    assert_eq!(expand(&processor, "Amb"), "first");
    let errors = texts_at(&holder, Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("amb_first"), "{}", errors[0]);
    assert!(errors[0].contains("amb_second"), "{}", errors[0]);
}

#[test]
fn conflict_between_look_alike_closures_tells_them_apart() {
    let (processor, holder) = processor([rewrite("Amb", "first"), rewrite("Amb", "second")]);
    assert_eq!(expand(&processor, "Amb"), "first");
    assert_eq!(
        texts_at(&holder, Severity::Error),
        vec!["Ambiguous macro call. 2 macros accepted the input: Amb#1, Amb#2".to_string()]
    );
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn failing_macro_reports_and_acts_as_decline() {
    let bad = MacroEntry::new("Bad", |_, _| Err(MacroError::failed("cannot expand this"))).labelled("Broken");
    let (processor, holder) = processor([bad]);
    assert_eq!(expand(&processor, "f(Bad(1))"), "f(Bad(1))");
    let errors = holder.messages();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity, Severity::Error);
    assert_eq!(errors[0].text, "Broken: cannot expand this");
    assert_eq!(errors[0].context.to_string(), "Bad(1)");
}

#[test]
fn panicking_macro_is_contained() {
    let bad = MacroEntry::new("Boom", |_, _| panic!("kaboom"));
    let (processor, holder) = processor([bad, rewrite("Foo", "bar")]);
    assert_eq!(expand(&processor, "Boom; Foo"), "Boom; bar");
    let errors = texts_at(&holder, Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("kaboom"));
}

#[test]
fn cancellation_from_a_macro_stops_only_that_input() {
    let stop = MacroEntry::new("Stop", |_, _| Err(MacroError::Cancelled)).labelled("Stopper");
    let (processor, holder) = processor([stop, rewrite("Foo", "bar")]);
    let results = processor.process(vec![
        InputOutput::from_text("a.lm", "Foo; Stop"),
        InputOutput::from_text("b.lm", "Foo"),
    ]);
    assert_eq!(results[0].status, ProcessStatus::Cancelled);
    assert!(results[0].output.is_empty());
    assert_eq!(results[1].status, ProcessStatus::Completed);
    assert_eq!(results[1].print(), "bar;\n");
    let errors = texts_at(&holder, Severity::Error);
    assert!(errors.iter().any(|e| e.contains("cancelled in Stopper")));
}

// ============================================================================
// MESSAGES
// ============================================================================

#[test]
fn declined_macro_style_call_is_a_warning() {
    let (processor, holder) = processor([decliner("Foo").labelled("FooMacro")]);
    let input = one("Foo!(1)");
    assert_eq!(input.style(), NodeStyle::Macro);
    assert_eq!(expand(&processor, "Foo!(1)"), "Foo!(1)");
    let warnings = texts_at(&holder, Severity::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("1 macro(s) saw the input and declined to process it"));
    assert!(warnings[0].contains("FooMacro"));
}

#[test]
fn declined_plain_call_is_silent() {
    let (processor, holder) = processor([decliner("Foo")]);
    assert_eq!(expand(&processor, "Foo(1)"), "Foo(1)");
    assert!(holder.is_empty());
}

#[test]
fn messages_of_the_accepting_macro_are_forwarded() {
    let chatty = MacroEntry::new("Chatty", |node, ctx| {
        ctx.write(Severity::Verbose, node, "rewriting");
        Ok(Some(Node::id("done")))
    })
    .labelled("ChattyMacro");
    let (processor, holder) = processor([chatty]);
    assert_eq!(expand(&processor, "Chatty"), "done");
    assert_eq!(texts_at(&holder, Severity::Verbose), vec!["ChattyMacro: rewriting".to_string()]);
}

#[test]
fn registering_the_same_macro_twice_is_a_no_op() {
    let entry = rewrite("Foo", "bar");
    let (mut processor, holder) = processor([entry.clone()]);
    assert!(!processor.add_macro(entry));
    assert_eq!(expand(&processor, "Foo"), "bar");
    assert!(holder.is_empty());
}

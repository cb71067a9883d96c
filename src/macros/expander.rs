//! The expansion engine.
//!
//! An [`ExpansionTask`] rewrites one forest. It owns a private copy of the macro
//! table (with the built-ins injected) and a scope stack, and it borrows the
//! diagnostics sink of whoever runs it.
//!
//! ## Dispatch
//!
//! For each node the task collects the macros visible for its head, then tries
//! them one priority tier at a time, highest first. Within a tier every macro
//! runs (so ambiguity can be detected) and the first one that accepted wins.
//! If every tier declines, only the node's children are expanded.
//!
//! ## Budget
//!
//! Every accepted rewrite costs one unit of the budget handed down the tree;
//! a macro that wants its children expanded first costs one more. At zero the
//! node is left alone, so a macro that keeps expanding into itself terminates.
//!
//! ## Sharing
//!
//! Every method returns `Ok(None)` when nothing changed, and callers keep the
//! node they already had. Unchanged subtrees are therefore never rebuilt, and
//! an input that no macro touches comes back as the same allocation.

use std::panic::{self, AssertUnwindSafe};

use crate::ast::{symbol, Node, NodeList};
use crate::diagnostics::{Cancelled, MessageHolder, MessageSink, Severity};
use crate::macros::builtins::{inject_builtins, namespace_symbol};
use crate::macros::cancel::CancellationToken;
use crate::macros::messages::{self, Attempt};
use crate::macros::registry::MacroTable;
use crate::macros::scope::{OpenSet, ScopeStack};
use crate::macros::types::{MacroContext, MacroEntry, MacroError, MacroMode, MacroResult, Reprocess};
use crate::macros::DEFAULT_MAX_EXPANSIONS;

// =============================
// Task state
// =============================

/// Expansion state for one input.
pub struct ExpansionTask<'s> {
    macros: MacroTable,
    pre_opened: OpenSet,
    scopes: ScopeStack,
    sink: &'s dyn MessageSink,
    cancel: CancellationToken,
    max_expansions: u32,
}

impl<'s> ExpansionTask<'s> {
    /// A task over a private copy of `macros`, with `pre_opened` namespaces open
    /// at the root scope.
    pub fn new(macros: &MacroTable, pre_opened: OpenSet, sink: &'s dyn MessageSink) -> Self {
        let mut macros = macros.clone();
        inject_builtins(&mut macros);
        Self {
            macros,
            scopes: ScopeStack::new(pre_opened.clone()),
            pre_opened,
            sink,
            cancel: CancellationToken::new(),
            max_expansions: DEFAULT_MAX_EXPANSIONS,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_max_expansions(mut self, max_expansions: u32) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    // =============================
    // Public API for macro expansion
    // =============================

    /// Expands a whole forest, starting from a fresh root scope.
    pub fn process_forest(&mut self, nodes: NodeList) -> Result<NodeList, Cancelled> {
        self.scopes = ScopeStack::new(self.pre_opened.clone());
        let budget = self.max_expansions;
        Ok(self.apply_macros_to_list(&nodes, budget)?.unwrap_or(nodes))
    }

    /// Expands one node.
    ///
    /// A macro's output is dispatched again in a loop rather than by
    /// recursion, so the stack depth follows the tree and not the budget.
    ///
    /// # Returns
    /// `Ok(None)` if the node is unchanged.
    pub fn apply_macros(&mut self, input: &Node, budget: u32) -> Result<Option<Node>, Cancelled> {
        let mut frames = 0;
        let result = self.dispatch(input, budget, &mut frames);
        for _ in 0..frames {
            self.scopes.pop();
        }
        result
    }

    /// Imports inside a block end with the block, even when a macro replaces
    /// the block itself; the replacement is still expanded inside its frame.
    fn dispatch(&mut self, input: &Node, mut budget: u32, frames: &mut usize) -> Result<Option<Node>, Cancelled> {
        let mut current: Option<Node> = None;
        loop {
            if budget == 0 {
                return Ok(current);
            }
            self.cancel.check()?;

            let node = current.clone().unwrap_or_else(|| input.clone());
            let found = self.find_macros(&node);
            if found.is_empty() {
                return Ok(self.apply_macros_to_children(&node, budget)?.or(current));
            }
            if node.calls(&symbol::BRACES) {
                self.scopes.push();
                *frames += 1;
            }
            match self.apply_macros_found(&node, budget, found)? {
                Step::Done(output) => return Ok(output.or(current)),
                Step::Again(output, next) => {
                    current = Some(output);
                    budget = next;
                }
            }
        }
    }

    /// Expands each element of `list`, flattening splices into the result.
    ///
    /// # Returns
    /// `Ok(None)` if no element changed and none was a splice. Otherwise the
    /// new list shares the unchanged prefix with `list`.
    pub fn apply_macros_to_list(&mut self, list: &NodeList, budget: u32) -> Result<Option<NodeList>, Cancelled> {
        let mut results: Option<NodeList> = None;
        for (i, item) in list.iter().enumerate() {
            let expanded = self.apply_macros(item, budget)?;
            match results.as_mut() {
                Some(out) => push_spliced(out, expanded.unwrap_or_else(|| item.clone())),
                None => {
                    if expanded.is_none() && !item.calls(&symbol::SPLICE) {
                        continue;
                    }
                    let mut out = list.take(i);
                    push_spliced(&mut out, expanded.unwrap_or_else(|| item.clone()));
                    results = Some(out);
                }
            }
        }
        Ok(results)
    }

    /// Expands the attributes, the target (unless it is a plain identifier) and
    /// the arguments of `node`, but not `node` itself.
    pub fn apply_macros_to_children(&mut self, node: &Node, budget: u32) -> Result<Option<Node>, Cancelled> {
        if budget == 0 {
            return Ok(None);
        }
        let mut current = node.clone();
        let mut changed = false;

        if let Some(attrs) = self.apply_macros_to_list(node.attrs(), budget)? {
            current = current.with_attrs(attrs);
            changed = true;
        }
        if !node.has_simple_head() {
            if let Some(target) = node.target() {
                if let Some(mut new_target) = self.apply_macros(target, budget)? {
                    if new_target.calls_n(&symbol::SPLICE, 1) {
                        new_target = new_target.args()[0].clone();
                    }
                    current = current.with_target(new_target);
                    changed = true;
                }
            }
        }
        if let Some(args) = self.apply_macros_to_list(node.args(), budget)? {
            current = current.with_args(args);
            changed = true;
        }
        Ok(changed.then_some(current))
    }

    // =============================
    // Dispatch internals
    // =============================

    /// Macros matching the head of `input`: by simple name among visible
    /// namespaces, or by exact namespace for a qualified head `A.B(...)`.
    fn find_macros(&self, input: &Node) -> Vec<MacroEntry> {
        if input.has_simple_head() {
            return match input.name() {
                Some(name) => self.macros.lookup(self.scopes.current(), name),
                None => Vec::new(),
            };
        }
        if let Some(target) = input.target() {
            if target.calls_n(&symbol::DOT, 2) && target.args()[1].is_id() {
                if let Some(name) = target.args()[1].name() {
                    let namespace = namespace_symbol(&target.args()[0]);
                    return self.macros.lookup_in(&namespace, name);
                }
            }
        }
        Vec::new()
    }

    fn apply_macros_found(
        &mut self,
        input: &Node,
        budget: u32,
        mut found: Vec<MacroEntry>,
    ) -> Result<Step, Cancelled> {
        // Stable, so registration order holds within a tier.
        found.sort_by(|a, b| b.mode.priority.cmp(&a.mode.priority));

        let mut preprocessed: Option<Node> = None;
        for tier in found.chunk_by(|a, b| a.mode.priority == b.mode.priority) {
            if let Some(step) = self.apply_tier(input, budget, tier, &mut preprocessed)? {
                return Ok(step);
            }
        }

        let output = match preprocessed {
            Some(node) if Node::ptr_eq(&node, input) => None,
            Some(node) => Some(node),
            None => self.apply_macros_to_children(input, budget)?,
        };
        Ok(Step::Done(output))
    }

    fn apply_tier(
        &mut self,
        input: &Node,
        budget: u32,
        tier: &[MacroEntry],
        preprocessed: &mut Option<Node>,
    ) -> Result<Option<Step>, Cancelled> {
        let holder = MessageHolder::new();
        let mut attempts: Vec<Attempt> = Vec::with_capacity(tier.len());
        let mut accepted = 0;
        let mut winner = None;

        for entry in tier {
            let macro_input = if entry.mode.children_before {
                // Not enough budget to expand children and then the result.
                if budget == 1 {
                    continue;
                }
                match preprocessed.clone() {
                    Some(node) => node,
                    None => {
                        let node = self
                            .apply_macros_to_children(input, budget)?
                            .unwrap_or_else(|| input.clone());
                        *preprocessed = Some(node.clone());
                        node
                    }
                }
            } else {
                input.clone()
            };

            let start = holder.len();
            let outcome = {
                let mut ctx = MacroContext::new(&holder, &mut self.scopes);
                invoke_guarded(entry, &macro_input, &mut ctx)
            };
            let output = match outcome {
                Ok(output) => output,
                Err(MacroError::Cancelled) => {
                    tracing::debug!(macro_label = %entry.label(), "macro requested cancellation");
                    self.sink.write(
                        Severity::Error,
                        input,
                        format!("Macro-processing task cancelled in {}", entry.label()),
                    );
                    attempts.push(Attempt {
                        entry: entry.clone(),
                        output: None,
                        messages: start..holder.len(),
                    });
                    messages::report(self.sink, &holder, &attempts, input, accepted, Some(Severity::Error));
                    return Err(Cancelled);
                }
                Err(err) => {
                    holder.write(Severity::Error, input, err.to_string());
                    None
                }
            };
            if output.is_some() {
                accepted += 1;
                winner.get_or_insert(attempts.len());
            }
            attempts.push(Attempt {
                entry: entry.clone(),
                output,
                messages: start..holder.len(),
            });
        }

        let max_severity = holder.max_severity(0..holder.len());
        messages::report(self.sink, &holder, &attempts, input, accepted, max_severity);

        let Some(index) = winner else {
            return Ok(None);
        };
        let attempt = &attempts[index];
        let Some(output) = attempt.output.clone() else {
            return Ok(None);
        };
        tracing::trace!(macro_label = %attempt.entry.label(), input = %input, output = %output, "macro accepted");
        let mode = attempt.entry.mode;
        self.reprocess(input, output, mode, budget).map(Some)
    }

    /// Post-acceptance handling according to the winner's mode.
    fn reprocess(&mut self, input: &Node, output: Node, mode: MacroMode, budget: u32) -> Result<Step, Cancelled> {
        let budget = if mode.children_before { budget - 1 } else { budget };
        let next = budget.saturating_sub(1);
        let reprocessed = match mode.reprocess {
            Reprocess::Normal if output == *input => self.apply_macros_to_children(&output, next)?,
            Reprocess::Normal => return Ok(Step::Again(output, next)),
            Reprocess::ChildrenAfter => self.apply_macros_to_children(&output, next)?,
            Reprocess::None => None,
        };
        Ok(Step::Done(Some(reprocessed.unwrap_or(output))))
    }
}

/// Where a dispatch left a node.
enum Step {
    /// Finished; `None` if the node is unchanged.
    Done(Option<Node>),
    /// A macro produced a new node, to be dispatched with the given budget.
    Again(Node, u32),
}

/// Runs a macro, turning a panic into a failure report.
fn invoke_guarded(entry: &MacroEntry, node: &Node, ctx: &mut MacroContext<'_>) -> MacroResult {
    match panic::catch_unwind(AssertUnwindSafe(|| entry.invoke(node, ctx))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(MacroError::failed(format!("macro panicked: {}", reason)))
        }
    }
}

fn push_spliced(out: &mut NodeList, node: Node) {
    if node.calls(&symbol::SPLICE) {
        out.append(node.args().clone());
    } else {
        out.push_back(node);
    }
}

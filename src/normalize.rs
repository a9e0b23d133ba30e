//! Model normalization: fold node-local decision maps into one global
//! namespace, merge the legacy top-level transition hook, synthesize the
//! root node, and reject decision reference cycles up front.

use indexmap::IndexMap;

use crate::error::ValidationErrors;
use crate::model::{Chart, Model, StateNode, TargetSpec, Transition};
use crate::path::StatePath;

/// Consume the raw model and produce the read-only [`Chart`].
pub fn normalize(model: Model) -> Result<Chart, ValidationErrors> {
    let Model {
        initial,
        mut states,
        decisions,
        mut hooks,
        includes,
        context,
        context_init,
        entry,
        do_,
        exit,
        transition,
        ..
    } = model;

    let mut merged = decisions;
    collect_decisions(&StatePath::root(), &mut states, &mut merged)?;
    check_decision_cycles(&merged)?;

    if hooks.transition.is_none() {
        hooks.transition = transition;
    }

    let root = StateNode {
        initial,
        orthogonal: false,
        history: false,
        entry,
        do_,
        exit,
        transitions: Vec::new(),
        decisions: IndexMap::new(),
        states,
    };

    Ok(Chart {
        root,
        decisions: merged,
        hooks,
        includes: includes.unwrap_or_default(),
        context: context.unwrap_or_default(),
        context_init: context_init.unwrap_or_default(),
    })
}

fn collect_decisions(
    path: &StatePath,
    states: &mut IndexMap<String, StateNode>,
    merged: &mut IndexMap<String, Vec<Transition>>,
) -> Result<(), ValidationErrors> {
    for (name, node) in states.iter_mut() {
        let node_path = path.child(name);
        for (decision_name, rules) in node.decisions.drain(..) {
            if merged.contains_key(&decision_name) {
                return Err(ValidationErrors::single(format!(
                    "Duplicate decision name '{decision_name}' found in state '{}'.",
                    node_path.display()
                )));
            }
            merged.insert(decision_name, rules);
        }
        collect_decisions(&node_path, &mut node.states, merged)?;
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// A decision whose rules reach back to itself would make emission
/// recurse forever; refuse it here with the offending chain named.
fn check_decision_cycles(
    decisions: &IndexMap<String, Vec<Transition>>,
) -> Result<(), ValidationErrors> {
    let mut marks: IndexMap<&str, Mark> = IndexMap::new();
    for name in decisions.keys() {
        let mut chain = Vec::new();
        visit(name, decisions, &mut marks, &mut chain)?;
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    decisions: &'a IndexMap<String, Vec<Transition>>,
    marks: &mut IndexMap<&'a str, Mark>,
    chain: &mut Vec<&'a str>,
) -> Result<(), ValidationErrors> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            chain.push(name);
            return Err(ValidationErrors::single(format!(
                "Decision '@{name}' is part of a reference cycle: {}.",
                chain.join(" -> ")
            )));
        }
        None => {}
    }
    marks.insert(name, Mark::Visiting);
    chain.push(name);
    if let Some(rules) = decisions.get(name) {
        for rule in rules {
            if let Some(TargetSpec::Decision(next)) = rule.target() {
                if let Some((key, _)) = decisions.get_key_value(&next) {
                    visit(key, decisions, marks, chain)?;
                }
            }
        }
    }
    chain.pop();
    marks.insert(name, Mark::Done);
    Ok(())
}

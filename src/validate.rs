//! Structural validation of the normalized chart. Findings are
//! accumulated across the whole tree and reported together; the caller
//! aborts on any.

use log::warn;

use crate::error::ValidationErrors;
use crate::model::{Chart, StateNode, TargetSpec};
use crate::path::{self, StatePath};

pub fn validate(chart: &Chart) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    match &chart.root.initial {
        None => errors.push("Root model missing 'initial' state.".to_owned()),
        Some(initial) => {
            if !chart.root.states.contains_key(initial) {
                errors.push(format!("Root initial state '{initial}' does not exist."));
            }
        }
    }

    check_state(chart, &StatePath::root(), &chart.root, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors::new(errors))
    }
}

fn check_state(chart: &Chart, path: &StatePath, node: &StateNode, errors: &mut Vec<String>) {
    let display = path.display();

    if node.is_composite() {
        if node.orthogonal {
            if node.states.len() < 2 {
                errors.push(format!(
                    "State '{display}' is orthogonal but has fewer than two regions."
                ));
            }
            for (child_name, child) in &node.states {
                if !child.is_composite() {
                    warn!(
                        "state '{display}': orthogonal region '{child_name}' is a bare leaf"
                    );
                }
            }
        } else {
            match &node.initial {
                None => {
                    if !path.is_root() {
                        errors.push(format!(
                            "State '{display}' is composite but missing 'initial' property."
                        ));
                    }
                }
                Some(initial) => {
                    if !node.states.contains_key(initial) {
                        errors.push(format!(
                            "State '{display}' defines initial='{initial}', but that child does not exist."
                        ));
                    }
                }
            }
        }
    }

    for (i, transition) in node.transitions.iter().enumerate() {
        let index = i + 1;
        let Some(target) = transition.target() else {
            errors.push(format!("State '{display}', transition #{index}: Missing 'to'."));
            continue;
        };

        match target {
            TargetSpec::Termination => {}
            TargetSpec::Decision(name) => {
                if !chart.decisions.contains_key(&name) {
                    errors.push(format!(
                        "State '{display}', transition #{index}: Decision '@{name}' does not exist."
                    ));
                }
            }
            TargetSpec::Path { spec, branches } => {
                let target_path = path::resolve_target(path, &spec);
                let Some(target_node) = chart.lookup(&target_path) else {
                    errors.push(format!(
                        "State '{display}', transition #{index}: Target '{spec}' (resolved: {}) does not exist.",
                        target_path.display()
                    ));
                    continue;
                };

                if let Some(branches) = branches {
                    if !target_node.is_composite() {
                        errors.push(format!(
                            "State '{display}': Fork target '{spec}' is not a composite state."
                        ));
                    } else {
                        for branch in branches {
                            let mut branch_path = target_path.clone();
                            for segment in branch.split('/') {
                                branch_path = branch_path.child(segment);
                            }
                            if chart.lookup(&branch_path).is_none() {
                                errors.push(format!(
                                    "State '{display}': Fork branch '{branch}' does not exist inside '{spec}'."
                                ));
                            }
                        }
                    }
                }
            }
        }
    }

    for (child_name, child) in &node.states {
        check_state(chart, &path.child(child_name), child, errors);
    }
}

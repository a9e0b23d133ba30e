//! Graphviz rendering of the chart: composites as clusters, orthogonal
//! composites dashed, initial markers as point nodes, decisions as
//! diamonds, transition labels as `[guard] / action`.

use std::collections::HashSet;

use crate::model::{Chart, Guard, StateNode, TargetSpec, Transition};
use crate::path::{self, StatePath};

pub fn render(chart: &Chart) -> String {
    let mut composites = HashSet::new();
    find_composites(&StatePath::root(), &chart.root, &mut composites);

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    walk(&StatePath::root(), &chart.root, &mut nodes, &mut edges, &composites);

    for (name, rules) in &chart.decisions {
        let decision_path = StatePath::root().child(name);
        let decision_id = graph_id(&decision_path);
        nodes.push(format!(
            "    {decision_id} [label=\"?\", shape=diamond, style=filled, fillcolor=lightyellow];"
        ));
        for rule in rules {
            if let Some(edge) = decision_edge(&decision_id, &decision_path, rule, &composites) {
                edges.push(edge);
            }
        }
    }

    let mut lines = vec![
        "digraph StateMachine {".to_owned(),
        "    compound=true; fontname=\"Arial\"; node [fontname=\"Arial\"]; edge [fontname=\"Arial\"];"
            .to_owned(),
        "    // --- Structures ---".to_owned(),
    ];
    lines.extend(nodes);
    lines.push("    // --- Transitions ---".to_owned());
    lines.extend(edges);
    lines.push("}".to_owned());
    lines.join("\n")
}

fn graph_id(state_path: &StatePath) -> String {
    state_path.flat("__")
}

fn find_composites(state_path: &StatePath, node: &StateNode, out: &mut HashSet<String>) {
    if node.is_composite() {
        out.insert(graph_id(state_path));
        for (child_name, child) in &node.states {
            find_composites(&state_path.child(child_name), child, out);
        }
    }
}

fn walk(
    state_path: &StatePath,
    node: &StateNode,
    nodes: &mut Vec<String>,
    edges: &mut Vec<String>,
    composites: &HashSet<String>,
) {
    let my_id = graph_id(state_path);
    let indent = "    ".repeat(state_path.len());

    if node.is_composite() {
        nodes.push(format!("{indent}subgraph cluster_{my_id} {{"));
        nodes.push(format!("{indent}    label = \"{}\";", state_path.tail()));

        if node.orthogonal {
            nodes.push(format!(
                "{indent}    style=dashed; color=black; penwidth=1.5; node [style=filled, fillcolor=white];"
            ));
            nodes.push(format!("{indent}    {my_id}_start [shape=point, width=0.15];"));
            for child_name in node.states.keys() {
                let child_id = graph_id(&state_path.child(child_name));
                let (target, lhead) = cluster_target(&child_id, composites);
                nodes.push(format!(
                    "{indent}    {my_id}_start -> {target} [style=dashed{}];",
                    lhead.map(|l| format!(", {l}")).unwrap_or_default()
                ));
            }
        } else {
            nodes.push(format!(
                "{indent}    style=rounded; color=black; penwidth=1.0; node [style=filled, fillcolor=white];"
            ));
            if node.history {
                nodes.push(format!(
                    "{indent}    {my_id}_hist [shape=circle, label=\"H\", width=0.3];"
                ));
            }
            nodes.push(format!("{indent}    {my_id}_start [shape=point, width=0.15];"));
            if let Some(initial) = &node.initial {
                let init_id = graph_id(&state_path.child(initial));
                let (target, lhead) = cluster_target(&init_id, composites);
                nodes.push(format!(
                    "{indent}    {my_id}_start -> {target} [{}];",
                    lhead.unwrap_or_default()
                ));
            }
        }

        for (child_name, child) in &node.states {
            walk(&state_path.child(child_name), child, nodes, edges, composites);
        }
        nodes.push(format!("{indent}}}"));
    } else {
        nodes.push(format!(
            "{indent}{my_id} [label=\"{}\", shape=box, style=\"rounded,filled\", fillcolor=white];",
            state_path.tail()
        ));
    }

    for transition in &node.transitions {
        let Some(target) = transition.target() else { continue };
        let (src, ltail) = if node.is_composite() {
            (format!("{my_id}_start"), Some(format!("ltail=cluster_{my_id}")))
        } else {
            (my_id.clone(), None)
        };

        let (tgt, lhead) = match &target {
            TargetSpec::Termination => continue,
            TargetSpec::Decision(name) => (graph_id(&StatePath::root().child(name)), None),
            TargetSpec::Path { spec, .. } => {
                let target_id = graph_id(&path::resolve_target(state_path, spec));
                let (tgt, lhead) = cluster_target(&target_id, composites);
                (tgt, lhead)
            }
        };

        let mut attrs: Vec<String> = Vec::new();
        attrs.extend(ltail);
        attrs.extend(lhead);
        attrs.push(format!("label=\"{}\"", edge_label(transition)));
        attrs.push("fontsize=10".to_owned());
        edges.push(format!("{src} -> {tgt} [{}];", attrs.join(", ")));
    }
}

fn decision_edge(
    decision_id: &str,
    decision_path: &StatePath,
    rule: &Transition,
    composites: &HashSet<String>,
) -> Option<String> {
    let target = rule.target()?;
    let (tgt, lhead) = match &target {
        TargetSpec::Termination => return None,
        TargetSpec::Decision(name) => (graph_id(&StatePath::root().child(name)), None),
        TargetSpec::Path { spec, .. } => {
            let target_id = graph_id(&path::resolve_target(decision_path, spec));
            cluster_target(&target_id, composites)
        }
    };

    let guard_label = match &rule.guard {
        Guard::Expr(expr) => escape(expr),
        Guard::Literal(value) => value.to_string(),
    };
    let mut attrs = format!("label=\"{guard_label}\", fontsize=10");
    if let Some(lhead) = lhead {
        attrs.push_str(&format!(", {lhead}"));
    }
    Some(format!("    {decision_id} -> {tgt} [{attrs}];"))
}

/// Point an edge at a composite's start marker, with the cluster head
/// attribute so the arrow stops at the cluster border.
fn cluster_target(target_id: &str, composites: &HashSet<String>) -> (String, Option<String>) {
    if composites.contains(target_id) {
        (format!("{target_id}_start"), Some(format!("lhead=cluster_{target_id}")))
    } else {
        (target_id.to_owned(), None)
    }
}

fn edge_label(transition: &Transition) -> String {
    let mut parts = Vec::new();
    if let Guard::Expr(expr) = &transition.guard {
        parts.push(format!("[{expr}]"));
    }
    if let Some(action) = &transition.action {
        let mut text = action.trim().replace('\n', "; ");
        if text.chars().count() > 15 {
            text = text.chars().take(12).collect::<String>() + "...";
        }
        parts.push(format!("/ {text}"));
    }
    escape(&parts.join(" "))
}

fn escape(text: &str) -> String {
    text.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::normalize::normalize;

    fn chart(yaml: &str) -> Chart {
        let model: Model = serde_yaml::from_str(yaml).unwrap();
        normalize(model).unwrap()
    }

    #[test]
    fn composites_become_clusters_and_orthogonals_are_dashed() {
        let dot = render(&chart(
            r#"
initial: o
states:
  o:
    orthogonal: true
    states:
      a:
        initial: a1
        states:
          a1: {}
      b:
        initial: b1
        states:
          b1: {}
"#,
        ));
        assert!(dot.contains("subgraph cluster_root__o {"), "{dot}");
        assert!(dot.contains("style=dashed"), "{dot}");
        assert!(dot.contains("subgraph cluster_root__o__a {"), "{dot}");
    }

    #[test]
    fn guard_and_action_render_as_edge_label() {
        let dot = render(&chart(
            r#"
initial: a
states:
  a:
    transitions:
      - { to: b, guard: x > 1, action: fire() }
  b: {}
"#,
        ));
        assert!(dot.contains("label=\"[x > 1] / fire()\""), "{dot}");
    }

    #[test]
    fn long_actions_are_abbreviated() {
        let dot = render(&chart(
            r#"
initial: a
states:
  a:
    transitions:
      - { to: b, action: "a_very_long_action_statement();" }
  b: {}
"#,
        ));
        assert!(dot.contains("a_very_long_..."), "{dot}");
    }

    #[test]
    fn decision_renders_as_diamond_with_rule_edges() {
        let dot = render(&chart(
            r#"
initial: a
decisions:
  pick:
    - { to: b, guard: ready }
states:
  a:
    transitions:
      - { to: "@pick" }
  b: {}
"#,
        ));
        assert!(dot.contains("root__pick [label=\"?\", shape=diamond"), "{dot}");
        assert!(dot.contains("root__a -> root__pick"), "{dot}");
        assert!(dot.contains("root__pick -> root__b [label=\"ready\""), "{dot}");
    }

    #[test]
    fn history_marker_is_present() {
        let dot = render(&chart(
            r#"
initial: h
states:
  h:
    history: true
    initial: x
    states:
      x: {}
"#,
        ));
        assert!(dot.contains("root__h_hist [shape=circle, label=\"H\""), "{dot}");
    }
}

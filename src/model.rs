//! Typed statechart model, deserialized from the YAML input file.
//!
//! Sibling order is semantic throughout (region tick order, transition
//! priority, decision rule order), so every name-to-node map is an
//! `IndexMap` which preserves declaration order.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::path::{self, StatePath};

/// Root of the model file.
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub states: IndexMap<String, StateNode>,
    #[serde(default)]
    pub decisions: IndexMap<String, Vec<Transition>>,
    #[serde(default)]
    pub hooks: Hooks,
    #[serde(default)]
    pub includes: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub context_init: Option<String>,
    #[serde(default)]
    pub language: Option<Languages>,
    /// Root-level entry/do/exit snippets.
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default, rename = "do")]
    pub do_: Option<String>,
    #[serde(default)]
    pub exit: Option<String>,
    /// Legacy top-level transition hook, folded into `hooks` during
    /// normalization when `hooks.transition` is absent.
    #[serde(default)]
    pub transition: Option<String>,
}

impl Model {
    /// Requested target languages, falling back to `rust`.
    pub fn languages(&self) -> Vec<String> {
        match &self.language {
            None => vec!["rust".to_owned()],
            Some(Languages::One(lang)) => vec![lang.clone()],
            Some(Languages::Many(langs)) => langs.clone(),
        }
    }
}

/// `language: rust` or `language: [c, rust]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Languages {
    One(String),
    Many(Vec<String>),
}

/// Global hook snippets woven into every generated state function.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hooks {
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default, rename = "do")]
    pub do_: Option<String>,
    #[serde(default)]
    pub exit: Option<String>,
    #[serde(default)]
    pub transition: Option<String>,
}

/// One state in the chart. A node with children and an `initial` is a
/// composite-OR; with children and `orthogonal` it is a composite-AND
/// whose children are concurrent regions; otherwise it is a leaf.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateNode {
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub orthogonal: bool,
    #[serde(default)]
    pub history: bool,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default, rename = "do")]
    pub do_: Option<String>,
    #[serde(default)]
    pub exit: Option<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub decisions: IndexMap<String, Vec<Transition>>,
    #[serde(default)]
    pub states: IndexMap<String, StateNode>,
}

impl StateNode {
    pub fn is_composite(&self) -> bool {
        !self.states.is_empty()
    }
}

/// A guarded transition. `to` distinguishes a *missing* key (a validation
/// error) from an explicit `null` (termination).
#[derive(Debug, Clone, Deserialize)]
pub struct Transition {
    #[serde(default, deserialize_with = "double_option")]
    pub to: Option<Option<String>>,
    #[serde(default)]
    pub guard: Guard,
    #[serde(default)]
    pub action: Option<String>,
}

impl Transition {
    /// Parse `to` into the target sum type; `None` when the key is absent.
    pub fn target(&self) -> Option<TargetSpec> {
        let raw = self.to.as_ref()?;
        Some(match raw.as_deref() {
            None | Some("") | Some("null") => TargetSpec::Termination,
            Some(spec) => {
                if let Some(name) = spec.strip_prefix('@') {
                    TargetSpec::Decision(name.to_owned())
                } else {
                    let (base, branches) = path::parse_fork(spec);
                    TargetSpec::Path { spec: base, branches }
                }
            }
        })
    }
}

/// Transition target, parsed once from the raw `to` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// `to: null`: unwind every ancestor, root included, and halt.
    Termination,
    /// `to: "@name"`: evaluate the named decision's rules in order.
    Decision(String),
    /// A path spec, optionally carrying fork branches.
    Path { spec: String, branches: Option<Vec<String>> },
}

/// Transition guard: a boolean literal or an opaque target-language
/// expression (which may use the `IN_STATE(name)` pseudo-call).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Guard {
    Literal(bool),
    Expr(String),
}

impl Default for Guard {
    fn default() -> Self {
        Guard::Literal(true)
    }
}

/// Accepts a present-but-null value: missing key deserializes to `None`,
/// `key: null` to `Some(None)`, `key: x` to `Some(Some(x))`.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// The normalized, read-only chart the emitters consume. Produced by
/// `normalize::normalize`; local decision maps have been folded into
/// `decisions` and the root node synthesized.
#[derive(Debug, Clone)]
pub struct Chart {
    pub root: StateNode,
    pub decisions: IndexMap<String, Vec<Transition>>,
    pub hooks: Hooks,
    pub includes: String,
    pub context: String,
    pub context_init: String,
}

impl Chart {
    /// Walk the tree to the node at `path`; `/` yields the root itself.
    /// A path that does not begin with the `root` sentinel is looked up
    /// from the root anyway, segment by segment.
    pub fn lookup(&self, path: &StatePath) -> Option<&StateNode> {
        let segments = path.segments();
        let start = usize::from(segments.first().map(String::as_str) == Some("root"));
        let mut node = &self.root;
        for segment in &segments[start..] {
            node = node.states.get(segment)?;
        }
        Some(node)
    }
}

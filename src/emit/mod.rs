//! Backend-agnostic code emission.
//!
//! The semantics live here: the state walker assigns ids and threads
//! parent-pointer bookkeeping, the transition emitter produces guarded
//! blocks (termination, decision chains, cross-limb hot-swaps, forks,
//! ordinary exit/entry sequences), and the inspector emitter renders the
//! active-path introspection routines. Backends supply surface syntax
//! only: statement formatting hooks, the per-state templates, and a final
//! assembler.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::EmitError;
use crate::model::{Chart, Guard, StateNode, TargetSpec, Transition};
use crate::path::{self, EntryKind, StatePath};

mod c;
mod python;
mod rust;

/// Target language selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Lang {
    C,
    Rust,
    Python,
}

impl Lang {
    pub fn from_name(name: &str) -> Option<Lang> {
        match name {
            "c" => Some(Lang::C),
            "rust" => Some(Lang::Rust),
            "python" => Some(Lang::Python),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Lang::C => "c",
            Lang::Rust => "rust",
            Lang::Python => "python",
        }
    }
}

/// One generated file; `ext` includes the dot and is appended to the
/// output base path.
#[derive(Debug)]
pub struct OutputFile {
    pub ext: &'static str,
    pub contents: String,
}

/// Fragments accumulated by the walker, consumed by each backend's
/// assembler.
#[derive(Default)]
pub struct EmitParts {
    pub context_ptrs: Vec<String>,
    pub context_init: Vec<String>,
    pub functions: Vec<String>,
    pub impls: Vec<String>,
    pub inspectors: Vec<String>,
    pub forwards: Vec<String>,
    pub state_count: usize,
}

/// Surface syntax for one target language. The emitter drives these hooks
/// and the templates; a backend never re-implements sequencing semantics.
pub trait Backend {
    fn comment_leader(&self) -> &'static str;
    fn bool_lit(&self, value: bool) -> &'static str;
    /// Rewrite `IN_STATE(name)` pseudo-calls to the target predicate.
    fn rewrite_guard(&self, guard: &str) -> String;

    fn if_open(&self, cond: &str) -> String;
    fn else_if_open(&self, cond: &str) -> String;
    fn block_close(&self) -> &'static str;
    fn str_binding(&self, name: &str, value: &str) -> String;
    fn set_flag(&self, flag: &str, value: bool) -> String;
    fn call_state(&self, func: &str) -> String;
    /// Guarded call through a nullable context function pointer.
    fn call_ptr(&self, ptr: &str) -> String;
    fn return_stmt(&self) -> &'static str;

    fn set_ptr(&self, ptr: &str, func: &str) -> String;
    fn clear_ptr(&self, ptr: &str) -> String;
    /// Context field declaration for a pointer, if the language needs one.
    fn ptr_field(&self, ptr: &str) -> Option<String>;
    /// Constructor initialization for a pointer, if the language needs one.
    fn ptr_init(&self, ptr: &str) -> Option<String>;
    fn in_state_impl(&self, flat: &str, run_ptr: &str) -> String;
    fn safety_check(&self, flat: &str, has_parent: bool) -> String;
    fn ptr_eq(&self, ptr: &str, func: &str) -> String;

    fn inspect_push(&self, text: &str) -> String;
    fn inspect_call(&self, flat: &str) -> String;

    /// Per-state forward declarations (C needs them; others do not).
    fn state_forwards(&self, _flat: &str) -> Vec<String> {
        Vec::new()
    }

    fn preamble_template(&self) -> &'static str;
    fn leaf_template(&self) -> &'static str;
    fn composite_or_template(&self) -> &'static str;
    fn composite_and_template(&self) -> &'static str;
    fn inspector_template(&self) -> &'static str;

    fn assemble(&self, chart: &Chart, parts: &EmitParts, basename: &str) -> Vec<OutputFile>;
}

/// Compile the chart for one target language.
pub fn generate(chart: &Chart, lang: Lang, basename: &str) -> Result<Vec<OutputFile>, EmitError> {
    match lang {
        Lang::C => run(chart, &c::CBackend, basename),
        Lang::Rust => run(chart, &rust::RustBackend, basename),
        Lang::Python => run(chart, &python::PythonBackend, basename),
    }
}

fn run<B: Backend>(chart: &Chart, backend: &B, basename: &str) -> Result<Vec<OutputFile>, EmitError> {
    let mut emitter = Emitter { chart, backend, parts: EmitParts::default(), counter: 0 };
    let root_path = StatePath::root();
    emitter.recurse(&root_path, &chart.root, None)?;
    emitter.gen_inspector(&root_path, &chart.root);
    emitter.parts.state_count = emitter.counter;
    Ok(backend.assemble(chart, &emitter.parts, basename))
}

pub(crate) static IN_STATE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IN_STATE\((\w+)\)").unwrap());

struct ParentPtrs {
    run: String,
    exit: String,
    hist: Option<String>,
}

struct Emitter<'a, B: Backend> {
    chart: &'a Chart,
    backend: &'a B,
    parts: EmitParts,
    counter: usize,
}

impl<'a, B: Backend> Emitter<'a, B> {
    /// Depth-first walk. Children are emitted before their parent so that
    /// define-before-use targets need no extra ordering work.
    fn recurse(
        &mut self,
        state_path: &StatePath,
        node: &'a StateNode,
        parent: Option<&ParentPtrs>,
    ) -> Result<(), EmitError> {
        let id = self.counter;
        self.counter += 1;
        let flat = state_path.flat("_");
        let display = state_path.display();
        let is_root = state_path.is_root();

        for forward in self.backend.state_forwards(&flat) {
            self.parts.forwards.push(forward);
        }

        let preamble = fill(
            self.backend.preamble_template(),
            &[
                ("short_name", state_path.tail().to_owned()),
                ("display_name", display.clone()),
                ("state_id", id.to_string()),
            ],
        );

        let mut set_parent = String::new();
        let mut clear_parent = String::new();
        if let Some(parent) = parent {
            self.parts.impls.push(self.backend.in_state_impl(&flat, &parent.run));

            let mut lines = vec![
                self.backend.set_ptr(&parent.run, &format!("state_{flat}_do")),
                self.backend.set_ptr(&parent.exit, &format!("state_{flat}_exit")),
            ];
            if let Some(hist) = &parent.hist {
                lines.push(self.backend.set_ptr(hist, &format!("state_{flat}_entry")));
            }
            set_parent = lines.join("\n");
            clear_parent = [
                self.backend.clear_ptr(&parent.run),
                self.backend.clear_ptr(&parent.exit),
            ]
            .join("\n");
        }

        let mut transitions = String::new();
        for (i, transition) in node.transitions.iter().enumerate() {
            let block = self
                .emit_transition(state_path, transition, 1)
                .map_err(|e| e.in_transition(i + 1).in_state(display.clone()))?;
            transitions.push_str(&block);
        }

        let hooks = &self.chart.hooks;
        let entry_snip = self.snippet(node.entry.as_deref(), is_root, "Root Entry");
        let do_snip = self.snippet(node.do_.as_deref(), is_root, "Root Do");
        let exit_snip = self.snippet(node.exit.as_deref(), is_root, "Root Exit");

        let mut vars: Vec<(&str, String)> = vec![
            ("c_name", flat.clone()),
            ("state_id", id.to_string()),
            ("preamble", preamble.trim_end().to_owned()),
            ("hook_entry", hooks.entry.clone().unwrap_or_default()),
            ("hook_do", hooks.do_.clone().unwrap_or_default()),
            ("hook_exit", hooks.exit.clone().unwrap_or_default()),
            ("entry", entry_snip),
            ("do", do_snip),
            ("exit", exit_snip),
            ("transitions", transitions.trim_end().to_owned()),
            ("set_parent", set_parent),
            ("clear_parent", clear_parent),
        ];

        let body = if node.is_composite() {
            if node.orthogonal {
                let safety = self.backend.safety_check(&flat, parent.is_some());
                let mut entries = Vec::new();
                let mut exits = Vec::new();
                let mut ticks = Vec::new();

                for (child_name, child) in &node.states {
                    let child_path = state_path.child(child_name);
                    let child_flat = child_path.flat("_");
                    let region_ptr = format!("ptr_{child_flat}_region");
                    let region_exit = format!("{region_ptr}_exit");
                    self.declare_ptr(&region_ptr);
                    self.declare_ptr(&region_exit);

                    entries.push(self.backend.call_state(&format!("state_{child_flat}_entry")));
                    exits.push(self.backend.call_ptr(&region_exit));
                    ticks.push(self.backend.call_state(&format!("state_{child_flat}_do")));
                    ticks.push(safety.clone());

                    let ptrs =
                        ParentPtrs { run: region_ptr, exit: region_exit, hist: None };
                    self.recurse(&child_path, child, Some(&ptrs))?;
                }

                vars.push(("parallel_entries", entries.join("\n")));
                vars.push(("parallel_exits", exits.join("\n")));
                vars.push(("parallel_ticks", ticks.join("\n")));
                vars.push(("safety_check", safety));
                fill(self.backend.composite_and_template(), &vars)
            } else {
                let my_ptr = format!("ptr_{flat}");
                let my_exit = format!("{my_ptr}_exit");
                let my_hist = format!("hist_{flat}");
                self.declare_ptr(&my_ptr);
                self.declare_ptr(&my_exit);
                self.declare_ptr(&my_hist);

                let initial = node.initial.as_deref().ok_or_else(|| {
                    EmitError::msg("composite state has no 'initial'").in_state(display.clone())
                })?;
                let initial_target = state_path.child(initial).flat("_");

                vars.push(("history", self.backend.bool_lit(node.history).to_owned()));
                vars.push(("self_ptr", my_ptr.clone()));
                vars.push(("self_exit_ptr", my_exit.clone()));
                vars.push(("self_hist_ptr", my_hist.clone()));
                vars.push(("initial_target", initial_target));
                let body = fill(self.backend.composite_or_template(), &vars);

                let child_hist = node.history.then(|| my_hist.clone());
                for (child_name, child) in &node.states {
                    let ptrs = ParentPtrs {
                        run: my_ptr.clone(),
                        exit: my_exit.clone(),
                        hist: child_hist.clone(),
                    };
                    self.recurse(&state_path.child(child_name), child, Some(&ptrs))?;
                }
                body
            }
        } else {
            fill(self.backend.leaf_template(), &vars)
        };

        self.parts.functions.push(body);
        Ok(())
    }

    fn declare_ptr(&mut self, ptr: &str) {
        if let Some(decl) = self.backend.ptr_field(ptr) {
            self.parts.context_ptrs.push(decl);
        }
        if let Some(init) = self.backend.ptr_init(ptr) {
            self.parts.context_init.push(init);
        }
    }

    fn snippet(&self, value: Option<&str>, is_root: bool, root_default: &str) -> String {
        match value {
            Some(text) => text.to_owned(),
            None if is_root => format!("{} {root_default}", self.backend.comment_leader()),
            None => String::new(),
        }
    }

    /// Emit one guarded transition block at the given indent level.
    fn emit_transition(
        &self,
        src: &StatePath,
        transition: &Transition,
        level: usize,
    ) -> Result<String, EmitError> {
        let b = self.backend;
        let ind = "    ".repeat(level);
        let inner = "    ".repeat(level + 1);
        let mut code = String::new();

        let cond = match &transition.guard {
            Guard::Literal(value) => b.bool_lit(*value).to_owned(),
            Guard::Expr(expr) => b.rewrite_guard(expr),
        };
        code.push_str(&format!("{ind}{}\n", b.if_open(&cond)));

        let target = transition
            .target()
            .ok_or_else(|| EmitError::msg("transition has no 'to' field"))?;

        let (dst_label, resolved) = match &target {
            TargetSpec::Termination => ("Termination".to_owned(), None),
            TargetSpec::Decision(name) => (format!("Decision({name})"), None),
            TargetSpec::Path { spec, branches } => {
                let target_path = path::resolve_target(src, spec);
                let label = match branches {
                    Some(branches) => {
                        format!("{}[{}]", target_path.display(), branches.join(","))
                    }
                    None => target_path.display(),
                };
                (label, Some(target_path))
            }
        };

        // Decision references defer src/dst bookkeeping to their rules.
        if !matches!(target, TargetSpec::Decision(_)) {
            code.push_str(&format!("{inner}{}\n", b.str_binding("t_src", &src.display())));
            code.push_str(&format!("{inner}{}\n", b.str_binding("t_dst", &dst_label)));
            if let Some(hook) = &self.chart.hooks.transition {
                code.push_str(&indent_lines(hook, &inner));
            }
        }

        code.push_str(&format!("{inner}{}\n", b.set_flag("transition_fired", true)));

        if let Some(action) = &transition.action {
            code.push_str(&indent_lines(action, &inner));
        }

        let mut closed = false;
        match target {
            TargetSpec::Termination => {
                for state in path::exit_sequence(src, &StatePath::root()) {
                    code.push_str(&format!(
                        "{inner}{}\n",
                        b.call_state(&format!("state_{}_exit", state.flat("_")))
                    ));
                }
                code.push_str(&format!("{inner}{}\n", b.call_state("state_root_exit")));
                code.push_str(&format!("{inner}{}\n", b.set_flag("terminated", true)));
                code.push_str(&format!("{inner}{}\n", b.return_stmt()));
            }
            TargetSpec::Decision(name) => {
                let rules = self
                    .chart
                    .decisions
                    .get(&name)
                    .ok_or_else(|| EmitError::msg(format!("decision '@{name}' does not exist")))?;
                for rule in rules {
                    code.push_str(&self.emit_transition(src, rule, level + 1)?);
                }
            }
            TargetSpec::Path { branches, .. } => {
                let target_path = resolved.expect("path target was resolved above");
                closed = self.emit_ordinary(&mut code, src, target_path, branches, level)?;
            }
        }

        if !closed && !b.block_close().is_empty() {
            code.push_str(&format!("{ind}{}\n", b.block_close()));
        }
        Ok(code)
    }

    /// Exit/entry emission for a plain path target. Returns `true` when the
    /// cross-limb fast path already closed the guard block.
    fn emit_ordinary(
        &self,
        code: &mut String,
        src: &StatePath,
        mut target_path: StatePath,
        mut branches: Option<Vec<String>>,
        level: usize,
    ) -> Result<bool, EmitError> {
        let b = self.backend;
        let ind = "    ".repeat(level);
        let inner = "    ".repeat(level + 1);
        let lca = path::lca_index(src, &target_path);

        // Cross-limb: the LCA is orthogonal and source and target sit in
        // different regions of it.
        let container = src.prefix(lca);
        if let Some(container_node) = self.chart.lookup(&container) {
            if container_node.orthogonal && src.len() > lca && target_path.len() > lca {
                let target_limb = target_path.get(lca).expect("limb segment below LCA");
                if src.get(lca) != Some(target_limb) {
                    let limb_path = container.child(target_limb);
                    let limb_flat = limb_path.flat("_");
                    let limb_is_composite = self
                        .chart
                        .lookup(&limb_path)
                        .is_some_and(StateNode::is_composite);
                    let targeting_deeper = target_path.len() > limb_path.len();

                    // Hot-swap: keep the target limb alive and only tear
                    // down its active descendant; otherwise reset the
                    // whole region and re-enter from the container.
                    let entry_source = if limb_is_composite && targeting_deeper {
                        code.push_str(&format!(
                            "{inner}{}\n",
                            b.call_ptr(&format!("ptr_{limb_flat}_exit"))
                        ));
                        limb_path
                    } else {
                        code.push_str(&format!(
                            "{inner}{}\n",
                            b.call_ptr(&format!("ptr_{limb_flat}_region_exit"))
                        ));
                        container
                    };

                    let force_start = branches.is_some();
                    for (state, kind) in path::entry_sequence(&entry_source, &target_path) {
                        let forced = force_start && state == target_path;
                        code.push_str(&format!(
                            "{inner}{}\n",
                            b.call_state(&entry_fn(&state, kind, forced))
                        ));
                    }
                    code.push_str(&format!("{inner}{}\n", b.return_stmt()));
                    if !b.block_close().is_empty() {
                        code.push_str(&format!("{ind}{}\n", b.block_close()));
                    }
                    return Ok(true);
                }
            }
        }

        // Implicit fork: a bare path into one region of an orthogonal
        // ancestor, from outside that region, becomes a single-branch fork
        // on the ancestor.
        if branches.is_none() {
            let mut ortho_idx = None;
            for i in 0..target_path.len() {
                if let Some(node) = self.chart.lookup(&target_path.prefix(i + 1)) {
                    if node.orthogonal {
                        ortho_idx = Some(i);
                        break;
                    }
                }
            }
            if let Some(i) = ortho_idx {
                if i < target_path.len() - 1 {
                    let limb_idx = i + 1;
                    let same_limb = src.get(limb_idx).is_some()
                        && src.get(limb_idx) == target_path.get(limb_idx);
                    if !same_limb {
                        let branch = target_path.segments()[limb_idx..].join("/");
                        branches = Some(vec![branch]);
                        target_path = target_path.prefix(i + 1);
                    }
                }
            }
        }

        // A transition owned by a composite-OR whose target lies in its own
        // subtree (self-loops included) must first tear down whatever child
        // is currently active, through the dynamic exit pointer.
        if lca >= src.len() {
            if let Some(node) = self.chart.lookup(src) {
                if node.is_composite() && !node.orthogonal {
                    code.push_str(&format!(
                        "{inner}{}\n",
                        b.call_ptr(&format!("ptr_{}_exit", src.flat("_")))
                    ));
                }
            }
        }

        for state in path::exit_sequence(src, &target_path) {
            code.push_str(&format!(
                "{inner}{}\n",
                b.call_state(&format!("state_{}_exit", state.flat("_")))
            ));
        }

        match &branches {
            None => {
                for (state, kind) in path::entry_sequence(src, &target_path) {
                    code.push_str(&format!(
                        "{inner}{}\n",
                        b.call_state(&entry_fn(&state, kind, false))
                    ));
                }
            }
            Some(branches) => {
                // The fork base must not descend to its default initial, so
                // it gets the shallow start even as the last entry.
                for (state, kind) in path::entry_sequence(src, &target_path) {
                    let forced = state == target_path;
                    code.push_str(&format!(
                        "{inner}{}\n",
                        b.call_state(&entry_fn(&state, kind, forced))
                    ));
                }

                if let Some(base_node) = self.chart.lookup(&target_path) {
                    for child_name in base_node.states.keys() {
                        let matching = branches
                            .iter()
                            .find(|branch| branch.split('/').next() == Some(child_name.as_str()));
                        match matching {
                            Some(branch) => {
                                let mut fork_target = target_path.clone();
                                for segment in branch.split('/') {
                                    fork_target = fork_target.child(segment);
                                }
                                for (state, kind) in
                                    path::entry_sequence(&target_path, &fork_target)
                                {
                                    code.push_str(&format!(
                                        "{inner}{}\n",
                                        b.call_state(&entry_fn(&state, kind, false))
                                    ));
                                }
                            }
                            None => {
                                let child_path = target_path.child(child_name);
                                code.push_str(&format!(
                                    "{inner}{}\n",
                                    b.call_state(&format!(
                                        "state_{}_entry",
                                        child_path.flat("_")
                                    ))
                                ));
                            }
                        }
                    }
                }
            }
        }

        code.push_str(&format!("{inner}{}\n", b.return_stmt()));
        Ok(false)
    }

    /// Emit the active-path rendering routine for `state_path` and,
    /// recursively, for every descendant.
    fn gen_inspector(&mut self, state_path: &StatePath, node: &'a StateNode) {
        let b = self.backend;
        let flat = state_path.flat("_");
        let push_name = if state_path.is_root() {
            String::new()
        } else {
            b.inspect_push(&format!("/{}", state_path.tail()))
        };

        let mut content_lines: Vec<String> = Vec::new();
        if node.is_composite() {
            if node.orthogonal {
                content_lines.push(b.inspect_push("/["));
                let last = node.states.len() - 1;
                for (i, (child_name, child)) in node.states.iter().enumerate() {
                    let child_path = state_path.child(child_name);
                    self.gen_inspector(&child_path, child);
                    content_lines.push(b.inspect_call(&child_path.flat("_")));
                    if i < last {
                        content_lines.push(b.inspect_push(","));
                    }
                }
                content_lines.push(b.inspect_push("]"));
            } else {
                let my_ptr = format!("ptr_{flat}");
                for (child_name, child) in &node.states {
                    self.gen_inspector(&state_path.child(child_name), child);
                }
                for (i, child_name) in node.states.keys().enumerate() {
                    let child_flat = state_path.child(child_name).flat("_");
                    let cond = b.ptr_eq(&my_ptr, &format!("state_{child_flat}_do"));
                    let open = if i == 0 { b.if_open(&cond) } else { b.else_if_open(&cond) };
                    content_lines.push(open);
                    content_lines.push(format!("    {}", b.inspect_call(&child_flat)));
                }
                if !b.block_close().is_empty() {
                    content_lines.push(b.block_close().to_owned());
                }
            }
        }

        let rendered = fill(
            b.inspector_template(),
            &[
                ("c_name", flat),
                ("push_name", push_name),
                ("content", content_lines.join("\n")),
            ],
        );
        self.parts.inspectors.push(rendered);
    }
}

fn entry_fn(state: &StatePath, kind: EntryKind, forced_start: bool) -> String {
    let suffix = if forced_start {
        "start"
    } else {
        match kind {
            EntryKind::Start => "start",
            EntryKind::Entry => "entry",
        }
    };
    format!("state_{}_{suffix}", state.flat("_"))
}

/// Prefix every non-blank line of a snippet, keeping a trailing newline.
fn indent_lines(text: &str, prefix: &str) -> String {
    let mut out = String::new();
    for line in text.trim_end().lines() {
        if line.trim().is_empty() {
            out.push('\n');
        } else {
            out.push_str(prefix);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Substitute `{key}` tokens into a template in one pass.
///
/// A multi-line value whose placeholder starts a template line is
/// re-indented: the value's common leading whitespace is stripped and the
/// placeholder's indentation applied to every line but the first (the
/// template already provides it), preserving relative indentation inside
/// the value. Unknown `{...}` sequences are left untouched, so templates
/// may contain literal braces freely.
pub(crate) fn fill(template: &str, vars: &[(&str, String)]) -> String {
    let adjusted: Vec<(&str, String)> = vars
        .iter()
        .map(|(key, value)| {
            if value.contains('\n') {
                if let Some(indent) = placeholder_indent(template, key) {
                    return (*key, reindent(value, &indent));
                }
            }
            (*key, value.clone())
        })
        .collect();

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(end) = after.find('}') {
            let key = &after[..end];
            if let Some((_, value)) = adjusted.iter().find(|(k, _)| *k == key) {
                out.push_str(value);
                rest = &after[end + 1..];
                continue;
            }
        }
        out.push('{');
        rest = after;
    }
    out.push_str(rest);
    out
}

fn placeholder_indent(template: &str, key: &str) -> Option<String> {
    let token = format!("{{{key}}}");
    for line in template.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(&token) {
            return Some(line[..line.len() - trimmed.len()].to_owned());
        }
    }
    None
}

fn reindent(value: &str, target: &str) -> String {
    let lines: Vec<&str> = value.split('\n').collect();
    let base = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            out.push(String::new());
        } else if i == 0 {
            out.push(line.trim_start().to_owned());
        } else {
            out.push(format!("{target}{}", &line[base..]));
        }
    }
    out.join("\n")
}

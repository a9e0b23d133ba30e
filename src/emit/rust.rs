//! Rust target: a single self-contained `.rs` file with a `Context`
//! record, free per-state functions, and a `StateMachine` facade.

use crate::model::Chart;

use super::{fill, Backend, EmitParts, OutputFile, IN_STATE_CALL};

pub struct RustBackend;

const HEADER: &str = r#"#![allow(unused_variables)]
#![allow(dead_code)]
#![allow(non_snake_case)]
#![allow(unused_parens)]

// --- User Includes / Context Types ---
{includes}

pub struct Context {
    pub now: f64,
    pub state_timers: [f64; {state_count}],
    pub transition_fired: bool,
    pub terminated: bool,

    // Hierarchy Pointers
    {context_ptrs}

    // User Context Fields
    {user_context}
}

// Function Pointer Type
type StateFn = fn(&mut Context);

pub struct StateMachine {
    pub ctx: Context,
    pub root: Option<StateFn>,
}

impl StateMachine {
    pub fn new() -> Self {
        let ctx = Context {
            now: 0.0,
            state_timers: [0.0; {state_count}],
            transition_fired: false,
            terminated: false,

            // Hierarchy Pointers
            {ptr_inits}

            // User Context Init
            {user_context_init}
        };

        let mut sm = StateMachine { ctx, root: None };
        state_root_entry(&mut sm.ctx);
        sm.root = Some(state_root_do);
        sm
    }

    pub fn tick(&mut self) {
        self.ctx.transition_fired = false;
        if let Some(do_fn) = self.root {
            do_fn(&mut self.ctx);
            if self.ctx.terminated {
                self.root = None;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.root.is_some()
    }

    pub fn get_state_str(&self) -> String {
        let mut buf = String::new();
        if self.root.is_some() {
            inspect_root(&self.ctx, &mut buf);
        } else {
            buf.push_str("FINISHED");
        }
        buf
    }
}

// --- In-State Predicates ---
impl Context {
    {impls}
}

// --- State Logic ---
"#;

const PREAMBLE: &str = r#"let state_name = "{short_name}";
let state_full_name = "{display_name}";
let time = ctx.now - ctx.state_timers[{state_id}];
"#;

const LEAF: &str = r#"
fn state_{c_name}_start(ctx: &mut Context) {
    ctx.state_timers[{state_id}] = ctx.now;
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}
}

fn state_{c_name}_entry(ctx: &mut Context) {
    state_{c_name}_start(ctx);
}

fn state_{c_name}_exit(ctx: &mut Context) {
    {preamble}
    {hook_exit}
    {exit}
    {clear_parent}
}

fn state_{c_name}_do(ctx: &mut Context) {
    {preamble}
    {hook_do}
    {transitions}
    {do}
}
"#;

const COMPOSITE_OR: &str = r#"
fn state_{c_name}_start(ctx: &mut Context) {
    ctx.state_timers[{state_id}] = ctx.now;
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}
}

fn state_{c_name}_entry(ctx: &mut Context) {
    state_{c_name}_start(ctx);
    if ({history}) && ctx.{self_hist_ptr}.is_some() {
        let hist_fn = ctx.{self_hist_ptr}.unwrap();
        hist_fn(ctx);
    } else {
        state_{initial_target}_entry(ctx);
    }
}

fn state_{c_name}_exit(ctx: &mut Context) {
    {preamble}
    // Tear down the active child first
    if let Some(child_exit) = ctx.{self_exit_ptr} {
        child_exit(ctx);
    }

    {hook_exit}
    {exit}
    {clear_parent}
}

fn state_{c_name}_do(ctx: &mut Context) {
    {preamble}
    {hook_do}
    {transitions}
    {do}

    // Tick the active child
    if let Some(child_do) = ctx.{self_ptr} {
        child_do(ctx);
    }
}
"#;

const COMPOSITE_AND: &str = r#"
fn state_{c_name}_start(ctx: &mut Context) {
    ctx.state_timers[{state_id}] = ctx.now;
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}
}

fn state_{c_name}_entry(ctx: &mut Context) {
    state_{c_name}_start(ctx);
    {parallel_entries}
}

fn state_{c_name}_exit(ctx: &mut Context) {
    {preamble}
    // Tear down every region
    {parallel_exits}

    {hook_exit}
    {exit}
    {clear_parent}
}

fn state_{c_name}_do(ctx: &mut Context) {
    {preamble}
    {hook_do}
    {transitions}
    {do}

    // Stop if this composite was exited or any transition fired globally
    {safety_check}

    {parallel_ticks}
}
"#;

const INSPECTOR: &str = r#"
fn inspect_{c_name}(ctx: &Context, buf: &mut String) {
    {push_name}
    {content}
}
"#;

impl Backend for RustBackend {
    fn comment_leader(&self) -> &'static str {
        "//"
    }

    fn bool_lit(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    fn rewrite_guard(&self, guard: &str) -> String {
        IN_STATE_CALL.replace_all(guard, "ctx.in_state_$1()").into_owned()
    }

    fn if_open(&self, cond: &str) -> String {
        format!("if {cond} {{")
    }

    fn else_if_open(&self, cond: &str) -> String {
        format!("}} else if {cond} {{")
    }

    fn block_close(&self) -> &'static str {
        "}"
    }

    fn str_binding(&self, name: &str, value: &str) -> String {
        format!("let {name} = \"{value}\";")
    }

    fn set_flag(&self, flag: &str, value: bool) -> String {
        format!("ctx.{flag} = {};", self.bool_lit(value))
    }

    fn call_state(&self, func: &str) -> String {
        format!("{func}(ctx);")
    }

    fn call_ptr(&self, ptr: &str) -> String {
        format!("if let Some(f) = ctx.{ptr} {{ f(ctx); }}")
    }

    fn return_stmt(&self) -> &'static str {
        "return;"
    }

    fn set_ptr(&self, ptr: &str, func: &str) -> String {
        format!("ctx.{ptr} = Some({func});")
    }

    fn clear_ptr(&self, ptr: &str) -> String {
        format!("ctx.{ptr} = None;")
    }

    fn ptr_field(&self, ptr: &str) -> Option<String> {
        Some(format!("pub {ptr}: Option<StateFn>,"))
    }

    fn ptr_init(&self, ptr: &str) -> Option<String> {
        Some(format!("{ptr}: None,"))
    }

    fn in_state_impl(&self, flat: &str, run_ptr: &str) -> String {
        format!(
            "pub fn in_state_{flat}(&self) -> bool {{\n    \
             self.{run_ptr}.map(|f| f as usize) == Some(state_{flat}_do as usize)\n}}"
        )
    }

    fn safety_check(&self, flat: &str, has_parent: bool) -> String {
        if has_parent {
            format!("if !ctx.in_state_{flat}() || ctx.transition_fired {{ return; }}")
        } else {
            "if ctx.transition_fired { return; }".to_owned()
        }
    }

    fn ptr_eq(&self, ptr: &str, func: &str) -> String {
        format!("ctx.{ptr}.map(|f| f as usize) == Some({func} as usize)")
    }

    fn inspect_push(&self, text: &str) -> String {
        format!("buf.push_str(\"{text}\");")
    }

    fn inspect_call(&self, flat: &str) -> String {
        format!("inspect_{flat}(ctx, buf);")
    }

    fn preamble_template(&self) -> &'static str {
        PREAMBLE
    }

    fn leaf_template(&self) -> &'static str {
        LEAF
    }

    fn composite_or_template(&self) -> &'static str {
        COMPOSITE_OR
    }

    fn composite_and_template(&self) -> &'static str {
        COMPOSITE_AND
    }

    fn inspector_template(&self) -> &'static str {
        INSPECTOR
    }

    fn assemble(&self, chart: &Chart, parts: &EmitParts, _basename: &str) -> Vec<OutputFile> {
        let mut contents = fill(
            HEADER,
            &[
                ("includes", chart.includes.clone()),
                ("state_count", parts.state_count.to_string()),
                ("context_ptrs", parts.context_ptrs.join("\n")),
                ("user_context", chart.context.clone()),
                ("ptr_inits", parts.context_init.join("\n")),
                ("user_context_init", chart.context_init.clone()),
                ("impls", parts.impls.join("\n\n")),
            ],
        );
        contents.push_str(&parts.functions.join("\n"));
        contents.push_str("\n// --- Inspection ---\n");
        contents.push_str(&parts.inspectors.join("\n"));
        vec![OutputFile { ext: ".rs", contents }]
    }
}

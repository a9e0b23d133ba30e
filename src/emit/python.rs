//! Python target: a single `.py` module with a `Context` class, free
//! per-state functions, and a `StateMachine` facade.

use crate::model::Chart;

use super::{fill, Backend, EmitParts, OutputFile, IN_STATE_CALL};

pub struct PythonBackend;

const HEADER: &str = r#"# Generated state machine. Do not edit.

TOTAL_STATES = {state_count}

# --- User Includes ---
{includes}


class Context:
    def __init__(self):
        ctx = self
        self.now = 0.0
        self.state_timers = [0.0] * TOTAL_STATES
        self.transition_fired = False
        self.terminated = False

        # Hierarchy Pointers
        {ptr_inits}

        # User Context Init
        {user_context_init}

    {impls}


# --- State Logic ---
"#;

const FOOTER: &str = r#"

class StateMachine:
    def __init__(self):
        self.ctx = Context()
        self.root = None
        state_root_entry(self.ctx)
        self.root = state_root_do

    def tick(self):
        self.ctx.transition_fired = False
        if self.root is not None:
            self.root(self.ctx)
            if self.ctx.terminated:
                self.root = None

    def is_running(self):
        return self.root is not None

    def get_state_str(self):
        buf = []
        if self.root is not None:
            inspect_root(self.ctx, buf)
        else:
            buf.append("FINISHED")
        return "".join(buf)
"#;

const PREAMBLE: &str = r#"state_name = "{short_name}"
state_full_name = "{display_name}"
time = ctx.now - ctx.state_timers[{state_id}]
"#;

const LEAF: &str = r#"
def state_{c_name}_start(ctx):
    ctx.state_timers[{state_id}] = ctx.now
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}

def state_{c_name}_entry(ctx):
    state_{c_name}_start(ctx)

def state_{c_name}_exit(ctx):
    {preamble}
    {hook_exit}
    {exit}
    {clear_parent}

def state_{c_name}_do(ctx):
    {preamble}
    {hook_do}
    {transitions}
    {do}
"#;

const COMPOSITE_OR: &str = r#"
def state_{c_name}_start(ctx):
    ctx.state_timers[{state_id}] = ctx.now
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}

def state_{c_name}_entry(ctx):
    state_{c_name}_start(ctx)
    if ({history}) and ctx.{self_hist_ptr} is not None:
        ctx.{self_hist_ptr}(ctx)
    else:
        state_{initial_target}_entry(ctx)

def state_{c_name}_exit(ctx):
    {preamble}
    # Tear down the active child first
    if ctx.{self_exit_ptr} is not None:
        ctx.{self_exit_ptr}(ctx)

    {hook_exit}
    {exit}
    {clear_parent}

def state_{c_name}_do(ctx):
    {preamble}
    {hook_do}
    {transitions}
    {do}

    # Tick the active child
    if ctx.{self_ptr} is not None:
        ctx.{self_ptr}(ctx)
"#;

const COMPOSITE_AND: &str = r#"
def state_{c_name}_start(ctx):
    ctx.state_timers[{state_id}] = ctx.now
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}

def state_{c_name}_entry(ctx):
    state_{c_name}_start(ctx)
    {parallel_entries}

def state_{c_name}_exit(ctx):
    {preamble}
    # Tear down every region
    {parallel_exits}

    {hook_exit}
    {exit}
    {clear_parent}

def state_{c_name}_do(ctx):
    {preamble}
    {hook_do}
    {transitions}
    {do}

    # Stop if this composite was exited or any transition fired globally
    {safety_check}

    {parallel_ticks}
"#;

const INSPECTOR: &str = r#"
def inspect_{c_name}(ctx, buf):
    {push_name}
    {content}
"#;

impl Backend for PythonBackend {
    fn comment_leader(&self) -> &'static str {
        "#"
    }

    fn bool_lit(&self, value: bool) -> &'static str {
        if value {
            "True"
        } else {
            "False"
        }
    }

    fn rewrite_guard(&self, guard: &str) -> String {
        IN_STATE_CALL.replace_all(guard, "ctx.in_state_$1()").into_owned()
    }

    fn if_open(&self, cond: &str) -> String {
        format!("if {cond}:")
    }

    fn else_if_open(&self, cond: &str) -> String {
        format!("elif {cond}:")
    }

    fn block_close(&self) -> &'static str {
        ""
    }

    fn str_binding(&self, name: &str, value: &str) -> String {
        format!("{name} = \"{value}\"")
    }

    fn set_flag(&self, flag: &str, value: bool) -> String {
        format!("ctx.{flag} = {}", self.bool_lit(value))
    }

    fn call_state(&self, func: &str) -> String {
        format!("{func}(ctx)")
    }

    fn call_ptr(&self, ptr: &str) -> String {
        format!("if ctx.{ptr} is not None: ctx.{ptr}(ctx)")
    }

    fn return_stmt(&self) -> &'static str {
        "return"
    }

    fn set_ptr(&self, ptr: &str, func: &str) -> String {
        format!("ctx.{ptr} = {func}")
    }

    fn clear_ptr(&self, ptr: &str) -> String {
        format!("ctx.{ptr} = None")
    }

    fn ptr_field(&self, _ptr: &str) -> Option<String> {
        None
    }

    fn ptr_init(&self, ptr: &str) -> Option<String> {
        Some(format!("self.{ptr} = None"))
    }

    fn in_state_impl(&self, flat: &str, run_ptr: &str) -> String {
        format!(
            "def in_state_{flat}(self):\n    return self.{run_ptr} == state_{flat}_do"
        )
    }

    fn safety_check(&self, flat: &str, has_parent: bool) -> String {
        if has_parent {
            format!("if not ctx.in_state_{flat}() or ctx.transition_fired: return")
        } else {
            "if ctx.transition_fired: return".to_owned()
        }
    }

    fn ptr_eq(&self, ptr: &str, func: &str) -> String {
        format!("ctx.{ptr} == {func}")
    }

    fn inspect_push(&self, text: &str) -> String {
        format!("buf.append(\"{text}\")")
    }

    fn inspect_call(&self, flat: &str) -> String {
        format!("inspect_{flat}(ctx, buf)")
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
                ("state_count", parts.state_count.to_string()),
                ("includes", chart.includes.clone()),
                ("ptr_inits", parts.context_init.join("\n")),
                ("user_context_init", chart.context_init.clone()),
                ("impls", parts.impls.join("\n\n")),
            ],
        );
        contents.push_str(&parts.functions.join("\n"));
        contents.push_str("\n# --- Inspection ---\n");
        contents.push_str(&parts.inspectors.join("\n"));
        contents.push_str(FOOTER);
        vec![OutputFile { ext: ".py", contents }]
    }
}

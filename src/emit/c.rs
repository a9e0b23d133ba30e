//! C target: a header with the context record, forward declarations, and
//! in-state predicates, plus a source file with the state logic and the
//! four-call public API.

use crate::model::Chart;

use super::{fill, Backend, EmitParts, OutputFile, IN_STATE_CALL};

pub struct CBackend;

const HEADER: &str = r#"#ifndef {guard}
#define {guard}

#include <stdbool.h>
#include <stddef.h>
#include <string.h>

#define TOTAL_STATES {state_count}

typedef struct SM_Context SM_Context;
typedef void (*StateFunc)(SM_Context* ctx);

/* --- Forward Declarations --- */
{forwards}

struct SM_Context {
    double now;
    double state_timers[TOTAL_STATES];
    bool transition_fired;
    bool terminated;

    /* Hierarchy Pointers */
    {context_ptrs}

    /* User Context Fields */
    {user_context}
};

typedef struct {
    SM_Context ctx;
    StateFunc root;
} StateMachine;

/* --- In-State Predicates --- */
{impls}

void sm_init(StateMachine* sm);
void sm_tick(StateMachine* sm);
bool sm_is_running(const StateMachine* sm);
void sm_get_state_str(StateMachine* sm, char* buffer, size_t max_len);

#endif
"#;

const SOURCE_TOP: &str = r#"#include "{header_name}"

/* --- User Includes --- */
{includes}

/* --- Helpers --- */
static void safe_strcat(char* dest, const char* src, size_t* offset, size_t max) {
    size_t len = strlen(src);
    if (*offset + len >= max) return;
    strcpy(dest + *offset, src);
    *offset += len;
}

/* --- State Logic --- */
"#;

const SOURCE_BOTTOM: &str = r#"
void sm_init(StateMachine* sm) {
    memset(&sm->ctx, 0, sizeof(sm->ctx));
    {user_context_init}
    state_root_entry(&sm->ctx);
    sm->root = state_root_do;
}

void sm_tick(StateMachine* sm) {
    sm->ctx.transition_fired = false;
    if (sm->root != NULL) {
        sm->root(&sm->ctx);
        if (sm->ctx.terminated) {
            sm->root = NULL;
        }
    }
}

bool sm_is_running(const StateMachine* sm) {
    return sm->root != NULL;
}

void sm_get_state_str(StateMachine* sm, char* buffer, size_t max_len) {
    size_t offset = 0;
    buffer[0] = '\0';
    if (sm->root != NULL) {
        inspect_root(&sm->ctx, buffer, &offset, max_len);
    } else {
        safe_strcat(buffer, "FINISHED", &offset, max_len);
    }
}
"#;

const PREAMBLE: &str = r#"const char* state_name = "{short_name}";
const char* state_full_name = "{display_name}";
double time = ctx->now - ctx->state_timers[{state_id}];
(void)state_name; (void)state_full_name; (void)time;
"#;

const LEAF: &str = r#"
void state_{c_name}_start(SM_Context* ctx) {
    ctx->state_timers[{state_id}] = ctx->now;
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}
}

void state_{c_name}_entry(SM_Context* ctx) {
    state_{c_name}_start(ctx);
}

void state_{c_name}_exit(SM_Context* ctx) {
    {preamble}
    {hook_exit}
    {exit}
    {clear_parent}
}

void state_{c_name}_do(SM_Context* ctx) {
    {preamble}
    {hook_do}
    {transitions}
    {do}
}
"#;

const COMPOSITE_OR: &str = r#"
void state_{c_name}_start(SM_Context* ctx) {
    ctx->state_timers[{state_id}] = ctx->now;
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}
}

void state_{c_name}_entry(SM_Context* ctx) {
    state_{c_name}_start(ctx);
    if (({history}) && ctx->{self_hist_ptr} != NULL) {
        ctx->{self_hist_ptr}(ctx);
    } else {
        state_{initial_target}_entry(ctx);
    }
}

void state_{c_name}_exit(SM_Context* ctx) {
    {preamble}
    /* Tear down the active child first */
    if (ctx->{self_exit_ptr} != NULL) {
        ctx->{self_exit_ptr}(ctx);
    }

    {hook_exit}
    {exit}
    {clear_parent}
}

void state_{c_name}_do(SM_Context* ctx) {
    {preamble}
    {hook_do}
    {transitions}
    {do}

    /* Tick the active child */
    if (ctx->{self_ptr} != NULL) {
        ctx->{self_ptr}(ctx);
    }
}
"#;

const COMPOSITE_AND: &str = r#"
void state_{c_name}_start(SM_Context* ctx) {
    ctx->state_timers[{state_id}] = ctx->now;
    {preamble}
    {hook_entry}
    {entry}
    {set_parent}
}

void state_{c_name}_entry(SM_Context* ctx) {
    state_{c_name}_start(ctx);
    {parallel_entries}
}

void state_{c_name}_exit(SM_Context* ctx) {
    {preamble}
    /* Tear down every region */
    {parallel_exits}

    {hook_exit}
    {exit}
    {clear_parent}
}

void state_{c_name}_do(SM_Context* ctx) {
    {preamble}
    {hook_do}
    {transitions}
    {do}

    /* Stop if this composite was exited or any transition fired globally */
    {safety_check}

    {parallel_ticks}
}
"#;

const INSPECTOR: &str = r#"
static void inspect_{c_name}(SM_Context* ctx, char* buf, size_t* off, size_t max) {
    (void)ctx; (void)buf; (void)off; (void)max;
    {push_name}
    {content}
}
"#;

impl Backend for CBackend {
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
        IN_STATE_CALL.replace_all(guard, "in_state_$1(ctx)").into_owned()
    }

    fn if_open(&self, cond: &str) -> String {
        format!("if ({cond}) {{")
    }

    fn else_if_open(&self, cond: &str) -> String {
        format!("}} else if ({cond}) {{")
    }

    fn block_close(&self) -> &'static str {
        "}"
    }

    fn str_binding(&self, name: &str, value: &str) -> String {
        format!("const char* {name} = \"{value}\"; (void){name};")
    }

    fn set_flag(&self, flag: &str, value: bool) -> String {
        format!("ctx->{flag} = {};", self.bool_lit(value))
    }

    fn call_state(&self, func: &str) -> String {
        format!("{func}(ctx);")
    }

    fn call_ptr(&self, ptr: &str) -> String {
        format!("if (ctx->{ptr} != NULL) {{ ctx->{ptr}(ctx); }}")
    }

    fn return_stmt(&self) -> &'static str {
        "return;"
    }

    fn set_ptr(&self, ptr: &str, func: &str) -> String {
        format!("ctx->{ptr} = {func};")
    }

    fn clear_ptr(&self, ptr: &str) -> String {
        format!("ctx->{ptr} = NULL;")
    }

    fn ptr_field(&self, ptr: &str) -> Option<String> {
        Some(format!("StateFunc {ptr};"))
    }

    fn ptr_init(&self, _ptr: &str) -> Option<String> {
        // sm_init zeroes the whole context
        None
    }

    fn in_state_impl(&self, flat: &str, run_ptr: &str) -> String {
        format!(
            "static inline bool in_state_{flat}(const SM_Context* ctx) {{ \
             return ctx->{run_ptr} == state_{flat}_do; }}"
        )
    }

    fn safety_check(&self, flat: &str, has_parent: bool) -> String {
        if has_parent {
            format!("if (!in_state_{flat}(ctx) || ctx->transition_fired) {{ return; }}")
        } else {
            "if (ctx->transition_fired) { return; }".to_owned()
        }
    }

    fn ptr_eq(&self, ptr: &str, func: &str) -> String {
        format!("ctx->{ptr} == {func}")
    }

    fn inspect_push(&self, text: &str) -> String {
        format!("safe_strcat(buf, \"{text}\", off, max);")
    }

    fn inspect_call(&self, flat: &str) -> String {
        format!("inspect_{flat}(ctx, buf, off, max);")
    }

    fn state_forwards(&self, flat: &str) -> Vec<String> {
        ["start", "entry", "exit", "do"]
            .iter()
            .map(|suffix| format!("void state_{flat}_{suffix}(SM_Context* ctx);"))
            .collect()
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

    fn assemble(&self, chart: &Chart, parts: &EmitParts, basename: &str) -> Vec<OutputFile> {
        let guard: String = basename
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        let header = fill(
            HEADER,
            &[
                ("guard", format!("{guard}_H")),
                ("state_count", parts.state_count.to_string()),
                ("forwards", parts.forwards.join("\n")),
                ("context_ptrs", parts.context_ptrs.join("\n")),
                ("user_context", chart.context.clone()),
                ("impls", parts.impls.join("\n")),
            ],
        );

        let mut source = fill(
            SOURCE_TOP,
            &[
                ("header_name", format!("{basename}.h")),
                ("includes", chart.includes.clone()),
            ],
        );
        source.push_str(&parts.functions.join("\n"));
        source.push_str("\n/* --- Inspection --- */\n");
        source.push_str(&parts.inspectors.join("\n"));
        source.push_str(&fill(
            SOURCE_BOTTOM,
            &[("user_context_init", chart.context_init.clone())],
        ));

        vec![
            OutputFile { ext: ".h", contents: header },
            OutputFile { ext: ".c", contents: source },
        ]
    }
}

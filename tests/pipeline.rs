//! End-to-end pipeline tests: compile inline YAML fixtures and assert on
//! the emitted source: call sequencing, guard rewriting, inspector
//! shape, and cross-backend equivalence of the state-function call
//! stream.

use hsmc::emit::{Lang, OutputFile};
use pretty_assertions::assert_eq;

fn compile(yaml: &str, lang: Lang) -> Vec<OutputFile> {
    let chart = hsmc::build_chart(yaml).expect("fixture should validate");
    hsmc::generate(&chart, lang, "statemachine").expect("emission should succeed")
}

fn rust_src(yaml: &str) -> String {
    compile(yaml, Lang::Rust).remove(0).contents
}

fn python_src(yaml: &str) -> String {
    compile(yaml, Lang::Python).remove(0).contents
}

fn c_src(yaml: &str) -> String {
    compile(yaml, Lang::C)
        .into_iter()
        .find(|f| f.ext == ".c")
        .expect("C backend emits a source file")
        .contents
}

/// Body of one emitted Rust function, header excluded.
fn rust_fn_body(src: &str, name: &str) -> String {
    let header = format!("fn {name}(ctx: &mut Context) {{");
    let start = src.find(&header).unwrap_or_else(|| panic!("function {name} not emitted"));
    let rest = &src[start + header.len()..];
    let end = rest.find("\nfn ").unwrap_or(rest.len());
    rest[..end].to_owned()
}

/// Body of one emitted Rust inspector function, header excluded.
fn rust_inspector_body(src: &str, name: &str) -> String {
    let header = format!("fn {name}(ctx: &Context, buf: &mut String) {{");
    let start = src.find(&header).unwrap_or_else(|| panic!("inspector {name} not emitted"));
    let rest = &src[start + header.len()..];
    let end = rest.find("\nfn ").unwrap_or(rest.len());
    rest[..end].to_owned()
}

/// Interpret an emitted inspector the way the generated runtime would
/// with every composite sitting in its first-declared child: collect the
/// pushed literals, descend into inspector calls, and take only the
/// first branch of each active-child selection chain.
fn render_initial_path(src: &str, name: &str, out: &mut String) {
    let mut branch = 0usize;
    for line in rust_inspector_body(src, name).lines() {
        let line = line.trim();
        if line.starts_with("if ctx.") {
            branch = 0;
        } else if line.starts_with("} else if") {
            branch += 1;
        } else if line == "}" {
            branch = 0;
        } else if let Some(rest) = line.strip_prefix("buf.push_str(\"") {
            let end = rest.find('"').expect("closing quote in push");
            out.push_str(&rest[..end]);
        } else if line.starts_with("inspect_") && branch == 0 {
            let callee = &line[..line.find('(').expect("inspector call parens")];
            render_initial_path(src, callee, out);
        }
    }
}

fn pos(haystack: &str, needle: &str) -> usize {
    haystack.find(needle).unwrap_or_else(|| panic!("expected {needle:?} in:\n{haystack}"))
}

/// Plain state-function calls, in emission order, normalized across
/// backends (definitions, pointer calls, and facade calls filtered out).
fn call_sequence(src: &str) -> Vec<String> {
    src.lines()
        .map(str::trim)
        .filter(|line| line.starts_with("state_") && line.contains("(ctx"))
        .map(|line| line.trim_end_matches(';').to_owned())
        .collect()
}

const SELF_LOOP: &str = r#"
initial: A
states:
  A:
    initial: s1
    states:
      s1:
        transitions:
          - { to: "./" }
      s2: {}
"#;

#[test]
fn self_loop_exits_and_reenters_the_source() {
    let src = rust_src(SELF_LOOP);
    let body = rust_fn_body(&src, "state_root_A_s1_do");

    let exit = pos(&body, "state_root_A_s1_exit(ctx);");
    let entry = pos(&body, "state_root_A_s1_entry(ctx);");
    assert!(exit < entry, "self-loop must exit before re-entering:\n{body}");
    assert!(!body.contains("state_root_A_exit"), "parent A must not be exited:\n{body}");
}

#[test]
fn termination_unwinds_to_root_and_halts() {
    let src = rust_src(
        r#"
initial: boot
states:
  boot:
    transitions:
      - { to: null }
"#,
    );
    let body = rust_fn_body(&src, "state_root_boot_do");

    let leaf_exit = pos(&body, "state_root_boot_exit(ctx);");
    let root_exit = pos(&body, "state_root_exit(ctx);");
    let halt = pos(&body, "ctx.terminated = true;");
    assert!(leaf_exit < root_exit, "leaf exits before root:\n{body}");
    assert!(root_exit < halt, "root exits before the halt flag:\n{body}");
    assert!(body.contains("return;"), "termination must return:\n{body}");
}

#[test]
fn decision_rules_nest_in_declaration_order() {
    let src = rust_src(
        r#"
initial: S
decisions:
  pick:
    - { to: A, guard: false }
    - { to: B, guard: true }
states:
  S:
    transitions:
      - { to: "@pick" }
  A: {}
  B: {}
"#,
    );
    let body = rust_fn_body(&src, "state_root_S_do");

    let rule1 = pos(&body, "if false {");
    let to_a = pos(&body, "state_root_A_entry(ctx);");
    let to_b = pos(&body, "state_root_B_entry(ctx);");
    assert!(rule1 < to_a, "rule guard wraps its entry:\n{body}");
    assert!(to_a < to_b, "rules evaluate in declaration order:\n{body}");

    // The decision reference itself carries no src/dst bindings; the
    // fired rule does.
    assert!(body.contains("let t_dst = \"/B\";"), "{body}");
    assert!(!body.contains("let t_dst = \"Decision"), "{body}");
}

#[test]
fn timer_guard_passes_through_verbatim() {
    let fixture = r#"
initial: waiting
states:
  waiting:
    transitions:
      - { to: done, guard: time > 0.1 }
  done: {}
"#;
    assert!(rust_src(fixture).contains("if time > 0.1 {"));
    assert!(python_src(fixture).contains("if time > 0.1:"));
    assert!(c_src(fixture).contains("if (time > 0.1) {"));
}

#[test]
fn in_state_guard_rewrites_per_backend() {
    let fixture = r#"
initial: a
states:
  a:
    transitions:
      - { to: b, guard: IN_STATE(root_b) }
  b: {}
"#;
    assert!(rust_src(fixture).contains("if ctx.in_state_root_b() {"));
    assert!(python_src(fixture).contains("if ctx.in_state_root_b():"));
    assert!(c_src(fixture).contains("if (in_state_root_b(ctx)) {"));
}

const ORTHOGONAL: &str = r#"
initial: O
states:
  O:
    orthogonal: true
    states:
      L:
        initial: l1
        states:
          l1:
            transitions:
              - { to: "/O/L/l2", guard: advance }
              - { to: "/O/R/r2", guard: swap_deep }
              - { to: "/O/R", guard: swap_reset }
          l2: {}
      R:
        initial: r1
        states:
          r1: {}
          r2: {}
"#;

#[test]
fn same_limb_transition_touches_only_the_leaf() {
    let src = rust_src(ORTHOGONAL);
    let body = rust_fn_body(&src, "state_root_O_L_l1_do");
    let guard = pos(&body, "if advance {");
    let block = &body[guard..pos(&body, "if swap_deep {")];

    let exit = pos(block, "state_root_O_L_l1_exit(ctx);");
    let entry = pos(block, "state_root_O_L_l2_entry(ctx);");
    assert!(exit < entry, "exit l1 then enter l2:\n{block}");
    assert!(!block.contains("state_root_O_L_exit"), "limb L must stay active:\n{block}");
    assert!(!block.contains("root_O_R"), "limb R must be untouched:\n{block}");
}

#[test]
fn cross_limb_hot_swap_preserves_the_target_limb() {
    let src = rust_src(ORTHOGONAL);
    let body = rust_fn_body(&src, "state_root_O_L_l1_do");
    let block = &body[pos(&body, "if swap_deep {")..pos(&body, "if swap_reset {")];

    assert!(
        block.contains("if let Some(f) = ctx.ptr_root_O_R_exit { f(ctx); }"),
        "hot-swap tears down R's active child through the dynamic pointer:\n{block}"
    );
    assert!(block.contains("state_root_O_R_r2_entry(ctx);"), "{block}");
    assert!(block.contains("return;"), "{block}");
    assert!(
        !block.contains("ptr_root_O_R_region_exit"),
        "limb R itself must not be reset:\n{block}"
    );
    assert!(
        !block.contains("state_root_O_L_l1_exit"),
        "the source limb keeps running:\n{block}"
    );
}

#[test]
fn cross_limb_to_limb_root_resets_the_whole_region() {
    let src = rust_src(ORTHOGONAL);
    let body = rust_fn_body(&src, "state_root_O_L_l1_do");
    let block = &body[pos(&body, "if swap_reset {")..];

    assert!(
        block.contains("if let Some(f) = ctx.ptr_root_O_R_region_exit { f(ctx); }"),
        "{block}"
    );
    assert!(block.contains("state_root_O_R_entry(ctx);"), "{block}");
}

#[test]
fn orthogonal_do_interleaves_safety_checks_between_region_ticks() {
    let src = rust_src(ORTHOGONAL);
    let body = rust_fn_body(&src, "state_root_O_do");
    let safety = "if !ctx.in_state_root_O() || ctx.transition_fired { return; }";

    let count = body.matches(safety).count();
    assert_eq!(count, 3, "one standalone check plus one per region:\n{body}");

    let tick_l = pos(&body, "state_root_O_L_do(ctx);");
    let tick_r = pos(&body, "state_root_O_R_do(ctx);");
    let between = &body[tick_l..tick_r];
    assert!(between.contains(safety), "safety check must sit between region ticks:\n{body}");
}

#[test]
fn orthogonal_regions_get_run_and_exit_pointers() {
    let src = rust_src(ORTHOGONAL);
    for ptr in [
        "pub ptr_root_O_L_region: Option<StateFn>,",
        "pub ptr_root_O_L_region_exit: Option<StateFn>,",
        "pub ptr_root_O_R_region: Option<StateFn>,",
        "pub ptr_root_O_R_region_exit: Option<StateFn>,",
    ] {
        assert!(src.contains(ptr), "missing context pointer {ptr}");
    }
}

const FORK: &str = r#"
initial: src
states:
  src:
    transitions:
      - { to: "/P/[a/a2,b]", guard: explicit }
      - { to: "/P/a/a2", guard: implicit }
  P:
    orthogonal: true
    states:
      a:
        initial: a1
        states:
          a1: {}
          a2: {}
      b:
        initial: b1
        states:
          b1: {}
      c:
        initial: c1
        states:
          c1: {}
"#;

#[test]
fn fork_enters_named_branches_deeply_and_defaults_the_rest() {
    let src = rust_src(FORK);
    let body = rust_fn_body(&src, "state_root_src_do");
    let block = &body[pos(&body, "if explicit {")..pos(&body, "if implicit {")];

    let base = pos(block, "state_root_P_start(ctx);");
    let branch_a = pos(block, "state_root_P_a_start(ctx);");
    let deep_a = pos(block, "state_root_P_a_a2_entry(ctx);");
    let branch_b = pos(block, "state_root_P_b_entry(ctx);");
    let default_c = pos(block, "state_root_P_c_entry(ctx);");

    assert!(base < branch_a && branch_a < deep_a, "deep branch descends a then a2:\n{block}");
    assert!(deep_a < branch_b && branch_b < default_c, "regions enter in declaration order:\n{block}");
    assert!(
        !block.contains("state_root_P_entry(ctx);"),
        "the fork base must not descend to its default initial:\n{block}"
    );
}

#[test]
fn bare_path_into_a_region_becomes_an_implicit_fork() {
    let src = rust_src(FORK);
    let body = rust_fn_body(&src, "state_root_src_do");
    let block = &body[pos(&body, "if implicit {")..];

    assert!(block.contains("state_root_P_start(ctx);"), "{block}");
    assert!(block.contains("state_root_P_a_a2_entry(ctx);"), "{block}");
    assert!(block.contains("state_root_P_b_entry(ctx);"), "untargeted regions enter defaults:\n{block}");
    assert!(block.contains("state_root_P_c_entry(ctx);"), "{block}");
}

#[test]
fn same_limb_bare_path_is_not_rewritten_to_a_fork() {
    let src = rust_src(
        r#"
initial: P
states:
  P:
    orthogonal: true
    states:
      a:
        initial: a1
        states:
          a1:
            transitions:
              - { to: "/P/a/a2" }
          a2: {}
      b:
        initial: b1
        states:
          b1: {}
"#,
    );
    let body = rust_fn_body(&src, "state_root_P_a_a1_do");
    assert!(body.contains("state_root_P_a_a2_entry(ctx);"), "{body}");
    assert!(!body.contains("state_root_P_start"), "no fork rewrite within the same limb:\n{body}");
}

#[test]
fn composite_self_target_tears_down_active_child_dynamically() {
    let src = rust_src(
        r#"
initial: A
states:
  A:
    initial: x
    states:
      x: {}
      y: {}
    transitions:
      - { to: "./y", guard: go }
"#,
    );
    let body = rust_fn_body(&src, "state_root_A_do");

    assert!(
        body.contains("if let Some(f) = ctx.ptr_root_A_exit { f(ctx); }"),
        "container transition must tear down the active child first:\n{body}"
    );
    assert!(body.contains("state_root_A_y_entry(ctx);"), "{body}");
    assert!(
        !body.contains("state_root_A_exit(ctx);"),
        "the container itself stays active:\n{body}"
    );
}

#[test]
fn history_pointer_is_wired_and_dispatched() {
    let src = rust_src(
        r#"
initial: H
states:
  H:
    history: true
    initial: x
    states:
      x: {}
      y: {}
  other: {}
"#,
    );
    assert!(src.contains("pub hist_root_H: Option<StateFn>,"), "history pointer declared");
    assert!(
        src.contains("ctx.hist_root_H = Some(state_root_H_x_entry);"),
        "children record themselves in the parent's history pointer"
    );
    let entry = rust_fn_body(&src, "state_root_H_entry");
    assert!(entry.contains("if (true) && ctx.hist_root_H.is_some()"), "{entry}");
}

#[test]
fn transition_hook_sees_source_and_destination() {
    let src = rust_src(
        r#"
initial: a
hooks:
  transition: "log_transition(t_src, t_dst);"
states:
  a:
    transitions:
      - { to: b }
  b: {}
"#,
    );
    let body = rust_fn_body(&src, "state_root_a_do");
    let src_bind = pos(&body, "let t_src = \"/a\";");
    let dst_bind = pos(&body, "let t_dst = \"/b\";");
    let hook = pos(&body, "log_transition(t_src, t_dst);");
    assert!(src_bind < dst_bind && dst_bind < hook, "bindings precede the hook:\n{body}");
    assert!(
        pos(&body, "ctx.transition_fired = true;") > hook,
        "the hook observes the event before the fired flag is set:\n{body}"
    );
}

#[test]
fn user_snippets_and_context_are_interpolated() {
    let src = rust_src(
        r#"
initial: a
includes: "use std::collections::VecDeque;"
context: "pub counter: i32,"
context_init: "counter: 0,"
states:
  a:
    entry: "ctx.counter += 1;"
"#,
    );
    assert!(src.contains("use std::collections::VecDeque;"));
    assert!(src.contains("pub counter: i32,"));
    assert!(src.contains("counter: 0,"));
    let start = rust_fn_body(&src, "state_root_a_start");
    assert!(start.contains("ctx.counter += 1;"), "{start}");
}

#[test]
fn state_ids_follow_traversal_order() {
    let src = rust_src(SELF_LOOP);
    // root=0, A=1, s1=2, s2=3
    assert!(src.contains("pub state_timers: [f64; 4],"), "four states total");
    assert!(rust_fn_body(&src, "state_root_start").contains("ctx.state_timers[0] = ctx.now;"));
    assert!(rust_fn_body(&src, "state_root_A_start").contains("ctx.state_timers[1] = ctx.now;"));
    assert!(rust_fn_body(&src, "state_root_A_s1_start").contains("ctx.state_timers[2] = ctx.now;"));

    let py = python_src(SELF_LOOP);
    assert!(py.contains("TOTAL_STATES = 4"), "python agrees on the state count");
}

#[test]
fn inspector_renders_slash_paths_brackets_and_finished() {
    let src = rust_src(ORTHOGONAL);

    // The assembled rendering for the initial configuration is the
    // spec-literal orthogonal path string.
    let mut rendered = String::new();
    render_initial_path(&src, "inspect_root", &mut rendered);
    assert_eq!(rendered, "/O/[/L/l1,/R/r1]");

    // Bracket and comma pushes sit in order around the region descents.
    let body = rust_inspector_body(&src, "inspect_root_O");
    let name = pos(&body, "buf.push_str(\"/O\");");
    let open = pos(&body, "buf.push_str(\"/[\");");
    let left = pos(&body, "inspect_root_O_L(ctx, buf);");
    let comma = pos(&body, "buf.push_str(\",\");");
    let right = pos(&body, "inspect_root_O_R(ctx, buf);");
    let close = pos(&body, "buf.push_str(\"]\");");
    assert!(name < open, "segment before opening bracket:\n{body}");
    assert!(open < left, "opening bracket before first region:\n{body}");
    assert!(left < comma && comma < right, "regions separated by a comma:\n{body}");
    assert!(right < close, "closing bracket last:\n{body}");

    // A region pushes its own segment before selecting the active child
    // by run pointer, children in declaration order.
    let region = rust_inspector_body(&src, "inspect_root_O_L");
    let segment = pos(&region, "buf.push_str(\"/L\");");
    let select_l1 = pos(
        &region,
        "if ctx.ptr_root_O_L.map(|f| f as usize) == Some(state_root_O_L_l1_do as usize) {",
    );
    let select_l2 = pos(
        &region,
        "} else if ctx.ptr_root_O_L.map(|f| f as usize) == Some(state_root_O_L_l2_do as usize) {",
    );
    assert!(segment < select_l1, "segment before child selection:\n{region}");
    assert!(select_l1 < select_l2, "children selected in declaration order:\n{region}");

    assert!(src.contains("buf.push_str(\"FINISHED\");"));
}

#[test]
fn generated_facade_exposes_the_full_abi() {
    let src = rust_src(SELF_LOOP);
    for item in [
        "pub fn new() -> Self",
        "pub fn tick(&mut self)",
        "pub fn is_running(&self) -> bool",
        "pub fn get_state_str(&self) -> String",
        "pub fn in_state_root_A(&self) -> bool",
    ] {
        assert!(src.contains(item), "missing ABI item {item}");
    }

    let header = compile(SELF_LOOP, Lang::C)
        .into_iter()
        .find(|f| f.ext == ".h")
        .expect("C backend emits a header")
        .contents;
    for item in [
        "void sm_init(StateMachine* sm);",
        "void sm_tick(StateMachine* sm);",
        "bool sm_is_running(const StateMachine* sm);",
        "void sm_get_state_str(StateMachine* sm, char* buffer, size_t max_len);",
    ] {
        assert!(header.contains(item), "missing C ABI item {item}");
    }

    let py = python_src(SELF_LOOP);
    assert!(py.contains("class StateMachine:"), "missing Python facade class");
    for item in [
        "def __init__(self):",
        "def tick(self):",
        "def is_running(self):",
        "def get_state_str(self):",
    ] {
        assert!(py.contains(item), "missing Python ABI item {item}");
    }
}

const MIXED: &str = r#"
initial: A
decisions:
  route:
    - { to: "/done", guard: finishing }
    - { to: "./", guard: true }
states:
  A:
    initial: s1
    states:
      s1:
        transitions:
          - { to: s2, guard: time > 0.5 }
      s2:
        transitions:
          - { to: "@route" }
  done:
    transitions:
      - { to: null }
"#;

#[test]
fn backends_emit_identical_call_sequences() {
    let rust_calls = call_sequence(&rust_src(MIXED));
    let python_calls = call_sequence(&python_src(MIXED));
    let c_calls = call_sequence(&c_src(MIXED));

    assert!(!rust_calls.is_empty(), "fixture should produce state calls");
    assert_eq!(rust_calls, python_calls);
    assert_eq!(rust_calls, c_calls);
}

#[test]
fn backends_emit_identical_call_sequences_for_orthogonal_models() {
    let rust_calls = call_sequence(&rust_src(ORTHOGONAL));
    let python_calls = call_sequence(&python_src(ORTHOGONAL));
    let c_calls = call_sequence(&c_src(ORTHOGONAL));

    assert_eq!(rust_calls, python_calls);
    assert_eq!(rust_calls, c_calls);
}

#[test]
fn unresolved_target_fails_validation_with_location() {
    let err = hsmc::build_chart(
        r#"
initial: boot
states:
  boot:
    transitions:
      - { to: "/nonexistent" }
"#,
    )
    .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("State '/boot', transition #1"), "{text}");
    assert!(text.contains("/nonexistent"), "{text}");
}

#[test]
fn dot_output_accompanies_every_model() {
    let chart = hsmc::build_chart(ORTHOGONAL).unwrap();
    let dot = hsmc::dot::render(&chart);
    assert!(dot.starts_with("digraph StateMachine {"));
    assert!(dot.ends_with('}'));
}

//! End-to-end scenario tests (SPEC_FULL.md §8), one per concrete example plus
//! a handful of the quantified invariants. Mirrors the teacher's integration
//! tests against `Bash::exec` (`bash.rs`), generalized to assert on the value
//! channel (`V:`) as well as the byte sink (`B:`).

use std::path::PathBuf;

use rivulet::shell::{Engine, EngineOptions};
use rivulet::value::Value;

fn engine() -> Engine {
    Engine::new(EngineOptions::default())
}

fn module_engine() -> Engine {
    let cwd = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/modules");
    Engine::new(EngineOptions { cwd: Some(cwd) })
}

fn values_text(values: &[Value]) -> Vec<String> {
    values.iter().map(Value::display_text).collect()
}

#[tokio::test]
async fn scenario_1_put_sequence() {
    let result = engine().exec("put x; put y; put z").await;
    assert_eq!(values_text(&result.values), vec!["x", "y", "z"]);
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn scenario_2_pipeline_through_external_commands() {
    let script = r#"echo "Albert\nAllan\nAlbraham\nBerlin" | sed s/l/1/g | grep e"#;
    let result = engine().exec(script).await;
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "A1bert\nBer1in\n");
}

#[tokio::test]
async fn scenario_3_each_over_value_channel() {
    let result = engine().exec("put 233 42 19 | each [x]{+ $x 10}").await;
    assert_eq!(values_text(&result.values), vec!["243", "52", "29"]);
}

#[tokio::test]
async fn scenario_4_if_elif_else() {
    let result = engine()
        .exec("if $false { put 1 } elif true { put 2 } else { put 3 }")
        .await;
    assert_eq!(values_text(&result.values), vec!["2"]);
}

#[tokio::test]
async fn scenario_5_while_loop() {
    let result = engine()
        .exec("x=0; while (< $x 4) { put $x; x=(+ $x 1) }")
        .await;
    assert_eq!(values_text(&result.values), vec!["0", "1", "2", "3"]);
}

#[tokio::test]
async fn scenario_6_closure_upvalue_sharing() {
    let script = "fn f []{ x=0; put []{x=(+ $x 1)} []{put $x} }; {i,p}=(f); $p; $i; $p";
    let result = engine().exec(script).await;
    assert_eq!(values_text(&result.values), vec!["0", "1"], "stderr: {}", result.stderr);
}

#[tokio::test]
async fn scenario_7_module_cache_hit() {
    let script = "use a/b/c/d; use a/b/c:d; eq $d:name $c:d:name";
    let result = module_engine().exec(script).await;
    assert_eq!(values_text(&result.values), vec!["true"], "stderr: {}", result.stderr);
}

#[tokio::test]
async fn scenario_8_exception_capture_to_bool() {
    let result = engine().exec("bool ?(nop); bool ?(e:false)").await;
    assert_eq!(values_text(&result.values), vec!["true", "false"], "stderr: {}", result.stderr);
}

#[tokio::test]
async fn scenario_9_wildcard_no_match_fails() {
    let result = engine().exec("put a/b/nonexistent*").await;
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("wildcard"), "stderr: {}", result.stderr);
}

#[tokio::test]
async fn invariant_json_round_trip() {
    let result = engine()
        .exec(r#"put [&a=1 &b=[2 3]] | each [v]{to-json $v} | from-json"#)
        .await;
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    assert_eq!(result.values.len(), 1);
    let m = result.values[0].as_map().expect("round-tripped value is a map");
    assert_eq!(m.get(&Value::str("a")).unwrap().display_text(), "1");
}

#[tokio::test]
async fn invariant_lines_round_trip() {
    let result = engine()
        .exec(r#"put a b c | to-lines | from-lines"#)
        .await;
    assert_eq!(values_text(&result.values), vec!["a", "b", "c"], "stderr: {}", result.stderr);
}

#[tokio::test]
async fn invariant_return_stops_further_output() {
    let script = "f=[]{put 1; return; put 2}; $f";
    let result = engine().exec(script).await;
    assert_eq!(values_text(&result.values), vec!["1"], "stderr: {}", result.stderr);
}

#[tokio::test]
async fn invariant_local_assignment_not_visible_to_caller() {
    let script = "x=outer; f=[]{local:x=inner}; $f; put $x";
    let result = engine().exec(script).await;
    assert_eq!(values_text(&result.values), vec!["outer"], "stderr: {}", result.stderr);
}

#[tokio::test]
async fn invariant_pipeline_reports_first_failing_stage() {
    let result = engine().exec("put x | fail oops | put y").await;
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("oops"), "stderr: {}", result.stderr);
}

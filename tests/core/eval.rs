use oaps::core::error::OapsError;
use oaps::core::eval::{
    ExpressionEvaluator, FunctionRegistry, Value, default_registry, evaluate_condition,
};
use serde_json::json;
use tempfile::tempdir;

fn hook_context() -> serde_json::Value {
    json!({
        "hook_type": "pre_tool_use",
        "session_id": "test-session",
        "cwd": "/home/user/project",
        "permission_mode": "default",
        "tool_name": "Bash",
        "tool_input": {"command": "cargo test"},
    })
}

#[test]
fn empty_expression_always_matches() {
    let registry = FunctionRegistry::new();
    assert!(evaluate_condition("", &hook_context(), &registry).expect("eval"));
    assert!(evaluate_condition("   \t\n  ", &hook_context(), &registry).expect("eval"));
}

#[test]
fn rule_style_conditions() {
    let registry = FunctionRegistry::new();
    let ctx = hook_context();

    assert!(evaluate_condition(r#"tool_name == "Bash""#, &ctx, &registry).expect("eval"));
    assert!(
        evaluate_condition(
            r#"hook_type == "pre_tool_use" and tool_name in ["Bash", "Write"]"#,
            &ctx,
            &registry
        )
        .expect("eval")
    );
    assert!(
        evaluate_condition(r#"tool_input.command =~ "^cargo""#, &ctx, &registry).expect("eval")
    );
    assert!(
        !evaluate_condition(r#"tool_input.command =~ "^npm""#, &ctx, &registry).expect("eval")
    );
}

#[test]
fn compiled_expression_reused_across_contexts() {
    let registry = FunctionRegistry::new();
    let evaluator =
        ExpressionEvaluator::compile(r#"permission_mode == "default""#).expect("compile");

    let contexts = [
        hook_context(),
        json!({"permission_mode": "default", "hook_type": "stop"}),
        json!({"permission_mode": "plan"}),
    ];
    let results: Vec<bool> = contexts
        .iter()
        .map(|ctx| evaluator.evaluate(ctx, &registry).expect("eval"))
        .collect();
    assert_eq!(results, vec![true, true, false]);
}

#[test]
fn missing_paths_and_unknown_functions_are_null() {
    let registry = FunctionRegistry::new();
    let ctx = hook_context();

    assert!(evaluate_condition("git_branch == null", &ctx, &registry).expect("eval"));
    assert!(evaluate_condition("unknown_fn() == null", &ctx, &registry).expect("eval"));
    assert!(!evaluate_condition("unknown_fn()", &ctx, &registry).expect("eval"));
}

#[test]
fn compile_error_carries_expression() {
    match ExpressionEvaluator::compile("tool_name ==") {
        Err(OapsError::Expression { expression, .. }) => {
            assert_eq!(expression, "tool_name ==");
        }
        other => panic!("expected expression error, got {other:?}"),
    }
}

#[test]
fn caller_registry_functions_resolve() {
    let mut registry = FunctionRegistry::new();
    registry.register("session_get", |args| match args.first() {
        Some(Value::Str(key)) if key == "counter" => Value::Int(42),
        _ => Value::Null,
    });

    let ctx = hook_context();
    assert!(
        evaluate_condition(r#"session_get("counter") == 42"#, &ctx, &registry).expect("eval")
    );
    assert!(
        evaluate_condition(r#"session_get("missing") == null"#, &ctx, &registry).expect("eval")
    );
}

#[test]
fn default_registry_end_to_end() {
    let tmp = tempdir().expect("tempdir");
    let script = tmp.path().join("run.sh");
    std::fs::write(&script, "#!/bin/sh\n").expect("write");

    let registry = default_registry(tmp.path());
    let ctx = json!({
        "script": script.to_string_lossy(),
        "root": tmp.path().to_string_lossy(),
    });

    assert!(evaluate_condition("file_exists(script)", &ctx, &registry).expect("eval"));
    assert!(evaluate_condition("is_path_under(script, root)", &ctx, &registry).expect("eval"));
    assert!(
        evaluate_condition(r#"matches_glob(script, "*.sh")"#, &ctx, &registry).expect("eval")
    );
    assert!(
        !evaluate_condition(r#"matches_glob(script, "*.py")"#, &ctx, &registry).expect("eval")
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        assert!(
            !evaluate_condition("is_executable(script)", &ctx, &registry).expect("eval")
        );
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        assert!(evaluate_condition("is_executable(script)", &ctx, &registry).expect("eval"));
    }
}

#[test]
fn is_git_repo_reflects_surroundings() {
    let tmp = tempdir().expect("tempdir");
    let registry = default_registry(tmp.path());
    let ctx = json!({});
    assert!(!evaluate_condition("is_git_repo()", &ctx, &registry).expect("eval"));

    std::fs::create_dir_all(tmp.path().join(".git")).expect("git dir");
    let registry = default_registry(tmp.path());
    assert!(evaluate_condition("is_git_repo()", &ctx, &registry).expect("eval"));
}

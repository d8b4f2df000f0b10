use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fnwire::{
    Composer, ComposerError, EngineConfig, ExecutionEvent, NodeError, NodeFn, NodeInstruction,
};
use serde_json::json;

fn abc() -> Composer {
    Composer::new()
        .register("a", NodeFn::new(Vec::<String>::new(), |_| Ok(json!(5))))
        .unwrap()
        .register("b", NodeFn::new(["a"], |i| Ok(json!(i.i64("a")? * 5))))
        .unwrap()
        .register(
            "c",
            NodeFn::new(["a", "b"], |i| Ok(json!(i.i64("a")? * i.i64("b")?))),
        )
        .unwrap()
}

/// A function node that counts its invocations.
fn counted(calls: &Arc<AtomicUsize>, value: i64) -> NodeFn {
    let calls = Arc::clone(calls);
    NodeFn::new(Vec::<String>::new(), move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!(value))
    })
}

#[test]
fn test_calculate_returns_requested_names() {
    let results = abc().calculate(["c"], false).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results["c"], json!(125));
}

#[test]
fn test_calculate_with_intermediates() {
    let model = abc();
    let with = model.calculate(["a", "c"], true).unwrap();
    let expected: Vec<(String, serde_json::Value)> = vec![
        ("a".into(), json!(5)),
        ("b".into(), json!(25)),
        ("c".into(), json!(125)),
    ];
    assert_eq!(with.into_iter().collect::<Vec<_>>(), expected);

    let without = model.calculate(["a", "c"], false).unwrap();
    assert_eq!(without.len(), 2);
    assert_eq!(without["c"], json!(125));
}

#[test]
fn test_nodes_outside_closure_never_run() {
    let unrelated = Arc::new(AtomicUsize::new(0));
    let model = abc()
        .register("expensive", counted(&unrelated, 0))
        .unwrap();

    model.calculate(["c"], true).unwrap();
    assert_eq!(unrelated.load(Ordering::SeqCst), 0);
}

#[test]
fn test_shared_dependency_runs_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = Composer::new()
        .register("root", counted(&calls, 2))
        .unwrap()
        .register("left", NodeFn::new(["root"], |i| Ok(json!(i.i64("root")? + 1))))
        .unwrap()
        .register("right", NodeFn::new(["root"], |i| Ok(json!(i.i64("root")? + 2))))
        .unwrap()
        .register(
            "top",
            NodeFn::new(["left", "right"], |i| Ok(json!(i.i64("left")? * i.i64("right")?))),
        )
        .unwrap();

    assert_eq!(model.call("top").unwrap(), json!(12));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failure_aborts_with_node_name() {
    let model = abc()
        .register(
            "d",
            NodeFn::new(["c"], |_| Err(NodeError::execution("division by zero"))),
        )
        .unwrap()
        .register("e", NodeFn::new(["d"], |i| Ok(i.require("d")?.clone())))
        .unwrap();

    let err = model.calculate(["e", "c"], true).unwrap_err();
    match &err {
        ComposerError::NodeExecution { node, source } => {
            assert_eq!(node, "d");
            assert!(source.to_string().contains("division by zero"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.node(), Some("d"));
}

#[test]
fn test_type_mismatch_surfaces_as_node_error() {
    let model = Composer::new()
        .register_parameter("text", "hello")
        .unwrap()
        .register("n", NodeFn::new(["text"], |i| Ok(json!(i.i64("text")? + 1))))
        .unwrap();

    match model.call("n").unwrap_err() {
        ComposerError::NodeExecution {
            source: NodeError::InputType { name, .. },
            ..
        } => assert_eq!(name, "text"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_events_follow_execution_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    abc()
        .calculation(["c"])
        .on_event(move |event| {
            let label = match event {
                ExecutionEvent::PrepareExecution { plan } => format!("prepare:{}", plan.len()),
                ExecutionEvent::NodeStarted { name, .. } => format!("start:{}", name),
                ExecutionEvent::NodeFinished { name, .. } => format!("finish:{}", name),
            };
            sink.lock().unwrap().push(label);
        })
        .run()
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "prepare:3", "start:a", "finish:a", "start:b", "finish:b", "start:c", "finish:c"
        ]
    );
}

#[test]
fn test_plan_order_and_instructions() {
    let plan = abc().plan(["b"], false).unwrap();
    let order: Vec<String> = plan.order().map(ToString::to_string).collect();
    assert_eq!(order, vec!["a", "b"]);
    assert_eq!(plan.instruction("a"), Some(NodeInstruction::Calculate));
    assert_eq!(plan.instruction("c"), None);
}

#[test]
fn test_perform_checks_controls_scope_of_assembly() {
    let broken = abc()
        .register("orphan", NodeFn::new(["missing"], |_| Ok(json!(null))))
        .unwrap();

    assert!(matches!(
        broken.call("c").unwrap_err(),
        ComposerError::UnresolvedDependency { .. }
    ));

    let lenient = broken.with_config(EngineConfig {
        perform_checks: false,
        ..EngineConfig::default()
    });
    assert_eq!(lenient.call("c").unwrap(), json!(125));
    assert!(lenient.call("orphan").is_err());
}

#[test]
fn test_release_consumed_does_not_change_results() {
    let keep = abc().with_config(EngineConfig {
        release_consumed: false,
        ..EngineConfig::default()
    });
    assert_eq!(
        keep.calculate(["b", "c"], false).unwrap(),
        abc().calculate(["b", "c"], false).unwrap()
    );
}

#[test]
fn test_run_composer_tests() {
    let model = abc()
        .register_test("c_is_125", NodeFn::new(["c"], |i| Ok(json!(i.i64("c")? == 125))))
        .unwrap()
        .register_test("b_is_zero", NodeFn::new(["b"], |i| Ok(json!(i.i64("b")? == 0))))
        .unwrap();

    let outcomes = model.run_tests().unwrap();
    assert_eq!(outcomes.len(), 2);
    let passed: Vec<(String, bool)> = outcomes
        .iter()
        .map(|o| (o.name.to_string(), o.passed))
        .collect();
    assert_eq!(
        passed,
        vec![("b_is_zero".to_string(), false), ("c_is_125".to_string(), true)]
    );
}

#[test]
fn test_model_is_shareable_across_threads() {
    let model = Arc::new(abc());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let model = Arc::clone(&model);
            std::thread::spawn(move || model.call("c").unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), json!(125));
    }
}

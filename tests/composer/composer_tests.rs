use fnwire::{Composer, ComposerError, DiagnosticLevel, NodeFn, NodeInputs, NodeResult, QualifiedName};
use serde_json::{json, Value};

fn product(inputs: &NodeInputs) -> NodeResult<Value> {
    match (inputs.i64("data"), inputs.i64("factor")) {
        (Ok(data), Ok(factor)) => Ok(json!(data * factor)),
        _ => Ok(json!(inputs.f64("data")? * inputs.f64("factor")?)),
    }
}

/// `b(data, factor) -> data * factor`, `c(b) -> b`. Neither input is bound
/// inside the child.
fn child_model() -> Composer {
    Composer::new()
        .register("b", NodeFn::new(["data", "factor"], product))
        .unwrap()
        .register("c", NodeFn::new(["b"], |i| Ok(i.require("b")?.clone())))
        .unwrap()
}

fn qn(s: &str) -> QualifiedName {
    QualifiedName::parse(s).unwrap()
}

fn two_children() -> Composer {
    let child = child_model();
    Composer::new()
        .register_parameter("data", 5)
        .unwrap()
        .merge_namespace("child_one", &child)
        .unwrap()
        .merge_namespace("child_two", &child)
        .unwrap()
        .bind_parameter(qn("child_one__factor"), 3)
        .bind_parameter(qn("child_two__factor"), 5)
}

#[test]
fn test_namespaces_resolve_through_parent() {
    let results = two_children()
        .calculate(["child_one__c", "child_two__c"], false)
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results["child_one__c"], json!(15));
    assert_eq!(results["child_two__c"], json!(25));
}

#[test]
fn test_namespace_copies_are_independent() {
    let model = two_children();
    let changed = model.bind_parameter(qn("child_one__factor"), 10);

    assert_eq!(changed.call("child_one__c").unwrap(), json!(50));
    assert_eq!(changed.call("child_two__c").unwrap(), json!(25));
    // The earlier value is untouched.
    assert_eq!(model.call("child_one__c").unwrap(), json!(15));

    let names: Vec<String> = model.names().map(ToString::to_string).collect();
    assert_eq!(
        names,
        vec![
            "child_one__b",
            "child_one__c",
            "child_one__factor",
            "child_two__b",
            "child_two__c",
            "child_two__factor",
            "data"
        ]
    );
}

#[test]
fn test_local_binding_shadows_parent() {
    let child = child_model().register_parameter("data", 100).unwrap();
    let model = Composer::new()
        .register_parameter("data", 5)
        .unwrap()
        .register_parameter("factor", 2)
        .unwrap()
        .merge_namespace("inner", &child)
        .unwrap();

    assert_eq!(model.call("inner__c").unwrap(), json!(200));
}

#[test]
fn test_link_substitutes_computed_factor() {
    let factoring = Composer::new()
        .register(
            "calculated_factor",
            NodeFn::new(["data"], |i| Ok(json!(i.f64("data")? / 2.0))),
        )
        .unwrap();

    let model = two_children()
        .merge_namespace("factoring", &factoring)
        .unwrap()
        .link("child_one__factor", "factoring__calculated_factor")
        .unwrap();

    let results = model
        .calculate(["child_one__b", "child_two__b"], false)
        .unwrap();
    assert_eq!(results["child_one__b"], json!(12.5));
    assert_eq!(results["child_two__b"], json!(25));
}

#[test]
fn test_link_cycle_is_rejected_before_execution() {
    let model = Composer::new()
        .register("x", NodeFn::new(["y"], |i| Ok(i.require("y")?.clone())))
        .unwrap()
        .link("y", "z")
        .unwrap()
        .link("z", "y")
        .unwrap();

    let err = model.calculate(["x"], false).unwrap_err();
    assert!(matches!(err, ComposerError::LinkCycle { .. }), "{}", err);
}

#[test]
fn test_dependency_cycle_through_link_is_rejected() {
    // `a` links to `b`, and `b` reads `a`, which now means itself.
    let model = Composer::new()
        .register("b", NodeFn::new(["a"], |i| Ok(i.require("a")?.clone())))
        .unwrap()
        .link("a", "b")
        .unwrap();

    let err = model.call("b").unwrap_err();
    assert!(matches!(err, ComposerError::Cycle { .. }), "{}", err);
}

#[test]
fn test_unresolved_dependency_names_the_referrer() {
    let model = Composer::new()
        .merge_namespace("inner", &child_model())
        .unwrap();

    match model.call("inner__c").unwrap_err() {
        ComposerError::UnresolvedDependency { node, dependency } => {
            assert_eq!(node, "inner__b");
            assert!(dependency == "data" || dependency == "factor");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_naming_errors() {
    let err = Composer::new().register_parameter("a__b", 1).unwrap_err();
    assert!(matches!(err, ComposerError::Naming(_)));
    assert!(Composer::new().register_parameter("", 1).is_err());
    assert!(Composer::new().register_parameter("_a", 1).is_err());
    assert!(Composer::new()
        .merge_namespace("bad__prefix", &child_model())
        .is_err());
}

#[test]
fn test_check_reports_without_failing() {
    let model = Composer::new()
        .merge_namespace("inner", &child_model())
        .unwrap()
        .register_parameter("data", 1)
        .unwrap();

    let report = model.check(None);
    assert!(!report.is_valid);
    let errors = report.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "unresolved_dependency");
    assert_eq!(errors[0].level, DiagnosticLevel::Error);

    let fixed = model.register_parameter("factor", 2).unwrap();
    assert!(fixed.check(None).is_valid);
}

#[test]
fn test_subgraph_and_precalculate() {
    let model = two_children();
    let precalculated = model.precalculate(["child_one__b"]).unwrap();
    assert_eq!(
        precalculated.definition("child_one__b").as_deref(),
        Some("15")
    );
    assert_eq!(precalculated.call("child_one__c").unwrap(), json!(15));

    let sub = model
        .subgraph(["data", "child_two__b", "child_two__c", "child_two__factor"])
        .unwrap();
    assert_eq!(sub.len(), 4);
    assert_eq!(sub.call("child_two__c").unwrap(), json!(25));
    assert!(sub.call("child_one__c").is_err());
}

#[test]
fn test_graph_description_export() {
    let model = two_children();
    let description = model.graph_description();

    assert_eq!(description.nodes.len(), 7);
    assert!(description.unbound.is_empty());
    assert!(description
        .edges
        .iter()
        .any(|e| e.dependent == "child_one__b" && e.dependency == "data" && e.input == "data"));

    let parsed: Value = serde_json::from_str(&description.to_json().unwrap()).unwrap();
    assert_eq!(parsed["nodes"].as_array().unwrap().len(), 7);
}

fn sum_members(inputs: &NodeInputs, name: &str) -> NodeResult<i64> {
    Ok(inputs.object(name)?.values().filter_map(Value::as_i64).sum())
}

/// `d(a, *d_, b, **c_) = a + sum(d_) + b + sum(c_)` over `c_count` nodes
/// `c_i = a * 2` and `d_count` nodes `d_i = a * 5`.
fn collecting_model(c_count: usize, d_count: usize) -> Composer {
    let mut composer = Composer::new()
        .register_parameters([("a", 1), ("b", 2)])
        .unwrap();
    for i in 0..c_count {
        composer = composer
            .register(
                &format!("c_{}", i),
                NodeFn::new(["a"], |inputs| Ok(json!(inputs.i64("a")? * 2))),
            )
            .unwrap();
    }
    for i in 0..d_count {
        composer = composer
            .register(
                &format!("d_{}", i),
                NodeFn::new(["a"], |inputs| Ok(json!(inputs.i64("a")? * 5))),
            )
            .unwrap();
    }
    composer
        .register(
            "d",
            NodeFn::new(["a", "b"], |i| {
                Ok(json!(
                    i.i64("a")? + sum_members(i, "d_")? + i.i64("b")? + sum_members(i, "c_")?
                ))
            })
            .collect("d_")
            .collect("c_"),
        )
        .unwrap()
}

#[test]
fn test_collected_inputs() {
    let composer = collecting_model(10, 5);
    assert_eq!(composer.call("d").unwrap(), json!(1 + 10 * 2 + 2 + 5 * 5));

    let all = composer.calculate(["d"], true).unwrap();
    assert!(all.contains_key("c_9") && all.contains_key("d_4"));
}

#[test]
fn test_empty_collected_inputs() {
    assert_eq!(collecting_model(10, 0).call("d").unwrap(), json!(1 + 10 * 2 + 2));
    assert_eq!(collecting_model(0, 5).call("d").unwrap(), json!(1 + 2 + 5 * 5));
}

#[test]
fn test_collected_members_are_keyed_by_name() {
    let composer = collecting_model(2, 0)
        .register(
            "members",
            NodeFn::new(Vec::<String>::new(), |i| Ok(i.require("c_")?.clone())).collect("c_"),
        )
        .unwrap();
    assert_eq!(composer.call("members").unwrap(), json!({"c_0": 2, "c_1": 2}));
}

#[test]
fn test_optional_input_defaults() {
    let add = || NodeFn::new(["a"], |i| Ok(json!(i.i64("a")? + i.i64("b")?))).optional("b", 3);

    let composer = Composer::new()
        .register_parameter("a", 1)
        .unwrap()
        .register("c", add())
        .unwrap();
    assert_eq!(composer.call("c").unwrap(), json!(4));
    assert!(composer.check(None).errors().is_empty());

    let bound = composer.register_parameter("b", 2).unwrap();
    assert_eq!(bound.call("c").unwrap(), json!(3));
}

#[test]
fn test_optional_input_resolves_through_enclosing_scope() {
    let child = Composer::new()
        .register(
            "scaled",
            NodeFn::new(["data"], |i| Ok(json!(i.i64("data")? * i.i64("factor")?)))
                .optional("factor", 1),
        )
        .unwrap();
    let composer = Composer::new()
        .register_parameter("data", 5)
        .unwrap()
        .merge_namespace("plain", &child)
        .unwrap();
    assert_eq!(composer.call("plain__scaled").unwrap(), json!(5));

    let scaled = composer.register_parameter("factor", 4).unwrap();
    assert_eq!(scaled.call("plain__scaled").unwrap(), json!(20));
}

//! Two copies of the same sub-model, one of them re-wired through a link.
//!
//! Run with `RUST_LOG=debug` to see per-node decisions.

use fnwire::{Composer, ComposerResult, ExecutionEvent, NodeFn, QualifiedName};
use serde_json::json;

fn child() -> ComposerResult<Composer> {
    Composer::new()
        .register(
            "b",
            NodeFn::new(["data", "factor"], |i| Ok(json!(i.f64("data")? * i.f64("factor")?))),
        )?
        .register("c", NodeFn::new(["b"], |i| Ok(i.require("b")?.clone())))
}

fn main() -> ComposerResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== fnwire: namespaces and links ===\n");

    let child = child()?;
    let factoring = Composer::new().register(
        "calculated_factor",
        NodeFn::new(["data"], |i| Ok(json!(i.f64("data")? / 2.0))),
    )?;

    let model = Composer::new()
        .register_parameter("data", 5)?
        .merge_namespace("child_one", &child)?
        .merge_namespace("child_two", &child)?
        .merge_namespace("factoring", &factoring)?
        .bind_parameter(QualifiedName::parse("child_one__factor")?, 3)
        .bind_parameter(QualifiedName::parse("child_two__factor")?, 5);

    let results = model.calculate(["child_one__c", "child_two__c"], false)?;
    println!("Plain bindings:");
    for (name, value) in &results {
        println!("  {} = {}", name, value);
    }

    let linked = model
        .link("child_one__factor", "factoring__calculated_factor")?
        .memory_cache("demo");
    let results = linked
        .calculation(["child_one__c", "child_two__c"])
        .on_event(|event| {
            if let ExecutionEvent::NodeFinished {
                name,
                instruction,
                elapsed,
            } = event
            {
                println!("  {:<28} {:?} in {:?}", name.to_string(), instruction, elapsed);
            }
        })
        .run()?;
    println!("\nWith child_one__factor linked to factoring__calculated_factor:");
    for (name, value) in &results {
        println!("  {} = {}", name, value);
    }

    println!("\nSecond run, served from the cache:");
    let plan = linked.plan(["child_one__c", "child_two__c"], false)?;
    for step in &plan.steps {
        println!("  {:<28} {:?}", step.name.to_string(), step.instruction);
    }

    println!("\nGraph description:");
    println!("{}", linked.graph_description().to_json().unwrap_or_default());
    Ok(())
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fnwire::{CacheConfig, Composer, NodeFn, NodeInstruction, PersistentCache};
use serde_json::json;

/// Invocation counters for the nodes of a small model:
/// `a -> b -> c` and an unrelated `d -> e`.
struct Counters {
    a: Arc<AtomicUsize>,
    b: Arc<AtomicUsize>,
    c: Arc<AtomicUsize>,
    e: Arc<AtomicUsize>,
}

impl Counters {
    fn new() -> Self {
        Self {
            a: Arc::new(AtomicUsize::new(0)),
            b: Arc::new(AtomicUsize::new(0)),
            c: Arc::new(AtomicUsize::new(0)),
            e: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn snapshot(&self) -> [usize; 4] {
        [
            self.a.load(Ordering::SeqCst),
            self.b.load(Ordering::SeqCst),
            self.c.load(Ordering::SeqCst),
            self.e.load(Ordering::SeqCst),
        ]
    }
}

fn model(counters: &Counters, a_version: &str) -> Composer {
    let (a, b, c, e) = (
        Arc::clone(&counters.a),
        Arc::clone(&counters.b),
        Arc::clone(&counters.c),
        Arc::clone(&counters.e),
    );
    Composer::new()
        .register(
            "a",
            NodeFn::new(Vec::<String>::new(), move |_| {
                a.fetch_add(1, Ordering::SeqCst);
                Ok(json!(5))
            })
            .with_definition(format!("a {}", a_version)),
        )
        .unwrap()
        .register(
            "b",
            NodeFn::new(["a"], move |i| {
                b.fetch_add(1, Ordering::SeqCst);
                Ok(json!(i.i64("a")? * 5))
            })
            .with_definition("b v1"),
        )
        .unwrap()
        .register(
            "c",
            NodeFn::new(["b"], move |i| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(json!(i.i64("b")? + 1))
            })
            .with_definition("c v1"),
        )
        .unwrap()
        .register_parameter("d", 7)
        .unwrap()
        .register(
            "e",
            NodeFn::new(["d"], move |i| {
                e.fetch_add(1, Ordering::SeqCst);
                Ok(json!(i.i64("d")? * 2))
            })
            .with_definition("e v1"),
        )
        .unwrap()
}

#[test]
fn test_second_calculation_executes_nothing() {
    let counters = Counters::new();
    let composer = model(&counters, "v1").memory_cache("idempotence");

    let first = composer.calculate(["c", "e"], false).unwrap();
    assert_eq!(counters.snapshot(), [1, 1, 1, 1]);

    let second = composer.calculate(["c", "e"], false).unwrap();
    assert_eq!(first, second);
    assert_eq!(counters.snapshot(), [1, 1, 1, 1]);
    assert_eq!(second["c"], json!(26));
}

#[test]
fn test_intermediates_are_retrieved_not_recomputed() {
    let counters = Counters::new();
    let composer = model(&counters, "v1").memory_cache("intermediates");
    composer.calculate(["c"], false).unwrap();

    let all = composer.calculate(["c"], true).unwrap();
    assert_eq!(all["a"], json!(5));
    assert_eq!(all["b"], json!(25));
    assert_eq!(counters.snapshot(), [1, 1, 1, 0]);
}

#[test]
fn test_definition_change_recomputes_downstream_only() {
    let counters = Counters::new();
    let cache = PersistentCache::memory("fingerprints");
    model(&counters, "v1")
        .with_cache(cache.clone())
        .calculate(["c", "e"], false)
        .unwrap();

    let changed = model(&counters, "v2").with_cache(cache);
    let before = model(&counters, "v1").fingerprints(["c", "e"]).unwrap();
    let after = changed.fingerprints(["c", "e"]).unwrap();
    for (name, fingerprint) in &before {
        let leaf = name.to_string();
        let same = after[name] == *fingerprint;
        assert_eq!(same, leaf == "d" || leaf == "e", "{}", leaf);
    }

    changed.calculate(["c", "e"], false).unwrap();
    assert_eq!(counters.snapshot(), [2, 2, 2, 1]);
}

#[test]
fn test_parameter_change_invalidates_consumers() {
    let counters = Counters::new();
    let cache = PersistentCache::memory("parameters");
    let composer = model(&counters, "v1").with_cache(cache);
    composer.calculate(["c", "e"], false).unwrap();

    let changed = composer.register_parameter("d", 8).unwrap();
    assert_eq!(changed.call("e").unwrap(), json!(16));
    changed.call("c").unwrap();
    assert_eq!(counters.snapshot(), [1, 1, 1, 2]);
}

#[test]
fn test_invalidate_cascades_to_descendants() {
    let counters = Counters::new();
    let composer = model(&counters, "v1").memory_cache("invalidate");
    composer.calculate(["c", "e"], false).unwrap();

    composer.cache_invalidate(["b"]).unwrap();
    let plan = composer.plan(["c", "e"], true).unwrap();
    assert_eq!(plan.instruction("a"), Some(NodeInstruction::Retrieve));
    assert_eq!(plan.instruction("b"), Some(NodeInstruction::Calculate));
    assert_eq!(plan.instruction("c"), Some(NodeInstruction::Calculate));
    assert_eq!(plan.instruction("e"), Some(NodeInstruction::Retrieve));

    composer.calculate(["c", "e"], false).unwrap();
    assert_eq!(counters.snapshot(), [1, 2, 2, 1]);
}

#[test]
fn test_clear_forces_full_recomputation() {
    let counters = Counters::new();
    let composer = model(&counters, "v1").memory_cache("clear");
    composer.calculate(["c", "e"], false).unwrap();

    composer.cache_clear().unwrap();
    composer.calculate(["c", "e"], false).unwrap();
    assert_eq!(counters.snapshot(), [2, 2, 2, 2]);
}

#[test]
fn test_namespaces_do_not_share_entries() {
    let counters = Counters::new();
    let store = PersistentCache::memory("one");
    model(&counters, "v1")
        .with_cache(store)
        .call("c")
        .unwrap();
    model(&counters, "v1")
        .memory_cache("two")
        .call("c")
        .unwrap();
    assert_eq!(counters.snapshot(), [2, 2, 2, 0]);
}

#[test]
fn test_stats_track_hits_and_writes() {
    let counters = Counters::new();
    let composer = model(&counters, "v1").memory_cache("stats");
    composer.call("c").unwrap();
    composer.call("c").unwrap();

    let stats = composer.cache_stats().unwrap();
    assert_eq!(stats.writes, 3);
    assert_eq!(stats.hits, 1);
}

#[cfg(feature = "file-cache")]
#[test]
fn test_file_cache_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let counters = Counters::new();

    let first = model(&counters, "v1")
        .development_cache("model", Some(dir.path()))
        .unwrap();
    assert_eq!(first.call("c").unwrap(), json!(26));

    let config = CacheConfig::file("model", dir.path());
    let second = model(&counters, "v1").with_cache(PersistentCache::from_config(&config).unwrap());
    assert_eq!(second.call("c").unwrap(), json!(26));
    assert_eq!(counters.snapshot(), [1, 1, 1, 0]);

    assert!(dir.path().join("model").join("c").is_dir());

    second.cache_invalidate(["a"]).unwrap();
    assert!(!dir.path().join("model").join("c").exists());
    second.call("c").unwrap();
    assert_eq!(counters.snapshot(), [2, 2, 2, 0]);
}

#[test]
fn test_replaced_function_without_definition_is_recomputed() {
    let composer = Composer::new()
        .register("a", NodeFn::new(Vec::<String>::new(), |_| Ok(json!(5))))
        .unwrap()
        .register("b", NodeFn::new(["a"], |i| Ok(json!(i.i64("a")? + 1))))
        .unwrap()
        .memory_cache("replaced");
    assert_eq!(composer.call("b").unwrap(), json!(6));

    let replaced = composer
        .register("a", NodeFn::new(Vec::<String>::new(), |_| Ok(json!(6))))
        .unwrap();
    let plan = replaced.plan(["b"], true).unwrap();
    assert_eq!(plan.instruction("a"), Some(NodeInstruction::Calculate));
    assert_eq!(replaced.call("a").unwrap(), json!(6));
    assert_eq!(replaced.call("b").unwrap(), json!(7));
}

#[test]
fn test_relinked_inputs_are_recomputed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let composer = Composer::new()
        .register_parameter("p", 10)
        .unwrap()
        .register_parameter("q", 3)
        .unwrap()
        .register(
            "d",
            NodeFn::new(["x", "y"], move |i| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(json!(i.i64("x")? - i.i64("y")?))
            })
            .with_definition("x - y"),
        )
        .unwrap()
        .memory_cache("relinked");

    let straight = composer.link("x", "p").unwrap().link("y", "q").unwrap();
    assert_eq!(straight.call("d").unwrap(), json!(7));

    let swapped = composer.link("x", "q").unwrap().link("y", "p").unwrap();
    assert_eq!(swapped.call("d").unwrap(), json!(-7));
    assert_eq!(straight.call("d").unwrap(), json!(7));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[cfg(feature = "file-cache")]
#[test]
fn test_corrupted_file_entry_is_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let counters = Counters::new();
    let composer = model(&counters, "v1")
        .development_cache("model", Some(dir.path()))
        .unwrap();
    composer.call("c").unwrap();

    let fingerprints = composer.fingerprints(["c"]).unwrap();
    let (_, fingerprint) = fingerprints
        .iter()
        .find(|(name, _)| name.to_string() == "c")
        .unwrap();
    let entry = dir
        .path()
        .join("model")
        .join("c")
        .join(format!("{}.json", fingerprint));
    std::fs::write(&entry, b"{truncated").unwrap();

    assert_eq!(composer.call("c").unwrap(), json!(26));
    assert_eq!(counters.snapshot(), [1, 1, 2, 0]);
    assert_eq!(std::fs::read(&entry).unwrap(), b"26");

    assert_eq!(composer.call("c").unwrap(), json!(26));
    assert_eq!(counters.snapshot(), [1, 1, 2, 0]);
}

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use spc_config::{OsFamily, Registry};
use spc_core::{DependencyResolver, Error, ErrorKind, ResolveOptions};

/// Package `pN` may only depend on packages with a lower index, which
/// keeps every generated graph acyclic.
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..14).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::collection::btree_set(0..i.max(1), 0..=i.min(4)))
            .collect::<Vec<_>>()
            .prop_map(|sets| {
                sets.into_iter()
                    .enumerate()
                    .map(|(i, deps)| deps.into_iter().filter(|d| *d < i).collect::<Vec<usize>>())
                    .collect::<Vec<Vec<usize>>>()
            })
    })
}

fn registry(graph: &[Vec<usize>]) -> Registry {
    let mut packages = Map::new();
    for (i, deps) in graph.iter().enumerate() {
        let depends: Vec<String> = deps.iter().map(|d| format!("p{d}")).collect();
        packages.insert(
            format!("p{i}"),
            json!({ "type": "virtual-target", "depends": depends }),
        );
    }
    Registry::from_values(&Value::Object(packages), &json!({})).unwrap()
}

proptest! {
    #[test]
    fn prop_order_is_topological(graph in dag()) {
        let registry = registry(&graph);
        let requested: Vec<String> = (0..graph.len()).rev().map(|i| format!("p{i}")).collect();
        let resolution = DependencyResolver::new(&registry, OsFamily::Linux)
            .resolve(&requested, &ResolveOptions::default())
            .unwrap();

        prop_assert_eq!(resolution.order.len(), graph.len());
        let unique: BTreeSet<&String> = resolution.order.iter().collect();
        prop_assert_eq!(unique.len(), graph.len());

        for (i, deps) in graph.iter().enumerate() {
            let at = resolution.position(&format!("p{i}")).unwrap();
            for d in deps {
                let dep_at = resolution.position(&format!("p{d}")).unwrap();
                prop_assert!(dep_at < at, "p{} must precede p{}", d, i);
            }
        }
    }

    #[test]
    fn prop_resolution_is_deterministic(graph in dag()) {
        let registry = registry(&graph);
        let requested = vec![format!("p{}", graph.len() - 1)];
        let resolver = DependencyResolver::new(&registry, OsFamily::Linux);
        let first = resolver.resolve(&requested, &ResolveOptions::default()).unwrap();
        let second = resolver.resolve(&requested, &ResolveOptions::default()).unwrap();
        prop_assert_eq!(first, second);
    }
}

#[test]
fn test_two_node_cycle_is_a_cycle_error() {
    let registry = Registry::from_values(
        &json!({
            "a": { "type": "virtual-target", "depends": ["b"] },
            "b": { "type": "virtual-target", "depends": ["a"] }
        }),
        &json!({}),
    )
    .unwrap();

    let err = DependencyResolver::new(&registry, OsFamily::Linux)
        .resolve(&["b"], &ResolveOptions::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cycle);
    assert_eq!(err.to_string(), "Dependency cycle detected: b -> a -> b");
}

#[test]
fn test_deep_chain_does_not_overflow() {
    let depth = 5_000;
    let graph: Vec<Vec<usize>> = (0..depth)
        .map(|i| if i == 0 { Vec::new() } else { vec![i - 1] })
        .collect();
    let registry = registry(&graph);

    let resolution = DependencyResolver::new(&registry, OsFamily::Linux)
        .resolve(&[format!("p{}", depth - 1)], &ResolveOptions::default())
        .unwrap();

    assert_eq!(resolution.order.len(), depth);
    assert_eq!(resolution.order[0], "p0");
}

#[test]
fn test_cycle_below_a_root_names_only_the_loop() {
    let registry = Registry::from_values(
        &json!({
            "php": { "type": "virtual-target", "depends": ["curl"] },
            "curl": { "type": "virtual-target", "depends": ["openssl"] },
            "openssl": { "type": "virtual-target", "depends": ["nghttp2"] },
            "nghttp2": { "type": "virtual-target", "depends": ["curl"] }
        }),
        &json!({}),
    )
    .unwrap();

    let err = DependencyResolver::new(&registry, OsFamily::Linux)
        .resolve(&["php"], &ResolveOptions::default())
        .unwrap_err();

    match err {
        Error::Cycle { chain } => {
            assert_eq!(chain, vec!["curl", "openssl", "nghttp2", "curl"]);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
}

mod common;

use std::collections::HashMap;

use common::{leaf, ts};
use cycleflow::dep::{DependencyNode, EvalContext};
use cycleflow::fs::mock::MockArtifactStore;
use proptest::prelude::*;

fn eval(dep: &DependencyNode) -> bool {
    let tasks = HashMap::new();
    let artifacts = MockArtifactStore::new();
    let ctx = EvalContext {
        tasks: &tasks,
        artifacts: &artifacts,
        now: ts("202401020000"),
    };
    dep.resolved(ts("202401020000"), &ctx)
}

fn leaves(values: &[bool]) -> Vec<DependencyNode> {
    values.iter().copied().map(leaf).collect()
}

/// Random boolean tree together with its expected truth value.
fn tree_strategy() -> impl Strategy<Value = (DependencyNode, bool)> {
    let leaf_strat = any::<bool>().prop_map(|v| (leaf(v), v));
    leaf_strat.prop_recursive(4, 32, 4, |inner| {
        let children = proptest::collection::vec(inner.clone(), 1..4);
        prop_oneof![
            children.clone().prop_map(|nodes| {
                let hits = nodes.iter().filter(|(_, v)| *v).count();
                let (children, _): (Vec<_>, Vec<_>) = nodes.into_iter().unzip();
                let expected = hits == children.len();
                (DependencyNode::And { max_missing: 0, children }, expected)
            }),
            children.clone().prop_map(|nodes| {
                let expected = nodes.iter().any(|(_, v)| *v);
                let (children, _): (Vec<_>, Vec<_>) = nodes.into_iter().unzip();
                (DependencyNode::Or { children }, expected)
            }),
            children.clone().prop_map(|nodes| {
                let hits = nodes.iter().filter(|(_, v)| *v).count();
                let (children, _): (Vec<_>, Vec<_>) = nodes.into_iter().unzip();
                (DependencyNode::Xor { children }, hits == 1)
            }),
            inner.prop_map(|(child, v)| {
                (DependencyNode::Not { child: Box::new(child) }, !v)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn random_trees_evaluate_to_their_boolean_value((tree, expected) in tree_strategy()) {
        prop_assert_eq!(eval(&tree), expected);
    }

    #[test]
    fn and_with_max_missing_matches_hit_count(
        values in proptest::collection::vec(any::<bool>(), 1..8),
        max_missing in 0usize..8,
    ) {
        let hits = values.iter().filter(|v| **v).count();
        let dep = DependencyNode::And { max_missing, children: leaves(&values) };
        prop_assert_eq!(eval(&dep), hits + max_missing >= values.len());
    }

    #[test]
    fn some_with_threshold_one_is_or(values in proptest::collection::vec(any::<bool>(), 1..8)) {
        let some = DependencyNode::Some { threshold: 1, children: leaves(&values) };
        let or = DependencyNode::Or { children: leaves(&values) };
        prop_assert_eq!(eval(&some), eval(&or));
    }

    #[test]
    fn some_with_full_threshold_is_strict_and(
        values in proptest::collection::vec(any::<bool>(), 1..8),
    ) {
        let some = DependencyNode::Some { threshold: values.len(), children: leaves(&values) };
        let and = DependencyNode::And { max_missing: 0, children: leaves(&values) };
        prop_assert_eq!(eval(&some), eval(&and));
    }

    #[test]
    fn nand_nor_are_negations(values in proptest::collection::vec(any::<bool>(), 1..8)) {
        let nand = DependencyNode::Nand { children: leaves(&values) };
        let not_and = DependencyNode::Not {
            child: Box::new(DependencyNode::And { max_missing: 0, children: leaves(&values) }),
        };
        prop_assert_eq!(eval(&nand), eval(&not_and));

        let nor = DependencyNode::Nor { children: leaves(&values) };
        let not_or = DependencyNode::Not {
            child: Box::new(DependencyNode::Or { children: leaves(&values) }),
        };
        prop_assert_eq!(eval(&nor), eval(&not_or));
    }

    #[test]
    fn double_negation_is_identity((tree, _) in tree_strategy()) {
        let plain = eval(&tree);
        let doubled = DependencyNode::Not {
            child: Box::new(DependencyNode::Not { child: Box::new(tree) }),
        };
        prop_assert_eq!(eval(&doubled), plain);
    }
}

#![allow(dead_code)]

pub use cycleflow_test_utils::{init_tracing, ts};

use cycleflow::dep::DependencyNode;

/// Dependency leaf that always resolves true: a time target far in the
/// past, so any test clock has reached it.
pub fn leaf_true() -> DependencyNode {
    DependencyNode::Timedep {
        time: "19700101000000".into(),
    }
}

/// Dependency leaf that always resolves false: a time target far in the
/// future.
pub fn leaf_false() -> DependencyNode {
    DependencyNode::Timedep {
        time: "29991231000000".into(),
    }
}

pub fn leaf(value: bool) -> DependencyNode {
    if value {
        leaf_true()
    } else {
        leaf_false()
    }
}

//! # NUMA Query Limits

/// Number of node bits we hand to `get_mempolicy(2)`.
///
/// The kernel rejects masks shorter than its `nr_node_ids` with `EINVAL`; this
/// matches the largest `CONFIG_NODES_SHIFT` (10) distribution kernels ship.
pub const MAX_NUMA_NODES: usize = 1024;

/// Value sysfs reports for a device without NUMA affinity.
pub const NO_NUMA_NODE: i32 = -1;

const _: () = {
    assert!(MAX_NUMA_NODES.is_multiple_of(u64::BITS as usize));
};

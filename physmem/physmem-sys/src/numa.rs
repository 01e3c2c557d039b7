//! # NUMA Topology Queries
//!
//! Two pass-through queries against the kernel's NUMA bookkeeping:
//!
//! * [`memory_policy`] - `get_mempolicy(2)` for the calling thread, yielding a
//!   [`PolicyMode`] and the node set it applies to (if any).
//! * [`current_cpu`] - `getcpu(2)`, the CPU and node the calling thread is
//!   running on right now.
//!
//! plus [`address_node`], which asks which node backs a given virtual address
//! (`MPOL_F_NODE | MPOL_F_ADDR`). The allocator combines the last two to keep
//! DMA buffers on the node of the thread that will poll them.
//!
//! Every answer is a snapshot: the scheduler may migrate the thread right
//! after [`current_cpu`] returns.

use physmem_addresses::VirtualAddress;
use physmem_info::numa::MAX_NUMA_NODES;
use std::io;

const MPOL_F_NODE: libc::c_ulong = 1 << 0;
const MPOL_F_ADDR: libc::c_ulong = 1 << 1;

// Mode flags the kernel ORs into the reported mode (`MPOL_MODE_FLAGS`).
const MPOL_F_NUMA_BALANCING: i32 = 1 << 13;
const MPOL_F_RELATIVE_NODES: i32 = 1 << 14;
const MPOL_F_STATIC_NODES: i32 = 1 << 15;
const MPOL_MODE_FLAGS: i32 = MPOL_F_NUMA_BALANCING | MPOL_F_RELATIVE_NODES | MPOL_F_STATIC_NODES;

/// Memory policy modes of `get_mempolicy(2)` (`enum mempolicy_mode`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PolicyMode {
    Default,
    Preferred,
    Bind,
    Interleave,
    Local,
    PreferredMany,
    WeightedInterleave,
}

impl TryFrom<i32> for PolicyMode {
    type Error = NumaError;

    fn try_from(mode: i32) -> Result<Self, Self::Error> {
        Ok(match mode {
            0 => Self::Default,
            1 => Self::Preferred,
            2 => Self::Bind,
            3 => Self::Interleave,
            4 => Self::Local,
            5 => Self::PreferredMany,
            6 => Self::WeightedInterleave,
            other => return Err(NumaError::UnknownPolicyMode(other)),
        })
    }
}

/// Optional mode flags of a memory policy (`numactl --preferred=+N` and
/// friends set them).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct PolicyFlags {
    /// `MPOL_F_STATIC_NODES`: the node set is not remapped on cpuset changes.
    pub static_nodes: bool,
    /// `MPOL_F_RELATIVE_NODES`: node ids are relative to the allowed set.
    pub relative_nodes: bool,
    /// `MPOL_F_NUMA_BALANCING`: automatic NUMA balancing applies.
    pub numa_balancing: bool,
}

/// Splits the raw mode of `get_mempolicy(2)` into the mode and its flags.
///
/// # Errors
/// [`NumaError::UnknownPolicyMode`] with the raw value if the mode, or any
/// bit outside the known flags, is not understood.
pub fn decode_policy_mode(raw: i32) -> Result<(PolicyMode, PolicyFlags), NumaError> {
    let mode = PolicyMode::try_from(raw & !MPOL_MODE_FLAGS)
        .map_err(|_| NumaError::UnknownPolicyMode(raw))?;
    let flags = PolicyFlags {
        static_nodes: raw & MPOL_F_STATIC_NODES != 0,
        relative_nodes: raw & MPOL_F_RELATIVE_NODES != 0,
        numa_balancing: raw & MPOL_F_NUMA_BALANCING != 0,
    };
    Ok((mode, flags))
}

/// A set of NUMA node ids, as filled in by the kernel.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NodeMask {
    words: Vec<u64>,
}

impl NodeMask {
    #[must_use]
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    #[must_use]
    pub fn contains(&self, node: u32) -> bool {
        let word = node as usize / 64;
        self.words
            .get(word)
            .is_some_and(|w| w & (1 << (node % 64)) != 0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// The node ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64).filter(move |bit| word & (1 << bit) != 0).map(move |bit| {
                // `words` never exceeds MAX_NUMA_NODES / 64 entries.
                u32::try_from(i * 64).unwrap_or(u32::MAX) + bit
            })
        })
    }
}

impl core::fmt::Debug for NodeMask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// The calling thread's memory policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPolicy {
    pub mode: PolicyMode,
    pub flags: PolicyFlags,
    /// `None` for policies that carry no node set (`MPOL_DEFAULT`, `MPOL_LOCAL`).
    pub nodes: Option<NodeMask>,
}

/// Where the calling thread is executing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CpuLocation {
    pub cpu: u32,
    pub node: u32,
}

/// Reads the calling thread's memory policy.
///
/// # Errors
/// [`NumaError::Syscall`] if `get_mempolicy(2)` fails (e.g. `ENOSYS` on
/// kernels built without NUMA), [`NumaError::UnknownPolicyMode`] for a mode
/// or mode flag newer than this crate.
pub fn memory_policy() -> Result<MemoryPolicy, NumaError> {
    let mut mode: libc::c_int = -1;
    let mut words = vec![0_u64; MAX_NUMA_NODES / 64];
    // SAFETY: `mode` and `words` are valid for writes; `maxnode` matches the
    // buffer size in bits.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_get_mempolicy,
            &raw mut mode,
            words.as_mut_ptr(),
            MAX_NUMA_NODES as libc::c_ulong,
            core::ptr::null_mut::<libc::c_void>(),
            0 as libc::c_ulong,
        )
    };
    if rc != 0 {
        return Err(syscall_error("get_mempolicy"));
    }

    let (mode, flags) = decode_policy_mode(mode)?;
    let mask = NodeMask::from_words(words);
    let nodes = (!mask.is_empty()).then_some(mask);
    Ok(MemoryPolicy { mode, flags, nodes })
}

/// Returns the NUMA node of the memory backing `address`.
///
/// The page must be faulted in; for an untouched page the kernel reports the
/// node it *would* allocate on.
///
/// # Errors
/// [`NumaError::Syscall`] if `get_mempolicy(2)` fails, e.g. `EFAULT` when no
/// mapping covers `address`.
pub fn address_node(address: VirtualAddress) -> Result<u32, NumaError> {
    let mut node: libc::c_int = -1;
    // SAFETY: `node` is valid for writes; with MPOL_F_ADDR the kernel only
    // inspects the numeric value of `addr`, no nodemask is written.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_get_mempolicy,
            &raw mut node,
            core::ptr::null_mut::<libc::c_ulong>(),
            0 as libc::c_ulong,
            address.as_u64() as libc::c_ulong,
            MPOL_F_NODE | MPOL_F_ADDR,
        )
    };
    if rc != 0 {
        return Err(syscall_error("get_mempolicy(MPOL_F_ADDR)"));
    }
    u32::try_from(node).map_err(|_| NumaError::InvalidNode(node.to_string()))
}

/// Returns the CPU and node the calling thread currently runs on.
///
/// # Errors
/// [`NumaError::Syscall`] if `getcpu(2)` fails.
pub fn current_cpu() -> Result<CpuLocation, NumaError> {
    let mut cpu: libc::c_uint = 0;
    let mut node: libc::c_uint = 0;
    // SAFETY: both out-pointers are valid for writes; the cache argument has
    // been unused since Linux 2.6.24 and may be null.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_getcpu,
            &raw mut cpu,
            &raw mut node,
            core::ptr::null_mut::<libc::c_void>(),
        )
    };
    if rc != 0 {
        return Err(syscall_error("getcpu"));
    }
    Ok(CpuLocation { cpu, node })
}

/// Whether the calling thread currently runs on `node`.
///
/// # Errors
/// See [`current_cpu`].
pub fn is_current_node(node: u32) -> Result<bool, NumaError> {
    Ok(current_cpu()?.node == node)
}

fn syscall_error(call: &'static str) -> NumaError {
    let source = io::Error::last_os_error();
    log::debug!("{call} failed: {source}");
    NumaError::Syscall { call, source }
}

#[derive(Debug, thiserror::Error)]
pub enum NumaError {
    #[error("{call} failed")]
    Syscall {
        call: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("unknown memory policy mode {0}")]
    UnknownPolicyMode(i32),
    #[error("invalid NUMA node {0:?}")]
    InvalidNode(String),
    #[error("failed to read {path}")]
    Sysfs {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_mask_membership() {
        let mask = NodeMask::from_words(vec![0b1010, 1 << 3]);
        assert!(mask.contains(1));
        assert!(mask.contains(3));
        assert!(mask.contains(67));
        assert!(!mask.contains(0));
        assert!(!mask.contains(4096));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![1, 3, 67]);
        assert!(!mask.is_empty());
        assert!(NodeMask::from_words(vec![0; 16]).is_empty());
    }

    #[test]
    fn policy_modes_decode() {
        assert_eq!(PolicyMode::try_from(0).unwrap(), PolicyMode::Default);
        assert_eq!(PolicyMode::try_from(2).unwrap(), PolicyMode::Bind);
        assert_eq!(PolicyMode::try_from(6).unwrap(), PolicyMode::WeightedInterleave);
        assert!(matches!(
            PolicyMode::try_from(42),
            Err(NumaError::UnknownPolicyMode(42))
        ));
    }

    #[test]
    fn current_cpu_reports_a_plausible_node() {
        let here = current_cpu().expect("getcpu");
        assert!((here.node as usize) < MAX_NUMA_NODES);
    }

    #[test]
    fn mode_flags_are_split_off() {
        let (mode, flags) = decode_policy_mode(1 | MPOL_F_STATIC_NODES).unwrap();
        assert_eq!(mode, PolicyMode::Preferred);
        assert_eq!(
            flags,
            PolicyFlags {
                static_nodes: true,
                ..PolicyFlags::default()
            }
        );

        let (mode, flags) = decode_policy_mode(3 | MPOL_F_RELATIVE_NODES).unwrap();
        assert_eq!(mode, PolicyMode::Interleave);
        assert!(flags.relative_nodes && !flags.static_nodes);

        let (mode, flags) = decode_policy_mode(2 | MPOL_F_NUMA_BALANCING).unwrap();
        assert_eq!(mode, PolicyMode::Bind);
        assert!(flags.numa_balancing);

        assert!(matches!(
            decode_policy_mode(1 | 1 << 12),
            Err(NumaError::UnknownPolicyMode(0x1001))
        ));
    }

    /// `None` where the kernel or a seccomp filter refuses the NUMA syscalls.
    fn unless_refused<T>(result: Result<T, NumaError>) -> Option<T> {
        match result {
            Err(NumaError::Syscall { call, source })
                if matches!(source.raw_os_error(), Some(libc::ENOSYS | libc::EPERM)) =>
            {
                eprintln!("skipping: {call} refused ({source})");
                None
            }
            other => Some(other.unwrap()),
        }
    }

    #[test]
    fn memory_policy_of_a_fresh_thread() {
        let result = std::thread::spawn(memory_policy).join().unwrap();
        let Some(policy) = unless_refused(result) else {
            return;
        };
        assert_eq!(policy.mode, PolicyMode::Default);
        assert_eq!(policy.flags, PolicyFlags::default());
        assert_eq!(policy.nodes, None);
    }

    #[test]
    fn memory_policy_with_static_nodes_flag() {
        let result = std::thread::spawn(|| {
            let mask: libc::c_ulong = 1;
            // SAFETY: `mask` is valid for reads of `maxnode` bits; the policy
            // only affects this short-lived thread.
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_set_mempolicy,
                    1 | MPOL_F_STATIC_NODES,
                    &raw const mask,
                    libc::c_ulong::from(u64::BITS),
                )
            };
            if rc != 0 {
                return Err(syscall_error("set_mempolicy"));
            }
            memory_policy()
        })
        .join()
        .unwrap();

        let Some(policy) = unless_refused(result) else {
            return;
        };
        assert_eq!(policy.mode, PolicyMode::Preferred);
        assert!(policy.flags.static_nodes);
        assert!(!policy.flags.relative_nodes);
        assert_eq!(
            policy.nodes.map(|nodes| nodes.iter().collect::<Vec<_>>()),
            Some(vec![0])
        );
    }

    #[test]
    fn address_node_of_touched_stack_memory() {
        let value = core::hint::black_box([1_u8; 64]);
        let Some(node) = unless_refused(address_node(VirtualAddress::from_ptr(value.as_ptr())))
        else {
            return;
        };
        assert!((node as usize) < MAX_NUMA_NODES);
    }
}

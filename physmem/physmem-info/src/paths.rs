//! # Kernel Interface Paths

/// Per-process page table exposure, one 64-bit record per virtual page.
///
/// Opening it for reading is unprivileged, but the kernel zeroes the frame
/// number field unless the reader holds `CAP_SYS_ADMIN`.
pub const PAGEMAP_PATH: &str = "/proc/self/pagemap";

/// The calling process' memory mappings, one line per VMA.
pub const SELF_MAPS_PATH: &str = "/proc/self/maps";

/// Physical memory device. Mapping it requires `CAP_SYS_RAWIO` and, on most
/// distribution kernels, `CONFIG_STRICT_DEVMEM` limits it to MMIO ranges.
pub const DEV_MEM_PATH: &str = "/dev/mem";

/// Root of the PCI device tree in sysfs; devices are named `DDDD:BB:DD.F`.
pub const PCI_DEVICES_ROOT: &str = "/sys/bus/pci/devices";

/// Name of the per-device NUMA affinity attribute below [`PCI_DEVICES_ROOT`].
pub const PCI_NUMA_NODE_ATTRIBUTE: &str = "numa_node";

/// Per-size huge page pool counters, one `hugepages-<N>kB` directory per
/// supported size.
pub const HUGEPAGES_SYSFS_ROOT: &str = "/sys/kernel/mm/hugepages";

//! # PCI Device Helpers
//!
//! Locating a PCI function in sysfs (for its NUMA affinity) and, on x86,
//! reading its configuration space through configuration mechanism #1
//! (ports `0xCF8`/`0xCFC`).

use crate::numa::NumaError;
use physmem_info::numa::NO_NUMA_NODE;
use physmem_info::paths::{PCI_DEVICES_ROOT, PCI_NUMA_NODE_ATTRIBUTE};
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration address port of mechanism #1.
pub const PCI_CONFIG_ADDR: u16 = 0xCF8;
/// Configuration data port of mechanism #1.
pub const PCI_CONFIG_DATA: u16 = 0xCFC;

/// Bus/device/function of a PCI function in segment 0.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PciAddress {
    bus: u8,
    device: u8,
    function: u8,
}

impl PciAddress {
    /// Returns `None` if `device > 31` or `function > 7`.
    #[must_use]
    pub const fn new(bus: u8, device: u8, function: u8) -> Option<Self> {
        if device > 31 || function > 7 {
            return None;
        }
        Some(Self {
            bus,
            device,
            function,
        })
    }

    #[must_use]
    pub const fn bus(self) -> u8 {
        self.bus
    }

    #[must_use]
    pub const fn device(self) -> u8 {
        self.device
    }

    #[must_use]
    pub const fn function(self) -> u8 {
        self.function
    }

    /// The value to write to [`PCI_CONFIG_ADDR`] to select register `reg`.
    #[must_use]
    pub const fn config_address(self, reg: u8) -> u32 {
        0x8000_0000
            | (self.bus as u32) << 16
            | (self.device as u32) << 11
            | (self.function as u32) << 8
            | (reg as u32 & 0xFC)
    }

    /// NUMA node the device is attached to, `None` if it has no affinity.
    ///
    /// # Errors
    /// [`NumaError::Sysfs`] if the attribute cannot be read,
    /// [`NumaError::InvalidNode`] if it does not hold a node id.
    pub fn numa_node(self) -> Result<Option<u32>, NumaError> {
        self.numa_node_in(Path::new(PCI_DEVICES_ROOT))
    }

    /// As [`numa_node`](Self::numa_node), below an alternative sysfs root.
    ///
    /// # Errors
    /// See [`numa_node`](Self::numa_node).
    pub fn numa_node_in(self, root: &Path) -> Result<Option<u32>, NumaError> {
        let path: PathBuf = root.join(self.to_string()).join(PCI_NUMA_NODE_ATTRIBUTE);
        let text = std::fs::read_to_string(&path).map_err(|source| NumaError::Sysfs {
            path: path.display().to_string(),
            source,
        })?;
        let trimmed = text.trim();
        let node: i32 = trimmed
            .parse()
            .map_err(|_| NumaError::InvalidNode(trimmed.to_owned()))?;
        if node == NO_NUMA_NODE {
            return Ok(None);
        }
        u32::try_from(node)
            .map(Some)
            .map_err(|_| NumaError::InvalidNode(trimmed.to_owned()))
    }

    /// Requests the port grants [`read_config`](Self::read_config) needs.
    ///
    /// # Errors
    /// See [`request_port_access`](crate::ports::request_port_access).
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub fn request_config_access() -> Result<(), crate::ports::PortError> {
        use crate::ports::{POST_PORT, request_port_access};
        request_port_access(POST_PORT, 1)?;
        request_port_access(PCI_CONFIG_ADDR, 4)?;
        request_port_access(PCI_CONFIG_DATA, 4)
    }

    /// Reads the 32-bit configuration register containing `reg`.
    ///
    /// # Safety
    /// The thread must hold the grants of
    /// [`request_config_access`](Self::request_config_access), and no other
    /// thread or process may use configuration mechanism #1 concurrently.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[must_use]
    pub unsafe fn read_config(self, reg: u8) -> u32 {
        use crate::ports::{inl, io_delay, outl};
        unsafe {
            outl(PCI_CONFIG_ADDR, self.config_address(reg));
            io_delay();
            inl(PCI_CONFIG_DATA)
        }
    }

    /// Writes the 32-bit configuration register containing `reg`.
    ///
    /// # Safety
    /// As [`read_config`](Self::read_config); additionally `value` must be
    /// valid for the register.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub unsafe fn write_config(self, reg: u8, value: u32) {
        use crate::ports::{io_delay, outl};
        unsafe {
            outl(PCI_CONFIG_ADDR, self.config_address(reg));
            io_delay();
            outl(PCI_CONFIG_DATA, value);
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0000:{:02x}:{:02x}.{:x}",
            self.bus, self.device, self.function
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_device(root: &Path, address: PciAddress, contents: &str) {
        let dir = root.join(address.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PCI_NUMA_NODE_ATTRIBUTE), contents).unwrap();
    }

    #[test]
    fn sysfs_name_uses_hex_components() {
        let addr = PciAddress::new(0x3b, 0x1f, 7).unwrap();
        assert_eq!(addr.to_string(), "0000:3b:1f.7");
        assert!(PciAddress::new(0, 32, 0).is_none());
        assert!(PciAddress::new(0, 0, 8).is_none());
    }

    #[test]
    fn config_address_layout() {
        let addr = PciAddress::new(0x01, 0x02, 0x03).unwrap();
        assert_eq!(addr.config_address(0x10), 0x8001_1310);
        // Register offsets are dword aligned.
        assert_eq!(addr.config_address(0x13), 0x8001_1310);
    }

    #[test]
    fn numa_node_from_sysfs() {
        let root = tempfile::tempdir().unwrap();
        let local = PciAddress::new(0x5e, 0, 0).unwrap();
        let floating = PciAddress::new(0x5e, 0, 1).unwrap();
        let broken = PciAddress::new(0x5e, 0, 2).unwrap();
        fake_device(root.path(), local, "1\n");
        fake_device(root.path(), floating, "-1\n");
        fake_device(root.path(), broken, "node1\n");

        assert_eq!(local.numa_node_in(root.path()).unwrap(), Some(1));
        assert_eq!(floating.numa_node_in(root.path()).unwrap(), None);
        assert!(matches!(
            broken.numa_node_in(root.path()),
            Err(NumaError::InvalidNode(s)) if s == "node1"
        ));
        assert!(matches!(
            PciAddress::new(0x5e, 1, 0).unwrap().numa_node_in(root.path()),
            Err(NumaError::Sysfs { .. })
        ));
    }
}

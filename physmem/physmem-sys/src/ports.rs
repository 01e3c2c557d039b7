//! # x86 I/O Port Access
//!
//! Thin wrappers around the `in`/`out` instructions for devices living in the
//! legacy 16-bit I/O port space, plus [`request_port_access`] to obtain the
//! `ioperm(2)` grant a userspace process needs before touching any port.
//!
//! ## Available Operations
//!
//! * [`outb`] / [`inb`] - 8-bit transfers
//! * [`outl`] / [`inl`] - 32-bit transfers (e.g. PCI configuration mechanism #1)
//! * [`io_delay`] - a throw-away write to the POST diagnostic port
//!
//! All transfers are synchronous and unchecked: the instruction executes, or
//! the CPU raises `#GP` and the kernel delivers `SIGSEGV`.
//!
//! ```rust,no_run
//! use physmem_sys::ports::{inb, request_port_access};
//!
//! request_port_access(0x64, 1).expect("CAP_SYS_RAWIO required");
//! // Read keyboard controller status.
//! let status = unsafe { inb(0x64) };
//! # let _ = status;
//! ```

use std::io;

/// POST diagnostic port. Writes to it are ignored by hardware, which makes it
/// the traditional way to wait roughly one microsecond after an `out`.
pub const POST_PORT: u16 = 0x80;

/// Grants the calling thread access to `count` ports starting at `from`.
///
/// # Errors
/// [`PortError::AccessDenied`] if `ioperm(2)` fails: `EPERM` without
/// `CAP_SYS_RAWIO`, `EINVAL` if the range runs past port `0xFFFF`.
pub fn request_port_access(from: u16, count: u16) -> Result<(), PortError> {
    set_port_access(from, count, true)
}

/// Drops a grant obtained through [`request_port_access`].
///
/// # Errors
/// [`PortError::AccessDenied`] if `ioperm(2)` fails.
pub fn release_port_access(from: u16, count: u16) -> Result<(), PortError> {
    set_port_access(from, count, false)
}

fn set_port_access(from: u16, count: u16, turn_on: bool) -> Result<(), PortError> {
    // SAFETY: ioperm only changes the I/O permission bitmap of this thread.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_ioperm,
            libc::c_ulong::from(from),
            libc::c_ulong::from(count),
            libc::c_int::from(turn_on),
        )
    };
    if rc != 0 {
        let source = io::Error::last_os_error();
        log::debug!("ioperm({from:#X}, {count}, {turn_on}) failed: {source}");
        return Err(PortError::AccessDenied {
            from,
            count,
            source,
        });
    }
    Ok(())
}

/// Write one byte to an I/O port. Uses `out dx, al`.
///
/// # Safety
/// - **Privilege:** the thread must hold an `ioperm` grant covering `port`,
///   otherwise the process is killed with `SIGSEGV`.
/// - **Correct port:** `port` must belong to the intended device and the
///   device must be in a state that accepts `val`.
/// - **Concurrency:** multi-step register protocols must be serialized by the
///   caller; nothing here locks.
#[inline]
pub unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read one byte from an I/O port. Uses `in al, dx`.
///
/// # Safety
/// Same requirements as [`outb`]; reading some device registers has side
/// effects (e.g. acknowledging an interrupt).
#[inline]
#[must_use]
pub unsafe fn inb(port: u16) -> u8 {
    let mut v: u8;
    unsafe {
        core::arch::asm!("in al, dx", in("dx") port, out("al") v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Write a 32-bit value to an I/O port. Uses `out dx, eax`.
///
/// # Safety
/// Same requirements as [`outb`], for all four ports `port..port + 4`.
#[inline]
pub unsafe fn outl(port: u16, val: u32) {
    unsafe {
        core::arch::asm!("out dx, eax", in("dx") port, in("eax") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read a 32-bit value from an I/O port. Uses `in eax, dx`.
///
/// # Safety
/// Same requirements as [`inb`], for all four ports `port..port + 4`.
#[inline]
#[must_use]
pub unsafe fn inl(port: u16) -> u32 {
    let mut v: u32;
    unsafe {
        core::arch::asm!("in eax, dx", in("dx") port, out("eax") v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Short delay after a port write, as glibc's `outb_p` does.
///
/// # Safety
/// The thread must hold an `ioperm` grant for [`POST_PORT`].
#[inline]
pub unsafe fn io_delay() {
    unsafe { outb(POST_PORT, 0) };
}

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("no access to I/O ports {from:#X}..+{count}")]
    AccessDenied {
        from: u16,
        count: u16,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_past_the_last_port_is_invalid() {
        let Err(PortError::AccessDenied { from, count, source }) = request_port_access(0xFFFF, 2) else {
            panic!("a grant past port 0xFFFF must fail");
        };
        assert_eq!((from, count), (0xFFFF, 2));
        match source.raw_os_error() {
            // Filtered by a seccomp profile.
            Some(libc::ENOSYS | libc::EPERM) => {}
            code => assert_eq!(code, Some(libc::EINVAL)),
        }
    }
}

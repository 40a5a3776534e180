//! Access to the x86 I/O port bus.

/// Byte-wide port I/O.
pub trait PortIo: Sync {
    fn inb(&self, port: u16) -> u8;
    fn outb(&self, port: u16, value: u8);
}

/// The machine's own port bus, reached with `in`/`out`.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Ports;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(unsafe_code)]
impl PortIo for X86Ports {
    #[inline]
    fn inb(&self, port: u16) -> u8 {
        let value: u8;
        // SAFETY: a port read touches no memory; device side effects are the caller's business.
        unsafe {
            core::arch::asm!(
                "in al, dx",
                in("dx") port,
                out("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }

    #[inline]
    fn outb(&self, port: u16, value: u8) {
        // SAFETY: as for `inb`.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

//! Terminals on character major [`CHR_TTY`](crate::major::CHR_TTY).
//!
//! Minor 0 is the virtual console (screen plus keyboard), minors 1 to 127
//! are serial lines. Higher minors are reserved.
//!
//! Keyboard input reaches the console through a bounded queue: the interrupt
//! side calls [`Tty::push_input`], readers drain it. When readers fall
//! behind, the oldest keystrokes are lost.

use crate::device::DeviceNumber;
use crate::errno::{Errno, KResult};
use crate::port::PortIo;
use crate::registry::CharDriver;
use crate::ring_buffer::RingBuffer;
use kernel_sync::SpinLock;

pub const MINOR_CONSOLE: u32 = 0;
pub const MAX_SERIAL_MINOR: u32 = 127;

/// Keystrokes buffered for the console.
pub const INPUT_CAPACITY: usize = 256;

/// Output side of the terminals.
pub trait TerminalPort: Sync {
    /// Render bytes on the console, interpreting control characters.
    fn console_write(&self, bytes: &[u8]);

    /// Send bytes down serial line `line` (1 based).
    ///
    /// # Errors
    /// [`Errno::NoDev`] if the line doesn't exist.
    fn serial_write(&self, line: u8, bytes: &[u8]) -> KResult<usize>;

    /// Receive bytes from serial line `line`. Nothing by default.
    ///
    /// # Errors
    /// [`Errno::NoDev`] if the line doesn't exist.
    fn serial_read(&self, line: u8, buf: &mut [u8]) -> KResult<usize> {
        let _ = (line, buf);
        Ok(0)
    }
}

pub struct Tty<'t> {
    terminal: &'t dyn TerminalPort,
    input: SpinLock<RingBuffer<INPUT_CAPACITY>>,
}

impl<'t> Tty<'t> {
    #[must_use]
    pub const fn new(terminal: &'t dyn TerminalPort) -> Self {
        Self {
            terminal,
            input: SpinLock::new(RingBuffer::new()),
        }
    }

    /// Queue a keystroke for the console.
    pub fn push_input(&self, byte: u8) {
        self.input.lock().push(byte);
    }

    /// Keystrokes waiting to be read.
    #[must_use]
    pub fn pending_input(&self) -> usize {
        self.input.lock().len()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn serial_line(dev: DeviceNumber) -> KResult<u8> {
        match dev.minor() {
            m @ 1..=MAX_SERIAL_MINOR => Ok(m as u8),
            _ => Err(Errno::NoDev),
        }
    }
}

impl CharDriver for Tty<'_> {
    fn read(&self, dev: DeviceNumber, _pos: u64, buf: &mut [u8]) -> KResult<usize> {
        if dev.minor() == MINOR_CONSOLE {
            return Ok(self.input.lock().drain_into(buf));
        }
        self.terminal.serial_read(Self::serial_line(dev)?, buf)
    }

    fn write(&self, dev: DeviceNumber, _pos: u64, buf: &[u8]) -> KResult<usize> {
        if dev.minor() == MINOR_CONSOLE {
            self.terminal.console_write(buf);
            return Ok(buf.len());
        }
        self.terminal.serial_write(Self::serial_line(dev)?, buf)
    }
}

/// IBM PC serial lines.
const COM_PORTS: [u16; 2] = [0x3F8, 0x2F8];

/// [`TerminalPort`] for a PC: serial lines are the COM ports, console
/// output goes to a caller-supplied sink.
pub struct PcTerminal<'p, F> {
    ports: &'p dyn PortIo,
    console: F,
}

impl<'p, F: Fn(&[u8]) + Sync> PcTerminal<'p, F> {
    pub const fn new(ports: &'p dyn PortIo, console: F) -> Self {
        Self { ports, console }
    }
}

impl<F: Fn(&[u8]) + Sync> TerminalPort for PcTerminal<'_, F> {
    fn console_write(&self, bytes: &[u8]) {
        (self.console)(bytes);
    }

    fn serial_write(&self, line: u8, bytes: &[u8]) -> KResult<usize> {
        let port = COM_PORTS
            .get(usize::from(line).wrapping_sub(1))
            .copied()
            .ok_or(Errno::NoDev)?;
        for &b in bytes {
            self.ports.outb(port, b);
        }
        Ok(bytes.len())
    }
}

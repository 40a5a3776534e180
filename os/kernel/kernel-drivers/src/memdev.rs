//! Memory devices on character major [`CHR_MEMDEV`](crate::major::CHR_MEMDEV).
//!
//! | minor | device    | read                | write         |
//! |-------|-----------|---------------------|---------------|
//! | 1     | `null`    | end of file         | swallowed     |
//! | 2     | `zero`    | zeros               | swallowed     |
//! | 3     | `full`    | zeros               | `NoSpc`       |
//! | 4     | `port`    | I/O port bus        | I/O port bus  |
//! | 6     | `urandom` | pseudo-random bytes | swallowed     |

use crate::device::DeviceNumber;
use crate::errno::{Errno, KResult};
use crate::port::PortIo;
use crate::registry::CharDriver;
use kernel_sync::SpinLock;

pub const MINOR_NULL: u32 = 1;
pub const MINOR_ZERO: u32 = 2;
pub const MINOR_FULL: u32 = 3;
pub const MINOR_PORT: u32 = 4;
pub const MINOR_URANDOM: u32 = 6;

const URANDOM_SEED: u32 = 62521;
const LAST_PORT: u64 = 0xFFFF;

pub struct MemDevices<'p> {
    ports: &'p dyn PortIo,
    seed: SpinLock<u32>,
}

impl<'p> MemDevices<'p> {
    #[must_use]
    pub const fn new(ports: &'p dyn PortIo) -> Self {
        Self {
            ports,
            seed: SpinLock::new(URANDOM_SEED),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn urandom(&self, buf: &mut [u8]) -> usize {
        let mut seed = self.seed.lock();
        for b in buf.iter_mut() {
            *seed = (9735 * *seed + 13997) % 19468;
            *b = *seed as u8;
        }
        buf.len()
    }

    /// Number of ports from `pos` that a transfer of `n` bytes may touch.
    fn port_span(pos: u64, n: usize) -> KResult<usize> {
        if pos > LAST_PORT {
            return Err(Errno::Fault);
        }
        let room = usize::try_from(LAST_PORT - pos + 1).map_err(|_| Errno::Fault)?;
        Ok(room.min(n))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn port_read(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        let n = Self::port_span(pos, buf.len())?;
        let first = pos as u16;
        for (i, b) in buf[..n].iter_mut().enumerate() {
            *b = self.ports.inb(first.wrapping_add(i as u16));
        }
        Ok(n)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn port_write(&self, pos: u64, buf: &[u8]) -> KResult<usize> {
        let n = Self::port_span(pos, buf.len())?;
        let first = pos as u16;
        for (i, &b) in buf[..n].iter().enumerate() {
            self.ports.outb(first.wrapping_add(i as u16), b);
        }
        Ok(n)
    }
}

impl CharDriver for MemDevices<'_> {
    fn read(&self, dev: DeviceNumber, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        match dev.minor() {
            MINOR_NULL => Ok(0),
            MINOR_ZERO | MINOR_FULL => {
                buf.fill(0);
                Ok(buf.len())
            }
            MINOR_PORT => self.port_read(pos, buf),
            MINOR_URANDOM => Ok(self.urandom(buf)),
            _ => Err(Errno::NoDev),
        }
    }

    fn write(&self, dev: DeviceNumber, pos: u64, buf: &[u8]) -> KResult<usize> {
        match dev.minor() {
            MINOR_NULL | MINOR_ZERO | MINOR_URANDOM => Ok(buf.len()),
            MINOR_FULL => Err(Errno::NoSpc),
            MINOR_PORT => self.port_write(pos, buf),
            _ => Err(Errno::NoDev),
        }
    }
}

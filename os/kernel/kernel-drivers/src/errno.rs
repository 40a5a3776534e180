//! Error numbers returned by drivers and filesystems.

/// Failure of a device or filesystem operation.
///
/// At a C-style boundary the error travels as the negative of its number,
/// see [`Errno::code`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
#[repr(i32)]
pub enum Errno {
    #[error("permission denied")]
    Acces = 2,
    #[error("file exists")]
    Exist = 3,
    #[error("file too large")]
    FBig = 4,
    #[error("operation not permitted")]
    Perm = 5,
    #[error("bad address")]
    Fault = 6,
    #[error("no space left on device")]
    NoSpc = 7,
    #[error("is a directory")]
    IsDir = 8,
    #[error("not a directory")]
    NotDir = 9,
    #[error("no such device")]
    NoDev = 10,
}

impl Errno {
    /// Positive error number.
    #[must_use]
    pub const fn number(self) -> i32 {
        self as i32
    }

    /// Negative return code, as a driver call would report it.
    #[must_use]
    pub const fn code(self) -> i32 {
        -(self as i32)
    }

    /// Inverse of [`number`](Self::number).
    #[must_use]
    pub const fn from_number(n: i32) -> Option<Self> {
        Some(match n {
            2 => Self::Acces,
            3 => Self::Exist,
            4 => Self::FBig,
            5 => Self::Perm,
            6 => Self::Fault,
            7 => Self::NoSpc,
            8 => Self::IsDir,
            9 => Self::NotDir,
            10 => Self::NoDev,
            _ => return None,
        })
    }
}

/// Result of a driver or filesystem call.
pub type KResult<T> = Result<T, Errno>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_numbers() {
        assert_eq!(Errno::Acces.code(), -2);
        assert_eq!(Errno::NoDev.code(), -10);
        assert_eq!(Errno::IsDir.number(), 8);
    }

    #[test]
    fn numbers_round_trip() {
        for n in 2..=10 {
            assert_eq!(Errno::from_number(n).map(Errno::number), Some(n));
        }
        assert_eq!(Errno::from_number(1), None);
        assert_eq!(Errno::from_number(11), None);
    }
}

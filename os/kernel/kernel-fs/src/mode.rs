use bitfield_struct::bitfield;
use core::fmt;

/// Kind of an inode, stored in bits 9..=11 of a [`Mode`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum FileType {
    Regular = 1,
    Directory = 2,
    BlockDevice = 3,
    CharDevice = 4,
    Fifo = 5,
    Symlink = 6,
    Socket = 7,
}

impl FileType {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            1 => Self::Regular,
            2 => Self::Directory,
            3 => Self::BlockDevice,
            4 => Self::CharDevice,
            5 => Self::Fifo,
            6 => Self::Symlink,
            7 => Self::Socket,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    /// `ls -l` style type character.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Regular => '-',
            Self::Directory => 'd',
            Self::BlockDevice => 'b',
            Self::CharDevice => 'c',
            Self::Fifo => 'p',
            Self::Symlink => 'l',
            Self::Socket => 's',
        }
    }
}

/// Inode mode word: permission bits plus file type.
///
/// | Bits   | Meaning                                   |
/// |--------|-------------------------------------------|
/// | 0..=8  | permissions (`0o777`)                     |
/// | 9..=11 | [`FileType`] (`0o1000` regular ... `0o7000` socket), 0 unknown |
///
/// ```rust
/// # use kernel_fs::{FileType, Mode};
/// let m = Mode::from(0o2755);
/// assert_eq!(m.file_type(), Some(FileType::Directory));
/// assert_eq!(m.permissions(), 0o755);
/// assert_eq!(Mode::of(FileType::Regular, 0o644).into_bits(), 0o1644);
/// ```
#[bitfield(u16)]
#[derive(PartialEq, Eq, Hash)]
pub struct Mode {
    #[bits(9)]
    perms: u16,
    #[bits(3)]
    type_bits: u8,
    #[bits(4)]
    __: u8,
}

impl Mode {
    pub const PERMS_MASK: u16 = 0o777;
    pub const TYPE_MASK: u16 = 0o7000;

    pub const REG: u16 = 0o1000;
    pub const DIR: u16 = 0o2000;
    pub const BLK: u16 = 0o3000;
    pub const CHR: u16 = 0o4000;
    pub const FIFO: u16 = 0o5000;
    pub const LNK: u16 = 0o6000;
    pub const SOCK: u16 = 0o7000;

    /// Mode of type `ty`; permission bits outside `0o777` are dropped.
    #[must_use]
    pub const fn of(ty: FileType, perms: u16) -> Self {
        Self::new()
            .with_perms(perms & Self::PERMS_MASK)
            .with_type_bits(ty.into_bits())
    }

    /// `None` if the type bits are zero.
    #[must_use]
    pub const fn file_type(&self) -> Option<FileType> {
        FileType::from_bits(self.type_bits())
    }

    #[must_use]
    pub const fn permissions(&self) -> u16 {
        self.perms()
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.file_type(), Some(FileType::Directory))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.file_type().map_or('?', FileType::as_char);
        write!(f, "{ty}")?;
        for shift in [6, 3, 0] {
            let p = (self.perms() >> shift) & 0o7;
            let r = if p & 0o4 != 0 { 'r' } else { '-' };
            let w = if p & 0o2 != 0 { 'w' } else { '-' };
            let x = if p & 0o1 != 0 { 'x' } else { '-' };
            write!(f, "{r}{w}{x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_constants_match_the_bitfield() {
        assert_eq!(Mode::of(FileType::Regular, 0).into_bits(), Mode::REG);
        assert_eq!(Mode::of(FileType::Directory, 0).into_bits(), Mode::DIR);
        assert_eq!(Mode::of(FileType::BlockDevice, 0).into_bits(), Mode::BLK);
        assert_eq!(Mode::of(FileType::CharDevice, 0).into_bits(), Mode::CHR);
        assert_eq!(Mode::of(FileType::Fifo, 0).into_bits(), Mode::FIFO);
        assert_eq!(Mode::of(FileType::Symlink, 0).into_bits(), Mode::LNK);
        assert_eq!(Mode::of(FileType::Socket, 0).into_bits(), Mode::SOCK);
    }

    #[test]
    fn unknown_type_bits() {
        let m = Mode::from(0o644);
        assert_eq!(m.file_type(), None);
        assert_eq!(m.permissions(), 0o644);
    }

    #[test]
    fn permissions_are_masked() {
        assert_eq!(Mode::of(FileType::Regular, 0o7777).permissions(), 0o777);
    }

    #[test]
    fn display_like_ls() {
        assert_eq!(Mode::of(FileType::Directory, 0o755).to_string(), "drwxr-xr-x");
        assert_eq!(Mode::of(FileType::CharDevice, 0o620).to_string(), "crw--w----");
        assert_eq!(Mode::from(0o400).to_string(), "?r--------");
    }
}

//! File-type and permission tags stored in trees and the index

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
    Symlink,
}

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum EntryMode {
    File(FileMode),
    #[default]
    Directory,
}

impl EntryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMode::File(FileMode::Regular) => "100644",
            EntryMode::File(FileMode::Executable) => "100755",
            EntryMode::File(FileMode::Symlink) => "120000",
            EntryMode::Directory => "40000",
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::File(FileMode::Regular) => 0o100644,
            EntryMode::File(FileMode::Executable) => 0o100755,
            EntryMode::File(FileMode::Symlink) => 0o120000,
            EntryMode::Directory => 0o40000,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, EntryMode::File(FileMode::Executable))
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, EntryMode::File(FileMode::Symlink))
    }

    pub fn from_octal_str(mode: &str) -> anyhow::Result<Self> {
        let mode = u32::from_str_radix(mode, 8)
            .map_err(|_| anyhow::anyhow!("Invalid entry mode {mode}"))?;

        Self::try_from(mode)
    }
}

impl TryFrom<u32> for EntryMode {
    type Error = anyhow::Error;

    fn try_from(mode: u32) -> anyhow::Result<Self> {
        match mode {
            // 100664 shows up in trees written by very old clients
            0o100644 | 0o100664 => Ok(EntryMode::File(FileMode::Regular)),
            0o100755 => Ok(EntryMode::File(FileMode::Executable)),
            0o120000 => Ok(EntryMode::File(FileMode::Symlink)),
            0o40000 => Ok(EntryMode::Directory),
            _ => Err(anyhow::anyhow!("Invalid entry mode {mode:o}")),
        }
    }
}

impl From<FileMode> for EntryMode {
    fn from(mode: FileMode) -> Self {
        EntryMode::File(mode)
    }
}

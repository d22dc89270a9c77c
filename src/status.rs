use std::fmt;

/// Outcome byte the SL030 returns after every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Succeeded,
    NoTag,
    LoginSucceeded,
    LoginFailed,
    ReadFailed,
    WriteFailed,
    UnableToReadAfterWrite,
    AddressOverflow,
    DownloadKeyFailed,
    CollisionOccurred,
    LoadKeyFailed,
    NotAuthenticated,
    NotAValueBlock,
    ChecksumError,
    /// A code the module documentation does not define
    Unrecognized(u8),
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Succeeded
    }

    pub fn code(self) -> u8 {
        match self {
            Status::Succeeded => 0x00,
            Status::NoTag => 0x01,
            Status::LoginSucceeded => 0x02,
            Status::LoginFailed => 0x03,
            Status::ReadFailed => 0x04,
            Status::WriteFailed => 0x05,
            Status::UnableToReadAfterWrite => 0x06,
            Status::AddressOverflow => 0x08,
            Status::DownloadKeyFailed => 0x09,
            Status::CollisionOccurred => 0x0a,
            Status::LoadKeyFailed => 0x0c,
            Status::NotAuthenticated => 0x0d,
            Status::NotAValueBlock => 0x0e,
            Status::ChecksumError => 0x0f,
            Status::Unrecognized(code) => code,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Status::Succeeded => "Operation succeeded",
            Status::NoTag => "No tag",
            Status::LoginSucceeded => "Login succeeded",
            Status::LoginFailed => "Login failed",
            Status::ReadFailed => "Read failed",
            Status::WriteFailed => "Write failed",
            Status::UnableToReadAfterWrite => "Unable to read after write",
            Status::AddressOverflow => "Address overflow",
            Status::DownloadKeyFailed => "Download key failed",
            Status::CollisionOccurred => "Collision occurred",
            Status::LoadKeyFailed => "Loading key failed",
            Status::NotAuthenticated => "Not authenticated",
            Status::NotAValueBlock => "Not a value block",
            Status::ChecksumError => "Checksum error",
            Status::Unrecognized(_) => "Unrecognized status",
        }
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Status::Succeeded,
            0x01 => Status::NoTag,
            0x02 => Status::LoginSucceeded,
            0x03 => Status::LoginFailed,
            0x04 => Status::ReadFailed,
            0x05 => Status::WriteFailed,
            0x06 => Status::UnableToReadAfterWrite,
            0x08 => Status::AddressOverflow,
            0x09 => Status::DownloadKeyFailed,
            0x0a => Status::CollisionOccurred,
            0x0c => Status::LoadKeyFailed,
            0x0d => Status::NotAuthenticated,
            0x0e => Status::NotAValueBlock,
            0x0f => Status::ChecksumError,
            other => Status::Unrecognized(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unrecognized(code) => write!(f, "Unrecognized status {:#04x}", code),
            other => f.write_str(other.description()),
        }
    }
}

use std::fmt;

/// Which sector key a login uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    A,
    B,
}

impl From<KeyType> for u8 {
    fn from(key_type: KeyType) -> u8 {
        match key_type {
            KeyType::A => 0xaa,
            KeyType::B => 0xbb,
        }
    }
}

/// Card type reported by a select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    Mifare1k4ByteUid,
    Mifare1k7ByteUid,
    MifareUltralight,
    Mifare4k4ByteUid,
    Mifare4k7ByteUid,
    MifareDesfire,
    Other,
    Unknown(u8),
}

impl CardType {
    /// UID length this card type must report, if the type fixes one
    pub fn uid_len(self) -> Option<usize> {
        match self {
            CardType::Mifare1k4ByteUid | CardType::Mifare4k4ByteUid => Some(4),
            CardType::Mifare1k7ByteUid
            | CardType::MifareUltralight
            | CardType::Mifare4k7ByteUid
            | CardType::MifareDesfire => Some(7),
            CardType::Other | CardType::Unknown(_) => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            CardType::Mifare1k4ByteUid => 0x01,
            CardType::Mifare1k7ByteUid => 0x02,
            CardType::MifareUltralight => 0x03,
            CardType::Mifare4k4ByteUid => 0x04,
            CardType::Mifare4k7ByteUid => 0x05,
            CardType::MifareDesfire => 0x06,
            CardType::Other => 0x0a,
            CardType::Unknown(code) => code,
        }
    }
}

impl From<u8> for CardType {
    fn from(code: u8) -> Self {
        match code {
            0x01 => CardType::Mifare1k4ByteUid,
            0x02 => CardType::Mifare1k7ByteUid,
            0x03 => CardType::MifareUltralight,
            0x04 => CardType::Mifare4k4ByteUid,
            0x05 => CardType::Mifare4k7ByteUid,
            0x06 => CardType::MifareDesfire,
            0x0a => CardType::Other,
            other => CardType::Unknown(other),
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardType::Mifare1k4ByteUid => f.write_str("mifare 1k, 4 byte UID"),
            CardType::Mifare1k7ByteUid => f.write_str("mifare 1k, 7 byte UID"),
            CardType::MifareUltralight => f.write_str("mifare UltraLight, 7 byte UID"),
            CardType::Mifare4k4ByteUid => f.write_str("mifare 4k, 4 byte UID"),
            CardType::Mifare4k7ByteUid => f.write_str("mifare 4k, 7 byte UID"),
            CardType::MifareDesfire => f.write_str("mifare DesFire, 7 byte UID"),
            CardType::Other => f.write_str("other"),
            CardType::Unknown(code) => write!(f, "unknown: {:#04x}", code),
        }
    }
}

/// UID and type of the card found by the last successful select.
///
/// Nothing tracks the card after that, so re-select before trusting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardIdentity {
    uid: Vec<u8>,
    card_type: CardType,
}

impl CardIdentity {
    pub(crate) fn new(uid: Vec<u8>, card_type: CardType) -> Self {
        CardIdentity { uid, card_type }
    }

    pub fn uid(&self) -> &[u8] {
        &self.uid
    }

    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    /// Upper case hex with no separators, e.g. `04A10C1A3B2B84`
    pub fn uid_hex(&self) -> String {
        self.uid.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uid_hex(), self.card_type)
    }
}

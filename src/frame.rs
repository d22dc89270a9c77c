//! Request and response frames exchanged with the SL030.
//!
//! Requests are `[length][command][args...]` and responses are
//! `[length][command][status][data...]`, where `length` counts every byte
//! after itself. The module always answers with a fixed size read, so bytes
//! past the declared length are padding and are never looked at.

use crate::status::Status;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("frame declares {declared} bytes but only {available} were read")]
    LengthMismatch { declared: usize, available: usize },
    #[error("frame length {0} is too short to hold a command and status")]
    FrameTooShort(usize),
    #[error("response echoes command {actual:#04x}, expected {expected:#04x}")]
    UnexpectedCommand { expected: u8, actual: u8 },
    #[error("unknown command code {0:#04x}")]
    UnknownOpcode(u8),
    #[error("{opcode:?} takes {expected} argument bytes, got {actual}")]
    Arity {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },
    #[error("{opcode:?} response carries {actual} data bytes, expected {expected}")]
    PayloadLength {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },
    #[error("UID of {actual} bytes does not match card type {card_type:#04x}")]
    UidLength { card_type: u8, actual: usize },
    #[error("bit 7 corruption on the bus, lower the I2C clock speed")]
    BusSpeedCorruption,
    #[error("unrecognized device signature {0:#04x}")]
    UnrecognizedDevice(u8),
}

/// SL030 command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SelectMifare = 0x01,
    SectorLogin = 0x02,
    ReadDataBlock = 0x03,
    WriteDataBlock = 0x04,
    ReadValueBlock = 0x05,
    InitValueBlock = 0x06,
    WriteMasterKey = 0x07,
    IncrementValue = 0x08,
    DecrementValue = 0x09,
    CopyValue = 0x0a,
    // Ultralight & NTAG203
    ReadDataPage = 0x10,
    WriteDataPage = 0x11,
    DownloadKey = 0x12,
    SectorLoginStoredKey = 0x13,
    PowerDown = 0x50,
    GetFirmware = 0xf0,
}

impl Opcode {
    /// Number of argument bytes the command takes
    pub fn arity(self) -> usize {
        match self {
            Opcode::SelectMifare | Opcode::PowerDown | Opcode::GetFirmware => 0,
            Opcode::ReadDataBlock | Opcode::ReadValueBlock | Opcode::ReadDataPage => 1,
            Opcode::CopyValue | Opcode::SectorLoginStoredKey => 2,
            Opcode::InitValueBlock
            | Opcode::IncrementValue
            | Opcode::DecrementValue
            | Opcode::WriteDataPage => 5,
            Opcode::WriteMasterKey => 7,
            Opcode::SectorLogin | Opcode::DownloadKey => 8,
            Opcode::WriteDataBlock => 17,
        }
    }

    /// Size of the read that fetches this command's response
    pub fn response_len(self) -> usize {
        match self {
            // <len> <cmd> <status> <16 data bytes>
            Opcode::ReadDataBlock | Opcode::WriteDataBlock => 19,
            Opcode::ReadDataPage => 7,
            _ => 15,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x01 => Opcode::SelectMifare,
            0x02 => Opcode::SectorLogin,
            0x03 => Opcode::ReadDataBlock,
            0x04 => Opcode::WriteDataBlock,
            0x05 => Opcode::ReadValueBlock,
            0x06 => Opcode::InitValueBlock,
            0x07 => Opcode::WriteMasterKey,
            0x08 => Opcode::IncrementValue,
            0x09 => Opcode::DecrementValue,
            0x0a => Opcode::CopyValue,
            0x10 => Opcode::ReadDataPage,
            0x11 => Opcode::WriteDataPage,
            0x12 => Opcode::DownloadKey,
            0x13 => Opcode::SectorLoginStoredKey,
            0x50 => Opcode::PowerDown,
            0xf0 => Opcode::GetFirmware,
            other => return Err(ProtocolError::UnknownOpcode(other)),
        })
    }
}

/// A command ready to be framed and sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: Opcode,
    args: Vec<u8>,
}

impl Command {
    pub fn new(opcode: Opcode, args: &[u8]) -> Result<Self, ProtocolError> {
        if args.len() != opcode.arity() {
            return Err(ProtocolError::Arity {
                opcode,
                expected: opcode.arity(),
                actual: args.len(),
            });
        }

        Ok(Command {
            opcode,
            args: args.to_vec(),
        })
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// `[args + 1][opcode][args...]`
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.args.len() + 2);

        // Arity never exceeds 17 so the length always fits
        frame.push(self.args.len() as u8 + 1);
        frame.push(self.opcode.into());
        frame.extend_from_slice(&self.args);

        frame
    }

    /// Parses a request frame, the inverse of [`Command::encode`]
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (&length, rest) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
        let length = length as usize;

        if length != rest.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: length,
                available: rest.len(),
            });
        }

        let (&code, args) = rest.split_first().ok_or(ProtocolError::FrameTooShort(length))?;

        Command::new(Opcode::try_from(code)?, args)
    }
}

/// A decoded response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub command: Opcode,
    pub status: Status,
    pub data: Vec<u8>,
}

impl Response {
    /// Decodes the response to `expected` out of a raw read buffer.
    pub fn decode(raw: &[u8], expected: Opcode) -> Result<Self, ProtocolError> {
        let (&length, rest) = raw.split_first().ok_or(ProtocolError::EmptyFrame)?;
        let length = length as usize;

        if length > rest.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: length,
                available: rest.len(),
            });
        }

        if length < 2 {
            return Err(ProtocolError::FrameTooShort(length));
        }

        let frame = &rest[..length];

        if frame[0] != u8::from(expected) {
            return Err(ProtocolError::UnexpectedCommand {
                expected: expected.into(),
                actual: frame[0],
            });
        }

        Ok(Response {
            command: expected,
            status: Status::from(frame[1]),
            data: frame[2..].to_vec(),
        })
    }

    /// Returns exactly `N` data bytes, or a payload error naming the command
    pub fn data_array<const N: usize>(&self) -> Result<[u8; N], ProtocolError> {
        self.data
            .get(..N)
            .and_then(|bytes| <[u8; N]>::try_from(bytes).ok())
            .ok_or(ProtocolError::PayloadLength {
                opcode: self.command,
                expected: N,
                actual: self.data.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_prefixes_length_and_opcode() {
        let command = Command::new(Opcode::WriteDataPage, &[6, 1, 2, 3, 4]).unwrap();

        assert_eq!(command.encode(), vec![6, 0x11, 6, 1, 2, 3, 4]);
        assert_eq!(
            Command::new(Opcode::GetFirmware, &[]).unwrap().encode(),
            vec![1, 0xf0]
        );
    }

    #[test]
    fn commands_round_trip_through_the_codec() {
        let key = [0xffu8; 6];
        let mut login = vec![4, 0xaa];
        login.extend_from_slice(&key);
        let mut block = vec![1];
        block.extend_from_slice(&[0x5a; 16]);

        for (opcode, args) in [
            (Opcode::SelectMifare, vec![]),
            (Opcode::SectorLogin, login),
            (Opcode::WriteDataBlock, block),
            (Opcode::CopyValue, vec![4, 5]),
            (Opcode::ReadDataPage, vec![7]),
            (Opcode::GetFirmware, vec![]),
        ] {
            let command = Command::new(opcode, &args).unwrap();
            let decoded = Command::decode(&command.encode()).unwrap();

            assert_eq!(decoded.opcode(), opcode);
            assert_eq!(decoded.args(), &args[..]);
        }
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert_eq!(
            Command::new(Opcode::ReadDataPage, &[1, 2]),
            Err(ProtocolError::Arity {
                opcode: Opcode::ReadDataPage,
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(
            Command::decode(&[3, 0x10, 1]),
            Err(ProtocolError::LengthMismatch {
                declared: 3,
                available: 2
            })
        );
        assert_eq!(
            Command::decode(&[1, 0x99]),
            Err(ProtocolError::UnknownOpcode(0x99))
        );
    }

    #[test]
    fn response_ignores_bytes_past_declared_length() {
        let raw = [6, 0x10, 0x00, 0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 0xff];
        let response = Response::decode(&raw, Opcode::ReadDataPage).unwrap();

        assert_eq!(response.status, Status::Succeeded);
        assert_eq!(response.data, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(response.data_array::<4>().unwrap(), [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn response_longer_than_buffer_is_rejected() {
        let raw = [9, 0x10, 0x00, 1, 2];

        assert_eq!(
            Response::decode(&raw, Opcode::ReadDataPage),
            Err(ProtocolError::LengthMismatch {
                declared: 9,
                available: 4
            })
        );
        assert_eq!(
            Response::decode(&[1, 0x10], Opcode::ReadDataPage),
            Err(ProtocolError::FrameTooShort(1))
        );
        assert_eq!(
            Response::decode(&[], Opcode::ReadDataPage),
            Err(ProtocolError::EmptyFrame)
        );
    }

    #[test]
    fn response_must_echo_the_command() {
        assert_eq!(
            Response::decode(&[2, 0x03, 0x00], Opcode::ReadDataPage),
            Err(ProtocolError::UnexpectedCommand {
                expected: 0x10,
                actual: 0x03
            })
        );
    }

    #[test]
    fn block_responses_fit_their_read() {
        let mut echo = vec![0x04u8, 0x00];
        echo.extend_from_slice(&[0x5a; 16]);

        for opcode in [Opcode::ReadDataBlock, Opcode::WriteDataBlock] {
            // declared length plus the length byte itself
            assert_eq!(opcode.response_len(), 16 + 3);
        }

        let mut raw = vec![echo.len() as u8];
        raw.extend_from_slice(&echo);
        raw.resize(Opcode::WriteDataBlock.response_len(), 0xff);

        let response = Response::decode(&raw, Opcode::WriteDataBlock).unwrap();

        assert_eq!(response.data_array::<16>().unwrap(), [0x5a; 16]);
    }

    #[test]
    fn short_payload_is_a_protocol_error() {
        let response = Response::decode(&[4, 0x03, 0x00, 1, 2], Opcode::ReadDataBlock).unwrap();

        assert_eq!(
            response.data_array::<16>(),
            Err(ProtocolError::PayloadLength {
                opcode: Opcode::ReadDataBlock,
                expected: 16,
                actual: 2
            })
        );
    }
}

//! In-memory SL030 used by the unit tests.

use crate::bus::BusTransport;
use crate::frame::{Command, Opcode};
use std::collections::VecDeque;
use thiserror::Error;

pub(crate) const DEFAULT_KEY: [u8; 6] = [0xff; 6];

const PAGE_COUNT: usize = 42;
const BLOCK_COUNT: usize = 64;

#[derive(Debug, Error)]
pub(crate) enum SimError {
    #[error("no device acknowledged address {0:#04x}")]
    Nack(u8),
    #[error("read with no pending response")]
    NoResponse,
    #[error("injected bus failure")]
    Injected,
}

pub(crate) struct SimulatedSl030 {
    pub address: u8,
    pub present: bool,
    pub uid: Vec<u8>,
    pub card_type: u8,
    pub firmware: Vec<u8>,
    pub pages: Vec<[u8; 4]>,
    pub blocks: Vec<[u8; 16]>,
    /// Raw responses served ahead of the emulated ones
    pub scripted: VecDeque<Vec<u8>>,
    /// Every frame written, in order
    pub writes: Vec<Vec<u8>>,
    pub fail_writes: bool,
    pub failing_pages: Vec<u8>,
    authenticated_sector: Option<u8>,
    stored_keys: Vec<(u8, u8)>,
    pending: Option<Vec<u8>>,
}

impl SimulatedSl030 {
    pub fn new() -> SimulatedSl030 {
        SimulatedSl030 {
            address: 0x50,
            present: true,
            uid: vec![0x04, 0xa1, 0x0c, 0x1a, 0x3b, 0x2b, 0x84],
            card_type: 0x03,
            firmware: b"SL030-1.0".to_vec(),
            pages: vec![[0x11; 4]; PAGE_COUNT],
            blocks: vec![[0x22; 16]; BLOCK_COUNT],
            scripted: VecDeque::new(),
            writes: Vec::new(),
            fail_writes: false,
            failing_pages: Vec::new(),
            authenticated_sector: None,
            stored_keys: Vec::new(),
            pending: None,
        }
    }

    /// Writes of a given command, as decoded request frames
    pub fn commands(&self, opcode: Opcode) -> Vec<Command> {
        self.writes
            .iter()
            .filter_map(|frame| Command::decode(frame).ok())
            .filter(|command| command.opcode() == opcode)
            .collect()
    }

    fn respond(&mut self, command: &Command) -> Vec<u8> {
        let opcode = command.opcode();
        let code = u8::from(opcode);
        let args = command.args();

        if !self.present && !matches!(opcode, Opcode::GetFirmware | Opcode::PowerDown) {
            self.authenticated_sector = None;
            return frame(code, 0x01, &[]);
        }

        match opcode {
            Opcode::GetFirmware => frame(code, 0x00, &self.firmware),
            Opcode::PowerDown | Opcode::WriteMasterKey => frame(code, 0x00, &[]),
            Opcode::SelectMifare => {
                let mut data = self.uid.clone();
                data.push(self.card_type);
                frame(code, 0x00, &data)
            }
            Opcode::SectorLogin => {
                if args[2..] == DEFAULT_KEY {
                    self.authenticated_sector = Some(args[0]);
                    frame(code, 0x02, &[])
                } else {
                    self.authenticated_sector = None;
                    frame(code, 0x03, &[])
                }
            }
            Opcode::SectorLoginStoredKey => {
                if self.stored_keys.contains(&(args[0], args[1])) {
                    self.authenticated_sector = Some(args[0]);
                    frame(code, 0x02, &[])
                } else {
                    frame(code, 0x0c, &[])
                }
            }
            Opcode::DownloadKey => {
                self.stored_keys.push((args[0], args[1]));
                frame(code, 0x00, &[])
            }
            Opcode::ReadDataBlock | Opcode::WriteDataBlock | Opcode::ReadValueBlock => {
                let block = args[0];
                if let Some(status) = self.block_access(block) {
                    return frame(code, status, &[]);
                }
                if opcode == Opcode::WriteDataBlock {
                    self.blocks[block as usize].copy_from_slice(&args[1..]);
                }
                let data = self.blocks[block as usize];
                if opcode == Opcode::ReadValueBlock {
                    frame(code, 0x00, &data[..4])
                } else {
                    frame(code, 0x00, &data)
                }
            }
            Opcode::InitValueBlock | Opcode::IncrementValue | Opcode::DecrementValue => {
                let block = args[0];
                if let Some(status) = self.block_access(block) {
                    return frame(code, status, &[]);
                }
                let current = value_of(&self.blocks[block as usize]);
                let operand = i32::from_le_bytes([args[1], args[2], args[3], args[4]]);
                let next = match opcode {
                    Opcode::IncrementValue => current.wrapping_add(operand),
                    Opcode::DecrementValue => current.wrapping_sub(operand),
                    _ => operand,
                };
                self.blocks[block as usize][..4].copy_from_slice(&next.to_le_bytes());
                frame(code, 0x00, &next.to_le_bytes())
            }
            Opcode::CopyValue => {
                let (source, destination) = (args[0], args[1]);
                if let Some(status) = self
                    .block_access(source)
                    .or_else(|| self.block_access(destination))
                {
                    return frame(code, status, &[]);
                }
                let value = self.blocks[source as usize];
                self.blocks[destination as usize][..4].copy_from_slice(&value[..4]);
                frame(code, 0x00, &value[..4])
            }
            Opcode::ReadDataPage => match self.pages.get(args[0] as usize) {
                Some(page) => frame(code, 0x00, page),
                None => frame(code, 0x08, &[]),
            },
            Opcode::WriteDataPage => {
                let page = args[0];
                if self.failing_pages.contains(&page) {
                    return frame(code, 0x05, &[]);
                }
                match self.pages.get_mut(page as usize) {
                    Some(slot) => {
                        slot.copy_from_slice(&args[1..]);
                        frame(code, 0x00, &args[1..])
                    }
                    None => frame(code, 0x08, &[]),
                }
            }
        }
    }

    fn block_access(&self, block: u8) -> Option<u8> {
        if block as usize >= BLOCK_COUNT {
            Some(0x08)
        } else if self.authenticated_sector != Some(block / 4) {
            Some(0x0d)
        } else {
            None
        }
    }
}

fn value_of(block: &[u8; 16]) -> i32 {
    i32::from_le_bytes([block[0], block[1], block[2], block[3]])
}

/// `[len][cmd][status][data...]`
pub(crate) fn frame(command: u8, status: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![data.len() as u8 + 2, command, status];
    frame.extend_from_slice(data);
    frame
}

impl BusTransport for SimulatedSl030 {
    type Error = SimError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), SimError> {
        if self.fail_writes {
            return Err(SimError::Injected);
        }
        if address != self.address {
            return Err(SimError::Nack(address));
        }

        self.writes.push(bytes.to_vec());
        self.pending = Some(match Command::decode(bytes) {
            Ok(command) => self.respond(&command),
            Err(_) => frame(bytes.get(1).copied().unwrap_or(0), 0x0f, &[]),
        });

        Ok(())
    }

    fn read(&mut self, address: u8, length: usize) -> Result<Vec<u8>, SimError> {
        if address != self.address {
            return Err(SimError::Nack(address));
        }

        let mut response = match self.scripted.pop_front() {
            Some(scripted) => {
                self.pending = None;
                scripted
            }
            None => self.pending.take().ok_or(SimError::NoResponse)?,
        };

        // The module always clocks out the full read, padding with 0xff
        response.resize(length, 0xff);

        Ok(response)
    }
}

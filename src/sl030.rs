use crate::bus::BusTransport;
use crate::cancellation_token::CancellationToken;
use crate::card::{CardIdentity, CardType, KeyType};
use crate::frame::{Command, Opcode, ProtocolError, Response};
use crate::presence::{PresenceStrategy, WaitOutcome};
use crate::status::Status;
use log::{debug, warn};
use std::ops::Range;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// 7-bit I2C address the SL030 answers on
pub const DEFAULT_ADDRESS: u8 = 0x50;
// First byte of the firmware string, "SL030..."
const FIRMWARE_SIGNATURE: u8 = b'S';
// Bit 7 gets set on every byte when the I2C clock is too fast for the module
const BIT7: u8 = 0x80;
/// Ultralight pages free for application data
pub const USER_PAGES: Range<u8> = 6..40;
/// Pages covered by a card dump
pub const DUMP_PAGES: Range<u8> = 0..42;
/// Blocks covered by a block dump
pub const DUMP_BLOCKS: Range<u8> = 0..10;
/// Bytes [`Sl030::write_string`] can store, four per user page
pub const STRING_CAPACITY: usize = (USER_PAGES.end - USER_PAGES.start) as usize * 4;

#[derive(Debug, Error)]
pub enum Error<E> {
    #[error("bus transport failed: {0}")]
    Transport(#[source] E),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{0}")]
    Status(Status),
    #[error("{length} bytes will not fit in the {capacity} bytes available on the card")]
    Capacity { length: usize, capacity: usize },
    #[error("writing page {page} failed: {status}")]
    PageWrite { page: u8, status: Status },
}

impl<E> Error<E> {
    /// Status failures are an answer from the card, not a broken bus
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Status(_) | Error::PageWrite { .. })
    }

    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Status(status) | Error::PageWrite { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sl030Config {
    pub address: u8,
    /// Wait between writing a command and reading its response
    pub settle_delay: Duration,
    pub tag_poll_interval: Duration,
    pub no_tag_poll_interval: Duration,
}

impl Default for Sl030Config {
    fn default() -> Self {
        Sl030Config {
            address: DEFAULT_ADDRESS,
            settle_delay: Duration::from_millis(50),
            tag_poll_interval: Duration::from_millis(10),
            no_tag_poll_interval: Duration::from_millis(500),
        }
    }
}

/// Result of reading one page or block during a dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dump<const N: usize> {
    pub index: u8,
    pub outcome: Result<[u8; N], Status>,
}

pub type PageDump = Dump<4>;
pub type BlockDump = Dump<16>;

pub struct Sl030<B> {
    bus: B,
    presence: PresenceStrategy,
    config: Sl030Config,
    card: Option<CardIdentity>,
}

impl<B> Sl030<B>
where
    B: BusTransport,
{
    pub fn new(bus: B, presence: PresenceStrategy, config: Sl030Config) -> Sl030<B> {
        Sl030 {
            bus,
            presence,
            config,
            card: None,
        }
    }

    pub fn config(&self) -> &Sl030Config {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// The card found by the most recent select, if it succeeded
    pub fn card(&self) -> Option<&CardIdentity> {
        self.card.as_ref()
    }

    // Write the request, wait for the module to settle, then read back its
    // fixed size response
    fn exchange(&mut self, opcode: Opcode, args: &[u8]) -> Result<Vec<u8>, Error<B::Error>> {
        let frame = Command::new(opcode, args)?.encode();

        debug!("{:?} request {:02x?}", opcode, frame);

        self.bus
            .exchange(
                self.config.address,
                &frame,
                self.config.settle_delay,
                opcode.response_len(),
            )
            .map_err(Error::Transport)
    }

    fn decode(opcode: Opcode, raw: &[u8]) -> Result<Response, Error<B::Error>> {
        let response = Response::decode(raw, opcode).map_err(|err| {
            warn!("{:?} response {:02x?} rejected: {}", opcode, raw, err);
            err
        })?;

        debug!("{:?} status {}, data {:02x?}", opcode, response.status, response.data);

        Ok(response)
    }

    fn transact(&mut self, opcode: Opcode, args: &[u8]) -> Result<Response, Error<B::Error>> {
        let raw = self.exchange(opcode, args)?;

        Self::decode(opcode, &raw)
    }

    // Transact and insist on a succeeded status
    fn execute(&mut self, opcode: Opcode, args: &[u8]) -> Result<Response, Error<B::Error>> {
        let response = self.transact(opcode, args)?;

        if response.status.is_success() {
            Ok(response)
        } else {
            Err(Error::Status(response.status))
        }
    }

    pub fn get_firmware(&mut self) -> Result<String, Error<B::Error>> {
        let raw = self.exchange(Opcode::GetFirmware, &[])?;

        // A fast clock sets bit 7 on the length byte too, so look for the
        // corrupted signature before the frame is decoded
        // <len> <cmd> <status> <signature...>
        if raw.get(3) == Some(&(FIRMWARE_SIGNATURE | BIT7)) {
            warn!("firmware response {:02x?} has bit 7 set", raw);
            return Err(ProtocolError::BusSpeedCorruption.into());
        }

        let response = Self::decode(Opcode::GetFirmware, &raw)?;

        match response.data.first() {
            Some(&FIRMWARE_SIGNATURE) => {}
            Some(&byte) => return Err(ProtocolError::UnrecognizedDevice(byte).into()),
            None => {
                return Err(ProtocolError::PayloadLength {
                    opcode: Opcode::GetFirmware,
                    expected: 1,
                    actual: 0,
                }
                .into())
            }
        }

        Ok(String::from_utf8_lossy(&response.data)
            .trim_end_matches('\0')
            .to_string())
    }

    /// Selects the card in the field and remembers its identity.
    ///
    /// The remembered identity is dropped first, so any failure leaves the
    /// driver with no card.
    pub fn select_card(&mut self) -> Result<CardIdentity, Error<B::Error>> {
        self.card = None;

        let response = self.execute(Opcode::SelectMifare, &[])?;

        // <uid...> <type>
        let (&type_code, uid) =
            response
                .data
                .split_last()
                .ok_or(ProtocolError::PayloadLength {
                    opcode: Opcode::SelectMifare,
                    expected: 5,
                    actual: 0,
                })?;
        let card_type = CardType::from(type_code);

        let uid_ok = match card_type.uid_len() {
            Some(len) => uid.len() == len,
            None => uid.len() == 4 || uid.len() == 7,
        };

        if !uid_ok {
            return Err(ProtocolError::UidLength {
                card_type: card_type.code(),
                actual: uid.len(),
            }
            .into());
        }

        let identity = CardIdentity::new(uid.to_vec(), card_type);

        self.card = Some(identity.clone());

        Ok(identity)
    }

    pub fn tag_present(&mut self) -> Result<bool, Error<B::Error>> {
        if let PresenceStrategy::Gpio(pin) = &mut self.presence {
            return Ok(pin.is_low());
        }

        match self.select_card() {
            Ok(_) => Ok(true),
            Err(Error::Status(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Blocks until a tag is in range or `token` is canceled
    pub fn wait_for_tag(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<WaitOutcome, Error<B::Error>> {
        let interval = self.config.tag_poll_interval;

        self.wait_for(true, interval, token)
    }

    /// Blocks until no tag is in range or `token` is canceled
    pub fn wait_for_no_tag(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<WaitOutcome, Error<B::Error>> {
        let interval = self.config.no_tag_poll_interval;

        self.wait_for(false, interval, token)
    }

    fn wait_for(
        &mut self,
        present: bool,
        interval: Duration,
        token: Option<&CancellationToken>,
    ) -> Result<WaitOutcome, Error<B::Error>> {
        loop {
            if self.tag_present()? == present {
                return Ok(WaitOutcome::Reached);
            }

            if token.map_or(false, CancellationToken::is_canceled) {
                return Ok(WaitOutcome::Canceled);
            }

            thread::sleep(interval);
        }
    }

    /// Authenticates `sector` with an explicit key
    pub fn sector_login(
        &mut self,
        sector: u8,
        key_type: KeyType,
        key: &[u8; 6],
    ) -> Result<(), Error<B::Error>> {
        let mut args = [0u8; 8];

        args[0] = sector;
        args[1] = key_type.into();
        args[2..].copy_from_slice(key);

        let response = self.transact(Opcode::SectorLogin, &args)?;

        login_outcome(response.status)
    }

    /// Authenticates `sector` with a key previously sent by [`Sl030::download_key`]
    pub fn sector_login_stored_key(
        &mut self,
        sector: u8,
        key_type: KeyType,
    ) -> Result<(), Error<B::Error>> {
        let response = self.transact(Opcode::SectorLoginStoredKey, &[sector, key_type.into()])?;

        login_outcome(response.status)
    }

    pub fn download_key(
        &mut self,
        sector: u8,
        key_type: KeyType,
        key: &[u8; 6],
    ) -> Result<(), Error<B::Error>> {
        let mut args = [0u8; 8];

        args[0] = sector;
        args[1] = key_type.into();
        args[2..].copy_from_slice(key);

        self.execute(Opcode::DownloadKey, &args)?;

        Ok(())
    }

    /// Replaces key A of `sector` on the card
    pub fn write_master_key(&mut self, sector: u8, key: &[u8; 6]) -> Result<(), Error<B::Error>> {
        let mut args = [0u8; 7];

        args[0] = sector;
        args[1..].copy_from_slice(key);

        self.execute(Opcode::WriteMasterKey, &args)?;

        Ok(())
    }

    pub fn read_block(&mut self, block: u8) -> Result<[u8; 16], Error<B::Error>> {
        Ok(self.execute(Opcode::ReadDataBlock, &[block])?.data_array()?)
    }

    /// Writes a 16 byte data block, returning the data the module echoes
    pub fn write_block(&mut self, block: u8, data: &[u8; 16]) -> Result<[u8; 16], Error<B::Error>> {
        let mut args = [0u8; 17];

        args[0] = block;
        args[1..].copy_from_slice(data);

        Ok(self.execute(Opcode::WriteDataBlock, &args)?.data_array()?)
    }

    pub fn read_value(&mut self, block: u8) -> Result<[u8; 4], Error<B::Error>> {
        Ok(self.execute(Opcode::ReadValueBlock, &[block])?.data_array()?)
    }

    /// Formats `block` as a value block holding `value`
    pub fn init_value(&mut self, block: u8, value: [u8; 4]) -> Result<(), Error<B::Error>> {
        self.execute(Opcode::InitValueBlock, &value_args(block, value))?;

        Ok(())
    }

    /// Returns the value after the increment
    pub fn increment_value(&mut self, block: u8, value: [u8; 4]) -> Result<[u8; 4], Error<B::Error>> {
        Ok(self
            .execute(Opcode::IncrementValue, &value_args(block, value))?
            .data_array()?)
    }

    /// Returns the value after the decrement
    pub fn decrement_value(&mut self, block: u8, value: [u8; 4]) -> Result<[u8; 4], Error<B::Error>> {
        Ok(self
            .execute(Opcode::DecrementValue, &value_args(block, value))?
            .data_array()?)
    }

    pub fn copy_value(&mut self, source: u8, destination: u8) -> Result<(), Error<B::Error>> {
        self.execute(Opcode::CopyValue, &[source, destination])?;

        Ok(())
    }

    pub fn read_page(&mut self, page: u8) -> Result<[u8; 4], Error<B::Error>> {
        Ok(self.execute(Opcode::ReadDataPage, &[page])?.data_array()?)
    }

    /// Writes a 4 byte page, returning the data the module echoes
    pub fn write_page(&mut self, page: u8, data: [u8; 4]) -> Result<[u8; 4], Error<B::Error>> {
        let args = [page, data[0], data[1], data[2], data[3]];

        Ok(self.execute(Opcode::WriteDataPage, &args)?.data_array()?)
    }

    pub fn power_down(&mut self) -> Result<(), Error<B::Error>> {
        self.execute(Opcode::PowerDown, &[])?;

        Ok(())
    }

    /// Zeroes every user page. Stops at the first page that fails to write.
    pub fn format_card(&mut self) -> Result<(), Error<B::Error>> {
        for page in USER_PAGES {
            self.write_user_page(page, [0; 4])?;
        }

        Ok(())
    }

    /// Stores `text` across the user pages, space padded to fill all of them.
    ///
    /// Nothing is written when `text` is longer than [`STRING_CAPACITY`].
    /// Stops at the first page that fails to write.
    pub fn write_string(&mut self, text: &str) -> Result<(), Error<B::Error>> {
        let bytes = text.as_bytes();

        if bytes.len() > STRING_CAPACITY {
            return Err(Error::Capacity {
                length: bytes.len(),
                capacity: STRING_CAPACITY,
            });
        }

        let mut padded = bytes.to_vec();
        padded.resize(STRING_CAPACITY, b' ');

        for (page, chunk) in USER_PAGES.zip(padded.chunks_exact(4)) {
            self.write_user_page(page, [chunk[0], chunk[1], chunk[2], chunk[3]])?;
        }

        Ok(())
    }

    fn write_user_page(&mut self, page: u8, data: [u8; 4]) -> Result<(), Error<B::Error>> {
        match self.write_page(page, data) {
            Ok(_) => Ok(()),
            Err(Error::Status(status)) => {
                warn!("page {} write failed: {}", page, status);
                Err(Error::PageWrite { page, status })
            }
            Err(err) => Err(err),
        }
    }

    /// Reads every page in [`DUMP_PAGES`]
    pub fn dump_card(&mut self) -> Result<Vec<PageDump>, Error<B::Error>> {
        self.dump(DUMP_PAGES, Self::read_page)
    }

    /// Reads every block in [`DUMP_BLOCKS`]
    pub fn dump_blocks(&mut self) -> Result<Vec<BlockDump>, Error<B::Error>> {
        self.dump(DUMP_BLOCKS, Self::read_block)
    }

    // Status failures are recorded per entry, anything else ends the dump
    fn dump<const N: usize>(
        &mut self,
        range: Range<u8>,
        read: fn(&mut Self, u8) -> Result<[u8; N], Error<B::Error>>,
    ) -> Result<Vec<Dump<N>>, Error<B::Error>> {
        let mut dumps = Vec::with_capacity(range.len());

        for index in range {
            let outcome = match read(self, index) {
                Ok(data) => Ok(data),
                Err(Error::Status(status)) => Err(status),
                Err(err) => return Err(err),
            };

            dumps.push(Dump { index, outcome });
        }

        Ok(dumps)
    }
}

fn login_outcome<E>(status: Status) -> Result<(), Error<E>> {
    match status {
        Status::Succeeded | Status::LoginSucceeded => Ok(()),
        status => Err(Error::Status(status)),
    }
}

fn value_args(block: u8, value: [u8; 4]) -> [u8; 5] {
    [block, value[0], value[1], value[2], value[3]]
}

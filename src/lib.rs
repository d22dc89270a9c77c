mod bus;
mod cancellation_token;
mod card;
mod frame;
mod log_macros;
mod presence;
#[cfg(test)]
mod sim;
mod sl030;
mod status;

pub use crate::bus::{BusTransport, RppalI2cBus};
pub use crate::cancellation_token::CancellationToken;
pub use crate::card::{CardIdentity, CardType, KeyType};
pub use crate::frame::{Command, Opcode, ProtocolError, Response};
pub use crate::presence::{DetectPin, PresenceStrategy, WaitOutcome};
pub use crate::sl030::{
    BlockDump, Dump, Error, PageDump, Sl030, Sl030Config, DEFAULT_ADDRESS, DUMP_BLOCKS,
    DUMP_PAGES, STRING_CAPACITY, USER_PAGES,
};
pub use crate::status::Status;
use clap::{Args, Parser, Subcommand, ValueEnum};
use core::fmt::Arguments;
use rppal::gpio::Gpio;
use std::time::Duration;

pub trait RppalSl030Log {
    fn output(self: &Self, args: Arguments);
    fn warning(self: &Self, args: Arguments);
    fn error(self: &Self, args: Arguments);
    /// Turns colored output on or off. Loggers without color ignore it.
    fn set_color(self: &Self, _enabled: bool) {}
}

pub struct RppalSl030Tool<'a> {
    log: &'a dyn RppalSl030Log,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
#[repr(u8)]
enum BcmPin {
    Pin1 = 1,
    Pin2,
    Pin3,
    Pin4,
    Pin5,
    Pin6,
    Pin7,
    Pin8,
    Pin9,
    Pin10,
    Pin11,
    Pin12,
    Pin13,
    Pin14,
    Pin15,
    Pin16,
    Pin17,
    Pin18,
    Pin19,
    Pin20,
    Pin21,
    Pin22,
    Pin23,
    Pin24,
    Pin25,
    Pin26,
    Pin27,
}

#[derive(Copy, Clone, ValueEnum)]
enum KeyArg {
    A,
    B,
}

impl From<KeyArg> for KeyType {
    fn from(key: KeyArg) -> KeyType {
        match key {
            KeyArg::A => KeyType::A,
            KeyArg::B => KeyType::B,
        }
    }
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Disable colors in output
    #[arg(long = "no-color", short = 'n', env = "NO_CLI_COLOR")]
    no_color: bool,
    /// I2C bus the reader is attached to
    #[arg(long, default_value_t = RppalI2cBus::DEFAULT_BUS)]
    bus: u8,
    /// I2C address of the reader
    #[arg(long, short = 'a', default_value = "0x50", value_parser = parse_byte)]
    address: u8,
    /// Milliseconds to wait between a command and its response
    #[arg(long = "settle-ms", default_value_t = 50)]
    settle_ms: u64,
    /// BCM pin wired to the tag detect line. Without it presence is polled with select
    #[arg(long = "detect-pin", short = 'd')]
    detect_pin: Option<BcmPin>,
    #[command(subcommand)]
    action: Action,
}

#[derive(Args)]
struct KeyOptions {
    #[arg(long = "key-type", value_enum, default_value_t = KeyArg::A)]
    key_type: KeyArg,
    /// Six byte sector key in hex
    #[arg(long, default_value = "FFFFFFFFFFFF", value_parser = parse_hex::<6>)]
    key: [u8; 6],
}

#[derive(Subcommand)]
enum Action {
    /// Print the reader firmware version
    Firmware,
    /// Select the card in range and print its UID and type
    Select,
    /// Report cards arriving and leaving until Ctrl+C
    Watch,
    /// Log in to a sector
    Login {
        sector: u8,
        #[command(flatten)]
        auth: KeyOptions,
    },
    /// Log in to the block's sector and read it
    ReadBlock {
        block: u8,
        #[command(flatten)]
        auth: KeyOptions,
    },
    /// Log in to the block's sector and write 16 hex bytes to it
    WriteBlock {
        block: u8,
        #[arg(value_parser = parse_hex::<16>)]
        data: [u8; 16],
        #[command(flatten)]
        auth: KeyOptions,
    },
    /// Read a 4 byte page
    ReadPage { page: u8 },
    /// Write 4 hex bytes to a page
    WritePage {
        page: u8,
        #[arg(value_parser = parse_hex::<4>)]
        data: [u8; 4],
    },
    /// Zero every user page
    Format,
    /// Read every page
    Dump,
    /// Read the first blocks
    DumpBlocks,
    /// Store text across the user pages
    WriteString { text: String },
    /// Put the reader to sleep
    PowerDown,
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };

    parsed.map_err(|err| format!("'{}' is not a byte: {}", s, err))
}

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let digits: Vec<char> = s
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '-'))
        .collect();

    if digits.len() != N * 2 {
        return Err(format!("expected {} hex bytes, got '{}'", N, s));
    }

    let mut bytes = [0u8; N];

    for (byte, pair) in bytes.iter_mut().zip(digits.chunks(2)) {
        let pair: String = pair.iter().collect();

        *byte = u8::from_str_radix(&pair, 16).map_err(|_| format!("'{}' is not hex", pair))?;
    }

    Ok(bytes)
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

impl<'a> RppalSl030Tool<'a> {
    pub fn new(log: &'a dyn RppalSl030Log) -> RppalSl030Tool<'a> {
        RppalSl030Tool { log }
    }

    pub fn run(
        self: &mut Self,
        args: impl IntoIterator<Item = std::ffi::OsString>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let cli = match Cli::try_parse_from(args) {
            Ok(m) => m,
            Err(err) => {
                output!(self.log, "{}", err.to_string());
                return Ok(());
            }
        };

        self.configure_output(&cli);

        let presence = match cli.detect_pin {
            Some(pin) => PresenceStrategy::gpio(Gpio::new()?.get(pin as u8)?.into_input()),
            None => PresenceStrategy::Polling,
        };
        let config = Sl030Config {
            address: cli.address,
            settle_delay: Duration::from_millis(cli.settle_ms),
            ..Sl030Config::default()
        };
        let mut reader = Sl030::new(RppalI2cBus::new(cli.bus), presence, config);

        let token = CancellationToken::new();

        if let Action::Watch = cli.action {
            let token_clone = token.clone();

            ctrlc::set_handler(move || {
                eprintln!("Ctrl+C received, stopping...");
                token_clone.cancel();
            })?;
        }

        self.dispatch(&mut reader, cli.action, &token)
    }

    fn configure_output(&self, cli: &Cli) {
        self.log.set_color(!cli.no_color);
    }

    // Card answers such as "No tag" are reported, not treated as failures
    fn dispatch<B: BusTransport>(
        &self,
        reader: &mut Sl030<B>,
        action: Action,
        token: &CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match self.execute(reader, action, token) {
            Err(err) if err.is_recoverable() => {
                warning!(self.log, "{}", err);
                Ok(())
            }
            result => Ok(result?),
        }
    }

    fn execute<B: BusTransport>(
        &self,
        reader: &mut Sl030<B>,
        action: Action,
        token: &CancellationToken,
    ) -> Result<(), Error<B::Error>> {
        match action {
            Action::Firmware => {
                let firmware = reader.get_firmware()?;

                output!(
                    self.log,
                    "RFID reader at {:#04x} firmware: {}",
                    reader.config().address,
                    firmware
                );
            }
            Action::Select => {
                let card = reader.select_card()?;

                output!(self.log, "UID: {}", card.uid_hex());
                output!(self.log, "type: {}", card.card_type());
            }
            Action::Watch => loop {
                if reader.wait_for_tag(Some(token))? == WaitOutcome::Canceled {
                    break;
                }

                match reader.select_card() {
                    Ok(card) => output!(self.log, "card present: {}", card),
                    Err(err) if err.is_recoverable() => warning!(self.log, "{}", err),
                    Err(err) => return Err(err),
                }

                if reader.wait_for_no_tag(Some(token))? == WaitOutcome::Canceled {
                    break;
                }

                output!(self.log, "card removed");
            },
            Action::Login { sector, auth } => {
                reader.sector_login(sector, auth.key_type.into(), &auth.key)?;

                output!(self.log, "logged in to sector {}", sector);
            }
            Action::ReadBlock { block, auth } => {
                reader.sector_login(block / 4, auth.key_type.into(), &auth.key)?;
                let data = reader.read_block(block)?;

                output!(self.log, "BLOCK {} : {}", block, hex(&data));
            }
            Action::WriteBlock { block, data, auth } => {
                reader.sector_login(block / 4, auth.key_type.into(), &auth.key)?;
                let echoed = reader.write_block(block, &data)?;

                output!(self.log, "WRITE BLOCK {} : {}", block, hex(&echoed));
            }
            Action::ReadPage { page } => {
                let data = reader.read_page(page)?;

                output!(self.log, "PAGE {} : {}  {}", page, hex(&data), ascii(&data));
            }
            Action::WritePage { page, data } => {
                let echoed = reader.write_page(page, data)?;

                output!(self.log, "WRITE PAGE {} : {}", page, hex(&echoed));
            }
            Action::Format => {
                reader.format_card()?;

                output!(
                    self.log,
                    "zeroed pages {} to {}",
                    USER_PAGES.start,
                    USER_PAGES.end - 1
                );
            }
            Action::Dump => {
                for entry in reader.dump_card()? {
                    match entry.outcome {
                        Ok(data) => output!(
                            self.log,
                            "PAGE {:2} : {}  {}",
                            entry.index,
                            hex(&data),
                            ascii(&data)
                        ),
                        Err(status) => output!(self.log, "PAGE {:2} : {}", entry.index, status),
                    }
                }
            }
            Action::DumpBlocks => {
                for entry in reader.dump_blocks()? {
                    match entry.outcome {
                        Ok(data) => output!(self.log, "BLOCK {:2} : {}", entry.index, hex(&data)),
                        Err(status) => output!(self.log, "BLOCK {:2} : {}", entry.index, status),
                    }
                }
            }
            Action::WriteString { text } => {
                reader.write_string(&text)?;

                output!(self.log, "wrote {} bytes", text.len());
            }
            Action::PowerDown => {
                reader.power_down()?;

                output!(self.log, "reader powered down");
            }
        }

        Ok(())
    }
}

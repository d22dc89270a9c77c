use log::trace;
use rppal::i2c::{self, I2c};
use std::thread;
use std::time::Duration;

/// Raw byte transport to the SL030.
///
/// Both calls block. Failures are handed back unchanged, nothing here retries.
pub trait BusTransport {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes `bytes` to the device at the 7-bit `address`
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Reads `length` bytes from the device at the 7-bit `address`
    fn read(&mut self, address: u8, length: usize) -> Result<Vec<u8>, Self::Error>;

    /// Writes `request`, waits `settle` for the device to answer, then reads
    /// `length` bytes back
    fn exchange(
        &mut self,
        address: u8,
        request: &[u8],
        settle: Duration,
        length: usize,
    ) -> Result<Vec<u8>, Self::Error> {
        self.write(address, request)?;

        thread::sleep(settle);

        self.read(address, length)
    }
}

/// Raspberry Pi I2C bus.
///
/// The bus device is opened once per transaction and closed again when the
/// handle drops, so nothing is held between transactions.
pub struct RppalI2cBus {
    bus: u8,
}

impl RppalI2cBus {
    /// The SL030 hangs off bus 1 on every Pi since the model B rev 2
    pub const DEFAULT_BUS: u8 = 1;

    pub fn new(bus: u8) -> RppalI2cBus {
        RppalI2cBus { bus }
    }

    fn open(&self, address: u8) -> Result<I2c, i2c::Error> {
        let mut i2c = I2c::with_bus(self.bus)?;

        i2c.set_slave_address(address as u16)?;

        Ok(i2c)
    }
}

impl Default for RppalI2cBus {
    fn default() -> Self {
        RppalI2cBus::new(Self::DEFAULT_BUS)
    }
}

impl BusTransport for RppalI2cBus {
    type Error = i2c::Error;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        trace!("i2c-{} {:#04x} <- {:02x?}", self.bus, address, bytes);

        self.open(address)?.write(bytes)?;

        Ok(())
    }

    fn read(&mut self, address: u8, length: usize) -> Result<Vec<u8>, Self::Error> {
        read_from(&mut self.open(address)?, self.bus, address, length)
    }

    fn exchange(
        &mut self,
        address: u8,
        request: &[u8],
        settle: Duration,
        length: usize,
    ) -> Result<Vec<u8>, Self::Error> {
        trace!("i2c-{} {:#04x} <- {:02x?}", self.bus, address, request);

        let mut i2c = self.open(address)?;

        i2c.write(request)?;

        thread::sleep(settle);

        read_from(&mut i2c, self.bus, address, length)
    }
}

fn read_from(i2c: &mut I2c, bus: u8, address: u8, length: usize) -> Result<Vec<u8>, i2c::Error> {
    let mut buffer = vec![0u8; length];

    // A short read leaves the tail undefined, drop it so the frame
    // decoder sees how much actually arrived
    let count = i2c.read(&mut buffer)?;
    buffer.truncate(count);

    trace!("i2c-{} {:#04x} -> {:02x?}", bus, address, buffer);

    Ok(buffer)
}

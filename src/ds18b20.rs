use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;

use crate::{compute_crc8, Address, Device, Driver, Error, OpCode, SplitWire};

#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    ReadScratchpad = 0xBE,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Scratchpad length in bytes: raw temperature, device bytes, checksum
pub const SCRATCHPAD_BYTES: usize = 9;

/// Settling time for a default-resolution conversion, in milliseconds.
/// The sensor needs the full period regardless of caller urgency.
pub const CONVERSION_TIME_MS: u32 = 750;

/// Temperature sensor, family code 0x28, 1/16 °C per LSB at the default
/// resolution.
#[derive(Debug, Clone, Copy)]
pub struct Ds18b20 {
    address: Address,
}

impl From<Ds18b20> for Address {
    fn from(device: Ds18b20) -> Self {
        device.address
    }
}

impl Ds18b20 {
    /// Triggers a conversion on this sensor without waiting for it.
    pub fn start_conversion<W: SplitWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        driver.reset_select_write_only(delay, &self.address, &[Command::Convert.op_code()])
    }

    /// Reads the full scratchpad and validates its checksum.
    ///
    /// A mismatch bumps the session's error counter and yields no data.
    pub fn read_scratchpad<W: SplitWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<[u8; SCRATCHPAD_BYTES], Error<W::Error>> {
        let mut scratchpad = [0u8; SCRATCHPAD_BYTES];
        driver.reset_select_write_read(
            delay,
            &self.address,
            &[Command::ReadScratchpad.op_code()],
            &mut scratchpad[..],
        )?;
        let computed = compute_crc8(&scratchpad[..SCRATCHPAD_BYTES - 1]);
        let stored = scratchpad[SCRATCHPAD_BYTES - 1];
        if computed != stored {
            driver.note_crc_error();
            return Err(Error::CrcMismatch(computed, stored));
        }
        Ok(scratchpad)
    }

    /// Latest conversion result as the sensor's raw 16-bit value.
    pub fn read_temperature_raw<W: SplitWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<W::Error>> {
        let scratchpad = self.read_scratchpad(driver, delay)?;
        Ok(LittleEndian::read_u16(&scratchpad[0..2]))
    }

    /// Runs the whole addressed transaction: trigger a conversion, suspend
    /// for the fixed settling period, read back and validate the
    /// scratchpad, convert to °C.
    ///
    /// Blocks the calling context for at least
    /// [`CONVERSION_TIME_MS`]; the wire idles high during the wait.
    pub fn read_temperature<W: SplitWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<W::Error>> {
        self.start_conversion(driver, delay)?;
        delay.delay_ms(CONVERSION_TIME_MS);
        self.read_temperature_raw(driver, delay).map(raw_to_celsius)
    }
}

impl Device for Ds18b20 {
    const FAMILY_CODE: u8 = 0x28;

    fn address(&self) -> &Address {
        &self.address
    }

    unsafe fn from_address_unchecked(address: Address) -> Self {
        Self { address }
    }
}

/// Scale a raw reading to degrees Celsius (1 LSB = 1/16 °C).
pub fn raw_to_celsius(raw: u16) -> f32 {
    raw as i16 as f32 / 16_f32
}

/// Split raw u16 value to two parts: integer and fraction N
/// Original value may be calculated as: integer + fraction/10000
pub fn split_temp(temperature: u16) -> (i16, i16) {
    if temperature < 0x8000 {
        (temperature as i16 >> 4, (temperature as i16 & 0xF) * 625)
    } else {
        let abs = -(temperature as i16);
        (-(abs >> 4), -625 * (abs & 0xF))
    }
}

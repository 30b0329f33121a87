use crate::{Address, Command, Error, OpCode, SplitWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

// Slot timing in microseconds. Every slot starts with the master pulling
// the wire low; the low/high split within the slot encodes the bit.
const RESET_LOW_US: u32 = 480;
const RESET_SAMPLE_US: u32 = 70;
const RESET_TAIL_US: u32 = 410;

const WRITE_1_LOW_US: u32 = 10;
const WRITE_1_HIGH_US: u32 = 55;
const WRITE_0_LOW_US: u32 = 65;
const WRITE_0_HIGH_US: u32 = 5;

const READ_INIT_US: u32 = 3;
const READ_SAMPLE_US: u32 = 10;
const READ_TAIL_US: u32 = 53;

/// Bus session owning the split line pair.
///
/// Exactly one `Driver` exists per physical bus; all transactions are
/// serialized through it. The session starts out unarmed and every bus
/// operation fails with [`Error::NotInitialized`] until
/// [`initialize`](Driver::initialize) has run.
pub struct Driver<W: SplitWire> {
    wire: W,
    initialized: bool,
    crc_errors: u32,
}

impl<E: Debug, W: SplitWire<Error = E>> Driver<W> {
    pub fn new(wire: W) -> Self {
        Driver {
            wire,
            initialized: false,
            crc_errors: 0,
        }
    }

    /// One-time setup: drives the wire to its idle-high level and arms the
    /// session.
    pub fn initialize(&mut self) -> Result<(), Error<E>> {
        self.wire.set_high()?;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Cumulative count of scratchpad checksum failures seen by this
    /// session. Never reset.
    pub fn crc_errors(&self) -> u32 {
        self.crc_errors
    }

    /// Releases the line pair, consuming the session.
    pub fn release(self) -> W {
        self.wire
    }

    pub(crate) fn note_crc_error(&mut self) {
        self.crc_errors = self.crc_errors.saturating_add(1);
    }

    pub(crate) fn ensure_initialized(&self) -> Result<(), Error<E>> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Performs a reset and listens for a presence pulse.
    ///
    /// The single sample 70 µs after release is the only window in which
    /// presence is defined; returns [`Error::NoPresence`] when the wire
    /// stayed high there.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        self.set_low()?;
        delay.delay_us(RESET_LOW_US);
        self.set_high()?;
        delay.delay_us(RESET_SAMPLE_US);
        let presence = self.is_low()?;
        delay.delay_us(RESET_TAIL_US);
        if presence {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    /// Like [`reset`](Driver::reset), but reports absence as `Ok(false)`.
    pub fn reset_presence(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.reset(delay).map(|_| true).or_else(|error| {
            if matches!(error, Error::NoPresence) {
                Ok(false)
            } else {
                Err(error)
            }
        })
    }

    pub fn reset_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.write_bytes(delay, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    pub fn reset_select_write_only(
        &mut self,
        delay: &mut impl DelayNs,
        addr: &Address,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.select(delay, addr)?;
        self.write_bytes(delay, write)?;
        Ok(())
    }

    pub fn reset_select_write_read(
        &mut self,
        delay: &mut impl DelayNs,
        addr: &Address,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.select(delay, addr)?;
        self.write_bytes(delay, write)?;
        self.read_bytes(delay, read)?;
        Ok(())
    }

    /// Addresses a single device: MATCH ROM followed by the eight address
    /// bytes, family code first. All other devices drop out until the next
    /// reset.
    pub fn select(&mut self, delay: &mut impl DelayNs, addr: &Address) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        self.write_command(delay, Command::MatchRom)?;
        for i in 0..Address::BYTES {
            self.write_byte(delay, addr[i as usize])?;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), Error<E>> {
        self.ensure_initialized()?;
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    pub(crate) fn write_command(
        &mut self,
        delay: &mut impl DelayNs,
        cmd: impl OpCode,
    ) -> Result<(), E> {
        self.write_byte(delay, cmd.op_code())
    }

    pub(crate) fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(delay, (byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub(crate) fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub(crate) fn write_bit(&mut self, delay: &mut impl DelayNs, high: bool) -> Result<(), E> {
        self.set_low()?;
        delay.delay_us(if high { WRITE_1_LOW_US } else { WRITE_0_LOW_US });
        self.set_high()?;
        delay.delay_us(if high { WRITE_1_HIGH_US } else { WRITE_0_HIGH_US });
        Ok(())
    }

    pub(crate) fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        self.set_low()?;
        delay.delay_us(READ_INIT_US);
        self.set_high()?;
        delay.delay_us(READ_SAMPLE_US);
        let val = self.is_high();
        delay.delay_us(READ_TAIL_US);
        val
    }

    #[inline(always)]
    pub(crate) fn set_high(&mut self) -> Result<(), E> {
        self.wire.set_high()
    }

    #[inline(always)]
    pub(crate) fn set_low(&mut self) -> Result<(), E> {
        self.wire.set_low()
    }

    #[inline(always)]
    pub(crate) fn is_high(&mut self) -> Result<bool, E> {
        self.wire.is_high()
    }

    #[inline(always)]
    pub(crate) fn is_low(&mut self) -> Result<bool, E> {
        self.wire.is_low()
    }
}

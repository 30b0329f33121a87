use crate::{Address, Command, Driver, Error, SplitWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use heapless::Vec;

/// State carried between discovery passes.
///
/// The search walks a 64-level binary decision tree, one pass per device.
/// `rom` keeps the path taken on the previous pass so collisions below the
/// last branch point can replay it; `last_discrepancy` is the 1-based bit
/// position of the deepest branch still holding an unexplored 1-side
/// (0 = none).
#[derive(Debug, Clone, Default)]
pub struct DeviceSearch {
    rom: [u8; Address::BYTES as usize],
    last_discrepancy: u8,
    last_device: bool,
}

impl DeviceSearch {
    pub fn new() -> DeviceSearch {
        DeviceSearch::default()
    }

    /// Has the whole tree been walked?
    pub fn is_complete(&self) -> bool {
        self.last_device
    }

    fn rom_bit(&self, bit_number: u8) -> bool {
        let index = (bit_number - 1) / 8;
        let offset = (bit_number - 1) % 8;
        self.rom[index as usize] & (0x01 << offset) != 0x00
    }

    fn set_rom_bit(&mut self, bit_number: u8, value: bool) {
        let index = (bit_number - 1) / 8;
        let offset = (bit_number - 1) % 8;
        if value {
            self.rom[index as usize] |= 0x01 << offset;
        } else {
            self.rom[index as usize] &= !(0x01 << offset);
        }
    }

    pub fn into_iter<'a, W: SplitWire>(
        self,
        driver: &'a mut Driver<W>,
        delay: &'a mut impl DelayNs,
    ) -> DeviceSearchIter<'a, W, impl DelayNs> {
        DeviceSearchIter {
            search: Some(self),
            driver,
            delay,
        }
    }
}

pub struct DeviceSearchIter<'a, W: SplitWire, Delay: DelayNs> {
    search: Option<DeviceSearch>,
    driver: &'a mut Driver<W>,
    delay: &'a mut Delay,
}

impl<'a, W: SplitWire, Delay: DelayNs> Iterator for DeviceSearchIter<'a, W, Delay> {
    type Item = Result<Address, Error<W::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = self
            .driver
            .search_next(&mut search, &mut *self.delay)
            .transpose()?;
        self.search = Some(search);
        Some(result)
    }
}

impl<E: Debug, W: SplitWire<Error = E>> Driver<W> {
    /// Runs one SEARCH ROM pass, yielding at most one address.
    ///
    /// Returns `Ok(None)` when the bus is empty, every device has been
    /// enumerated, or no device answered mid-pass. A checksum failure
    /// reports [`Error::CrcMismatch`] and leaves the branch memory
    /// untouched, so the next call re-walks the same branch.
    pub fn search_next(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        self.ensure_initialized()?;
        if search.last_device {
            return Ok(None);
        }
        if !self.reset_presence(delay)? {
            return Ok(None);
        }

        self.write_command(delay, Command::SearchRom)?;

        // Deepest bit position resolved to 0 on this pass; becomes the
        // branch point to flip on the next one.
        let mut last_zero = 0;

        for bit_number in 1..=Address::BITS {
            let id_bit = self.read_bit(delay)?;
            let cmp_id_bit = self.read_bit(delay)?;

            let direction = if id_bit != cmp_id_bit {
                // only one side answered
                id_bit
            } else if id_bit {
                // (1, 1): nobody answered, the pass is void
                return Ok(None);
            } else {
                // collision: replay the previous path below the branch
                // point, flip to 1 at it, explore the 0-side above it
                let direction = if bit_number < search.last_discrepancy {
                    search.rom_bit(bit_number)
                } else {
                    bit_number == search.last_discrepancy
                };
                if !direction {
                    last_zero = bit_number;
                }
                direction
            };

            search.set_rom_bit(bit_number, direction);
            self.write_bit(delay, direction)?;
        }

        let address = Address::from(search.rom);
        address.ensure_valid()?;

        search.last_discrepancy = last_zero;
        search.last_device = last_zero == 0;
        Ok(Some(address))
    }

    /// Enumerates the bus from scratch into an ordered set of at most `CAP`
    /// addresses.
    ///
    /// Runs at most `CAP` passes; a checksum-failed pass is retried and
    /// still consumes one of them, so the call terminates even on a noisy
    /// bus. An empty outcome reports [`Error::NoDevices`].
    pub fn discover<const CAP: usize>(
        &mut self,
        delay: &mut impl DelayNs,
    ) -> Result<Vec<Address, CAP>, Error<E>> {
        self.ensure_initialized()?;

        let mut devices = Vec::new();
        let mut search = DeviceSearch::new();
        for _ in 0..CAP {
            match self.search_next(&mut search, delay) {
                Ok(Some(address)) => {
                    if devices.push(address).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(Error::CrcMismatch(..)) => continue,
                Err(error) => return Err(error),
            }
        }

        if devices.is_empty() {
            Err(Error::NoDevices)
        } else {
            Ok(devices)
        }
    }
}

use crate::{compute_crc8, Command, DeviceSearch, Driver, Error, OpCode, SplitWire};
use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};
use embedded_hal::delay::DelayNs;

/// Factory-programmed 64-bit ROM of a bus device: family code, six serial
/// bytes, CRC-8 over the first seven bytes.
#[derive(Debug, Clone, Copy, PartialOrd, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Address {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Address {
            raw: raw.to_le_bytes(),
        }
    }
}

impl From<Address> for u64 {
    fn from(addr: Address) -> u64 {
        u64::from_le_bytes(addr.raw)
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for Address {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    /// The checksum byte stored in the address itself
    pub fn crc(&self) -> u8 {
        self[Self::BYTES as usize - 1]
    }

    /// Does the stored checksum match the first seven bytes?
    pub fn is_valid(&self) -> bool {
        compute_crc8(&self[..7]) == self.crc()
    }

    pub fn ensure_valid<E: Sized + Debug>(&self) -> Result<(), Error<E>> {
        let computed = compute_crc8(&self[..7]);
        if computed != self.crc() {
            Err(Error::CrcMismatch(computed, self.crc()))
        } else {
            Ok(())
        }
    }
}

/// Error type
#[derive(Debug)]
pub enum AddressError {
    NotEnough,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    if c.is_ascii_digit() {
        Some((c as u32 - '0' as u32) as _)
    } else if ('a'..='f').contains(&c) {
        Some((c as u32 - 'a' as u32 + 10) as _)
    } else if ('A'..='F').contains(&c) {
        Some((c as u32 - 'A' as u32 + 10) as _)
    } else {
        None
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = Address::default();
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for i in 0..Self::BYTES as usize {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        addr[i] = (h << 4) | l;
                    }
                    _ => return Err(AddressError::Invalid),
                },
                _ => return Err(AddressError::NotEnough),
            }
        }

        Ok(addr)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

impl Address {
    /// Reads the ROM of the only device on the bus (READ ROM shortcut).
    ///
    /// With more than one device present the responses collide and the
    /// checksum validation fails.
    pub fn read_single<W: SplitWire>(
        &mut self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        driver.reset_write_read(delay, &[Command::ReadRom.op_code()], self.as_mut())?;
        self.ensure_valid()
    }

    pub fn get_single<W: SplitWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<W::Error>> {
        let mut address = Self::default();
        address.read_single(driver, delay)?;
        Ok(address)
    }

    pub fn search_first<W: SplitWire>(
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        family_code: u8,
    ) -> Result<Option<Self>, Error<W::Error>> {
        let mut search = DeviceSearch::new();
        while let Some(address) = driver.search_next(&mut search, delay)? {
            if family_code == address.family_code() {
                return Ok(Some(address));
            }
        }
        Ok(None)
    }
}

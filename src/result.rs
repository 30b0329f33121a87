use core::fmt::Debug;

/// Error type
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: Sized + Debug> {
    /// Bus used before [`initialize`](crate::Driver::initialize)
    NotInitialized,
    /// No presence pulse after a reset
    NoPresence,
    /// A full discovery run found no devices
    NoDevices,
    /// Computed and stored checksum disagree (computed, stored)
    CrcMismatch(u8, u8),
    /// Address belongs to a different device family (expected, found)
    FamilyCodeMismatch(u8, u8),
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

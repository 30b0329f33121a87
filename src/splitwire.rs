use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// The two unidirectional lines making up the bus: a drive line the master
/// owns exclusively and a sense line reflecting the wire level.
///
/// Unlike a shared open-drain pin, the drive line is never released to the
/// devices; reads always go through the sense line.
pub trait SplitWire {
    type Error: Error;

    /// Is the sense line high?
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    /// Is the sense line low?
    fn is_low(&mut self) -> Result<bool, Self::Error>;

    /// Drives the wire low
    fn set_low(&mut self) -> Result<(), Self::Error>;

    /// Releases the wire to its idle-high level
    ///
    /// *NOTE* devices may still hold the actual wire low, which is only
    /// observable on the sense line
    fn set_high(&mut self) -> Result<(), Self::Error>;
}

/// (sense, drive) line pair
impl<E, I, O> SplitWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }
}

/// Inverted line wrapper, for inverting driver stages (e.g. an NPN
/// transistor buffering the drive line)
pub struct Inverted<P>(pub P);

impl<I: ErrorType> ErrorType for Inverted<I> {
    type Error = I::Error;
}

impl<I> InputPin for Inverted<I>
where
    I: InputPin,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

impl<O> OutputPin for Inverted<O>
where
    O: OutputPin,
{
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }
}

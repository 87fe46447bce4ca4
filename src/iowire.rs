use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Which line transitions raise the edge interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    Falling,
    Rising,
    Any,
}

impl Edge {
    /// Does a transition to `level` (true = high) match this edge?
    pub fn matches(self, level: bool) -> bool {
        match self {
            Edge::Falling => !level,
            Edge::Rising => level,
            Edge::Any => true,
        }
    }
}

/// Control over the external interrupt line attached to the bus pin.
///
/// Implementations must drop any edge latched before `listen` so that only
/// transitions happening after the call raise the interrupt.
pub trait EdgeInterrupt {
    fn listen(&mut self, edge: Edge);

    fn unlisten(&mut self);
}

/// The bus line as seen by a slave: sample it, pull it low, let it float, and
/// choose which transitions interrupt us.
pub trait IoWire {
    type Error: Error;

    /// Is the line high?
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    /// Is the line low?
    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }

    /// Actively drives the line low
    fn pull_low(&mut self) -> Result<(), Self::Error>;

    /// Stops driving, the pull-up brings the line high unless someone else
    /// holds it low
    fn release(&mut self) -> Result<(), Self::Error>;

    fn listen(&mut self, edge: Edge) -> Result<(), Self::Error>;

    fn unlisten(&mut self) -> Result<(), Self::Error>;
}

/// Open drain pin plus its interrupt line
impl<IO, IRQ> IoWire for (IO, IRQ)
where
    IO: ErrorType + OutputPin + InputPin,
    IRQ: EdgeInterrupt,
{
    type Error = IO::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn listen(&mut self, edge: Edge) -> Result<(), Self::Error> {
        self.1.listen(edge);
        Ok(())
    }

    fn unlisten(&mut self) -> Result<(), Self::Error> {
        self.1.unlisten();
        Ok(())
    }
}

/// Split sense and drive lines (e.g. through a transistor) plus the interrupt
/// line of the sense pin
impl<E, I, O, IRQ> IoWire for (I, O, IRQ)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
    IRQ: EdgeInterrupt,
{
    type Error = E;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }

    fn listen(&mut self, edge: Edge) -> Result<(), Self::Error> {
        self.2.listen(edge);
        Ok(())
    }

    fn unlisten(&mut self) -> Result<(), Self::Error> {
        self.2.unlisten();
        Ok(())
    }
}

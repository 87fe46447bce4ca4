use core::fmt::Debug;

/// Error type
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: Sized + Debug> {
    /// Line held low longer than the maximum reset pulse (measured µs)
    ResetTooLong(u32),
    /// ROM command byte this slave does not implement
    UnknownCommand(u8),
    /// A chained bit operation could not complete
    BitTransfer,
    /// A pending write was replaced, stopped or aborted before completion
    WriteCancelled,
    /// Write does not fit the transmit buffer
    BufferOverflow,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

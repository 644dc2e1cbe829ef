//! Transport abstraction for the companion link.
//!
//! Production firmware uses the UART wired to the companion; host tests
//! and the simulator supply in-memory implementations.  The link engine is
//! generic over `Transport`, so the framing never depends on the medium.

/// Byte-oriented, non-blocking channel.
pub trait Transport {
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes.  Returns 0 when nothing is waiting.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data`.  Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Data is available for reading.
    fn available(&self) -> bool;

    /// The outbound side can take a whole frame now.
    fn tx_ready(&self) -> bool;
}

/// A transport that discards writes and never reads.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }

    fn tx_ready(&self) -> bool {
        true
    }
}

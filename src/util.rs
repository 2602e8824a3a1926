use std::io;
use std::io::ErrorKind::{UnexpectedEof, WouldBlock};

/// Maps the non-blocking socket conventions onto plain results: `WouldBlock` becomes "no data"
/// and a zero length read becomes end of stream.
pub trait NoBlock {
    type Value;

    fn no_block(self) -> io::Result<Self::Value>;
}

impl NoBlock for io::Result<usize> {
    type Value = usize;

    fn no_block(self) -> io::Result<Self::Value> {
        match self {
            Ok(0) => Err(io::Error::new(UnexpectedEof, "connection closed by peer")),
            Ok(n) => Ok(n),
            Err(err) if err.kind() == WouldBlock => Ok(0),
            Err(err) => Err(err),
        }
    }
}

use std::{error::Error, fmt};

/// Raised when a `BitReader` runs out of bits or reads a value that cannot be
/// decoded into the requested type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerdeErr;

impl fmt::Display for SerdeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bit stream could not be deserialized")
    }
}

impl Error for SerdeErr {}

//! # Weave Serde
//! Bit-packed serialization primitives shared by every weave crate.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod bit_reader;
mod bit_writer;
mod error;
mod impls;
mod integer;
mod serde;

pub use bit_reader::BitReader;
pub use bit_writer::{BitCounter, BitWrite, BitWriter};
pub use error::SerdeErr;
pub use integer::{SerdeInteger, UnsignedInteger, UnsignedVariableInteger};
pub use serde::{ConstBitLength, Serde};

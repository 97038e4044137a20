pub mod bunch;
pub mod error;
pub mod flags;
pub mod header;
pub mod payload;

pub mod control_channel;
pub mod control_config;
pub mod control_message;
pub mod error;

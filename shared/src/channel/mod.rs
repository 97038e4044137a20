pub mod channel;
pub mod channel_config;
pub mod channel_core;
pub mod error;
pub mod partial;
pub mod sender;
pub mod voice_channel;

pub mod content_block;
pub mod entity_channel;
pub mod entity_config;
pub mod entity_header;
pub mod error;
pub mod rep_keys;

pub mod ack_manager;
pub mod channel_table;
pub mod connection;
pub mod connection_config;
pub mod context;
pub mod error;
pub mod event;
pub mod packet_writer;
pub mod standard_header;

pub mod error;
pub mod host;
pub mod replication_table;
pub mod replicator;

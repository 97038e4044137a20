pub mod guid_cache;
pub mod net_guid;

use std::collections::{HashMap, HashSet};

use log::debug;

use weave_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::NetGuid;

/// Whether the object behind an exported path is usable yet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Loaded,
    Loading,
}

/// A guid and the path the peer can resolve it from, carried in a bunch's
/// export table the first time the guid is referenced on a connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuidExport {
    pub guid: NetGuid,
    pub path: String,
}

impl Serde for GuidExport {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.guid.ser(writer);
        self.path.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let guid = NetGuid::de(reader)?;
        let path = String::de(reader)?;
        Ok(Self { guid, path })
    }

    fn bit_length(&self) -> u32 {
        self.guid.bit_length() + self.path.bit_length()
    }
}

struct GuidEntry {
    path: String,
    state: LoadState,
}

/// Per-connection knowledge of which guids map to which paths, which of our
/// own have already been exported to the peer, and which of the peer's are
/// still loading
pub struct GuidCache {
    entries: HashMap<NetGuid, GuidEntry>,
    exported: HashSet<NetGuid>,
}

impl GuidCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            exported: HashSet::new(),
        }
    }

    /// Registers a guid this side can resolve locally
    pub fn register_path(&mut self, guid: NetGuid, path: &str) {
        self.entries.insert(
            guid,
            GuidEntry {
                path: path.to_string(),
                state: LoadState::Loaded,
            },
        );
    }

    pub fn path(&self, guid: &NetGuid) -> Option<&str> {
        self.entries.get(guid).map(|entry| entry.path.as_str())
    }

    /// Returns the export for `guid` if it has a path that was never sent on
    /// this connection, marking it as sent
    pub fn take_export(&mut self, guid: &NetGuid) -> Option<GuidExport> {
        if self.exported.contains(guid) {
            return None;
        }
        let entry = self.entries.get(guid)?;
        self.exported.insert(*guid);
        Some(GuidExport {
            guid: *guid,
            path: entry.path.clone(),
        })
    }

    /// Records an export received from the peer
    pub fn receive_export(&mut self, export: &GuidExport, state: LoadState) {
        if let Some(entry) = self.entries.get(&export.guid) {
            if entry.path == export.path {
                return;
            }
            debug!(
                "GuidCache: export for {:?} moved from {} to {}",
                export.guid, entry.path, export.path
            );
        }
        self.entries.insert(
            export.guid,
            GuidEntry {
                path: export.path.clone(),
                state,
            },
        );
    }

    /// Marks a loading guid as resolved. Returns false if it was unknown.
    pub fn mark_loaded(&mut self, guid: &NetGuid) -> bool {
        match self.entries.get_mut(guid) {
            Some(entry) => {
                entry.state = LoadState::Loaded;
                true
            }
            None => false,
        }
    }

    pub fn is_loading(&self, guid: &NetGuid) -> bool {
        matches!(
            self.entries.get(guid),
            Some(GuidEntry {
                state: LoadState::Loading,
                ..
            })
        )
    }

    pub fn is_registered(&self, guid: &NetGuid) -> bool {
        self.entries.contains_key(guid)
    }
}

impl Default for GuidCache {
    fn default() -> Self {
        Self::new()
    }
}

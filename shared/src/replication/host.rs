use weave_serde::{BitReader, BitWriter};

use crate::{replication::error::CodecError, LoadState, NetGuid, Payload};

/// Opaque property state a codec produced when it last encoded an object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepSnapshot(pub Vec<u8>);

/// How to announce an entity in the open bunch of its channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub class: NetGuid,
    pub stably_named: bool,
    pub spawn_params: Payload,
}

/// A live sub-object of a replicated entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubObjectInfo {
    pub guid: NetGuid,
    pub class: NetGuid,
    pub stably_named: bool,
    /// Sub-objects with a key are only encoded when the key changed since
    /// it was last sent
    pub rep_key: Option<i32>,
}

/// Encodes and applies property deltas. The wire format of a delta is
/// entirely up to the implementation.
pub trait PropertyDeltaCodec {
    /// Writes the properties of `object` that differ from `baseline` (all
    /// of them when there is none). Returns the new snapshot, or `None` if
    /// nothing differs.
    fn encode(
        &mut self,
        object: NetGuid,
        baseline: Option<&RepSnapshot>,
        writer: &mut BitWriter,
    ) -> Option<RepSnapshot>;

    /// Applies a payload produced by the peer's `encode`
    fn decode(&mut self, object: NetGuid, reader: &mut BitReader) -> Result<(), CodecError>;
}

/// Creation and destruction of objects on the receiving side
pub trait EntityLifecycle {
    /// Spawns a dynamic entity named by the peer. Returns false on failure.
    fn construct_from_network(
        &mut self,
        class: NetGuid,
        entity: NetGuid,
        spawn_params: &Payload,
    ) -> bool;

    fn construct_sub_object(&mut self, owner: NetGuid, class: NetGuid, object: NetGuid) -> bool;

    /// Finds an object both peers know by a registered path
    fn resolve_stable(&mut self, object: NetGuid) -> bool;

    fn destroy_replicated_object(&mut self, object: NetGuid);

    fn entity_dormant(&mut self, _entity: NetGuid) {}

    fn entity_woke(&mut self, _entity: NetGuid) {}

    fn replication_paused_changed(&mut self, _entity: NetGuid, _paused: bool) {}

    /// Starts loading the object behind an exported path
    fn load_path(&mut self, _guid: NetGuid, _path: &str) -> LoadState {
        LoadState::Loaded
    }
}

/// The sending side's view of what it replicates
pub trait ReplicationSource {
    /// `None` once the entity is gone, which closes its channel
    fn entity_descriptor(&self, entity: NetGuid) -> Option<EntityDescriptor>;

    fn sub_objects(&self, entity: NetGuid) -> Vec<SubObjectInfo>;

    fn is_replication_paused(&self, _entity: NetGuid) -> bool {
        false
    }
}

/// Everything a connection needs from the game world
pub trait ReplicationHost: PropertyDeltaCodec + EntityLifecycle + ReplicationSource {}

impl<T: PropertyDeltaCodec + EntityLifecycle + ReplicationSource> ReplicationHost for T {}

//! Per-client server-side mirror (spec §3 "Client state") and the per-tick
//! `update_client` interest computation (spec §4.D).
//!
//! Grounded on the teacher's `SessionManager` (`src/server/protocol.rs`):
//! one outbound `UnboundedSender<Vec<u8>>` queue per connected id, looked
//! up through a single `RwLock<HashMap<...>>` rather than one lock per
//! client. This module is the concrete realization of spec §5's "per
//! client queue fed by the simulation actor."

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::object::handler::Handler;
use crate::physics::Vec2;
use crate::replication::record::Record;
use crate::replication::wire;
use crate::sim::{DirtySnapshots, Replicator};

pub type ClientId = u64;

/// Server-side mirror of one connected client (spec §3 "Client state").
#[derive(Debug, Clone)]
pub struct ClientState {
    pub camera_position: Vec2,
    pub camera_size: Vec2,
    pub camera_rotation: f64,
    pub window_size: (u32, u32),
    pub mouse_window_position: Vec2,
    pub mouse_wheel_delta: f64,
    pub active_symbols: HashSet<String>,

    /// Multiplier of camera diagonal used for loading/unloading (spec §6
    /// `object_sending_range`; named `send_range` here, see Design Notes
    /// §9 open question on the source's mismatched config key).
    pub send_range: f64,
    pub unload_timeout: f64,

    /// Ids this client has received a SPAWN for without a matching REMOVE
    /// or UNLOAD_ACK since (spec §8 property 4).
    pub loaded: HashSet<i64>,
}

impl ClientState {
    pub fn new(send_range: f64, unload_timeout: f64) -> Self {
        Self {
            camera_position: Vec2::ZERO,
            camera_size: Vec2::new(1.0, 1.0),
            camera_rotation: 0.0,
            window_size: (0, 0),
            mouse_window_position: Vec2::ZERO,
            mouse_wheel_delta: 0.0,
            active_symbols: HashSet::new(),
            send_range,
            unload_timeout,
            loaded: HashSet::new(),
        }
    }

    /// World-space mouse position, derived from window-space mouse
    /// position and the camera (spec §3 "mouse position (window + derived
    /// world coords)").
    pub fn mouse_world_position(&self) -> Vec2 {
        let (w, h) = self.window_size;
        if w == 0 || h == 0 {
            return self.camera_position;
        }
        let centered = Vec2::new(
            self.mouse_window_position.x - w as f64 * 0.5,
            self.mouse_window_position.y - h as f64 * 0.5,
        );
        let scale = Vec2::new(self.camera_size.x / w as f64, self.camera_size.y / h as f64);
        let local = Vec2::new(centered.x * scale.x, centered.y * scale.y).rotated(self.camera_rotation);
        self.camera_position + local
    }

    fn camera_half_diagonal(&self) -> f64 {
        self.camera_size.length() * 0.5
    }
}

/// Holds one outbound queue per connected client and the server-side
/// mirror of that client's camera/input state. Implements `sim::Replicator`
/// so `sim::step_once` can drive one `replicate_tick` per authoritative
/// tick without depending on the wire format directly.
pub struct ClientTable {
    outbound: RwLock<HashMap<ClientId, UnboundedSender<Vec<u8>>>>,
    states: RwLock<HashMap<ClientId, ClientState>>,
}

impl Default for ClientTable {
    fn default() -> Self {
        Self { outbound: RwLock::new(HashMap::new()), states: RwLock::new(HashMap::new()) }
    }
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly connected client, returning the receiving half of
    /// its outbound queue for the transport's writer task.
    pub fn connect(&self, id: ClientId, send_range: f64, unload_timeout: f64) -> UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound.write().expect("outbound lock poisoned").insert(id, tx);
        self.states.write().expect("states lock poisoned").insert(id, ClientState::new(send_range, unload_timeout));
        rx
    }

    /// Drops a client's queue and mirror; called once the transport
    /// observes the connection closed (spec §5 cancellation).
    pub fn disconnect(&self, id: ClientId) {
        self.outbound.write().expect("outbound lock poisoned").remove(&id);
        self.states.write().expect("states lock poisoned").remove(&id);
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.states.read().expect("states lock poisoned").keys().copied().collect()
    }

    /// Applies an inbound CLIENT_STATE or UNLOAD_ACK record received from
    /// one client. Other record kinds are not legal inbound and are
    /// dropped (spec §7 `ProtocolSchemaError` territory, but the outer
    /// framing already validated the tag — this is just routing).
    pub fn apply_inbound(&self, id: ClientId, record: Record) {
        let mut states = self.states.write().expect("states lock poisoned");
        let Some(state) = states.get_mut(&id) else {
            log::warn!("inbound record for unknown client {id}, dropping");
            return;
        };
        match record {
            Record::ClientState(c) => {
                if let Some(v) = c.camera_position {
                    state.camera_position = v;
                }
                if let Some(v) = c.camera_size {
                    state.camera_size = v;
                }
                if let Some(v) = c.camera_rotation {
                    state.camera_rotation = v;
                }
                if let Some(v) = c.window_size {
                    state.window_size = v;
                }
                if let Some(v) = c.mouse_position {
                    state.mouse_window_position = v;
                }
                if let Some(v) = c.mouse_wheel_delta {
                    state.mouse_wheel_delta = v;
                }
                if !c.input_symbols.is_empty() {
                    state.active_symbols = c.input_symbols.into_iter().collect();
                }
                if let Some(v) = c.unload_time {
                    state.unload_timeout = v;
                }
                if let Some(v) = c.unload_distance {
                    state.send_range = v;
                }
            }
            Record::UnloadAck { id: object_id } => {
                state.loaded.remove(&object_id);
            }
            other => {
                log::warn!("unexpected inbound record kind from client {id}: tag {:#04x}", other.tag());
            }
        }
    }

    fn send(&self, id: ClientId, record: &Record) {
        let outbound = self.outbound.read().expect("outbound lock poisoned");
        if let Some(tx) = outbound.get(&id) {
            if tx.send(wire::encode(record)).is_err() {
                log::trace!("client {id} outbound queue closed, dropping record");
            }
        }
    }
}

impl ClientTable {
    /// The actual per-tick replication pass. Takes `&self`: every client's
    /// queue and mirror live behind the internal `RwLock`s, so no `&mut`
    /// is needed here — only the `Replicator` trait signature requires it,
    /// for symmetry with the authoritative `Handler` the simulation actor
    /// does mutate.
    pub fn replicate(&self, handler: &Handler, dirty: &DirtySnapshots) {
        for id in self.client_ids() {
            update_client(self, id, handler, dirty);
        }
    }
}

impl Replicator for ClientTable {
    fn replicate_tick(&mut self, handler: &Handler, dirty: &DirtySnapshots) {
        ClientTable::replicate(self, handler, dirty);
    }
}

/// Visibility rule from spec §4.D step 1: `!server_only` and one of no
/// include/exclude lists, an include-list containing `client`, or an
/// exclude-list not containing `client`.
fn visible_to(object: &crate::object::Object, client: ClientId) -> bool {
    if object.server_only {
        return false;
    }
    match (&object.include_list, &object.exclude_list) {
        (None, None) => true,
        (Some(include), _) => include.contains(&client),
        (None, Some(exclude)) => !exclude.contains(&client),
    }
}

/// `in_range` from spec §4.D step 1. Object radius follows the server
/// convention named in Design Notes §9 (`real_scale.magnitude()`), not the
/// client's texture-dimension approximation.
fn in_range(object: &crate::object::Object, handler: &Handler, state: &ClientState) -> bool {
    if object.always_loaded {
        return true;
    }
    let object_radius = object.real_scale(handler).length();
    let cam_radius = state.camera_half_diagonal() * state.send_range;
    let distance = (object.real_position(handler) - state.camera_position).length();
    object_radius + cam_radius >= distance
}

/// One client's per-tick replication pass (spec §4.D steps 1-3).
pub fn update_client(table: &ClientTable, id: ClientId, handler: &Handler, dirty: &DirtySnapshots) {
    let object_ids: Vec<i64> = handler.iter_ids().collect();
    let mut newly_loaded = Vec::new();

    for object_id in &object_ids {
        let Some(object) = handler.lookup(*object_id) else { continue };
        if !visible_to(object, id) {
            continue;
        }
        if !in_range(object, handler, &{
            let states = table.states.read().expect("states lock poisoned");
            states.get(&id).cloned().unwrap_or_else(|| ClientState::new(1.0, 1.0))
        }) {
            continue;
        }
        let already_loaded = table.states.read().expect("states lock poisoned").get(&id).is_some_and(|s| s.loaded.contains(object_id));
        if already_loaded {
            continue;
        }
        table.send(id, &Record::ObjectSpawn { id: *object_id, class_name: object.client_class_name.clone() });
        table.send(id, &Record::ObjectUpdate(object.collect_full()));
        newly_loaded.push(*object_id);
    }

    if !newly_loaded.is_empty() {
        let mut states = table.states.write().expect("states lock poisoned");
        if let Some(state) = states.get_mut(&id) {
            state.loaded.extend(newly_loaded);
        }
    }

    let loaded_snapshot: Vec<i64> =
        table.states.read().expect("states lock poisoned").get(&id).map(|s| s.loaded.iter().copied().collect()).unwrap_or_default();

    let mut removed = Vec::new();
    for object_id in loaded_snapshot {
        if !handler.contains(object_id) {
            table.send(id, &Record::ObjectRemoval { id: object_id });
            removed.push(object_id);
            continue;
        }
        if let Some(object) = handler.lookup(object_id) {
            if let Some(object_dirty) = dirty.get(&object_id) {
                if let Some(update) = object.collect_delta(object_dirty) {
                    table.send(id, &Record::ObjectUpdate(update));
                }
            }
        }
    }

    if !removed.is_empty() {
        let mut states = table.states.write().expect("states lock poisoned");
        if let Some(state) = states.get_mut(&id) {
            for object_id in removed {
                state.loaded.remove(&object_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::handler::IdAllocation;
    use crate::object::Object;

    fn handler_with_one_always_loaded_object() -> (Handler, i64) {
        let mut handler = Handler::new(IdAllocation::Server);
        let mut object = Object::new(0);
        object.always_loaded = true;
        object.client_class_name = "Ball".to_string();
        let id = handler.spawn(object);
        (handler, id)
    }

    #[test]
    fn always_loaded_object_spawns_regardless_of_distance() {
        let (handler, object_id) = handler_with_one_always_loaded_object();
        let table = ClientTable::new();
        let _rx = table.connect(1, 4.0, 1.0);
        {
            let mut states = table.states.write().unwrap();
            states.get_mut(&1).unwrap().camera_position = Vec2::new(10_000.0, 0.0);
        }

        update_client(&table, 1, &handler, &DirtySnapshots::new());

        let states = table.states.read().unwrap();
        assert!(states.get(&1).unwrap().loaded.contains(&object_id));
    }

    #[test]
    fn out_of_range_object_never_loads() {
        let mut handler = Handler::new(IdAllocation::Server);
        let mut object = Object::new(0);
        object.client_class_name = "Rock".to_string();
        object.set_position(Vec2::new(500.0, 0.0));
        let object_id = handler.spawn(object);

        let table = ClientTable::new();
        let _rx = table.connect(1, 4.0, 1.0);
        {
            let mut states = table.states.write().unwrap();
            let state = states.get_mut(&1).unwrap();
            state.camera_position = Vec2::ZERO;
            state.camera_size = Vec2::new(100.0, 100.0);
        }

        update_client(&table, 1, &handler, &DirtySnapshots::new());

        let states = table.states.read().unwrap();
        assert!(!states.get(&1).unwrap().loaded.contains(&object_id));
    }

    #[test]
    fn server_only_object_is_never_visible() {
        let mut handler = Handler::new(IdAllocation::Server);
        let mut object = Object::new(0);
        object.always_loaded = true;
        object.server_only = true;
        handler.spawn(object);

        let table = ClientTable::new();
        let _rx = table.connect(1, 4.0, 1.0);
        update_client(&table, 1, &handler, &DirtySnapshots::new());

        assert!(table.states.read().unwrap().get(&1).unwrap().loaded.is_empty());
    }

    #[test]
    fn removed_object_emits_removal_and_clears_loaded() {
        let (mut handler, object_id) = handler_with_one_always_loaded_object();
        let table = ClientTable::new();
        let _rx = table.connect(1, 4.0, 1.0);
        update_client(&table, 1, &handler, &DirtySnapshots::new());
        assert!(table.states.read().unwrap().get(&1).unwrap().loaded.contains(&object_id));

        handler.remove(object_id).unwrap();
        update_client(&table, 1, &handler, &DirtySnapshots::new());
        assert!(!table.states.read().unwrap().get(&1).unwrap().loaded.contains(&object_id));
    }

    #[test]
    fn unload_ack_clears_loaded_without_waiting_for_removal() {
        let (handler, object_id) = handler_with_one_always_loaded_object();
        let table = ClientTable::new();
        let _rx = table.connect(1, 4.0, 1.0);
        update_client(&table, 1, &handler, &DirtySnapshots::new());

        table.apply_inbound(1, Record::UnloadAck { id: object_id });
        assert!(!table.states.read().unwrap().get(&1).unwrap().loaded.contains(&object_id));
    }
}

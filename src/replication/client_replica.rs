//! Client-side ingestion of replicated records and the per-object unload
//! timer (spec §4.D, last two paragraphs).
//!
//! On the client, a SPAWN creates a local object carrying the server's id,
//! the default transform/flag/drawable strategies (spec: "default update
//! strategy + a texture-draw strategy"), and this module's own unload
//! bookkeeping ("unload strategy" in spec prose — modeled here as a timer
//! map rather than a field-owning `UpdateStrategy`, since unload owns no
//! wire field and only needs to observe distance-to-camera per tick).

use std::collections::HashMap;

use crate::object::handler::{Handler, IdAllocation};
use crate::object::{Object, ObjectError};
use crate::physics::Vec2;
use crate::replication::record::Record;

pub struct ClientReplicaConfig {
    pub send_range: f64,
    pub unload_timeout: f64,
}

/// Owns the client's local replica of the authoritative object set plus
/// the camera used to judge unload distance.
pub struct ClientReplica {
    pub handler: Handler,
    config: ClientReplicaConfig,
    camera_position: Vec2,
    camera_diagonal: f64,
    unload_timers: HashMap<i64, f64>,
}

impl ClientReplica {
    pub fn new(config: ClientReplicaConfig) -> Self {
        Self {
            handler: Handler::new(IdAllocation::Client),
            config,
            camera_position: Vec2::ZERO,
            camera_diagonal: 1.0,
            unload_timers: HashMap::new(),
        }
    }

    pub fn set_camera(&mut self, position: Vec2, size: Vec2) {
        self.camera_position = position;
        self.camera_diagonal = size.length();
    }

    /// Applies one record received from the server. Returns an outbound
    /// record the transport should send back, if any (there is none for
    /// SPAWN/UPDATE/REMOVE/SERVER_STATE; UNLOAD_ACK is only ever produced
    /// by `tick`, not by ingesting an inbound record).
    pub fn ingest(&mut self, record: Record) {
        match record {
            Record::ObjectSpawn { id, class_name } => {
                if self.handler.contains(id) {
                    log::warn!("duplicate SPAWN for already-loaded object {id}, ignoring");
                    return;
                }
                let mut object = Object::new(0);
                object.client_class_name = class_name;
                object.assign_id(id);
                self.handler.insert_with_id(object);
            }
            Record::ObjectUpdate(update) => {
                let Some(object) = self.handler.lookup_mut(update.id) else {
                    log::trace!("{}", ObjectError::UnknownId);
                    return;
                };
                object.apply(&update);
            }
            Record::ObjectRemoval { id } => {
                if self.handler.remove(id).is_err() {
                    log::trace!("{}", ObjectError::UnknownId);
                }
                self.unload_timers.remove(&id);
            }
            Record::ServerState { .. } | Record::ClientState(_) | Record::UnloadAck { .. } => {
                log::warn!("unexpected record kind on client ingest: tag {:#04x}", record.tag());
            }
        }
    }

    /// Advances unload timers by `dt`, returning one `UNLOAD_ACK` per
    /// object whose timer has just crossed `unload_timeout`, and removing
    /// those objects from the local replica immediately (spec §4.D: the
    /// client removes locally as soon as it emits the ack, the server
    /// clears its `loaded` entry only once the ack arrives).
    pub fn tick(&mut self, dt: f64) -> Vec<Record> {
        let mut acks = Vec::new();
        let ids: Vec<i64> = self.handler.iter_ids().collect();

        for id in ids {
            let Some(object) = self.handler.lookup(id) else { continue };
            let within_range = object.always_loaded || {
                let distance = (object.real_position(&self.handler) - self.camera_position).length();
                distance <= self.config.send_range * self.camera_diagonal
            };

            if within_range {
                self.unload_timers.remove(&id);
                continue;
            }

            let timer = self.unload_timers.entry(id).or_insert(0.0);
            *timer += dt;
            if *timer >= self.config.unload_timeout {
                acks.push(Record::UnloadAck { id });
                self.unload_timers.remove(&id);
                let _ = self.handler.remove(id);
            }
        }

        acks
    }
}

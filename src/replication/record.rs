//! The tagged-union replication record (spec §3 "Replication record",
//! §6 wire protocol tag table).

use crate::object::ObjectUpdate;
use crate::physics::Vec2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStateRecord {
    pub camera_position: Option<Vec2>,
    pub camera_size: Option<Vec2>,
    pub camera_rotation: Option<f64>,
    pub window_size: Option<(u32, u32)>,
    pub mouse_position: Option<Vec2>,
    pub mouse_wheel_delta: Option<f64>,
    pub input_symbols: Vec<String>,
    pub unload_time: Option<f64>,
    pub unload_distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Tag 0x01.
    ObjectUpdate(ObjectUpdate),
    /// Tag 0x02.
    ObjectSpawn { id: i64, class_name: String },
    /// Tag 0x03.
    ObjectRemoval { id: i64 },
    /// Tag 0x04. Sent client -> server.
    ClientState(ClientStateRecord),
    /// Tag 0x05. Sent server -> client, typically once at connect.
    ServerState { game_scale: f64 },
    /// Tag 0x06. Sent client -> server.
    UnloadAck { id: i64 },
}

impl Record {
    pub fn tag(&self) -> u8 {
        match self {
            Record::ObjectUpdate(_) => 0x01,
            Record::ObjectSpawn { .. } => 0x02,
            Record::ObjectRemoval { .. } => 0x03,
            Record::ClientState(_) => 0x04,
            Record::ServerState { .. } => 0x05,
            Record::UnloadAck { .. } => 0x06,
        }
    }
}

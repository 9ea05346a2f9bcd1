//! Wire framing and encoding (spec §4.D "Wire framing", §6 wire protocol
//! table, §7 `ProtocolFramingError` / `ProtocolSchemaError`).
//!
//! Each record is `u32` big-endian length, then a self-describing tagged
//! payload. No external framing/serialization crate is used here: the
//! byte layout is specified down to field order, which a generic codec
//! would only get in the way of.

use std::collections::HashMap;

use crate::object::field::{DrawableDescriptor, FieldValue};
use crate::object::ObjectUpdate;
use crate::physics::Vec2;
use crate::replication::record::{ClientStateRecord, Record};

pub const MAX_PAYLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum WireError {
    /// Length prefix out of range (<= 0 or > 100 MB), or a payload that
    /// ran out of bytes mid-parse. Closes the connection (spec §7
    /// `ProtocolFramingError`).
    Framing(String),
    /// A recognized tag whose payload didn't parse as its own shape.
    /// Drops the record; the connection survives (spec §7
    /// `ProtocolSchemaError`).
    Schema(String),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Framing(msg) => write!(f, "framing error: {msg}"),
            WireError::Schema(msg) => write!(f, "schema error: {msg}"),
        }
    }
}

impl std::error::Error for WireError {}

/// Encodes one record as a complete length-prefixed frame ready to write
/// to a socket.
pub fn encode(record: &Record) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.push(record.tag());
    match record {
        Record::ObjectUpdate(update) => encode_object_update(update, &mut payload),
        Record::ObjectSpawn { id, class_name } => {
            payload.extend_from_slice(&id.to_be_bytes());
            write_string(&mut payload, class_name);
        }
        Record::ObjectRemoval { id } => payload.extend_from_slice(&id.to_be_bytes()),
        Record::ClientState(state) => encode_client_state(state, &mut payload),
        Record::ServerState { game_scale } => payload.extend_from_slice(&game_scale.to_be_bytes()),
        Record::UnloadAck { id } => payload.extend_from_slice(&id.to_be_bytes()),
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Parses one frame's payload (length prefix already stripped and
/// validated by the transport layer — see `transport::read_frame`).
/// Returns `Ok(None)` for an unrecognized tag, which the caller should
/// skip without closing the connection (forward compatibility at record
/// granularity, spec §6).
pub fn decode(payload: &[u8]) -> Result<Option<Record>, WireError> {
    let mut cursor = Cursor::new(payload);
    let tag = cursor.read_u8()?;
    let record = match tag {
        0x01 => Some(Record::ObjectUpdate(decode_object_update(&mut cursor)?)),
        0x02 => {
            let id = cursor.read_i32()? as i64;
            let class_name = cursor.read_string()?;
            Some(Record::ObjectSpawn { id, class_name })
        }
        0x03 => Some(Record::ObjectRemoval { id: cursor.read_i32()? as i64 }),
        0x04 => Some(Record::ClientState(decode_client_state(&mut cursor)?)),
        0x05 => Some(Record::ServerState { game_scale: cursor.read_f64()? }),
        0x06 => Some(Record::UnloadAck { id: cursor.read_i32()? as i64 }),
        _ => None,
    };
    Ok(record)
}

fn encode_object_update(update: &ObjectUpdate, out: &mut Vec<u8>) {
    out.extend_from_slice(&(update.id as i32).to_be_bytes());
    out.extend_from_slice(&(update.fields.len() as u16).to_be_bytes());
    for (name, value) in &update.fields {
        write_string(out, name);
        encode_field_value(value, out);
    }
}

fn decode_object_update(cursor: &mut Cursor) -> Result<ObjectUpdate, WireError> {
    let id = cursor.read_i32()? as i64;
    let count = cursor.read_u16()?;
    let mut fields = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let name = cursor.read_string()?;
        let value = decode_field_value(cursor)?;
        fields.insert(name, value);
    }
    Ok(ObjectUpdate { id, fields })
}

fn encode_field_value(value: &FieldValue, out: &mut Vec<u8>) {
    match value {
        FieldValue::Scalar(v) => {
            out.push(0x01);
            out.extend_from_slice(&v.to_be_bytes());
        }
        FieldValue::Vector(v) => {
            out.push(0x02);
            out.extend_from_slice(&v.x.to_be_bytes());
            out.extend_from_slice(&v.y.to_be_bytes());
        }
        FieldValue::Rotation(v) => {
            out.push(0x03);
            out.extend_from_slice(&v.to_be_bytes());
        }
        FieldValue::IdRef(id) => {
            out.push(0x04);
            out.extend_from_slice(&id.map(|v| v as i32).unwrap_or(i32::MIN).to_be_bytes());
        }
        FieldValue::LayerList(layers) => {
            out.push(0x05);
            out.extend_from_slice(&(layers.len() as u16).to_be_bytes());
            for layer in layers {
                out.extend_from_slice(&(*layer as i32).to_be_bytes());
            }
        }
        FieldValue::Drawable(d) => {
            out.push(0x06);
            write_string(out, &d.name);
            out.extend_from_slice(&d.offset.x.to_be_bytes());
            out.extend_from_slice(&d.offset.y.to_be_bytes());
            out.extend_from_slice(&d.rotation_offset.to_be_bytes());
        }
        FieldValue::Boolean(b) => {
            out.push(0x07);
            out.push(if *b { 1 } else { 0 });
        }
    }
}

fn decode_field_value(cursor: &mut Cursor) -> Result<FieldValue, WireError> {
    let tag = cursor.read_u8()?;
    Ok(match tag {
        0x01 => FieldValue::Scalar(cursor.read_f64()?),
        0x02 => FieldValue::Vector(Vec2::new(cursor.read_f64()?, cursor.read_f64()?)),
        0x03 => FieldValue::Rotation(cursor.read_f64()?),
        0x04 => {
            let raw = cursor.read_i32()?;
            FieldValue::IdRef(if raw == i32::MIN { None } else { Some(raw as i64) })
        }
        0x05 => {
            let count = cursor.read_u16()?;
            let mut layers = Vec::with_capacity(count as usize);
            for _ in 0..count {
                layers.push(cursor.read_i32()? as u32);
            }
            FieldValue::LayerList(layers)
        }
        0x06 => FieldValue::Drawable(DrawableDescriptor {
            name: cursor.read_string()?,
            offset: Vec2::new(cursor.read_f64()?, cursor.read_f64()?),
            rotation_offset: cursor.read_f64()?,
        }),
        0x07 => FieldValue::Boolean(cursor.read_u8()? != 0),
        other => return Err(WireError::Schema(format!("unknown field value tag {other}"))),
    })
}

fn encode_client_state(state: &ClientStateRecord, out: &mut Vec<u8>) {
    write_optional_vec2(out, state.camera_position);
    write_optional_vec2(out, state.camera_size);
    write_optional_f64(out, state.camera_rotation);
    write_optional_window_size(out, state.window_size);
    write_optional_vec2(out, state.mouse_position);
    write_optional_f64(out, state.mouse_wheel_delta);

    out.extend_from_slice(&(state.input_symbols.len() as u16).to_be_bytes());
    for symbol in &state.input_symbols {
        write_string(out, symbol);
    }

    write_optional_f64(out, state.unload_time);
    write_optional_f64(out, state.unload_distance);
}

fn decode_client_state(cursor: &mut Cursor) -> Result<ClientStateRecord, WireError> {
    Ok(ClientStateRecord {
        camera_position: read_optional_vec2(cursor)?,
        camera_size: read_optional_vec2(cursor)?,
        camera_rotation: read_optional_f64(cursor)?,
        window_size: read_optional_window_size(cursor)?,
        mouse_position: read_optional_vec2(cursor)?,
        mouse_wheel_delta: read_optional_f64(cursor)?,
        input_symbols: {
            let count = cursor.read_u16()?;
            let mut symbols = Vec::with_capacity(count as usize);
            for _ in 0..count {
                symbols.push(cursor.read_string()?);
            }
            symbols
        },
        unload_time: read_optional_f64(cursor)?,
        unload_distance: read_optional_f64(cursor)?,
    })
}

fn write_optional_f64(out: &mut Vec<u8>, value: Option<f64>) {
    match value {
        Some(v) => {
            out.push(1);
            out.extend_from_slice(&v.to_be_bytes());
        }
        None => out.push(0),
    }
}

fn read_optional_f64(cursor: &mut Cursor) -> Result<Option<f64>, WireError> {
    Ok(if cursor.read_u8()? == 1 { Some(cursor.read_f64()?) } else { None })
}

fn write_optional_vec2(out: &mut Vec<u8>, value: Option<Vec2>) {
    match value {
        Some(v) => {
            out.push(1);
            out.extend_from_slice(&v.x.to_be_bytes());
            out.extend_from_slice(&v.y.to_be_bytes());
        }
        None => out.push(0),
    }
}

fn read_optional_vec2(cursor: &mut Cursor) -> Result<Option<Vec2>, WireError> {
    Ok(if cursor.read_u8()? == 1 { Some(Vec2::new(cursor.read_f64()?, cursor.read_f64()?)) } else { None })
}

fn write_optional_window_size(out: &mut Vec<u8>, value: Option<(u32, u32)>) {
    match value {
        Some((w, h)) => {
            out.push(1);
            out.extend_from_slice(&w.to_be_bytes());
            out.extend_from_slice(&h.to_be_bytes());
        }
        None => out.push(0),
    }
}

fn read_optional_window_size(cursor: &mut Cursor) -> Result<Option<(u32, u32)>, WireError> {
    Ok(if cursor.read_u8()? == 1 { Some((cursor.read_u32()?, cursor.read_u32()?)) } else { None })
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.pos + len > self.bytes.len() {
            return Err(WireError::Framing("payload ended before expected field".to_string()));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| WireError::Schema(format!("invalid utf-8 in string: {e}")))
    }
}

/// Validates a length prefix per spec §6 failure behaviors: `<= 0` or
/// `> 100 MB` aborts the read and closes the connection.
pub fn validate_length(len: u32) -> Result<usize, WireError> {
    if len == 0 {
        return Err(WireError::Framing("zero-length frame".to_string()));
    }
    if len as usize > MAX_PAYLOAD_BYTES {
        return Err(WireError::Framing(format!("frame length {len} exceeds {MAX_PAYLOAD_BYTES} byte cap")));
    }
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_update_round_trips() {
        let mut fields = HashMap::new();
        fields.insert("position".to_string(), FieldValue::Vector(Vec2::new(1.0, -2.0)));
        fields.insert("rotation".to_string(), FieldValue::Rotation(0.5));
        let record = Record::ObjectUpdate(ObjectUpdate { id: 42, fields });

        let frame = encode(&record);
        let len = u32::from_be_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(len as usize, frame.len() - 4);
        assert_eq!(frame[4], 0x01);

        let decoded = decode(&frame[4..]).unwrap().unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn spawn_and_removal_round_trip() {
        let spawn = Record::ObjectSpawn { id: 7, class_name: "Paddle".to_string() };
        let frame = encode(&spawn);
        assert_eq!(decode(&frame[4..]).unwrap().unwrap(), spawn);

        let removal = Record::ObjectRemoval { id: 7 };
        let frame = encode(&removal);
        assert_eq!(decode(&frame[4..]).unwrap().unwrap(), removal);
    }

    #[test]
    fn unknown_tag_is_skipped_not_errored() {
        let payload = [0xEE_u8];
        assert_eq!(decode(&payload).unwrap(), None);
    }

    #[test]
    fn truncated_payload_is_a_framing_error() {
        let frame = encode(&Record::ObjectRemoval { id: 1 });
        let truncated = &frame[4..frame.len() - 1];
        assert!(matches!(decode(truncated), Err(WireError::Framing(_))));
    }

    #[test]
    fn zero_and_oversized_length_are_rejected() {
        assert!(validate_length(0).is_err());
        assert!(validate_length(MAX_PAYLOAD_BYTES as u32 + 1).is_err());
        assert!(validate_length(1).is_ok());
    }

    #[test]
    fn client_state_round_trips_with_all_fields_absent() {
        let record = Record::ClientState(ClientStateRecord::default());
        let frame = encode(&record);
        assert_eq!(decode(&frame[4..]).unwrap().unwrap(), record);
    }
}

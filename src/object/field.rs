//! Typed field values carried by replication records (spec §3 "Replication
//! record", §6 field value encoding table).

use std::collections::HashMap;

use crate::physics::Vec2;

/// One named, typed property value as it crosses the wire or is exchanged
/// between an object and its update-strategies. Unknown-name handling lives
/// one level up (`object::apply`), not here — a `FieldValue` is just a typed
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(f64),
    Vector(Vec2),
    Rotation(f64),
    /// References another object by id; `None` is the wire's null-sentinel.
    IdRef(Option<i64>),
    LayerList(Vec<u32>),
    Drawable(DrawableDescriptor),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawableDescriptor {
    pub name: String,
    pub offset: Vec2,
    pub rotation_offset: f64,
}

/// Name-keyed bag of fields, used both as the body of an UPDATE record and
/// as the scratch collector strategies append into during `collect_delta`/
/// `collect_full`.
pub type FieldMap = HashMap<String, FieldValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_compare_by_value() {
        assert_eq!(FieldValue::Scalar(1.0), FieldValue::Scalar(1.0));
        assert_ne!(FieldValue::Scalar(1.0), FieldValue::Scalar(2.0));
        assert_eq!(FieldValue::IdRef(None), FieldValue::IdRef(None));
    }
}

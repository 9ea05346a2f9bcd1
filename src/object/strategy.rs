//! Update-strategies: pluggable capabilities that own a subset of an
//! object's fields and know how to serialize/apply them (spec §3
//! "Update-strategy", §4.A, Design Notes §9 "Strategy lists").
//!
//! Design Notes offers two shapes for this: a closed tagged enum, or an
//! open capability table. This crate takes the capability-table route
//! (`dyn UpdateStrategy` trait objects in registration order) since the
//! replication layer's client-side SPAWN handling needs to attach a
//! texture-draw strategy that the core crate does not itself define.

use crate::object::field::{FieldMap, FieldValue};
use crate::object::Object;

/// A capability bound to an object. Strategies run in registration order;
/// each property is owned by exactly one strategy per object.
pub trait UpdateStrategy: std::fmt::Debug {
    /// Appends entries for fields this strategy owns that are present in
    /// `dirty`. Leaves `out` untouched for fields it doesn't own.
    fn collect_delta(&self, object: &Object, dirty: &std::collections::HashSet<String>, out: &mut FieldMap);

    /// Appends every field this strategy marks as "include in full".
    fn collect_full(&self, object: &Object, out: &mut FieldMap);

    /// Consumes fields it recognizes from `fields`, writing them onto
    /// `object`. Fields it doesn't own are left for the next strategy.
    fn apply(&self, object: &mut Object, fields: &FieldMap);
}

/// Position, rotation, scale, velocity, angular velocity — present on every
/// object, first in the default registration order so later strategies can
/// rely on the transform already being current.
#[derive(Debug, Default)]
pub struct TransformStrategy;

impl UpdateStrategy for TransformStrategy {
    fn collect_delta(&self, object: &Object, dirty: &std::collections::HashSet<String>, out: &mut FieldMap) {
        if dirty.contains("position") {
            out.insert("position".to_string(), FieldValue::Vector(object.position));
        }
        if dirty.contains("rotation") {
            out.insert("rotation".to_string(), FieldValue::Rotation(object.rotation));
        }
        if dirty.contains("scale") {
            out.insert("scale".to_string(), FieldValue::Vector(object.scale));
        }
        if dirty.contains("velocity") {
            out.insert("velocity".to_string(), FieldValue::Vector(object.velocity));
        }
        if dirty.contains("angular_velocity") {
            out.insert("angular_velocity".to_string(), FieldValue::Scalar(object.angular_velocity));
        }
    }

    fn collect_full(&self, object: &Object, out: &mut FieldMap) {
        out.insert("position".to_string(), FieldValue::Vector(object.position));
        out.insert("rotation".to_string(), FieldValue::Rotation(object.rotation));
        out.insert("scale".to_string(), FieldValue::Vector(object.scale));
        out.insert("velocity".to_string(), FieldValue::Vector(object.velocity));
        out.insert("angular_velocity".to_string(), FieldValue::Scalar(object.angular_velocity));
    }

    fn apply(&self, object: &mut Object, fields: &FieldMap) {
        if let Some(FieldValue::Vector(v)) = fields.get("position") {
            object.position = *v;
        }
        if let Some(FieldValue::Rotation(r)) = fields.get("rotation") {
            object.rotation = *r;
        }
        if let Some(FieldValue::Vector(v)) = fields.get("scale") {
            object.scale = *v;
        }
        if let Some(FieldValue::Vector(v)) = fields.get("velocity") {
            object.velocity = *v;
        }
        if let Some(FieldValue::Scalar(s)) = fields.get("angular_velocity") {
            object.angular_velocity = *s;
        }
    }
}

/// Boolean/bookkeeping flags: visibility, interpolation, draw-layer order.
#[derive(Debug, Default)]
pub struct FlagStrategy;

impl UpdateStrategy for FlagStrategy {
    fn collect_delta(&self, object: &Object, dirty: &std::collections::HashSet<String>, out: &mut FieldMap) {
        if dirty.contains("visible") {
            out.insert("visible".to_string(), FieldValue::Boolean(object.visible));
        }
        if dirty.contains("interpolate") {
            out.insert("interpolate".to_string(), FieldValue::Boolean(object.interpolate));
        }
        if dirty.contains("draw_layers") {
            out.insert("draw_layers".to_string(), FieldValue::LayerList(object.draw_layers.clone()));
        }
    }

    fn collect_full(&self, object: &Object, out: &mut FieldMap) {
        out.insert("visible".to_string(), FieldValue::Boolean(object.visible));
        out.insert("interpolate".to_string(), FieldValue::Boolean(object.interpolate));
        out.insert("draw_layers".to_string(), FieldValue::LayerList(object.draw_layers.clone()));
    }

    fn apply(&self, object: &mut Object, fields: &FieldMap) {
        if let Some(FieldValue::Boolean(b)) = fields.get("visible") {
            object.visible = *b;
        }
        if let Some(FieldValue::Boolean(b)) = fields.get("interpolate") {
            object.interpolate = *b;
        }
        if let Some(FieldValue::LayerList(layers)) = fields.get("draw_layers") {
            object.draw_layers = layers.clone();
        }
    }
}

/// Opaque texture-draw descriptor, client-side only in practice (the server
/// never reads it back) but modeled here since the wire format carries it
/// as an ordinary field.
#[derive(Debug, Default)]
pub struct DrawableStrategy;

impl UpdateStrategy for DrawableStrategy {
    fn collect_delta(&self, object: &Object, dirty: &std::collections::HashSet<String>, out: &mut FieldMap) {
        if dirty.contains("drawable") {
            if let Some(drawable) = &object.drawable {
                out.insert("drawable".to_string(), FieldValue::Drawable(drawable.clone()));
            }
        }
    }

    fn collect_full(&self, object: &Object, out: &mut FieldMap) {
        if let Some(drawable) = &object.drawable {
            out.insert("drawable".to_string(), FieldValue::Drawable(drawable.clone()));
        }
    }

    fn apply(&self, object: &mut Object, fields: &FieldMap) {
        if let Some(FieldValue::Drawable(d)) = fields.get("drawable") {
            object.drawable = Some(d.clone());
        }
    }
}

/// A strategy for one or more user-named custom fields, keyed by name
/// rather than a fixed struct field — the capability-table escape hatch
/// Design Notes calls for so user code can extend replication without
/// touching the core.
#[derive(Debug, Default)]
pub struct CustomFieldStrategy {
    names: Vec<String>,
}

impl CustomFieldStrategy {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl UpdateStrategy for CustomFieldStrategy {
    fn collect_delta(&self, object: &Object, dirty: &std::collections::HashSet<String>, out: &mut FieldMap) {
        for name in &self.names {
            if dirty.contains(name) {
                if let Some(value) = object.custom_fields.get(name) {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
    }

    fn collect_full(&self, object: &Object, out: &mut FieldMap) {
        for name in &self.names {
            if let Some(value) = object.custom_fields.get(name) {
                out.insert(name.clone(), value.clone());
            }
        }
    }

    fn apply(&self, object: &mut Object, fields: &FieldMap) {
        for name in &self.names {
            if let Some(value) = fields.get(name) {
                object.custom_fields.insert(name.clone(), value.clone());
            }
        }
    }
}

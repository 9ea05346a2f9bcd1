//! Authoritative object model and update pipeline (spec §3 "Object", §4.A).

pub mod field;
pub mod handler;
pub mod strategy;

use std::collections::{HashMap, HashSet};

use crate::object::field::{DrawableDescriptor, FieldMap};
use crate::object::handler::Handler;
use crate::object::strategy::UpdateStrategy;
use crate::physics::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectError {
    /// Setting `parent` would create (or already creates) a cycle; the
    /// assignment is rejected and the object's parent is left unchanged.
    CyclicParent,
    /// An UPDATE or removal referenced an id the handler does not know.
    UnknownId,
}

impl std::fmt::Display for ObjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectError::CyclicParent => write!(f, "assigning this parent would create a cycle"),
            ObjectError::UnknownId => write!(f, "no object with that id is known to this handler"),
        }
    }
}

impl std::error::Error for ObjectError {}

/// The body of an UPDATE record: an object id plus the fields that changed
/// (or, for a full snapshot, every field a strategy marks as full-state).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectUpdate {
    pub id: i64,
    pub fields: FieldMap,
}

/// The unit of simulation and replication (spec §3).
pub struct Object {
    id: i64,
    pub position: Vec2,
    pub rotation: f64,
    pub scale: Vec2,
    pub velocity: Vec2,
    pub angular_velocity: f64,

    pub visible: bool,
    pub interpolate: bool,
    pub draw_layers: Vec<u32>,

    /// The parent this object wants; re-resolved against the handler on
    /// every `real_*` call rather than cached, so a parent that spawns
    /// after this object still resolves the first time it exists.
    parent_id: Option<i64>,

    /// Replication visibility controls (spec §4.D). Not named explicitly
    /// among the core Object attributes in spec §3 but required by the
    /// per-client visibility computation in §4.D and referenced directly
    /// (`o.always_loaded`, `server_only`, include/exclude lists).
    pub server_only: bool,
    pub always_loaded: bool,
    pub include_list: Option<Vec<u64>>,
    pub exclude_list: Option<Vec<u64>>,
    pub client_class_name: String,

    pub drawable: Option<DrawableDescriptor>,
    pub custom_fields: FieldMap,

    pub physics_body: Option<usize>,

    dirty: HashSet<String>,
    strategies: Vec<Box<dyn UpdateStrategy>>,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("rotation", &self.rotation)
            .field("parent_id", &self.parent_id)
            .finish_non_exhaustive()
    }
}

impl Object {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::new(1.0, 1.0),
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            visible: true,
            interpolate: true,
            draw_layers: Vec::new(),
            parent_id: None,
            server_only: false,
            always_loaded: false,
            include_list: None,
            exclude_list: None,
            client_class_name: String::new(),
            drawable: None,
            custom_fields: HashMap::new(),
            physics_body: None,
            dirty: HashSet::new(),
            strategies: vec![
                Box::new(strategy::TransformStrategy),
                Box::new(strategy::FlagStrategy),
                Box::new(strategy::DrawableStrategy),
            ],
        }
    }

    /// Ids are immutable after construction (spec §3 invariant).
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    /// Overwrites the registered update-strategy list; used by code that
    /// wants a custom strategy instead of (or alongside) the three
    /// installed by `new`. Order matters (spec §4.A rationale).
    pub fn set_strategies(&mut self, strategies: Vec<Box<dyn UpdateStrategy>>) {
        self.strategies = strategies;
    }

    pub fn mark_dirty(&mut self, field: &str) {
        self.dirty.insert(field.to_string());
    }

    pub fn dirty_fields(&self) -> &HashSet<String> {
        &self.dirty
    }

    /// Returns the current dirty set and atomically swaps in an empty one.
    /// Must be called exactly once per tick per object before replication
    /// reads from it (spec §3 invariant).
    pub fn snapshot_dirty(&mut self) -> HashSet<String> {
        std::mem::take(&mut self.dirty)
    }

    pub fn set_position(&mut self, value: Vec2) {
        if value != self.position {
            self.position = value;
            self.mark_dirty("position");
        }
    }

    pub fn set_rotation(&mut self, value: f64) {
        if value != self.rotation {
            self.rotation = value;
            self.mark_dirty("rotation");
        }
    }

    pub fn set_scale(&mut self, value: Vec2) {
        if value != self.scale {
            self.scale = value;
            self.mark_dirty("scale");
        }
    }

    pub fn set_velocity(&mut self, value: Vec2) {
        if value != self.velocity {
            self.velocity = value;
            self.mark_dirty("velocity");
        }
    }

    pub fn set_angular_velocity(&mut self, value: f64) {
        if value != self.angular_velocity {
            self.angular_velocity = value;
            self.mark_dirty("angular_velocity");
        }
    }

    pub fn set_visible(&mut self, value: bool) {
        if value != self.visible {
            self.visible = value;
            self.mark_dirty("visible");
        }
    }

    pub fn set_interpolate(&mut self, value: bool) {
        if value != self.interpolate {
            self.interpolate = value;
            self.mark_dirty("interpolate");
        }
    }

    pub fn set_draw_layers(&mut self, layers: Vec<u32>) {
        if layers != self.draw_layers {
            self.draw_layers = layers;
            self.mark_dirty("draw_layers");
        }
    }

    pub fn set_drawable(&mut self, drawable: DrawableDescriptor) {
        self.drawable = Some(drawable);
        self.mark_dirty("drawable");
    }

    pub fn set_custom_field(&mut self, name: &str, value: crate::object::field::FieldValue) {
        self.custom_fields.insert(name.to_string(), value);
        self.mark_dirty(name);
    }

    /// Sets the wanted parent id directly. Cycle rejection requires walking
    /// the handler's parent chain, so callers spawn/re-parent through
    /// `Handler::set_parent` rather than this, which is only safe for an
    /// object not yet owned by a handler.
    pub(crate) fn set_parent_unchecked(&mut self, parent_id: Option<i64>) {
        self.parent_id = parent_id;
    }

    /// Assigns the id this object will carry for its entire lifetime.
    /// Restricted to the handler that is about to take ownership of it, at
    /// spawn time, before the object becomes reachable by anything else.
    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    /// Iterates strategies in order, collecting fields owned by strategies
    /// that are present in the already-snapshotted `dirty` set. Returns
    /// `None` ("empty") if nothing was collected.
    pub fn collect_delta(&self, dirty: &HashSet<String>) -> Option<ObjectUpdate> {
        let mut fields = FieldMap::new();
        for strategy in &self.strategies {
            strategy.collect_delta(self, dirty, &mut fields);
        }
        if fields.is_empty() { None } else { Some(ObjectUpdate { id: self.id, fields }) }
    }

    /// Same iteration as `collect_delta`, but each strategy emits every
    /// field it marks as "include in full".
    pub fn collect_full(&self) -> ObjectUpdate {
        let mut fields = FieldMap::new();
        for strategy in &self.strategies {
            strategy.collect_full(self, &mut fields);
        }
        ObjectUpdate { id: self.id, fields }
    }

    /// Iterates strategies in order; each consumes fields it recognizes.
    /// Fields no strategy recognizes are silently ignored (forward
    /// compatibility, spec §4.A).
    pub fn apply(&mut self, update: &ObjectUpdate) {
        let strategies = std::mem::take(&mut self.strategies);
        for strategy in &strategies {
            strategy.apply(self, &update.fields);
        }
        self.strategies = strategies;
    }

    /// Resolves parent-relative transform to world space: rotation adds,
    /// position rotates into the parent frame then translates, scale
    /// multiplies element-wise (spec §3).
    pub fn real_position(&self, handler: &Handler) -> Vec2 {
        match self.resolved_parent(handler) {
            Some(parent) => {
                let parent_rotation = parent.real_rotation(handler);
                parent.real_position(handler) + self.position.rotated(parent_rotation)
            }
            None => self.position,
        }
    }

    pub fn real_rotation(&self, handler: &Handler) -> f64 {
        match self.resolved_parent(handler) {
            Some(parent) => parent.real_rotation(handler) + self.rotation,
            None => self.rotation,
        }
    }

    pub fn real_scale(&self, handler: &Handler) -> Vec2 {
        match self.resolved_parent(handler) {
            Some(parent) => {
                let parent_scale = parent.real_scale(handler);
                Vec2::new(self.scale.x * parent_scale.x, self.scale.y * parent_scale.y)
            }
            None => self.scale,
        }
    }

    fn resolved_parent<'h>(&self, handler: &'h Handler) -> Option<&'h Object> {
        self.parent_id.and_then(|id| handler.lookup(id))
    }
}

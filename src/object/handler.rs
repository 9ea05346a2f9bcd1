//! `Handler`: authoritative container of objects, optionally owning a
//! physics world (spec §3 "Handler", Design Notes §9 "arena + indices").
//!
//! Objects are addressed by id everywhere outside this module; internally
//! they live in a dense `Vec` and a `HashMap<id, index>` resolves lookups,
//! which sidesteps the back-pointer/cyclic-ownership hazards the source's
//! module-global handler reference had.

use std::collections::HashMap;

use crate::object::{Object, ObjectError};
use crate::physics::{Vec2, World as PhysicsWorld};

/// Which direction of the id namespace a handler allocates from: servers
/// assign positive ids, clients assign negative ids to local-only objects
/// (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdAllocation {
    Server,
    Client,
}

pub struct Handler {
    allocation: IdAllocation,
    next_id: i64,
    objects: Vec<Object>,
    index: HashMap<i64, usize>,
    /// Stable per-tick iteration order (spec invariant): insertion order,
    /// not the arena's physical slot order once removals start punching
    /// holes.
    order: Vec<i64>,
    pub physics: Option<PhysicsWorld>,
}

impl Handler {
    pub fn new(allocation: IdAllocation) -> Self {
        let next_id = match allocation {
            IdAllocation::Server => 1,
            IdAllocation::Client => -1,
        };
        Self { allocation, next_id, objects: Vec::new(), index: HashMap::new(), order: Vec::new(), physics: None }
    }

    pub fn with_physics(mut self, world: PhysicsWorld) -> Self {
        self.physics = Some(world);
        self
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += match self.allocation {
            IdAllocation::Server => 1,
            IdAllocation::Client => -1,
        };
        id
    }

    /// Inserts an object not yet owned by any handler, assigning it the
    /// next id in this handler's allocation direction. Returns the
    /// assigned id.
    pub fn spawn(&mut self, mut object: Object) -> i64 {
        let id = self.allocate_id();
        object.assign_id(id);
        self.insert_with_id(object)
    }

    /// Inserts an object that already carries an id assigned elsewhere
    /// (e.g. a client replica receiving a server-assigned id via SPAWN).
    /// Returns `ObjectError::CyclicParent` only indirectly — id collisions
    /// are a caller bug, not a recoverable error, since ids are unique per
    /// peer by construction.
    pub fn insert_with_id(&mut self, object: Object) -> i64 {
        let id = object.id();
        assert!(!self.index.contains_key(&id), "object id {id} already present in this handler");
        let slot = self.objects.len();
        self.objects.push(object);
        self.index.insert(id, slot);
        self.order.push(id);
        id
    }

    pub fn lookup(&self, id: i64) -> Option<&Object> {
        self.index.get(&id).map(|&slot| &self.objects[slot])
    }

    pub fn lookup_mut(&mut self, id: i64) -> Option<&mut Object> {
        self.index.get(&id).copied().map(move |slot| &mut self.objects[slot])
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    /// Removes an object, compacting its slot by swapping the last element
    /// in. Parent references to the removed id become dangling and are
    /// tolerated (spec §5 resource discipline): `real_*` on any child
    /// simply stops recursing through it.
    pub fn remove(&mut self, id: i64) -> Result<Object, ObjectError> {
        let slot = *self.index.get(&id).ok_or(ObjectError::UnknownId)?;
        self.order.retain(|&o| o != id);
        let removed = self.objects.swap_remove(slot);
        self.index.remove(&id);
        if slot < self.objects.len() {
            let moved_id = self.objects[slot].id();
            self.index.insert(moved_id, slot);
        }
        Ok(removed)
    }

    /// Iterates objects in stable, tick-consistent insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.order.iter().filter_map(move |id| self.lookup(*id))
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Pushes each physics-backed object's transform and velocity onto its
    /// associated `RigidBody` before `World::step` runs, so game logic that
    /// moved an object directly this tick (teleports, spawns) is reflected
    /// in the body the solver integrates (spec §4.C step 1, §2 "the physics
    /// integrator produces new object state").
    pub fn sync_bodies_from_objects(&mut self) {
        let Some(world) = self.physics.as_mut() else { return };
        for object in &self.objects {
            let Some(body_index) = object.physics_body else { continue };
            let Some(body) = world.bodies.get_mut(body_index) else { continue };
            body.position = object.position;
            body.rotation = object.rotation;
            body.velocity = object.velocity;
            body.angular_velocity = object.angular_velocity;
        }
    }

    /// Writes each physics-backed object's post-step pose back through the
    /// dirty-tracked setters, so a tick's physics-driven motion is visible
    /// to `snapshot_dirty`/`collect_delta` and therefore to replication
    /// (spec §2, §4.C ordering: integrate -> ... -> strategies -> replicate).
    pub fn sync_objects_from_bodies(&mut self) {
        let Some(world) = self.physics.as_ref() else { return };
        let updates: Vec<(i64, Vec2, f64, Vec2, f64)> = self
            .objects
            .iter()
            .filter_map(|object| {
                let body = world.bodies.get(object.physics_body?)?;
                Some((object.id(), body.position, body.rotation, body.velocity, body.angular_velocity))
            })
            .collect();

        for (id, position, rotation, velocity, angular_velocity) in updates {
            if let Some(object) = self.lookup_mut(id) {
                object.set_position(position);
                object.set_rotation(rotation);
                object.set_velocity(velocity);
                object.set_angular_velocity(angular_velocity);
            }
        }
    }

    /// Assigns `new_parent` as `child`'s parent, rejecting the change if it
    /// would create a self-parent or a cycle (spec §3 invariant, §9 design
    /// note, scenario S6). On rejection the child's parent is left
    /// unchanged. The child's local transform is left untouched, so its
    /// *real* transform changes along with its new parent.
    pub fn set_parent(&mut self, child: i64, new_parent: Option<i64>) -> Result<(), ObjectError> {
        self.reparent(child, new_parent, false)
    }

    /// Like `set_parent`, but adjusts the child's local transform so its
    /// real (world) position/rotation/scale is numerically unchanged by
    /// the reparent (spec §8 property 3: "setting parent = null preserves
    /// numerical equality of real_pos if keep_global_transform = true").
    pub fn set_parent_keep_global_transform(&mut self, child: i64, new_parent: Option<i64>) -> Result<(), ObjectError> {
        self.reparent(child, new_parent, true)
    }

    fn reparent(&mut self, child: i64, new_parent: Option<i64>, keep_global_transform: bool) -> Result<(), ObjectError> {
        if !self.contains(child) {
            return Err(ObjectError::UnknownId);
        }
        if let Some(parent_id) = new_parent {
            if parent_id == child || self.creates_cycle(parent_id, child) {
                return Err(ObjectError::CyclicParent);
            }
        }

        let local = keep_global_transform.then(|| {
            let object = self.lookup(child).expect("checked by contains above");
            let global_position = object.real_position(self);
            let global_rotation = object.real_rotation(self);
            let global_scale = object.real_scale(self);

            match new_parent {
                Some(parent_id) => {
                    let parent = self.lookup(parent_id).expect("checked by creates_cycle above");
                    let parent_position = parent.real_position(self);
                    let parent_rotation = parent.real_rotation(self);
                    let parent_scale = parent.real_scale(self);
                    (
                        (global_position - parent_position).rotated(-parent_rotation),
                        global_rotation - parent_rotation,
                        Vec2::new(global_scale.x / parent_scale.x, global_scale.y / parent_scale.y),
                    )
                }
                None => (global_position, global_rotation, global_scale),
            }
        });

        let object = self.lookup_mut(child).expect("checked by contains above");
        object.set_parent_unchecked(new_parent);
        if let Some((position, rotation, scale)) = local {
            object.set_position(position);
            object.set_rotation(rotation);
            object.set_scale(scale);
        }
        Ok(())
    }

    /// Walks `start`'s ancestor chain looking for `needle`; used before
    /// committing a reparent so the forest invariant never breaks, even
    /// transiently (depth-limited to tolerate any pre-existing dangling
    /// reference rather than looping forever).
    fn creates_cycle(&self, start: i64, needle: i64) -> bool {
        let mut current = Some(start);
        let mut steps = 0;
        while let Some(id) = current {
            if id == needle {
                return true;
            }
            steps += 1;
            if steps > self.objects.len() {
                return false;
            }
            current = self.lookup(id).and_then(|o| o.parent_id());
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_assigns_ids_in_allocation_direction() {
        let mut server = Handler::new(IdAllocation::Server);
        let a = server.spawn(Object::new(0));
        let b = server.spawn(Object::new(0));
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        let mut client = Handler::new(IdAllocation::Client);
        let c = client.spawn(Object::new(0));
        let d = client.spawn(Object::new(0));
        assert_eq!(c, -1);
        assert_eq!(d, -2);
    }

    #[test]
    fn remove_compacts_without_breaking_lookup() {
        let mut handler = Handler::new(IdAllocation::Server);
        let a = handler.spawn(Object::new(0));
        let b = handler.spawn(Object::new(0));
        let c = handler.spawn(Object::new(0));
        handler.remove(a).unwrap();
        assert!(handler.lookup(a).is_none());
        assert!(handler.lookup(b).is_some());
        assert!(handler.lookup(c).is_some());
        assert_eq!(handler.len(), 2);
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let mut handler = Handler::new(IdAllocation::Server);
        let a = handler.spawn(Object::new(0));
        let b = handler.spawn(Object::new(0));
        handler.set_parent(b, Some(a)).unwrap();
        let result = handler.set_parent(a, Some(b));
        assert_eq!(result, Err(ObjectError::CyclicParent));
        assert_eq!(handler.lookup(a).unwrap().parent_id(), None);
    }

    #[test]
    fn self_parent_is_rejected() {
        let mut handler = Handler::new(IdAllocation::Server);
        let a = handler.spawn(Object::new(0));
        assert_eq!(handler.set_parent(a, Some(a)), Err(ObjectError::CyclicParent));
    }

    #[test]
    fn keep_global_transform_preserves_real_position_on_detach() {
        let mut handler = Handler::new(IdAllocation::Server);
        let parent = handler.spawn(Object::new(0));
        let child = handler.spawn(Object::new(0));
        handler.lookup_mut(parent).unwrap().set_position(Vec2::new(10.0, 5.0));
        handler.lookup_mut(parent).unwrap().set_rotation(std::f64::consts::FRAC_PI_2);
        handler.set_parent(child, Some(parent)).unwrap();
        handler.lookup_mut(child).unwrap().set_position(Vec2::new(1.0, 0.0));

        let real_before = handler.lookup(child).unwrap().real_position(&handler);

        handler.set_parent_keep_global_transform(child, None).unwrap();

        let real_after = handler.lookup(child).unwrap().real_position(&handler);
        assert!((real_before.x - real_after.x).abs() < 1e-9);
        assert!((real_before.y - real_after.y).abs() < 1e-9);
        assert_eq!(handler.lookup(child).unwrap().parent_id(), None);
    }

    #[test]
    fn plain_set_parent_changes_real_position() {
        let mut handler = Handler::new(IdAllocation::Server);
        let parent = handler.spawn(Object::new(0));
        let child = handler.spawn(Object::new(0));
        handler.lookup_mut(parent).unwrap().set_position(Vec2::new(10.0, 5.0));
        handler.lookup_mut(child).unwrap().set_position(Vec2::new(1.0, 0.0));

        let real_before = handler.lookup(child).unwrap().real_position(&handler);
        handler.set_parent(child, Some(parent)).unwrap();
        let real_after = handler.lookup(child).unwrap().real_position(&handler);

        assert!((real_after.x - real_before.x).abs() > 1e-6, "plain set_parent should shift the real position");
    }

    #[test]
    fn iteration_order_is_stable_across_removals() {
        let mut handler = Handler::new(IdAllocation::Server);
        let a = handler.spawn(Object::new(0));
        let b = handler.spawn(Object::new(0));
        let c = handler.spawn(Object::new(0));
        handler.remove(b).unwrap();
        let ids: Vec<i64> = handler.iter_ids().collect();
        assert_eq!(ids, vec![a, c]);
    }
}

//! Fixed-rate simulation loop (spec §4.C) and the two cooperative actors
//! described in §5: this module is the simulation actor's home; the
//! network actor lives in `replication`.
//!
//! The tick loop runs on a dedicated OS thread with `std::sync::mpsc`
//! queues, the same shape as the teacher's `SyncRuntime` tick thread
//! (`Instant`/`Duration` accumulator, `log::trace!`/`log::warn!` at actor
//! boundaries) rather than a tokio task: spec §5 requires the simulation
//! actor to never suspend mid-tick, which a dedicated thread gives for
//! free and an async task has to work to approximate.

use std::time::{Duration, Instant};

use crate::object::handler::Handler;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickError {
    /// `dt` exceeded twice the configured tick period. Never fatal: the
    /// loop schedules exactly one skipped tick and continues (spec §7
    /// `TickOverrun`).
    Overrun { dt: Duration, tick_period: Duration },
}

impl std::fmt::Display for TickError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickError::Overrun { dt, tick_period } => {
                write!(f, "tick overran: dt={dt:?} exceeds 2x tick period {tick_period:?}")
            }
        }
    }
}

impl std::error::Error for TickError {}

/// The user game-logic hook invoked once per tick before physics (spec
/// §4.C step 2): may spawn/remove objects and apply forces. Mirrors the
/// role the teacher's `GameHooks::update` plays in `SyncRuntime`, but
/// operating directly on the authoritative `Handler` rather than through a
/// delta-diff abstraction, since this crate's replication pipeline already
/// derives its diffs from object dirty-tracking.
pub trait GameLogic {
    fn tick(&mut self, handler: &mut Handler, dt: f64);
}

/// One object's dirty-field snapshot for this tick, taken exactly once
/// (spec §3 invariant) and shared across every client's delta computation
/// — each client needs the same snapshot, not a fresh one per client.
pub type DirtySnapshots = std::collections::HashMap<i64, std::collections::HashSet<String>>;

/// Computed once per tick after physics settles and dirty sets are
/// snapshotted; implemented by `replication::ClientTable` in this crate,
/// kept as a trait here so `sim` does not depend on `replication`'s wire
/// format directly (Design Notes §9: pass dependencies in explicitly,
/// don't reach across layers).
pub trait Replicator {
    fn replicate_tick(&mut self, handler: &Handler, dirty: &DirtySnapshots);
}

/// Holds everything one server tick touches, passed down explicitly rather
/// than read from globals (Design Notes §9 `ServerContext`).
pub struct ServerContext<G: GameLogic, R: Replicator> {
    pub handler: Handler,
    pub game_logic: G,
    pub replicator: R,
}

pub struct ServerLoopConfig {
    pub tick_period: Duration,
}

/// Runs the authoritative tick loop until `should_stop` returns true,
/// checked once per tick after flushing outbound state (spec §5
/// cancellation: "breaking the loop after completing the in-progress tick
/// and flushing outbound queues").
pub fn run_server_loop<G: GameLogic, R: Replicator>(
    ctx: &mut ServerContext<G, R>,
    config: &ServerLoopConfig,
    mut should_stop: impl FnMut() -> bool,
) {
    let mut last_tick = Instant::now();
    let mut skip_next = false;

    loop {
        if should_stop() {
            log::trace!("server loop stopping after flushing the in-progress tick");
            return;
        }

        std::thread::sleep(sleep_until_next_tick(last_tick, config.tick_period));
        let now = Instant::now();
        let elapsed = now.duration_since(last_tick);
        last_tick = now;

        if skip_next {
            skip_next = false;
            log::trace!("skipping tick to catch up after a previous overrun");
            continue;
        }

        let dt = elapsed.min(config.tick_period * 2);
        if elapsed > config.tick_period * 2 {
            log::warn!("{}", TickError::Overrun { dt: elapsed, tick_period: config.tick_period });
            skip_next = true;
        }

        step_once(ctx, dt.as_secs_f64());
    }
}

fn sleep_until_next_tick(last_tick: Instant, tick_period: Duration) -> Duration {
    tick_period.saturating_sub(last_tick.elapsed())
}

/// One authoritative tick: game logic, physics, dirty snapshot, replicate
/// (spec §4.C steps 2-5). Exposed separately from `run_server_loop` so
/// deterministic tests can drive exact ticks without sleeping.
pub fn step_once<G: GameLogic, R: Replicator>(ctx: &mut ServerContext<G, R>, dt: f64) {
    ctx.game_logic.tick(&mut ctx.handler, dt);

    ctx.handler.sync_bodies_from_objects();
    if let Some(world) = ctx.handler.physics.as_mut() {
        world.step(dt, &mut crate::physics::NoCallbacks);
    }
    ctx.handler.sync_objects_from_bodies();

    let mut dirty = DirtySnapshots::new();
    for id in ctx.handler.iter_ids().collect::<Vec<_>>() {
        if let Some(object) = ctx.handler.lookup_mut(id) {
            dirty.insert(id, object.snapshot_dirty());
        }
    }

    ctx.replicator.replicate_tick(&ctx.handler, &dirty);
}

/// The client-side mirror loop (spec §4.C, last paragraph): runs steps 2-3
/// locally for interpolation, never authors authoritative state, and
/// ingests server records on its own schedule (handled by
/// `replication::transport` on the client side).
pub struct ClientLoopConfig {
    pub tick_period: Duration,
}

pub fn run_client_loop<G: GameLogic>(
    handler: &mut Handler,
    game_logic: &mut G,
    config: &ClientLoopConfig,
    mut should_stop: impl FnMut() -> bool,
) {
    let mut last_tick = Instant::now();
    loop {
        if should_stop() {
            return;
        }
        std::thread::sleep(sleep_until_next_tick(last_tick, config.tick_period));
        let now = Instant::now();
        let dt = now.duration_since(last_tick).min(config.tick_period * 2).as_secs_f64();
        last_tick = now;

        game_logic.tick(handler, dt);
        handler.sync_bodies_from_objects();
        if let Some(world) = handler.physics.as_mut() {
            world.step(dt, &mut crate::physics::NoCallbacks);
        }
        handler.sync_objects_from_bodies();
    }
}

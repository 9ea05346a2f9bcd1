//! Recognized configuration keys (spec §6), expressed as plain structs
//! rather than parsed from a file — file/CLI parsing is explicitly out of
//! scope (spec §1). Grounded on the teacher's `server::runtime::sync::Settings`:
//! a small settings struct constructed by the embedding binary and passed
//! in, never read from a global.

use serde::Deserialize;

/// Server-side configuration. Window/graphics-backend/input-config keys
/// from spec §6 are client-rendering concerns and are not represented
/// here — this crate's scope ends at the authoritative simulation and the
/// wire protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub tick_rate_hz: f64,
    /// Multiplier of camera diagonal used for loading/unloading (spec §6
    /// `object_sending_range`; Design Notes §9 flags the source's
    /// matching `object_sending_distance` name as a likely typo — this
    /// crate uses the config key actually read, `object_sending_range`).
    pub object_sending_range: f64,
    /// Client-side grace period before an out-of-range object is unloaded
    /// (spec §6 `object_unload_time`), mirrored to each client at connect.
    pub object_unload_time: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { tick_rate_hz: 60.0, object_sending_range: 4.0, object_unload_time: 5.0 }
    }
}

impl ServerConfig {
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_rate_hz)
    }
}

/// Client-side configuration (spec §6). Mouse-event gating flags control
/// whether the client forwards press/wheel/move events in its outbound
/// CLIENT_STATE records; this crate does not capture the events
/// themselves (input capture is out of scope, spec §1), only whether to
/// forward already-captured state the embedding app hands it.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub client_update_speed_hz: f64,
    pub game_scale: f64,
    pub object_sending_range: f64,
    pub object_unload_time: f64,
    pub send_mouse_press_events: bool,
    pub send_mouse_wheel_events: bool,
    pub send_mouse_moved_events: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_update_speed_hz: 60.0,
            game_scale: 1.0,
            object_sending_range: 4.0,
            object_unload_time: 5.0,
            send_mouse_press_events: false,
            send_mouse_wheel_events: false,
            send_mouse_moved_events: false,
        }
    }
}

impl ClientConfig {
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.client_update_speed_hz)
    }
}

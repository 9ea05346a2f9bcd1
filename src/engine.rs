//! Server-side builder wiring a `Handler`, a tick loop, and the TCP
//! transport together (spec §9 "Supplemented features").
//!
//! Mirrors the shape of the teacher's `MultiPlayer::new(...).register(...)
//! .run()` (`src/lib.rs`) and `SessionManager` (`src/server/protocol.rs`):
//! an embedding binary constructs an `Engine`, hands it a `Handler` and a
//! `GameLogic` hook, and calls `run` to accept connections and drive the
//! authoritative loop on a dedicated thread — the network actor (this
//! module, async) and the simulation actor (`sim`, a blocking thread)
//! communicate only through channels, per spec §5.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::object::handler::Handler;
use crate::replication::client::ClientId;
use crate::replication::{ClientTable, Record};
use crate::sim::{DirtySnapshots, GameLogic, Replicator, ServerContext, ServerLoopConfig};

/// Wraps `Arc<ClientTable>` so it can be handed to the sim thread as an
/// owned `Replicator` while the network actor keeps its own clone for
/// registering/deregistering connections.
struct SharedClientTable(Arc<ClientTable>);

impl Replicator for SharedClientTable {
    fn replicate_tick(&mut self, handler: &Handler, dirty: &DirtySnapshots) {
        self.0.replicate(handler, dirty);
    }
}

/// Drains inbound CLIENT_STATE/UNLOAD_ACK records onto the `ClientTable`
/// before running the embedder's own per-tick hook (spec §4.C step 2 runs
/// after inbound records for this tick are applied, so game logic sees a
/// consistent post-input state).
struct InboundDrainingLogic<G: GameLogic> {
    inner: G,
    inbound_rx: Receiver<(ClientId, Record)>,
    clients: Arc<ClientTable>,
}

impl<G: GameLogic> GameLogic for InboundDrainingLogic<G> {
    fn tick(&mut self, handler: &mut Handler, dt: f64) {
        while let Ok((id, record)) = self.inbound_rx.try_recv() {
            self.clients.apply_inbound(id, record);
        }
        self.inner.tick(handler, dt);
    }
}

pub struct Engine<G: GameLogic> {
    config: ServerConfig,
    handler: Handler,
    game_logic: G,
}

impl<G: GameLogic + Send + 'static> Engine<G> {
    pub fn new(config: ServerConfig, handler: Handler, game_logic: G) -> Self {
        Self { config, handler, game_logic }
    }

    /// Binds `addr`, spawns the simulation actor on a dedicated OS thread
    /// (spec §5: "inside a tick the simulation actor never suspends",
    /// which a blocking thread gives for free), and accepts connections
    /// until the process is torn down.
    pub async fn run(self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        let clients = Arc::new(ClientTable::new());
        let (inbound_tx, inbound_rx) = mpsc::channel::<(ClientId, Record)>();

        let sim_clients = Arc::clone(&clients);
        let tick_period = self.config.tick_period();
        let mut handler = self.handler;
        handler.physics.get_or_insert_with(crate::physics::World::new);

        let game_logic = InboundDrainingLogic { inner: self.game_logic, inbound_rx, clients: Arc::clone(&sim_clients) };
        std::thread::spawn(move || {
            let mut ctx = ServerContext { handler, game_logic, replicator: SharedClientTable(sim_clients) };
            crate::sim::run_server_loop(&mut ctx, &ServerLoopConfig { tick_period }, || false);
        });

        let mut next_client_id: ClientId = 1;
        let send_range = self.config.object_sending_range;
        let unload_time = self.config.object_unload_time;

        loop {
            let (socket, peer) = listener.accept().await?;
            let client_id = next_client_id;
            next_client_id += 1;
            log::trace!("accepted connection {peer}, assigned client id {client_id}");

            let outbound_rx = clients.connect(client_id, send_range, unload_time);
            let (read_half, write_half) = socket.into_split();

            let inbound_tx = inbound_tx.clone();
            tokio::spawn(async move {
                let (record_tx, mut record_rx) = tokio::sync::mpsc::unbounded_channel();
                let reader = tokio::spawn(crate::replication::transport::read_frames(read_half, record_tx));
                while let Some(record) = record_rx.recv().await {
                    if inbound_tx.send((client_id, record)).is_err() {
                        break;
                    }
                }
                let _ = reader.await;
            });

            let clients_for_cleanup = Arc::clone(&clients);
            tokio::spawn(async move {
                crate::replication::transport::write_frames(write_half, outbound_rx).await;
                clients_for_cleanup.disconnect(client_id);
                log::trace!("client {client_id} disconnected");
            });
        }
    }
}

//! Server network layer: TCP accept, per-connection I/O tasks and the
//! authoritative merge loop

use crate::config::ServerConfig;
use crate::connection_manager::{Connection, ConnectionManager, SendError};
use crate::game::{GameState, MergeOutcome};
use log::{debug, error, info, warn};
use shared::{read_message, write_message, Message, World};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Ticks between periodic statistics log lines
const STATS_INTERVAL_TICKS: u64 = 600;

/// Events sent from network tasks to the merge loop
#[derive(Debug)]
pub enum ServerEvent {
    Accepted {
        stream: TcpStream,
        addr: SocketAddr,
    },
    MessageReceived {
        player_id: u32,
        message: Message,
    },
    Disconnected {
        player_id: u32,
        reason: String,
    },
}

/// Authoritative server
///
/// Only the merge loop (`step`) touches the world and the connection
/// registry; every network task talks to it through the event queue.
pub struct Server {
    config: ServerConfig,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    game: GameState,
    connections: ConnectionManager,

    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        Self::bind_with_game(config, GameState::new()).await
    }

    /// Binds with a caller-supplied game state, e.g. a seeded one.
    pub async fn bind_with_game(
        config: ServerConfig,
        game: GameState,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            connections: ConnectionManager::new(config.max_clients),
            config,
            listener: Some(listener),
            local_addr,
            game,
            events_tx,
            events_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn world(&self) -> &World {
        &self.game.world
    }

    pub fn active_connections(&self) -> usize {
        self.connections.active_count()
    }

    /// Spawns the accept task. Calling it again is a no-op.
    pub fn start_accepting(&mut self) {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => return,
        };
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("Accepted TCP connection from {}", addr);
                        if events_tx.send(ServerEvent::Accepted { stream, addr }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Runs one tick: advance the world, then apply everything the network
    /// tasks queued since the previous tick, in arrival order.
    pub fn step(&mut self) {
        for hit in self.game.tick() {
            info!(
                "Player {} was hit by a projectile from player {}",
                hit.target_id, hit.owner_id
            );
        }

        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }

        if let Some(timeout) = self.config.client_timeout {
            for player_id in self.connections.find_timed_out(timeout) {
                self.disconnect(player_id, "idle timeout");
            }
        }
    }

    /// Accepts clients and steps the world at the configured tick rate, forever.
    pub async fn run(&mut self) {
        self.start_accepting();

        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started at {} Hz", self.config.tick_rate);

        loop {
            tick_interval.tick().await;
            self.step();

            if self.game.tick % STATS_INTERVAL_TICKS == 0 {
                debug!(
                    "Tick {}: active players {:?}, {} players, {} projectiles",
                    self.game.tick,
                    self.connections.active_ids(),
                    self.game.world.players.len(),
                    self.game.world.projectiles.len()
                );
            }
        }
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Accepted { stream, addr } => self.handle_accept(stream, addr),
            ServerEvent::MessageReceived { player_id, message } => {
                self.handle_message(player_id, message)
            }
            ServerEvent::Disconnected { player_id, reason } => {
                self.disconnect(player_id, &reason)
            }
        }
    }

    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.connections.is_full() {
            warn!(
                "Rejecting {}: server full ({} clients)",
                addr,
                self.connections.active_count()
            );
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        let player_id = self.connections.allocate_id();
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue.max(1));

        let writer = spawn_writer(player_id, write_half, outbound_rx, self.events_tx.clone());
        let reader = spawn_reader(player_id, read_half, self.events_tx.clone());
        self.connections
            .insert(Connection::new(player_id, addr, outbound_tx).with_tasks(reader, writer));

        let info = self.game.spawn_player(player_id);
        info!("Client {} connected as player {}", addr, player_id);
        self.send_to(player_id, Message::NewPlayerInfo(info));
    }

    fn handle_message(&mut self, player_id: u32, message: Message) {
        if !self.connections.touch(player_id) {
            debug!("Dropping message from inactive player {}", player_id);
            return;
        }

        match message {
            Message::GameInfoRequest => self.send_snapshot(player_id),
            Message::PlayerInfo(info) if info.id != player_id => {
                warn!(
                    "Rejecting state for player {} submitted by player {}",
                    info.id, player_id
                );
                self.send_snapshot(player_id);
            }
            Message::PlayerInfo(info) => {
                match self.game.apply_player_info(&info) {
                    MergeOutcome::Applied { .. } => {}
                    MergeOutcome::UnknownPlayer => {
                        warn!("Player {} sent state for unknown player {}", player_id, info.id)
                    }
                    MergeOutcome::Eliminated => {
                        debug!("Ignoring update for eliminated player {}", info.id)
                    }
                }
                self.send_snapshot(player_id);
            }
            other => {
                warn!(
                    "Ignoring unexpected {} message from player {}",
                    other.kind(),
                    player_id
                );
            }
        }
    }

    fn send_snapshot(&mut self, player_id: u32) {
        let snapshot = self.game.snapshot();
        self.send_to(player_id, Message::GameInfoSend(snapshot));
    }

    fn send_to(&mut self, player_id: u32, message: Message) {
        match self.connections.send(player_id, message) {
            Ok(()) | Err(SendError::Inactive) => {}
            Err(e) => self.disconnect(player_id, &e.to_string()),
        }
    }

    /// Deactivates the connection and marks its player Offline, once.
    fn disconnect(&mut self, player_id: u32, reason: &str) {
        if !self.connections.disconnect(player_id) {
            return;
        }

        self.game.mark_offline(player_id);
        let addr = self
            .connections
            .get(player_id)
            .map(|c| c.addr.to_string())
            .unwrap_or_default();
        info!("Client {} (player {}) disconnected: {}", addr, player_id, reason);
    }
}

/// Decodes frames from one client until the stream fails
fn spawn_reader(
    player_id: u32,
    read_half: OwnedReadHalf,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);

        loop {
            match read_message(&mut reader).await {
                Ok(message) => {
                    if events_tx
                        .send(ServerEvent::MessageReceived { player_id, message })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) if e.is_disconnect() => {
                    let _ = events_tx.send(ServerEvent::Disconnected {
                        player_id,
                        reason: e.to_string(),
                    });
                    break;
                }
                Err(e) => {
                    debug!("Dropping undecodable frame from player {}: {}", player_id, e);
                }
            }
        }
    })
}

/// Drains one client's outbound queue onto its socket
fn spawn_writer(
    player_id: u32,
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<Message>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = write_message(&mut write_half, &message).await {
                warn!("Failed to send {} to player {}: {}", message.kind(), player_id, e);
                let _ = events_tx.send(ServerEvent::Disconnected {
                    player_id,
                    reason: e.to_string(),
                });
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{encode_message, PlayerInfo, PlayerState, Vec2, MAX_FRAME_LEN};
    use tokio::io::AsyncWriteExt;
    use tokio::time::sleep;

    /// Raw socket client whose inbox is filled by a background reader.
    struct TestClient {
        writer: OwnedWriteHalf,
        inbox: mpsc::UnboundedReceiver<Message>,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, writer) = stream.into_split();
            let (tx, inbox) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                let mut reader = BufReader::new(read_half);
                while let Ok(message) = read_message(&mut reader).await {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
            });

            Self { writer, inbox }
        }

        async fn send(&mut self, message: &Message) {
            write_message(&mut self.writer, message).await.unwrap();
        }

        /// Steps the server until a message of the wanted kind arrives.
        async fn expect(&mut self, server: &mut Server, kind: shared::MessageKind) -> Message {
            for _ in 0..400 {
                server.step();
                while let Ok(message) = self.inbox.try_recv() {
                    if message.kind() == kind {
                        return message;
                    }
                }
                sleep(Duration::from_millis(5)).await;
            }
            panic!("no {} message arrived", kind);
        }
    }

    async fn test_server(config: ServerConfig) -> Server {
        let mut server = Server::bind_with_game(config, GameState::with_seed(3))
            .await
            .unwrap();
        server.start_accepting();
        server
    }

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    async fn step_until(server: &mut Server, done: impl Fn(&Server) -> bool) {
        for _ in 0..400 {
            server.step();
            if done(server) {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn new_player(message: Message) -> PlayerInfo {
        match message {
            Message::NewPlayerInfo(info) => info,
            other => panic!("expected NewPlayerInfo, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_accept_assigns_player_and_sends_new_player_info() {
        let mut server = test_server(local_config()).await;
        let mut client = TestClient::connect(server.local_addr()).await;

        let info = new_player(
            client
                .expect(&mut server, shared::MessageKind::NewPlayerInfo)
                .await,
        );

        assert_eq!(info.id, 0);
        assert_eq!(info.state, PlayerState::Online);
        assert_eq!(server.active_connections(), 1);
        assert_eq!(server.world().players.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_game_info_request_does_not_mutate() {
        let mut server = test_server(local_config()).await;
        let mut client = TestClient::connect(server.local_addr()).await;
        client
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;

        let before = server.world().dump_info();
        client.send(&Message::GameInfoRequest).await;
        let reply = client
            .expect(&mut server, shared::MessageKind::GameInfoSend)
            .await;

        match reply {
            Message::GameInfoSend(snapshot) => {
                assert_eq!(snapshot.players.len(), 1);
                assert_eq!(snapshot.players[0].id, before.players[0].id);
                assert_eq!(snapshot.players[0].state, PlayerState::Online);
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(server.world().projectiles.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_garbage_frame_keeps_connection() {
        let mut server = test_server(local_config()).await;
        let mut client = TestClient::connect(server.local_addr()).await;
        client
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;

        let mut garbage = 4u32.to_be_bytes().to_vec();
        garbage.extend_from_slice(&[0xFF; 4]);
        client.writer.write_all(&garbage).await.unwrap();
        client.send(&Message::GameInfoRequest).await;

        client
            .expect(&mut server, shared::MessageKind::GameInfoSend)
            .await;
        assert_eq!(server.active_connections(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unexpected_kind_is_ignored() {
        let mut server = test_server(local_config()).await;
        let mut client = TestClient::connect(server.local_addr()).await;
        client
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;

        let bogus = PlayerInfo::new(0, Vec2::new(1.0, 1.0));
        client
            .send(&Message::PlayerInfoBroadcast(bogus.clone()))
            .await;
        client.send(&Message::NewPlayerInfo(bogus)).await;
        client.send(&Message::GameInfoRequest).await;

        match client
            .expect(&mut server, shared::MessageKind::GameInfoSend)
            .await
        {
            Message::GameInfoSend(snapshot) => {
                assert_ne!(snapshot.players[0].position, Vec2::new(1.0, 1.0));
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(server.active_connections(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnect_marks_player_offline() {
        let mut server = test_server(local_config()).await;
        let mut client = TestClient::connect(server.local_addr()).await;
        client
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;

        drop(client);
        step_until(&mut server, |s| s.active_connections() == 0).await;

        let player = server.world().player(0).unwrap();
        assert_eq!(player.state, PlayerState::Offline);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_capacity_limit_rejects_extra_clients() {
        let config = ServerConfig {
            max_clients: 1,
            ..local_config()
        };
        let mut server = test_server(config).await;
        let mut first = TestClient::connect(server.local_addr()).await;
        first
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;

        let _second = TestClient::connect(server.local_addr()).await;
        for _ in 0..20 {
            server.step();
            sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(server.active_connections(), 1);
        assert_eq!(server.world().players.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_client_times_out() {
        let config = ServerConfig {
            client_timeout: Some(Duration::from_millis(50)),
            ..local_config()
        };
        let mut server = test_server(config).await;
        let mut client = TestClient::connect(server.local_addr()).await;
        client
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;

        step_until(&mut server, |s| s.active_connections() == 0).await;
        assert_eq!(
            server.world().player(0).unwrap().state,
            PlayerState::Offline
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_half_frame_does_not_stall_other_clients() {
        let mut server = test_server(local_config()).await;
        let mut stalled = TestClient::connect(server.local_addr()).await;
        stalled
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;

        // A length prefix promising 40 bytes that never come
        stalled.writer.write_all(&40u32.to_be_bytes()).await.unwrap();

        let mut other = TestClient::connect(server.local_addr()).await;
        let info = new_player(
            other
                .expect(&mut server, shared::MessageKind::NewPlayerInfo)
                .await,
        );
        assert_eq!(info.id, 1);

        other.send(&Message::GameInfoRequest).await;
        other
            .expect(&mut server, shared::MessageKind::GameInfoSend)
            .await;
        assert_eq!(server.active_connections(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_oversized_frame_disconnects() {
        let mut server = test_server(local_config()).await;
        let mut client = TestClient::connect(server.local_addr()).await;
        client
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;

        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        client.writer.write_all(&header).await.unwrap();

        step_until(&mut server, |s| s.active_connections() == 0).await;
        assert_eq!(
            server.world().player(0).unwrap().state,
            PlayerState::Offline
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_client_that_never_reads_is_dropped() {
        let config = ServerConfig {
            outbound_queue: 4,
            client_timeout: None,
            ..local_config()
        };
        // A crowded world makes every snapshot large enough to fill socket buffers
        let mut game = GameState::with_seed(3);
        for id in 1000..3000 {
            game.spawn_player(id);
        }
        let mut server = Server::bind_with_game(config, game).await.unwrap();
        server.start_accepting();

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        step_until(&mut server, |s| s.active_connections() == 1).await;

        let burst = encode_message(&Message::GameInfoRequest)
            .unwrap()
            .repeat(64);
        for _ in 0..400 {
            // Writes start failing once the server closes the socket
            let _ = stream.write_all(&burst).await;
            server.step();
            if server.active_connections() == 0 {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(server.active_connections(), 0);
        assert_eq!(
            server.world().player(0).unwrap().state,
            PlayerState::Offline
        );
    }

    #[tokio::test]
    async fn test_failed_send_disconnects() {
        let mut server = test_server(local_config()).await;

        let (outbound_tx, outbound_rx) = mpsc::channel(1);
        drop(outbound_rx);
        let player_id = server.connections.allocate_id();
        let addr = "127.0.0.1:9".parse().unwrap();
        server
            .connections
            .insert(Connection::new(player_id, addr, outbound_tx));
        server.game.spawn_player(player_id);

        server.handle_message(player_id, Message::GameInfoRequest);

        assert_eq!(server.active_connections(), 0);
        assert_eq!(
            server.world().player(player_id).unwrap().state,
            PlayerState::Offline
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writer_reports_broken_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        drop(peer);

        let (_read_half, write_half) = stream.into_split();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::channel(4);
        let _writer = spawn_writer(7, write_half, outbound_rx, events_tx);

        for _ in 0..400 {
            let _ = outbound_tx.try_send(Message::GameInfoRequest);
            if let Ok(event) = events_rx.try_recv() {
                match event {
                    ServerEvent::Disconnected { player_id, .. } => assert_eq!(player_id, 7),
                    other => panic!("unexpected event {:?}", other),
                }
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("writer never reported the broken socket");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_state_for_another_player_is_rejected() {
        let mut server = test_server(local_config()).await;
        let mut attacker = TestClient::connect(server.local_addr()).await;
        attacker
            .expect(&mut server, shared::MessageKind::NewPlayerInfo)
            .await;
        let mut victim = TestClient::connect(server.local_addr()).await;
        let victim_info = new_player(
            victim
                .expect(&mut server, shared::MessageKind::NewPlayerInfo)
                .await,
        );

        attacker
            .send(&Message::PlayerInfo(PlayerInfo {
                state: PlayerState::Dead,
                attacking: true,
                ..PlayerInfo::new(victim_info.id, Vec2::new(5.0, 5.0))
            }))
            .await;

        match attacker
            .expect(&mut server, shared::MessageKind::GameInfoSend)
            .await
        {
            Message::GameInfoSend(snapshot) => {
                assert_eq!(snapshot.players[1], victim_info);
                assert!(snapshot.projectiles.is_empty());
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(server.active_connections(), 2);
    }

    #[test]
    fn test_request_frame_layout() {
        let frame = encode_message(&Message::GameInfoRequest).unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[..4], &4u32.to_be_bytes());
    }
}

use crate::game::ClientWorld;
use crate::hooks::{FrameSink, InputSource};
use log::{debug, info, warn};
use shared::{read_message, write_message, InputState, Message, PlayerInfo, ProtocolError};
use std::time::Duration;
use tokio::io::{AsyncRead, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    /// How long to wait for `NewPlayerInfo` after connecting.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:12345".to_string(),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Client synchronizer
///
/// A listener task decodes inbound frames into a queue and a writer task
/// drains the outbound queue onto the socket. Everything else, including the
/// world mirror, lives on the caller's frame loop and is driven through
/// synchronous calls, so it works from a render loop that is not async.
pub struct Client {
    world: ClientWorld,
    connected: bool,

    inbound: mpsc::UnboundedReceiver<Message>,
    outbound: mpsc::UnboundedSender<Message>,
    listener: JoinHandle<()>,
}

impl Client {
    /// Connects and blocks until the server has assigned a player.
    pub async fn connect(config: ClientConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}...", config.server_addr);
        let stream = TcpStream::connect(&config.server_addr).await?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let welcome = timeout(config.handshake_timeout, wait_for_new_player(&mut reader))
            .await
            .map_err(|_| {
                format!(
                    "no NewPlayerInfo within {:?} of connecting",
                    config.handshake_timeout
                )
            })??;
        info!("Connected as player {}", welcome.id);

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let listener = spawn_listener(reader, inbound_tx);
        spawn_writer(write_half, outbound_rx);

        let mut world = ClientWorld::new();
        world.adopt(&welcome);

        Ok(Client {
            world,
            connected: true,
            inbound,
            outbound,
            listener,
        })
    }

    /// Always `Some` once `connect` has returned.
    pub fn owned_id(&self) -> Option<u32> {
        self.world.owned_id()
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Applies every message the listener has queued. Returns how many were handled.
    pub fn poll_server(&mut self) -> usize {
        let mut handled = 0;

        loop {
            match self.inbound.try_recv() {
                Ok(message) => {
                    self.handle_message(message);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        warn!("Lost connection to server");
                        self.connected = false;
                    }
                    break;
                }
            }
        }

        handled
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::GameInfoSend(snapshot) => self.world.apply_snapshot(&snapshot),
            Message::NewPlayerInfo(info) => {
                warn!("Ignoring repeated NewPlayerInfo for player {}", info.id)
            }
            other => warn!("Ignoring unexpected {} message from server", other.kind()),
        }
    }

    /// One client frame: merge what arrived, apply input, step the mirror,
    /// then submit the owned player.
    pub fn tick(&mut self, input: &InputState) -> Result<(), ProtocolError> {
        self.poll_server();
        self.world.apply_input(input);
        self.world.update();
        self.submit()
    }

    /// Sends the owned player's current state.
    pub fn submit(&mut self) -> Result<(), ProtocolError> {
        match self.world.owned_info() {
            Some(info) => self.send(Message::PlayerInfo(info)),
            None => Ok(()),
        }
    }

    /// Asks the server for a full snapshot outside the regular submission.
    pub fn request_snapshot(&mut self) -> Result<(), ProtocolError> {
        self.send(Message::GameInfoRequest)
    }

    /// Polls `input`, runs one tick and hands the result to `sink`.
    ///
    /// The sink sees the world even when the submission failed.
    pub fn run_frame<I, S>(&mut self, input: &mut I, sink: &mut S) -> Result<(), ProtocolError>
    where
        I: InputSource + ?Sized,
        S: FrameSink + ?Sized,
    {
        let intent = input.poll_input();
        let result = self.tick(&intent);
        sink.on_tick(self.world.world(), self.world.owned_id());
        result
    }

    fn send(&mut self, message: Message) -> Result<(), ProtocolError> {
        if !self.connected {
            return Err(ProtocolError::Closed);
        }

        self.outbound.send(message).map_err(|_| {
            self.connected = false;
            ProtocolError::Closed
        })
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Handshake receive. Other kinds and undecodable frames are skipped.
async fn wait_for_new_player<R>(reader: &mut R) -> Result<PlayerInfo, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(reader).await {
            Ok(Message::NewPlayerInfo(info)) => return Ok(info),
            Ok(other) => warn!("Ignoring {} before handshake", other.kind()),
            Err(e) if e.is_disconnect() => return Err(e),
            Err(e) => debug!("Dropping undecodable frame during handshake: {}", e),
        }
    }
}

fn spawn_listener(
    mut reader: BufReader<OwnedReadHalf>,
    inbound_tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match read_message(&mut reader).await {
                Ok(message) => {
                    if inbound_tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) if e.is_disconnect() => {
                    info!("Server connection ended: {}", e);
                    break;
                }
                Err(e) => debug!("Dropping undecodable frame from server: {}", e),
            }
        }
    })
}

/// Ends when the outbound queue closes, which shuts down the write half.
fn spawn_writer(
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
) {
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = write_message(&mut write_half, &message).await {
                warn!("Failed to send {}: {}", message.kind(), e);
                break;
            }
        }
    });
}

//! Registry of client connections for the authoritative server
//!
//! This module tracks every TCP connection the server has accepted:
//! - Player id assignment from a monotonic counter (ids are never reused)
//! - The outbound queue feeding each connection's writer task
//! - Liveness: the one-way active flag and last-activity timestamps
//! - Capacity enforcement against the configured client limit
//!
//! Connections are never removed. A disconnected entry stays in the registry
//! with its active flag cleared and its transport resources released.

use log::info;
use shared::Message;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Why a message could not be queued for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// No such connection, or it was already deactivated
    Inactive,
    /// The writer is not keeping up; the peer has stopped reading
    QueueFull,
    /// The writer task has exited
    Closed,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Inactive => write!(f, "connection inactive"),
            SendError::QueueFull => write!(f, "outbound queue full"),
            SendError::Closed => write!(f, "send failed"),
        }
    }
}

/// One client connection and the player it controls
#[derive(Debug)]
pub struct Connection {
    /// Id of the player this connection was assigned on accept
    pub player_id: u32,
    /// Remote address of the client
    pub addr: SocketAddr,
    /// Last time a message arrived from this client
    pub last_seen: Instant,
    active: bool,
    outbound: Option<mpsc::Sender<Message>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Connection {
    /// Creates an active connection whose messages are queued on `outbound`
    pub fn new(player_id: u32, addr: SocketAddr, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            player_id,
            addr,
            last_seen: Instant::now(),
            active: true,
            outbound: Some(outbound),
            reader: None,
            writer: None,
        }
    }

    /// Attaches the I/O tasks so they can be stopped on disconnect
    pub fn with_tasks(mut self, reader: JoinHandle<()>, writer: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self.writer = Some(writer);
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Queues `message` for the writer task without waiting
    ///
    /// Any error means the connection can no longer be served; callers treat
    /// it the same as a reset.
    pub fn send(&self, message: Message) -> Result<(), SendError> {
        let outbound = match &self.outbound {
            Some(outbound) if self.active => outbound,
            _ => return Err(SendError::Inactive),
        };

        outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Clears the active flag and releases the transport
    ///
    /// Both I/O tasks are aborted, so a writer blocked on a peer that stopped
    /// reading cannot keep the socket open. Returns true only on the first call.
    pub fn disconnect(&mut self) -> bool {
        if !self.active {
            return false;
        }

        self.active = false;
        self.outbound = None;
        for task in [self.reader.take(), self.writer.take()].into_iter().flatten() {
            task.abort();
        }
        true
    }
}

/// Arena of connections keyed by player id
pub struct ConnectionManager {
    connections: BTreeMap<u32, Connection>,
    next_player_id: u32,
    max_clients: usize,
}

impl ConnectionManager {
    /// Creates an empty registry admitting at most `max_clients` active connections
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_player_id: 0,
            max_clients,
        }
    }

    /// Returns true when no further connection may be admitted
    pub fn is_full(&self) -> bool {
        self.active_count() >= self.max_clients
    }

    /// Hands out the next player id
    ///
    /// Ids count every connection ever admitted, starting at 0, so a
    /// reconnecting client never aliases a previous player.
    pub fn allocate_id(&mut self) -> u32 {
        let id = self.next_player_id;
        self.next_player_id += 1;
        id
    }

    pub fn insert(&mut self, connection: Connection) {
        info!(
            "Registered connection from {} as player {}",
            connection.addr, connection.player_id
        );
        self.connections.insert(connection.player_id, connection);
    }

    pub fn get(&self, player_id: u32) -> Option<&Connection> {
        self.connections.get(&player_id)
    }

    /// Refreshes liveness for an active connection
    ///
    /// Returns false if the connection is unknown or already inactive.
    pub fn touch(&mut self, player_id: u32) -> bool {
        match self.connections.get_mut(&player_id) {
            Some(connection) if connection.is_active() => {
                connection.touch();
                true
            }
            _ => false,
        }
    }

    /// Queues `message` for `player_id`
    pub fn send(&self, player_id: u32, message: Message) -> Result<(), SendError> {
        match self.connections.get(&player_id) {
            Some(connection) => connection.send(message),
            None => Err(SendError::Inactive),
        }
    }

    /// Permanently deactivates a connection
    ///
    /// Returns true if this call performed the transition.
    pub fn disconnect(&mut self, player_id: u32) -> bool {
        self.connections
            .get_mut(&player_id)
            .map_or(false, Connection::disconnect)
    }

    /// Active connections that have been silent for longer than `timeout`
    pub fn find_timed_out(&self, timeout: Duration) -> Vec<u32> {
        self.connections
            .values()
            .filter(|c| c.is_active() && c.is_timed_out(timeout))
            .map(|c| c.player_id)
            .collect()
    }

    /// Player ids of active connections, in connection order
    pub fn active_ids(&self) -> Vec<u32> {
        self.connections
            .values()
            .filter(|c| c.is_active())
            .map(|c| c.player_id)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.connections.values().filter(|c| c.is_active()).count()
    }
}

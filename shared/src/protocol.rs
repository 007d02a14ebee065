//! Messages exchanged between the server and its clients.
//!
//! Every message is a variant of [`Message`]; the variant is the kind tag and
//! carries its own strongly-typed payload. Snapshots are always complete: a
//! [`WorldInfo`] holds every player and every live projectile.

use crate::world::Projectile;
use crate::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Message {
    /// Client asks for a full snapshot. Answered with `GameInfoSend`.
    GameInfoRequest,
    /// Server to client: the complete world.
    GameInfoSend(WorldInfo),
    /// Reserved. Never sent; ignored on receipt.
    PlayerInfoBroadcast(PlayerInfo),
    /// Client to server: the current state of the client's own player.
    PlayerInfo(PlayerInfo),
    /// Server to client, once per connection: the freshly assigned player.
    NewPlayerInfo(PlayerInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    GameInfoRequest,
    GameInfoSend,
    PlayerInfoBroadcast,
    PlayerInfo,
    NewPlayerInfo,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::GameInfoRequest => MessageKind::GameInfoRequest,
            Message::GameInfoSend(_) => MessageKind::GameInfoSend,
            Message::PlayerInfoBroadcast(_) => MessageKind::PlayerInfoBroadcast,
            Message::PlayerInfo(_) => MessageKind::PlayerInfo,
            Message::NewPlayerInfo(_) => MessageKind::NewPlayerInfo,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle of a player as seen by every participant.
///
/// Which player a client controls is not part of this state; clients track
/// that locally so the label never reaches the shared world.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Online,
    /// Terminal: the owning connection is gone.
    Offline,
    /// Terminal: hit by a projectile.
    Dead,
}

impl PlayerState {
    pub fn is_alive(&self) -> bool {
        matches!(self, PlayerState::Online)
    }
}

/// Everything about a player that crosses the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Facing in degrees, counter-clockwise on screen.
    pub angle: f32,
    pub state: PlayerState,
    /// True only for the tick in which the player fired.
    pub attacking: bool,
}

impl PlayerInfo {
    pub fn new(id: u32, position: Vec2) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            angle: 0.0,
            state: PlayerState::Online,
            attacking: false,
        }
    }
}

/// Full world snapshot. Players are listed in connection order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WorldInfo {
    pub players: Vec<PlayerInfo>,
    pub projectiles: Vec<Projectile>,
}

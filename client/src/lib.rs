//! # Game Client Library
//!
//! Client side of the skirmish game: a mirror of the server's world, the one
//! player this client controls, and the connection that keeps both in step.
//!
//! ## Synchronization Model
//!
//! Every frame the client merges whatever snapshots the server has sent,
//! applies local input to its own player, advances the mirror one tick and
//! submits its player's full state as a `PlayerInfo` message. The server
//! answers each submission with a complete `GameInfoSend` snapshot.
//!
//! The server is trusted for every entity, the owned one included: a snapshot
//! overwrites the owned player's position, velocity, angle, state and attack
//! flag like any other. Between snapshots the mirror moves players and
//! projectiles locally but never resolves hits.
//!
//! Which player is "ours" is a client-local fact ([`game::Role`]) and never
//! appears in the shared player state, so snapshots merge by id with no
//! relabelling.
//!
//! ## Module Organization
//!
//! - [`game`]: [`game::ClientWorld`], the mirror plus the ownership lens
//! - [`network`]: [`network::Client`], connection, handshake and per-frame driving
//! - [`hooks`]: the input and render seams the frame loop calls through
//! - [`input`]: keyboard and mouse sampling with macroquad
//! - [`rendering`]: macroquad drawing of players and projectiles
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::hooks::FrameSink;
//! use client::network::{Client, ClientConfig};
//! use shared::{InputState, World};
//!
//! struct Log;
//!
//! impl FrameSink for Log {
//!     fn on_tick(&mut self, world: &World, owned_id: Option<u32>) {
//!         println!("{} players, we are {:?}", world.players.len(), owned_id);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect(ClientConfig::default()).await?;
//!     let mut idle = InputState::default;
//!
//!     loop {
//!         client.run_frame(&mut idle, &mut Log)?;
//!         tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//!     }
//! }
//! ```

pub mod game;
pub mod hooks;
pub mod input;
pub mod network;
pub mod rendering;

//! # Game Server Library
//!
//! Authoritative server for the top-down skirmish game. It owns the canonical
//! world, accepts TCP clients, merges the player states they submit and
//! answers every submission with a complete snapshot.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server advances the world at a fixed tick rate: players drift and
//! damp, projectiles fly, and projectile hits are resolved here only. A hit
//! player becomes Dead and stays Dead.
//!
//! ### Client Management
//! Every accepted connection is assigned the next player id (starting at 0,
//! never reused) and receives a `NewPlayerInfo` describing its player. A
//! connection that closes, errors or goes silent past the idle timeout is
//! deactivated and its player is marked Offline.
//!
//! ### Request/Reply Synchronization
//! There is no broadcast. A client that sends `PlayerInfo` or
//! `GameInfoRequest` gets a `GameInfoSend` snapshot back; a client that stays
//! quiet receives nothing after its welcome message.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Merge Loop
//! Each connection has a reader task and a writer task. Readers decode frames
//! and queue events; the merge loop in [`network::Server::step`] drains the
//! queue once per tick, so the world and the connection registry are only
//! ever touched by one task.
//!
//! ## Module Organization
//!
//! - [`config`]: runtime settings (bind address, tick rate, limits)
//! - [`connection_manager`]: id assignment, outbound queues, liveness
//! - [`game`]: canonical world, spawning and state merging
//! - [`network`]: accept loop, per-connection tasks, the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection_manager;
pub mod game;
pub mod network;

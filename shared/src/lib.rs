//! Types shared by the server and client: tuning constants, 2D math, the wire
//! protocol with its stream codec, and the world model both sides simulate.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

pub mod codec;
pub mod protocol;
pub mod world;

pub use codec::{decode_payload, encode_message, read_message, write_message, ProtocolError};
pub use protocol::{Message, MessageKind, PlayerInfo, PlayerState, WorldInfo};
pub use world::{Hit, Player, Projectile, World};

pub const PLAYER_SPEED: f32 = 2.0;
pub const VELOCITY_DAMPING: f32 = 0.9;
pub const PLAYER_SIZE: f32 = 32.0;

pub const PROJECTILE_SPEED: f32 = 5.0;
pub const PROJECTILE_RANGE: f32 = 500.0;
pub const PROJECTILE_SIZE: f32 = 6.0;
/// Fraction of a projectile's velocity transferred to the player it hits.
pub const HIT_IMPULSE_FACTOR: f32 = 0.5;
/// Ticks a player must wait between two shots.
pub const FIRE_COOLDOWN_TICKS: u32 = 15;

pub const SPAWN_WIDTH: f32 = 400.0;
pub const SPAWN_HEIGHT: f32 = 300.0;
pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;

/// Upper bound on a single encoded message, enforced on both ends of a stream.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing `degrees` clockwise from +x in screen space (y grows downward).
    pub fn from_degrees(degrees: f32) -> Self {
        let radians = degrees.to_radians();
        Self {
            x: radians.cos(),
            y: radians.sin(),
        }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned box of `size` centred on `center`, as `(min_x, min_y, max_x, max_y)`.
pub fn get_bounds(center: Vec2, size: f32) -> (f32, f32, f32, f32) {
    let half = size / 2.0;
    (
        center.x - half,
        center.y - half,
        center.x + half,
        center.y + half,
    )
}

/// Boxes that merely touch along an edge do not overlap.
pub fn check_overlap(a: (f32, f32, f32, f32), b: (f32, f32, f32, f32)) -> bool {
    let (x1, y1, x2, y2) = a;
    let (x3, y3, x4, y4) = b;

    !(x2 <= x3 || x4 <= x1 || y2 <= y3 || y4 <= y1)
}

/// Intent sampled from the input device for one client frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub move_left: bool,
    pub move_right: bool,
    pub move_up: bool,
    pub move_down: bool,
    pub fire: bool,
    /// Point the player should face, if the pointer is available.
    pub aim: Option<Vec2>,
}

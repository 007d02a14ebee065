//! Simulation state shared by the authoritative server and the client mirror.

use crate::protocol::{PlayerInfo, PlayerState, WorldInfo};
use crate::{
    check_overlap, get_bounds, InputState, Vec2, FIRE_COOLDOWN_TICKS, HIT_IMPULSE_FACTOR,
    PLAYER_SIZE, PLAYER_SPEED, PROJECTILE_RANGE, PROJECTILE_SIZE, PROJECTILE_SPEED,
    VELOCITY_DAMPING,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Movement intents currently held down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Controls {
    left: bool,
    right: bool,
    up: bool,
    down: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub state: PlayerState,
    pub attacking: bool,

    // Local-only; never serialized and untouched by `load_info`.
    controls: Controls,
    fire_held: bool,
    cooldown: u32,
}

impl Player {
    pub fn new(id: u32, position: Vec2) -> Self {
        Self::from_info(&PlayerInfo::new(id, position))
    }

    pub fn from_info(info: &PlayerInfo) -> Self {
        Self {
            id: info.id,
            position: info.position,
            velocity: info.velocity,
            angle: info.angle,
            state: info.state,
            attacking: info.attacking,
            controls: Controls::default(),
            fire_held: false,
            cooldown: 0,
        }
    }

    pub fn dump_info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
            angle: self.angle,
            state: self.state,
            attacking: self.attacking,
        }
    }

    /// Overwrites every wire-visible field; local input state is kept.
    pub fn load_info(&mut self, info: &PlayerInfo) {
        self.id = info.id;
        self.position = info.position;
        self.velocity = info.velocity;
        self.angle = info.angle;
        self.state = info.state;
        self.attacking = info.attacking;
    }

    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        get_bounds(self.position, PLAYER_SIZE)
    }

    pub fn turn_to(&mut self, point: Vec2) {
        let rel = point - self.position;
        self.angle = -rel.y.atan2(rel.x).to_degrees();
    }

    /// Unit vector the player is facing, in screen space.
    pub fn facing(&self) -> Vec2 {
        Vec2::from_degrees(-self.angle)
    }

    /// Latches one frame of input. Players that are no longer alive take no input.
    pub fn apply_input(&mut self, input: &InputState) {
        if !self.state.is_alive() {
            self.controls = Controls::default();
            self.fire_held = input.fire;
            self.attacking = false;
            return;
        }

        self.controls = Controls {
            left: input.move_left,
            right: input.move_right,
            up: input.move_up,
            down: input.move_down,
        };

        if let Some(aim) = input.aim {
            self.turn_to(aim);
        }

        // Edge-triggered: a held button fires once, then waits for release.
        self.attacking = input.fire && !self.fire_held && self.cooldown == 0;
        if self.attacking {
            self.cooldown = FIRE_COOLDOWN_TICKS;
        }
        self.fire_held = input.fire;
    }

    pub fn update(&mut self) {
        self.position += self.velocity;
        self.velocity = self.velocity * VELOCITY_DAMPING;

        // Held intents replace the axis outright; later checks win.
        if self.controls.left {
            self.velocity.x = -PLAYER_SPEED;
        }
        if self.controls.right {
            self.velocity.x = PLAYER_SPEED;
        }
        if self.controls.up {
            self.velocity.y = -PLAYER_SPEED;
        }
        if self.controls.down {
            self.velocity.y = PLAYER_SPEED;
        }

        self.cooldown = self.cooldown.saturating_sub(1);
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Projectile {
    pub owner_id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub start_position: Vec2,
    pub destroyed: bool,
}

impl Projectile {
    pub fn new(owner_id: u32, position: Vec2, velocity: Vec2, angle: f32) -> Self {
        Self {
            owner_id,
            position,
            velocity,
            angle,
            start_position: position,
            destroyed: false,
        }
    }

    /// Projectile leaving `player` along its facing, one step ahead of its centre.
    pub fn fired_by(player: &Player) -> Self {
        let velocity = player.facing() * PROJECTILE_SPEED;
        Self::new(player.id, player.position + velocity, velocity, player.angle)
    }

    pub fn distance_travelled(&self) -> f32 {
        self.position.distance(self.start_position)
    }

    pub fn get_bounds(&self) -> (f32, f32, f32, f32) {
        get_bounds(self.position, PROJECTILE_SIZE)
    }

    pub fn update(&mut self) {
        self.position += self.velocity;
        if self.distance_travelled() > PROJECTILE_RANGE {
            self.destroyed = true;
        }
    }
}

/// A projectile striking a player during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub owner_id: u32,
    pub target_id: u32,
}

/// Players keyed by id (ids are handed out in connection order, so iteration
/// order is connection order) plus the live projectiles.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct World {
    pub players: BTreeMap<u32, Player>,
    pub projectiles: Vec<Projectile>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Fires a projectile from player `owner_id`. Returns false for unknown players.
    pub fn spawn_projectile(&mut self, owner_id: u32) -> bool {
        match self.players.get(&owner_id) {
            Some(owner) => {
                self.projectiles.push(Projectile::fired_by(owner));
                true
            }
            None => false,
        }
    }

    /// Authoritative tick: moves everything, resolves hits, prunes spent projectiles.
    pub fn tick(&mut self) -> Vec<Hit> {
        self.step(true)
    }

    /// Mirror tick: moves everything but leaves hit resolution to the server.
    pub fn tick_predicted(&mut self) {
        self.step(false);
    }

    fn step(&mut self, resolve_hits: bool) -> Vec<Hit> {
        for player in self.players.values_mut() {
            player.update();
        }

        let mut hits = Vec::new();
        for projectile in self.projectiles.iter_mut().filter(|p| !p.destroyed) {
            projectile.update();
            if projectile.destroyed || !resolve_hits {
                continue;
            }

            let bounds = projectile.get_bounds();
            let target = self.players.values_mut().find(|player| {
                player.id != projectile.owner_id
                    && player.state.is_alive()
                    && check_overlap(bounds, player.get_bounds())
            });

            if let Some(player) = target {
                player.state = PlayerState::Dead;
                player.velocity += projectile.velocity * HIT_IMPULSE_FACTOR;
                projectile.destroyed = true;
                hits.push(Hit {
                    owner_id: projectile.owner_id,
                    target_id: player.id,
                });
            }
        }

        self.projectiles.retain(|p| !p.destroyed);
        hits
    }

    pub fn dump_info(&self) -> WorldInfo {
        WorldInfo {
            players: self.players.values().map(Player::dump_info).collect(),
            projectiles: self.projectiles.clone(),
        }
    }

    /// Merges a snapshot: known ids are overwritten in place, unseen ids are
    /// inserted, and the projectile list is replaced wholesale.
    pub fn load_info(&mut self, info: &WorldInfo) {
        for player_info in &info.players {
            match self.players.get_mut(&player_info.id) {
                Some(player) => player.load_info(player_info),
                None => {
                    self.players
                        .insert(player_info.id, Player::from_info(player_info));
                }
            }
        }
        self.projectiles = info.projectiles.clone();
    }
}

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Hit, Player, PlayerInfo, PlayerState, Vec2, World, WorldInfo, SPAWN_HEIGHT, SPAWN_WIDTH};

/// Result of merging a client-submitted player state into the canonical world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied { fired: bool },
    /// No player with the submitted id exists.
    UnknownPlayer,
    /// The player is Dead or Offline; terminal states are never overwritten.
    Eliminated,
}

/// Canonical world owned by the server's merge loop.
#[derive(Debug)]
pub struct GameState {
    pub tick: u64,
    pub world: World,
    rng: StdRng,
}

impl GameState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic spawn positions, for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tick: 0,
            world: World::new(),
            rng,
        }
    }

    /// Creates player `id` at a random point inside the spawn area.
    pub fn spawn_player(&mut self, id: u32) -> PlayerInfo {
        let position = Vec2::new(
            self.rng.gen_range(0.0..=SPAWN_WIDTH),
            self.rng.gen_range(0.0..=SPAWN_HEIGHT),
        );
        let player = Player::new(id, position);
        let info = player.dump_info();

        info!("Spawned player {} at ({:.1}, {:.1})", id, position.x, position.y);
        self.world.add_player(player);
        info
    }

    /// Overwrites the submitted player's state and fires if the client says so.
    pub fn apply_player_info(&mut self, info: &PlayerInfo) -> MergeOutcome {
        match self.world.player_mut(info.id) {
            None => MergeOutcome::UnknownPlayer,
            Some(player) if !player.state.is_alive() => MergeOutcome::Eliminated,
            Some(player) => {
                player.load_info(info);
                let fired = info.attacking
                    && info.state.is_alive()
                    && self.world.spawn_projectile(info.id);
                if fired {
                    debug!("Player {} fired at angle {:.1}", info.id, info.angle);
                }
                MergeOutcome::Applied { fired }
            }
        }
    }

    /// Returns true if the player existed and was not already Offline.
    pub fn mark_offline(&mut self, id: u32) -> bool {
        match self.world.player_mut(id) {
            Some(player) if player.state != PlayerState::Offline => {
                player.state = PlayerState::Offline;
                player.attacking = false;
                true
            }
            _ => false,
        }
    }

    pub fn tick(&mut self) -> Vec<Hit> {
        self.tick += 1;
        self.world.tick()
    }

    pub fn snapshot(&self) -> WorldInfo {
        self.world.dump_info()
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

use log::{debug, info};
use shared::{InputState, Player, PlayerInfo, World, WorldInfo};

/// How this client relates to a player in its mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The player this client controls.
    Local,
    Remote,
}

impl Role {
    /// Role of player `id` for a client that owns `owned_id`.
    pub fn of(id: u32, owned_id: Option<u32>) -> Self {
        if Some(id) == owned_id {
            Role::Local
        } else {
            Role::Remote
        }
    }
}

/// Client-side mirror of the server world plus the one player this client owns.
///
/// Ownership is tracked here rather than in `PlayerState`, so a snapshot from
/// the server can be merged by id without relabelling anything first.
#[derive(Debug, Clone, Default)]
pub struct ClientWorld {
    world: World,
    owned_id: Option<u32>,
}

impl ClientWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of the player announced by `NewPlayerInfo`.
    pub fn adopt(&mut self, info: &PlayerInfo) {
        info!("Controlling player {}", info.id);
        self.owned_id = Some(info.id);
        self.world.add_player(Player::from_info(info));
    }

    /// Merges a server snapshot by player id and replaces all projectiles.
    ///
    /// The owned player is overwritten like any other; the server's copy wins.
    pub fn apply_snapshot(&mut self, snapshot: &WorldInfo) {
        let before = self.world.players.len();
        self.world.load_info(snapshot);

        let added = self.world.players.len() - before;
        if added > 0 {
            debug!("Snapshot introduced {} new player(s)", added);
        }
    }

    pub fn owned_id(&self) -> Option<u32> {
        self.owned_id
    }

    pub fn owned_player(&self) -> Option<&Player> {
        self.owned_id.and_then(|id| self.world.player(id))
    }

    pub fn role_of(&self, id: u32) -> Option<Role> {
        self.world.player(id).map(|_| Role::of(id, self.owned_id))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Feeds one frame of local input to the owned player.
    pub fn apply_input(&mut self, input: &InputState) {
        if let Some(player) = self.owned_id.and_then(|id| self.world.player_mut(id)) {
            player.apply_input(input);
        }
    }

    /// Advances the mirror one tick. Hits are left to the server.
    pub fn update(&mut self) {
        self.world.tick_predicted();
    }

    /// Wire form of the owned player, for `PlayerInfo` submissions.
    pub fn owned_info(&self) -> Option<PlayerInfo> {
        self.owned_player().map(Player::dump_info)
    }
}

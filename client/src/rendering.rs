use crate::game::Role;
use crate::hooks::FrameSink;
use macroquad::color::{Color, BLUE, GRAY, RED, WHITE, YELLOW};
use macroquad::shapes::{draw_line, draw_poly, draw_rectangle};
use macroquad::text::draw_text;
use macroquad::window::clear_background;
use shared::{Player, PlayerState, World, PLAYER_SIZE, PROJECTILE_SIZE};
use std::f32::consts::SQRT_2;

pub fn player_color(role: Role, state: PlayerState) -> Color {
    match (role, state) {
        (_, PlayerState::Dead) => Color::from_rgba(120, 20, 20, 255),
        (_, PlayerState::Offline) => GRAY,
        (Role::Local, PlayerState::Online) => RED,
        (Role::Remote, PlayerState::Online) => BLUE,
    }
}

/// Draws the local world with macroquad
pub struct Renderer {
    show_hud: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer { show_hud: true }
    }

    pub fn with_hud(mut self, show_hud: bool) -> Self {
        self.show_hud = show_hud;
        self
    }

    pub fn render(&mut self, world: &World, owned_id: Option<u32>) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        for player in world.players.values() {
            let role = Role::of(player.id, owned_id);
            self.draw_player(player, player_color(role, player.state));
        }

        for projectile in &world.projectiles {
            let half = PROJECTILE_SIZE / 2.0;
            draw_rectangle(
                projectile.position.x - half,
                projectile.position.y - half,
                PROJECTILE_SIZE,
                PROJECTILE_SIZE,
                YELLOW,
            );
        }

        if self.show_hud {
            self.draw_hud(world, owned_id);
        }
    }

    fn draw_player(&mut self, player: &Player, color: Color) {
        let center = player.position;
        // draw_poly rotates clockwise on screen, angles here run counter-clockwise
        draw_poly(
            center.x,
            center.y,
            4,
            PLAYER_SIZE / SQRT_2,
            45.0 - player.angle,
            color,
        );

        if player.state.is_alive() {
            let nose = center + player.facing() * (PLAYER_SIZE * 0.75);
            draw_line(center.x, center.y, nose.x, nose.y, 2.0, WHITE);
        }

        let label = player.id.to_string();
        draw_text(
            &label,
            center.x - 4.0,
            center.y - PLAYER_SIZE / 2.0 - 6.0,
            16.0,
            WHITE,
        );
    }

    fn draw_hud(&mut self, world: &World, owned_id: Option<u32>) {
        let status = match owned_id.and_then(|id| world.player(id)) {
            Some(player) => format!("player {} ({:?})", player.id, player.state),
            None => "not connected".to_string(),
        };
        draw_text(&status, 10.0, 20.0, 18.0, WHITE);

        let counts = format!(
            "{} players, {} projectiles",
            world.players.len(),
            world.projectiles.len()
        );
        draw_text(&counts, 10.0, 38.0, 18.0, WHITE);
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for Renderer {
    fn on_tick(&mut self, world: &World, owned_id: Option<u32>) {
        self.render(world, owned_id);
    }
}

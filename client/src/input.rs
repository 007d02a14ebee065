//! Keyboard and mouse sampling for the owned player

use crate::hooks::InputSource;
use macroquad::input::{is_key_down, is_mouse_button_down, mouse_position, KeyCode, MouseButton};
use shared::{InputState, Vec2};

/// Raw device state for one frame, before it becomes an [`InputState`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceSample {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub fire: bool,
    pub resync: bool,
    pub mouse: Option<(f32, f32)>,
}

impl DeviceSample {
    /// Reads the macroquad input state. Needs a live window.
    pub fn capture() -> Self {
        Self {
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
            up: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            fire: is_mouse_button_down(MouseButton::Left) || is_key_down(KeyCode::Space),
            resync: is_key_down(KeyCode::R),
            mouse: Some(mouse_position()),
        }
    }
}

/// Turns device samples into player intent and detects key presses
pub struct InputManager {
    current_input: InputState,
    resync_requested: bool,

    // Previous frame key state for edge detection
    prev_key_r: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            current_input: InputState::default(),
            resync_requested: false,
            prev_key_r: false,
        }
    }

    /// Folds one device sample into the current input.
    ///
    /// Fire is passed through as held; the player turns it into a single shot.
    pub fn update(&mut self, sample: DeviceSample) -> InputState {
        if sample.resync && !self.prev_key_r {
            self.resync_requested = true;
        }
        self.prev_key_r = sample.resync;

        self.current_input = InputState {
            move_left: sample.left,
            move_right: sample.right,
            move_up: sample.up,
            move_down: sample.down,
            fire: sample.fire,
            aim: sample.mouse.map(|(x, y)| Vec2::new(x, y)),
        };
        self.current_input
    }

    /// Returns true once per press of the resync key.
    pub fn take_resync_request(&mut self) -> bool {
        std::mem::take(&mut self.resync_requested)
    }

    pub fn get_current_input(&self) -> &InputState {
        &self.current_input
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for InputManager {
    fn poll_input(&mut self) -> InputState {
        self.update(DeviceSample::capture())
    }
}

//! Seams between the synchronizer and whatever draws the game and reads the
//! input devices. The synchronizer calls these; they never call back into it.

use shared::{InputState, World};

/// Supplies one frame of player intent.
pub trait InputSource {
    fn poll_input(&mut self) -> InputState;
}

/// Receives the local world once per client frame.
pub trait FrameSink {
    fn on_tick(&mut self, world: &World, owned_id: Option<u32>);
}

impl<F> InputSource for F
where
    F: FnMut() -> InputState,
{
    fn poll_input(&mut self) -> InputState {
        self()
    }
}

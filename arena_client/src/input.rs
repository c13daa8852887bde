//! Input handling.
//!
//! A viewer has one action: click somewhere in the arena to drop a circle
//! there. This turns a sampled pointer into the matching `add_circle`
//! message.

use arena_shared::net::{AddCirclePayload, ClientMessage};

/// Pointer state at a moment in time, in arena units.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerInput {
    pub x: f32,
    pub y: f32,
    pub clicked: bool,
}

/// Builds an `add_circle` for a click, clamped into a `width` x `height`
/// arena. Returns `None` when nothing was clicked.
pub fn build_command(input: PointerInput, width: u16, height: u16) -> Option<ClientMessage> {
    if !input.clicked {
        return None;
    }
    Some(ClientMessage::AddCircle(AddCirclePayload {
        x: input.x.clamp(0.0, f32::from(width)),
        y: input.y.clamp(0.0, f32::from(height)),
    }))
}

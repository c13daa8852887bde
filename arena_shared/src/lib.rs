//! `arena_shared`
//!
//! Libraries shared by the room server and the viewer client.
//!
//! Design goals:
//! - Deterministic simulation with seedable randomness.
//! - Explicit, endianness-fixed binary snapshots.
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;
pub mod physics;
pub mod wire;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::physics::*;
}

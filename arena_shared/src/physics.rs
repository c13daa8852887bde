//! Bouncing-circle physics.
//!
//! An [`Arena`] owns the authoritative circle table for one simulation and
//! advances it one fixed tick at a time. Velocities live in a table parallel
//! to the circles: they are simulation-only state and never reach the wire.
//!
//! Determinism notes:
//! - Positions move in whole units (velocity truncated toward zero).
//! - Reflection only flips velocity; a circle may protrude past a bound by up
//!   to one step before it comes back.
//! - All randomness comes from the arena's own RNG, which tests can seed.

use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use crate::math::{Rgba, Vec2};

/// Smallest radius `initialize` will place.
pub const MIN_RADIUS: u16 = 10;
/// Exclusive upper bound for radii placed by `initialize`.
pub const MAX_RADIUS: u16 = 60;
/// Exclusive upper bound for radii of circles spawned at a point.
pub const SPAWN_MAX_RADIUS: u16 = 40;
/// Spawned velocity components are drawn from `[-SPAWN_MAX_SPEED, SPAWN_MAX_SPEED)`.
pub const SPAWN_MAX_SPEED: f32 = 2.0;

/// Session-scoped circle identifier. Sequential per arena, wraps after 255.
pub type CircleId = u8;

/// The wire-visible part of a simulated circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub id: CircleId,
    pub x: u16,
    pub y: u16,
    pub radius: f32,
    pub color: Rgba,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("arena {width}x{height} cannot fit a circle of radius {radius}")]
    ArenaTooSmall { width: u16, height: u16, radius: f32 },
}

/// Bounds plus the parallel circle/velocity tables.
///
/// Both tables are private and only ever pushed to together, so their lengths
/// cannot diverge.
pub struct Arena {
    width: u16,
    height: u16,
    circles: Vec<Circle>,
    velocities: Vec<Vec2>,
    next_id: CircleId,
    rng: StdRng,
}

impl Arena {
    /// Creates an empty arena with an entropy-seeded RNG.
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_rng(width, height, StdRng::from_entropy())
    }

    /// Creates an empty arena whose random draws are reproducible.
    pub fn with_seed(width: u16, height: u16, seed: u64) -> Self {
        Self::with_rng(width, height, StdRng::seed_from_u64(seed))
    }

    fn with_rng(width: u16, height: u16, rng: StdRng) -> Self {
        Self {
            width,
            height,
            circles: Vec::new(),
            velocities: Vec::new(),
            next_id: 0,
            rng,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn circles(&self) -> &[Circle] {
        &self.circles
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    pub fn len(&self) -> usize {
        self.circles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circles.is_empty()
    }

    /// Populates `count` circles fully inside the arena, each moving one unit
    /// per tick on both axes in a random direction.
    ///
    /// Fails before touching the tables if the arena cannot hold a circle of
    /// [`MIN_RADIUS`].
    pub fn initialize(&mut self, count: usize) -> Result<(), EngineError> {
        let shortest = self.width.min(self.height);
        // Largest radius r with 2r < shortest side.
        let fit = shortest.saturating_sub(1) / 2;
        if fit < MIN_RADIUS {
            return Err(EngineError::ArenaTooSmall {
                width: self.width,
                height: self.height,
                radius: f32::from(MIN_RADIUS),
            });
        }
        let max_radius = fit.min(MAX_RADIUS - 1);

        let mut placed = Vec::with_capacity(count);
        for _ in 0..count {
            let r = self.rng.gen_range(MIN_RADIUS..=max_radius);
            let x = self.rng.gen_range(0..self.width - 2 * r) + r;
            let y = self.rng.gen_range(0..self.height - 2 * r) + r;
            let v = Vec2::new(self.unit_direction(), self.unit_direction());
            placed.push((x, y, f32::from(r), v));
        }

        self.circles.reserve(count);
        self.velocities.reserve(count);
        for (x, y, r, v) in placed {
            self.add_entity(x, y, r, v);
        }
        debug!(count, total = self.len(), "Arena initialized");
        Ok(())
    }

    /// Appends one circle with a fresh id and random opaque color.
    ///
    /// No bounds validation; callers own placement.
    pub fn add_entity(&mut self, x: u16, y: u16, radius: f32, velocity: Vec2) -> CircleId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let color = Rgba::opaque(self.rng.gen(), self.rng.gen(), self.rng.gen());

        self.circles.push(Circle {
            id,
            x,
            y,
            radius,
            color,
        });
        self.velocities.push(velocity);
        id
    }

    /// Spawns a circle at a point with a random radius and a random non-zero
    /// velocity on both axes.
    pub fn spawn_at(&mut self, x: u16, y: u16) -> CircleId {
        let radius = f32::from(self.rng.gen_range(MIN_RADIUS..SPAWN_MAX_RADIUS));
        let velocity = Vec2::new(self.nonzero_speed(), self.nonzero_speed());
        self.add_entity(x, y, radius, velocity)
    }

    /// Drops a motionless circle of `radius` at a random spot fully inside the
    /// arena.
    pub fn spawn_resting(&mut self, radius: f32) -> Result<CircleId, EngineError> {
        let span = radius.max(0.0).ceil() as u32 * 2;
        if span >= u32::from(self.width) || span >= u32::from(self.height) {
            return Err(EngineError::ArenaTooSmall {
                width: self.width,
                height: self.height,
                radius,
            });
        }
        // span < u16::MAX here, so the casts are lossless.
        let half = (span / 2) as u16;
        let x = self.rng.gen_range(0..self.width - span as u16) + half;
        let y = self.rng.gen_range(0..self.height - span as u16) + half;
        Ok(self.add_entity(x, y, radius, Vec2::ZERO))
    }

    /// Advances every circle by one tick and returns the updated table.
    pub fn step(&mut self) -> &[Circle] {
        let width = f32::from(self.width);
        let height = f32::from(self.height);

        for (c, v) in self.circles.iter_mut().zip(self.velocities.iter_mut()) {
            let (dx, dy) = v.truncated();
            c.x = c.x.wrapping_add_signed(dx);
            c.y = c.y.wrapping_add_signed(dy);

            let (x, y) = (f32::from(c.x), f32::from(c.y));
            if x - c.radius < 0.0 || x + c.radius > width {
                v.x = -v.x;
            }
            if y - c.radius < 0.0 || y + c.radius > height {
                v.y = -v.y;
            }
        }

        &self.circles
    }

    fn unit_direction(&mut self) -> f32 {
        if self.rng.gen_bool(0.5) {
            1.0
        } else {
            -1.0
        }
    }

    fn nonzero_speed(&mut self) -> f32 {
        loop {
            let v = self.rng.gen_range(-SPAWN_MAX_SPEED..SPAWN_MAX_SPEED);
            if v != 0.0 {
                return v;
            }
        }
    }
}

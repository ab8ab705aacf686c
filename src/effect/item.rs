//! One dissolving image instance and its per-pixel particle records.

use std::f32::consts::TAU;

use rand::Rng;

use crate::effect::Rect;
use crate::gpu::buffer_pool::PooledBuffer;

/// Phase at which an item is finished and removed (simulation-time units).
pub(crate) const PHASE_LIMIT: f32 = 4.0;

/// Nominal per-tick phase step at a 60 Hz display, before the global
/// animation-speed factor divides it.
pub(crate) const NOMINAL_STEP: f32 = 1.0 / 60.0;

/// Base speed multiplier applied to the random per-particle speed draw.
const SPEED_SCALE: f32 = 420.0;

/// Per-pixel simulation state. Must match the WGSL `Particle` struct layout
/// (24-byte array stride).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct Particle {
    /// Accumulated displacement from the source texel, layer-local pixels.
    pub offset: [f32; 2],
    /// Velocity in layer-local pixels per second.
    pub velocity: [f32; 2],
    /// Release threshold and fade bias, drawn once at fill time.
    pub seed: f32,
    pub _pad: f32,
}

/// Seed `count` particle records: zero displacement, a velocity drawn from a
/// uniformly random direction and speed, and a random per-particle seed.
///
/// This runs exactly once per item, when its buffer is first allocated; the
/// randomness here is the effect's only non-determinism.
pub(crate) fn seed_particles(count: usize) -> Vec<Particle> {
    let mut rng = rand::rng();
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let direction = rng.random_range(0.0..TAU);
        let speed = rng.random_range(0.1..=0.2) * SPEED_SCALE;
        records.push(Particle {
            offset: [0.0, 0.0],
            velocity: [direction.cos() * speed, direction.sin() * speed],
            seed: rng.random_range(0.7..=1.5),
            _pad: 0.0,
        });
    }
    records
}

/// GPU resources created for an item on its first serviced redraw.
pub(crate) struct ItemParticles {
    /// The particle records, leased from the shared pool.
    pub buffer: PooledBuffer,
    /// Particle grid columns (= floor of the frame width).
    pub cols: u32,
    /// Particle grid rows (= floor of the frame height).
    pub rows: u32,
    /// Uniform buffer for the update kernel's parameters.
    pub update_params: wgpu::Buffer,
    /// Uniform buffer for the render pass's parameters.
    pub render_params: wgpu::Buffer,
    /// Bind group for the compute dispatch.
    pub update_bind: wgpu::BindGroup,
    /// Bind group for the instanced draw.
    pub render_bind: wgpu::BindGroup,
}

impl ItemParticles {
    /// Total particle count.
    pub fn count(&self) -> u32 {
        self.cols * self.rows
    }
}

/// One active dissolve region: frame, immutable source texture, simulation
/// phase, and (once bounds are known) its particle buffer.
pub(crate) struct DustItem {
    pub frame: Rect,
    pub phase: f32,
    pub texture: wgpu::Texture,
    pub particles: Option<ItemParticles>,
}

impl DustItem {
    /// Whether this item's dissolve has completed (boundary inclusive).
    pub fn is_finished(&self) -> bool {
        self.phase >= PHASE_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_record_stride_matches_shader_layout() {
        assert_eq!(size_of::<Particle>(), 24);
    }

    #[test]
    fn test_seeded_records_start_at_rest_within_draw_ranges() {
        let records = seed_particles(500);
        assert_eq!(records.len(), 500);
        for p in &records {
            assert_eq!(p.offset, [0.0, 0.0]);
            let speed = (p.velocity[0] * p.velocity[0]
                + p.velocity[1] * p.velocity[1])
                .sqrt();
            assert!(
                (42.0 - 1e-3..=84.0 + 1e-3).contains(&speed),
                "speed {speed} outside draw range"
            );
            assert!((0.7..=1.5).contains(&p.seed));
        }
    }

    #[test]
    fn test_seeding_zero_particles_is_empty() {
        assert!(seed_particles(0).is_empty());
    }
}

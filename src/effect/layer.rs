//! The dust effect layer: item lifecycle, simulation ticks, and the
//! compute-then-render submission.

use std::sync::{Arc, Mutex};

use glam::Vec2;
use image::RgbaImage;

use crate::clock::{ClockLink, FrameClock};
use crate::effect::item::{
    seed_particles, DustItem, ItemParticles, Particle, NOMINAL_STEP,
};
use crate::effect::pipelines::{
    dust_pipelines, DustPipelines, DUST_TARGET_FORMAT,
};
use crate::effect::Rect;
use crate::gpu::buffer_pool::BufferPool;
use crate::gpu::texture::{upload_rgba, RenderTarget};
use crate::util::{lock, speed};

/// Output oversampling: the offscreen target is this many times the layer's
/// logical bounds in each dimension, for anti-aliasing headroom.
const OVERSAMPLE: f32 = 3.0;

/// Compute workgroup width; must match the update kernel.
const WORKGROUP_SIZE: u32 = 32;

type BecameEmpty = Box<dyn FnMut() + Send>;

/// Uniform parameters for the update kernel. Matches WGSL `UpdateParams`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct UpdateParams {
    grid: [u32; 2],
    phase: f32,
    time_step: f32,
}

/// Uniform parameters for the render pass. Matches WGSL `RenderParams`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RenderParams {
    rect: [f32; 4],
    item_size: [f32; 2],
    grid: [u32; 2],
    target_size: [f32; 2],
    phase: f32,
    _pad: f32,
}

struct LayerState {
    device: wgpu::Device,
    queue: wgpu::Queue,
    clock: Arc<FrameClock>,
    pool: Arc<BufferPool>,
    items: Vec<DustItem>,
    link: Option<ClockLink>,
    in_hierarchy: bool,
    bounds: Vec2,
    needs_redraw: bool,
    target: Option<RenderTarget>,
}

/// A view layer playing particle dissolve effects.
///
/// The layer owns its items exclusively. It holds a frame-clock link while
/// it has active items *and* is attached to a visible tree; each tick
/// advances every item's phase by `(1/60) / animation_speed_factor`, removes
/// items whose phase reached 4.0, and requests a redraw. Servicing the
/// redraw ([`render`](Self::render)) runs the particle-update compute pass
/// and the instanced sprite render pass into an offscreen target at 3x the
/// layer's logical bounds, which the host composites.
///
/// Every failure path (unconvertible bitmap, unavailable pipelines, pool
/// exhaustion, degenerate geometry) degrades to skipping an item or a frame.
pub struct DustLayer {
    state: Arc<Mutex<LayerState>>,
    became_empty: Arc<Mutex<Option<BecameEmpty>>>,
}

impl DustLayer {
    /// A new layer on the process-wide frame clock and buffer pool.
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self::with_services(
            device,
            queue,
            FrameClock::global(),
            BufferPool::global(),
        )
    }

    /// A new layer driven by a host-owned clock (multi-display hosts,
    /// offscreen pipelines).
    #[must_use]
    pub fn with_clock(
        device: wgpu::Device,
        queue: wgpu::Queue,
        clock: Arc<FrameClock>,
    ) -> Self {
        Self::with_services(device, queue, clock, BufferPool::global())
    }

    fn with_services(
        device: wgpu::Device,
        queue: wgpu::Queue,
        clock: Arc<FrameClock>,
        pool: Arc<BufferPool>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(LayerState {
                device,
                queue,
                clock,
                pool,
                items: Vec::new(),
                link: None,
                in_hierarchy: false,
                bounds: Vec2::ZERO,
                needs_redraw: false,
                target: None,
            })),
            became_empty: Arc::new(Mutex::new(None)),
        }
    }

    /// Add a dissolve item covering `frame`, sampling `image` once.
    ///
    /// Silently adds nothing when the bitmap cannot become a GPU texture.
    pub fn add_item(&self, frame: Rect, image: &RgbaImage) {
        let mut s = lock(&self.state);
        let Some(texture) = upload_rgba(&s.device, &s.queue, image) else {
            log::debug!("dust item skipped: bitmap not convertible");
            return;
        };
        s.items.push(DustItem {
            frame,
            phase: 0.0,
            texture,
            particles: None,
        });
        self.update_registration(&mut s);
    }

    /// Attachment signal from the host's render tree. An invisible layer
    /// must not consume tick callbacks, so the clock link is held only while
    /// attached with active items.
    pub fn set_in_hierarchy(&self, attached: bool) {
        let mut s = lock(&self.state);
        s.in_hierarchy = attached;
        self.update_registration(&mut s);
    }

    /// Host-provided logical bounds. The offscreen target is recreated at
    /// 3x these bounds on the next serviced redraw.
    pub fn set_bounds(&self, width: f32, height: f32) {
        lock(&self.state).bounds = Vec2::new(width, height);
    }

    /// Install the notification fired exactly once each time expiry empties
    /// the item list. Replaces any previous callback.
    pub fn on_became_empty(&self, callback: impl FnMut() + Send + 'static) {
        *lock(&self.became_empty) = Some(Box::new(callback));
    }

    /// Number of active items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        lock(&self.state).items.len()
    }

    /// Take the pending redraw request, if any. Hosts poll this after
    /// ticking the clock and call [`render`](Self::render) when it returns
    /// `true`.
    #[must_use]
    pub fn take_redraw_request(&self) -> bool {
        std::mem::take(&mut lock(&self.state).needs_redraw)
    }

    /// The offscreen target holding the last rendered frame, for the host
    /// to composite. `None` until the first serviced redraw.
    #[must_use]
    pub fn target_view(&self) -> Option<wgpu::TextureView> {
        lock(&self.state).target.as_ref().map(|t| t.view.clone())
    }

    /// Service a redraw: lazily fill particle buffers, then submit the
    /// compute pass and the render pass in one command buffer.
    ///
    /// No-op when the layer bounds are degenerate or the pipelines are
    /// unavailable.
    pub fn render(&self) {
        let mut s = lock(&self.state);
        if s.bounds.x <= 0.0 || s.bounds.y <= 0.0 {
            return;
        }
        let Some(pipelines) = dust_pipelines(&s.device) else {
            log::debug!("dust effect unavailable; skipping render");
            return;
        };
        ensure_target(&mut s);
        fill_missing_buffers(&mut s, pipelines);
        encode_and_submit(&s, pipelines);
    }

    /// (Re)registers with the frame clock iff there are items and the layer
    /// is attached; drops the link otherwise.
    fn update_registration(&self, s: &mut LayerState) {
        if !s.items.is_empty() && s.in_hierarchy {
            if s.link.is_none() {
                let state = Arc::downgrade(&self.state);
                let became_empty = Arc::downgrade(&self.became_empty);
                s.link = Some(s.clock.add(move || {
                    if let (Some(state), Some(became_empty)) =
                        (state.upgrade(), became_empty.upgrade())
                    {
                        let dt =
                            NOMINAL_STEP / speed::animation_speed_factor();
                        run_tick(&state, &became_empty, dt);
                    }
                }));
            }
        } else {
            s.link = None;
        }
    }
}

/// One simulation tick: advance every phase, remove finished items in the
/// same pass, fire `becameEmpty` once if the removals emptied the list, and
/// keep or drop the clock registration accordingly.
fn run_tick(
    state: &Mutex<LayerState>,
    became_empty: &Mutex<Option<BecameEmpty>>,
    dt: f32,
) {
    let transitioned = {
        let mut s = lock(state);
        let had_items = !s.items.is_empty();
        for item in &mut s.items {
            item.phase += dt;
        }
        s.items.retain(|item| !item.is_finished());
        let now_empty = s.items.is_empty();
        if now_empty {
            s.link = None;
        } else {
            s.needs_redraw = true;
        }
        had_items && now_empty
    };
    // Fired outside the state lock so the owner may mutate the layer
    // (remove it from the tree, add new items) from the callback.
    if transitioned {
        if let Some(callback) = lock(became_empty).as_mut() {
            callback();
        }
    }
}

/// (Re)creates the offscreen target at 3x the logical bounds when missing
/// or stale.
fn ensure_target(s: &mut LayerState) {
    let width = ((s.bounds.x * OVERSAMPLE).round() as u32).max(1);
    let height = ((s.bounds.y * OVERSAMPLE).round() as u32).max(1);
    let stale = s
        .target
        .as_ref()
        .is_none_or(|t| t.width() != width || t.height() != height);
    if stale {
        s.target = Some(RenderTarget::new(
            &s.device,
            width,
            height,
            DUST_TARGET_FORMAT,
        ));
    }
}

/// Allocates and seeds the particle buffer for every item that lacks one.
/// Runs at most once per item; pool exhaustion skips the item until the
/// next serviced redraw.
fn fill_missing_buffers(s: &mut LayerState, pipelines: &DustPipelines) {
    let LayerState {
        ref device,
        ref queue,
        ref pool,
        ref mut items,
        ..
    } = *s;

    for item in items.iter_mut() {
        if item.particles.is_some() {
            continue;
        }
        let (cols, rows) = item.frame.grid_size();
        if cols == 0 || rows == 0 {
            continue;
        }
        let count = u64::from(cols) * u64::from(rows);
        let byte_len = count * size_of::<Particle>() as u64;
        let Some(buffer) = pool.acquire(device, byte_len) else {
            log::debug!("particle buffer unavailable for {cols}x{rows} item");
            continue;
        };

        let records = seed_particles(count as usize);
        queue.write_buffer(buffer.buffer(), 0, bytemuck::cast_slice(&records));

        let view = item
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let update_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Dust Update Params"),
            size: size_of::<UpdateParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let render_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Dust Render Params"),
            size: size_of::<RenderParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let update_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Dust Update Bind Group"),
            layout: &pipelines.update_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: update_params.as_entire_binding(),
                },
            ],
        });
        let render_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Dust Render Bind Group"),
            layout: &pipelines.render_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: render_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffer.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(
                        &pipelines.sampler,
                    ),
                },
            ],
        });

        item.particles = Some(ItemParticles {
            buffer,
            cols,
            rows,
            update_params,
            render_params,
            update_bind,
            render_bind,
        });
    }
}

/// Encodes the compute pass followed by the render pass and submits them as
/// one command buffer; queue ordering makes the draw see the updated
/// particle records without an explicit fence.
fn encode_and_submit(s: &LayerState, pipelines: &DustPipelines) {
    let Some(target) = s.target.as_ref() else {
        return;
    };
    let dt = NOMINAL_STEP / speed::animation_speed_factor();
    let mut encoder =
        s.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Dust Effect Encoder"),
            });

    {
        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Dust Update Pass"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&pipelines.update);
        for item in &s.items {
            let Some(particles) = item.particles.as_ref() else {
                continue;
            };
            let params = UpdateParams {
                grid: [particles.cols, particles.rows],
                phase: item.phase,
                time_step: dt,
            };
            s.queue.write_buffer(
                &particles.update_params,
                0,
                bytemuck::bytes_of(&params),
            );
            pass.set_bind_group(0, &particles.update_bind, &[]);
            pass.dispatch_workgroups(
                particles.count().div_ceil(WORKGROUP_SIZE),
                1,
                1,
            );
        }
    }

    {
        let target_size =
            Vec2::new(target.width() as f32, target.height() as f32);
        let scale = target_size / s.bounds;
        let mut pass =
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Dust Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
        pass.set_pipeline(&pipelines.render);
        for item in &s.items {
            let Some(particles) = item.particles.as_ref() else {
                continue;
            };
            let params = RenderParams {
                rect: [
                    item.frame.origin.x * scale.x,
                    item.frame.origin.y * scale.y,
                    item.frame.width() * scale.x,
                    item.frame.height() * scale.y,
                ],
                item_size: [item.frame.width(), item.frame.height()],
                grid: [particles.cols, particles.rows],
                target_size: [target_size.x, target_size.y],
                phase: item.phase,
                _pad: 0.0,
            };
            s.queue.write_buffer(
                &particles.render_params,
                0,
                bytemuck::bytes_of(&params),
            );
            pass.set_bind_group(0, &particles.render_bind, &[]);
            pass.draw(0..6, 0..particles.count());
        }
    }

    let _ = s.queue.submit(std::iter::once(encoder.finish()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::shared_device;

    fn test_layer() -> Option<(DustLayer, Arc<FrameClock>, Arc<BufferPool>)> {
        let (device, queue) = shared_device()?;
        let clock = FrameClock::new();
        let pool = BufferPool::new(64 << 20);
        let layer = DustLayer::with_services(
            device.clone(),
            queue.clone(),
            Arc::clone(&clock),
            Arc::clone(&pool),
        );
        Some((layer, clock, pool))
    }

    fn test_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([200, 120, 40, 255]),
        )
    }

    #[test]
    fn test_registration_held_iff_items_and_attached() {
        let Some((layer, clock, _pool)) = test_layer() else {
            return;
        };

        // Detached: adding an item must not register.
        layer.add_item(Rect::new(0.0, 0.0, 8.0, 8.0), &test_image(8, 8));
        assert_eq!(layer.item_count(), 1);
        assert_eq!(clock.observer_count(), 0);

        // Attaching with items registers; detaching deregisters.
        layer.set_in_hierarchy(true);
        assert_eq!(clock.observer_count(), 1);
        layer.set_in_hierarchy(false);
        assert_eq!(clock.observer_count(), 0);
        layer.set_in_hierarchy(true);
        assert_eq!(clock.observer_count(), 1);
    }

    #[test]
    fn test_unconvertible_bitmap_adds_no_item() {
        let Some((layer, clock, _pool)) = test_layer() else {
            return;
        };
        layer.set_in_hierarchy(true);
        layer.add_item(Rect::new(0.0, 0.0, 8.0, 8.0), &RgbaImage::new(0, 0));
        assert_eq!(layer.item_count(), 0);
        assert_eq!(clock.observer_count(), 0);
    }

    #[test]
    fn test_phase_advances_and_expires_at_boundary() {
        let Some((layer, _clock, _pool)) = test_layer() else {
            return;
        };
        layer.set_in_hierarchy(true);
        layer.add_item(Rect::new(0.0, 0.0, 100.0, 100.0), &test_image(4, 4));

        let step = 1.0 / 60.0;
        for _ in 0..239 {
            run_tick(&layer.state, &layer.became_empty, step);
        }
        assert_eq!(layer.item_count(), 1);
        {
            let s = lock(&layer.state);
            let phase = s.items[0].phase;
            assert!(
                (phase - 239.0 * step).abs() < 1e-3,
                "phase drifted: {phase}"
            );
        }

        // Nominal expiry is tick 240 (phase 4.0, boundary inclusive);
        // accumulated float rounding may land one tick either side.
        for _ in 0..3 {
            run_tick(&layer.state, &layer.became_empty, step);
        }
        assert_eq!(layer.item_count(), 0);
    }

    #[test]
    fn test_became_empty_fires_exactly_once_via_clock() {
        let Some((layer, clock, _pool)) = test_layer() else {
            return;
        };
        let fired = Arc::new(Mutex::new(0u32));
        {
            let fired = Arc::clone(&fired);
            layer.on_became_empty(move || *lock(&fired) += 1);
        }
        layer.set_in_hierarchy(true);
        layer.add_item(Rect::new(0.0, 0.0, 16.0, 16.0), &test_image(4, 4));
        assert_eq!(clock.observer_count(), 1);

        // Generous bound: robust to any positive global speed factor a
        // parallel test might set momentarily.
        let mut ticks = 0;
        while layer.item_count() > 0 && ticks < 2000 {
            clock.tick();
            ticks += 1;
        }
        assert_eq!(layer.item_count(), 0);
        assert_eq!(*lock(&fired), 1);
        // Registration dropped when the list emptied.
        assert_eq!(clock.observer_count(), 0);

        // No further tick may fire the callback again.
        clock.tick();
        assert_eq!(*lock(&fired), 1);
    }

    #[test]
    fn test_became_empty_withheld_while_items_remain() {
        let Some((layer, _clock, _pool)) = test_layer() else {
            return;
        };
        let fired = Arc::new(Mutex::new(0u32));
        {
            let fired = Arc::clone(&fired);
            layer.on_became_empty(move || *lock(&fired) += 1);
        }
        layer.set_in_hierarchy(true);

        let step = 1.0 / 60.0;
        layer.add_item(Rect::new(0.0, 0.0, 8.0, 8.0), &test_image(4, 4));
        for _ in 0..120 {
            run_tick(&layer.state, &layer.became_empty, step);
        }
        layer.add_item(Rect::new(8.0, 0.0, 8.0, 8.0), &test_image(4, 4));

        // First item expires while the second remains: no notification.
        let mut ticks = 0;
        while layer.item_count() > 1 && ticks < 500 {
            run_tick(&layer.state, &layer.became_empty, step);
            ticks += 1;
        }
        assert_eq!(layer.item_count(), 1);
        assert_eq!(*lock(&fired), 0);

        // Second expiry empties the list: exactly one notification.
        let mut ticks = 0;
        while layer.item_count() > 0 && ticks < 500 {
            run_tick(&layer.state, &layer.became_empty, step);
            ticks += 1;
        }
        assert_eq!(*lock(&fired), 1);
    }

    #[test]
    fn test_degenerate_bounds_render_is_a_no_op() {
        let Some((layer, _clock, pool)) = test_layer() else {
            return;
        };
        layer.add_item(Rect::new(0.0, 0.0, 8.0, 8.0), &test_image(8, 8));
        layer.render();
        assert!(layer.target_view().is_none());
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_zero_area_item_never_allocates_particles() {
        let Some((layer, _clock, pool)) = test_layer() else {
            return;
        };
        layer.set_bounds(64.0, 64.0);
        layer.add_item(Rect::new(4.0, 4.0, 0.0, 10.0), &test_image(4, 4));
        layer.render();
        assert_eq!(pool.allocated_bytes(), 0);
        let s = lock(&layer.state);
        assert!(s.items[0].particles.is_none());
    }

    #[test]
    fn test_buffer_fill_happens_once_and_counts_pixels() {
        let Some((layer, _clock, pool)) = test_layer() else {
            return;
        };
        layer.set_bounds(64.0, 64.0);
        layer.add_item(Rect::new(2.0, 2.0, 10.0, 5.0), &test_image(10, 5));

        layer.render();
        let after_first = pool.allocated_bytes();
        // 50 particle records at the fixed 24-byte stride.
        assert_eq!(after_first, 50 * 24);
        {
            let s = lock(&layer.state);
            let particles = s.items[0].particles.as_ref();
            assert_eq!(particles.map(ItemParticles::count), Some(50));
        }

        // Re-rendering must not reseed or reallocate.
        layer.render();
        layer.render();
        assert_eq!(pool.allocated_bytes(), after_first);
        assert!(layer.target_view().is_some());
    }
}

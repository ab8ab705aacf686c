use std::path::Path;
use std::sync::Arc;

use dustfx::clock::FrameClock;
use dustfx::composite::CompositePass;
use dustfx::gpu::render_context::RenderContext;
use dustfx::gpu::texture::upload_rgba;
use dustfx::options::ViewerOptions;
use dustfx::util::speed;
use dustfx::wallpaper;
use dustfx::{DustLayer, Rect};
use image::{Rgba, RgbaImage};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

/// Tile fill colors cycled per click.
const PALETTE: [[u8; 4]; 4] = [
    [0xe8, 0x6a, 0x5c, 0xff],
    [0xf0, 0xc0, 0x5a, 0xff],
    [0x6f, 0xc2, 0x7a, 0xff],
    [0x7f, 0x9c, 0xf5, 0xff],
];

/// A rounded-rect tile standing in for a message bubble snapshot.
fn make_tile(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    let radius = (width.min(height) as f32) / 4.0;
    RgbaImage::from_fn(width, height, |x, y| {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;
        let cx = (px - radius).max(0.0).min(width as f32 - 2.0 * radius)
            + radius;
        let cy = (py - radius).max(0.0).min(height as f32 - 2.0 * radius)
            + radius;
        let inside = (px - cx).hypot(py - cy) <= radius;
        if inside {
            Rgba(color)
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

struct DustApp {
    options: ViewerOptions,
    window: Option<Arc<Window>>,
    context: Option<RenderContext>,
    layer: Option<DustLayer>,
    wallpaper_pass: Option<CompositePass>,
    dust_pass: Option<CompositePass>,
    cursor: (f32, f32),
    tile_index: usize,
}

impl DustApp {
    fn new(options: ViewerOptions) -> Self {
        Self {
            options,
            window: None,
            context: None,
            layer: None,
            wallpaper_pass: None,
            dust_pass: None,
            cursor: (0.0, 0.0),
            tile_index: 0,
        }
    }

    fn spawn_tile(&mut self) {
        let Some(layer) = &self.layer else {
            return;
        };
        let [width, height] = self.options.tile_size;
        let color = PALETTE[self.tile_index % PALETTE.len()];
        self.tile_index += 1;

        let tile = make_tile(width as u32, height as u32, color);
        let frame = Rect::new(
            self.cursor.0 - width / 2.0,
            self.cursor.1 - height / 2.0,
            width,
            height,
        );
        layer.add_item(frame, &tile);
        log::debug!("dissolving tile at {:?}", self.cursor);
    }

    fn redraw(&mut self) {
        let (Some(window), Some(context), Some(layer)) =
            (&self.window, &mut self.context, &self.layer)
        else {
            return;
        };

        FrameClock::global().tick();
        if layer.take_redraw_request() {
            layer.render();
            if let (Some(dust_pass), Some(view)) =
                (&mut self.dust_pass, layer.target_view())
            {
                dust_pass.set_source(&context.device, &view);
            }
        }

        let frame = match context.get_next_frame() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                let inner = window.inner_size();
                context.resize(inner.width, inner.height);
                return;
            }
            Err(e) => {
                log::error!("render error: {e:?}");
                return;
            }
        };
        let output_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = context.create_encoder();
        if let Some(wallpaper_pass) = &self.wallpaper_pass {
            wallpaper_pass.render(
                &mut encoder,
                &output_view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
        }
        if let Some(dust_pass) = &self.dust_pass {
            dust_pass.render(&mut encoder, &output_view, wgpu::LoadOp::Load);
        }
        context.submit(encoder);
        frame.present();

        window.request_redraw();
    }
}

impl ApplicationHandler for DustApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.options.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(900, 700));
        let window = Arc::new(event_loop.create_window(attrs).unwrap());
        let size = window.inner_size();

        let context = pollster::block_on(RenderContext::new(
            window.clone(),
            (size.width, size.height),
        ))
        .expect("GPU context init failed");

        let mut wallpaper_pass =
            CompositePass::new(&context.device, context.format(), None);
        let background = wallpaper::background_image(&self.options.wallpaper);
        if let Some(texture) =
            upload_rgba(&context.device, &context.queue, &background)
        {
            let view =
                texture.create_view(&wgpu::TextureViewDescriptor::default());
            wallpaper_pass.set_source(&context.device, &view);
        }
        let dust_pass = CompositePass::new(
            &context.device,
            context.format(),
            Some(CompositePass::PREMULTIPLIED_OVER),
        );

        let layer =
            DustLayer::new(context.device.clone(), context.queue.clone());
        layer.set_bounds(size.width as f32, size.height as f32);
        layer.set_in_hierarchy(true);
        layer.on_became_empty(|| log::info!("all dust settled"));

        window.request_redraw();
        self.window = Some(window);
        self.context = Some(context);
        self.layer = Some(layer);
        self.wallpaper_pass = Some(wallpaper_pass);
        self.dust_pass = Some(dust_pass);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(context) = &mut self.context {
                    context.resize(size.width, size.height);
                }
                if let Some(layer) = &self.layer {
                    layer.set_bounds(size.width as f32, size.height as f32);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
            }

            WindowEvent::MouseInput { button, state, .. } => {
                if button == MouseButton::Left
                    && state == ElementState::Pressed
                {
                    self.spawn_tile();
                }
            }

            WindowEvent::RedrawRequested => {
                self.redraw();
            }

            _ => (),
        }
    }
}

fn main() {
    env_logger::init();

    let options = match std::env::args().nth(1) {
        Some(path) => match ViewerOptions::load(Path::new(&path)) {
            Ok(options) => options,
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        },
        None => ViewerOptions::default(),
    };
    speed::set_animation_speed_factor(options.animation_speed_factor);

    let mut app = DustApp::new(options);
    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run_app(&mut app).expect("Event loop error");
}

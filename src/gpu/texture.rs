//! Source-bitmap upload and render-target texture abstraction.

use image::RgbaImage;

/// Upload an RGBA8 bitmap as a sampled GPU texture.
///
/// Returns `None` when the bitmap cannot become a texture: zero-sized
/// dimensions, or dimensions beyond the device's 2D texture limit. Callers
/// treat that as "skip" - the effect is cosmetic and conversion failure is a
/// defined no-op.
///
/// The texture format is non-sRGB (`Rgba8Unorm`): dissolve sprites sample
/// source pixels verbatim and blend premultiplied, so no transfer-function
/// round trip is wanted.
#[must_use]
pub fn upload_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &RgbaImage,
) -> Option<wgpu::Texture> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let max_dim = device.limits().max_texture_dimension_2d;
    if width > max_dim || height > max_dim {
        log::debug!("source bitmap {width}x{height} exceeds device limit {max_dim}");
        return None;
    }

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Dust Item Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    Some(texture)
}

/// A render-target texture and its default view.
///
/// Used for the dust layer's oversampled offscreen target. Created with
/// `RENDER_ATTACHMENT | TEXTURE_BINDING` usage so the host can composite the
/// result.
pub struct RenderTarget {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// A default full-texture view.
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    /// Create a new render-target texture with the given dimensions and
    /// format.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Dust RenderTarget"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    /// Target width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    /// Target height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.texture.height()
    }
}

//! Chat background bitmap generation.
//!
//! Produces the wallpaper images the dissolve effect sits on: a 1x1 solid
//! fill, or a two-stop linear gradient rotated about the image center with
//! stops clamped past both ends. A process-wide single-entry cache returns
//! the same image for repeated identical requests, since hosts regenerate
//! the background on every theme/layout pass.

use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::util::lock;

/// Gradient wallpapers render at this fixed size and are stretched by the
/// compositor.
const GRADIENT_SIZE: (u32, u32) = (640, 1280);

/// A background style, resolved once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum Wallpaper {
    /// A single RGBA color.
    Solid {
        /// Fill color.
        color: [u8; 4],
    },
    /// A two-stop linear gradient.
    Gradient {
        /// Start (top) and end (bottom) colors before rotation.
        colors: [[u8; 4]; 2],
        /// Rotation of the gradient axis about the image center, degrees.
        rotation_degrees: i32,
    },
}

static CACHE: Mutex<Option<(Wallpaper, Arc<RgbaImage>)>> = Mutex::new(None);

/// The background bitmap for `wallpaper`, generated on demand and cached.
///
/// Repeated calls with an equal wallpaper return the same image.
#[must_use]
pub fn background_image(wallpaper: &Wallpaper) -> Arc<RgbaImage> {
    {
        let cache = lock(&CACHE);
        if let Some((key, image)) = cache.as_ref() {
            if key == wallpaper {
                return Arc::clone(image);
            }
        }
    }
    let image = Arc::new(generate(wallpaper));
    *lock(&CACHE) = Some((wallpaper.clone(), Arc::clone(&image)));
    image
}

fn generate(wallpaper: &Wallpaper) -> RgbaImage {
    match wallpaper {
        Wallpaper::Solid { color } => {
            RgbaImage::from_pixel(1, 1, Rgba(*color))
        }
        Wallpaper::Gradient {
            colors,
            rotation_degrees,
        } => gradient_image(*colors, *rotation_degrees),
    }
}

fn gradient_image(colors: [[u8; 4]; 2], rotation_degrees: i32) -> RgbaImage {
    let (width, height) = GRADIENT_SIZE;
    let center = (width as f32 / 2.0, height as f32 / 2.0);
    let theta = (rotation_degrees as f32).to_radians();
    // The unrotated axis runs top to bottom; rotate it about the center.
    let axis = (-theta.sin(), theta.cos());

    RgbaImage::from_fn(width, height, |x, y| {
        let dx = x as f32 + 0.5 - center.0;
        let dy = y as f32 + 0.5 - center.1;
        let t = ((dx * axis.0 + dy * axis.1) / height as f32 + 0.5)
            .clamp(0.0, 1.0);
        let mut pixel = [0u8; 4];
        for (channel, slot) in pixel.iter_mut().enumerate() {
            let a = f32::from(colors[0][channel]);
            let b = f32::from(colors[1][channel]);
            *slot = (a + (b - a) * t).round() as u8;
        }
        Rgba(pixel)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP: [u8; 4] = [200, 40, 10, 255];
    const BOTTOM: [u8; 4] = [20, 80, 220, 255];

    fn channel_close(actual: [u8; 4], expected: [u8; 4]) -> bool {
        actual
            .iter()
            .zip(expected.iter())
            .all(|(a, e)| a.abs_diff(*e) <= 2)
    }

    #[test]
    fn test_solid_is_a_single_pixel_of_the_exact_color() {
        let image = generate(&Wallpaper::Solid {
            color: [7, 8, 9, 255],
        });
        assert_eq!(image.dimensions(), (1, 1));
        assert_eq!(image.get_pixel(0, 0).0, [7, 8, 9, 255]);
    }

    #[test]
    fn test_gradient_runs_top_to_bottom_at_zero_rotation() {
        let image = generate(&Wallpaper::Gradient {
            colors: [TOP, BOTTOM],
            rotation_degrees: 0,
        });
        assert_eq!(image.dimensions(), GRADIENT_SIZE);
        assert!(channel_close(image.get_pixel(320, 0).0, TOP));
        assert!(channel_close(image.get_pixel(320, 1279).0, BOTTOM));
    }

    #[test]
    fn test_half_turn_rotation_swaps_the_stops() {
        let image = generate(&Wallpaper::Gradient {
            colors: [TOP, BOTTOM],
            rotation_degrees: 180,
        });
        assert!(channel_close(image.get_pixel(320, 0).0, BOTTOM));
        assert!(channel_close(image.get_pixel(320, 1279).0, TOP));
    }

    #[test]
    fn test_repeated_requests_hit_the_cache() {
        let wallpaper = Wallpaper::Gradient {
            colors: [TOP, BOTTOM],
            rotation_degrees: 45,
        };
        let first = background_image(&wallpaper);
        let second = background_image(&wallpaper);
        assert!(Arc::ptr_eq(&first, &second));
    }
}

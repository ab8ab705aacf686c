//! Viewer options with TOML support.
//!
//! All sub-fields use `#[serde(default)]` so partial TOML files (e.g. only
//! overriding `[wallpaper]`) work correctly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DustError;
use crate::wallpaper::Wallpaper;

/// Demo viewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerOptions {
    /// Window title.
    pub title: String,
    /// Width and height of the tiles dissolved on click, logical pixels.
    pub tile_size: [f32; 2],
    /// Global slow-motion factor; values above 1.0 slow the effect down.
    pub animation_speed_factor: f32,
    /// Background style. Last so plain values serialize before the table.
    pub wallpaper: Wallpaper,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            title: "dustfx".into(),
            tile_size: [96.0, 64.0],
            animation_speed_factor: 1.0,
            wallpaper: Wallpaper::Gradient {
                colors: [
                    [0x2b, 0x52, 0x78, 0xff],
                    [0x8d, 0xc6, 0xe8, 0xff],
                ],
                rotation_degrees: 0,
            },
        }
    }
}

impl ViewerOptions {
    /// Load options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `DustError::Io` when the file cannot be read and
    /// `DustError::OptionsParse` when it is not valid options TOML.
    pub fn load(path: &Path) -> Result<Self, DustError> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| DustError::OptionsParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_round_trip_through_toml() {
        let options = ViewerOptions::default();
        let text = toml::to_string(&options).unwrap_or_default();
        assert!(text.contains("wallpaper"));
        let parsed: Result<ViewerOptions, _> = toml::from_str(&text);
        assert_eq!(parsed.ok(), Some(options));
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let parsed: ViewerOptions = match toml::from_str(
            "title = \"demo\"\n\
             [wallpaper]\n\
             style = \"solid\"\n\
             color = [10, 20, 30, 255]\n",
        ) {
            Ok(options) => options,
            Err(e) => panic!("parse failed: {e}"),
        };
        assert_eq!(parsed.title, "demo");
        assert_eq!(
            parsed.wallpaper,
            Wallpaper::Solid {
                color: [10, 20, 30, 255]
            }
        );
        assert_eq!(parsed.tile_size, ViewerOptions::default().tile_size);
        assert_eq!(parsed.animation_speed_factor, 1.0);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let parsed: Result<ViewerOptions, _> = toml::from_str("title = [");
        assert!(parsed.is_err());
    }
}

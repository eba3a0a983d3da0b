use serde::{Deserialize, Serialize};

use crate::errors::PipError;
use crate::types::{AspectRatio, Size};

/// Preferred overlay size used when the property layer omits one.
pub const DEFAULT_PREFERRED_SIZE: Size = Size { width: 1920, height: 1080 };

// MARK: - OverlayConfig

/// Overlay settings of one video view.
///
/// Mutated only by the property layer; the controller reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: bool,
    #[serde(alias = "autoStart", alias = "startAutomatically")]
    pub auto_start: bool,
    /// Stored for interface symmetry; the window system decides when overlay ends.
    #[serde(alias = "autoStop", alias = "stopAutomatically")]
    pub auto_stop: bool,
    #[serde(alias = "preferredWidth")]
    pub preferred_width: u32,
    #[serde(alias = "preferredHeight")]
    pub preferred_height: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_start: true,
            auto_stop: true,
            preferred_width: 0,
            preferred_height: 0,
        }
    }
}

impl OverlayConfig {
    pub fn from_json(json: &str) -> Result<Self, PipError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn preferred_size(&self) -> Size {
        Size::new(self.preferred_width, self.preferred_height)
    }

    /// Aspect-ratio hint for the window system.
    ///
    /// Uses the preferred size when both terms are set, otherwise the view's
    /// measured size. `None` when neither is usable.
    pub fn aspect_hint(&self, measured: Size) -> Option<AspectRatio> {
        let preferred = self.preferred_size();
        let width = if preferred.width > 0 { preferred.width } else { measured.width };
        let height = if preferred.height > 0 { preferred.height } else { measured.height };
        AspectRatio::from_size(Size::new(width, height))
    }
}

// MARK: - PipOptions

/// `pip` property payload as sent by the JavaScript layer.
///
/// Keys that are missing fall back to `false` and a 1920×1080 preferred size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipOptions {
    pub enabled: Option<bool>,
    pub start_automatically: Option<bool>,
    pub stop_automatically: Option<bool>,
    pub preferred_size: Option<PartialSize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl PipOptions {
    pub fn from_json(json: &str) -> Result<Self, PipError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Converts an optional payload into a config. `None` disables overlay.
    pub fn resolve(options: Option<&PipOptions>) -> OverlayConfig {
        match options {
            Some(options) => OverlayConfig::from(options.clone()),
            None => OverlayConfig { enabled: false, ..OverlayConfig::default() },
        }
    }
}

impl From<PipOptions> for OverlayConfig {
    fn from(options: PipOptions) -> Self {
        let size = options.preferred_size.unwrap_or_default();
        Self {
            enabled: options.enabled.unwrap_or(false),
            auto_start: options.start_automatically.unwrap_or(false),
            auto_stop: options.stop_automatically.unwrap_or(false),
            preferred_width: size.width.unwrap_or(DEFAULT_PREFERRED_SIZE.width),
            preferred_height: size.height.unwrap_or(DEFAULT_PREFERRED_SIZE.height),
        }
    }
}

use serde::{Deserialize, Serialize};

// MARK: - Mode

/// View mode owned by a single controller.
///
/// `EnteringOverlay` lasts from the enter request until the window system
/// confirms; `ExitingOverlay` is only observed while a teardown is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Normal,
    EnteringOverlay,
    Overlay,
    ExitingOverlay,
}

impl Mode {
    pub fn is_overlay(&self) -> bool {
        matches!(self, Self::Overlay)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::EnteringOverlay => write!(f, "entering-overlay"),
            Self::Overlay => write!(f, "overlay"),
            Self::ExitingOverlay => write!(f, "exiting-overlay"),
        }
    }
}

// MARK: - Size

/// Measured size of a view or surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Self = Self { width: 0, height: 0 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - AspectRatio

/// Aspect-ratio hint handed to the window system. Never has a zero term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectRatio {
    numerator: u32,
    denominator: u32,
}

impl AspectRatio {
    pub fn from_size(size: Size) -> Option<Self> {
        if size.is_empty() {
            return None;
        }
        Some(Self { numerator: size.width, denominator: size.height })
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.numerator, self.denominator)
    }
}

// MARK: - Visibility

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    /// Takes part in layout but is not drawn.
    Invisible,
    /// Takes no space and is not drawn.
    Gone,
}

// MARK: - ScalingType

/// How video frames are scaled into a surface (CSS `object-fit`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScalingType {
    #[serde(rename = "contain", alias = "fit")]
    Fit,
    #[default]
    #[serde(rename = "cover", alias = "fill")]
    Fill,
}

// MARK: - Ids

/// Handle of a node in the host's visual tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Identity of a render target created by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

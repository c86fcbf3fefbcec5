//! World locations and the placement policy applied before a proxy is spawned.

use std::fmt;

use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A point in a named world with a facing.
///
/// `world` is `None` when the host could not resolve the containing space
/// (e.g. the world was unloaded between the event and the settle delay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: Option<String>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: Some(world.into()),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn with_facing(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// Name of the containing world, if it resolves to something addressable.
    pub fn world_name(&self) -> Option<&str> {
        self.world.as_deref().filter(|w| !w.trim().is_empty())
    }

    pub fn offset_by(&self, offset: &Offset) -> Self {
        Self {
            x: self.x + offset.x,
            y: self.y + offset.y,
            z: self.z + offset.z,
            ..self.clone()
        }
    }
}

impl fmt::Display for Location {
    /// `world:x,y,z` using block coordinates, the way operators read positions.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{},{},{}",
            self.world_name().unwrap_or("unknown"),
            self.x.floor() as i64,
            self.y.floor() as i64,
            self.z.floor() as i64
        )
    }
}

/// 3-axis offset added to the trigger location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Offset {
    pub fn vertical(y: f64) -> Self {
        Self { x: 0.0, y, z: 0.0 }
    }
}

/// How a corpse is oriented relative to the elimination facing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrientationMode {
    /// Keep the facing of the triggering event.
    KeepOriginal,
    /// Apply a configured yaw/pitch pair.
    Fixed { yaw: f32, pitch: f32 },
    /// Yaw uniform in [0, 360), pitch uniform in [-90, 90).
    Random,
}

impl OrientationMode {
    /// Parse a configured mode name (case-insensitive). `None` for unknown names.
    pub fn parse(mode: &str, fixed_yaw: f32, fixed_pitch: f32) -> Option<Self> {
        match mode.trim().to_uppercase().replace(&['-', ' '][..], "_").as_str() {
            "KEEP_DEATH" | "KEEP_ORIGINAL" | "KEEPORIGINAL" | "KEEP" => Some(OrientationMode::KeepOriginal),
            "FIXED" => Some(OrientationMode::Fixed {
                yaw: fixed_yaw,
                pitch: fixed_pitch,
            }),
            "RANDOM" => Some(OrientationMode::Random),
            _ => None,
        }
    }

    /// Resolve the configured mode, falling back to [`OrientationMode::KeepOriginal`]
    /// with a single warning when the name is not recognized.
    pub fn from_config(mode: &str, fixed_yaw: f32, fixed_pitch: f32) -> Self {
        Self::parse(mode, fixed_yaw, fixed_pitch).unwrap_or_else(|| {
            warn!("Unknown rotation mode: {}, using KEEP_DEATH", mode);
            OrientationMode::KeepOriginal
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrientationMode::KeepOriginal => "KEEP_DEATH",
            OrientationMode::Fixed { .. } => "FIXED",
            OrientationMode::Random => "RANDOM",
        }
    }

    /// Rewrite the facing of `location` according to this mode.
    pub fn apply<R: Rng + ?Sized>(&self, location: &mut Location, rng: &mut R) {
        match *self {
            OrientationMode::KeepOriginal => {}
            OrientationMode::Fixed { yaw, pitch } => {
                location.yaw = yaw;
                location.pitch = pitch;
            }
            OrientationMode::Random => {
                location.yaw = rng.gen_range(0.0f32..360.0);
                location.pitch = rng.gen_range(-90.0f32..90.0);
            }
        }
    }
}

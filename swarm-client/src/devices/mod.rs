//! Interfaces to the copter's flight stack, LEDs and animation data.
//!
//! The client core only sequences these calls; what a takeoff or a frame
//! render physically does is up to the implementation. Errors from these
//! traits are [`ClientError::Device`](crate::error::ClientError::Device) and
//! are never retried or swallowed by the core.

mod animation_file;
mod sim;

pub use animation_file::CsvAnimation;
pub use sim::{SimulatedFlight, SimulatedLeds, SystemdService};

use crate::error::Result;

/// LED color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One animation timestep: where to be and what color to show.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color: Rgb,
}

/// Horizontal offset applied to every frame position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Origin {
    pub x: f64,
    pub y: f64,
}

impl From<(f64, f64)> for Origin {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Battery telemetry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub voltage: f64,
    pub cell_voltage: f64,
}

/// Flight stack primitives.
pub trait FlightControl: Send + Sync {
    /// Pre-flight checks. `Some(report)` describes failures, `None` means all good.
    fn selfcheck(&self) -> Result<Option<String>>;

    fn set_armed(&self, armed: bool) -> Result<()>;

    fn takeoff(&self, height: f64, safe: bool) -> Result<()>;

    fn land(&self) -> Result<()>;

    /// Abort whatever flight command is in progress.
    fn interrupt(&self) -> Result<()>;

    fn telemetry(&self) -> Result<Telemetry>;

    /// Fly to the frame's position without waiting for arrival.
    fn reach_frame(&self, frame: &Frame, origin: Origin) -> Result<()>;

    /// Apply one animation frame's motion.
    fn animate_frame(&self, frame: &Frame, origin: Origin) -> Result<()>;
}

/// LED strip primitives.
pub trait LedStrip: Send + Sync {
    fn init(&self) -> Result<()>;

    fn fill(&self, color: Rgb) -> Result<()>;

    fn off(&self) -> Result<()>;
}

/// Provider of the ordered frame sequence for a show.
pub trait AnimationSource: Send + Sync {
    /// Load all frames. An empty sequence means nothing can be played.
    fn load(&self) -> Result<Vec<Frame>>;
}

/// Host service management, used after firmware/animation uploads.
pub trait ServiceControl: Send + Sync {
    fn restart(&self, service: &str) -> std::io::Result<()>;
}

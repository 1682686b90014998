//! Simulated devices for running a node without flight hardware.
//!
//! The simulated copter teleports to each commanded position and reports a
//! slowly draining battery. Every call is logged so a dry run shows exactly
//! what a real flight stack would have been asked to do.

use super::{FlightControl, Frame, LedStrip, Origin, Rgb, ServiceControl, Telemetry};
use crate::error::Result;
use parking_lot::Mutex;
use std::process::Command;
use tracing::{debug, info, warn};

const FULL_VOLTAGE: f64 = 12.6;
const EMPTY_VOLTAGE: f64 = 10.5;
const CELLS: f64 = 3.0;
/// Voltage drop per rendered frame
const DRAIN_PER_FRAME: f64 = 0.0005;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SimState {
    armed: bool,
    position: (f64, f64, f64),
    voltage: f64,
}

/// Log-only flight controller
#[derive(Debug)]
pub struct SimulatedFlight {
    state: Mutex<SimState>,
}

impl SimulatedFlight {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                armed: false,
                position: (0.0, 0.0, 0.0),
                voltage: FULL_VOLTAGE,
            }),
        }
    }

    /// Current simulated position (x, y, z)
    pub fn position(&self) -> (f64, f64, f64) {
        self.state.lock().position
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    fn move_to(&self, frame: &Frame, origin: Origin) {
        let mut state = self.state.lock();
        state.position = (frame.x + origin.x, frame.y + origin.y, frame.z);
        state.voltage = (state.voltage - DRAIN_PER_FRAME).max(EMPTY_VOLTAGE);
    }
}

impl Default for SimulatedFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightControl for SimulatedFlight {
    fn selfcheck(&self) -> Result<Option<String>> {
        let state = self.state.lock();
        if state.voltage <= EMPTY_VOLTAGE {
            return Ok(Some(format!("battery low: {:.2}V", state.voltage)));
        }
        Ok(None)
    }

    fn set_armed(&self, armed: bool) -> Result<()> {
        info!("[sim] {}", if armed { "arm" } else { "disarm" });
        self.state.lock().armed = armed;
        Ok(())
    }

    fn takeoff(&self, height: f64, safe: bool) -> Result<()> {
        info!("[sim] takeoff to {:.2}m (safe={})", height, safe);
        let mut state = self.state.lock();
        state.armed = true;
        state.position.2 = height;
        Ok(())
    }

    fn land(&self) -> Result<()> {
        info!("[sim] land");
        let mut state = self.state.lock();
        state.position.2 = 0.0;
        state.armed = false;
        Ok(())
    }

    fn interrupt(&self) -> Result<()> {
        warn!("[sim] flight interrupted");
        Ok(())
    }

    fn telemetry(&self) -> Result<Telemetry> {
        let voltage = self.state.lock().voltage;
        Ok(Telemetry {
            voltage,
            cell_voltage: voltage / CELLS,
        })
    }

    fn reach_frame(&self, frame: &Frame, origin: Origin) -> Result<()> {
        info!(
            "[sim] reach first point ({:.2}, {:.2}, {:.2})",
            frame.x + origin.x,
            frame.y + origin.y,
            frame.z
        );
        self.move_to(frame, origin);
        Ok(())
    }

    fn animate_frame(&self, frame: &Frame, origin: Origin) -> Result<()> {
        debug!(
            "[sim] frame ({:.2}, {:.2}, {:.2})",
            frame.x + origin.x,
            frame.y + origin.y,
            frame.z
        );
        self.move_to(frame, origin);
        Ok(())
    }
}

/// Log-only LED strip
#[derive(Debug, Default)]
pub struct SimulatedLeds {
    color: Mutex<Option<Rgb>>,
}

impl SimulatedLeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently shown color, `None` when off
    pub fn color(&self) -> Option<Rgb> {
        *self.color.lock()
    }
}

impl LedStrip for SimulatedLeds {
    fn init(&self) -> Result<()> {
        info!("[sim] LED strip initialized");
        Ok(())
    }

    fn fill(&self, color: Rgb) -> Result<()> {
        debug!("[sim] LED fill ({}, {}, {})", color.r, color.g, color.b);
        *self.color.lock() = Some(color);
        Ok(())
    }

    fn off(&self) -> Result<()> {
        debug!("[sim] LED off");
        *self.color.lock() = None;
        Ok(())
    }
}

/// Restarts services through `systemctl`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemdService;

impl ServiceControl for SystemdService {
    fn restart(&self, service: &str) -> std::io::Result<()> {
        info!("Restarting service {}", service);
        let status = Command::new("systemctl").args(["restart", service]).status()?;
        if !status.success() {
            return Err(std::io::Error::other(format!(
                "systemctl restart {} exited with {}",
                service, status
            )));
        }
        Ok(())
    }
}

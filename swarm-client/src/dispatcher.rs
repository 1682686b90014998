//! Routes decoded server commands to their handlers.

use crate::animation::AnimationController;
use crate::config::{self, SharedConfig, SharedStore};
use crate::devices::{FlightControl, LedStrip, Rgb, ServiceControl};
use crate::error::Result;
use crate::file_receiver::{MessageSource, receive_file};
use crate::protocol::{Command, ConfigWriteArgs, RequestTarget, Response, WriteFileArgs};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// Handler table for [`Command`].
///
/// Device errors are returned to the caller unchanged. Failures that only
/// affect one command (config writes, service restarts) are logged here.
pub struct CommandDispatcher {
    store: SharedStore,
    config: SharedConfig,
    animation: AnimationController,
    flight: Arc<dyn FlightControl>,
    leds: Arc<dyn LedStrip>,
    service: Arc<dyn ServiceControl>,
}

impl CommandDispatcher {
    pub fn new(
        store: SharedStore,
        config: SharedConfig,
        animation: AnimationController,
        flight: Arc<dyn FlightControl>,
        leds: Arc<dyn LedStrip>,
        service: Arc<dyn ServiceControl>,
    ) -> Self {
        Self {
            store,
            config,
            animation,
            flight,
            leds,
            service,
        }
    }

    /// Execute one command. `link` supplies the payload of a file transfer.
    ///
    /// Returns the response to send back, if the command has one.
    pub fn handle(&self, command: Command, link: &mut dyn MessageSource) -> Result<Option<Response>> {
        match command {
            Command::WriteFile(args) => self.write_file(args, link)?,
            Command::ConfigWrite(args) => self.config_write(args),
            Command::ConfigReload => {
                if let Err(e) = config::reload(&self.store, &self.config) {
                    error!("Config reload failed, keeping previous settings: {}", e);
                }
            }
            Command::StartTime { time } => {
                info!("Animation start requested for {:.3}", time);
                self.animation.start_at(time)?;
            }
            Command::Takeoff => {
                let config = self.config.load();
                self.flight
                    .takeoff(config.copter.takeoff_height, config.copter.safe_takeoff)?;
            }
            Command::Pause => self.animation.pause(),
            Command::Resume => self.animation.resume(),
            Command::Stop => self.animation.stop()?,
            Command::Land => self.flight.land()?,
            Command::Disarm => self.flight.set_armed(false)?,
            Command::LedTest => {
                let duration = self.config.load().copter.led_test_duration;
                self.leds.fill(Rgb::WHITE)?;
                thread::sleep(duration);
                self.leds.off()?;
            }
            Command::Request { value } => return self.request(&value).map(Some),
        }
        Ok(None)
    }

    fn write_file(&self, args: WriteFileArgs, link: &mut dyn MessageSource) -> Result<()> {
        let directory = self.config.load().files.files_directory.clone();
        let received = receive_file(link, &directory, &args.filename)?;
        if args.clever_restart && received.completed {
            let service = self.config.load().private.restart_service.clone();
            if let Err(e) = self.service.restart(&service) {
                error!("Failed to restart {}: {}", service, e);
            }
        }
        Ok(())
    }

    fn config_write(&self, args: ConfigWriteArgs) {
        let ConfigWriteArgs {
            section,
            option,
            value,
        } = args;
        match self.store.lock().set_json(&section, &option, &value) {
            Ok(()) => info!("Config {}.{} set to {}", section, option, value),
            Err(e) => error!("Config write {}.{} failed: {}", section, option, e),
        }
    }

    fn request(&self, target: &RequestTarget) -> Result<Response> {
        let response = match target {
            RequestTarget::Test => Response::ok(target, "test_success"),
            RequestTarget::Id => Response::ok(target, self.config.load().identity.id.clone()),
            RequestTarget::Selfcheck => {
                let report = self.flight.selfcheck()?;
                Response::ok(target, report.unwrap_or_else(|| "OK".to_string()))
            }
            RequestTarget::BattVoltage => Response::ok(target, self.flight.telemetry()?.voltage),
            RequestTarget::CellVoltage => {
                Response::ok(target, self.flight.telemetry()?.cell_voltage)
            }
            RequestTarget::Unsupported(name) => {
                warn!("Unsupported request: {}", name);
                Response::error(target, "unsupported request")
            }
        };
        info!("Request {} answered with {}", target.name(), response.value);
        Ok(response)
    }
}

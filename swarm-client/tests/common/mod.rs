//! Shared fixtures: recording device fakes, config files, wait helpers.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use crossbeam_channel::{Receiver, Sender, bounded};
use swarm_client::clock::{Clock, ManualClock};
use swarm_client::config::{self, ConfigStore, SharedConfig, SharedStore};
use swarm_client::devices::{
    AnimationSource, FlightControl, Frame, LedStrip, Origin, Rgb, ServiceControl, Telemetry,
};
use swarm_client::error::{ClientError, Result};

pub const BASE_CONFIG: &str = r#"
[SERVER]
host = "127.0.0.1"
port = 25000
broadcast_port = 8181
buffer_size = 1024
attempt_limit = 2
connect_timeout = 0.05

[NTP]
use_ntp = false
host = "127.0.0.1"
port = 123
timeout = 0.5

[FILETRANSFER]
files_directory = "animations"
animation_file = "animation.csv"

[COPTERS]
frame_id = "aruco_map"
takeoff_height = 1.5
takeoff_time = 5.0
reach_first_point_time = 3.0
safe_takeoff = true
x0_common = 0.5
y0_common = 0.0
frame_delay = 0.125
led_test_duration = 0.01

[PRIVATE]
id = "copter7"
x0 = 1.0
y0 = 2.0
use_leds = true
"#;

/// Write the base config plus `edits` into `dir` and load it.
pub fn setup_config(
    dir: &Path,
    edits: &[(&str, &str, toml::Value)],
) -> (PathBuf, SharedStore, SharedConfig) {
    let path = dir.join("client_config.toml");
    fs::write(&path, BASE_CONFIG).unwrap();
    let mut store = ConfigStore::open(&path).unwrap();
    for (section, option, value) in edits.iter().cloned() {
        store.set(section, option, value).unwrap();
    }
    let (store, config) = config::load(&path).unwrap();
    (path, store, config)
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn frames(count: usize) -> Vec<Frame> {
    (0..count)
        .map(|i| Frame {
            x: i as f64,
            y: 0.0,
            z: 1.0,
            color: Rgb::new(i as u8, 0, 255),
        })
        .collect()
}

/// Virtual clock whose first `sleep_until` blocks until [`GatedClock::release`].
///
/// Holds the animation thread between the timer firing and takeoff.
pub struct GatedClock {
    inner: ManualClock,
    armed: AtomicBool,
    waiting: AtomicBool,
    open: Sender<()>,
    gate: Receiver<()>,
}

impl GatedClock {
    pub fn new(start: f64) -> Self {
        let (open, gate) = bounded(1);
        Self {
            inner: ManualClock::new(start),
            armed: AtomicBool::new(true),
            waiting: AtomicBool::new(false),
            open,
            gate,
        }
    }

    /// Whether a caller is blocked at the gate.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        let _ = self.open.try_send(());
    }
}

impl Clock for GatedClock {
    fn now(&self) -> f64 {
        self.inner.now()
    }

    fn sleep_until(&self, deadline: f64) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.waiting.store(true, Ordering::SeqCst);
            let _ = self.gate.recv();
            self.waiting.store(false, Ordering::SeqCst);
        }
        self.inner.sleep_until(deadline);
    }

    fn until(&self, deadline: f64) -> Duration {
        self.inner.until(deadline)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Selfcheck,
    Armed(bool),
    Takeoff(f64, bool),
    Land,
    Interrupt,
    Telemetry,
    Reach(Frame, Origin),
    Animate(Frame, Origin),
}

type RenderHook = Box<dyn Fn(usize) + Send>;

/// Flight controller fake recording every call with the clock time it happened.
pub struct RecordingFlight {
    clock: Arc<dyn Clock>,
    calls: Mutex<Vec<(Call, f64)>>,
    renders: AtomicUsize,
    on_render: Mutex<Option<RenderHook>>,
    fail_takeoff: AtomicBool,
}

impl RecordingFlight {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            calls: Mutex::new(Vec::new()),
            renders: AtomicUsize::new(0),
            on_render: Mutex::new(None),
            fail_takeoff: AtomicBool::new(false),
        })
    }

    /// Run `hook(index)` right after frame `index` is rendered.
    pub fn on_render(&self, hook: impl Fn(usize) + Send + 'static) {
        *self.on_render.lock() = Some(Box::new(hook));
    }

    pub fn fail_takeoff(&self) {
        self.fail_takeoff.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(Call, f64)> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|(call, _)| matches(call)).count()
    }

    /// Clock times of every rendered frame, in order.
    pub fn render_times(&self) -> Vec<f64> {
        self.calls
            .lock()
            .iter()
            .filter(|(call, _)| matches!(call, Call::Animate(..)))
            .map(|(_, at)| *at)
            .collect()
    }

    fn record(&self, call: Call) {
        let now = self.clock.now();
        self.calls.lock().push((call, now));
    }
}

impl FlightControl for RecordingFlight {
    fn selfcheck(&self) -> Result<Option<String>> {
        self.record(Call::Selfcheck);
        Ok(None)
    }

    fn set_armed(&self, armed: bool) -> Result<()> {
        self.record(Call::Armed(armed));
        Ok(())
    }

    fn takeoff(&self, height: f64, safe: bool) -> Result<()> {
        self.record(Call::Takeoff(height, safe));
        if self.fail_takeoff.load(Ordering::SeqCst) {
            return Err(ClientError::Device("motors not armed".into()));
        }
        Ok(())
    }

    fn land(&self) -> Result<()> {
        self.record(Call::Land);
        Ok(())
    }

    fn interrupt(&self) -> Result<()> {
        self.record(Call::Interrupt);
        Ok(())
    }

    fn telemetry(&self) -> Result<Telemetry> {
        self.record(Call::Telemetry);
        Ok(Telemetry {
            voltage: 12.0,
            cell_voltage: 4.0,
        })
    }

    fn reach_frame(&self, frame: &Frame, origin: Origin) -> Result<()> {
        self.record(Call::Reach(*frame, origin));
        Ok(())
    }

    fn animate_frame(&self, frame: &Frame, origin: Origin) -> Result<()> {
        self.record(Call::Animate(*frame, origin));
        let index = self.renders.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_render.lock().as_ref() {
            hook(index);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLeds {
    pub fills: Mutex<Vec<Rgb>>,
    pub offs: AtomicUsize,
}

impl LedStrip for RecordingLeds {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn fill(&self, color: Rgb) -> Result<()> {
        self.fills.lock().push(color);
        Ok(())
    }

    fn off(&self) -> Result<()> {
        self.offs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fixed frame sequence.
pub struct StaticFrames(pub Vec<Frame>);

impl AnimationSource for StaticFrames {
    fn load(&self) -> Result<Vec<Frame>> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Default)]
pub struct RecordingService {
    pub restarts: Mutex<Vec<String>>,
}

impl ServiceControl for RecordingService {
    fn restart(&self, service: &str) -> std::io::Result<()> {
        self.restarts.lock().push(service.to_string());
        Ok(())
    }
}

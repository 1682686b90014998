//! End-to-end control loop tests: a scripted server drives a node over loopback TCP.

mod common;

use common::{Call, RecordingFlight, RecordingLeds, RecordingService, StaticFrames, frames, setup_config};
use serde_json::{Value, json};
use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use swarm_client::animation::{AnimationController, AnimationState};
use swarm_client::clock::{Clock, SystemClock};
use swarm_client::config::{ConfigStore, FILETRANSFER, PRIVATE, SERVER, SharedConfig};
use swarm_client::connection::ConnectionManager;
use swarm_client::devices::Rgb;
use swarm_client::dispatcher::CommandDispatcher;
use swarm_client::error::{ClientError, Result};
use swarm_client::node::Node;
use swarm_client::protocol::{self, END_OF_FILE};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    config_path: PathBuf,
    config: SharedConfig,
    listener: TcpListener,
    flight: Arc<RecordingFlight>,
    leds: Arc<RecordingLeds>,
    service: Arc<RecordingService>,
    animation: AnimationController,
    shutdown: Arc<AtomicBool>,
    node: JoinHandle<Result<()>>,
}

impl Harness {
    fn start() -> (Self, TcpStream) {
        Self::start_with(|_| {})
    }

    fn start_with(prepare: impl FnOnce(&RecordingFlight)) -> (Self, TcpStream) {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let files = dir.path().join("files");
        let (config_path, store, config) = setup_config(
            dir.path(),
            &[
                (SERVER, "port", i64::from(port).into()),
                (
                    FILETRANSFER,
                    "files_directory",
                    toml::Value::String(files.to_string_lossy().into_owned()),
                ),
            ],
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let flight = RecordingFlight::new(Arc::clone(&clock));
        prepare(&flight);
        let leds = Arc::new(RecordingLeds::default());
        let service = Arc::new(RecordingService::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let animation = AnimationController::new(
            flight.clone(),
            leds.clone(),
            Arc::new(StaticFrames(frames(3))),
            clock,
            Arc::clone(&config),
            Arc::clone(&shutdown),
        );
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&config),
            animation.clone(),
            flight.clone(),
            leds.clone(),
            service.clone(),
        );
        let connection = ConnectionManager::new(store, Arc::clone(&config), Arc::clone(&shutdown));
        let mut node = Node::new(connection, dispatcher, animation.clone(), Arc::clone(&shutdown));
        let node = thread::spawn(move || node.run());

        let stream = accept(&listener);
        let harness = Self {
            dir,
            config_path,
            config,
            listener,
            flight,
            leds,
            service,
            animation,
            shutdown,
            node,
        };
        (harness, stream)
    }

    fn stop(self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.node.join().unwrap()
    }
}

fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

fn send(stream: &mut TcpStream, command: &str, args: Value) {
    send_raw(stream, &protocol::encode(command, &args).unwrap());
}

fn send_raw(stream: &mut TcpStream, payload: &[u8]) {
    protocol::write_frame(stream, payload).unwrap();
}

fn receive(stream: &mut TcpStream) -> Value {
    let payload = protocol::read_frame::<_, io::Error, _>(stream, 1024, || {
        Err(io::ErrorKind::TimedOut.into())
    })
    .unwrap()
    .expect("node closed the connection");
    serde_json::from_slice(&payload).unwrap()
}

/// Send a `request` and return the body of the `response`.
fn request(stream: &mut TcpStream, value: &str) -> Value {
    send(stream, "request", json!({"value": value}));
    let mut reply = receive(stream);
    reply["response"].take()
}

/// Round-trip a request so every earlier command has been handled.
fn sync(stream: &mut TcpStream) {
    assert_eq!(request(stream, "test")["value"], "test_success");
}

#[test]
fn test_requests_are_answered() {
    let (harness, mut stream) = Harness::start();

    assert_eq!(
        request(&mut stream, "test"),
        json!({"status": "ok", "value": "test_success", "value_name": "test"})
    );
    assert_eq!(request(&mut stream, "id")["value"], "copter7");
    assert_eq!(request(&mut stream, "selfcheck")["value"], "OK");
    assert_eq!(request(&mut stream, "batt_voltage")["value"], 12.0);
    assert_eq!(request(&mut stream, "cell_voltage")["value"], 4.0);

    let unsupported = request(&mut stream, "altitude");
    assert_eq!(unsupported["status"], "error");
    assert_eq!(unsupported["value_name"], "altitude");

    harness.stop().unwrap();
}

#[test]
fn test_unknown_and_malformed_messages_are_ignored() {
    let (harness, mut stream) = Harness::start();

    send(&mut stream, "dance", json!({}));
    send_raw(&mut stream, b"not json at all");
    send_raw(&mut stream, b"{}");
    send_raw(&mut stream, b"[1, 2]");
    send(&mut stream, "starttime", json!({"time": "soon"}));
    sync(&mut stream);

    assert!(harness.flight.calls().is_empty());
    harness.stop().unwrap();
}

#[test]
fn test_flight_and_led_commands() {
    let (harness, mut stream) = Harness::start();

    send(&mut stream, "takeoff", json!({}));
    send(&mut stream, "disarm", json!({}));
    send(&mut stream, "land", json!({}));
    send(&mut stream, "led_test", json!({}));
    sync(&mut stream);

    let calls: Vec<Call> = harness.flight.calls().into_iter().map(|(c, _)| c).collect();
    assert_eq!(
        calls,
        vec![Call::Takeoff(1.5, true), Call::Armed(false), Call::Land]
    );
    assert_eq!(*harness.leds.fills.lock(), vec![Rgb::WHITE]);
    assert_eq!(harness.leds.offs.load(Ordering::SeqCst), 1);

    harness.stop().unwrap();
}

#[test]
fn test_file_transfer_and_service_restart() {
    let (harness, mut stream) = Harness::start();

    send(
        &mut stream,
        "writefile",
        json!({"filename": "animation.csv", "clever_restart": "True"}),
    );
    send_raw(&mut stream, b"0,0,0,1\n");
    send_raw(&mut stream, b"1,0.5,0,1\n");
    send(&mut stream, END_OF_FILE, json!({}));
    sync(&mut stream);

    let written = std::fs::read(harness.dir.path().join("files/animation.csv")).unwrap();
    assert_eq!(written, b"0,0,0,1\n1,0.5,0,1\n");
    assert_eq!(*harness.service.restarts.lock(), vec!["clever".to_string()]);

    harness.stop().unwrap();
}

#[test]
fn test_config_write_then_reload() {
    let (harness, mut stream) = Harness::start();

    send(
        &mut stream,
        "config_write",
        json!({"section": PRIVATE, "option": "x0", "value": "2.5"}),
    );
    sync(&mut stream);
    let store = ConfigStore::open(&harness.config_path).unwrap();
    assert_eq!(store.get_float(PRIVATE, "x0").unwrap(), 2.5);
    // Not live until reloaded
    assert_eq!(harness.config.load().private.x0, 1.0);

    send(&mut stream, "config_reload", json!({}));
    sync(&mut stream);
    assert_eq!(harness.config.load().private.x0, 2.5);
    assert_eq!(harness.config.load().origin(), (3.0, 2.0));

    // A broken value keeps the previous snapshot and the node alive
    send(
        &mut stream,
        "config_write",
        json!({"section": "COPTERS", "option": "takeoff_height", "value": "high"}),
    );
    send(&mut stream, "config_reload", json!({}));
    sync(&mut stream);
    assert_eq!(harness.config.load().copter.takeoff_height, 1.5);

    harness.stop().unwrap();
}

#[test]
fn test_start_and_stop_over_the_wire() {
    let (harness, mut stream) = Harness::start();
    let start = SystemClock.now() + 60.0;

    send(&mut stream, "starttime", json!({"time": start.to_string()}));
    sync(&mut stream);
    assert_eq!(harness.animation.state(), AnimationState::Scheduled);

    // Rejected while a session is scheduled; the node carries on
    send(&mut stream, "starttime", json!({"time": start}));
    send(&mut stream, "pause", json!({}));
    sync(&mut stream);
    assert!(harness.animation.signals().is_paused());

    send(&mut stream, "stop", json!({}));
    sync(&mut stream);
    assert_eq!(harness.animation.state(), AnimationState::Idle);
    assert_eq!(harness.flight.count(|c| *c == Call::Interrupt), 1);
    assert_eq!(harness.flight.count(|c| matches!(c, Call::Takeoff(..))), 0);

    harness.stop().unwrap();
}

#[test]
fn test_reconnects_after_server_closes() {
    let (harness, stream) = Harness::start();
    drop(stream);

    let mut stream = accept(&harness.listener);
    sync(&mut stream);

    harness.stop().unwrap();
}

#[test]
fn test_shutdown_closes_socket() {
    let (harness, mut stream) = Harness::start();
    sync(&mut stream);
    harness.stop().unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_device_error_is_fatal() {
    let (harness, mut stream) = Harness::start_with(|flight| flight.fail_takeoff());
    send(&mut stream, "takeoff", json!({}));

    let result = harness.node.join().unwrap();
    assert!(matches!(result, Err(ClientError::Device(_))));
    let mut buf = [0u8; 8];
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_out_of_range_start_is_dropped() {
    let (harness, mut stream) = Harness::start();

    send(&mut stream, "starttime", json!({"time": 1e300}));
    send(&mut stream, "starttime", json!({"time": "inf"}));
    sync(&mut stream);

    assert_eq!(harness.animation.state(), AnimationState::Idle);
    assert!(harness.flight.calls().is_empty());
    harness.stop().unwrap();
}

#[test]
fn test_playback_fault_fails_run() {
    let (harness, mut stream) = Harness::start_with(|flight| flight.fail_takeoff());
    let start = SystemClock.now() + 0.1;
    send(&mut stream, "starttime", json!({"time": start}));

    let result = harness.node.join().unwrap();
    assert!(matches!(result, Err(ClientError::Device(_))));
    assert!(harness.shutdown.load(Ordering::SeqCst));
    assert_eq!(harness.flight.count(|c| matches!(c, Call::Takeoff(..))), 1);
}

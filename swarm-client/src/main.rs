//! Swarm client - drone node for the choreography server
//!
//! Connects to the server (rediscovering it over UDP broadcast when it
//! moves), executes its commands, and plays time-synchronized animations.
//! Flight and LED primitives are simulated and log what they would do.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use swarm_client::animation::AnimationController;
use swarm_client::clock::{Clock, SystemClock};
use swarm_client::config;
use swarm_client::connection::ConnectionManager;
use swarm_client::devices::{
    CsvAnimation, FlightControl, LedStrip, SimulatedFlight, SimulatedLeds, SystemdService,
};
use swarm_client::dispatcher::CommandDispatcher;
use swarm_client::error::{ClientError, Result};
use swarm_client::logging::{self, LOG_FILE};
use swarm_client::node::Node;
use swarm_client::timesync::TimeSync;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG: &str = "client_config.toml";

fn main() -> Result<()> {
    // Initialize logging: stderr plus a plain-text log file
    let directive = "swarm_client=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|e| ClientError::Config(format!("Invalid log directive: {}", e)))?;
    let (file_layer, log_error) = match logging::open_log_file(Path::new(LOG_FILE)) {
        Ok(file) => (Some(logging::file_layer(file)), None),
        Err(e) => (None, Some(e)),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(directive))
        .with(fmt::layer().with_thread_names(true))
        .with(file_layer)
        .init();

    info!("Swarm client v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = log_error {
        warn!("Not writing {}: {}", LOG_FILE, e);
    }

    // Supports: swarm-client <path> OR swarm-client --config <path>
    let config_path = parse_config_path();
    info!("Using config: {}", config_path);
    let (store, config) = config::load(&config_path)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| ClientError::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let flight: Arc<dyn FlightControl> = Arc::new(SimulatedFlight::new());
    let leds: Arc<dyn LedStrip> = Arc::new(SimulatedLeds::new());

    let snapshot = config.load_full();
    info!("Client started on copter {}", snapshot.identity.id);
    if snapshot.private.use_leds {
        leds.init()?;
    }
    if let Some(sync) = TimeSync::from_config(&snapshot.ntp) {
        match sync.reference_time() {
            Ok(reference) => info!("NTP time: {:.3}", reference),
            Err(e) => warn!("NTP query failed: {}", e),
        }
    }
    info!("System time: {:.3}", clock.now());

    let animation = AnimationController::new(
        Arc::clone(&flight),
        Arc::clone(&leds),
        Arc::new(CsvAnimation::configured(Arc::clone(&config))),
        Arc::clone(&clock),
        Arc::clone(&config),
        Arc::clone(&shutdown),
    );
    let dispatcher = CommandDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&config),
        animation.clone(),
        flight,
        leds,
        Arc::new(SystemdService),
    );
    let connection = ConnectionManager::new(store, config, Arc::clone(&shutdown));

    let mut node = Node::new(connection, dispatcher, animation, shutdown);
    node.run()?;

    info!("Swarm client finished");
    Ok(())
}

/// Parse config path from command line arguments.
///
/// Supports:
/// - `swarm-client <path>` (positional)
/// - `swarm-client --config <path>` or `-c <path>`
/// - default: `client_config.toml`
fn parse_config_path() -> String {
    let args: Vec<String> = std::env::args().collect();

    if let Some(pos) = args.iter().position(|a| a == "--config" || a == "-c")
        && let Some(path) = args.get(pos + 1)
    {
        return path.clone();
    }

    args.get(1)
        .filter(|a| !a.starts_with('-'))
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
}

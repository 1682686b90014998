//! Swarm client - per-node client for drone swarm choreography
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ framed JSON ┌──────────┐ Command ┌────────────┐
//! │  connection  │────────────►│ protocol │────────►│ dispatcher │
//! │ (reconnect,  │◄────────────│ (codec)  │◄────────│            │
//! │  discovery)  │  responses  └──────────┘ Response└─────┬──────┘
//! └──────────────┘                                       │
//!          ┌──────────────┬──────────────┬───────────────┤
//!          ▼              ▼              ▼               ▼
//!   ┌─────────────┐ ┌───────────┐ ┌─────────────┐ ┌────────────┐
//!   │file_receiver│ │  config   │ │  animation  │ │  devices   │
//!   └─────────────┘ └───────────┘ └──────┬──────┘ └────────────┘
//!                                        │ start correction
//!                                  ┌─────▼─────┐
//!                                  │ timesync  │
//!                                  └───────────┘
//! ```
//!
//! [`node::Node`] runs the single control loop; playback happens on a
//! dedicated `animation` thread driven by [`animation::AnimationController`].

pub mod animation;
pub mod clock;
pub mod config;
pub mod connection;
pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod file_receiver;
pub mod logging;
pub mod node;
pub mod protocol;
pub mod timesync;

pub use error::{ClientError, Result};

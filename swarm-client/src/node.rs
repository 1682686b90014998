//! The node's control loop: receive, decode, dispatch, respond.

use crate::animation::AnimationController;
use crate::connection::ConnectionManager;
use crate::dispatcher::CommandDispatcher;
use crate::error::{ClientError, Result};
use crate::protocol::{Command, ProtocolError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Single-threaded command loop bound to one server connection.
pub struct Node {
    connection: ConnectionManager,
    dispatcher: CommandDispatcher,
    animation: AnimationController,
    shutdown: Arc<AtomicBool>,
}

impl Node {
    pub fn new(
        connection: ConnectionManager,
        dispatcher: CommandDispatcher,
        animation: AnimationController,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            connection,
            dispatcher,
            animation,
            shutdown,
        }
    }

    /// Serve commands until shutdown or a fatal error.
    ///
    /// On every exit path any session is stopped and the socket is closed.
    /// A requested shutdown is not an error; a shutdown raised by a playback
    /// fault returns that fault.
    pub fn run(&mut self) -> Result<()> {
        let result = self.serve();
        self.close();
        match result {
            Err(ClientError::Shutdown) => match self.animation.take_fault() {
                Some(fault) => {
                    error!("Shutting down after animation fault: {}", fault);
                    Err(fault)
                }
                None => {
                    info!("Shutdown requested");
                    Ok(())
                }
            },
            other => other,
        }
    }

    fn serve(&mut self) -> Result<()> {
        self.connection.reconnect()?;
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(ClientError::Shutdown);
            }
            let message = match self.connection.receive_message() {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!("Reconnecting...");
                    self.connection.reconnect()?;
                    continue;
                }
                Err(ClientError::Shutdown) => return Err(ClientError::Shutdown),
                Err(e) => {
                    warn!("Connection lost: {}", e);
                    self.connection.reconnect()?;
                    continue;
                }
            };
            self.handle_message(&message)?;
        }
    }

    /// Decode and execute one message. Only fatal errors are returned.
    fn handle_message(&mut self, message: &[u8]) -> Result<()> {
        let command = match Command::decode(message) {
            Ok(command) => command,
            Err(ProtocolError::UnknownCommand(name)) => {
                info!("Ignoring unknown command {:?}", name);
                return Ok(());
            }
            Err(e) => {
                warn!("Dropping malformed message: {}", e);
                return Ok(());
            }
        };
        let name = command.name();
        debug!("Command from server: {:?}", command);

        match self.execute(command) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                error!("Command {} failed: {}", name, e);
                Err(e)
            }
            Err(ClientError::Connection(e)) => {
                warn!("Connection lost during {}: {}", name, e);
                self.connection.reconnect()
            }
            Err(e) => {
                warn!("Command {} failed: {}", name, e);
                Ok(())
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<()> {
        if let Some(response) = self.dispatcher.handle(command, &mut self.connection)? {
            self.connection.send(&response.encode()?)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.animation.state().is_active()
            && let Err(e) = self.animation.stop()
        {
            error!("Failed to stop animation on exit: {}", e);
        }
        self.connection.close();
    }
}

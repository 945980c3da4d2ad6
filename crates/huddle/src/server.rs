//! `HuddleServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → room registry.

use std::future::Future;
use std::sync::Arc;

use huddle_protocol::{Codec, JsonCodec};
use huddle_room::{RegistryConfig, RoomRegistry};
use huddle_transport::{Transport, WebSocketTransport};

use crate::HuddleError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: RoomRegistry,
    pub(crate) codec: C,
    pub(crate) version: String,
}

/// Builder for configuring and starting a Huddle server.
///
/// # Example
///
/// ```rust,ignore
/// use huddle::prelude::*;
///
/// let server = HuddleServer::builder()
///     .bind("0.0.0.0:8080")
///     .version("1.4.2")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct HuddleServerBuilder {
    bind_addr: String,
    registry_config: RegistryConfig,
    version: String,
}

impl HuddleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            registry_config: RegistryConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the room limits and lifetimes.
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Sets the string reported by the `version` request.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Binds the listener and creates the room registry.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    /// Fails if the registry config has a zero limit.
    pub async fn build(self) -> Result<HuddleServer<JsonCodec>, HuddleError> {
        let registry = RoomRegistry::new(self.registry_config)?;
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry,
            codec: JsonCodec,
            version: self.version,
        });

        Ok(HuddleServer { transport, state })
    }
}

impl Default for HuddleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Huddle server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HuddleServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl HuddleServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> HuddleServerBuilder {
        HuddleServerBuilder::new()
    }
}

impl<C: Codec> HuddleServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns a handle to the server's rooms.
    pub fn registry(&self) -> RoomRegistry {
        self.state.registry.clone()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), HuddleError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then closes every
    /// room so subscribers receive `disconnected{closed}`.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), HuddleError> {
        tracing::info!(version = %self.state.version, "Huddle server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        self.state.registry.shutdown().await;
        Ok(())
    }
}

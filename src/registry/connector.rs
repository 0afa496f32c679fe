//! Session establishment with bounded exponential-backoff retry

use crate::config::RegistryConfig;
use crate::coordinator::{CoordinationError, CoordinationService, Connector, Coordinator};
use crate::error::{RegistryError, RegistryResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Opens sessions against the configured ensemble
///
/// `Connector::Auto` is resolved on first use and reused afterwards, so
/// repeated init/close cycles against a `memory:` server list keep seeing
/// the same in-process ensemble.
#[derive(Debug)]
pub struct SessionConnector {
    config: Arc<RegistryConfig>,
    connector: Mutex<Connector>,
}

impl SessionConnector {
    pub fn new(config: Arc<RegistryConfig>, connector: Connector) -> Self {
        Self {
            config,
            connector: Mutex::new(connector),
        }
    }

    fn resolved(&self) -> RegistryResult<Connector> {
        let mut connector = self.connector.lock();
        if matches!(*connector, Connector::Auto) {
            *connector = connector.resolve(&self.config.server_lists)?;
        }
        Ok(connector.clone())
    }

    /// Connect, retrying transient failures until the policy gives up
    ///
    /// Each attempt is bounded by the connection timeout. Non-transient
    /// failures (authentication, backend errors) are returned immediately.
    pub async fn connect(&self) -> RegistryResult<Coordinator> {
        let connector = self.resolved()?;
        let options = self.config.session_options();
        let policy = self.config.retry_policy();
        let mut retries = 0u32;

        loop {
            let attempt =
                match tokio::time::timeout(options.connection_timeout, connector.connect(&options))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CoordinationError::Timeout(options.connection_timeout)),
                };

            match attempt {
                Ok(coordinator) => {
                    info!(
                        servers = %options.servers,
                        backend = coordinator.backend_name(),
                        session_id = coordinator.session_id(),
                        retries = retries,
                        "🔗 Registry session established"
                    );
                    return Ok(coordinator);
                }
                Err(e) if e.is_transient() && policy.allows_retry(retries) => {
                    let sleep = policy.sleep_time(retries);
                    warn!(
                        servers = %options.servers,
                        retry = retries + 1,
                        max_retries = policy.max_retries(),
                        sleep_ms = sleep.as_millis() as u64,
                        error = %e,
                        "Connection attempt failed, backing off"
                    );
                    tokio::time::sleep(sleep).await;
                    retries += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(RegistryError::ConnectRetriesExhausted {
                        servers: options.servers.clone(),
                        attempts: retries + 1,
                        source: e,
                    });
                }
                Err(e) => {
                    debug!(servers = %options.servers, error = %e, "Connection attempt rejected");
                    return Err(e.into());
                }
            }
        }
    }
}

//! Builder for failover clients

use prometheus::Registry;
use tracing::info;

use super::client::FailoverClient;
use super::policy::FailoverPolicy;
use crate::config::Config;
use crate::connection::Connection;
use crate::logging::Logger;
use crate::telemetry::RpcMetrics;
use crate::traits::EthClient;
use crate::{FailoverError, Result};

/// Builder for configuring failover client instances.
pub struct FailoverClientBuilder {
    app: String,
    chain: String,
    config: Option<Config>,
    registry: Option<Registry>,
    logger: Logger,
}

impl FailoverClientBuilder {
    pub fn new(app: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            chain: chain.into(),
            config: None,
            registry: None,
            logger: Logger::noop(),
        }
    }

    /// Endpoint configuration (required).
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Register metrics here instead of the process-wide default registry.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Logger for client events. Defaults to [`Logger::noop`].
    pub fn logger(mut self, logger: impl Into<Logger>) -> Self {
        self.logger = logger.into();
        self
    }

    /// Validate the configuration, dial both endpoints, then set up metrics.
    ///
    /// If either dial fails nothing is registered and the already-dialed
    /// connection is dropped.
    pub async fn build(self) -> Result<FailoverClient<Connection>> {
        let config = self.take_config()?;
        self.logger.scope(|| {
            info!(
                app = %self.app,
                chain = %self.chain,
                primary = %config.primary_name,
                failover = %config.failover_name,
                "setting up rpc client"
            )
        });

        let primary = Connection::dial(&config.primary_url).await?;
        let secondary = Connection::dial(&config.failover_url).await?;
        self.assemble(config, primary, secondary)
    }

    /// Build over already-constructed clients.
    ///
    /// Used for custom transports and for tests; the configured URLs are not
    /// dialed, only the names and metrics flag are used.
    pub fn build_with<C: EthClient>(self, primary: C, secondary: C) -> Result<FailoverClient<C>> {
        let config = self.take_config()?;
        self.assemble(config, primary, secondary)
    }

    fn take_config(&self) -> Result<Config> {
        let config = self.config.clone().ok_or_else(|| {
            FailoverError::Configuration("no endpoint configuration provided".to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    fn assemble<C: EthClient>(
        self,
        config: Config,
        primary: C,
        secondary: C,
    ) -> Result<FailoverClient<C>> {
        let metrics = if config.enable_metrics {
            self.logger.scope(|| {
                info!(app = %self.app, chain = %self.chain, "enabling rpc metrics")
            });
            let metrics = RpcMetrics::new(&self.app, &self.chain)?;
            let registry = self
                .registry
                .as_ref()
                .unwrap_or_else(|| prometheus::default_registry());
            metrics.register(registry)?;
            Some(metrics)
        } else {
            None
        };

        Ok(FailoverClient {
            app: self.app,
            chain: self.chain,
            config,
            primary,
            secondary,
            metrics,
            policy: FailoverPolicy,
            logger: self.logger,
        })
    }
}

mod http;
mod multicast;

use std::{io, net::Ipv4Addr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::hub::WeatherHub;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to create UDP socket: {0}")]
    Socket(io::Error),
    #[error("failed to bind to port {1}: {0}")]
    Bind(io::Error, u16),
    #[error("failed to join multicast group {1}: {0}")]
    Join(io::Error, Ipv4Addr),
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

/// Something that feeds raw telemetry into the hub until told to stop.
#[async_trait]
pub trait Source: Send {
    async fn run(
        self: Box<Self>,
        hub: Arc<WeatherHub>,
        termination: broadcast::Receiver<()>,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum SourceConfig {
    Multicast(multicast::Config),
    Http(http::Config),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Multicast(multicast::Config::default())
    }
}

impl SourceConfig {
    /// Socket or client setup failures surface here, before anything runs.
    pub fn into_source(self) -> Result<Box<dyn Source>, Error> {
        match self {
            SourceConfig::Multicast(config) => {
                Ok(Box::new(multicast::MulticastSource::bind(config)?))
            }
            SourceConfig::Http(config) => Ok(Box::new(http::HttpSource::new(config)?)),
        }
    }
}

mod console;
mod file;

use anyhow::Context;
use async_trait::async_trait;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::hub::WeatherState;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sink: Send + Sync {
    async fn update(&mut self, state: &WeatherState) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum SinkConfig {
    Console,
    File(file::Config),
}

impl SinkConfig {
    pub async fn into_sink(self) -> anyhow::Result<Box<dyn Sink>> {
        match self {
            SinkConfig::Console => Ok(Box::new(console::ConsoleSink)),
            SinkConfig::File(config) => Ok(Box::new(
                file::FileSink::new(config)
                    .await
                    .context("failed to create file sink")?,
            )),
        }
    }
}

/// Hand every state change to `sink` until termination. Updates already
/// queued are delivered before the termination is honored.
pub async fn drive(
    mut sink: Box<dyn Sink>,
    mut updates: broadcast::Receiver<WeatherState>,
    mut termination: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            received = updates.recv() => match received {
                Ok(state) => {
                    if let Err(e) = sink.update(&state).await {
                        error!("sink failed to record update: {:#}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("sink fell behind, skipped {} updates", skipped);
                }
                Err(RecvError::Closed) => {
                    break;
                }
            },
            _ = termination.recv() => {
                break;
            },
        }
    }
}

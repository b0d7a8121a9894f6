use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast,
    time::{interval, MissedTickBehavior},
};

use super::{Error, Source};
use crate::{decode::decode_station_observations, hub::WeatherHub, message::TelemetryMessage};

#[inline]
fn default_base_url() -> String {
    "https://swd.weatherflow.com/swd/rest".to_string()
}
#[inline]
fn default_poll_period() -> Duration {
    Duration::from_secs(60)
}
#[inline]
fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Root of the REST API
    // optional, default: https://swd.weatherflow.com/swd/rest
    #[serde(default = "default_base_url")]
    base_url: String,
    // Personal access token, sent as the `token` query parameter
    // required
    token: String,
    // Station to poll
    // required
    station_id: u64,
    // Time between polls
    // optional, default: 60s
    #[serde(with = "humantime_serde", default = "default_poll_period")]
    poll_period: Duration,
    // Give up on a single request after this long
    // optional, default: 10s
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    request_timeout: Duration,
}

/// Polls the station observation endpoint instead of listening to the hub.
pub struct HttpSource {
    client: Client,
    url: String,
    token: String,
    station_id: u64,
    poll_period: Duration,
}

impl HttpSource {
    pub fn new(config: Config) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(Error::Client)?;
        let url = format!(
            "{}/observations/station/{}",
            config.base_url.trim_end_matches('/'),
            config.station_id
        );

        Ok(Self {
            client,
            url,
            token: config.token,
            station_id: config.station_id,
            poll_period: config.poll_period,
        })
    }

    async fn poll(&self) -> anyhow::Result<TelemetryMessage> {
        debug!("polling station {}", self.station_id);
        let response = self
            .client
            .get(&self.url)
            .query(&[("token", &self.token)])
            .send()
            .await
            // The request URL carries the token
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("request to `{}` failed", self.url))?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("station {} rejected the request", self.station_id))?;
        let body = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("failed to read body from `{}`", self.url))?;

        Ok(decode_station_observations(&body)?)
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn run(
        self: Box<Self>,
        hub: Arc<WeatherHub>,
        mut termination: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        info!(
            "polling station {} every {:?}",
            self.station_id, self.poll_period
        );
        let mut ticker = interval(self.poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = termination.recv() => {
                    break;
                },
                _ = ticker.tick() => {
                    // A slow request must not hold up shutdown
                    let polled = tokio::select! {
                        _ = termination.recv() => {
                            break;
                        },
                        polled = self.poll() => polled,
                    };
                    match polled {
                        Ok(message) => {
                            hub.apply(&message);
                        }
                        Err(e) => {
                            warn!("failed to poll station {}: {:#}", self.station_id, e);
                        }
                    }
                },
            }
        }

        info!("stopped polling station {}", self.station_id);
        Ok(())
    }
}

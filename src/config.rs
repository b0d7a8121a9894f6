use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{sink::SinkConfig, source::SourceConfig};

#[inline]
fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig::Console]
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct Config {
    // Where telemetry comes from
    // optional, default: multicast on 239.255.255.250:50222
    #[serde(default)]
    pub source: SourceConfig,
    // Consumers notified on every state change
    // optional, default: [Console]
    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            sinks: default_sinks(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("failed to open file {}", path.display()))?;
        serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

mod config;
mod decode;
mod hub;
mod message;
mod normalize;
mod sink;
mod source;
use crate::config::Config;
use crate::hub::WeatherHub;

use std::{path::Path, sync::Arc};

use anyhow::Context;
use clap::{App, Arg};
use futures::future::join_all;
use indoc::indoc;
use log::{info, warn};
use tokio::{
    sync,
    time::{sleep, Duration, Instant},
};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn load_config(explicit: Option<&str>) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => {
            info!("open and parse config file {}", path);
            Config::from_file(path)
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            info!("open and parse config file {}", DEFAULT_CONFIG_PATH);
            Config::from_file(DEFAULT_CONFIG_PATH)
        }
        None => {
            info!("no config file found, listening on the default multicast group");
            Ok(Config::default())
        }
    }
}

async fn serve(
    config: Config,
    termination_sender: sync::broadcast::Sender<()>,
    mut termination_receiver: sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let hub = Arc::new(WeatherHub::new());

    // Socket setup failures end the process here
    let source = config
        .source
        .into_source()
        .context("failed to start telemetry source")?;

    let mut handles = Vec::new();
    for sink_config in config.sinks {
        let sink = sink_config.into_sink().await?;
        handles.push(tokio::spawn(sink::drive(
            sink,
            hub.subscribe(),
            termination_sender.subscribe(),
        )));
    }
    let source_handle = tokio::spawn(source.run(hub.clone(), termination_sender.subscribe()));

    ctrlc::set_handler({
        let termination_sender = termination_sender.clone();
        move || {
            info!("signal received, terminating...");
            let _ = termination_sender.send(());
        }
    })
    .context("failed to set up signal handlers")?;

    let mut deadline = Box::pin(sleep(Duration::from_secs(5)));
    let mut terminated = false;
    tokio::pin!(source_handle);
    let source_result = loop {
        tokio::select! {
            _ = termination_receiver.recv(), if !terminated => {
                terminated = true;
                deadline.as_mut().reset(Instant::now() + Duration::from_secs(5));
            },
            _ = &mut deadline, if terminated => {
                warn!("tasks didn't terminate in time, force exit in 1s");
                return Ok(());
            },
            r = &mut source_handle => {
                break r;
            },
        }
    };

    // A source that stops on its own takes the sinks down with it
    let _ = termination_sender.send(());
    tokio::select! {
        _ = join_all(handles) => {},
        _ = sleep(Duration::from_secs(5)) => {
            warn!("sinks didn't terminate in time, force exit in 1s");
        },
    }

    let last = hub.snapshot();
    info!(
        "relay stopped, last update at {}",
        last.last_updated_at
            .map_or_else(|| "never".to_string(), |at| at.to_rfc3339())
    );
    source_result.context("telemetry source panicked")?
}

fn main() -> anyhow::Result<()> {
    let cmd = App::new("tempest-relay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Relay live Tempest hub telemetry into a single current-conditions record")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .help("Sets custom config file location")
                .long_help(indoc!(
                    "Sets custom config file location, default to read config.yaml if present
                    The custom config must be a file of YAML 1.2 format.
                    The following configuration keys are supported:
                    source: optional, one of
                        Multicast: group (default 239.255.255.250), port (default 50222),
                                   interface (default 0.0.0.0)
                        Http: token (required), station_id (required),
                              base_url, poll_period (default 60s), request_timeout (default 10s)
                    sinks: optional, default [Console], a list of
                        Console
                        File: path (required), appends one JSON object per update
                    "
                ))
                .value_name("FILE")
                .takes_value(true),
        )
        .get_matches();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config(cmd.value_of("config"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let (termination_sender, termination_receiver) = sync::broadcast::channel(1);
    let result = runtime.block_on(serve(config, termination_sender, termination_receiver));
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

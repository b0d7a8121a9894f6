use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::UdpSocket, sync::broadcast};

use super::{Error, Source};
use crate::hub::WeatherHub;

/// Larger datagrams are truncated by the socket and then fail to decode.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

#[inline]
fn default_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 255, 250)
}
#[inline]
fn default_port() -> u16 {
    50222
}
#[inline]
fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Multicast group the hub broadcasts to
    // optional, default: 239.255.255.250
    #[serde(default = "default_group")]
    group: Ipv4Addr,
    // UDP port the hub broadcasts to
    // optional, default: 50222
    #[serde(default = "default_port")]
    port: u16,
    // Local interface used to join the group
    // optional, default: 0.0.0.0 (let the OS pick)
    #[serde(default = "default_interface")]
    interface: Ipv4Addr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group: default_group(),
            port: default_port(),
            interface: default_interface(),
        }
    }
}

pub struct MulticastSource {
    socket: UdpSocket,
    group: Ipv4Addr,
    port: u16,
}

impl MulticastSource {
    pub fn bind(config: Config) -> Result<Self, Error> {
        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(Error::Socket)?;
        // Let restarts and other listeners share the port
        socket.set_reuse_address(true).map_err(Error::Socket)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(Error::Socket)?;

        let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        socket
            .bind(&address.into())
            .map_err(|e| Error::Bind(e, config.port))?;
        socket
            .join_multicast_v4(&config.group, &config.interface)
            .map_err(|e| Error::Join(e, config.group))?;
        socket.set_nonblocking(true).map_err(Error::Socket)?;

        let socket = UdpSocket::from_std(socket.into()).map_err(Error::Socket)?;
        debug!(
            "joined multicast group {} on port {} via {}",
            config.group, config.port, config.interface
        );

        Ok(Self {
            socket,
            group: config.group,
            port: config.port,
        })
    }
}

/// Feed every datagram into the hub until termination. Receive errors are
/// logged and never end the loop.
async fn receive_loop(
    socket: &UdpSocket,
    hub: &WeatherHub,
    mut termination: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            _ = termination.recv() => {
                break;
            },
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    debug!("received {} bytes from {}", len, peer);
                    hub.ingest(&buf[..len]);
                }
                Err(e) => {
                    warn!("failed to receive datagram: {}", e);
                }
            },
        }
    }
}

#[async_trait]
impl Source for MulticastSource {
    async fn run(
        self: Box<Self>,
        hub: Arc<WeatherHub>,
        termination: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        info!("listening for hub broadcasts on {}:{}", self.group, self.port);
        receive_loop(&self.socket, &hub, termination).await;
        info!("multicast receiver on {}:{} stopped", self.group, self.port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const OBS: &[u8] =
        br#"{"type":"obs_st","obs":[[1700000000,1.0,2.0,3.0,180,0,1013.0,20.0,55,0.0,5.0]]}"#;

    #[test]
    fn config_defaults_to_hub_broadcast_address() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.group, Ipv4Addr::new(239, 255, 255, 250));
        assert_eq!(config.port, 50222);
        assert_eq!(config.interface, Ipv4Addr::UNSPECIFIED);
    }

    #[tokio::test]
    async fn loop_survives_bad_datagrams_and_stops_on_termination() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let hub = Arc::new(WeatherHub::new());
        let mut updates = hub.subscribe();
        let (termination_sender, termination_receiver) = broadcast::channel(1);
        let handle = tokio::spawn({
            let hub = hub.clone();
            async move { receive_loop(&receiver, &hub, termination_receiver).await }
        });

        // Valid up front, cut off by the receive buffer
        let mut oversized =
            br#"{"type":"obs_st","obs":[[1700000000,1.0,2.0,3.0,180,0,1013.0,30.0,55,0.0,5.0]],"pad":""#
                .to_vec();
        oversized.extend(std::iter::repeat(b'x').take(MAX_DATAGRAM_SIZE));
        oversized.extend(b"\"}");

        sender.send_to(b"\x00\xffgarbage", target).await.unwrap();
        sender.send_to(&oversized, target).await.unwrap();
        sender.send_to(br#"{"type":"device_status"}"#, target).await.unwrap();
        sender.send_to(OBS, target).await.unwrap();

        let state = timeout(Duration::from_secs(5), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.temperature_fahrenheit, Some(68.0));
        assert!(updates.try_recv().is_err());

        termination_sender.send(()).unwrap();
        timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn listeners_share_port_and_feed_hub() {
        let first = MulticastSource::bind(Config {
            port: 0,
            ..Config::default()
        })
        .unwrap();
        let port = first.socket.local_addr().unwrap().port();
        // A second listener, such as another app on the same host, binds too
        let second = MulticastSource::bind(Config {
            port,
            ..Config::default()
        })
        .unwrap();
        assert_eq!(second.socket.local_addr().unwrap().port(), port);

        let hub = Arc::new(WeatherHub::new());
        let mut updates = hub.subscribe();
        let (termination_sender, _) = broadcast::channel(1);
        let handles: Vec<_> = vec![first, second]
            .into_iter()
            .map(|source| {
                let source: Box<dyn Source> = Box::new(source);
                tokio::spawn(source.run(hub.clone(), termination_sender.subscribe()))
            })
            .collect();

        // Either listener may receive it; both feed the same hub
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(OBS, (Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();
        let state = timeout(Duration::from_secs(5), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.temperature_fahrenheit, Some(68.0));

        termination_sender.send(()).unwrap();
        for handle in handles {
            timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
        }
    }
}

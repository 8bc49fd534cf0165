//! Broker session over rumqttc. QoS 2 for every publish and subscription.

use std::time::Duration;

use nowgate_core::NodeAddr;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, LastWill, MqttOptions,
    NetworkOptions, Packet, QoS,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;

const REQUEST_CAPACITY: usize = 128;
const EVENT_CAPACITY: usize = 64;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

pub fn client_id(addr: &NodeAddr) -> String {
    format!("nowgate-{}", addr)
}

/// What the run loop needs from one event-loop event.
#[derive(Debug, PartialEq, Eq)]
pub enum MqttEvent {
    Connected,
    Message { topic: String, payload: Vec<u8> },
    Other,
}

/// Connection options. The will marks `will_topic` offline (retained) if the session dies.
pub fn options(cfg: &MqttConfig, client_id: String, will_topic: &str) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, cfg.host.clone(), cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs).max(MIN_KEEP_ALIVE));
    opts.set_clean_session(true);
    opts.set_last_will(LastWill::new(will_topic, "offline", QoS::ExactlyOnce, true));
    if let Some(user) = &cfg.user {
        opts.set_credentials(user.clone(), cfg.password.clone().unwrap_or_default());
    }
    opts
}

/// Broker session. The rumqttc event loop runs in its own task and hands events over a channel.
pub struct MqttSession {
    client: AsyncClient,
    events: mpsc::Receiver<Result<MqttEvent, ConnectionError>>,
    driver: JoinHandle<()>,
    connected: bool,
}

fn classify(event: Event) -> MqttEvent {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => MqttEvent::Connected,
        Event::Incoming(Packet::Publish(p)) => MqttEvent::Message {
            topic: p.topic,
            payload: p.payload.to_vec(),
        },
        _ => MqttEvent::Other,
    }
}

/// Forwards events until the first error or until the session is dropped.
async fn drive(mut eventloop: EventLoop, tx: mpsc::Sender<Result<MqttEvent, ConnectionError>>) {
    loop {
        let item = eventloop.poll().await.map(classify);
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}

impl MqttSession {
    /// Spawns the event-loop task, which starts connecting right away.
    pub fn new(cfg: &MqttConfig, opts: MqttOptions) -> Self {
        let (client, mut eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);
        let mut net = NetworkOptions::new();
        net.set_connection_timeout(cfg.connect_timeout_secs.max(1));
        eventloop.set_network_options(net);
        let (tx, events) = mpsc::channel(EVENT_CAPACITY);
        Self {
            client,
            events,
            driver: tokio::spawn(drive(eventloop, tx)),
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Next broker event. Cancel-safe.
    pub async fn poll(&mut self) -> Result<MqttEvent, ConnectionError> {
        let item = self
            .events
            .recv()
            .await
            .unwrap_or(Err(ConnectionError::RequestsDone));
        match &item {
            Ok(MqttEvent::Connected) => self.connected = true,
            Ok(_) => {}
            Err(_) => self.connected = false,
        }
        item
    }

    pub fn publish(
        &self,
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), ClientError> {
        self.client
            .try_publish(topic, QoS::ExactlyOnce, retain, payload)
    }

    pub fn subscribe(&self, topic: String) -> Result<(), ClientError> {
        self.client.try_subscribe(topic, QoS::ExactlyOnce)
    }

    /// Disconnect, giving the event loop at most `within` to flush queued publishes.
    pub async fn close(mut self, within: Duration) {
        if self.client.try_disconnect().is_err() {
            return;
        }
        let _ = tokio::time::timeout(within, async {
            while let Some(Ok(_)) = self.events.recv().await {}
        })
        .await;
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    pub(crate) const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    /// One MQTT control packet: first header byte and body.
    pub(crate) async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let header = stream.read_u8().await?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let b = stream.read_u8().await?;
            len |= usize::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await?;
        Ok((header, body))
    }

    /// Topic and payload of a PUBLISH body.
    pub(crate) fn publish_parts(header: u8, body: &[u8]) -> (String, Vec<u8>) {
        let len = usize::from(u16::from_be_bytes([body[0], body[1]]));
        let topic = String::from_utf8(body[2..2 + len].to_vec()).unwrap();
        let id = if (header >> 1) & 0x03 > 0 { 2 } else { 0 };
        (topic, body[2 + len + id..].to_vec())
    }

    #[test]
    fn client_id_uses_address() {
        let addr: NodeAddr = "246f28000001".parse().unwrap();
        assert_eq!(client_id(&addr), "nowgate-246f28000001");
    }

    #[test]
    fn options_from_config() {
        let cfg = MqttConfig {
            keep_alive_secs: 1,
            user: Some("gw".to_string()),
            password: Some("pw".to_string()),
            ..MqttConfig::default()
        };
        let opts = options(&cfg, "nowgate-x".to_string(), "home/espnow_gateway/x/status");
        assert_eq!(opts.client_id(), "nowgate-x");
        assert_eq!(opts.keep_alive(), MIN_KEEP_ALIVE);
        assert_eq!(opts.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(
            opts.credentials(),
            Some(("gw".to_string(), "pw".to_string()))
        );
        assert!(opts.last_will().is_some());
    }

    #[tokio::test]
    async fn unreachable_broker_fails_fast() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let cfg = MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_secs: 1,
            ..MqttConfig::default()
        };
        let mut session = MqttSession::new(&cfg, options(&cfg, "t".to_string(), "t/status"));
        assert!(session.poll().await.is_err());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn slow_connack_survives_other_wakeups() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cfg = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
            ..MqttConfig::default()
        };
        let broker = async {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (connect, _) = read_packet(&mut stream).await.unwrap();
            assert_eq!(connect >> 4, 1);
            tokio::time::sleep(Duration::from_millis(200)).await;
            stream.write_all(&CONNACK).await.unwrap();
            stream
        };
        let client = async {
            let mut session = MqttSession::new(&cfg, options(&cfg, "t".to_string(), "t/status"));
            let mut wakeups = 0;
            loop {
                tokio::select! {
                    ev = session.poll() => {
                        assert_eq!(ev.unwrap(), MqttEvent::Connected);
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(10)) => wakeups += 1,
                }
            }
            assert!(wakeups > 5);
            assert!(session.is_connected());
            session
        };
        let (_stream, _session) = tokio::join!(broker, client);
        let second = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(second.is_err(), "client reconnected");
    }
}

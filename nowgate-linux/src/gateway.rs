//! One gateway session: owns the core, radio adapter, broker session and timers.
//! Services due flags, then waits on radio, broker, shutdown, reload or the idle tick.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nowgate_core::{
    Action, Concern, DeviceType, GatewayCore, HostSnapshot, LinkStatus, Scheduler,
};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::link;
use crate::mqtt::{self, MqttEvent, MqttSession};
use crate::radio::Radio;
use crate::timers::Timers;

/// Upper bound on loop latency for raised flags.
const IDLE_TICK: Duration = Duration::from_millis(50);
/// Time allowed for queued publishes to leave when a session ends.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Shutdown,
    /// Restart command addressed to this gateway.
    Restart,
    /// SIGHUP.
    Reload,
}

enum Wake {
    Shutdown,
    Reload,
    Radio(std::io::Result<(nowgate_core::NodeAddr, Vec<u8>)>),
    Mqtt(Result<MqttEvent, rumqttc::ConnectionError>),
    Idle,
}

enum Flow {
    Continue,
    Restart,
}

struct Gateway<'a> {
    cfg: &'a Config,
    core: GatewayCore,
    radio: Radio,
    mqtt: Option<MqttSession>,
    started: Instant,
}

async fn poll_mqtt(
    session: &mut Option<MqttSession>,
) -> Result<MqttEvent, rumqttc::ConnectionError> {
    match session {
        Some(s) => s.poll().await,
        None => std::future::pending().await,
    }
}

/// Run one session until shutdown, reload or a local restart.
pub async fn run_session(
    cfg: &Config,
    started: Instant,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let core = GatewayCore::new(cfg.gateway_config()?).context("invalid gateway configuration")?;
    let radio = Radio::bind(cfg.radio.bind, cfg.radio.adapter)
        .await
        .with_context(|| format!("binding radio link on {}", cfg.radio.bind))?;
    let radio_addr = radio.local_addr()?;
    info!(
        node = %core.node_address(),
        radio = %radio_addr,
        transport = cfg.transport.as_str(),
        broker = %format!("{}:{}", cfg.mqtt.host, cfg.mqtt.port),
        "session started"
    );
    let (scheduler, triggers) = Scheduler::new();
    let _timers = Timers::spawn(&triggers, &cfg.intervals);
    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut gw = Gateway {
        cfg,
        core,
        radio,
        mqtt: None,
        started,
    };
    let end = gw.run(&scheduler, shutdown, &mut hangup).await;
    gw.finish().await;
    end
}

impl Gateway<'_> {
    async fn run(
        &mut self,
        scheduler: &Scheduler,
        shutdown: &mut watch::Receiver<bool>,
        hangup: &mut tokio::signal::unix::Signal,
    ) -> Result<SessionEnd> {
        loop {
            if *shutdown.borrow() {
                return Ok(SessionEnd::Shutdown);
            }
            for concern in scheduler.take_due() {
                let actions = self.service(concern).await;
                if let Flow::Restart = self.execute(actions).await {
                    return Ok(SessionEnd::Restart);
                }
            }
            let wake = tokio::select! {
                biased;
                _ = shutdown.changed() => Wake::Shutdown,
                _ = hangup.recv() => Wake::Reload,
                r = self.radio.recv() => Wake::Radio(r),
                ev = poll_mqtt(&mut self.mqtt) => Wake::Mqtt(ev),
                _ = tokio::time::sleep(IDLE_TICK) => Wake::Idle,
            };
            let actions = match wake {
                Wake::Shutdown => return Ok(SessionEnd::Shutdown),
                Wake::Reload => return Ok(SessionEnd::Reload),
                Wake::Radio(r) => {
                    let (from, frame) = r.context("radio link")?;
                    self.core.on_radio_frame(from, &frame)
                }
                Wake::Mqtt(Ok(MqttEvent::Connected)) => {
                    let host = self.snapshot().await;
                    self.core.on_broker_connected(&host)
                }
                Wake::Mqtt(Ok(MqttEvent::Message { topic, payload })) => {
                    self.core.on_mqtt_message(&topic, &payload)
                }
                Wake::Mqtt(Ok(MqttEvent::Other)) => Vec::new(),
                Wake::Mqtt(Err(e)) => {
                    warn!(error = %e, "broker connection");
                    self.mqtt = None;
                    self.core.on_broker_lost()
                }
                Wake::Idle => Vec::new(),
            };
            if let Flow::Restart = self.execute(actions).await {
                return Ok(SessionEnd::Restart);
            }
        }
    }

    async fn service(&mut self, concern: Concern) -> Vec<Action> {
        match concern {
            Concern::Availability => {
                let status = LinkStatus {
                    link_up: link::link_up(self.cfg.transport, &self.cfg.interface),
                    client_connected: self.mqtt.as_ref().is_some_and(MqttSession::is_connected),
                };
                self.core.on_availability_check(status)
            }
            Concern::KeepAlive => self.core.on_keep_alive_due(),
            Concern::Attributes => {
                debug!(stats = %self.core.stats(), "bridge");
                let host = self.snapshot().await;
                self.core.on_attributes_due(&host)
            }
        }
    }

    async fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            ip: link::local_ip_towards(&self.cfg.mqtt.host, self.cfg.mqtt.port).await,
            uptime: self.started.elapsed(),
        }
    }

    fn connect(&mut self) {
        let addr = self.core.node_address();
        let will = self
            .core
            .topics()
            .availability(DeviceType::Gateway, &addr);
        let opts = mqtt::options(&self.cfg.mqtt, mqtt::client_id(&addr), &will);
        self.mqtt = Some(MqttSession::new(&self.cfg.mqtt, opts));
    }

    async fn execute(&mut self, actions: Vec<Action>) -> Flow {
        for action in actions {
            match action {
                Action::Connect => self.connect(),
                Action::Subscribe { topic } => match &self.mqtt {
                    Some(s) => {
                        if let Err(e) = s.subscribe(topic) {
                            warn!(error = %e, "subscribe");
                        }
                    }
                    None => debug!(%topic, "no broker session; subscribe skipped"),
                },
                Action::Publish {
                    topic,
                    payload,
                    retain,
                } => match &self.mqtt {
                    Some(s) => {
                        if let Err(e) = s.publish(topic, payload, retain) {
                            warn!(error = %e, "publish");
                        }
                    }
                    None => debug!(%topic, "no broker session; publish skipped"),
                },
                Action::Unicast { to, frame } => {
                    if let Err(e) = self.radio.unicast(to, &frame).await {
                        warn!(error = %e, %to, "radio unicast");
                    }
                }
                Action::Broadcast { frame } => {
                    if let Err(e) = self.radio.broadcast(&frame).await {
                        warn!(error = %e, "radio broadcast");
                    }
                }
                Action::Restart => return Flow::Restart,
            }
        }
        Flow::Continue
    }

    /// Announce offline and close the broker session.
    async fn finish(mut self) {
        let actions = self.core.on_shutdown();
        self.execute(actions).await;
        if let Some(session) = self.mqtt.take() {
            session.close(CLOSE_GRACE).await;
        }
        info!(stats = %self.core.stats(), "session ended");
    }
}

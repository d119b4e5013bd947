//! Bridge lifecycle: MQTT connection, `dmon` supervision, and shutdown.
//!
//! One coordination loop multiplexes the three event sources (MQTT events,
//! subprocess stdout, termination signals), so the device list and parser
//! state have a single writer and samples reach the broker in parse order.

use std::process::Stdio;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::signal::unix::{SignalKind, signal};

use crate::config::NvsmiBridgeConfig;
use crate::discovery;
use crate::error::{BridgeError, Result};
use crate::gpu::Gpu;
use crate::router;
use crate::stream::{DmonParser, Sample};
use crate::topics::Topics;

/// How long the shutdown path waits for the broker to acknowledge the
/// retained `offline` publication before disconnecting anyway.
const OFFLINE_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before re-polling the event loop after a connection error, while
/// the client's built-in reconnection backs off.
const RECONNECT_POLL_DELAY: Duration = Duration::from_secs(2);

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No broker session established (initial state, and after a
    /// connection error until the client reconnects).
    Disconnected,
    /// Broker session established; discovery and samples may flow.
    Connected,
    /// Shutdown initiated; nothing may be published except the final
    /// offline availability.
    ShuttingDown,
}

impl ConnectionState {
    /// Transition into `ShuttingDown`, reporting whether this call
    /// initiated the shutdown. Later calls are no-ops.
    pub fn begin_shutdown(&mut self) -> bool {
        if *self == ConnectionState::ShuttingDown {
            return false;
        }
        *self = ConnectionState::ShuttingDown;
        true
    }
}

/// The bridge's long-lived state: configuration, the immutable GPU list,
/// and the MQTT client half of the connection.
pub struct Bridge {
    config: NvsmiBridgeConfig,
    topics: Topics,
    gpus: Vec<Gpu>,
    client: AsyncClient,
    state: ConnectionState,
}

impl Bridge {
    /// Create the bridge and its paired MQTT event loop.
    ///
    /// The retained `offline` last-will is registered here, before the
    /// first connection attempt, so the broker announces an unclean death
    /// even if the bridge never reaches steady state.
    pub fn new(config: NvsmiBridgeConfig, gpus: Vec<Gpu>) -> (Self, EventLoop) {
        let topics = Topics::new(&config.topics.base, &config.topics.discovery_prefix);

        let mut options = MqttOptions::new(
            config.mqtt.client_id.clone(),
            config.mqtt.host.clone(),
            config.mqtt.port,
        );
        options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));
        if let (Some(username), Some(password)) = (&config.mqtt.username, &config.mqtt.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        options.set_last_will(LastWill::new(
            topics.availability(),
            discovery::AVAILABILITY_OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, 16);

        (
            Self {
                config,
                topics,
                gpus,
                client,
                state: ConnectionState::Disconnected,
            },
            eventloop,
        )
    }

    /// Run until a termination signal arrives or the subprocess exits.
    ///
    /// Returns the process exit code: 0 after a signal-driven shutdown,
    /// otherwise the subprocess's own exit code.
    pub async fn run(mut self, mut eventloop: EventLoop) -> Result<i32> {
        let mut child = self.spawn_dmon()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Subprocess("dmon stdout not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr));
        }

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        let mut parser = DmonParser::new();
        let mut buf = vec![0u8; 8192];

        loop {
            tokio::select! {
                event = eventloop.poll() => {
                    self.handle_event(event).await;
                }
                read = stdout.read(&mut buf) => match read {
                    Ok(0) => {
                        let code = wait_exit_code(&mut child).await;
                        tracing::error!(code, "sampling subprocess exited, stopping bridge");
                        let _ = self.client.disconnect().await;
                        return Ok(code);
                    }
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]);
                        for sample in parser.feed(&chunk) {
                            self.forward(&sample).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to read from dmon");
                        let code = wait_exit_code(&mut child).await;
                        let _ = self.client.disconnect().await;
                        return Ok(code);
                    }
                },
                _ = sigint.recv() => {
                    if self.shutdown(&mut child, &mut eventloop).await {
                        return Ok(0);
                    }
                }
                _ = sigterm.recv() => {
                    if self.shutdown(&mut child, &mut eventloop).await {
                        return Ok(0);
                    }
                }
            }
        }
    }

    /// Spawn `nvidia-smi dmon` in continuous CSV mode with piped output.
    fn spawn_dmon(&self) -> Result<Child> {
        let child = Command::new(&self.config.nvsmi.binary)
            .args(["dmon", "--format", "csv", "-s"])
            .arg(&self.config.nvsmi.sections)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BridgeError::Subprocess(format!(
                    "failed to spawn {} dmon: {}",
                    self.config.nvsmi.binary, e
                ))
            })?;

        tracing::info!(
            binary = %self.config.nvsmi.binary,
            sections = %self.config.nvsmi.sections,
            "sampling subprocess started"
        );

        Ok(child)
    }

    /// React to one MQTT event.
    async fn handle_event(&mut self, event: std::result::Result<Event, ConnectionError>) {
        match event {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                tracing::info!(
                    host = %self.config.mqtt.host,
                    port = self.config.mqtt.port,
                    "connected to MQTT broker"
                );
                self.state = ConnectionState::Connected;

                let status_topic = self.topics.platform_status();
                if let Err(e) = self
                    .client
                    .subscribe(status_topic.clone(), QoS::AtLeastOnce)
                    .await
                {
                    tracing::warn!(topic = %status_topic, error = %e, "failed to subscribe to status topic");
                }

                self.publish_discovery().await;
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                if publish.topic == self.topics.platform_status() {
                    tracing::info!(
                        payload = %String::from_utf8_lossy(&publish.payload),
                        "status broadcast received, re-publishing discovery"
                    );
                    self.publish_discovery().await;
                } else {
                    tracing::debug!(topic = %publish.topic, "ignoring message on unexpected topic");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "MQTT connection error");
                if self.state == ConnectionState::Connected {
                    self.state = ConnectionState::Disconnected;
                }
                tokio::time::sleep(RECONNECT_POLL_DELAY).await;
            }
        }
    }

    /// Re-assert the retained discovery and availability state.
    async fn publish_discovery(&self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Err(e) = discovery::publish(&self.client, &self.gpus, &self.topics).await {
            tracing::warn!(error = %e, "discovery publish failed");
        }
    }

    /// Publish a routed sample; routing misses and publish failures drop
    /// the sample without affecting the stream.
    async fn forward(&self, sample: &Sample) {
        let Some((topic, payload)) = router::route(sample, &self.gpus, &self.topics) else {
            tracing::debug!(index = %sample.device_index, "sample for unknown GPU index dropped");
            return;
        };
        if let Err(e) = self
            .client
            .publish(topic.as_str(), QoS::AtMostOnce, false, payload)
            .await
        {
            tracing::warn!(topic = %topic, error = %e, "failed to publish sample");
        }
    }

    /// Idempotent shutdown: terminate dmon, assert retained `offline`,
    /// wait for the broker's acknowledgment, then disconnect.
    ///
    /// Returns false when a shutdown was already in progress.
    async fn shutdown(&mut self, child: &mut Child, eventloop: &mut EventLoop) -> bool {
        if !self.state.begin_shutdown() {
            tracing::debug!("shutdown already in progress");
            return false;
        }
        tracing::info!("shutting down");

        if let Err(e) = child.start_kill() {
            tracing::warn!(error = %e, "failed to terminate dmon");
        }
        let _ = child.wait().await;

        self.publish_offline(eventloop).await;

        let _ = self.client.disconnect().await;
        flush_eventloop(eventloop).await;

        true
    }

    /// Publish the retained `offline` availability and drive the event
    /// loop until the broker acknowledges it (bounded wait).
    ///
    /// The explicit offline must reach the broker before the session ends;
    /// otherwise the final retained state would depend on the timing of
    /// the broker-side last-will.
    async fn publish_offline(&self, eventloop: &mut EventLoop) {
        let topic = self.topics.availability();
        if let Err(e) = self
            .client
            .publish(topic.as_str(), QoS::AtLeastOnce, true, discovery::AVAILABILITY_OFFLINE)
            .await
        {
            tracing::warn!(topic = %topic, error = %e, "failed to publish offline availability");
            return;
        }

        let acked = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::PubAck(_))) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "connection error while flushing offline publish");
                        break;
                    }
                }
            }
        };

        if tokio::time::timeout(OFFLINE_ACK_TIMEOUT, acked).await.is_err() {
            tracing::warn!("timed out waiting for offline publish acknowledgment");
        } else {
            tracing::info!("offline availability acknowledged");
        }
    }
}

/// Drive the event loop briefly so the DISCONNECT packet leaves the socket.
async fn flush_eventloop(eventloop: &mut EventLoop) {
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
}

/// Reap the subprocess, mapping a signal death to exit code 0.
async fn wait_exit_code(child: &mut Child) -> i32 {
    match child.wait().await {
        Ok(status) => status.code().unwrap_or(0),
        Err(e) => {
            tracing::warn!(error = %e, "failed to reap dmon");
            0
        }
    }
}

/// Forward subprocess stderr to the diagnostic log, line by line. Never
/// routed to the bus.
async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!("dmon: {}", line);
    }
}

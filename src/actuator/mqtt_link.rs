//! MQTT-backed actuator link.
//!
//! Each move command is published as one text line on the configured topic:
//!
//! ```text
//! move <mode> <chassis_x> <chassis_y> <gimbal_x> <gimbal_y>
//! ```
//!
//! The rumqttc event loop runs on its own thread; the control loop only ever
//! calls the non-blocking `try_publish`. When the request queue is full
//! (stalled broker) the command is dropped with a warning instead of stalling
//! frames or failing the loop. The next change or keep-alive refresh carries
//! the current intent again.

use super::{Actuator, ActuatorError, Connection, ControlMode};
use crate::controller::stick::StickPosition;
use rumqttc::{Client, ClientError, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// rumqttc refuses keep-alive intervals below this
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

// Request queue between the client handle and the event loop thread
const REQUEST_CAPACITY: usize = 10;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MqttLinkConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    /// Bring the link up before the first frame
    pub start_on_launch: bool,
}

impl Default for MqttLinkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "robomaster-control".to_string(),
            topic: "robomaster/move".to_string(),
            user: None,
            password: None,
            keep_alive_secs: MIN_KEEP_ALIVE_SECS,
            connect_timeout_ms: 3000,
            start_on_launch: true,
        }
    }
}

/// Encodes one move command as the wire text line.
pub fn encode_move(mode: ControlMode, chassis: &StickPosition, gimbal: &StickPosition) -> String {
    format!(
        "move {} {:.4} {:.4} {:.4} {:.4}",
        mode, chassis.x, chassis.y, gimbal.x, gimbal.y
    )
}

struct MqttSession {
    client: Client,
    connected: Arc<AtomicBool>,
}

pub struct MqttLink {
    name: String,
    config: MqttLinkConfig,
    session: Option<MqttSession>,
}

impl MqttLink {
    pub fn new(name: impl Into<String>, config: MqttLinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &MqttLinkConfig {
        &self.config
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(
            self.config.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS),
        ));
        if let (Some(user), Some(password)) = (&self.config.user, &self.config.password) {
            options.set_credentials(user.clone(), password.clone());
        }
        options
    }
}

impl Connection for MqttLink {
    fn connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.connected.load(Ordering::SeqCst))
    }

    fn start(&mut self) -> Result<(), ActuatorError> {
        if self.connected() {
            debug!("[{}] Link already up", self.name);
            return Ok(());
        }

        info!(
            "[{}] Connecting to {}:{}",
            self.name, self.config.host, self.config.port
        );

        let (client, mut connection) = Client::new(self.mqtt_options(), REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let flag = connected.clone();
        let name = self.name.clone();
        thread::Builder::new()
            .name(format!("{}-mqtt", self.name))
            .spawn(move || {
                for notification in connection.iter() {
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            let accepted = ack.code == ConnectReturnCode::Success;
                            flag.store(accepted, Ordering::SeqCst);
                            let _ = ready_tx.send(accepted);
                            if !accepted {
                                warn!("[{}] Broker refused connection: {:?}", name, ack.code);
                                break;
                            }
                        }
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            debug!("[{}] Disconnect sent, leaving event loop", name);
                            flag.store(false, Ordering::SeqCst);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("[{}] Connection lost: {}", name, e);
                            flag.store(false, Ordering::SeqCst);
                            let _ = ready_tx.send(false);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| ActuatorError::ConnectFailed(e.to_string()))?;

        match ready_rx.recv_timeout(Duration::from_millis(self.config.connect_timeout_ms)) {
            Ok(true) => {
                info!("[{}] Link up", self.name);
                self.session = Some(MqttSession { client, connected });
                Ok(())
            }
            Ok(false) => Err(ActuatorError::ConnectFailed(format!(
                "{}:{} refused or dropped the connection",
                self.config.host, self.config.port
            ))),
            Err(_) => {
                let _ = client.disconnect();
                Err(ActuatorError::ConnectFailed(format!(
                    "no answer from {}:{} within {}ms",
                    self.config.host, self.config.port, self.config.connect_timeout_ms
                )))
            }
        }
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        let Some(session) = self.session.take() else {
            debug!("[{}] Link already down", self.name);
            return Ok(());
        };

        info!("[{}] Disconnecting", self.name);
        session.connected.store(false, Ordering::SeqCst);
        session
            .client
            .try_disconnect()
            .map_err(|e| ActuatorError::DisconnectFailed(e.to_string()))
    }
}

impl Actuator for MqttLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn move_sticks(
        &mut self,
        chassis: &StickPosition,
        gimbal: &StickPosition,
        mode: ControlMode,
    ) -> Result<(), ActuatorError> {
        let session = match &self.session {
            Some(session) if session.connected.load(Ordering::SeqCst) => session,
            _ => return Err(ActuatorError::NotConnected(self.name.clone())),
        };

        let payload = encode_move(mode, chassis, gimbal);
        debug!("[{}] Publishing: {}", self.name, payload);
        match session
            .client
            .try_publish(self.config.topic.clone(), QoS::AtMostOnce, false, payload)
        {
            Ok(()) => Ok(()),
            Err(ClientError::TryRequest(_)) => {
                warn!("[{}] Request queue full, dropping command", self.name);
                Ok(())
            }
            Err(e) => Err(ActuatorError::Transport(e.to_string())),
        }
    }

    fn connection(&mut self) -> Option<&mut dyn Connection> {
        Some(self)
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        if self.connected() {
            if let Err(e) = self.stop() {
                warn!("[{}] Error disconnecting on drop: {}", self.name, e);
            }
        }
    }
}

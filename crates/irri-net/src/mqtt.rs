//! ---
//! irri_section: "07-networking-interfaces"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Network transports bridging the engine to the outside."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use irri_common::{FarmConfig, MqttConfig};
use irri_msg::{CommandPublisher, PublishError, TelemetrySink};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Delay before re-polling after a connection error.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Established (lazily connecting) MQTT session with the broker.
///
/// `rumqttc` connects on the first event-loop poll; construct the link, hand
/// its [`DeviceChannel`] to the dispatcher, then [`MqttLink::spawn`] the
/// subscription loop with the engine's ingestor.
pub struct MqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
    farm: FarmConfig,
    publish_timeout: Duration,
}

impl MqttLink {
    /// Build a broker session from configuration.
    pub fn connect(mqtt: &MqttConfig, farm: &FarmConfig) -> Self {
        let mut options = MqttOptions::new(mqtt.client_id.clone(), mqtt.host.clone(), mqtt.port);
        options.set_keep_alive(mqtt.keep_alive);
        let (client, eventloop) = AsyncClient::new(options, 64);
        info!(host = %mqtt.host, port = mqtt.port, client_id = %mqtt.client_id, "mqtt link configured");
        Self {
            client,
            eventloop,
            farm: farm.clone(),
            publish_timeout: mqtt.publish_timeout,
        }
    }

    /// Outbound command publisher sharing this session.
    pub fn publisher(&self) -> Arc<DeviceChannel> {
        Arc::new(DeviceChannel {
            client: self.client.clone(),
            publish_timeout: self.publish_timeout,
        })
    }

    /// Spawn the subscription event loop, delivering every inbound publish
    /// to `sink`. Subscriptions are (re)established on every broker
    /// acknowledgement, which covers reconnects.
    pub fn spawn(self, sink: Arc<dyn TelemetrySink>) -> DeviceChannelHandle {
        let MqttLink {
            client,
            mut eventloop,
            farm,
            ..
        } = self;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let loop_client = client.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("device channel loop stopping");
                        break;
                    }
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("broker connected; subscribing to telemetry topics");
                            for filter in farm.subscription_filters() {
                                if let Err(err) =
                                    loop_client.subscribe(filter.clone(), QoS::AtMostOnce).await
                                {
                                    warn!(filter = %filter, error = %err, "subscription failed");
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            sink.on_message(&publish.topic, &publish.payload);
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "mqtt event loop error; backing off");
                            tokio::time::sleep(RECONNECT_BACKOFF).await;
                        }
                    }
                }
            }
        });

        DeviceChannelHandle {
            client,
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Outbound half of the device channel.
pub struct DeviceChannel {
    client: AsyncClient,
    publish_timeout: Duration,
}

#[async_trait]
impl CommandPublisher for DeviceChannel {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let send = self
            .client
            .publish(topic, QoS::AtMostOnce, false, payload.to_vec());
        match timeout(self.publish_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(PublishError::Unavailable(err.to_string())),
            Err(_) => Err(PublishError::Timeout(self.publish_timeout)),
        }
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

/// Handle over the running subscription loop.
pub struct DeviceChannelHandle {
    client: AsyncClient,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DeviceChannelHandle {
    /// Disconnect from the broker and stop the event loop.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.client.disconnect().await;
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(err) => Err(anyhow::anyhow!(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_times_out_without_a_broker_pump() {
        // With nobody polling the event loop the request queue fills and the
        // publish future never resolves; the timeout must bound it.
        let mqtt = MqttConfig {
            publish_timeout: Duration::from_millis(50),
            ..MqttConfig::default()
        };
        let link = MqttLink::connect(&mqtt, &FarmConfig::default());
        let publisher = link.publisher();
        let mut result = Ok(());
        for _ in 0..70 {
            result = publisher.publish("irricore/d1/command", b"{}").await;
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(PublishError::Timeout(_))));
    }
}

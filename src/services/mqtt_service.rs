/// MQTT mirror of device writes
///
/// Every value that went through the device store is published as JSON to
/// `{prefix}/{device}/{unit}`. A retained birth message is published to
/// `{prefix}/status` on connect.

use std::time::Duration;

use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::shared_state::MirroredWrite;

pub fn write_topic(prefix: &str, write: &MirroredWrite) -> String {
    format!("{}/{}/{}", prefix.trim_end_matches('/'), write.device, write.unit)
}

pub fn write_payload(write: &MirroredWrite) -> serde_json::Value {
    json!({
        "n_value": write.n_value,
        "s_value": write.s_value,
        "timestamp": write.timestamp.to_rfc3339(),
    })
}

/// Queues one write on the client without waiting. When the request queue
/// is full (broker unreachable) the write is dropped so the event loop keeps
/// being polled. Returns false on a drop.
pub fn forward(client: &AsyncClient, prefix: &str, write: &MirroredWrite) -> bool {
    let topic = write_topic(prefix, write);
    match client.try_publish(&topic, QoS::AtLeastOnce, false, write_payload(write).to_string()) {
        Ok(()) => true,
        Err(e) => {
            warn!("[MQTT] dropping write for {}: {}", topic, e);
            false
        }
    }
}

pub async fn run_publisher(cfg: MqttConfig, mut writes: UnboundedReceiver<MirroredWrite>) {
    if !cfg.is_active() {
        info!("[MQTT] disabled or no broker configured, skipping MQTT mirror");
        return;
    }

    let client_id = if cfg.client_id.is_empty() {
        format!("ned-solar-{}", uuid::Uuid::new_v4())
    } else {
        cfg.client_id.clone()
    };
    let prefix = cfg.topic_prefix.trim_end_matches('/').to_string();

    info!(
        "[MQTT] connecting to {}:{} (client_id={})",
        cfg.broker_host, cfg.broker_port, client_id
    );

    let mut opts = MqttOptions::new(&client_id, &cfg.broker_host, cfg.broker_port);
    opts.set_keep_alive(Duration::from_secs(30));
    opts.set_clean_session(true);
    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
        opts.set_credentials(user, pass);
    }

    let (client, mut eventloop) = AsyncClient::new(opts, 64);

    let birth = json!({
        "status": "ONLINE",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let Err(e) = client
        .publish(format!("{}/status", prefix), QoS::AtLeastOnce, true, birth.to_string())
        .await
    {
        error!("[MQTT] failed to queue birth message: {}", e);
    }

    loop {
        tokio::select! {
            event = eventloop.poll() => {
                if let Err(e) = event {
                    warn!("[MQTT] event loop error: {} - will reconnect", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
            write = writes.recv() => {
                let Some(write) = write else {
                    debug!("[MQTT] write channel closed, stopping publisher");
                    return;
                };
                forward(&client, &prefix, &write);
            }
        }
    }
}

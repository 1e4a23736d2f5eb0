//! Batched HTTP access-log exporter, grounded on the teacher's
//! `VictoriaLogsExporter` (`ando-observability/src/logger.rs`): a true
//! no-op when disabled (no channel, no background task), otherwise a
//! bounded `mpsc` channel drained by a flush loop that batches by size or
//! interval.

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

pub struct AccessLogConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub batch_size: usize,
    pub flush_interval_secs: u64,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            batch_size: 200,
            flush_interval_secs: 2,
        }
    }
}

pub struct AccessLogExporter {
    sender: Option<mpsc::Sender<serde_json::Value>>,
}

impl AccessLogExporter {
    pub fn new(config: AccessLogConfig) -> Self {
        let Some(endpoint) = config.endpoint.clone().filter(|_| config.enabled) else {
            return Self { sender: None };
        };
        let (tx, rx) = mpsc::channel(10_000);
        tokio::spawn(Self::flush_loop(endpoint, config.batch_size, config.flush_interval_secs, rx));
        Self { sender: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    #[inline]
    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        request_id: &str,
        interface: &str,
        method: &str,
        path: &str,
        status: u16,
        latency_ms: f64,
        client_ip: &str,
        consumer_id: Option<i64>,
    ) {
        let Some(sender) = &self.sender else { return };
        let entry = json!({
            "_msg": format!("{method} {path} {status} {client_ip} {latency_ms:.2}ms"),
            "request_id": request_id,
            "interface": interface,
            "method": method,
            "path": path,
            "status": status,
            "latency_ms": latency_ms,
            "client_ip": client_ip,
            "consumer_id": consumer_id,
        });
        let _ = sender.try_send(entry);
    }

    async fn flush_loop(endpoint: String, batch_size: usize, flush_interval_secs: u64, mut rx: mpsc::Receiver<serde_json::Value>) {
        let client = reqwest::Client::new();
        let mut batch: Vec<serde_json::Value> = Vec::with_capacity(batch_size);
        let mut ticker = interval(Duration::from_secs(flush_interval_secs));

        loop {
            tokio::select! {
                Some(entry) = rx.recv() => {
                    batch.push(entry);
                    if batch.len() >= batch_size {
                        Self::flush(&client, &endpoint, &mut batch).await;
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        Self::flush(&client, &endpoint, &mut batch).await;
                    }
                }
                else => break,
            }
        }
    }

    async fn flush(client: &reqwest::Client, endpoint: &str, batch: &mut Vec<serde_json::Value>) {
        if batch.is_empty() {
            return;
        }
        if let Err(e) = client.post(endpoint).json(&batch).send().await {
            tracing::error!(error = %e, "access log flush failed");
        }
        batch.clear();
    }
}

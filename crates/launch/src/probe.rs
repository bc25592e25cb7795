//! Make sure the Kafka input topic exists before a topology starts reading it.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use metrics::counter;
use serde::Serialize;
use squall_core::ValidationError;
use tracing::{debug, info, warn};

pub const DEFAULT_KAFKA_PORT: u16 = 9092;

/// `host:port` of the broker the probe talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerAddr {
    pub host: String,
    pub port: u16,
}

impl BrokerAddr {
    /// First entry of a comma-separated broker list, with the default port
    /// applied when the entry has none.
    pub fn first_of(hosts: &str) -> Result<Self, ValidationError> {
        let entry = hosts.split(',').map(str::trim).find(|h| !h.is_empty()).ok_or(ValidationError::MissingKafkaHosts)?;
        match entry.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| ValidationError::InvalidValue {
                    key: "kafka_hosts".into(),
                    value: hosts.to_string(),
                    reason: format!("bad port in '{}': {}", entry, e),
                })?;
                Ok(Self { host: host.to_string(), port })
            }
            None => Ok(Self { host: entry.to_string(), port: DEFAULT_KAFKA_PORT }),
        }
    }
}

impl std::fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Checks (and where possible creates) an input topic.
#[async_trait::async_trait]
pub trait TopicProbe: Send + Sync {
    async fn ensure_topic(&self, broker: &BrokerAddr, topic: &str, timeout: Duration) -> Result<()>;
}

/// Reachability-only probe: opens a TCP connection to the broker. Used when
/// the crate is built with `--no-default-features`; it cannot create topics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait::async_trait]
impl TopicProbe for TcpProbe {
    async fn ensure_topic(&self, broker: &BrokerAddr, topic: &str, timeout: Duration) -> Result<()> {
        let addr = broker.to_string();
        tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| anyhow!("timed out after {:?} connecting to {}", timeout, addr))?
            .with_context(|| format!("connecting to broker {}", addr))?;
        debug!(broker = %addr, topic = %topic, "broker reachable (topic creation not attempted)");
        Ok(())
    }
}

/// Publishes a zero-length record so the broker auto-creates the topic.
#[cfg(feature = "kafka")]
#[derive(Debug, Default, Clone, Copy)]
pub struct KafkaProbe;

#[cfg(feature = "kafka")]
#[async_trait::async_trait]
impl TopicProbe for KafkaProbe {
    async fn ensure_topic(&self, broker: &BrokerAddr, topic: &str, timeout: Duration) -> Result<()> {
        use rdkafka::config::ClientConfig;
        use rdkafka::producer::{FutureProducer, FutureRecord};
        use rdkafka::util::Timeout;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker.to_string())
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .create()
            .context("creating kafka producer")?;
        let record = FutureRecord::<(), [u8]>::to(topic).payload(&[]);
        producer
            .send(record, Timeout::After(timeout))
            .await
            .map_err(|(e, _)| anyhow!("publishing to {}: {}", topic, e))?;
        Ok(())
    }
}

/// The probe compiled into this build.
pub fn default_probe() -> Box<dyn TopicProbe> {
    #[cfg(feature = "kafka")]
    {
        Box::new(KafkaProbe)
    }
    #[cfg(not(feature = "kafka"))]
    {
        warn!("built without the kafka feature: input topics are checked for broker reachability only and are not created");
        Box::new(TcpProbe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, timeout: Duration::from_secs(10), initial_backoff: Duration::from_secs(1) }
    }
}

/// Run `probe` up to `policy.attempts` times, doubling the pause between
/// attempts. The last error is returned.
pub async fn probe_with_retry(probe: &dyn TopicProbe, broker: &BrokerAddr, topic: &str, policy: RetryPolicy) -> Result<()> {
    let attempts = policy.attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;
    loop {
        counter!("probe_attempts", 1u64);
        match probe.ensure_topic(broker, topic, policy.timeout).await {
            Ok(()) => {
                info!(broker = %broker, topic = %topic, attempt, "input topic ready");
                return Ok(());
            }
            Err(e) if attempt < attempts => {
                warn!(broker = %broker, topic = %topic, attempt, error = %e, "input probe failed; retrying in {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => {
                counter!("probe_err", 1u64);
                return Err(e.context(format!("gave up after {} attempt(s)", attempts)));
            }
        }
    }
}

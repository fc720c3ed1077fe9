// marketplace_payments/src/store/redis_store.rs
// Redis-backed payment records. Each mutation is a single Lua script, so
// Redis serializes concurrent writers on the same reference.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{new_local_reference, PaymentStore, StoreError};
use crate::models::{LogEntry, PaymentRecord, PaymentStatus, StatusUpdate};

// KEYS: index, record, log
// ARGV: reference, gateway_reference, email, amount, status, timestamp, entry
const CREATE_OR_GET_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
  return existing
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[2],
  'reference', ARGV[1],
  'gateway_reference', ARGV[2],
  'email', ARGV[3],
  'amount_minor_units', ARGV[4],
  'status', ARGV[5],
  'created_at', ARGV[6],
  'updated_at', ARGV[6])
redis.call('RPUSH', KEYS[3], ARGV[7])
return ARGV[1]
"#;

// KEYS: record, log
// ARGV: new status, entry, timestamp, allowed predecessors...
const APPEND_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
  return {'missing', ''}
end
if current == ARGV[1] then
  return {'unchanged', current}
end
for i = 4, #ARGV do
  if ARGV[i] == current then
    redis.call('HSET', KEYS[1], 'status', ARGV[1], 'updated_at', ARGV[3])
    redis.call('RPUSH', KEYS[2], ARGV[2])
    return {'applied', current}
  end
end
return {'rejected', current}
"#;

fn index_key(gateway_reference: &str) -> String {
    format!("payment:gateway:{}", gateway_reference)
}

fn record_key(reference: &str) -> String {
    format!("payment:{}", reference)
}

fn log_key(reference: &str) -> String {
    format!("payment:{}:log", reference)
}

#[derive(Clone)]
pub struct RedisPaymentStore {
    client: redis::Client,
    connection: std::sync::Arc<OnceCell<MultiplexedConnection>>,
    timeout: Duration,
}

impl RedisPaymentStore {
    pub fn new(redis_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            connection: std::sync::Arc::new(OnceCell::new()),
            timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let connection = self.client.get_multiplexed_async_connection().await?;
                tracing::info!("connected to redis payment store");
                Ok::<_, StoreError>(connection)
            })
            .await?;
        Ok(connection.clone())
    }

    /// Bounds a store round trip so a hung Redis cannot stall a request.
    async fn bounded<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn load(
        con: &mut MultiplexedConnection,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let (fields, log): (HashMap<String, String>, Vec<String>) = redis::pipe()
            .atomic()
            .hgetall(record_key(reference))
            .lrange(log_key(reference), 0, -1)
            .query_async(con)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        decode_record(reference, &fields, &log).map(Some)
    }
}

fn decode_record(
    reference: &str,
    fields: &HashMap<String, String>,
    log: &[String],
) -> Result<PaymentRecord, StoreError> {
    let corrupt = |message: String| StoreError::Corrupt {
        reference: reference.to_string(),
        message,
    };
    let field = |name: &str| {
        fields
            .get(name)
            .cloned()
            .ok_or_else(|| corrupt(format!("missing field {}", name)))
    };
    let timestamp = |name: &str| -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(&field(name)?)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("{}: {}", name, e)))
    };

    let transaction_log = log
        .iter()
        .map(|entry| serde_json::from_str::<LogEntry>(entry))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| corrupt(format!("log entry: {}", e)))?;

    Ok(PaymentRecord {
        reference: field("reference")?,
        gateway_reference: field("gateway_reference")?,
        email: field("email")?,
        amount_minor_units: field("amount_minor_units")?
            .parse::<i64>()
            .map_err(|e| corrupt(format!("amount_minor_units: {}", e)))?,
        status: field("status")?
            .parse::<PaymentStatus>()
            .map_err(corrupt)?,
        transaction_log,
        created_at: timestamp("created_at")?,
        updated_at: timestamp("updated_at")?,
    })
}

fn encode_entry(entry: &LogEntry) -> Result<String, StoreError> {
    serde_json::to_string(entry).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl PaymentStore for RedisPaymentStore {
    async fn create_or_get(
        &self,
        gateway_reference: &str,
        email: &str,
        amount_minor_units: i64,
    ) -> Result<PaymentRecord, StoreError> {
        self.bounded(async {
            let mut con = self.connection().await?;
            let candidate = new_local_reference();
            let entry = LogEntry::now(PaymentStatus::Pending, "payment record created");

            let script = redis::Script::new(CREATE_OR_GET_SCRIPT);
            let mut invocation = script.prepare_invoke();
            invocation
                .key(index_key(gateway_reference))
                .key(record_key(&candidate))
                .key(log_key(&candidate))
                .arg(&candidate)
                .arg(gateway_reference)
                .arg(email)
                .arg(amount_minor_units)
                .arg(PaymentStatus::Pending.as_str())
                .arg(entry.timestamp.to_rfc3339())
                .arg(encode_entry(&entry)?);
            let reference: String = invocation.invoke_async(&mut con).await?;

            Self::load(&mut con, &reference)
                .await?
                .ok_or(StoreError::NotFound(reference))
        })
        .await
    }

    async fn append_log_and_set_status(
        &self,
        reference: &str,
        new_status: PaymentStatus,
        detail: &str,
    ) -> Result<StatusUpdate, StoreError> {
        self.bounded(async {
            let mut con = self.connection().await?;
            let entry = LogEntry::now(new_status, detail);

            let script = redis::Script::new(APPEND_SCRIPT);
            let mut invocation = script.prepare_invoke();
            invocation
                .key(record_key(reference))
                .key(log_key(reference))
                .arg(new_status.as_str())
                .arg(encode_entry(&entry)?)
                .arg(entry.timestamp.to_rfc3339());
            for allowed in PaymentStatus::predecessors_of(new_status) {
                invocation.arg(allowed.as_str());
            }
            let (outcome, current): (String, String) = invocation.invoke_async(&mut con).await?;

            let current_status = || {
                current.parse::<PaymentStatus>().map_err(|message| StoreError::Corrupt {
                    reference: reference.to_string(),
                    message,
                })
            };
            match outcome.as_str() {
                "applied" => Ok(StatusUpdate::Applied { previous: current_status()? }),
                "unchanged" => Ok(StatusUpdate::Unchanged),
                "rejected" => Ok(StatusUpdate::Rejected { current: current_status()? }),
                _ => Err(StoreError::NotFound(reference.to_string())),
            }
        })
        .await
    }

    async fn get_by_gateway_reference(
        &self,
        gateway_reference: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        self.bounded(async {
            let mut con = self.connection().await?;
            let reference: Option<String> = redis::cmd("GET")
                .arg(index_key(gateway_reference))
                .query_async(&mut con)
                .await?;
            match reference {
                Some(reference) => Self::load(&mut con, &reference).await,
                None => Ok(None),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> HashMap<String, String> {
        let ts = "2026-01-05T10:00:00+00:00".to_string();
        HashMap::from([
            ("reference".to_string(), "mk_abc".to_string()),
            ("gateway_reference".to_string(), "gw_abc".to_string()),
            ("email".to_string(), "buyer@example.com".to_string()),
            ("amount_minor_units".to_string(), "50800".to_string()),
            ("status".to_string(), "initialized".to_string()),
            ("created_at".to_string(), ts.clone()),
            ("updated_at".to_string(), ts),
        ])
    }

    #[test]
    fn test_decode_record() {
        let entry = LogEntry::now(PaymentStatus::Pending, "payment record created");
        let log = vec![encode_entry(&entry).unwrap()];
        let record = decode_record("mk_abc", &sample_fields(), &log).unwrap();

        assert_eq!(record.status, PaymentStatus::Initialized);
        assert_eq!(record.amount_minor_units, 50_800);
        assert_eq!(record.transaction_log, vec![entry]);
    }

    #[test]
    fn test_decode_record_rejects_unknown_status() {
        let mut fields = sample_fields();
        fields.insert("status".to_string(), "reversed".to_string());
        let result = decode_record("mk_abc", &fields, &[]);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(index_key("gw_1"), "payment:gateway:gw_1");
        assert_eq!(record_key("mk_1"), "payment:mk_1");
        assert_eq!(log_key("mk_1"), "payment:mk_1:log");
    }
}

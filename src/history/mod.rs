pub mod store;

pub use store::{FileStore, KeyInfo, KvStore, MemoryStore};

use rand::Rng;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{HistoryEntry, IpVersion, NormalizedIpRecord};

pub const HISTORY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const MAX_HISTORY_ENTRIES: usize = 100;
pub const COMBINED_PREFIX: &str = "combined_";
const KEY_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Dual-stack lookup history on top of a key/value store.
///
/// Writes are uniquely keyed puts. `clear` lists then deletes key by key, so
/// a concurrent writer can survive a clear.
pub struct HistoryService {
    store: Arc<dyn KvStore>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Persist an entry under a fresh key and return that key.
    pub async fn save(&self, entry: &HistoryEntry) -> Result<String> {
        let key = history_key(chrono::Utc::now().timestamp_millis());
        let value = serde_json::to_string(entry).map_err(Error::store)?;

        self.store.put(&key, value, HISTORY_TTL).await.inspect_err(|e| {
            log::error!("[history] save_failed: key={} error={}", key, e);
        })?;

        log::info!("[history] saved: key={} ipv4={} ipv6={}", key, entry.ipv4.is_some(), entry.ipv6.is_some());
        Ok(key)
    }

    /// Accepts an arbitrary JSON payload shaped like a history entry.
    ///
    /// A present `ipv4`, `ipv6` or legacy `data` record that cannot be parsed
    /// is a validation error; nothing is written.
    pub async fn save_value(&self, payload: Value) -> Result<String> {
        let entry = parse_entry(payload).inspect_err(|e| {
            log::warn!("[history] rejected_payload: error={}", e);
        })?;
        self.save(&entry).await
    }

    /// Combined entries, newest first, at most [`MAX_HISTORY_ENTRIES`].
    pub async fn read(&self) -> Result<Vec<HistoryEntry>> {
        let keys = self.store.list().await.inspect_err(|e| {
            log::error!("[history] list_failed: error={}", e);
        })?;

        let mut history = Vec::new();
        for key in keys.iter().filter(|k| k.name.starts_with(COMBINED_PREFIX)) {
            let Some(raw) = self.store.get(&key.name).await? else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => match normalize_entry(value) {
                    Some(entry) => history.push(entry),
                    None => log::warn!("[history] skipped_non_object: key={}", key.name),
                },
                Err(e) => log::warn!("[history] skipped_malformed: key={} error={}", key.name, e),
            }
        }

        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history.truncate(MAX_HISTORY_ENTRIES);
        log::debug!("[history] read: keys={} returned={}", keys.len(), history.len());
        Ok(history)
    }

    /// Delete every listed key. Returns how many were deleted.
    pub async fn clear(&self) -> Result<usize> {
        let keys = self.store.list().await?;
        for key in &keys {
            self.store.delete(&key.name).await.inspect_err(|e| {
                log::error!("[history] delete_failed: key={} error={}", key.name, e);
            })?;
        }
        log::info!("[history] cleared: count={}", keys.len());
        Ok(keys.len())
    }
}

/// `combined_<millis>_<9 base-36 chars>`
pub fn history_key(timestamp_millis: i64) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..KEY_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}_{}", COMBINED_PREFIX, timestamp_millis, suffix)
}

/// What to do with a record slot whose object does not deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordPolicy {
    Reject,
    Salvage,
}

/// Strict form of [`normalize_entry`] used for incoming payloads.
pub fn parse_entry(value: Value) -> Result<HistoryEntry> {
    entry_from_value(value, RecordPolicy::Reject)
}

/// Bring a stored value into the [`HistoryEntry`] shape.
///
/// Entries carrying neither an `ipv4` nor an `ipv6` record are legacy
/// single-address entries: their `data` payload lands in the slot matching
/// its own `ipVersion`. Record keys that fail to parse are dropped and the
/// rest of the record is kept.
pub fn normalize_entry(value: Value) -> Option<HistoryEntry> {
    entry_from_value(value, RecordPolicy::Salvage).ok()
}

fn entry_from_value(value: Value, policy: RecordPolicy) -> Result<HistoryEntry> {
    let Value::Object(mut map) = value else {
        return Err(Error::validation("history payload must be a JSON object"));
    };

    let timestamp = map
        .get("timestamp")
        .and_then(Value::as_f64)
        .map(|t| t as i64)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    let ipv4 = record_field("ipv4", map.remove("ipv4"), policy)?;
    let ipv6 = record_field("ipv6", map.remove("ipv6"), policy)?;
    if ipv4.is_some() || ipv6.is_some() {
        return Ok(HistoryEntry { timestamp, ipv4, ipv6 });
    }

    let data = map.remove("data");
    let version = data
        .as_ref()
        .and_then(|d| d.get("ipVersion"))
        .and_then(Value::as_str)
        .and_then(|v| v.parse::<IpVersion>().ok());
    let (ipv4, ipv6) = match (version, record_field("data", data, policy)?) {
        (Some(IpVersion::V4), Some(record)) => (Some(record), None),
        (Some(IpVersion::V6), Some(record)) => (None, Some(record)),
        _ => (None, None),
    };
    Ok(HistoryEntry { timestamp, ipv4, ipv6 })
}

fn record_field(slot: &str, value: Option<Value>, policy: RecordPolicy) -> Result<Option<NormalizedIpRecord>> {
    let map = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(map)) if map.is_empty() => return Ok(None),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return match policy {
                RecordPolicy::Reject => Err(Error::validation(format!("{} must be an object or null", slot))),
                RecordPolicy::Salvage => {
                    log::warn!("[history] dropped_record: slot={} found={}", slot, other);
                    Ok(None)
                }
            };
        }
    };

    match serde_json::from_value::<NormalizedIpRecord>(Value::Object(map.clone())) {
        Ok(record) => Ok(Some(record)),
        Err(e) => match policy {
            RecordPolicy::Reject => Err(Error::validation(format!("{} record is malformed: {}", slot, e))),
            RecordPolicy::Salvage => Ok(Some(salvage_record(slot, map))),
        },
    }
}

/// Keep every key that parses on its own; the dropped ones fall back to defaults.
fn salvage_record(slot: &str, map: Map<String, Value>) -> NormalizedIpRecord {
    let mut kept = Map::new();
    let mut dropped = Vec::new();
    for (key, value) in map {
        let single = Value::Object(Map::from_iter([(key.clone(), value.clone())]));
        if serde_json::from_value::<NormalizedIpRecord>(single).is_ok() {
            kept.insert(key, value);
        } else {
            dropped.push(key);
        }
    }

    log::warn!("[history] salvaged_record: slot={} dropped={}", slot, dropped.join(","));
    serde_json::from_value(Value::Object(kept)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::types::UNKNOWN;
    use serde_json::json;

    fn record(ip: &str) -> NormalizedIpRecord {
        NormalizedIpRecord {
            ip: ip.to_string(),
            ip_version: IpVersion::infer(ip),
            ..Default::default()
        }
    }

    fn service() -> (Arc<MemoryStore>, HistoryService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), HistoryService::new(store))
    }

    #[test]
    fn test_history_key_shape() {
        let key = history_key(1700000000000);
        assert!(key.starts_with("combined_1700000000000_"));
        let suffix = key.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(history_key(1), history_key(1));
    }

    #[tokio::test]
    async fn test_save_and_read_back() {
        let (_, history) = service();
        let entry = HistoryEntry { timestamp: 10, ipv4: Some(record("1.2.3.4")), ipv6: None };
        let key = history.save(&entry).await.unwrap();
        assert!(key.starts_with(COMBINED_PREFIX));

        let read = history.read().await.unwrap();
        assert_eq!(read, vec![entry]);
    }

    #[tokio::test]
    async fn test_read_caps_at_100_newest_first() {
        let (_, history) = service();
        for ts in 0..101 {
            let entry = HistoryEntry { timestamp: ts, ipv4: Some(record("10.0.0.1")), ipv6: None };
            history.save(&entry).await.unwrap();
        }

        let read = history.read().await.unwrap();
        assert_eq!(read.len(), 100);
        assert_eq!(read.first().unwrap().timestamp, 100);
        assert_eq!(read.last().unwrap().timestamp, 1);
        assert!(read.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_read_converts_legacy_entries() {
        let (store, history) = service();
        let legacy = json!({
            "timestamp": 77,
            "data": {"ip": "2001:db8::1", "ipVersion": "IPv6", "country": "Japan"}
        });
        store.put("combined_77_legacy0001", legacy.to_string(), HISTORY_TTL).await.unwrap();

        let read = history.read().await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].timestamp, 77);
        assert!(read[0].ipv4.is_none());
        let v6 = read[0].ipv6.as_ref().unwrap();
        assert_eq!(v6.ip, "2001:db8::1");
        assert_eq!(v6.country, "Japan");
    }

    #[test]
    fn test_normalize_legacy_variants() {
        let entry = normalize_entry(json!({"timestamp": 5, "data": {"ip": "8.8.8.8", "ipVersion": "IPv4"}})).unwrap();
        assert_eq!(entry.ipv4.unwrap().ip, "8.8.8.8");
        assert!(entry.ipv6.is_none());

        let entry = normalize_entry(json!({"timestamp": 6, "data": {"ip": "8.8.8.8"}})).unwrap();
        assert!(entry.ipv4.is_none() && entry.ipv6.is_none());

        let before = chrono::Utc::now().timestamp_millis();
        let entry = normalize_entry(json!({"data": null})).unwrap();
        assert!(entry.timestamp >= before);

        assert!(normalize_entry(json!("text")).is_none());
    }

    #[tokio::test]
    async fn test_read_keeps_legacy_numeric_asn() {
        let (store, history) = service();
        let legacy = json!({
            "timestamp": 88,
            "data": {"ip": "2001:4860::8888", "ipVersion": "IPv6", "asn": 15169, "offset": -25200.0}
        });
        store.put("combined_88_legacy0002", legacy.to_string(), HISTORY_TTL).await.unwrap();

        let read = history.read().await.unwrap();
        let v6 = read[0].ipv6.as_ref().unwrap();
        assert_eq!(v6.asn, "15169");
        assert_eq!(v6.offset, -25200);
    }

    #[tokio::test]
    async fn test_read_salvages_malformed_record() {
        let (store, history) = service();
        let stored = json!({
            "timestamp": 12,
            "ipv4": {"ip": "5.6.7.8", "country": "Germany", "asn": {"number": 3320}, "offset": "east"},
            "ipv6": null
        });
        store.put("combined_12_salvage01", stored.to_string(), HISTORY_TTL).await.unwrap();

        let read = history.read().await.unwrap();
        assert_eq!(read.len(), 1);
        let v4 = read[0].ipv4.as_ref().unwrap();
        assert_eq!(v4.ip, "5.6.7.8");
        assert_eq!(v4.country, "Germany");
        assert_eq!(v4.asn, UNKNOWN);
        assert_eq!(v4.offset, 0);
    }

    #[tokio::test]
    async fn test_read_skips_foreign_and_malformed_keys() {
        let (store, history) = service();
        store.put("single_1", json!({"timestamp": 1}).to_string(), HISTORY_TTL).await.unwrap();
        store.put("combined_2_broken", "{not json".to_string(), HISTORY_TTL).await.unwrap();
        store.put("combined_3_scalar", "42".to_string(), HISTORY_TTL).await.unwrap();
        store
            .put("combined_4_ok", json!({"timestamp": 4, "ipv4": null, "ipv6": null}).to_string(), HISTORY_TTL)
            .await
            .unwrap();

        let read = history.read().await.unwrap();
        assert_eq!(read, vec![HistoryEntry { timestamp: 4, ipv4: None, ipv6: None }]);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (store, history) = service();
        history.save(&HistoryEntry::new(Some(record("1.1.1.1")), None)).await.unwrap();
        store.put("other", "x".to_string(), HISTORY_TTL).await.unwrap();

        assert_eq!(history.clear().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
        assert!(history.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_value_validates_shape() {
        let (_, history) = service();
        assert!(matches!(history.save_value(json!([1, 2])).await, Err(Error::Validation(_))));

        history
            .save_value(json!({"timestamp": 9, "ipv4": {"ip": "9.9.9.9", "ipVersion": "IPv4"}, "ipv6": null}))
            .await
            .unwrap();
        let read = history.read().await.unwrap();
        assert_eq!(read[0].ipv4.as_ref().unwrap().ip, "9.9.9.9");
    }

    #[tokio::test]
    async fn test_save_value_keeps_numeric_asn() {
        let (_, history) = service();
        history
            .save_value(json!({"timestamp": 3, "ipv4": {"ip": "8.8.8.8", "asn": 15169, "offset": "-14400"}}))
            .await
            .unwrap();
        let read = history.read().await.unwrap();
        let v4 = read[0].ipv4.as_ref().unwrap();
        assert_eq!(v4.asn, "15169");
        assert_eq!(v4.offset, -14400);
    }

    #[tokio::test]
    async fn test_save_value_rejects_unparseable_record() {
        let (store, history) = service();
        let err = history
            .save_value(json!({"timestamp": 4, "ipv4": null, "ipv6": {"ip": "2001:db8::1", "ipVersion": "IPv9"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref msg) if msg.starts_with("ipv6 record is malformed")));

        let err = history.save_value(json!({"ipv4": "1.2.3.4"})).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.list().await.unwrap().is_empty());
    }

    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
            Err(Error::store("quota exceeded"))
        }
        async fn list(&self) -> Result<Vec<KeyInfo>> {
            Err(Error::store("namespace unavailable"))
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_errors_surface() {
        let history = HistoryService::new(Arc::new(BrokenStore));
        let err = history.save(&HistoryEntry::new(None, None)).await.unwrap_err();
        assert_eq!(err.to_string(), "history store unavailable: quota exceeded");
        assert!(matches!(history.read().await, Err(Error::StoreUnavailable(_))));
        assert!(matches!(history.clear().await, Err(Error::StoreUnavailable(_))));
    }
}

//! Response cache - successful outputs keyed by (tenant, tool, input fingerprint).
//!
//! Independent of the instance registry. Entries expire by TTL or are evicted
//! when their tool is mutated. Each tenant carries a generation counter bumped
//! by every eviction; an insert tagged with an older generation is dropped, so
//! a call that started before a mutation cannot repopulate the cache after it.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::tools::events::{MutationListener, ToolMutated};
use crate::types::{ResponseCacheConfig, TenantId};

/// Cache key. The fingerprint is the canonical JSON of the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant: TenantId,
    pub tool_id: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(tenant: &TenantId, tool_id: &str, input: &Value) -> Self {
        Self {
            tenant: tenant.clone(),
            tool_id: tool_id.to_string(),
            fingerprint: fingerprint(input),
        }
    }
}

/// A cached output.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub output: Value,
    pub status_code: Option<u16>,
}

#[derive(Debug)]
struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Canonical JSON: object keys sorted at every depth, no whitespace.
pub fn fingerprint(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

fn write_string(s: &str, out: &mut String) {
    // Display of a JSON string value yields its escaped, quoted form.
    let _ = write!(out, "{}", Value::String(s.to_string()));
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    generations: HashMap<TenantId, u64>,
}

/// Bounded TTL cache of successful execution outputs.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &ResponseCacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: config.max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Live entry for the key, if any. Expired entries are dropped on read.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let mut inner = self.inner.lock().await;
        let entries = &mut inner.entries;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Current eviction generation for the tenant.
    pub async fn generation(&self, tenant: &TenantId) -> u64 {
        self.inner
            .lock()
            .await
            .generations
            .get(tenant)
            .copied()
            .unwrap_or(0)
    }

    /// Store an output for `ttl`. A zero TTL stores nothing.
    pub async fn insert(&self, key: CacheKey, response: CachedResponse, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        self.insert_locked(&mut inner, key, response, ttl);
    }

    /// Store an output only if no eviction for the tenant happened since
    /// `generation` was read. Returns whether the entry was stored.
    pub async fn insert_if_current(
        &self,
        key: CacheKey,
        response: CachedResponse,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        let current = inner.generations.get(&key.tenant).copied().unwrap_or(0);
        if current != generation {
            tracing::debug!(
                "response_cache_insert_stale: tenant={} tool={}",
                key.tenant,
                key.tool_id
            );
            return false;
        }
        self.insert_locked(&mut inner, key, response, ttl)
    }

    fn insert_locked(&self, inner: &mut Inner, key: CacheKey, response: CachedResponse, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(ttl) else {
            tracing::warn!(
                "response_cache_ttl_overflow: tenant={} tool={} ttl_secs={}",
                key.tenant,
                key.tool_id,
                ttl.as_secs()
            );
            return false;
        };
        let entries = &mut inner.entries;

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= self.max_entries {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(k) = soonest {
                    entries.remove(&k);
                }
            }
        }

        entries.insert(
            key,
            Entry {
                response,
                expires_at,
            },
        );
        true
    }

    /// Evict the tenant's entries, or only one tool's when `tool_id` is given.
    /// Returns the number of entries removed.
    pub async fn invalidate(&self, tenant: &TenantId, tool_id: Option<&str>) -> usize {
        let mut inner = self.inner.lock().await;
        *inner.generations.entry(tenant.clone()).or_default() += 1;
        let before = inner.entries.len();
        inner.entries.retain(|k, _| {
            &k.tenant != tenant || tool_id.map_or(false, |id| k.tool_id != id)
        });
        let removed = before - inner.entries.len();
        if removed > 0 {
            tracing::debug!(
                "response_cache_invalidated: tenant={} tool={} removed={}",
                tenant,
                tool_id.unwrap_or("*"),
                removed
            );
        }
        removed
    }

    /// Drop every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.expires_at > now);
        before - inner.entries.len()
    }

    /// Sweep expired entries every `every` until `cancel` fires.
    pub fn spawn_purger(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.purge_expired().await;
                        if removed > 0 {
                            tracing::debug!("response_cache_purged: removed={}", removed);
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::info!("response_cache_purger_stopped");
                        break;
                    }
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len().await,
        }
    }
}

#[async_trait]
impl MutationListener for ResponseCache {
    fn name(&self) -> &'static str {
        "response_cache"
    }

    async fn on_tool_mutated(&self, event: &ToolMutated) {
        self.invalidate(&event.tenant, Some(&event.tool_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::events::MutationKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn tenant(s: &str) -> TenantId {
        TenantId::from_string(s).unwrap()
    }

    fn cache(max: usize) -> ResponseCache {
        ResponseCache::new(&ResponseCacheConfig {
            max_entries: max,
            ..Default::default()
        })
    }

    fn response(v: Value) -> CachedResponse {
        CachedResponse {
            output: v,
            status_code: Some(200),
        }
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": "s"}});
        let b = json!({"a": {"x": "s", "y": [1, 2]}, "b": 1});
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a), r#"{"a":{"x":"s","y":[1,2]},"b":1}"#);
    }

    #[test]
    fn test_fingerprint_distinguishes_types() {
        assert_ne!(fingerprint(&json!({"a": 1})), fingerprint(&json!({"a": "1"})));
        assert_ne!(fingerprint(&json!([1, 2])), fingerprint(&json!([2, 1])));
        assert_eq!(fingerprint(&json!("a\"b")), r#""a\"b""#);
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let c = cache(10);
        let key = CacheKey::new(&tenant("t"), "w", &json!({"location": "Paris"}));
        assert!(c.get(&key).await.is_none());

        c.insert(key.clone(), response(json!({"temp": 21})), Duration::from_secs(60))
            .await;
        assert_eq!(c.get(&key).await.unwrap().output, json!({"temp": 21}));

        let stats = c.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let c = cache(10);
        let key = CacheKey::new(&tenant("t"), "w", &json!(null));
        c.insert(key.clone(), response(json!(1)), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(c.get(&key).await.is_none());
        assert!(c.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_ttl_not_stored() {
        let c = cache(10);
        let key = CacheKey::new(&tenant("t"), "w", &json!(null));
        c.insert(key, response(json!(1)), Duration::ZERO).await;
        assert_eq!(c.len().await, 0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_soonest_expiry() {
        let c = cache(2);
        let short = CacheKey::new(&tenant("t"), "a", &json!(1));
        let long = CacheKey::new(&tenant("t"), "b", &json!(1));
        let newest = CacheKey::new(&tenant("t"), "c", &json!(1));

        c.insert(short.clone(), response(json!(1)), Duration::from_secs(5)).await;
        c.insert(long.clone(), response(json!(2)), Duration::from_secs(500)).await;
        c.insert(newest.clone(), response(json!(3)), Duration::from_secs(50)).await;

        assert_eq!(c.len().await, 2);
        assert!(c.get(&short).await.is_none());
        assert!(c.get(&long).await.is_some());
        assert!(c.get(&newest).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_scopes() {
        let c = cache(10);
        let ttl = Duration::from_secs(60);
        for (t, tool) in [("org-1", "a"), ("org-1", "b"), ("org-2", "a")] {
            c.insert(CacheKey::new(&tenant(t), tool, &json!(1)), response(json!(1)), ttl)
                .await;
        }

        assert_eq!(c.invalidate(&tenant("org-1"), Some("a")).await, 1);
        assert_eq!(c.len().await, 2);
        assert_eq!(c.invalidate(&tenant("org-1"), None).await, 1);
        assert_eq!(c.len().await, 1);
        assert!(c
            .get(&CacheKey::new(&tenant("org-2"), "a", &json!(1)))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_insert_after_eviction_is_dropped() {
        let c = cache(10);
        let t = tenant("org");
        let generation = c.generation(&t).await;

        // A mutation lands while the call is in flight.
        c.invalidate(&t, Some("w")).await;

        let key = CacheKey::new(&t, "w", &json!({"q": 1}));
        let stored = c
            .insert_if_current(key.clone(), response(json!(1)), Duration::from_secs(60), generation)
            .await;
        assert!(!stored);
        assert!(c.get(&key).await.is_none());

        let fresh = c.generation(&t).await;
        assert!(c
            .insert_if_current(key.clone(), response(json!(2)), Duration::from_secs(60), fresh)
            .await);
        assert_eq!(c.get(&key).await.unwrap().output, json!(2));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_not_stored() {
        let c = cache(10);
        let t = tenant("org");
        let key = CacheKey::new(&t, "w", &json!(1));
        let generation = c.generation(&t).await;

        let stored = c
            .insert_if_current(key.clone(), response(json!(1)), Duration::MAX, generation)
            .await;
        assert!(!stored);
        assert_eq!(c.len().await, 0);
        assert!(c.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_purger_sweeps_expired_and_stops() {
        let c = Arc::new(cache(10));
        let t = tenant("org");
        c.insert(CacheKey::new(&t, "short", &json!(1)), response(json!(1)), Duration::from_millis(10))
            .await;
        c.insert(CacheKey::new(&t, "long", &json!(1)), response(json!(2)), Duration::from_secs(60))
            .await;

        let cancel = CancellationToken::new();
        let handle = c.clone().spawn_purger(Duration::from_millis(20), cancel.clone());
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Swept without a read touching the expired key.
        assert_eq!(c.len().await, 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("purger should stop on cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_mutation_evicts_tool_entries() {
        let c = cache(10);
        let key = CacheKey::new(&tenant("org"), "w", &json!({"q": 1}));
        c.insert(key.clone(), response(json!(1)), Duration::from_secs(60)).await;

        c.on_tool_mutated(&ToolMutated::new(tenant("org"), "w", MutationKind::Patched))
            .await;
        assert!(c.get(&key).await.is_none());
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_valid_equivalent_json(value in arb_json()) {
            let fp = fingerprint(&value);
            let reparsed: Value = serde_json::from_str(&fp).unwrap();
            prop_assert_eq!(reparsed, value);
        }

        #[test]
        fn prop_fingerprint_stable_under_reinsertion(value in arb_json()) {
            // Rebuilding objects in reverse key order must not change the key.
            fn reversed(v: &Value) -> Value {
                match v {
                    Value::Object(m) => {
                        let mut out = serde_json::Map::new();
                        for (k, val) in m.iter().rev() {
                            out.insert(k.clone(), reversed(val));
                        }
                        Value::Object(out)
                    }
                    Value::Array(a) => Value::Array(a.iter().map(reversed).collect()),
                    other => other.clone(),
                }
            }
            prop_assert_eq!(fingerprint(&value), fingerprint(&reversed(&value)));
        }
    }
}

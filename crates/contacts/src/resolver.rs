//! Contact resolution cache: validation, TTL, rate limit, single-flight.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    futures::{
        FutureExt,
        future::{BoxFuture, Shared},
    },
    serde::Serialize,
    switchboard_common::time::now_ms,
    switchboard_config::ContactsConfig,
    tokio::sync::Mutex,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{contacts as contacts_metrics, counter, histogram};

use crate::{
    CacheEntry, ContactCacheStore, ContactError, ContactLookup, ContactProfileSink, LookupOutcome,
    Result, policy::validate_phone,
};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Freshness and refetch windows. The rate limit is expected to be no longer
/// than either TTL; config validation enforces that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub exists_ttl: Duration,
    pub absent_ttl: Duration,
    pub rate_limit: Duration,
}

impl CachePolicy {
    #[must_use]
    pub fn ttl(&self, exists: bool) -> Duration {
        if exists {
            self.exists_ttl
        } else {
            self.absent_ttl
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from(&ContactsConfig::default())
    }
}

impl From<&ContactsConfig> for CachePolicy {
    fn from(config: &ContactsConfig) -> Self {
        Self {
            exists_ttl: Duration::from_secs(config.exists_ttl_secs),
            absent_ttl: Duration::from_secs(config.absent_ttl_secs),
            rate_limit: Duration::from_secs(config.rate_limit_secs),
        }
    }
}

/// What a caller of [`ContactResolver::resolve`] gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResolution {
    pub name: Option<String>,
    pub picture_url: Option<String>,
    pub exists: bool,
    /// Served without an upstream call.
    pub cached: bool,
    /// Stale, but a refetch was suppressed by the rate limit.
    pub rate_limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_hours: Option<f64>,
}

impl ContactResolution {
    /// Answer for a number that failed local validation.
    fn rejected() -> Self {
        Self {
            name: None,
            picture_url: None,
            exists: false,
            cached: true,
            rate_limited: false,
            cache_age_hours: None,
        }
    }

    fn from_entry(entry: CacheEntry, now: i64, rate_limited: bool) -> Self {
        let age_ms = (now - entry.last_updated).max(0);
        Self {
            name: entry.name,
            picture_url: entry.picture_url,
            exists: entry.exists,
            cached: true,
            rate_limited,
            cache_age_hours: Some(round2(age_ms as f64 / MS_PER_HOUR)),
        }
    }

    fn fresh(entry: CacheEntry) -> Self {
        Self {
            name: entry.name,
            picture_url: entry.picture_url,
            exists: entry.exists,
            cached: false,
            rate_limited: false,
            cache_age_hours: None,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

type FlightKey = (String, String);
type Flight = Shared<BoxFuture<'static, Result<ContactResolution>>>;

struct Inner {
    lookup: Arc<dyn ContactLookup>,
    cache: Arc<dyn ContactCacheStore>,
    profiles: Option<Arc<dyn ContactProfileSink>>,
    policy: CachePolicy,
    in_flight: Mutex<HashMap<FlightKey, Flight>>,
}

/// Resolves contacts through the cache, calling upstream at most once per
/// key at a time.
#[derive(Clone)]
pub struct ContactResolver {
    inner: Arc<Inner>,
}

impl ContactResolver {
    pub fn new(
        lookup: Arc<dyn ContactLookup>,
        cache: Arc<dyn ContactCacheStore>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lookup,
                cache,
                profiles: None,
                policy,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Write resolved names and pictures through to `sink`.
    #[must_use]
    pub fn with_profile_sink(self, sink: Arc<dyn ContactProfileSink>) -> Self {
        let inner = &self.inner;
        Self {
            inner: Arc::new(Inner {
                lookup: Arc::clone(&inner.lookup),
                cache: Arc::clone(&inner.cache),
                profiles: Some(sink),
                policy: inner.policy,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        self.inner.policy
    }

    /// Resolve a contact.
    ///
    /// Numbers failing validation return `exists=false` without touching the
    /// cache or the network. Upstream errors are returned as `Err` and never
    /// cached as absent.
    pub async fn resolve(
        &self,
        instance_name: &str,
        phone_number: &str,
    ) -> Result<ContactResolution> {
        let phone = match validate_phone(phone_number) {
            Ok(phone) => phone,
            Err(rejection) => {
                debug!(
                    instance = instance_name,
                    phone = phone_number,
                    reason = %rejection,
                    "contact number refused"
                );
                #[cfg(feature = "metrics")]
                counter!(contacts_metrics::INVALID_TOTAL, "reason" => rejection.as_str())
                    .increment(1);
                return Ok(ContactResolution::rejected());
            },
        };

        if let Some(hit) = self.inner.from_cache(instance_name, &phone).await {
            return Ok(hit);
        }

        let flight = {
            let mut in_flight = self.inner.in_flight.lock().await;
            let key = (instance_name.to_string(), phone);
            match in_flight.get(&key) {
                Some(flight) => {
                    debug!(instance = %key.0, phone = %key.1, "joining in-flight contact lookup");
                    #[cfg(feature = "metrics")]
                    counter!(contacts_metrics::COALESCED_TOTAL).increment(1);
                    flight.clone()
                },
                None => {
                    let flight = Arc::clone(&self.inner).start_flight(key.clone());
                    in_flight.insert(key, flight.clone());
                    flight
                },
            }
        };
        flight.await
    }

    /// Number of keys with a lookup currently in flight.
    pub async fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }
}

impl Inner {
    /// The lookup runs on its own task, so it finishes and leaves the
    /// in-flight map even when every waiter has gone away.
    fn start_flight(self: Arc<Self>, key: FlightKey) -> Flight {
        let task = tokio::spawn(async move {
            let result = self.refresh(&key.0, &key.1).await;
            self.in_flight.lock().await.remove(&key);
            result
        });
        async move {
            task.await.unwrap_or_else(|err| {
                Err(ContactError::transport(format!("lookup task failed: {err}")))
            })
        }
        .boxed()
        .shared()
    }

    /// Serve from cache when fresh or rate limited. Store errors count as a miss.
    async fn from_cache(&self, instance_name: &str, phone: &str) -> Option<ContactResolution> {
        let entry = match self.cache.get(instance_name, phone).await {
            Ok(entry) => entry?,
            Err(err) => {
                warn!(instance = instance_name, phone, error = %err, "contact cache read failed");
                return None;
            },
        };

        let now = now_ms();
        let age_ms = now - entry.last_updated;
        if age_ms <= duration_ms(self.policy.ttl(entry.exists)) {
            #[cfg(feature = "metrics")]
            counter!(contacts_metrics::CACHE_HITS_TOTAL).increment(1);
            return Some(ContactResolution::from_entry(entry, now, false));
        }
        if now - entry.last_activity() < duration_ms(self.policy.rate_limit) {
            debug!(instance = instance_name, phone, "stale contact served, refetch rate limited");
            #[cfg(feature = "metrics")]
            counter!(contacts_metrics::RATE_LIMITED_TOTAL).increment(1);
            return Some(ContactResolution::from_entry(entry, now, true));
        }
        None
    }

    async fn refresh(&self, instance_name: &str, phone: &str) -> Result<ContactResolution> {
        // A flight that finished just before this one started may have
        // refreshed the entry already.
        if let Some(hit) = self.from_cache(instance_name, phone).await {
            return Ok(hit);
        }

        #[cfg(feature = "metrics")]
        counter!(contacts_metrics::UPSTREAM_CALLS_TOTAL).increment(1);
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let outcome = self.lookup.fetch_contact(instance_name, phone).await;

        #[cfg(feature = "metrics")]
        histogram!(contacts_metrics::UPSTREAM_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let now = now_ms();
        let (name, picture_url, exists) = match outcome {
            Ok(LookupOutcome::Found { name, picture_url }) => (name, picture_url, true),
            Ok(LookupOutcome::Absent) => (None, None, false),
            Err(err) => {
                warn!(
                    instance = instance_name,
                    phone,
                    kind = err.kind(),
                    error = %err,
                    "contact lookup failed"
                );
                #[cfg(feature = "metrics")]
                counter!(contacts_metrics::UPSTREAM_ERRORS_TOTAL, "reason" => err.kind())
                    .increment(1);
                if let Err(store_err) = self.cache.touch_attempt(instance_name, phone, now).await {
                    warn!(instance = instance_name, phone, error = %store_err, "failed to record lookup attempt");
                }
                return Err(err);
            },
        };

        let entry = CacheEntry {
            instance_name: instance_name.to_string(),
            phone_number: phone.to_string(),
            name,
            picture_url,
            exists,
            last_updated: now,
            last_attempt_at: Some(now),
        };
        if let Err(err) = self.cache.put(&entry).await {
            warn!(instance = instance_name, phone, error = %err, "failed to cache contact");
        }
        self.write_through(&entry).await;
        Ok(ContactResolution::fresh(entry))
    }

    async fn write_through(&self, entry: &CacheEntry) {
        let Some(sink) = &self.profiles else {
            return;
        };
        if !entry.exists || (entry.name.is_none() && entry.picture_url.is_none()) {
            return;
        }
        if let Err(err) = sink
            .update_profile(
                &entry.instance_name,
                &entry.phone_number,
                entry.name.as_deref(),
                entry.picture_url.as_deref(),
            )
            .await
        {
            warn!(
                instance = %entry.instance_name,
                phone = %entry.phone_number,
                error = %err,
                "contact profile write-through failed"
            );
        }
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex as StdMutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {super::*, async_trait::async_trait};

    const HOUR_MS: i64 = 3_600_000;
    const INSTANCE: &str = "front-desk";
    const PHONE: &str = "5511987654321";

    #[derive(Default)]
    struct MemoryCache {
        entries: StdMutex<HashMap<FlightKey, CacheEntry>>,
        puts: AtomicUsize,
    }

    impl MemoryCache {
        fn with(entry: CacheEntry) -> Self {
            let cache = Self::default();
            cache.entries.lock().unwrap().insert(
                (entry.instance_name.clone(), entry.phone_number.clone()),
                entry,
            );
            cache
        }

        fn entry(&self) -> Option<CacheEntry> {
            self.entries
                .lock()
                .unwrap()
                .get(&(INSTANCE.to_string(), PHONE.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl ContactCacheStore for MemoryCache {
        async fn get(&self, instance_name: &str, phone_number: &str) -> Result<Option<CacheEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(&(instance_name.to_string(), phone_number.to_string()))
                .cloned())
        }

        async fn put(&self, entry: &CacheEntry) -> Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.entries.lock().unwrap().insert(
                (entry.instance_name.clone(), entry.phone_number.clone()),
                entry.clone(),
            );
            Ok(())
        }

        async fn touch_attempt(&self, instance_name: &str, phone_number: &str, at: i64) -> Result<()> {
            if let Some(entry) = self
                .entries
                .lock()
                .unwrap()
                .get_mut(&(instance_name.to_string(), phone_number.to_string()))
            {
                entry.last_attempt_at = Some(at);
            }
            Ok(())
        }
    }

    struct CountingLookup {
        calls: AtomicUsize,
        outcome: Result<LookupOutcome>,
        delay: Duration,
    }

    impl CountingLookup {
        fn new(outcome: Result<LookupOutcome>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome,
                delay: Duration::ZERO,
            }
        }

        fn slow(outcome: Result<LookupOutcome>, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(outcome)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContactLookup for CountingLookup {
        async fn fetch_contact(&self, _instance: &str, _phone: &str) -> Result<LookupOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        updates: StdMutex<Vec<(Option<String>, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl ContactProfileSink for RecordingSink {
        async fn update_profile(
            &self,
            _instance: &str,
            _phone: &str,
            name: Option<&str>,
            picture_url: Option<&str>,
        ) -> Result<()> {
            self.updates
                .lock()
                .unwrap()
                .push((name.map(str::to_owned), picture_url.map(str::to_owned)));
            if self.fail {
                return Err(ContactError::storage("disk full"));
            }
            Ok(())
        }
    }

    fn found(name: &str) -> Result<LookupOutcome> {
        Ok(LookupOutcome::Found {
            name: Some(name.into()),
            picture_url: Some("https://pps.example/p.jpg".into()),
        })
    }

    fn entry(exists: bool, updated_hours_ago: i64) -> CacheEntry {
        let updated = now_ms() - updated_hours_ago * HOUR_MS;
        CacheEntry {
            instance_name: INSTANCE.into(),
            phone_number: PHONE.into(),
            name: exists.then(|| "Maria".to_string()),
            picture_url: None,
            exists,
            last_updated: updated,
            last_attempt_at: Some(updated),
        }
    }

    fn resolver(lookup: &Arc<CountingLookup>, cache: &Arc<MemoryCache>) -> ContactResolver {
        ContactResolver::new(
            Arc::clone(lookup) as Arc<dyn ContactLookup>,
            Arc::clone(cache) as Arc<dyn ContactCacheStore>,
            CachePolicy::default(),
        )
    }

    #[tokio::test]
    async fn fifteen_digit_number_short_circuits() {
        let lookup = Arc::new(CountingLookup::new(found("Maria")));
        let cache = Arc::new(MemoryCache::default());
        let resolver = resolver(&lookup, &cache);

        let res = resolver.resolve(INSTANCE, "120363025246125").await.unwrap();
        assert!(!res.exists);
        assert!(res.cached);
        assert_eq!(lookup.calls(), 0);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 0);
        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_entry_is_served_from_cache() {
        let lookup = Arc::new(CountingLookup::new(found("Someone Else")));
        let cache = Arc::new(MemoryCache::with(entry(true, 1)));
        let resolver = resolver(&lookup, &cache);

        let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
        assert!(res.exists);
        assert!(res.cached);
        assert!(!res.rate_limited);
        assert_eq!(res.name.as_deref(), Some("Maria"));
        let age = res.cache_age_hours.unwrap();
        assert!((0.99..=1.01).contains(&age), "age {age}");
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn absent_three_hours_ago_is_cached_twice() {
        let lookup = Arc::new(CountingLookup::new(found("Maria")));
        let cache = Arc::new(MemoryCache::with(entry(false, 3)));
        let resolver = resolver(&lookup, &cache);

        for _ in 0..2 {
            let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
            assert!(!res.exists);
            assert!(res.cached);
            assert!(!res.rate_limited);
        }
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn absent_seven_hours_ago_is_refetched() {
        let lookup = Arc::new(CountingLookup::new(found("Maria")));
        let cache = Arc::new(MemoryCache::with(entry(false, 7)));
        let resolver = resolver(&lookup, &cache);

        let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
        assert!(res.exists);
        assert!(!res.cached);
        assert_eq!(lookup.calls(), 1);
        assert!(cache.entry().unwrap().exists);
    }

    #[tokio::test]
    async fn stale_entry_recently_attempted_is_rate_limited() {
        let lookup = Arc::new(CountingLookup::new(found("Maria")));
        let mut stale = entry(true, 25);
        stale.last_attempt_at = Some(now_ms() - 60_000);
        let cache = Arc::new(MemoryCache::with(stale));
        let resolver = resolver(&lookup, &cache);

        let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
        assert!(res.rate_limited);
        assert!(res.cached);
        assert!(res.exists);
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_upstream_call() {
        let lookup = Arc::new(CountingLookup::slow(
            found("Maria"),
            Duration::from_millis(100),
        ));
        let cache = Arc::new(MemoryCache::default());
        let resolver = resolver(&lookup, &cache);

        let calls = (0..16).map(|_| {
            let resolver = resolver.clone();
            async move { resolver.resolve(INSTANCE, PHONE).await }
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(lookup.calls(), 1);
        let first = results[0].clone().unwrap();
        assert!(first.exists);
        for res in &results {
            assert_eq!(res.as_ref().unwrap().name, first.name);
        }
        assert_eq!(resolver.in_flight().await, 0);
    }

    #[tokio::test]
    async fn abandoned_lookup_still_completes() {
        let lookup = Arc::new(CountingLookup::slow(
            found("Maria"),
            Duration::from_millis(100),
        ));
        let cache = Arc::new(MemoryCache::default());
        let resolver = resolver(&lookup, &cache);

        let waiter = tokio::time::timeout(
            Duration::from_millis(10),
            resolver.resolve(INSTANCE, PHONE),
        )
        .await;
        assert!(waiter.is_err());
        assert_eq!(resolver.in_flight().await, 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(resolver.in_flight().await, 0);
        assert_eq!(lookup.calls(), 1);
        assert!(cache.entry().is_some_and(|e| e.exists));
    }

    #[tokio::test]
    async fn upstream_error_is_not_cached_as_absent() {
        let lookup = Arc::new(CountingLookup::new(Err(ContactError::Status {
            status: 503,
            body: "busy".into(),
        })));
        let cache = Arc::new(MemoryCache::default());
        let resolver = resolver(&lookup, &cache);

        let err = resolver.resolve(INSTANCE, PHONE).await.unwrap_err();
        assert_eq!(err.kind(), "status");
        assert!(cache.entry().is_none());

        // Nothing was cached, so the next call goes upstream again.
        assert!(resolver.resolve(INSTANCE, PHONE).await.is_err());
        assert_eq!(lookup.calls(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_old_data_and_rate_limits() {
        let lookup = Arc::new(CountingLookup::new(Err(ContactError::transport(
            "operation timed out",
        ))));
        let cache = Arc::new(MemoryCache::with(entry(true, 30)));
        let resolver = resolver(&lookup, &cache);

        assert!(resolver.resolve(INSTANCE, PHONE).await.is_err());
        let stored = cache.entry().unwrap();
        assert!(stored.exists);
        assert_eq!(stored.name.as_deref(), Some("Maria"));

        let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
        assert!(res.rate_limited);
        assert!(res.exists);
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn confirmed_absent_is_cached() {
        let lookup = Arc::new(CountingLookup::new(Ok(LookupOutcome::Absent)));
        let cache = Arc::new(MemoryCache::default());
        let resolver = resolver(&lookup, &cache);

        let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
        assert!(!res.exists);
        assert!(!res.cached);

        let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
        assert!(!res.exists);
        assert!(res.cached);
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn resolved_profile_is_written_through() {
        let lookup = Arc::new(CountingLookup::new(found("Maria")));
        let cache = Arc::new(MemoryCache::default());
        let sink = Arc::new(RecordingSink::default());
        let resolver = resolver(&lookup, &cache)
            .with_profile_sink(Arc::clone(&sink) as Arc<dyn ContactProfileSink>);

        resolver.resolve(INSTANCE, PHONE).await.unwrap();
        let updates = sink.updates.lock().unwrap().clone();
        assert_eq!(updates, vec![(
            Some("Maria".to_string()),
            Some("https://pps.example/p.jpg".to_string())
        )]);
    }

    #[tokio::test]
    async fn empty_resolution_is_not_written_through() {
        let lookup = Arc::new(CountingLookup::new(Ok(LookupOutcome::Found {
            name: None,
            picture_url: None,
        })));
        let cache = Arc::new(MemoryCache::default());
        let sink = Arc::new(RecordingSink::default());
        let resolver = resolver(&lookup, &cache)
            .with_profile_sink(Arc::clone(&sink) as Arc<dyn ContactProfileSink>);

        let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
        assert!(res.exists);
        assert!(sink.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_through_failure_does_not_fail_resolution() {
        let lookup = Arc::new(CountingLookup::new(found("Maria")));
        let cache = Arc::new(MemoryCache::default());
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let resolver = resolver(&lookup, &cache)
            .with_profile_sink(Arc::clone(&sink) as Arc<dyn ContactProfileSink>);

        let res = resolver.resolve(INSTANCE, PHONE).await.unwrap();
        assert_eq!(res.name.as_deref(), Some("Maria"));
        assert_eq!(sink.updates.lock().unwrap().len(), 1);
    }

    #[test]
    fn policy_from_config() {
        let policy = CachePolicy::from(&ContactsConfig {
            exists_ttl_secs: 10,
            absent_ttl_secs: 5,
            rate_limit_secs: 1,
        });
        assert_eq!(policy.ttl(true), Duration::from_secs(10));
        assert_eq!(policy.ttl(false), Duration::from_secs(5));
        assert_eq!(policy.rate_limit, Duration::from_secs(1));
    }

    #[test]
    fn resolution_serializes_camel_case() {
        let v = serde_json::to_value(ContactResolution::rejected()).unwrap();
        assert_eq!(v["rateLimited"], false);
        assert_eq!(v["pictureUrl"], serde_json::Value::Null);
        assert!(v.get("cacheAgeHours").is_none());
    }
}

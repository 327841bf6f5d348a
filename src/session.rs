use crate::error::{AuthError, Result};
use crate::models::session::{Session, SessionMetadata};
use crate::models::user::User;
use crate::roles;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// The number of random bytes in a session id (256 bits of entropy).
const SESSION_ID_SIZE: usize = 32;

/// Session Store configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum total live sessions.
    pub max_sessions: usize,
    /// Maximum live sessions per user.
    pub max_user_sessions: usize,
    /// Session time-to-live.
    pub session_ttl: Duration,
    /// Background sweep interval.
    pub cleanup_interval: std::time::Duration,
    /// Inactivity timeout.
    pub inactivity_timeout: Duration,
    /// Whether a successful read refreshes activity and TTL.
    pub extend_on_activity: bool,
    /// Whether a user may hold several sessions at once.
    pub concurrent_sessions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            max_user_sessions: 5,
            session_ttl: Duration::hours(24),
            cleanup_interval: std::time::Duration::from_secs(5 * 60),
            inactivity_timeout: Duration::minutes(30),
            extend_on_activity: true,
            concurrent_sessions: true,
        }
    }
}

/// Why a session left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Removed by an explicit `remove` call.
    Explicit,
    /// Removed because its inactivity timeout elapsed.
    Inactivity,
    /// Removed because its TTL elapsed.
    Ttl,
    /// Evicted to enforce a per-user session quota.
    Quota,
}

/// A callback fired synchronously, inside the store's critical section, for
/// every removal.
pub type EvictionHook = Box<dyn Fn(&Session, EvictionReason) + Send + Sync>;

/// Monotonic session counters, readable without taking the store lock.
#[derive(Default)]
struct SessionMetrics {
    total_created: AtomicU64,
    active: AtomicU64,
    expired_inactivity: AtomicU64,
    expired_ttl: AtomicU64,
    evicted_quota: AtomicU64,
}

/// A point-in-time copy of the store's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Sessions created since startup.
    pub total_created: u64,
    /// Currently live sessions.
    pub active: u64,
    /// Sessions expired by inactivity timeout.
    pub expired_inactivity: u64,
    /// Sessions expired by TTL.
    pub expired_ttl: u64,
    /// Sessions evicted to enforce quotas.
    pub evicted_quota: u64,
}

/// Primary map and per-user index, always mutated together under one lock.
#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    by_user: HashMap<Uuid, BTreeSet<String>>,
}

/// A concurrent, self-expiring registry of live sessions with per-user
/// admission control.
///
/// All mutation of the primary map and the per-user index happens inside one
/// mutex so the two can never disagree; metrics are atomics read without
/// blocking writers. Shared across tasks as `Arc<SessionStore>`.
pub struct SessionStore {
    inner: Mutex<Inner>,
    config: SessionConfig,
    metrics: SessionMetrics,
    on_evict: Option<EvictionHook>,
}

impl SessionStore {
    /// Creates a store with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            metrics: SessionMetrics::default(),
            on_evict: None,
        }
    }

    /// Creates a store that notifies `hook` on every removal.
    ///
    /// The hook runs inside the store's critical section, so bookkeeping it
    /// performs cannot race with the deletion it describes. Keep it cheap.
    pub fn with_eviction_hook(config: SessionConfig, hook: EvictionHook) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            metrics: SessionMetrics::default(),
            on_evict: Some(hook),
        }
    }

    /// Creates a new session for a user.
    ///
    /// Fails with `SessionLimitReached` and no side effects once the global
    /// cap is hit. At the per-user cap, either every existing session of the
    /// user is evicted (single-active-session policy) or the least recently
    /// active one makes room (concurrent sessions allowed).
    pub fn create(&self, user: &User, metadata: SessionMetadata) -> Result<Session> {
        let mut inner = self.inner.lock();

        if inner.sessions.len() >= self.config.max_sessions {
            return Err(AuthError::SessionLimitReached);
        }

        let user_session_count = inner.by_user.get(&user.id).map_or(0, BTreeSet::len);
        if user_session_count >= self.config.max_user_sessions {
            if !self.config.concurrent_sessions {
                let ids: Vec<String> = inner
                    .by_user
                    .get(&user.id)
                    .map(|ids| ids.iter().cloned().collect())
                    .unwrap_or_default();
                for id in ids {
                    self.remove_locked(&mut inner, &id, EvictionReason::Quota);
                }
            } else if let Some(oldest) = self.oldest_session_id(&inner, &user.id) {
                self.remove_locked(&mut inner, &oldest, EvictionReason::Quota);
            }
        }

        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
            permissions: roles::permissions_for_roles(&user.roles),
            ip_address: metadata.ip_address,
            user_agent: metadata.user_agent,
            created_at: now,
            last_activity: now,
            expires_at: now + self.config.session_ttl,
            mfa_verified: metadata.mfa_verified,
        };

        inner
            .by_user
            .entry(user.id)
            .or_default()
            .insert(session.id.clone());
        inner.sessions.insert(session.id.clone(), session.clone());

        self.metrics.total_created.fetch_add(1, Ordering::Relaxed);
        self.metrics.active.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(user_id = %user.id, "Session created");
        Ok(session)
    }

    /// Looks up a session by id.
    ///
    /// A TTL-lapsed entry is removed and reported `SessionNotFound`; an
    /// inactivity-lapsed entry is removed and reported `SessionInactive`.
    /// Otherwise, with sliding expiration enabled, the activity timestamp
    /// and TTL are refreshed as part of the read.
    pub fn get(&self, session_id: &str) -> Result<Session> {
        let mut inner = self.inner.lock();
        let now = Utc::now();

        let (expires_at, last_activity) = match inner.sessions.get(session_id) {
            Some(session) => (session.expires_at, session.last_activity),
            None => return Err(AuthError::SessionNotFound),
        };

        if expires_at <= now {
            self.remove_locked(&mut inner, session_id, EvictionReason::Ttl);
            return Err(AuthError::SessionNotFound);
        }

        if now - last_activity > self.config.inactivity_timeout {
            self.remove_locked(&mut inner, session_id, EvictionReason::Inactivity);
            return Err(AuthError::SessionInactive);
        }

        let session = match inner.sessions.get_mut(session_id) {
            Some(session) => session,
            None => return Err(AuthError::SessionNotFound),
        };
        if self.config.extend_on_activity {
            session.last_activity = now;
            session.expires_at = now + self.config.session_ttl;
        }

        Ok(session.clone())
    }

    /// Removes a session explicitly.
    ///
    /// A missing id is reported so callers can tell "already gone" from a
    /// confirmed removal.
    pub fn remove(&self, session_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(session_id) {
            return Err(AuthError::SessionNotFound);
        }
        self.remove_locked(&mut inner, session_id, EvictionReason::Explicit);
        Ok(())
    }

    /// Removes every TTL-expired session, returning how many were removed.
    ///
    /// Shares the removal path with the foreground operations, so index and
    /// metric bookkeeping cannot diverge between the two.
    pub fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Utc::now();

        let expired: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| s.expires_at <= now)
            .map(|s| s.id.clone())
            .collect();

        for id in &expired {
            self.remove_locked(&mut inner, id, EvictionReason::Ttl);
        }

        if !expired.is_empty() {
            tracing::debug!("Swept {} expired sessions", expired.len());
        }
        expired.len()
    }

    /// Spawns the periodic background sweep.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let period = store.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }

    /// Returns a snapshot of the store's counters without taking the lock.
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_created: self.metrics.total_created.load(Ordering::Relaxed),
            active: self.metrics.active.load(Ordering::Relaxed),
            expired_inactivity: self.metrics.expired_inactivity.load(Ordering::Relaxed),
            expired_ttl: self.metrics.expired_ttl.load(Ordering::Relaxed),
            evicted_quota: self.metrics.evicted_quota.load(Ordering::Relaxed),
        }
    }

    /// The user's session with the smallest `last_activity`. Ties are broken
    /// by id order, which is stable within a process run.
    fn oldest_session_id(&self, inner: &Inner, user_id: &Uuid) -> Option<String> {
        let ids = inner.by_user.get(user_id)?;
        let mut oldest: Option<(&String, DateTime<Utc>)> = None;
        for id in ids {
            let Some(session) = inner.sessions.get(id) else {
                continue;
            };
            match oldest {
                Some((_, ts)) if session.last_activity >= ts => {}
                _ => oldest = Some((id, session.last_activity)),
            }
        }
        oldest.map(|(id, _)| id.clone())
    }

    /// The single removal path: primary map, per-user index, metrics and the
    /// eviction hook all update here, under the caller's lock.
    fn remove_locked(&self, inner: &mut Inner, session_id: &str, reason: EvictionReason) {
        let Some(session) = inner.sessions.remove(session_id) else {
            return;
        };

        if let Some(ids) = inner.by_user.get_mut(&session.user_id) {
            ids.remove(session_id);
            if ids.is_empty() {
                inner.by_user.remove(&session.user_id);
            }
        }

        self.metrics.active.fetch_sub(1, Ordering::Relaxed);
        match reason {
            EvictionReason::Explicit => {}
            EvictionReason::Inactivity => {
                self.metrics.expired_inactivity.fetch_add(1, Ordering::Relaxed);
            }
            EvictionReason::Ttl => {
                self.metrics.expired_ttl.fetch_add(1, Ordering::Relaxed);
            }
            EvictionReason::Quota => {
                self.metrics.evicted_quota.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(hook) = &self.on_evict {
            hook(&session, reason);
        }
    }

    #[cfg(test)]
    fn backdate(
        &self,
        session_id: &str,
        last_activity: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let mut inner = self.inner.lock();
        let session = inner.sessions.get_mut(session_id).unwrap();
        if let Some(ts) = last_activity {
            session.last_activity = ts;
        }
        if let Some(ts) = expires_at {
            session.expires_at = ts;
        }
    }

    #[cfg(test)]
    fn assert_index_consistent(&self) {
        let inner = self.inner.lock();
        for (id, session) in &inner.sessions {
            let holders: Vec<&Uuid> = inner
                .by_user
                .iter()
                .filter(|(_, ids)| ids.contains(id))
                .map(|(user, _)| user)
                .collect();
            assert_eq!(holders, vec![&session.user_id]);
        }
        let indexed: usize = inner.by_user.values().map(BTreeSet::len).sum();
        assert_eq!(indexed, inner.sessions.len());
    }
}

/// Generates a session id from 256 bits of CSPRNG output, URL-safe encoded.
fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_SIZE];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn test_user(username: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: String::new(),
            roles: vec!["developer".to_string()],
            mfa_enabled: false,
            created_at: Utc::now(),
        }
    }

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            ip_address: "192.0.2.1".to_string(),
            user_agent: "test-agent".to_string(),
            mfa_verified: false,
        }
    }

    #[test]
    fn create_and_get_round_trip() {
        let store = SessionStore::new(SessionConfig::default());
        let user = test_user("alice");

        let session = store.create(&user, metadata()).unwrap();
        assert_eq!(session.user_id, user.id);
        assert!(session.permissions.contains(&"cert:request".to_string()));

        let fetched = store.get(&session.id).unwrap();
        assert_eq!(fetched.id, session.id);
        store.assert_index_consistent();
    }

    #[test]
    fn sliding_expiration_refreshes_activity_and_ttl() {
        let store = SessionStore::new(SessionConfig::default());
        let session = store.create(&test_user("alice"), metadata()).unwrap();

        let stale = Utc::now() - Duration::minutes(10);
        store.backdate(&session.id, Some(stale), Some(Utc::now() + Duration::minutes(5)));

        let refreshed = store.get(&session.id).unwrap();
        assert!(refreshed.last_activity > stale);
        assert!(refreshed.expires_at > Utc::now() + Duration::hours(23));
    }

    #[test]
    fn inactive_session_is_reported_and_removed() {
        let store = SessionStore::new(SessionConfig::default());
        let session = store.create(&test_user("alice"), metadata()).unwrap();

        // Idle past the timeout but well inside the TTL.
        store.backdate(&session.id, Some(Utc::now() - Duration::minutes(31)), None);

        let err = store.get(&session.id).unwrap_err();
        assert!(matches!(err, AuthError::SessionInactive));

        let err = store.get(&session.id).unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));

        let metrics = store.metrics();
        assert_eq!(metrics.expired_inactivity, 1);
        assert_eq!(metrics.active, 0);
        store.assert_index_consistent();
    }

    #[test]
    fn ttl_lapsed_session_is_removed_on_read() {
        let store = SessionStore::new(SessionConfig::default());
        let session = store.create(&test_user("alice"), metadata()).unwrap();

        store.backdate(&session.id, None, Some(Utc::now() - Duration::seconds(1)));

        let err = store.get(&session.id).unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
        assert_eq!(store.metrics().expired_ttl, 1);
    }

    #[test]
    fn global_cap_fails_without_side_effects() {
        let store = SessionStore::new(SessionConfig {
            max_sessions: 2,
            ..SessionConfig::default()
        });

        store.create(&test_user("alice"), metadata()).unwrap();
        store.create(&test_user("bob"), metadata()).unwrap();

        let before = store.metrics();
        let err = store.create(&test_user("carol"), metadata()).unwrap_err();
        assert!(matches!(err, AuthError::SessionLimitReached));

        let after = store.metrics();
        assert_eq!(before, after);
        assert_eq!(after.active, 2);
        store.assert_index_consistent();
    }

    #[test]
    fn quota_evicts_least_recently_active_session() {
        let store = SessionStore::new(SessionConfig {
            max_user_sessions: 5,
            ..SessionConfig::default()
        });
        let user = test_user("alice");
        let base = Utc::now() - Duration::minutes(5);

        // Five sessions with activity at t0..t4.
        let mut ids = Vec::new();
        for i in 0..5 {
            let session = store.create(&user, metadata()).unwrap();
            store.backdate(&session.id, Some(base + Duration::seconds(i)), None);
            ids.push(session.id);
        }

        // Touch session 0 so session 1 becomes the oldest.
        store.get(&ids[0]).unwrap();

        let sixth = store.create(&user, metadata()).unwrap();

        assert!(store.get(&ids[0]).is_ok());
        assert!(matches!(
            store.get(&ids[1]).unwrap_err(),
            AuthError::SessionNotFound
        ));
        assert!(store.get(&sixth.id).is_ok());

        let metrics = store.metrics();
        assert_eq!(metrics.active, 5);
        assert_eq!(metrics.evicted_quota, 1);
        store.assert_index_consistent();
    }

    #[test]
    fn creating_over_quota_repeatedly_never_exceeds_it() {
        let store = SessionStore::new(SessionConfig {
            max_user_sessions: 3,
            ..SessionConfig::default()
        });
        let user = test_user("alice");

        for _ in 0..6 {
            store.create(&user, metadata()).unwrap();
        }

        assert_eq!(store.metrics().active, 3);
        assert_eq!(store.metrics().evicted_quota, 3);
        store.assert_index_consistent();
    }

    #[test]
    fn single_session_policy_wipes_all_user_sessions() {
        let store = SessionStore::new(SessionConfig {
            max_user_sessions: 2,
            concurrent_sessions: false,
            ..SessionConfig::default()
        });
        let user = test_user("alice");

        let first = store.create(&user, metadata()).unwrap();
        let second = store.create(&user, metadata()).unwrap();
        let third = store.create(&user, metadata()).unwrap();

        assert!(store.get(&first.id).is_err());
        assert!(store.get(&second.id).is_err());
        assert!(store.get(&third.id).is_ok());
        assert_eq!(store.metrics().active, 1);
        assert_eq!(store.metrics().evicted_quota, 2);
    }

    #[test]
    fn remove_is_reported_on_missing_id() {
        let store = SessionStore::new(SessionConfig::default());
        let session = store.create(&test_user("alice"), metadata()).unwrap();

        store.remove(&session.id).unwrap();
        let err = store.remove(&session.id).unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
        assert_eq!(store.metrics().active, 0);
    }

    #[test]
    fn sweep_removes_only_ttl_expired_sessions() {
        let store = SessionStore::new(SessionConfig::default());
        let user = test_user("alice");

        let keep = store.create(&user, metadata()).unwrap();
        let expired_a = store.create(&user, metadata()).unwrap();
        let expired_b = store.create(&user, metadata()).unwrap();
        let past = Utc::now() - Duration::seconds(1);
        store.backdate(&expired_a.id, None, Some(past));
        store.backdate(&expired_b.id, None, Some(past));

        assert_eq!(store.sweep_expired(), 2);
        assert!(store.get(&keep.id).is_ok());
        assert_eq!(store.metrics().expired_ttl, 2);
        assert_eq!(store.metrics().active, 1);
        store.assert_index_consistent();
    }

    #[test]
    fn eviction_hook_fires_inside_every_removal_path() {
        let events: Arc<PlMutex<Vec<(String, EvictionReason)>>> =
            Arc::new(PlMutex::new(Vec::new()));
        let recorder = Arc::clone(&events);
        let store = SessionStore::with_eviction_hook(
            SessionConfig {
                max_user_sessions: 1,
                ..SessionConfig::default()
            },
            Box::new(move |session, reason| {
                recorder.lock().push((session.id.clone(), reason));
            }),
        );
        let user = test_user("alice");

        let first = store.create(&user, metadata()).unwrap();
        let second = store.create(&user, metadata()).unwrap(); // evicts first
        store.backdate(&second.id, None, Some(Utc::now() - Duration::seconds(1)));
        store.sweep_expired();
        let third = store.create(&user, metadata()).unwrap();
        store.remove(&third.id).unwrap();

        let recorded = events.lock();
        assert_eq!(
            *recorded,
            vec![
                (first.id, EvictionReason::Quota),
                (second.id, EvictionReason::Ttl),
                (third.id, EvictionReason::Explicit),
            ]
        );
    }

    #[tokio::test]
    async fn background_sweeper_expires_sessions_passively() {
        let store = Arc::new(SessionStore::new(SessionConfig {
            cleanup_interval: std::time::Duration::from_millis(20),
            ..SessionConfig::default()
        }));
        let session = store.create(&test_user("alice"), metadata()).unwrap();
        store.backdate(&session.id, None, Some(Utc::now() - Duration::seconds(1)));

        let handle = store.start_sweeper();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(store.metrics().expired_ttl, 1);
        assert_eq!(store.metrics().active, 0);
    }

    #[test]
    fn session_ids_are_long_and_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(a.len() >= 42);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn concurrent_creates_respect_the_global_cap() {
        let store = Arc::new(SessionStore::new(SessionConfig {
            max_sessions: 50,
            max_user_sessions: 100,
            ..SessionConfig::default()
        }));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let user = test_user(&format!("user{}", i));
                let mut created = 0;
                for _ in 0..10 {
                    if store.create(&user, metadata()).is_ok() {
                        created += 1;
                    }
                }
                created
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
        assert_eq!(store.metrics().active, 50);
        store.assert_index_consistent();
    }
}

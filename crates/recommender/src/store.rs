//! Affinity Store
//!
//! Durable per-user state: seen videos and per-cluster engagement counts.
//!
//! Concurrency discipline:
//! - mutations of one username are serialized by that user's lock; other
//!   users are never blocked
//! - every commit writes the whole store to a temp file and renames it over
//!   the backing file before the new profile becomes visible in memory
//! - the commit runs in a blocking task that owns the user's lock guard, so a
//!   caller abandoning the request cannot leave file and memory diverged
//! - readers only ever see fully committed profiles

use crate::error::{RecommenderError, Result};
use crate::persist;
use crate::types::{ClusterLabel, InteractionEvent, UserProfile};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex;

/// Profile persistence seam used by the recommendation engine
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create an empty profile; `AlreadyExists` if the username is taken
    async fn create(&self, username: &str) -> Result<UserProfile>;

    /// Fetch a committed profile; `UserNotFound` if absent
    async fn get(&self, username: &str) -> Result<UserProfile>;

    /// Fold an interaction into the user's profile and persist it.
    ///
    /// `affinity_label` is `None` when the event carries no cluster signal.
    async fn apply_interaction(
        &self,
        event: InteractionEvent,
        affinity_label: Option<ClusterLabel>,
    ) -> Result<UserProfile>;

    /// Number of stored profiles
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct StoreInner {
    path: Option<PathBuf>,
    profiles: DashMap<String, UserProfile>,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    persist_lock: StdMutex<()>,
}

impl StoreInner {
    /// Persist the store with `profile` applied, then publish it
    fn commit(&self, profile: UserProfile) -> Result<UserProfile> {
        let _guard = self
            .persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(path) = &self.path {
            let start = Instant::now();
            let mut snapshot: BTreeMap<String, UserProfile> = self
                .profiles
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect();
            snapshot.insert(profile.username.clone(), profile.clone());

            persist::write_json(path, &snapshot)?;

            tracing::debug!(
                "Committed profile '{}' ({} profiles) in {:?}",
                profile.username,
                snapshot.len(),
                start.elapsed()
            );
        }

        self.profiles.insert(profile.username.clone(), profile.clone());
        Ok(profile)
    }
}

/// JSON-file backed profile store
#[derive(Clone)]
pub struct FileAffinityStore {
    inner: Arc<StoreInner>,
}

impl FileAffinityStore {
    /// Open the store at `path`.
    ///
    /// A missing file is a fresh install. An unreadable or malformed file is
    /// `CorruptState`; it is never silently treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let loaded = persist::read_json::<BTreeMap<String, UserProfile>>(&path)?;

        let profiles = DashMap::new();
        match loaded {
            Some(map) => {
                for (key, profile) in map {
                    if key != profile.username {
                        return Err(RecommenderError::corrupt(
                            &path,
                            format!(
                                "key '{key}' holds profile for '{}'",
                                profile.username
                            ),
                        ));
                    }
                    profiles.insert(key, profile);
                }
                tracing::info!(
                    "Loaded {} user profiles from {}",
                    profiles.len(),
                    path.display()
                );
            }
            None => {
                tracing::info!(
                    "No profile store at {}, starting empty",
                    path.display()
                );
            }
        }

        Ok(Self::with_state(Some(path), profiles))
    }

    /// Store without a backing file
    pub fn in_memory() -> Self {
        Self::with_state(None, DashMap::new())
    }

    fn with_state(path: Option<PathBuf>, profiles: DashMap<String, UserProfile>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path,
                profiles,
                user_locks: DashMap::new(),
                persist_lock: StdMutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Run `update` on the user's committed profile under the user's lock
    async fn mutate<F>(&self, username: &str, update: F) -> Result<UserProfile>
    where
        F: FnOnce(Option<UserProfile>) -> Result<UserProfile> + Send + 'static,
    {
        let lock = self
            .inner
            .user_locks
            .entry(username.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;

        let current = self
            .inner
            .profiles
            .get(username)
            .map(|entry| entry.value().clone());
        let inner = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let updated = update(current)?;
            inner.commit(updated)
        })
        .await
        .map_err(|e| RecommenderError::Persistence(format!("commit task failed: {e}")))?
    }
}

#[async_trait]
impl ProfileStore for FileAffinityStore {
    async fn create(&self, username: &str) -> Result<UserProfile> {
        let name = username.to_string();
        let profile = self
            .mutate(username, move |current| match current {
                Some(_) => Err(RecommenderError::AlreadyExists(name)),
                None => Ok(UserProfile::new(name)),
            })
            .await?;

        tracing::info!("Created user profile '{}'", profile.username);
        Ok(profile)
    }

    async fn get(&self, username: &str) -> Result<UserProfile> {
        self.inner
            .profiles
            .get(username)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RecommenderError::UserNotFound(username.to_string()))
    }

    async fn apply_interaction(
        &self,
        event: InteractionEvent,
        affinity_label: Option<ClusterLabel>,
    ) -> Result<UserProfile> {
        // Profiles are never deleted, so existence checked here still holds
        // once the user's lock is taken.
        if !self.inner.profiles.contains_key(&event.username) {
            return Err(RecommenderError::UserNotFound(event.username));
        }

        let username = event.username.clone();
        self.mutate(&username, move |current| {
            let mut profile =
                current.ok_or_else(|| RecommenderError::UserNotFound(event.username.clone()))?;
            profile.apply(&event, affinity_label);
            Ok(profile)
        })
        .await
    }

    fn len(&self) -> usize {
        self.inner.profiles.len()
    }
}

/// Stand-in used when the profile file could not be loaded.
///
/// Every operation reports the load failure so the service stays up
/// in a degraded state and the file is never overwritten.
pub struct DegradedStore {
    path: PathBuf,
    reason: String,
}

impl DegradedStore {
    pub fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    fn unavailable(&self) -> RecommenderError {
        RecommenderError::corrupt(&self.path, &self.reason)
    }
}

#[async_trait]
impl ProfileStore for DegradedStore {
    async fn create(&self, _username: &str) -> Result<UserProfile> {
        Err(self.unavailable())
    }

    async fn get(&self, _username: &str) -> Result<UserProfile> {
        Err(self.unavailable())
    }

    async fn apply_interaction(
        &self,
        _event: InteractionEvent,
        _affinity_label: Option<ClusterLabel>,
    ) -> Result<UserProfile> {
        Err(self.unavailable())
    }

    fn len(&self) -> usize {
        0
    }
}

//! Concurrent interactions against a file-backed store

use super::catalogue;
use crate::recommendation::RecommendationEngine;
use crate::store::{FileAffinityStore, ProfileStore};
use crate::types::Pid;
use std::sync::Arc;

const WRITERS: u64 = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_lost_updates_for_one_user() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_profiles.json");
    let store = FileAffinityStore::open(&path).unwrap();
    let engine = Arc::new(RecommendationEngine::new(
        Arc::new(store.clone()),
        catalogue(),
    ));
    engine.create_user("alice").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let engine = Arc::clone(&engine);
        // Alternate between two clusters so both counters race too
        let pid: Pid = 1000 + i;
        let label = (i % 2) as i32;
        handles.push(tokio::spawn(async move {
            engine.record_interaction("alice", pid, label).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let alice = store.get("alice").await.unwrap();
    assert_eq!(alice.seen.len() as u64, WRITERS);
    assert_eq!(alice.affinity.get(&0), Some(&(WRITERS / 2)));
    assert_eq!(alice.affinity.get(&1), Some(&(WRITERS / 2)));

    // The file holds the same final state
    let reopened = FileAffinityStore::open(&path).unwrap();
    assert_eq!(reopened.get("alice").await.unwrap().seen, alice.seen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_users_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_profiles.json");
    let store = FileAffinityStore::open(&path).unwrap();
    let engine = Arc::new(RecommendationEngine::new(Arc::new(store), catalogue()));

    let users: Vec<String> = (0..8).map(|i| format!("user{i}")).collect();
    for user in &users {
        engine.create_user(user).await.unwrap();
    }

    let mut handles = Vec::new();
    for user in users.clone() {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            for pid in 0..10 {
                engine.record_interaction(&user, 2000 + pid, 2).await?;
            }
            engine.get_recommendations(&user, 5).await
        }));
    }
    for handle in handles {
        let recs = handle.await.unwrap().unwrap();
        assert_eq!(recs.len(), 5);
        assert!(recs.iter().all(|r| r.cluster_label == 2));
    }

    let reopened = FileAffinityStore::open(&path).unwrap();
    assert_eq!(reopened.len(), users.len());
    for user in &users {
        let profile = reopened.get(user).await.unwrap();
        assert_eq!(profile.seen.len(), 10);
        assert_eq!(profile.affinity.get(&2), Some(&10));
    }
}

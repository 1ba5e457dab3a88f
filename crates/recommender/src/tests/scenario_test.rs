//! End-to-end engine behaviour: user lifecycle, allocation and noise handling

use super::{catalogue, cluster_pids, NOISE_PIDS};
use crate::assigner::NearestCentroid;
use crate::error::RecommenderError;
use crate::recommendation::RecommendationEngine;
use crate::store::FileAffinityStore;
use crate::types::{Pid, RecommendationSource, NOISE_LABEL};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

fn engine() -> RecommendationEngine {
    RecommendationEngine::new(Arc::new(FileAffinityStore::in_memory()), catalogue())
}

#[tokio::test]
async fn test_create_is_not_idempotent() {
    let engine = engine();
    engine.create_user("a").await.unwrap();
    assert!(matches!(
        engine.create_user("a").await,
        Err(RecommenderError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_unknown_user_everywhere() {
    let engine = engine();
    assert!(matches!(
        engine.get_user("nobody").await,
        Err(RecommenderError::UserNotFound(_))
    ));
    assert!(matches!(
        engine.record_interaction("nobody", 42, 3).await,
        Err(RecommenderError::UserNotFound(_))
    ));
    assert!(matches!(
        engine.get_recommendations("nobody", 5).await,
        Err(RecommenderError::UserNotFound(_))
    ));
}

#[tokio::test]
async fn test_alice_walkthrough() {
    let engine = engine();

    // Fresh profile
    engine.create_user("alice").await.unwrap();
    let alice = engine.get_user("alice").await.unwrap();
    assert!(alice.seen.is_empty());
    assert!(alice.affinity.is_empty());

    // Cold start: ten best clustered videos
    let recs = engine.get_recommendations("alice", 10).await.unwrap();
    let pids: Vec<Pid> = recs.iter().map(|r| r.pid).collect();
    assert_eq!(pids, (501..=510).collect::<Vec<_>>());
    assert!(recs.iter().all(|r| r.source == RecommendationSource::Popular));

    // One like in cluster 3
    engine.record_interaction("alice", 42, 3).await.unwrap();
    let alice = engine.get_user("alice").await.unwrap();
    assert_eq!(alice.affinity, BTreeMap::from([(3, 1)]));
    assert!(alice.seen.contains(&42));

    // Majority of the next page comes from cluster 3, never pid 42
    let recs = engine.get_recommendations("alice", 10).await.unwrap();
    let cluster_three: HashSet<Pid> = cluster_pids(3).into_iter().collect();
    let from_three = recs
        .iter()
        .filter(|r| cluster_three.contains(&r.pid) && r.cluster_label == 3)
        .count();
    assert!(from_three > 5, "only {from_three} of 10 from cluster 3");
    assert!(recs.iter().all(|r| r.pid != 42));

    // A noise-labelled like only marks the video seen
    engine
        .record_interaction("alice", 7, NOISE_LABEL)
        .await
        .unwrap();
    let alice = engine.get_user("alice").await.unwrap();
    assert_eq!(alice.affinity, BTreeMap::from([(3, 1)]));
    assert!(alice.seen.contains(&7));
}

#[tokio::test]
async fn test_repeated_like_still_counts() {
    let engine = engine();
    engine.create_user("bob").await.unwrap();
    engine.record_interaction("bob", 42, 3).await.unwrap();
    engine.record_interaction("bob", 42, 3).await.unwrap();

    let bob = engine.get_user("bob").await.unwrap();
    assert_eq!(bob.affinity.get(&3), Some(&2));
    assert_eq!(bob.seen.len(), 1);
}

#[tokio::test]
async fn test_unknown_cluster_label_is_seen_only() {
    let engine = engine();
    engine.create_user("carol").await.unwrap();
    engine.record_interaction("carol", 5555, 77).await.unwrap();

    let carol = engine.get_user("carol").await.unwrap();
    assert!(carol.affinity.is_empty());
    assert!(carol.seen.contains(&5555));
}

#[tokio::test]
async fn test_recommendations_never_repeat_seen() {
    let engine = engine();
    engine.create_user("dave").await.unwrap();

    let likes = [(201, 1), (202, 1), (42, 3), (501, 4), (7, NOISE_LABEL)];
    for (pid, label) in likes {
        engine.record_interaction("dave", pid, label).await.unwrap();

        let seen = engine.get_user("dave").await.unwrap().seen;
        for count in [1, 5, 20, 100] {
            let recs = engine.get_recommendations("dave", count).await.unwrap();
            let pids: BTreeSet<Pid> = recs.iter().map(|r| r.pid).collect();
            assert_eq!(pids.len(), recs.len(), "duplicate pid in page");
            assert!(pids.is_disjoint(&seen));
        }
    }
}

#[tokio::test]
async fn test_affinity_share_is_monotonic() {
    let engine = engine();
    engine.create_user("erin").await.unwrap();
    engine.record_interaction("erin", 301, 2).await.unwrap();
    engine.record_interaction("erin", 302, 2).await.unwrap();
    engine.record_interaction("erin", 101, 0).await.unwrap();
    engine.record_interaction("erin", 102, 0).await.unwrap();

    let mut previous = 0;
    for pid in 103..=106 {
        let recs = engine.get_recommendations("erin", 10).await.unwrap();
        let share = recs.iter().filter(|r| r.cluster_label == 0).count();
        assert!(share >= previous, "share fell from {previous} to {share}");
        previous = share;

        engine.record_interaction("erin", pid, 0).await.unwrap();
    }
    assert_eq!(previous, 7);
}

#[tokio::test]
async fn test_noise_never_recommended() {
    let index = catalogue();
    for pid in NOISE_PIDS {
        assert_eq!(index.cluster_of(pid), None);
    }
    assert!(index
        .profiles()
        .all(|p| NOISE_PIDS.iter().all(|n| !p.members.contains(n))));

    let engine = engine();
    engine.create_user("frank").await.unwrap();
    let recs = engine.get_recommendations("frank", 100).await.unwrap();
    assert_eq!(recs.len(), 60);
    assert!(recs.iter().all(|r| !NOISE_PIDS.contains(&r.pid)));
}

#[test]
fn test_assignment_is_deterministic() {
    let assigner = NearestCentroid::new(catalogue());
    let first = assigner.assign(&[21.0, 3.0]).unwrap();
    assert_eq!(first.cluster_label, 2);

    for _ in 0..20 {
        assert_eq!(assigner.assign(&[21.0, 3.0]).unwrap(), first);
    }
}

//! Affinity-weighted Recommendation Engine
//!
//! Turns cluster membership plus per-user engagement history into an ordered
//! candidate list, and folds new interactions back into the profile.

use crate::assigner::NearestCentroid;
use crate::cold_start::HandleColdStartUser;
use crate::clustering::ClusterIndex;
use crate::error::{RecommenderError, Result};
use crate::pipeline::FittedPipeline;
use crate::store::ProfileStore;
use crate::types::{
    is_noise, ClusterLabel, InteractionEvent, Pid, Recommendation, RecommendationSource,
    UserProfile, VideoRecord, NOISE_LABEL,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

const DEFAULT_MAX_RECOMMENDATIONS: usize = 100;

/// One affinity cluster's progress through an allocation
struct ClusterCursor<'a> {
    label: ClusterLabel,
    affinity: u64,
    quota: f64,
    allocated: usize,
    members: &'a [Pid],
    next: usize,
    exhausted: bool,
}

impl ClusterCursor<'_> {
    fn remaining_share(&self) -> f64 {
        self.quota - self.allocated as f64
    }

    fn next_unseen(&mut self, seen: &BTreeSet<Pid>, picked: &HashSet<Pid>) -> Option<Pid> {
        while let Some(&pid) = self.members.get(self.next) {
            self.next += 1;
            if !seen.contains(&pid) && !picked.contains(&pid) {
                return Some(pid);
            }
        }
        self.exhausted = true;
        None
    }
}

/// Generate recommendations for one profile
///
/// Steps:
/// 1. Keep affinity clusters that have engagement and exist in the index
/// 2. Give each cluster a quota proportional to its share of engagement
/// 3. Hand out slots one at a time to the cluster furthest below its quota
/// 4. Move the unused quota of an exhausted cluster to the strongest
///    remaining one
/// 5. Fill whatever is left from the global ranking
pub struct GenerateRecommendations;

impl GenerateRecommendations {
    pub fn execute(profile: &UserProfile, index: &ClusterIndex, n: usize) -> Vec<Recommendation> {
        let mut recommendations = Vec::with_capacity(n);
        if n == 0 {
            return recommendations;
        }

        let seen = &profile.seen;
        let mut picked: HashSet<Pid> = HashSet::new();

        let candidates: Vec<(ClusterLabel, u64, &[Pid])> = profile
            .affinity
            .iter()
            .filter(|(_, &count)| count > 0)
            .filter_map(|(&label, &count)| {
                index
                    .get(label)
                    .map(|cluster| (label, count, cluster.members.as_slice()))
            })
            .collect();
        let total: u64 = candidates.iter().map(|(_, count, _)| count).sum();

        let mut cursors: Vec<ClusterCursor> = candidates
            .into_iter()
            .map(|(label, affinity, members)| ClusterCursor {
                label,
                affinity,
                quota: n as f64 * affinity as f64 / total as f64,
                allocated: 0,
                members,
                next: 0,
                exhausted: false,
            })
            .collect();

        while recommendations.len() < n {
            let Some(i) = Self::neediest(&cursors) else {
                break;
            };

            match cursors[i].next_unseen(seen, &picked) {
                Some(pid) => {
                    cursors[i].allocated += 1;
                    picked.insert(pid);
                    recommendations.push(Recommendation {
                        pid,
                        cluster_label: cursors[i].label,
                        source: RecommendationSource::Affinity,
                    });
                }
                None => {
                    let leftover = cursors[i].remaining_share().max(0.0);
                    if let Some(j) = Self::strongest(&cursors) {
                        cursors[j].quota += leftover;
                    }
                }
            }
        }

        let remaining = n - recommendations.len();
        if remaining > 0 {
            recommendations.extend(HandleColdStartUser::execute(
                index,
                seen,
                &mut picked,
                remaining,
            ));
        }

        recommendations
    }

    /// Active cluster furthest below its quota; ties to higher affinity,
    /// then lower label
    fn neediest(cursors: &[ClusterCursor]) -> Option<usize> {
        cursors
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.exhausted)
            .max_by(|(_, a), (_, b)| {
                a.remaining_share()
                    .total_cmp(&b.remaining_share())
                    .then(a.affinity.cmp(&b.affinity))
                    .then(b.label.cmp(&a.label))
            })
            .map(|(i, _)| i)
    }

    /// Active cluster with the most engagement; ties to lower label
    fn strongest(cursors: &[ClusterCursor]) -> Option<usize> {
        cursors
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.exhausted)
            .max_by(|(_, a), (_, b)| a.affinity.cmp(&b.affinity).then(b.label.cmp(&a.label)))
            .map(|(i, _)| i)
    }
}

/// Serving facade over the profile store and the loaded cluster artifacts
pub struct RecommendationEngine {
    store: Arc<dyn ProfileStore>,
    index: Arc<ClusterIndex>,
    assigner: NearestCentroid,
    pipeline: Option<Arc<FittedPipeline>>,
    max_recommendations: usize,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn ProfileStore>, index: Arc<ClusterIndex>) -> Self {
        Self {
            store,
            assigner: NearestCentroid::new(Arc::clone(&index)),
            index,
            pipeline: None,
            max_recommendations: DEFAULT_MAX_RECOMMENDATIONS,
        }
    }

    pub fn with_pipeline(mut self, pipeline: Arc<FittedPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_max_recommendations(mut self, max: usize) -> Self {
        self.max_recommendations = max;
        self
    }

    pub fn index(&self) -> &ClusterIndex {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    fn normalize(username: &str) -> Result<&str> {
        let name = username.trim();
        if name.is_empty() {
            return Err(RecommenderError::InvalidInput(
                "username must not be empty".into(),
            ));
        }
        Ok(name)
    }

    pub async fn create_user(&self, username: &str) -> Result<UserProfile> {
        let name = Self::normalize(username)?;
        self.store.create(name).await
    }

    pub async fn get_user(&self, username: &str) -> Result<UserProfile> {
        let name = Self::normalize(username)?;
        self.store.get(name).await
    }

    /// Record that `username` engaged with `pid` from cluster `cluster_label`.
    ///
    /// Noise and labels unknown to the loaded index only mark the video seen.
    pub async fn record_interaction(
        &self,
        username: &str,
        pid: Pid,
        cluster_label: ClusterLabel,
    ) -> Result<UserProfile> {
        let name = Self::normalize(username)?;

        let affinity_label = if is_noise(cluster_label) {
            None
        } else if self.index.contains(cluster_label) {
            Some(cluster_label)
        } else {
            tracing::warn!(
                "Interaction by '{}' on {} names unknown cluster {}; recorded as seen only",
                name,
                pid,
                cluster_label
            );
            None
        };

        let profile = self
            .store
            .apply_interaction(InteractionEvent::now(name, pid, cluster_label), affinity_label)
            .await?;

        tracing::debug!(
            "Recorded interaction: user={} pid={} cluster={}",
            name,
            pid,
            cluster_label
        );
        Ok(profile)
    }

    /// Up to `count` unseen videos for `username`, clamped to the configured maximum
    pub async fn get_recommendations(
        &self,
        username: &str,
        count: usize,
    ) -> Result<Vec<Recommendation>> {
        let name = Self::normalize(username)?;
        let profile = self.store.get(name).await?;

        let n = count.min(self.max_recommendations);
        let recommendations = GenerateRecommendations::execute(&profile, &self.index, n);

        tracing::debug!(
            "Generated {} recommendations for '{}' (requested {})",
            recommendations.len(),
            name,
            count
        );
        Ok(recommendations)
    }

    /// Other members of `pid`'s cluster, best first
    pub fn similar_videos(&self, pid: Pid, count: usize) -> Vec<Pid> {
        self.index.similar(pid, count.min(self.max_recommendations))
    }

    /// Cluster for a video that was not part of the training corpus.
    ///
    /// Without a fitted pipeline or any clusters the video is reported as
    /// noise. Malformed records are still errors.
    pub fn classify_video(&self, record: &VideoRecord) -> Result<ClusterLabel> {
        if let Some(label) = self.index.cluster_of(record.pid) {
            return Ok(label);
        }

        let Some(pipeline) = &self.pipeline else {
            tracing::warn!("No fitted pipeline loaded; video {} treated as noise", record.pid);
            return Ok(NOISE_LABEL);
        };

        match self.assigner.assign_record(pipeline, record) {
            Ok(assignment) => {
                tracing::debug!(
                    "Assigned video {} to cluster {} (distance {:.4})",
                    record.pid,
                    assignment.cluster_label,
                    assignment.distance
                );
                Ok(assignment.cluster_label)
            }
            Err(RecommenderError::NoClustersAvailable) => {
                tracing::warn!("No clusters available; video {} treated as noise", record.pid);
                Ok(NOISE_LABEL)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::ClusterArtifact;
    use std::path::Path;

    /// Cluster 0: pids 1..=5, cluster 1: pids 11..=15, cluster 2: pids 21..=22.
    /// Scores fall with pid inside each cluster.
    fn index() -> ClusterIndex {
        let artifact: ClusterArtifact = serde_json::from_str(
            r#"{
                "dimension": 1,
                "clusters": {
                    "0": {"centroid": [0.0], "members": [1, 2, 3, 4, 5]},
                    "1": {"centroid": [5.0], "members": [11, 12, 13, 14, 15]},
                    "2": {"centroid": [9.0], "members": [21, 22]}
                },
                "scores": {
                    "1": 9.5, "2": 9.0, "3": 8.5, "4": 8.0, "5": 7.5,
                    "11": 6.5, "12": 6.0, "13": 5.5, "14": 5.0, "15": 4.5,
                    "21": 9.9, "22": 1.0
                }
            }"#,
        )
        .unwrap();
        ClusterIndex::from_artifact(artifact, Path::new("test.json")).unwrap()
    }

    fn profile(affinity: &[(ClusterLabel, u64)], seen: &[Pid]) -> UserProfile {
        let mut profile = UserProfile::new("alice");
        profile.affinity = affinity.iter().copied().collect();
        profile.seen = seen.iter().copied().collect();
        profile
    }

    fn count_from(recs: &[Recommendation], label: ClusterLabel) -> usize {
        recs.iter()
            .filter(|r| r.cluster_label == label && r.source == RecommendationSource::Affinity)
            .count()
    }

    #[test]
    fn test_zero_request_is_empty() {
        let recs = GenerateRecommendations::execute(&profile(&[(0, 3)], &[]), &index(), 0);
        assert!(recs.is_empty());
    }

    #[test]
    fn test_proportional_split() {
        let recs = GenerateRecommendations::execute(&profile(&[(0, 3), (1, 1)], &[]), &index(), 4);

        assert_eq!(count_from(&recs, 0), 3);
        assert_eq!(count_from(&recs, 1), 1);
        // Members are served in rank order
        let from_zero: Vec<Pid> = recs
            .iter()
            .filter(|r| r.cluster_label == 0)
            .map(|r| r.pid)
            .collect();
        assert_eq!(from_zero, vec![1, 2, 3]);
    }

    #[test]
    fn test_equal_affinity_tie_breaks_to_lower_label() {
        let recs = GenerateRecommendations::execute(&profile(&[(0, 1), (1, 1)], &[]), &index(), 1);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].cluster_label, 0);
    }

    #[test]
    fn test_exhausted_cluster_quota_moves_to_strongest() {
        // Cluster 2 has a single unseen member; its share flows to cluster 1
        let recs = GenerateRecommendations::execute(
            &profile(&[(1, 1), (2, 1)], &[22]),
            &index(),
            6,
        );

        assert_eq!(recs.len(), 6);
        assert_eq!(count_from(&recs, 2), 1);
        assert_eq!(count_from(&recs, 1), 5);
        assert!(recs.iter().all(|r| r.source == RecommendationSource::Affinity));
    }

    #[test]
    fn test_leftover_quota_goes_to_highest_affinity() {
        let artifact: ClusterArtifact = serde_json::from_str(
            r#"{
                "dimension": 1,
                "clusters": {
                    "0": {"centroid": [0.0], "members": [1]},
                    "1": {"centroid": [5.0], "members": [11, 12, 13, 14, 15, 16]},
                    "2": {"centroid": [9.0], "members": [21, 22, 23, 24, 25, 26]}
                }
            }"#,
        )
        .unwrap();
        let index = ClusterIndex::from_artifact(artifact, Path::new("test.json")).unwrap();

        // Quotas 4 / 1 / 3 of 8; cluster 0 runs dry after one pick
        let recs = GenerateRecommendations::execute(
            &profile(&[(0, 4), (1, 1), (2, 3)], &[]),
            &index,
            8,
        );

        assert_eq!(recs.len(), 8);
        assert_eq!(count_from(&recs, 0), 1);
        assert_eq!(count_from(&recs, 2), 6);
        assert_eq!(count_from(&recs, 1), 1);
    }

    #[test]
    fn test_global_fill_after_affinity_exhausted() {
        let recs = GenerateRecommendations::execute(&profile(&[(2, 4)], &[]), &index(), 5);

        assert_eq!(recs.len(), 5);
        assert_eq!(recs[0].pid, 21);
        assert_eq!(recs[1].pid, 22);
        // Remaining slots follow the global score order
        let popular: Vec<Pid> = recs[2..].iter().map(|r| r.pid).collect();
        assert_eq!(popular, vec![1, 2, 3]);
        assert!(recs[2..]
            .iter()
            .all(|r| r.source == RecommendationSource::Popular));
    }

    #[test]
    fn test_unknown_affinity_labels_are_ignored() {
        let recs = GenerateRecommendations::execute(&profile(&[(42, 10)], &[21]), &index(), 2);
        assert_eq!(
            recs.iter().map(|r| r.pid).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_never_repeats_or_returns_seen() {
        let seen = [1, 11, 21];
        let recs = GenerateRecommendations::execute(
            &profile(&[(0, 2), (1, 1), (2, 5)], &seen),
            &index(),
            50,
        );

        let pids: HashSet<Pid> = recs.iter().map(|r| r.pid).collect();
        assert_eq!(pids.len(), recs.len());
        assert_eq!(recs.len(), 12 - seen.len());
        assert!(seen.iter().all(|pid| !pids.contains(pid)));
    }

    #[test]
    fn test_deterministic() {
        let p = profile(&[(0, 2), (1, 3)], &[2]);
        let first = GenerateRecommendations::execute(&p, &index(), 7);
        for _ in 0..5 {
            assert_eq!(GenerateRecommendations::execute(&p, &index(), 7), first);
        }
    }

    #[tokio::test]
    async fn test_engine_username_validation() {
        let engine = RecommendationEngine::new(
            Arc::new(crate::store::FileAffinityStore::in_memory()),
            Arc::new(index()),
        );
        assert!(matches!(
            engine.create_user("   ").await,
            Err(RecommenderError::InvalidInput(_))
        ));

        let created = engine.create_user("  bob ").await.unwrap();
        assert_eq!(created.username, "bob");
        assert_eq!(engine.get_user("bob").await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_engine_clamps_to_max() {
        let engine = RecommendationEngine::new(
            Arc::new(crate::store::FileAffinityStore::in_memory()),
            Arc::new(index()),
        )
        .with_max_recommendations(3);
        engine.create_user("carol").await.unwrap();

        let recs = engine.get_recommendations("carol", 50).await.unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(engine.similar_videos(1, 50), vec![2, 3, 4]);
    }
}

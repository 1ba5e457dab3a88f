//! Cold Start Handling
//!
//! Popularity fallback for users without usable cluster affinity: new users,
//! users whose affinity clusters are exhausted, and deployments where no
//! cluster artifact is available.

use crate::clustering::ClusterIndex;
use crate::types::{Pid, Recommendation, RecommendationSource};
use std::collections::{BTreeSet, HashSet};

/// Fill up to `limit` items from the global ranking.
///
/// Steps:
/// 1. Walk every clustered pid, best score first
/// 2. Skip pids the user has seen or that are already picked
/// 3. Stop once `limit` items are collected
pub struct HandleColdStartUser;

impl HandleColdStartUser {
    pub fn execute(
        index: &ClusterIndex,
        seen: &BTreeSet<Pid>,
        picked: &mut HashSet<Pid>,
        limit: usize,
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();
        if limit == 0 {
            return recommendations;
        }

        for &(pid, cluster_label) in index.global_ranking() {
            if seen.contains(&pid) || !picked.insert(pid) {
                continue;
            }

            recommendations.push(Recommendation {
                pid,
                cluster_label,
                source: RecommendationSource::Popular,
            });
            if recommendations.len() == limit {
                break;
            }
        }

        recommendations
    }
}

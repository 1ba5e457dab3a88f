//! Cluster Model
//!
//! Offline DBSCAN over the reduced training matrix, followed by the per-cluster
//! summaries served online: a centroid and a member list ranked by an
//! externally supplied popularity score. Noise points get [`NOISE_LABEL`] and
//! never become part of any cluster profile.

use crate::error::{RecommenderError, Result};
use crate::persist;
use crate::types::{is_noise, ClusterLabel, Pid, NOISE_LABEL};
use linfa::traits::Transformer;
use linfa::DatasetBase;
use linfa_clustering::Dbscan as LinfaDbscan;
use ndarray::{ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Density-based clustering with noise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dbscan {
    /// Maximum distance between two neighbours
    pub eps: f64,
    /// Neighbourhood size (including the point itself) that makes a core point
    pub min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }

    /// Label every row; clusters are numbered from 0 in discovery order
    pub fn fit(&self, x: ArrayView2<f64>) -> Result<Vec<ClusterLabel>> {
        if !(self.eps > 0.0) {
            return Err(RecommenderError::Fit(format!("eps must be > 0, got {}", self.eps)));
        }
        if self.min_samples < 2 {
            return Err(RecommenderError::Fit(format!(
                "min_samples must be >= 2, got {}",
                self.min_samples
            )));
        }

        let dataset = DatasetBase::from(x.to_owned());
        let clustered = LinfaDbscan::params(self.min_samples)
            .tolerance(self.eps)
            .transform(dataset)
            .map_err(|e| RecommenderError::Fit(format!("DBSCAN failed: {e}")))?;

        let labels: Vec<ClusterLabel> = clustered
            .targets
            .iter()
            .map(|membership| match membership {
                Some(cluster) => *cluster as ClusterLabel,
                None => NOISE_LABEL,
            })
            .collect();

        let clusters: HashSet<ClusterLabel> =
            labels.iter().copied().filter(|l| !is_noise(*l)).collect();
        let noise = labels.iter().filter(|l| is_noise(**l)).count();
        tracing::info!(
            "DBSCAN(eps={}, min_samples={}) found {} clusters, {} noise points of {}",
            self.eps,
            self.min_samples,
            clusters.len(),
            noise,
            labels.len()
        );

        Ok(labels)
    }
}

pub(crate) fn euclidean(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// One dense region, as served online
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    #[serde(skip)]
    pub label: ClusterLabel,
    pub centroid: Vec<f64>,
    /// Ranked by descending score, ties by ascending pid
    pub members: Vec<Pid>,
}

/// Persisted cluster artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterArtifact {
    /// Reduced dimension `k` shared by every centroid
    #[serde(default)]
    pub dimension: usize,
    #[serde(default)]
    pub clusters: BTreeMap<ClusterLabel, ClusterProfile>,
    /// Popularity score per pid, supplied by the offline scorer
    #[serde(default)]
    pub scores: HashMap<Pid, f32>,
}

/// Serving-time view of the cluster artifact
#[derive(Debug, Clone, Default)]
pub struct ClusterIndex {
    dimension: usize,
    clusters: BTreeMap<ClusterLabel, ClusterProfile>,
    scores: HashMap<Pid, f32>,
    pid_to_cluster: HashMap<Pid, ClusterLabel>,
    global: Vec<(Pid, ClusterLabel)>,
}

fn rank_members(members: &mut [Pid], scores: &HashMap<Pid, f32>) {
    members.sort_by(|a, b| {
        let sa = scores.get(a).copied().unwrap_or(0.0);
        let sb = scores.get(b).copied().unwrap_or(0.0);
        sb.total_cmp(&sa).then(a.cmp(b))
    });
}

impl ClusterIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Summarize a labeled training set.
    ///
    /// `reduced` holds one row per pid in `pids` order.
    pub fn build(
        pids: &[Pid],
        reduced: ArrayView2<f64>,
        labels: &[ClusterLabel],
        scores: HashMap<Pid, f32>,
    ) -> Result<Self> {
        if pids.len() != reduced.nrows() || pids.len() != labels.len() {
            return Err(RecommenderError::DimensionMismatch {
                expected: pids.len(),
                actual: reduced.nrows().min(labels.len()),
            });
        }

        let mut seen = HashSet::with_capacity(pids.len());
        if let Some(dup) = pids.iter().find(|p| !seen.insert(**p)) {
            return Err(RecommenderError::InvalidInput(format!("duplicate pid {dup}")));
        }

        let dimension = reduced.ncols();
        let mut grouped: BTreeMap<ClusterLabel, Vec<usize>> = BTreeMap::new();
        for (row, &label) in labels.iter().enumerate() {
            if !is_noise(label) {
                grouped.entry(label).or_default().push(row);
            }
        }

        let mut clusters = BTreeMap::new();
        for (label, rows) in grouped {
            let member_rows = reduced.select(Axis(0), &rows);
            let centroid = member_rows
                .mean_axis(Axis(0))
                .map(|c| c.to_vec())
                .unwrap_or_else(|| vec![0.0; dimension]);

            let mut members: Vec<Pid> = rows.iter().map(|&r| pids[r]).collect();
            rank_members(&mut members, &scores);

            clusters.insert(
                label,
                ClusterProfile {
                    label,
                    centroid,
                    members,
                },
            );
        }

        Ok(Self::from_parts(dimension, clusters, scores))
    }

    fn from_parts(
        dimension: usize,
        clusters: BTreeMap<ClusterLabel, ClusterProfile>,
        scores: HashMap<Pid, f32>,
    ) -> Self {
        let mut pid_to_cluster = HashMap::new();
        let mut positioned: Vec<(Pid, ClusterLabel, usize)> = Vec::new();

        for (label, profile) in &clusters {
            for (position, pid) in profile.members.iter().enumerate() {
                pid_to_cluster.insert(*pid, *label);
                positioned.push((*pid, *label, position));
            }
        }

        positioned.sort_by(|a, b| {
            let sa = scores.get(&a.0).copied().unwrap_or(0.0);
            let sb = scores.get(&b.0).copied().unwrap_or(0.0);
            sb.total_cmp(&sa)
                .then(a.2.cmp(&b.2))
                .then(a.0.cmp(&b.0))
        });

        Self {
            dimension,
            clusters,
            scores,
            pid_to_cluster,
            global: positioned.into_iter().map(|(pid, label, _)| (pid, label)).collect(),
        }
    }

    /// Validate and index a persisted artifact
    pub fn from_artifact(artifact: ClusterArtifact, source: &Path) -> Result<Self> {
        let mut clusters = BTreeMap::new();
        let mut owners: HashMap<Pid, ClusterLabel> = HashMap::new();
        let dimension = artifact.dimension;

        for (label, mut profile) in artifact.clusters {
            if is_noise(label) {
                tracing::warn!(
                    "Dropping {} members under noise label {} from {}",
                    profile.members.len(),
                    label,
                    source.display()
                );
                continue;
            }
            if profile.centroid.len() != dimension {
                return Err(RecommenderError::corrupt(
                    source,
                    format!(
                        "cluster {label} centroid has {} entries, expected {dimension}",
                        profile.centroid.len()
                    ),
                ));
            }
            for pid in &profile.members {
                if let Some(other) = owners.insert(*pid, label) {
                    return Err(RecommenderError::corrupt(
                        source,
                        format!("pid {pid} listed in clusters {other} and {label}"),
                    ));
                }
            }
            profile.label = label;
            clusters.insert(label, profile);
        }

        Ok(Self::from_parts(dimension, clusters, artifact.scores))
    }

    pub fn to_artifact(&self) -> ClusterArtifact {
        ClusterArtifact {
            dimension: self.dimension,
            clusters: self.clusters.clone(),
            scores: self.scores.clone(),
        }
    }

    /// Load from disk; a missing file yields an empty index
    pub fn load(path: &Path) -> Result<Self> {
        match persist::read_json::<ClusterArtifact>(path)? {
            Some(artifact) => {
                let index = Self::from_artifact(artifact, path)?;
                tracing::info!(
                    "Loaded {} clusters ({} videos) from {}",
                    index.len(),
                    index.pid_to_cluster.len(),
                    path.display()
                );
                Ok(index)
            }
            None => {
                tracing::info!(
                    "No cluster artifact at {}, serving without clusters",
                    path.display()
                );
                Ok(Self::empty())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_json(path, &self.to_artifact())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = ClusterLabel> + '_ {
        self.clusters.keys().copied()
    }

    pub fn get(&self, label: ClusterLabel) -> Option<&ClusterProfile> {
        self.clusters.get(&label)
    }

    pub fn contains(&self, label: ClusterLabel) -> bool {
        self.clusters.contains_key(&label)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &ClusterProfile> {
        self.clusters.values()
    }

    pub fn cluster_of(&self, pid: Pid) -> Option<ClusterLabel> {
        self.pid_to_cluster.get(&pid).copied()
    }

    pub fn score(&self, pid: Pid) -> f32 {
        self.scores.get(&pid).copied().unwrap_or(0.0)
    }

    /// Every clustered pid, best first
    pub fn global_ranking(&self) -> &[(Pid, ClusterLabel)] {
        &self.global
    }

    /// Up to `n` other members of `pid`'s cluster in rank order
    pub fn similar(&self, pid: Pid, n: usize) -> Vec<Pid> {
        self.cluster_of(pid)
            .and_then(|label| self.clusters.get(&label))
            .map(|profile| {
                profile
                    .members
                    .iter()
                    .copied()
                    .filter(|p| *p != pid)
                    .take(n)
                    .collect()
            })
            .unwrap_or_default()
    }
}

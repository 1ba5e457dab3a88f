//! Shared domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Video identifier
pub type Pid = u64;

/// Cluster identifier in reduced feature space
pub type ClusterLabel = i32;

/// Label reserved for points outside every dense region
pub const NOISE_LABEL: ClusterLabel = -1;

pub fn is_noise(label: ClusterLabel) -> bool {
    label < 0
}

/// Raw attribute value of a video record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "text",
        }
    }

    /// Text form used for categorical encoding
    pub fn as_category(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

/// Raw video record as ingested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub pid: Pid,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl VideoRecord {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Training corpus row: a record plus its externally supplied popularity score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRecord {
    #[serde(flatten)]
    pub record: VideoRecord,
    #[serde(default)]
    pub score: f32,
}

/// Per-user durable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub seen: BTreeSet<Pid>,
    #[serde(default)]
    pub liked: BTreeSet<Pid>,
    #[serde(default)]
    pub affinity: BTreeMap<ClusterLabel, u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_interaction_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            seen: BTreeSet::new(),
            liked: BTreeSet::new(),
            affinity: BTreeMap::new(),
            created_at: Utc::now(),
            last_interaction_at: None,
        }
    }

    /// Fold an interaction into the profile.
    ///
    /// `affinity_label` is `None` when the interaction carries no cluster signal.
    pub fn apply(&mut self, event: &InteractionEvent, affinity_label: Option<ClusterLabel>) {
        if let Some(label) = affinity_label {
            *self.affinity.entry(label).or_insert(0) += 1;
        }
        self.seen.insert(event.pid);
        self.liked.insert(event.pid);
        self.last_interaction_at = Some(event.occurred_at);
    }

    pub fn total_affinity(&self) -> u64 {
        self.affinity.values().sum()
    }
}

/// A user engaging with a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub username: String,
    pub pid: Pid,
    pub cluster_label: ClusterLabel,
    pub occurred_at: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn now(username: impl Into<String>, pid: Pid, cluster_label: ClusterLabel) -> Self {
        Self {
            username: username.into(),
            pid,
            cluster_label,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Drawn from a cluster the user engaged with
    Affinity,
    /// Drawn from the global popularity ranking
    Popular,
}

/// Recommended item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub pid: Pid,
    pub cluster_label: ClusterLabel,
    pub source: RecommendationSource,
}

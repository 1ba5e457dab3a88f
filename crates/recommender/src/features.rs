//! Feature Transformer
//!
//! Maps raw video records to fixed-length numeric vectors. Each stage is fit
//! once on the training corpus and then applied deterministically; stages are
//! composed in declaration order by [`FeaturePipeline`].
//!
//! Unseen values never fail a transform: rare or unseen categories fall into
//! a reserved bucket and out-of-vocabulary labels get [`UNKNOWN_CODE`]. Only a
//! structurally absent or wrongly typed field is a `SchemaError`.

use crate::error::{RecommenderError, Result};
use crate::types::{FieldValue, VideoRecord};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Code assigned to label values outside the fit-time vocabulary
pub const UNKNOWN_CODE: f64 = -1.0;

/// Default minimum support for a category to keep its own bucket
pub const DEFAULT_FREQUENCY_THRESHOLD: usize = 40;

/// Shared fit/transform contract for every pipeline stage
pub trait Transformer {
    fn name(&self) -> &'static str;

    /// Learn stage parameters from the training corpus
    fn fit(&mut self, records: &[VideoRecord]) -> Result<()>;

    /// Number of columns this stage appends
    fn output_dim(&self) -> usize;

    /// Append this stage's columns for `record` to `out`
    fn transform_into(&self, record: &VideoRecord, out: &mut Vec<f64>) -> Result<()>;
}

fn field<'a>(record: &'a VideoRecord, name: &str) -> Result<&'a FieldValue> {
    record
        .fields
        .get(name)
        .ok_or_else(|| RecommenderError::schema(name, format!("missing on pid {}", record.pid)))
}

fn not_fitted(stage: &str) -> RecommenderError {
    RecommenderError::Fit(format!("{stage} used before fit"))
}

/// Boolean field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanField {
    pub name: String,
    /// Text value that encodes as 1; any other text encodes as 0
    #[serde(default)]
    pub true_token: Option<String>,
}

impl BooleanField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            true_token: None,
        }
    }

    pub fn with_true_token(mut self, token: impl Into<String>) -> Self {
        self.true_token = Some(token.into());
        self
    }
}

/// Boolean fields → 0/1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanEncoder {
    fields: Vec<BooleanField>,
}

impl BooleanEncoder {
    pub fn new(fields: Vec<BooleanField>) -> Self {
        Self { fields }
    }

    fn encode(column: &BooleanField, value: &FieldValue) -> Result<f64> {
        match value {
            FieldValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            FieldValue::Number(n) if *n == 0.0 || *n == 1.0 => Ok(*n),
            FieldValue::Text(text) => match &column.true_token {
                Some(token) => Ok(if text == token { 1.0 } else { 0.0 }),
                None => Err(RecommenderError::schema(
                    &column.name,
                    format!("expected bool, got text '{text}'"),
                )),
            },
            other => Err(RecommenderError::schema(
                &column.name,
                format!("expected bool, got {}", other.kind()),
            )),
        }
    }
}

impl Transformer for BooleanEncoder {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn fit(&mut self, records: &[VideoRecord]) -> Result<()> {
        // Stateless, but validate the corpus so a bad column fails at fit time.
        for record in records {
            for column in &self.fields {
                Self::encode(column, field(record, &column.name)?)?;
            }
        }
        Ok(())
    }

    fn output_dim(&self) -> usize {
        self.fields.len()
    }

    fn transform_into(&self, record: &VideoRecord, out: &mut Vec<f64>) -> Result<()> {
        for column in &self.fields {
            out.push(Self::encode(column, field(record, &column.name)?)?);
        }
        Ok(())
    }
}

/// Categorical fields → one-hot over frequent categories plus a rare bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyMapper {
    threshold: usize,
    fields: Vec<String>,
    /// Per field, categories with support ≥ threshold, by descending count
    common: Vec<Vec<String>>,
    fitted: bool,
}

impl FrequencyMapper {
    pub fn new(fields: Vec<String>, threshold: usize) -> Self {
        Self {
            threshold,
            fields,
            common: Vec::new(),
            fitted: false,
        }
    }

    pub fn common_categories(&self, field_name: &str) -> Option<&[String]> {
        let idx = self.fields.iter().position(|f| f == field_name)?;
        self.common.get(idx).map(|c| c.as_slice())
    }
}

impl Transformer for FrequencyMapper {
    fn name(&self) -> &'static str {
        "frequency"
    }

    fn fit(&mut self, records: &[VideoRecord]) -> Result<()> {
        let mut common = Vec::with_capacity(self.fields.len());

        for name in &self.fields {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for record in records {
                *counts
                    .entry(field(record, name)?.as_category())
                    .or_insert(0) += 1;
            }

            let mut frequent: Vec<(String, usize)> = counts
                .into_iter()
                .filter(|(_, count)| *count >= self.threshold)
                .collect();
            frequent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            common.push(frequent.into_iter().map(|(category, _)| category).collect());
        }

        self.common = common;
        self.fitted = true;
        Ok(())
    }

    fn output_dim(&self) -> usize {
        self.common.iter().map(|c| c.len() + 1).sum()
    }

    fn transform_into(&self, record: &VideoRecord, out: &mut Vec<f64>) -> Result<()> {
        if !self.fitted {
            return Err(not_fitted(self.name()));
        }

        for (name, categories) in self.fields.iter().zip(&self.common) {
            let value = field(record, name)?.as_category();
            let hot = categories
                .iter()
                .position(|c| *c == value)
                .unwrap_or(categories.len());

            out.extend((0..=categories.len()).map(|i| if i == hot { 1.0 } else { 0.0 }));
        }
        Ok(())
    }
}

/// Skewed numeric fields → sign(x) * ln(1 + |x|)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedLogTransform {
    fields: Vec<String>,
}

impl SignedLogTransform {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn apply(x: f64) -> f64 {
        x.signum() * x.abs().ln_1p()
    }

    fn number(record: &VideoRecord, name: &str) -> Result<f64> {
        match field(record, name)? {
            FieldValue::Number(n) if n.is_finite() => Ok(*n),
            FieldValue::Number(_) => Err(RecommenderError::schema(name, "non-finite number")),
            other => Err(RecommenderError::schema(
                name,
                format!("expected number, got {}", other.kind()),
            )),
        }
    }
}

impl Transformer for SignedLogTransform {
    fn name(&self) -> &'static str {
        "signed_log"
    }

    fn fit(&mut self, records: &[VideoRecord]) -> Result<()> {
        for record in records {
            for name in &self.fields {
                Self::number(record, name)?;
            }
        }
        Ok(())
    }

    fn output_dim(&self) -> usize {
        self.fields.len()
    }

    fn transform_into(&self, record: &VideoRecord, out: &mut Vec<f64>) -> Result<()> {
        for name in &self.fields {
            out.push(Self::apply(Self::number(record, name)?));
        }
        Ok(())
    }
}

/// Categorical fields → index in a sorted fit-time vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    fields: Vec<String>,
    vocabularies: Vec<Vec<String>>,
    fitted: bool,
}

impl LabelEncoder {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            vocabularies: Vec::new(),
            fitted: false,
        }
    }
}

impl Transformer for LabelEncoder {
    fn name(&self) -> &'static str {
        "label"
    }

    fn fit(&mut self, records: &[VideoRecord]) -> Result<()> {
        let mut vocabularies = Vec::with_capacity(self.fields.len());

        for name in &self.fields {
            let mut vocab = records
                .iter()
                .map(|r| field(r, name).map(FieldValue::as_category))
                .collect::<Result<Vec<_>>>()?;
            vocab.sort();
            vocab.dedup();
            vocabularies.push(vocab);
        }

        self.vocabularies = vocabularies;
        self.fitted = true;
        Ok(())
    }

    fn output_dim(&self) -> usize {
        self.fields.len()
    }

    fn transform_into(&self, record: &VideoRecord, out: &mut Vec<f64>) -> Result<()> {
        if !self.fitted {
            return Err(not_fitted(self.name()));
        }

        for (name, vocab) in self.fields.iter().zip(&self.vocabularies) {
            let value = field(record, name)?.as_category();
            let code = vocab
                .binary_search(&value)
                .map(|i| i as f64)
                .unwrap_or(UNKNOWN_CODE);
            out.push(code);
        }
        Ok(())
    }
}

/// Serializable stage; dispatches to the concrete transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureStage {
    Boolean(BooleanEncoder),
    Frequency(FrequencyMapper),
    SignedLog(SignedLogTransform),
    Label(LabelEncoder),
}

impl FeatureStage {
    fn inner(&self) -> &dyn Transformer {
        match self {
            FeatureStage::Boolean(t) => t,
            FeatureStage::Frequency(t) => t,
            FeatureStage::SignedLog(t) => t,
            FeatureStage::Label(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Transformer {
        match self {
            FeatureStage::Boolean(t) => t,
            FeatureStage::Frequency(t) => t,
            FeatureStage::SignedLog(t) => t,
            FeatureStage::Label(t) => t,
        }
    }
}

impl Transformer for FeatureStage {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn fit(&mut self, records: &[VideoRecord]) -> Result<()> {
        self.inner_mut().fit(records)
    }

    fn output_dim(&self) -> usize {
        self.inner().output_dim()
    }

    fn transform_into(&self, record: &VideoRecord, out: &mut Vec<f64>) -> Result<()> {
        self.inner().transform_into(record, out)
    }
}

/// Which raw fields feed which stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    #[serde(default)]
    pub boolean: Vec<BooleanField>,
    #[serde(default)]
    pub frequency: Vec<String>,
    #[serde(default)]
    pub signed_log: Vec<String>,
    #[serde(default)]
    pub label: Vec<String>,
}

impl FeatureSchema {
    pub fn is_empty(&self) -> bool {
        self.boolean.is_empty()
            && self.frequency.is_empty()
            && self.signed_log.is_empty()
            && self.label.is_empty()
    }
}

/// Ordered composition of fitted stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    stages: Vec<FeatureStage>,
    fitted: bool,
}

impl FeaturePipeline {
    pub fn new(stages: Vec<FeatureStage>) -> Self {
        Self {
            stages,
            fitted: false,
        }
    }

    /// Standard stage order: boolean, frequency, signed-log, label
    pub fn from_schema(schema: &FeatureSchema, frequency_threshold: usize) -> Self {
        let mut stages = Vec::new();
        if !schema.boolean.is_empty() {
            stages.push(FeatureStage::Boolean(BooleanEncoder::new(
                schema.boolean.clone(),
            )));
        }
        if !schema.frequency.is_empty() {
            stages.push(FeatureStage::Frequency(FrequencyMapper::new(
                schema.frequency.clone(),
                frequency_threshold,
            )));
        }
        if !schema.signed_log.is_empty() {
            stages.push(FeatureStage::SignedLog(SignedLogTransform::new(
                schema.signed_log.clone(),
            )));
        }
        if !schema.label.is_empty() {
            stages.push(FeatureStage::Label(LabelEncoder::new(schema.label.clone())));
        }
        Self::new(stages)
    }

    pub fn stages(&self) -> &[FeatureStage] {
        &self.stages
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn fit(&mut self, records: &[VideoRecord]) -> Result<()> {
        if self.stages.is_empty() {
            return Err(RecommenderError::Fit("feature pipeline has no stages".into()));
        }
        if records.is_empty() {
            return Err(RecommenderError::Fit("empty training corpus".into()));
        }

        for stage in &mut self.stages {
            stage.fit(records)?;
        }
        self.fitted = true;

        tracing::info!(
            "Fitted feature pipeline: {} stages, output dimension {}",
            self.stages.len(),
            self.output_dim()
        );
        Ok(())
    }

    /// Output dimension `D`
    pub fn output_dim(&self) -> usize {
        self.stages.iter().map(Transformer::output_dim).sum()
    }

    pub fn transform(&self, record: &VideoRecord) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(not_fitted("feature pipeline"));
        }

        let mut out = Vec::with_capacity(self.output_dim());
        for stage in &self.stages {
            stage.transform_into(record, &mut out)?;
        }
        Ok(out)
    }

    /// Transform a batch into an `[n, D]` matrix
    pub fn transform_batch(&self, records: &[VideoRecord]) -> Result<Array2<f64>> {
        let dim = self.output_dim();
        let mut data = Vec::with_capacity(records.len() * dim);
        for record in records {
            data.extend(self.transform(record)?);
        }

        Array2::from_shape_vec((records.len(), dim), data)
            .map_err(|e| RecommenderError::Fit(format!("feature matrix shape: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u64, category: &str) -> VideoRecord {
        VideoRecord::new(pid).with_field("category", FieldValue::Text(category.into()))
    }

    #[test]
    fn test_gender_style_boolean() {
        let encoder = BooleanEncoder::new(vec![BooleanField::new("gender").with_true_token("F")]);
        let mut out = Vec::new();

        encoder
            .transform_into(
                &VideoRecord::new(1).with_field("gender", FieldValue::Text("F".into())),
                &mut out,
            )
            .unwrap();
        encoder
            .transform_into(
                &VideoRecord::new(2).with_field("gender", FieldValue::Text("M".into())),
                &mut out,
            )
            .unwrap();

        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    fn test_boolean_rejects_wrong_type() {
        let encoder = BooleanEncoder::new(vec![BooleanField::new("is_ad")]);
        let mut out = Vec::new();
        let err = encoder
            .transform_into(
                &VideoRecord::new(1).with_field("is_ad", FieldValue::Number(0.5)),
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(err, RecommenderError::Schema { .. }));
    }

    #[test]
    fn test_frequency_mapper_buckets_rare_and_unseen() {
        let mut records: Vec<_> = (0..3).map(|i| record(i, "music")).collect();
        records.push(record(3, "cooking"));

        let mut mapper = FrequencyMapper::new(vec!["category".into()], 2);
        mapper.fit(&records).unwrap();

        assert_eq!(mapper.common_categories("category").unwrap(), ["music"]);
        assert_eq!(mapper.output_dim(), 2);

        let mut out = Vec::new();
        mapper.transform_into(&record(10, "music"), &mut out).unwrap();
        mapper.transform_into(&record(11, "cooking"), &mut out).unwrap();
        mapper.transform_into(&record(12, "never-seen"), &mut out).unwrap();

        assert_eq!(out, vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_signed_log() {
        assert_eq!(SignedLogTransform::apply(0.0), 0.0);
        assert!((SignedLogTransform::apply(std::f64::consts::E - 1.0) - 1.0).abs() < 1e-12);
        assert!((SignedLogTransform::apply(-(std::f64::consts::E - 1.0)) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_label_encoder_unknown_code() {
        let records = vec![record(1, "b"), record(2, "a"), record(3, "b")];
        let mut encoder = LabelEncoder::new(vec!["category".into()]);
        encoder.fit(&records).unwrap();

        let mut out = Vec::new();
        encoder.transform_into(&record(4, "a"), &mut out).unwrap();
        encoder.transform_into(&record(5, "b"), &mut out).unwrap();
        encoder.transform_into(&record(6, "zzz"), &mut out).unwrap();

        assert_eq!(out, vec![0.0, 1.0, UNKNOWN_CODE]);
    }

    #[test]
    fn test_pipeline_missing_field_is_schema_error() {
        let schema = FeatureSchema {
            label: vec!["category".into()],
            signed_log: vec!["views".into()],
            ..Default::default()
        };
        let mut pipeline = FeaturePipeline::from_schema(&schema, 1);
        let train = vec![record(1, "a").with_field("views", FieldValue::Number(10.0))];
        pipeline.fit(&train).unwrap();

        assert_eq!(pipeline.output_dim(), 2);

        let err = pipeline.transform(&record(2, "a")).unwrap_err();
        assert!(matches!(err, RecommenderError::Schema { ref field, .. } if field == "views"));
    }

    #[test]
    fn test_pipeline_requires_fit() {
        let schema = FeatureSchema {
            label: vec!["category".into()],
            ..Default::default()
        };
        let pipeline = FeaturePipeline::from_schema(&schema, 1);
        assert!(pipeline.transform(&record(1, "a")).is_err());
    }
}

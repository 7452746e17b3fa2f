//! Document store contract used by the pipeline.
//!
//! `PgStore` in `db` is the production backend; `MemoryStore` keeps everything
//! in process. The store is the only shared mutable state in the pipeline.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{NewSymptomReport, NewWaterReport, Prediction, SymptomReport, WaterReport};

/// Which water-report field a location lookup runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKey {
    Location,
    /// Older submissions carried the place name under `village`.
    Village,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Intake ──

    async fn insert_symptom_report(&self, report: NewSymptomReport) -> Result<SymptomReport>;
    async fn insert_water_report(&self, report: NewWaterReport) -> Result<WaterReport>;
    async fn insert_raw_report(&self, payload: &serde_json::Value) -> Result<Uuid>;

    // ── Symptom reports ──

    async fn symptom_report(&self, id: Uuid) -> Result<Option<SymptomReport>>;

    /// Unprocessed reports, newest first, optionally restricted to one location.
    async fn unprocessed_symptom_reports(
        &self,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SymptomReport>>;

    /// Marks a report processed only if it is still unprocessed. Returns
    /// whether this call performed the transition.
    async fn mark_symptom_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    // ── Water reports ──

    /// Candidate water reports for a location, newest first.
    async fn water_reports_at(
        &self,
        key: LocationKey,
        location: &str,
        limit: usize,
    ) -> Result<Vec<WaterReport>>;

    async fn recent_water_reports(&self, limit: usize) -> Result<Vec<WaterReport>>;

    // ── Predictions (append-only) ──

    async fn insert_prediction(&self, prediction: &Prediction) -> Result<()>;
    async fn recent_predictions(&self, limit: usize) -> Result<Vec<Prediction>>;

    /// Prediction counts grouped by predicted disease. A `None` key groups
    /// rows without a label.
    async fn prediction_counts(&self) -> Result<Vec<(Option<String>, i64)>>;
}

#[derive(Default)]
struct MemoryInner {
    symptoms: Vec<SymptomReport>,
    water: Vec<WaterReport>,
    predictions: Vec<Prediction>,
    raw: Vec<(Uuid, serde_json::Value)>,
}

/// In-process store with the same ordering semantics as `PgStore`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn predictions(&self) -> Vec<Prediction> {
        self.inner.read().await.predictions.clone()
    }

    pub async fn raw_count(&self) -> usize {
        self.inner.read().await.raw.len()
    }

    pub async fn push_water_report(&self, report: WaterReport) {
        self.inner.write().await.water.push(report);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_symptom_report(&self, report: NewSymptomReport) -> Result<SymptomReport> {
        let stored = SymptomReport {
            id: Uuid::now_v7(),
            location: report.location,
            symptoms: report.symptoms,
            severity: report.severity,
            family_members_affected: report.family_members_affected,
            district: report.district,
            details: report.details,
            created_at: Utc::now(),
            processed_by_model: false,
            processed_at: None,
        };
        self.inner.write().await.symptoms.push(stored.clone());
        Ok(stored)
    }

    async fn insert_water_report(&self, report: NewWaterReport) -> Result<WaterReport> {
        let stored = WaterReport {
            id: Uuid::now_v7(),
            location: report.location,
            village: report.village,
            district: report.district,
            readings: report.readings,
            primary_water_source: report.primary_water_source,
            details: report.details,
            created_at: Utc::now(),
            submitted_at: report.submitted_at,
        };
        self.inner.write().await.water.push(stored.clone());
        Ok(stored)
    }

    async fn insert_raw_report(&self, payload: &serde_json::Value) -> Result<Uuid> {
        let id = Uuid::now_v7();
        self.inner.write().await.raw.push((id, payload.clone()));
        Ok(id)
    }

    async fn symptom_report(&self, id: Uuid) -> Result<Option<SymptomReport>> {
        let inner = self.inner.read().await;
        Ok(inner.symptoms.iter().find(|r| r.id == id).cloned())
    }

    async fn unprocessed_symptom_reports(
        &self,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SymptomReport>> {
        let inner = self.inner.read().await;
        let mut reports: Vec<SymptomReport> = inner
            .symptoms
            .iter()
            .filter(|r| !r.processed_by_model)
            .filter(|r| location.map_or(true, |loc| r.location.as_deref() == Some(loc)))
            .cloned()
            .collect();
        reports.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        reports.truncate(limit);
        Ok(reports)
    }

    async fn mark_symptom_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner
            .symptoms
            .iter_mut()
            .find(|r| r.id == id && !r.processed_by_model)
        {
            Some(report) => {
                report.processed_by_model = true;
                report.processed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn water_reports_at(
        &self,
        key: LocationKey,
        location: &str,
        limit: usize,
    ) -> Result<Vec<WaterReport>> {
        let inner = self.inner.read().await;
        let mut reports: Vec<WaterReport> = inner
            .water
            .iter()
            .filter(|r| {
                let field = match key {
                    LocationKey::Location => r.location.as_deref(),
                    LocationKey::Village => r.village.as_deref(),
                };
                field == Some(location)
            })
            .cloned()
            .collect();
        reports.sort_by(|a, b| {
            (b.submitted_at, b.created_at, b.id).cmp(&(a.submitted_at, a.created_at, a.id))
        });
        reports.truncate(limit);
        Ok(reports)
    }

    async fn recent_water_reports(&self, limit: usize) -> Result<Vec<WaterReport>> {
        let inner = self.inner.read().await;
        let mut reports = inner.water.clone();
        reports.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        reports.truncate(limit);
        Ok(reports)
    }

    async fn insert_prediction(&self, prediction: &Prediction) -> Result<()> {
        self.inner.write().await.predictions.push(prediction.clone());
        Ok(())
    }

    async fn recent_predictions(&self, limit: usize) -> Result<Vec<Prediction>> {
        let inner = self.inner.read().await;
        let mut predictions = inner.predictions.clone();
        predictions.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        predictions.truncate(limit);
        Ok(predictions)
    }

    async fn prediction_counts(&self) -> Result<Vec<(Option<String>, i64)>> {
        let inner = self.inner.read().await;
        let mut counts: std::collections::BTreeMap<String, i64> = std::collections::BTreeMap::new();
        for prediction in &inner.predictions {
            *counts.entry(prediction.predicted_disease.clone()).or_insert(0) += 1;
        }
        Ok(counts.into_iter().map(|(k, v)| (Some(k), v)).collect())
    }
}

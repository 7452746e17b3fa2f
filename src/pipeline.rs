//! Merge, predict and store.
//!
//! One pass for a symptom report runs resolve → encode → predict → persist →
//! mark-processed in order. No lock is held across the pass; concurrent
//! passes for the same report can both append a prediction, but only the
//! first one flips the report to processed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::features::{self, FeatureVector};
use crate::matcher;
use crate::models::{Prediction, PredictionInput, SymptomAttributes, SymptomReport, WaterAttributes};
use crate::predictor::Predictor;
use crate::store::Store;

#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// No water report at this location yet; retry later.
    NoCounterpart,
    Predicted(Prediction),
    /// A prediction was stored but another pass had already marked the
    /// report processed.
    Duplicate(Prediction),
}

impl ProcessOutcome {
    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            ProcessOutcome::NoCounterpart => None,
            ProcessOutcome::Predicted(p) | ProcessOutcome::Duplicate(p) => Some(p),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn Store>,
    predictor: Predictor,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, predictor: Predictor) -> Self {
        Self { store, predictor }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub async fn process(&self, report: &SymptomReport) -> Result<ProcessOutcome> {
        let Some(water) = matcher::find_counterpart(self.store.as_ref(), report).await? else {
            debug!(symptom_id = %report.id, "No water report for location yet");
            return Ok(ProcessOutcome::NoCounterpart);
        };

        let water_attributes = water.attributes();
        let symptom_attributes = report.attributes();
        let input = PredictionInput {
            location: report
                .location
                .clone()
                .or_else(|| water.location.clone())
                .or_else(|| water.village.clone()),
            symptoms: report.symptoms.clone(),
            water: water_attributes.clone(),
            merged_at: Utc::now(),
        };

        let features = features::encode(Some(&water_attributes), Some(&symptom_attributes));
        let label = self.predictor.predict_offloaded(features.clone()).await?;

        let prediction = Prediction {
            id: Uuid::now_v7(),
            location: input.location.clone(),
            timestamp: Utc::now(),
            input,
            features,
            predicted_disease: label,
            symptom_id: Some(report.id),
            water_id: Some(water.id),
        };
        self.store.insert_prediction(&prediction).await?;

        let first_pass = self
            .store
            .mark_symptom_processed(report.id, prediction.timestamp)
            .await?;
        if first_pass {
            info!(
                symptom_id = %report.id,
                water_id = %water.id,
                disease = %prediction.predicted_disease,
                "Stored prediction"
            );
            Ok(ProcessOutcome::Predicted(prediction))
        } else {
            warn!(
                symptom_id = %report.id,
                prediction_id = %prediction.id,
                "Symptom report was already processed; duplicate prediction appended"
            );
            Ok(ProcessOutcome::Duplicate(prediction))
        }
    }

    /// Like [`Pipeline::process`] but never fails: errors are logged and
    /// reported as "no prediction".
    pub async fn process_logged(&self, report: &SymptomReport) -> Option<ProcessOutcome> {
        match self.process(report).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(symptom_id = %report.id, error = %e, "Merge-predict-store failed");
                None
            }
        }
    }

    /// Synchronous prediction for a caller that supplies both halves directly.
    /// The prediction is stored without a symptom or water id.
    pub async fn predict_direct(
        &self,
        location: Option<String>,
        water: WaterAttributes,
        symptoms: SymptomAttributes,
    ) -> Result<Prediction> {
        let features: FeatureVector = features::encode(Some(&water), Some(&symptoms));
        let label = self.predictor.predict_offloaded(features.clone()).await?;
        let now = Utc::now();
        let prediction = Prediction {
            id: Uuid::now_v7(),
            location: location.clone(),
            timestamp: now,
            input: PredictionInput {
                location,
                symptoms: symptoms.symptoms,
                water,
                merged_at: now,
            },
            features,
            predicted_disease: label,
            symptom_id: None,
            water_id: None,
        };
        self.store.insert_prediction(&prediction).await?;
        Ok(prediction)
    }
}

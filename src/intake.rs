use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::dispatch;
use crate::error::{PipelineError, Result};
use crate::normalize;
use crate::pipeline::Pipeline;

#[derive(Debug, Default, Serialize)]
pub struct Receipt {
    pub symptom_id: Option<Uuid>,
    pub water_id: Option<Uuid>,
    pub raw_id: Option<Uuid>,
}

pub struct Submission {
    pub receipt: Receipt,
    /// Dispatch tasks fired by this submission.
    pub pending: Vec<JoinHandle<()>>,
}

impl Submission {
    pub async fn wait(self) -> Receipt {
        for handle in self.pending {
            // dispatch tasks log their own failures
            let _ = handle.await;
        }
        self.receipt
    }
}

/// Stores the symptom and/or water halves of a payload plus the raw payload,
/// then fires immediate dispatch for each stored half.
pub async fn submit(pipeline: &Pipeline, payload: &Value) -> Result<Submission> {
    let object = payload
        .as_object()
        .ok_or_else(|| PipelineError::InvalidPayload("payload must be a JSON object".to_string()))?;
    let split = normalize::split_payload(object);
    if split.patient.is_none() && split.water.is_none() {
        return Err(PipelineError::InvalidPayload(
            "payload carries neither symptom nor water fields".to_string(),
        ));
    }

    let now = Utc::now();
    let mut meta = split.meta;
    meta.entry("received_at")
        .or_insert_with(|| Value::String(now.to_rfc3339()));

    let store = pipeline.store();
    let mut receipt = Receipt::default();
    let mut pending = Vec::new();

    if let Some(patient) = split.patient {
        let report = normalize::symptom_report(&with_meta(patient, &meta));
        let stored = store.insert_symptom_report(report).await?;
        info!(symptom_id = %stored.id, location = ?stored.location, "Symptom report saved");
        receipt.symptom_id = Some(stored.id);
        pending.push(dispatch::on_symptom_saved(pipeline, stored.id));
    }

    if let Some(water) = split.water {
        let report = normalize::water_report(&with_meta(water, &meta));
        let stored = store.insert_water_report(report).await?;
        info!(water_id = %stored.id, location = ?stored.location, "Water report saved");
        receipt.water_id = Some(stored.id);
        if let Some(location) = stored.location.clone() {
            pending.push(dispatch::on_water_saved(pipeline, location));
        }
    }

    let raw = serde_json::json!({
        "payload": payload,
        "meta": { "received_at": now.to_rfc3339() },
    });
    receipt.raw_id = Some(store.insert_raw_report(&raw).await?);

    Ok(Submission { receipt, pending })
}

fn with_meta(mut doc: Map<String, Value>, meta: &Map<String, Value>) -> Map<String, Value> {
    doc.insert("meta".to_string(), Value::Object(meta.clone()));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::pipeline;
    use crate::store::{MemoryStore, Store};
    use serde_json::json;

    #[tokio::test]
    async fn symptom_without_water_stays_unprocessed() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        let payload = json!({
            "patient": { "location": "Village A", "symptoms": ["fever", "diarrhea"] }
        });

        let receipt = submit(&pipeline, &payload).await.unwrap().wait().await;
        let id = receipt.symptom_id.unwrap();
        assert!(receipt.water_id.is_none());
        assert!(receipt.raw_id.is_some());

        let stored = store.symptom_report(id).await.unwrap().unwrap();
        assert!(!stored.processed_by_model);
        assert!(store.predictions().await.is_empty());
        assert_eq!(store.raw_count().await, 1);
    }

    #[tokio::test]
    async fn symptom_after_water_is_predicted_in_one_dispatch() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        submit(
            &pipeline,
            &json!({ "water": { "location": "Village A", "pH": 6.0, "coliform": 120 } }),
        )
        .await
        .unwrap()
        .wait()
        .await;

        let receipt = submit(
            &pipeline,
            &json!({ "patient": { "location": "Village A", "symptoms": ["fever", "diarrhea"] } }),
        )
        .await
        .unwrap()
        .wait()
        .await;

        let predictions = store.predictions().await;
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].features.get("symptom_diarrhea"), Some(1.0));
        assert_eq!(predictions[0].features.get("symptom_fever"), Some(1.0));
        assert_eq!(predictions[0].features.get("ph"), Some(6.0));

        let stored = store
            .symptom_report(receipt.symptom_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.processed_by_model);
    }

    #[tokio::test]
    async fn flat_payload_stores_both_halves_with_meta() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        let payload = json!({
            "reporter_name": "Asha",
            "location": "Village C",
            "symptoms": "vomiting, nausea",
            "ph": "6.9",
            "water_source": "Pond water"
        });

        let receipt = submit(&pipeline, &payload).await.unwrap().wait().await;
        assert!(receipt.symptom_id.is_some());
        assert!(receipt.water_id.is_some());

        let water = store.recent_water_reports(1).await.unwrap();
        assert_eq!(water[0].readings.ph, Some(6.9));
        assert!(water[0].details["meta"]["received_at"].is_string());

        // both triggers may reach the same report; at least one prediction lands
        assert!(!store.predictions().await.is_empty());
        let stored = store
            .symptom_report(receipt.symptom_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.processed_by_model);
    }

    #[tokio::test]
    async fn rejects_payload_without_report_fields() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        let err = submit(&pipeline, &json!({ "note": "hi" })).await.err().unwrap();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
        let err = submit(&pipeline, &json!([1, 2])).await.err().unwrap();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
        assert_eq!(store.raw_count().await, 0);
    }

    #[tokio::test]
    async fn empty_nested_halves_are_ignored() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        let err = submit(&pipeline, &json!({ "patient": {} })).await.err().unwrap();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
        assert!(store
            .unprocessed_symptom_reports(None, 10)
            .await
            .unwrap()
            .is_empty());

        let receipt = submit(
            &pipeline,
            &json!({ "patient": {}, "water": { "location": "Village A", "pH": 7.1 } }),
        )
        .await
        .unwrap()
        .wait()
        .await;
        assert!(receipt.symptom_id.is_none());
        assert!(receipt.water_id.is_some());
        assert!(store
            .unprocessed_symptom_reports(None, 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.recent_water_reports(10).await.unwrap().len(), 1);
    }
}

//! Immediate processing fired right after a report is stored.
//!
//! Both triggers run as detached tasks and swallow their own failures; the
//! poller picks up anything they miss.

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pipeline::Pipeline;

/// How many stranded symptom reports a new water reading may unlock at once.
pub const WATER_SWEEP_LIMIT: usize = 20;

pub fn on_symptom_saved(pipeline: &Pipeline, symptom_id: Uuid) -> JoinHandle<()> {
    let pipeline = pipeline.clone();
    tokio::spawn(async move {
        process_symptom(&pipeline, symptom_id).await;
    })
}

pub fn on_water_saved(pipeline: &Pipeline, location: String) -> JoinHandle<()> {
    let pipeline = pipeline.clone();
    tokio::spawn(async move {
        let attempted = sweep_location(&pipeline, &location).await;
        debug!(location = %location, attempted, "Water-triggered sweep finished");
    })
}

async fn process_symptom(pipeline: &Pipeline, symptom_id: Uuid) {
    let report = match pipeline.store().symptom_report(symptom_id).await {
        Ok(Some(report)) => report,
        Ok(None) => {
            warn!(symptom_id = %symptom_id, "Dispatched symptom report not found");
            return;
        }
        Err(e) => {
            warn!(symptom_id = %symptom_id, error = %e, "Failed to load dispatched symptom report");
            return;
        }
    };
    if report.processed_by_model {
        return;
    }
    pipeline.process_logged(&report).await;
}

/// Returns how many symptom reports were attempted.
async fn sweep_location(pipeline: &Pipeline, location: &str) -> usize {
    let reports = match pipeline
        .store()
        .unprocessed_symptom_reports(Some(location), WATER_SWEEP_LIMIT)
        .await
    {
        Ok(reports) => reports,
        Err(e) => {
            warn!(location = %location, error = %e, "Failed to list unprocessed symptom reports");
            return 0;
        }
    };

    let attempted = reports.len();
    for report in reports {
        // one failure must not stop the rest of the sweep
        pipeline.process_logged(&report).await;
    }
    attempted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{flaky_pipeline, pipeline, symptom, water, FlakyStore};
    use crate::store::{MemoryStore, Store};

    #[tokio::test]
    async fn symptom_trigger_processes_that_report() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        store
            .insert_water_report(water("Village A", 6.0, 120.0))
            .await
            .unwrap();
        let report = store
            .insert_symptom_report(symptom("Village A", &["fever", "diarrhea"]))
            .await
            .unwrap();

        on_symptom_saved(&pipeline, report.id).await.unwrap();

        let predictions = store.predictions().await;
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].features.get("symptom_diarrhea"), Some(1.0));
        assert_eq!(predictions[0].features.get("symptom_fever"), Some(1.0));
        let stored = store.symptom_report(report.id).await.unwrap().unwrap();
        assert!(stored.processed_by_model);
    }

    #[tokio::test]
    async fn symptom_trigger_skips_processed_and_unknown_reports() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        store
            .insert_water_report(water("Village A", 6.0, 120.0))
            .await
            .unwrap();
        let report = store
            .insert_symptom_report(symptom("Village A", &["fever"]))
            .await
            .unwrap();

        on_symptom_saved(&pipeline, report.id).await.unwrap();
        on_symptom_saved(&pipeline, report.id).await.unwrap();
        on_symptom_saved(&pipeline, Uuid::now_v7()).await.unwrap();

        assert_eq!(store.predictions().await.len(), 1);
    }

    #[tokio::test]
    async fn water_trigger_unlocks_stranded_reports_at_location() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        for _ in 0..3 {
            store
                .insert_symptom_report(symptom("Village A", &["vomiting"]))
                .await
                .unwrap();
        }
        let elsewhere = store
            .insert_symptom_report(symptom("Village B", &["fever"]))
            .await
            .unwrap();

        store
            .insert_water_report(water("Village A", 6.5, 80.0))
            .await
            .unwrap();
        on_water_saved(&pipeline, "Village A".to_string())
            .await
            .unwrap();

        assert_eq!(store.predictions().await.len(), 3);
        let remaining = store.unprocessed_symptom_reports(None, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, elsewhere.id);
    }

    #[tokio::test]
    async fn water_sweep_continues_past_failing_reports() {
        let store = FlakyStore::default();
        let pipeline = flaky_pipeline(&store);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let report = store
                .insert_symptom_report(symptom("Village A", &["fever"]))
                .await
                .unwrap();
            ids.push(report.id);
        }
        store.fail_prediction_for(ids[0]);
        store.fail_mark_for(ids[2]);
        store
            .insert_water_report(water("Village A", 6.5, 80.0))
            .await
            .unwrap();

        on_water_saved(&pipeline, "Village A".to_string())
            .await
            .unwrap();

        let remaining: Vec<Uuid> = store
            .unprocessed_symptom_reports(None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&ids[0]));
        assert!(remaining.contains(&ids[2]));
        for id in [ids[1], ids[3]] {
            let stored = store.symptom_report(id).await.unwrap().unwrap();
            assert!(stored.processed_by_model);
        }
    }

    #[tokio::test]
    async fn water_sweep_survives_listing_failure() {
        let store = FlakyStore::default();
        let pipeline = flaky_pipeline(&store);
        store
            .insert_symptom_report(symptom("Village A", &["fever"]))
            .await
            .unwrap();
        store.set_listing_down(true);

        on_water_saved(&pipeline, "Village A".to_string())
            .await
            .unwrap();
        assert!(store.inner.predictions().await.is_empty());
    }

    #[tokio::test]
    async fn water_sweep_is_capped() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store);
        for _ in 0..(WATER_SWEEP_LIMIT + 5) {
            store
                .insert_symptom_report(symptom("Village A", &["fever"]))
                .await
                .unwrap();
        }
        store
            .insert_water_report(water("Village A", 7.0, 5.0))
            .await
            .unwrap();

        on_water_saved(&pipeline, "Village A".to_string())
            .await
            .unwrap();
        assert_eq!(store.predictions().await.len(), WATER_SWEEP_LIMIT);
    }
}

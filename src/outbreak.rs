use crate::models::{DiseaseCount, OutbreakSummary};
use crate::store::Store;

pub const DEFAULT_OUTBREAK_THRESHOLD: i64 = 50;

pub async fn summarize(store: &dyn Store, threshold: i64) -> anyhow::Result<OutbreakSummary> {
    let counts = store.prediction_counts().await?;
    Ok(build_summary(counts, threshold))
}

/// Unlabelled groups are dropped. Largest counts come first.
pub fn build_summary(counts: Vec<(Option<String>, i64)>, threshold: i64) -> OutbreakSummary {
    let mut results: Vec<DiseaseCount> = counts
        .into_iter()
        .filter_map(|(disease, count)| {
            disease.map(|disease| DiseaseCount {
                disease,
                count,
                outbreak: is_outbreak(count, threshold),
            })
        })
        .collect();

    results.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.disease.cmp(&b.disease)));
    OutbreakSummary { threshold, results }
}

pub fn is_outbreak(count: i64, threshold: i64) -> bool {
    count >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SymptomAttributes, WaterAttributes};
    use crate::pipeline::test_support::FixedLabel;
    use crate::pipeline::Pipeline;
    use crate::predictor::Predictor;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn threshold_is_inclusive() {
        assert!(is_outbreak(50, 50));
        assert!(!is_outbreak(49, 50));
    }

    #[test]
    fn unlabelled_group_is_excluded() {
        let summary = build_summary(
            vec![(None, 400), (Some("Typhoid".to_string()), 3)],
            DEFAULT_OUTBREAK_THRESHOLD,
        );
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].disease, "Typhoid");
        assert!(!summary.results[0].outbreak);
    }

    #[test]
    fn results_sorted_by_count() {
        let summary = build_summary(
            vec![
                (Some("Hepatitis A".to_string()), 5),
                (Some("Cholera".to_string()), 70),
                (Some("Typhoid".to_string()), 5),
            ],
            10,
        );
        let order: Vec<&str> = summary.results.iter().map(|r| r.disease.as_str()).collect();
        assert_eq!(order, vec!["Cholera", "Hepatitis A", "Typhoid"]);
    }

    async fn store_predictions(store: &MemoryStore, label: &'static str, n: usize) {
        let pipeline = Pipeline::new(
            Arc::new(store.clone()),
            Predictor::from_classifier(Arc::new(FixedLabel(label))),
        );
        for _ in 0..n {
            pipeline
                .predict_direct(None, WaterAttributes::default(), SymptomAttributes::default())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn flags_diseases_at_or_above_threshold() {
        let store = MemoryStore::new();
        store_predictions(&store, "Cholera", 60).await;
        store_predictions(&store, "Typhoid", 49).await;

        let summary = summarize(&store, 50).await.unwrap();
        assert_eq!(summary.threshold, 50);
        assert_eq!(
            summary.results,
            vec![
                DiseaseCount {
                    disease: "Cholera".to_string(),
                    count: 60,
                    outbreak: true,
                },
                DiseaseCount {
                    disease: "Typhoid".to_string(),
                    count: 49,
                    outbreak: false,
                },
            ]
        );
    }
}

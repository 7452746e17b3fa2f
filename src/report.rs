use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{OutbreakSummary, Prediction};

#[derive(Debug, Clone, PartialEq)]
pub struct LocationSummary {
    pub location: String,
    pub count: usize,
    pub top_disease: String,
}

/// Prediction counts per location with the most frequent disease there.
pub fn summarize_by_location(predictions: &[Prediction]) -> Vec<LocationSummary> {
    let mut map: HashMap<String, HashMap<String, usize>> = HashMap::new();

    for prediction in predictions {
        let location = prediction
            .location
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        *map.entry(location)
            .or_default()
            .entry(prediction.predicted_disease.clone())
            .or_insert(0) += 1;
    }

    let mut summaries: Vec<LocationSummary> = map
        .into_iter()
        .map(|(location, diseases)| {
            let count = diseases.values().sum();
            let top_disease = diseases
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                .map(|(disease, _)| disease)
                .unwrap_or_default();
            LocationSummary {
                location,
                count,
                top_disease,
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.location.cmp(&b.location)));
    summaries
}

pub fn build_report(
    generated_at: DateTime<Utc>,
    summary: &OutbreakSummary,
    recent: &[Prediction],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Outbreak Status Report");
    let _ = writeln!(
        output,
        "Generated {} (outbreak threshold {} predictions)",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        summary.threshold
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Predicted Diseases");

    if summary.results.is_empty() {
        let _ = writeln!(output, "No predictions recorded yet.");
    } else {
        for result in summary.results.iter() {
            let flag = if result.outbreak { " **OUTBREAK**" } else { "" };
            let _ = writeln!(output, "- {}: {} predictions{}", result.disease, result.count, flag);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Affected Locations");

    let locations = summarize_by_location(recent);
    if locations.is_empty() {
        let _ = writeln!(output, "No recent predictions.");
    } else {
        for location in locations.iter().take(10) {
            let _ = writeln!(
                output,
                "- {}: {} recent predictions (mostly {})",
                location.location, location.count, location.top_disease
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Predictions");

    if recent.is_empty() {
        let _ = writeln!(output, "No recent predictions.");
    } else {
        for prediction in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} at {} on {} (symptoms: {})",
                prediction.predicted_disease,
                prediction.location.as_deref().unwrap_or("unknown"),
                prediction.timestamp.format("%Y-%m-%d %H:%M"),
                if prediction.input.symptoms.is_empty() {
                    "none reported".to_string()
                } else {
                    prediction.input.symptoms.join(", ")
                }
            );
        }
    }

    output
}

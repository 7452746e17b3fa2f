use anyhow::Result;

use crate::models::{SymptomReport, WaterReport};
use crate::store::{LocationKey, Store};

const CANDIDATE_LIMIT: usize = 16;

/// Finds the most relevant water report for a symptom report's location.
///
/// `Ok(None)` means "not yet matchable"; the caller leaves the symptom report
/// unprocessed for a later retry.
pub async fn find_counterpart(
    store: &dyn Store,
    report: &SymptomReport,
) -> Result<Option<WaterReport>> {
    let Some(location) = report
        .location
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
    else {
        return Ok(None);
    };

    for key in [LocationKey::Location, LocationKey::Village] {
        let candidates = store.water_reports_at(key, location, CANDIDATE_LIMIT).await?;
        if let Some(best) = most_recent(candidates) {
            return Ok(Some(best));
        }
    }
    Ok(None)
}

/// Submission time, then creation time, then id, all descending.
pub fn most_recent(candidates: Vec<WaterReport>) -> Option<WaterReport> {
    candidates.into_iter().max_by(|a, b| {
        (a.submitted_at, a.created_at, a.id).cmp(&(b.submitted_at, b.created_at, b.id))
    })
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::FeatureVector;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomReport {
    pub id: Uuid,
    pub location: Option<String>,
    pub symptoms: Vec<String>,
    pub severity: Option<String>,
    pub family_members_affected: Option<i32>,
    pub district: Option<String>,
    /// Everything else the reporter sent (patient details, meta).
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_by_model: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl SymptomReport {
    pub fn attributes(&self) -> SymptomAttributes {
        SymptomAttributes {
            symptoms: self.symptoms.clone(),
            district: self.district.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterReport {
    pub id: Uuid,
    pub location: Option<String>,
    /// Legacy location key used by older submissions.
    pub village: Option<String>,
    pub district: Option<String>,
    pub readings: WaterReadings,
    pub primary_water_source: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl WaterReport {
    pub fn attributes(&self) -> WaterAttributes {
        WaterAttributes {
            readings: self.readings.clone(),
            primary_water_source: self.primary_water_source.clone(),
            district: self.district.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterReadings {
    #[serde(rename = "pH")]
    pub ph: Option<f64>,
    pub turbidity: Option<f64>,
    pub tds: Option<f64>,
    pub chlorine: Option<f64>,
    pub fluoride: Option<f64>,
    pub nitrate: Option<f64>,
    pub coliform: Option<f64>,
    pub temperature: Option<f64>,
}

/// Strict water-side input to the feature encoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterAttributes {
    #[serde(flatten)]
    pub readings: WaterReadings,
    pub primary_water_source: Option<String>,
    pub district: Option<String>,
}

/// Strict symptom-side input to the feature encoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymptomAttributes {
    pub symptoms: Vec<String>,
    pub district: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSymptomReport {
    pub location: Option<String>,
    pub symptoms: Vec<String>,
    pub severity: Option<String>,
    pub family_members_affected: Option<i32>,
    pub district: Option<String>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewWaterReport {
    pub location: Option<String>,
    pub village: Option<String>,
    pub district: Option<String>,
    pub readings: WaterReadings,
    pub primary_water_source: Option<String>,
    pub details: serde_json::Value,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Snapshot of what went into a prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionInput {
    pub location: Option<String>,
    pub symptoms: Vec<String>,
    pub water: WaterAttributes,
    pub merged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub input: PredictionInput,
    pub features: FeatureVector,
    pub predicted_disease: String,
    pub symptom_id: Option<Uuid>,
    pub water_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiseaseCount {
    pub disease: String,
    pub count: i64,
    pub outbreak: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutbreakSummary {
    pub threshold: i64,
    pub results: Vec<DiseaseCount>,
}

//! Disease classifier wrapper.
//!
//! The trained model is a random forest exported as JSON. It is loaded once;
//! a failed load leaves the predictor permanently unavailable and every call
//! returns [`PipelineError::ModelUnavailable`]. Inference walks hundreds of
//! trees, so async callers go through [`Predictor::predict_offloaded`].

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use crate::error::{PipelineError, Result};
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

pub trait Classifier: Send + Sync {
    fn predict(&self, row: &[f64]) -> Result<String>;
}

#[derive(Clone)]
pub struct Predictor {
    model: Option<Arc<dyn Classifier>>,
}

impl Predictor {
    pub fn load(path: &Path) -> Self {
        match ForestModel::from_path(path) {
            Ok(model) => {
                info!(
                    path = %path.display(),
                    trees = model.trees.len(),
                    classes = model.classes.len(),
                    "Predictor model loaded"
                );
                Self {
                    model: Some(Arc::new(model)),
                }
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Predictor failed to load model");
                Self::unavailable()
            }
        }
    }

    pub fn from_classifier(model: Arc<dyn Classifier>) -> Self {
        Self { model: Some(model) }
    }

    pub fn unavailable() -> Self {
        Self { model: None }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    /// Blocking inference. Do not call from an async task directly.
    pub fn predict(&self, features: &FeatureVector) -> Result<String> {
        let model = self.model.as_ref().ok_or(PipelineError::ModelUnavailable)?;
        model.predict(features.as_row())
    }

    pub async fn predict_offloaded(&self, features: FeatureVector) -> Result<String> {
        let model = self.model.clone().ok_or(PipelineError::ModelUnavailable)?;
        tokio::task::spawn_blocking(move || model.predict(features.as_row()))
            .await
            .map_err(|e| PipelineError::Inference(format!("inference task failed: {e}")))?
    }
}

#[derive(Debug, Deserialize)]
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
pub struct ForestModel {
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    classes: Vec<String>,
    #[serde(default)]
    scaler: Option<Scaler>,
    trees: Vec<Tree>,
}

impl ForestModel {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::InvalidModel(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let model: ForestModel =
            serde_json::from_str(text).map_err(|e| PipelineError::InvalidModel(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if let Some(names) = &self.feature_names {
            if names.len() != FEATURE_COUNT
                || names.iter().zip(FEATURE_NAMES.iter()).any(|(a, b)| a != b)
            {
                return Err(PipelineError::InvalidModel(
                    "feature_names do not match the encoder column order".to_string(),
                ));
            }
        }
        if self.classes.is_empty() {
            return Err(PipelineError::InvalidModel("no classes".to_string()));
        }
        if self.trees.is_empty() {
            return Err(PipelineError::InvalidModel("no trees".to_string()));
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != FEATURE_COUNT || scaler.scale.len() != FEATURE_COUNT {
                return Err(PipelineError::InvalidModel(
                    "scaler width does not match feature count".to_string(),
                ));
            }
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(PipelineError::InvalidModel(format!("tree {t} is empty")));
            }
            for (n, node) in tree.nodes.iter().enumerate() {
                let ok = match node {
                    // children must come after their parent, which also rules out cycles
                    Node::Split {
                        feature,
                        left,
                        right,
                        ..
                    } => {
                        *feature < FEATURE_COUNT
                            && *left > n
                            && *right > n
                            && *left < tree.nodes.len()
                            && *right < tree.nodes.len()
                    }
                    Node::Leaf { value } => value.len() == self.classes.len(),
                };
                if !ok {
                    return Err(PipelineError::InvalidModel(format!(
                        "tree {t} node {n} is malformed"
                    )));
                }
            }
        }
        Ok(())
    }

    fn scaled(&self, row: &[f64]) -> Vec<f64> {
        match &self.scaler {
            Some(scaler) => row
                .iter()
                .zip(scaler.mean.iter().zip(scaler.scale.iter()))
                .map(|(x, (mean, scale))| {
                    let scale = if *scale == 0.0 { 1.0 } else { *scale };
                    (x - mean) / scale
                })
                .collect(),
            None => row.to_vec(),
        }
    }

    fn leaf<'a>(&self, tree: &'a Tree, row: &[f64]) -> &'a [f64] {
        let mut index = 0;
        loop {
            match &tree.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Node::Leaf { value } => return value,
            }
        }
    }
}

impl Classifier for ForestModel {
    fn predict(&self, row: &[f64]) -> Result<String> {
        if row.len() != FEATURE_COUNT {
            return Err(PipelineError::Inference(format!(
                "expected {FEATURE_COUNT} features, got {}",
                row.len()
            )));
        }
        let row = self.scaled(row);
        let mut votes = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let leaf = self.leaf(tree, &row);
            let total: f64 = leaf.iter().sum();
            if total <= 0.0 {
                continue;
            }
            for (vote, weight) in votes.iter_mut().zip(leaf) {
                *vote += weight / total;
            }
        }

        let mut best = 0;
        for (index, vote) in votes.iter().enumerate() {
            if *vote > votes[best] {
                best = index;
            }
        }
        Ok(self.classes[best].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::encode;
    use crate::models::{SymptomAttributes, WaterAttributes, WaterReadings};
    use std::io::Write;

    const COLIFORM: usize = 6;
    const DIARRHEA: usize = 8;

    fn forest_json() -> String {
        serde_json::json!({
            "classes": ["Cholera", "Healthy", "Typhoid"],
            "trees": [
                { "nodes": [
                    { "feature": COLIFORM, "threshold": 50.0, "left": 1, "right": 2 },
                    { "value": [0.0, 9.0, 1.0] },
                    { "value": [8.0, 0.0, 2.0] }
                ]},
                { "nodes": [
                    { "feature": DIARRHEA, "threshold": 0.5, "left": 1, "right": 2 },
                    { "value": [1.0, 3.0, 6.0] },
                    { "value": [5.0, 0.0, 0.0] }
                ]}
            ]
        })
        .to_string()
    }

    fn features(coliform: f64, symptoms: &[&str]) -> FeatureVector {
        let water = WaterAttributes {
            readings: WaterReadings {
                coliform: Some(coliform),
                ..WaterReadings::default()
            },
            ..WaterAttributes::default()
        };
        let symptoms = SymptomAttributes {
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            district: None,
        };
        encode(Some(&water), Some(&symptoms))
    }

    #[test]
    fn forest_votes_by_averaged_leaf_distribution() {
        let model = ForestModel::from_json(&forest_json()).unwrap();
        let predictor = Predictor::from_classifier(Arc::new(model));

        let label = predictor.predict(&features(120.0, &["diarrhea"])).unwrap();
        assert_eq!(label, "Cholera");

        let label = predictor.predict(&features(0.0, &[])).unwrap();
        assert_eq!(label, "Healthy");
    }

    #[test]
    fn scaler_is_applied_before_splits() {
        let mut doc: serde_json::Value = serde_json::from_str(&forest_json()).unwrap();
        let mut mean = vec![0.0; FEATURE_COUNT];
        mean[COLIFORM] = 100.0;
        doc["scaler"] = serde_json::json!({ "mean": mean, "scale": vec![1.0; FEATURE_COUNT] });
        let model = ForestModel::from_json(&doc.to_string()).unwrap();

        // 120 - 100 = 20 falls on the low-coliform side once scaled
        let label = model.predict(features(120.0, &[]).as_row()).unwrap();
        assert_eq!(label, "Healthy");
    }

    #[test]
    fn rejects_mismatched_feature_names() {
        let mut doc: serde_json::Value = serde_json::from_str(&forest_json()).unwrap();
        doc["feature_names"] = serde_json::json!(["ph", "tds"]);
        let err = ForestModel::from_json(&doc.to_string()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidModel(_)));
    }

    #[test]
    fn rejects_backward_child_links() {
        let doc = serde_json::json!({
            "classes": ["Cholera"],
            "trees": [{ "nodes": [{ "feature": 0, "threshold": 1.0, "left": 0, "right": 0 }] }]
        });
        assert!(ForestModel::from_json(&doc.to_string()).is_err());
    }

    #[test]
    fn missing_artifact_leaves_predictor_unavailable() {
        let predictor = Predictor::load(Path::new("/nonexistent/model.json"));
        assert!(!predictor.is_ready());
        let err = predictor.predict(&FeatureVector::zeroed()).unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable));
    }

    #[test]
    fn loads_artifact_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(forest_json().as_bytes()).unwrap();
        let predictor = Predictor::load(file.path());
        assert!(predictor.is_ready());
    }

    #[test]
    fn bundled_demo_model_is_valid() {
        let path =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("models/disease_prediction_model.json");
        let model = ForestModel::from_path(&path).unwrap();
        let label = model.predict(features(240.0, &["diarrhea", "dehydration"]).as_row()).unwrap();
        assert_eq!(label, "Cholera");
    }

    #[tokio::test]
    async fn offloaded_prediction_matches_blocking() {
        let model = ForestModel::from_json(&forest_json()).unwrap();
        let predictor = Predictor::from_classifier(Arc::new(model));
        let vector = features(120.0, &["diarrhea"]);
        let blocking = predictor.predict(&vector).unwrap();
        let offloaded = predictor.predict_offloaded(vector).await.unwrap();
        assert_eq!(blocking, offloaded);
    }

    #[tokio::test]
    async fn offloaded_prediction_reports_unavailable_model() {
        let err = Predictor::unavailable()
            .predict_offloaded(FeatureVector::zeroed())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable));
    }
}

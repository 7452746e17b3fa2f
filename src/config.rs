use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::outbreak::DEFAULT_OUTBREAK_THRESHOLD;

#[derive(Args, Debug, Clone)]
pub struct PipelineConfig {
    /// Seconds between reconciliation sweeps
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Prediction count at which a disease is flagged as an outbreak
    #[arg(long, env = "OUTBREAK_THRESHOLD", default_value_t = DEFAULT_OUTBREAK_THRESHOLD)]
    pub outbreak_threshold: i64,

    /// Trained classifier artifact
    #[arg(long, env = "MODEL_PATH", default_value = "models/disease_prediction_model.json")]
    pub model_path: PathBuf,
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        // a zero interval would spin the poller
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

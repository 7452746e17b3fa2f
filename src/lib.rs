//! Symptom and water-quality report matching with disease-risk prediction.
//!
//! Reports arrive independently; the pipeline pairs each symptom report with
//! the latest water reading for its location, encodes both into the
//! classifier's feature row, stores the prediction and aggregates stored
//! predictions into outbreak signals.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod features;
pub mod intake;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod outbreak;
pub mod pipeline;
pub mod poller;
pub mod predictor;
pub mod report;
pub mod store;

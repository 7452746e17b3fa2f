//! Fixed-schema feature encoding for the disease classifier.
//!
//! The slot order below is the column order the classifier was trained on.
//! Symptom flags appear twice (bare and `symptom_`-prefixed) because both
//! column families exist in the trained schema.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::models::{SymptomAttributes, WaterAttributes};

pub const FEATURE_COUNT: usize = 35;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "ph",
    "turbidity",
    "tds",
    "chlorine",
    "fluoride",
    "nitrate",
    "coliform",
    "temperature",
    "diarrhea",
    "vomiting",
    "fever",
    "abdominal_pain",
    "jaundice",
    "dehydration",
    "fatigue",
    "nausea",
    "headache",
    "symptom_diarrhea",
    "symptom_vomiting",
    "symptom_fever",
    "symptom_abdominal_pain",
    "symptom_jaundice",
    "symptom_dehydration",
    "symptom_fatigue",
    "symptom_nausea",
    "symptom_headache",
    "district_Dibrugarh",
    "district_Jorhat",
    "district_Kamrup Metro",
    "district_Sonitpur",
    "primary_water_source_Municipal tap water",
    "primary_water_source_Pond water",
    "primary_water_source_River water",
    "primary_water_source_Tube well",
    "primary_water_source_Well water",
];

pub const DISTRICTS: [&str; 4] = ["Dibrugarh", "Jorhat", "Kamrup Metro", "Sonitpur"];

pub const WATER_SOURCES: [&str; 5] = [
    "Municipal tap water",
    "Pond water",
    "River water",
    "Tube well",
    "Well water",
];

/// Symptom slot name paired with the substrings that set it.
const SYMPTOM_MARKERS: [(&str, &[&str]); 9] = [
    ("diarrhea", &["diarrh"]),
    ("vomiting", &["vomit"]),
    ("fever", &["fever"]),
    ("abdominal_pain", &["abdominal pain", "stomach pain"]),
    ("jaundice", &["jaundice"]),
    ("dehydration", &["dehydra"]),
    ("fatigue", &["fatigue"]),
    ("nausea", &["nausea"]),
    ("headache", &["headache"]),
];

const WATER_OFFSET: usize = 0;
const SYMPTOM_OFFSET: usize = 8;
const PREFIXED_SYMPTOM_OFFSET: usize = SYMPTOM_OFFSET + SYMPTOM_MARKERS.len();
const DISTRICT_OFFSET: usize = PREFIXED_SYMPTOM_OFFSET + SYMPTOM_MARKERS.len();
const SOURCE_OFFSET: usize = DISTRICT_OFFSET + DISTRICTS.len();

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, f64>")]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn zeroed() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|index| self.values[index])
    }

    /// Values in canonical column order.
    pub fn as_row(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    fn set(&mut self, index: usize, value: f64) {
        self.values[index] = if value.is_finite() { value } else { 0.0 };
    }
}

impl From<BTreeMap<String, f64>> for FeatureVector {
    fn from(map: BTreeMap<String, f64>) -> Self {
        let mut vector = Self::zeroed();
        for (index, name) in FEATURE_NAMES.iter().enumerate() {
            if let Some(value) = map.get(*name) {
                vector.set(index, *value);
            }
        }
        vector
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

pub fn encode(
    water: Option<&WaterAttributes>,
    symptoms: Option<&SymptomAttributes>,
) -> FeatureVector {
    let mut vector = FeatureVector::zeroed();

    if let Some(water) = water {
        let readings = &water.readings;
        let numeric = [
            readings.ph,
            readings.turbidity,
            readings.tds,
            readings.chlorine,
            readings.fluoride,
            readings.nitrate,
            readings.coliform,
            readings.temperature,
        ];
        for (offset, value) in numeric.into_iter().enumerate() {
            vector.set(WATER_OFFSET + offset, value.unwrap_or(0.0));
        }
    }

    let normalized = symptoms
        .map(|attributes| normalize_symptoms(&attributes.symptoms))
        .unwrap_or_default();
    for (offset, (_, markers)) in SYMPTOM_MARKERS.iter().enumerate() {
        let present = normalized
            .iter()
            .any(|symptom| markers.iter().any(|marker| symptom.contains(marker)));
        let flag = if present { 1.0 } else { 0.0 };
        vector.set(SYMPTOM_OFFSET + offset, flag);
        vector.set(PREFIXED_SYMPTOM_OFFSET + offset, flag);
    }

    let district = symptoms
        .and_then(|attributes| non_blank(attributes.district.as_deref()))
        .or_else(|| water.and_then(|attributes| non_blank(attributes.district.as_deref())));
    one_hot(&mut vector, DISTRICT_OFFSET, &DISTRICTS, district);

    let source = water.and_then(|attributes| non_blank(attributes.primary_water_source.as_deref()));
    one_hot(&mut vector, SOURCE_OFFSET, &WATER_SOURCES, source);

    vector
}

fn normalize_symptoms(symptoms: &[String]) -> Vec<String> {
    symptoms
        .iter()
        .map(|symptom| symptom.trim().to_lowercase())
        .filter(|symptom| !symptom.is_empty())
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

// An unmatched category leaves the whole block at zero.
fn one_hot(vector: &mut FeatureVector, offset: usize, categories: &[&str], value: Option<&str>) {
    let Some(value) = value else {
        return;
    };
    let value = value.to_lowercase();
    if let Some(index) = categories
        .iter()
        .position(|category| category.to_lowercase() == value)
    {
        vector.set(offset + index, 1.0);
    }
}

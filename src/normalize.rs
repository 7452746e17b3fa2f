//! Adapters from loosely-typed report documents to strict records.
//!
//! Field-name aliases and string-encoded numbers are resolved here so that
//! nothing downstream has to know about them.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{NewSymptomReport, NewWaterReport, WaterReadings};

const SYMPTOM_KEYS: [&str; 4] = ["symptoms", "patientName", "contact_number", "reporter_name"];
const WATER_KEYS: [&str; 9] = [
    "pH",
    "ph",
    "turbidity",
    "tds",
    "chlorine",
    "fluoride",
    "nitrate",
    "coliform",
    "temperature",
];

/// Coerce a JSON value into a finite float. Anything else is absent.
pub fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First alias that carries a usable string.
fn text_alias(doc: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| text(doc.get(*key)))
}

fn number_alias(doc: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    aliases.iter().find_map(|key| number(doc.get(*key)))
}

pub fn symptom_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

pub fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

pub fn water_readings(doc: &Map<String, Value>) -> WaterReadings {
    WaterReadings {
        ph: number_alias(doc, &["pH", "ph"]),
        turbidity: number(doc.get("turbidity")),
        tds: number(doc.get("tds")),
        chlorine: number(doc.get("chlorine")),
        fluoride: number(doc.get("fluoride")),
        nitrate: number(doc.get("nitrate")),
        coliform: number(doc.get("coliform")),
        temperature: number(doc.get("temperature")),
    }
}

pub fn symptom_report(doc: &Map<String, Value>) -> NewSymptomReport {
    let family = number(doc.get("family_members_affected")).map(|n| n.round() as i32);
    NewSymptomReport {
        location: text_alias(doc, &["location", "village"]),
        symptoms: symptom_list(doc.get("symptoms")),
        severity: text(doc.get("severity")),
        family_members_affected: family,
        district: text_alias(doc, &["district", "district_name", "village_district"]),
        details: Value::Object(doc.clone()),
    }
}

pub fn water_report(doc: &Map<String, Value>) -> NewWaterReport {
    let submitted_at = timestamp(doc.get("submitted_at")).or_else(|| {
        doc.get("meta")
            .and_then(Value::as_object)
            .and_then(|meta| timestamp(meta.get("submitted_at")))
    });
    NewWaterReport {
        location: text(doc.get("location")),
        village: text(doc.get("village")),
        district: text(doc.get("district")),
        readings: water_readings(doc),
        primary_water_source: text_alias(
            doc,
            &["primary_water_source", "water_source", "primaryWaterSource"],
        ),
        details: Value::Object(doc.clone()),
        submitted_at,
    }
}

/// The symptom and water halves of one submitted payload.
#[derive(Debug, Default)]
pub struct SplitPayload {
    pub patient: Option<Map<String, Value>>,
    pub water: Option<Map<String, Value>>,
    pub meta: Map<String, Value>,
}

/// A nested half counts only when it is a non-empty object.
fn nested(payload: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    payload
        .get(key)
        .and_then(Value::as_object)
        .filter(|doc| !doc.is_empty())
        .cloned()
}

/// Accepts either `{patient, water, meta}` or a single flat form.
pub fn split_payload(payload: &Map<String, Value>) -> SplitPayload {
    let mut split = SplitPayload {
        patient: nested(payload, "patient"),
        water: nested(payload, "water"),
        meta: payload
            .get("meta")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    };
    if split.patient.is_some() || split.water.is_some() {
        return split;
    }

    let pick = |keys: &[&str]| -> Option<Value> {
        keys.iter().find_map(|key| match payload.get(*key) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value.clone()),
        })
    };

    if SYMPTOM_KEYS.iter().any(|key| payload.contains_key(*key)) {
        let mut patient = Map::new();
        let fields: [(&str, &[&str]); 11] = [
            ("patientName", &["patientName", "reporter_name"]),
            ("age", &["age"]),
            ("gender", &["gender"]),
            ("location", &["location", "village"]),
            ("district", &["district"]),
            ("contactNumber", &["contact_number"]),
            ("symptoms", &["symptoms"]),
            ("severity", &["severity"]),
            ("duration", &["duration"]),
            ("additionalInfo", &["symptom_details"]),
            ("family_members_affected", &["family_members_affected"]),
        ];
        for (name, keys) in fields {
            if let Some(value) = pick(keys) {
                patient.insert(name.to_string(), value);
            }
        }
        if let Some(reporter) = payload.get("reporter_name").filter(|v| !v.is_null()) {
            patient.insert("reportedBy".to_string(), reporter.clone());
        }
        split.patient = Some(patient);
    }

    if WATER_KEYS.iter().any(|key| payload.contains_key(*key)) {
        let mut water = Map::new();
        let fields: [(&str, &[&str]); 13] = [
            ("location", &["location", "waterLocation"]),
            ("district", &["district"]),
            ("pH", &["pH", "ph"]),
            ("turbidity", &["turbidity"]),
            ("tds", &["tds"]),
            ("chlorine", &["chlorine"]),
            ("fluoride", &["fluoride"]),
            ("nitrate", &["nitrate"]),
            ("coliform", &["coliform"]),
            ("temperature", &["temperature"]),
            ("primary_water_source", &["water_source"]),
            ("water_treatment", &["water_treatment", "waterTreatment"]),
            ("unusual_flags", &["unusual_water_flags"]),
        ];
        for (name, keys) in fields {
            if let Some(value) = pick(keys) {
                water.insert(name.to_string(), value);
            }
        }
        split.water = Some(water);
    }

    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn numbers_accept_strings_and_reject_garbage() {
        assert_eq!(number(Some(&json!(7.5))), Some(7.5));
        assert_eq!(number(Some(&json!(" 6.8 "))), Some(6.8));
        assert_eq!(number(Some(&json!("cloudy"))), None);
        assert_eq!(number(Some(&json!("NaN"))), None);
        assert_eq!(number(Some(&json!(null))), None);
        assert_eq!(number(Some(&json!([1, 2]))), None);
        assert_eq!(number(None), None);
    }

    #[test]
    fn symptoms_from_string_or_list() {
        assert_eq!(
            symptom_list(Some(&json!("fever, vomiting ,,"))),
            vec!["fever", "vomiting"]
        );
        assert_eq!(
            symptom_list(Some(&json!([" Fever ", "", null, "Diarrhea"]))),
            vec!["Fever", "Diarrhea"]
        );
        assert!(symptom_list(Some(&json!(42))).is_empty());
    }

    #[test]
    fn water_report_resolves_aliases() {
        let doc = object(json!({
            "location": "Village A",
            "ph": "6.5",
            "coliform": 120,
            "turbidity": "murky",
            "water_source": "Tube well",
            "meta": { "submitted_at": "2026-03-01T10:00:00Z" }
        }));
        let report = water_report(&doc);
        assert_eq!(report.location.as_deref(), Some("Village A"));
        assert_eq!(report.readings.ph, Some(6.5));
        assert_eq!(report.readings.coliform, Some(120.0));
        assert_eq!(report.readings.turbidity, None);
        assert_eq!(report.primary_water_source.as_deref(), Some("Tube well"));
        assert!(report.submitted_at.is_some());
    }

    #[test]
    fn ph_prefers_capitalised_key() {
        let doc = object(json!({ "pH": 7.1, "ph": 5.0 }));
        assert_eq!(water_readings(&doc).ph, Some(7.1));
    }

    #[test]
    fn symptom_report_district_aliases() {
        let doc = object(json!({
            "village": "Village B",
            "symptoms": "fever,jaundice",
            "district_name": "Sonitpur",
            "family_members_affected": "3"
        }));
        let report = symptom_report(&doc);
        assert_eq!(report.location.as_deref(), Some("Village B"));
        assert_eq!(report.district.as_deref(), Some("Sonitpur"));
        assert_eq!(report.family_members_affected, Some(3));
        assert_eq!(report.symptoms, vec!["fever", "jaundice"]);
    }

    #[test]
    fn nested_payload_is_taken_as_is() {
        let payload = object(json!({
            "patient": { "location": "Village A", "symptoms": ["fever"] },
            "meta": { "source": "asha" }
        }));
        let split = split_payload(&payload);
        assert!(split.patient.is_some());
        assert!(split.water.is_none());
        assert_eq!(split.meta.get("source"), Some(&json!("asha")));
    }

    #[test]
    fn flat_payload_splits_into_both_halves() {
        let payload = object(json!({
            "reporter_name": "Asha",
            "village": "Village C",
            "symptoms": ["diarrhea"],
            "waterLocation": "Village C",
            "ph": 6.2,
            "water_source": "River water"
        }));
        let split = split_payload(&payload);
        let patient = split.patient.unwrap();
        assert_eq!(patient.get("location"), Some(&json!("Village C")));
        assert_eq!(patient.get("reportedBy"), Some(&json!("Asha")));
        let water = split.water.unwrap();
        assert_eq!(water.get("location"), Some(&json!("Village C")));
        assert_eq!(water.get("pH"), Some(&json!(6.2)));
        assert_eq!(water.get("primary_water_source"), Some(&json!("River water")));
    }

    #[test]
    fn unrecognised_payload_yields_nothing() {
        let split = split_payload(&object(json!({ "hello": "world" })));
        assert!(split.patient.is_none());
        assert!(split.water.is_none());
    }
}

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    NewSymptomReport, NewWaterReport, Prediction, SymptomReport, WaterReadings, WaterReport,
};
use crate::store::{LocationKey, Store};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SYMPTOM_COLUMNS: &str = "id, location, symptoms, severity, family_members_affected, \
     district, details, created_at, processed_by_model, processed_at";

const WATER_COLUMNS: &str = "id, location, village, district, ph, turbidity, tds, chlorine, \
     fluoride, nitrate, coliform, temperature, primary_water_source, details, created_at, \
     submitted_at";

fn symptom_from_row(row: &PgRow) -> SymptomReport {
    SymptomReport {
        id: row.get("id"),
        location: row.get("location"),
        symptoms: row.get("symptoms"),
        severity: row.get("severity"),
        family_members_affected: row.get("family_members_affected"),
        district: row.get("district"),
        details: row.get("details"),
        created_at: row.get("created_at"),
        processed_by_model: row.get("processed_by_model"),
        processed_at: row.get("processed_at"),
    }
}

fn water_from_row(row: &PgRow) -> WaterReport {
    WaterReport {
        id: row.get("id"),
        location: row.get("location"),
        village: row.get("village"),
        district: row.get("district"),
        readings: WaterReadings {
            ph: row.get("ph"),
            turbidity: row.get("turbidity"),
            tds: row.get("tds"),
            chlorine: row.get("chlorine"),
            fluoride: row.get("fluoride"),
            nitrate: row.get("nitrate"),
            coliform: row.get("coliform"),
            temperature: row.get("temperature"),
        },
        primary_water_source: row.get("primary_water_source"),
        details: row.get("details"),
        created_at: row.get("created_at"),
        submitted_at: row.get("submitted_at"),
    }
}

fn prediction_from_row(row: &PgRow) -> anyhow::Result<Prediction> {
    let input: serde_json::Value = row.get("input");
    let features: serde_json::Value = row.get("features");
    let predicted_disease: Option<String> = row.get("predicted_disease");
    Ok(Prediction {
        id: row.get("id"),
        location: row.get("location"),
        timestamp: row.get("predicted_at"),
        input: serde_json::from_value(input).context("malformed prediction input")?,
        features: serde_json::from_value(features).context("malformed prediction features")?,
        predicted_disease: predicted_disease.unwrap_or_default(),
        symptom_id: row.get("symptom_id"),
        water_id: row.get("water_id"),
    })
}

#[async_trait]
impl Store for PgStore {
    async fn insert_symptom_report(
        &self,
        report: NewSymptomReport,
    ) -> anyhow::Result<SymptomReport> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO outbreak_watch.symptom_reports
            (id, location, symptoms, severity, family_members_affected, district, details,
             created_at, processed_by_model)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)
            RETURNING {SYMPTOM_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(&report.location)
        .bind(&report.symptoms)
        .bind(&report.severity)
        .bind(report.family_members_affected)
        .bind(&report.district)
        .bind(&report.details)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("failed to insert symptom report")?;
        Ok(symptom_from_row(&row))
    }

    async fn insert_water_report(&self, report: NewWaterReport) -> anyhow::Result<WaterReport> {
        let readings = &report.readings;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO outbreak_watch.water_reports
            (id, location, village, district, ph, turbidity, tds, chlorine, fluoride, nitrate,
             coliform, temperature, primary_water_source, details, created_at, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {WATER_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(&report.location)
        .bind(&report.village)
        .bind(&report.district)
        .bind(readings.ph)
        .bind(readings.turbidity)
        .bind(readings.tds)
        .bind(readings.chlorine)
        .bind(readings.fluoride)
        .bind(readings.nitrate)
        .bind(readings.coliform)
        .bind(readings.temperature)
        .bind(&report.primary_water_source)
        .bind(&report.details)
        .bind(Utc::now())
        .bind(report.submitted_at)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert water report")?;
        Ok(water_from_row(&row))
    }

    async fn insert_raw_report(&self, payload: &serde_json::Value) -> anyhow::Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO outbreak_watch.raw_reports (id, payload, created_at) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to insert raw report")?;
        Ok(id)
    }

    async fn symptom_report(&self, id: Uuid) -> anyhow::Result<Option<SymptomReport>> {
        let row = sqlx::query(&format!(
            "SELECT {SYMPTOM_COLUMNS} FROM outbreak_watch.symptom_reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(symptom_from_row))
    }

    async fn unprocessed_symptom_reports(
        &self,
        location: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<SymptomReport>> {
        let mut query = format!(
            "SELECT {SYMPTOM_COLUMNS} FROM outbreak_watch.symptom_reports \
             WHERE processed_by_model = FALSE"
        );
        if location.is_some() {
            query.push_str(" AND location = $2");
        }
        query.push_str(" ORDER BY created_at DESC, id DESC LIMIT $1");

        let mut rows = sqlx::query(&query).bind(limit as i64);
        if let Some(value) = location {
            rows = rows.bind(value);
        }

        let records = rows.fetch_all(&self.pool).await?;
        Ok(records.iter().map(symptom_from_row).collect())
    }

    async fn mark_symptom_processed(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbreak_watch.symptom_reports
            SET processed_by_model = TRUE, processed_at = $2
            WHERE id = $1 AND processed_by_model = FALSE
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .context("failed to mark symptom report processed")?;
        Ok(result.rows_affected() > 0)
    }

    async fn water_reports_at(
        &self,
        key: LocationKey,
        location: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<WaterReport>> {
        let column = match key {
            LocationKey::Location => "location",
            LocationKey::Village => "village",
        };
        let records = sqlx::query(&format!(
            "SELECT {WATER_COLUMNS} FROM outbreak_watch.water_reports WHERE {column} = $1 \
             ORDER BY submitted_at DESC NULLS LAST, created_at DESC, id DESC LIMIT $2"
        ))
        .bind(location)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.iter().map(water_from_row).collect())
    }

    async fn recent_water_reports(&self, limit: usize) -> anyhow::Result<Vec<WaterReport>> {
        let records = sqlx::query(&format!(
            "SELECT {WATER_COLUMNS} FROM outbreak_watch.water_reports \
             ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.iter().map(water_from_row).collect())
    }

    async fn insert_prediction(&self, prediction: &Prediction) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbreak_watch.prediction_reports
            (id, location, predicted_at, input, features, predicted_disease, symptom_id, water_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(prediction.id)
        .bind(&prediction.location)
        .bind(prediction.timestamp)
        .bind(serde_json::to_value(&prediction.input)?)
        .bind(serde_json::to_value(&prediction.features)?)
        .bind(&prediction.predicted_disease)
        .bind(prediction.symptom_id)
        .bind(prediction.water_id)
        .execute(&self.pool)
        .await
        .context("failed to insert prediction")?;
        Ok(())
    }

    async fn recent_predictions(&self, limit: usize) -> anyhow::Result<Vec<Prediction>> {
        let records = sqlx::query(
            r#"
            SELECT id, location, predicted_at, input, features, predicted_disease,
                   symptom_id, water_id
            FROM outbreak_watch.prediction_reports
            ORDER BY predicted_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        records.iter().map(prediction_from_row).collect()
    }

    async fn prediction_counts(&self) -> anyhow::Result<Vec<(Option<String>, i64)>> {
        let records = sqlx::query(
            r#"
            SELECT predicted_disease, COUNT(*) AS count
            FROM outbreak_watch.prediction_reports
            GROUP BY predicted_disease
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records
            .iter()
            .map(|row| (row.get("predicted_disease"), row.get("count")))
            .collect())
    }
}

/// Demo water readings, one per known district.
pub async fn seed(store: &dyn Store) -> anyhow::Result<usize> {
    let readings = vec![
        ("Village A", "Dibrugarh", "River water", 6.1, 8.4, 120.0),
        ("Village B", "Jorhat", "Tube well", 7.2, 1.1, 0.0),
        ("Village C", "Kamrup Metro", "Municipal tap water", 7.4, 0.6, 2.0),
        ("Village D", "Sonitpur", "Pond water", 6.4, 12.5, 240.0),
    ];

    let mut inserted = 0usize;
    for (location, district, source, ph, turbidity, coliform) in readings {
        store
            .insert_water_report(NewWaterReport {
                location: Some(location.to_string()),
                village: None,
                district: Some(district.to_string()),
                readings: WaterReadings {
                    ph: Some(ph),
                    turbidity: Some(turbidity),
                    coliform: Some(coliform),
                    ..WaterReadings::default()
                },
                primary_water_source: Some(source.to_string()),
                details: serde_json::json!({ "source": "seed" }),
                submitted_at: None,
            })
            .await?;
        inserted += 1;
    }

    Ok(inserted)
}

/// Imports water readings from CSV. Returns the stored reports so callers can
/// dispatch on them.
pub async fn import_csv(
    store: &dyn Store,
    csv_path: &std::path::Path,
) -> anyhow::Result<Vec<WaterReport>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        location: String,
        district: Option<String>,
        primary_water_source: Option<String>,
        ph: Option<String>,
        turbidity: Option<String>,
        tds: Option<String>,
        chlorine: Option<String>,
        fluoride: Option<String>,
        nitrate: Option<String>,
        coliform: Option<String>,
        temperature: Option<String>,
        submitted_at: Option<DateTime<Utc>>,
    }

    fn reading(value: &Option<String>) -> Option<f64> {
        value
            .as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut stored = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let report = NewWaterReport {
            location: Some(row.location.trim().to_string()).filter(|l| !l.is_empty()),
            village: None,
            district: row.district.filter(|d| !d.trim().is_empty()),
            readings: WaterReadings {
                ph: reading(&row.ph),
                turbidity: reading(&row.turbidity),
                tds: reading(&row.tds),
                chlorine: reading(&row.chlorine),
                fluoride: reading(&row.fluoride),
                nitrate: reading(&row.nitrate),
                coliform: reading(&row.coliform),
                temperature: reading(&row.temperature),
            },
            primary_water_source: row.primary_water_source.filter(|s| !s.trim().is_empty()),
            details: serde_json::json!({ "source": "csv", "file": csv_path.display().to_string() }),
            submitted_at: row.submitted_at,
        };
        stored.push(store.insert_water_report(report).await?);
    }

    Ok(stored)
}

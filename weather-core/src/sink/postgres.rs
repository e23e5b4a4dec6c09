use anyhow::{Context, Result};
use async_trait::async_trait;
use bb8_postgres::PostgresConnectionManager;
use tokio_postgres::NoTls;

use super::RecordSink;
use crate::model::NormalizedRecord;

pub type Pool = bb8::Pool<PostgresConnectionManager<NoTls>>;

const COLUMNS: [&str; 13] = [
    "city",
    "timestamp",
    "temperature",
    "humidity",
    "pressure",
    "weather_condition",
    "wind_speed",
    "weather_description",
    "visibility",
    "cloudiness",
    "country",
    "sunrise",
    "sunset",
];

/// Postgres table of normalized records with `(city, timestamp)` as primary key.
#[derive(Debug, Clone)]
pub struct PostgresRecordSink {
    pool: Pool,
    table: String,
    upsert: String,
}

impl PostgresRecordSink {
    pub async fn connect(database_url: &str, table: &str) -> Result<Self> {
        let config = database_url.parse::<tokio_postgres::Config>().context("Invalid DATABASE_URL")?;
        let mgr = PostgresConnectionManager::new(config, NoTls);
        let pool = bb8::Pool::builder()
            .max_size(4)
            .build(mgr)
            .await
            .context("Failed to connect to the record database")?;

        Ok(Self::with_pool(pool, table))
    }

    pub fn with_pool(pool: Pool, table: &str) -> Self {
        Self { pool, table: table.to_string(), upsert: upsert_statement(table) }
    }

    /// Create the table if it does not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        let conn = self.pool.get().await.context("Failed to get database connection")?;
        conn.batch_execute(&create_table_statement(&self.table))
            .await
            .with_context(|| format!("Failed to create table {}", self.table))?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for PostgresRecordSink {
    async fn write(&self, record: &NormalizedRecord) -> Result<()> {
        let conn = self.pool.get().await.context("Failed to get database connection")?;
        conn.execute(
            &self.upsert,
            &[
                &record.city,
                &record.timestamp,
                &record.temperature,
                &record.humidity,
                &record.pressure,
                &record.weather_condition,
                &record.wind_speed,
                &record.weather_description,
                &record.visibility,
                &record.cloudiness,
                &record.country,
                &record.sunrise,
                &record.sunset,
            ],
        )
        .await
        .with_context(|| format!("Failed to upsert record for {} at {}", record.city, record.timestamp))?;
        Ok(())
    }
}

fn create_table_statement(table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS "{table}" (
    "city" TEXT NOT NULL,
    "timestamp" TEXT NOT NULL,
    "temperature" DOUBLE PRECISION NOT NULL,
    "humidity" SMALLINT NOT NULL CHECK ("humidity" BETWEEN 0 AND 100),
    "pressure" DOUBLE PRECISION NOT NULL CHECK ("pressure" > 0),
    "weather_condition" TEXT NOT NULL,
    "wind_speed" DOUBLE PRECISION NOT NULL CHECK ("wind_speed" >= 0),
    "weather_description" TEXT,
    "visibility" DOUBLE PRECISION,
    "cloudiness" SMALLINT,
    "country" TEXT,
    "sunrise" BIGINT,
    "sunset" BIGINT,
    PRIMARY KEY ("city", "timestamp")
)"#
    )
}

fn upsert_statement(table: &str) -> String {
    let columns = COLUMNS.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", ");
    let params = (1..=COLUMNS.len()).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");
    let updates = COLUMNS[2..]
        .iter()
        .map(|c| format!("\"{c}\" = EXCLUDED.\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO \"{table}\" ({columns}) VALUES ({params}) \
         ON CONFLICT (\"city\", \"timestamp\") DO UPDATE SET {updates}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_binds_every_column() {
        let sql = upsert_statement("weather_data");

        assert!(sql.starts_with("INSERT INTO \"weather_data\" (\"city\", \"timestamp\", \"temperature\""));
        assert!(sql.contains("$13)"));
        assert!(!sql.contains("$14"));
        assert!(sql.contains("ON CONFLICT (\"city\", \"timestamp\") DO UPDATE SET"));
        assert!(sql.contains("\"sunset\" = EXCLUDED.\"sunset\""));
        assert!(!sql.contains("\"city\" = EXCLUDED"));
    }

    #[test]
    fn create_table_keys_on_city_and_timestamp() {
        let sql = create_table_statement("WeatherData");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"WeatherData\""));
        assert!(sql.contains("PRIMARY KEY (\"city\", \"timestamp\")"));
        for column in COLUMNS {
            assert!(sql.contains(&format!("\"{column}\"")), "missing column {column}");
        }
    }

    #[tokio::test]
    async fn invalid_database_url_is_rejected() {
        let err = PostgresRecordSink::connect("postgres://ingest@localhost:notaport/weather", "weather_data")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid DATABASE_URL"));
    }
}

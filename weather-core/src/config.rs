use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::model::CityTarget;
use crate::provider::openweather::DEFAULT_BASE_URL;

pub const DEFAULT_TABLE_NAME: &str = "weather_data";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Timezone for cities listed without one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Resolved, immutable configuration for one process.
///
/// Layers, lowest precedence first: built-in defaults, the TOML file, the environment.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Credential for the weather source.
    pub api_key: Option<String>,
    pub api_base_url: String,

    /// Object-store bucket for raw payloads (S3).
    pub bucket_name: Option<String>,
    /// Local directory used instead of a bucket, mainly for development.
    pub raw_data_dir: Option<PathBuf>,

    /// Structured-store table for normalized records.
    pub table_name: String,
    pub database_url: Option<String>,

    /// Upper bound for a single fetch.
    pub timeout_seconds: u64,
    /// How many cities are processed at once.
    pub concurrency: usize,

    pub cities: Vec<CityTarget>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            bucket_name: None,
            raw_data_dir: None,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            database_url: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            concurrency: DEFAULT_CONCURRENCY,
            cities: default_cities(),
        }
    }
}

/// The four South African cities the job was first deployed for.
pub fn default_cities() -> Vec<CityTarget> {
    ["Pretoria", "Cape Town", "Johannesburg", "Durban"]
        .into_iter()
        .map(|name| CityTarget::named(name, "Africa/Johannesburg"))
        .collect()
}

/// On-disk layout. Every key is optional.
///
/// Example TOML:
/// ```toml
/// bucket_name = "weather-raw"
/// timeout_seconds = 3
///
/// [[cities]]
/// name = "Cape Town"
/// query = "Cape Town,ZA"
/// timezone = "Africa/Johannesburg"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_key: Option<String>,
    api_base_url: Option<String>,
    bucket_name: Option<String>,
    raw_data_dir: Option<PathBuf>,
    table_name: Option<String>,
    database_url: Option<String>,
    timeout_seconds: Option<u64>,
    concurrency: Option<usize>,
    cities: Option<Vec<CityEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CityEntry {
    name: String,
    query: Option<String>,
    timezone: Option<String>,
}

impl From<CityEntry> for CityTarget {
    fn from(entry: CityEntry) -> Self {
        let query = entry.query.unwrap_or_else(|| entry.name.clone());
        let timezone = entry.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        CityTarget::new(entry.name, query, timezone)
    }
}

/// Environment variables, matched case-insensitively by `envy`.
#[derive(Debug, Default, Deserialize)]
struct EnvConfig {
    api_key: Option<String>,
    weather_api_key: Option<String>,
    api_base_url: Option<String>,
    bucket_name: Option<String>,
    s3_bucket_name: Option<String>,
    raw_data_dir: Option<PathBuf>,
    table_name: Option<String>,
    database_url: Option<String>,
    timeout_seconds: Option<u64>,
    concurrency: Option<usize>,
    city_list: Option<String>,
}

impl Config {
    /// Load from the given TOML file (or the platform default) and the process environment.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let contents = match path {
            Some(path) => Some(
                fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?,
            ),
            None => {
                let path = Self::config_file_path()?;
                if path.exists() {
                    Some(
                        fs::read_to_string(&path)
                            .with_context(|| format!("Failed to read config file: {}", path.display()))?,
                    )
                } else {
                    None
                }
            }
        };

        let env = envy::from_env::<EnvConfig>().context("Failed to read configuration from environment")?;
        Self::resolve(contents.as_deref(), env)
    }

    /// Same layering as [`Config::load`], from explicit sources.
    pub fn from_sources<I>(toml_contents: Option<&str>, env: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env = envy::from_iter::<_, EnvConfig>(env).context("Failed to read configuration from environment")?;
        Self::resolve(toml_contents, env)
    }

    fn resolve(toml_contents: Option<&str>, env: EnvConfig) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(contents) = toml_contents {
            let file: FileConfig = toml::from_str(contents).context("Failed to parse config file")?;
            cfg.apply_file(file);
        }
        cfg.apply_env(env)?;
        cfg.validate()?;

        Ok(cfg)
    }

    fn apply_file(&mut self, file: FileConfig) {
        overlay(&mut self.api_key, file.api_key);
        overlay(&mut self.bucket_name, file.bucket_name);
        overlay(&mut self.raw_data_dir, file.raw_data_dir);
        overlay(&mut self.database_url, file.database_url);
        if let Some(url) = non_empty(file.api_base_url) {
            self.api_base_url = url;
        }
        if let Some(table) = non_empty(file.table_name) {
            self.table_name = table;
        }
        if let Some(timeout) = file.timeout_seconds {
            self.timeout_seconds = timeout;
        }
        if let Some(concurrency) = file.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(cities) = file.cities {
            self.cities = cities.into_iter().map(CityTarget::from).collect();
        }
    }

    fn apply_env(&mut self, env: EnvConfig) -> Result<()> {
        overlay(&mut self.api_key, env.weather_api_key);
        overlay(&mut self.api_key, env.api_key);
        overlay(&mut self.bucket_name, env.s3_bucket_name);
        overlay(&mut self.bucket_name, env.bucket_name);
        overlay(&mut self.raw_data_dir, env.raw_data_dir);
        overlay(&mut self.database_url, env.database_url);
        if let Some(url) = non_empty(env.api_base_url) {
            self.api_base_url = url;
        }
        if let Some(table) = non_empty(env.table_name) {
            self.table_name = table;
        }
        if let Some(timeout) = env.timeout_seconds {
            self.timeout_seconds = timeout;
        }
        if let Some(concurrency) = env.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(list) = non_empty(env.city_list) {
            self.cities = parse_city_list(&list)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            bail!("TIMEOUT_SECONDS must be greater than zero");
        }
        if self.concurrency == 0 {
            bail!("CONCURRENCY must be greater than zero");
        }
        if !is_sql_identifier(&self.table_name) {
            bail!(
                "Invalid table name '{}'. Use letters, digits and underscores, starting with a letter or underscore.",
                self.table_name
            );
        }
        if self.cities.is_empty() {
            bail!("No cities configured.\nHint: set CITY_LIST (e.g. \"Pretoria;Cape Town\") or add [[cities]] to the config file.");
        }

        let mut seen = HashSet::new();
        for city in &self.cities {
            if city.name.trim().is_empty() {
                bail!("City names must not be empty");
            }
            if city.query.trim().is_empty() {
                bail!("City '{}' has an empty query", city.name);
            }
            if !seen.insert(city.name.as_str()) {
                bail!("City '{}' is configured more than once", city.name);
            }
        }
        Ok(())
    }

    /// API key, or an error telling the operator where to set it.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "No weather API key configured.\n\
                 Hint: set API_KEY (or WEATHER_API_KEY), or add `api_key` to the config file."
            )
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        Self { api_key: self.api_key.as_ref().map(|_| "***".to_string()), ..self.clone() }
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-ingest", "weather-ingest")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Parse `CITY_LIST`: `;`-separated `Name` or `Name|query|timezone` entries.
///
/// Queries keep their commas, so `Cape Town|Cape Town,ZA` is a single entry.
pub fn parse_city_list(list: &str) -> Result<Vec<CityTarget>> {
    list.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.split('|').map(str::trim);
            let name = parts.next().unwrap_or_default();
            let query = parts.next().filter(|q| !q.is_empty()).unwrap_or(name);
            let timezone = parts.next().filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TIMEZONE);
            if parts.next().is_some() {
                bail!("Invalid CITY_LIST entry '{entry}': expected `Name` or `Name|query|timezone`");
            }
            if name.is_empty() {
                bail!("Invalid CITY_LIST entry '{entry}': missing city name");
            }
            Ok(CityTarget::new(name, query, timezone))
        })
        .collect()
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn overlay<T: Emptiable>(slot: &mut Option<T>, value: Option<T>) {
    if let Some(v) = value.filter(|v| !v.is_empty_value()) {
        *slot = Some(v);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

trait Emptiable {
    fn is_empty_value(&self) -> bool;
}

impl Emptiable for String {
    fn is_empty_value(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Emptiable for PathBuf {
    fn is_empty_value(&self) -> bool {
        self.as_os_str().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_cover_four_cities() {
        let cfg = Config::from_sources(None, env(&[])).unwrap();

        let names: Vec<_> = cfg.cities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Pretoria", "Cape Town", "Johannesburg", "Durban"]);
        assert_eq!(cfg.table_name, DEFAULT_TABLE_NAME);
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn env_recognizes_documented_options() {
        let cfg = Config::from_sources(
            None,
            env(&[
                ("API_KEY", "KEY"),
                ("BUCKET_NAME", "raw-bucket"),
                ("TABLE_NAME", "WeatherData"),
                ("CITY_LIST", "Cape Town|Cape Town,ZA|Africa/Johannesburg; Nairobi"),
                ("TIMEOUT_SECONDS", "3"),
                ("CONCURRENCY", "2"),
                ("PATH", "/usr/bin"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.require_api_key().unwrap(), "KEY");
        assert_eq!(cfg.bucket_name.as_deref(), Some("raw-bucket"));
        assert_eq!(cfg.table_name, "WeatherData");
        assert_eq!(cfg.timeout_seconds, 3);
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(
            cfg.cities,
            vec![
                CityTarget::new("Cape Town", "Cape Town,ZA", "Africa/Johannesburg"),
                CityTarget::new("Nairobi", "Nairobi", DEFAULT_TIMEZONE),
            ]
        );
    }

    #[test]
    fn legacy_env_names_are_accepted() {
        let cfg = Config::from_sources(
            None,
            env(&[("WEATHER_API_KEY", "OLD"), ("S3_BUCKET_NAME", "old-bucket")]),
        )
        .unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("OLD"));
        assert_eq!(cfg.bucket_name.as_deref(), Some("old-bucket"));

        let cfg = Config::from_sources(None, env(&[("WEATHER_API_KEY", "OLD"), ("API_KEY", "NEW")])).unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("NEW"));
    }

    #[test]
    fn env_overrides_file() {
        let toml = r#"
            api_key = "FILE_KEY"
            table_name = "from_file"
            timeout_seconds = 9

            [[cities]]
            name = "Windhoek"
            timezone = "Africa/Windhoek"
        "#;

        let cfg = Config::from_sources(Some(toml), env(&[("TABLE_NAME", "from_env")])).unwrap();

        assert_eq!(cfg.api_key.as_deref(), Some("FILE_KEY"));
        assert_eq!(cfg.table_name, "from_env");
        assert_eq!(cfg.timeout_seconds, 9);
        assert_eq!(cfg.cities, vec![CityTarget::new("Windhoek", "Windhoek", "Africa/Windhoek")]);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let cfg = Config::from_sources(Some("api_key = \"FILE_KEY\""), env(&[("API_KEY", ""), ("CITY_LIST", " ")])).unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("FILE_KEY"));
        assert_eq!(cfg.cities.len(), 4);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let err = Config::from_sources(Some("bukket_name = \"x\""), env(&[])).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn rejects_invalid_values() {
        for (key, value, needle) in [
            ("TIMEOUT_SECONDS", "0", "TIMEOUT_SECONDS"),
            ("CONCURRENCY", "0", "CONCURRENCY"),
            ("TABLE_NAME", "weather; DROP TABLE x", "Invalid table name"),
            ("CITY_LIST", "Durban;Durban", "more than once"),
            ("CITY_LIST", "a|b|c|d", "Invalid CITY_LIST entry"),
        ] {
            let err = Config::from_sources(None, env(&[(key, value)])).unwrap_err();
            assert!(err.to_string().contains(needle), "{key}={value}: {err}");
        }
    }

    #[test]
    fn non_numeric_timeout_is_an_error() {
        assert!(Config::from_sources(None, env(&[("TIMEOUT_SECONDS", "soon")])).is_err());
    }

    #[test]
    fn require_api_key_gives_hint() {
        let err = Config::default().require_api_key().unwrap_err();
        assert!(err.to_string().contains("Hint: set API_KEY"));
    }

    #[test]
    fn redacted_masks_api_key() {
        let cfg = Config { api_key: Some("SECRET".into()), ..Config::default() };
        let shown = serde_json::to_string(&cfg.redacted()).unwrap();
        assert!(!shown.contains("SECRET"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn parse_city_list_skips_blank_entries() {
        let cities = parse_city_list("Pretoria; ;Durban;").unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[1], CityTarget::new("Durban", "Durban", DEFAULT_TIMEZONE));
    }

    #[test]
    fn parse_city_list_keeps_commas_in_queries() {
        let cities = parse_city_list("Cape Town|Cape Town,ZA|Africa/Johannesburg;Paris|Paris,FR").unwrap();
        assert_eq!(
            cities,
            vec![
                CityTarget::new("Cape Town", "Cape Town,ZA", "Africa/Johannesburg"),
                CityTarget::new("Paris", "Paris,FR", DEFAULT_TIMEZONE),
            ]
        );
    }

    #[test]
    fn sql_identifiers() {
        assert!(is_sql_identifier("weather_data"));
        assert!(is_sql_identifier("_t1"));
        assert!(!is_sql_identifier("1table"));
        assert!(!is_sql_identifier("weather-data"));
        assert!(!is_sql_identifier(""));
    }
}

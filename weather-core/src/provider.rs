use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::{Config, model::CityTarget, provider::openweather::OpenWeatherFetcher};

pub mod openweather;

/// Source of current observations. Returns the upstream payload untouched.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch(&self, city: &CityTarget) -> Result<Value>;
}

/// Construct the OpenWeather fetcher from config.
pub fn fetcher_from_config(config: &Config) -> Result<Box<dyn WeatherFetcher>> {
    let api_key = config.require_api_key()?;
    let fetcher = OpenWeatherFetcher::new(api_key.to_owned(), config.api_base_url.clone(), config.timeout())?;
    Ok(Box::new(fetcher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetcher_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = fetcher_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("No weather API key configured"));
    }

    #[test]
    fn fetcher_from_config_works_when_key_set() {
        let cfg = Config { api_key: Some("KEY".into()), ..Config::default() };
        assert!(fetcher_from_config(&cfg).is_ok());
    }
}

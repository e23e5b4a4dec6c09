use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Request};
use serde_json::Value;
use std::time::Duration;

use crate::model::CityTarget;

use super::WeatherFetcher;

/// Default endpoint root; `/data/2.5/weather` is appended.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// Client for the OpenWeather "current weather" endpoint, metric units.
#[derive(Debug, Clone)]
pub struct OpenWeatherFetcher {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherFetcher {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenWeather HTTP client")?;

        Ok(Self { api_key, base_url: base_url.trim_end_matches('/').to_string(), http })
    }

    fn current_request(&self, query: &str) -> reqwest::Result<Request> {
        let url = format!("{}/data/2.5/weather", self.base_url);

        self.http
            .get(url)
            .query(&[("q", query), ("appid", self.api_key.as_str()), ("units", "metric")])
            .build()
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherFetcher {
    async fn fetch(&self, city: &CityTarget) -> Result<Value> {
        let request = self
            .current_request(&city.query)
            .context("Failed to build OpenWeather request")?;

        let res = self
            .http
            .execute(request)
            .await
            .context("Failed to send request to OpenWeather (current weather)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read OpenWeather current response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather current request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: Value =
            serde_json::from_str(&body).context("Failed to parse OpenWeather current JSON")?;

        if !parsed.is_object() {
            return Err(anyhow!("OpenWeather current response is not a JSON object: {}", truncate_body(&body)));
        }

        Ok(parsed)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

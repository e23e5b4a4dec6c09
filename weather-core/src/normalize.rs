//! Flattening of one OpenWeather "current weather" payload into a [`NormalizedRecord`].
//!
//! Expected shape (only the fields read here matter):
//!
//! ```text
//! { "coord": {lon, lat}, "weather": [{"main": str, "description": str}],
//!   "main": {"temp": float, "humidity": int, "pressure": float},
//!   "wind": {"speed": float}, "clouds": {"all": int}, "visibility": int,
//!   "sys": {"country": str, "sunrise": int, "sunset": int}, "name": str }
//! ```

use serde_json::Value;

use crate::error::ValidationError;
use crate::model::NormalizedRecord;

/// Build a record for `city` at `timestamp`, or name the first unusable field.
///
/// Required: `main.temp`, `main.humidity`, `main.pressure`, `weather[0].main`,
/// `wind.speed`. The remaining fields are optional but must be well-formed when present.
pub fn normalize(city: &str, timestamp: &str, payload: &Value) -> Result<NormalizedRecord, ValidationError> {
    if city.trim().is_empty() {
        return Err(ValidationError::invalid("city", "is empty"));
    }

    let temperature = required_f64(payload, "main.temp")?;

    let humidity = required_i64(payload, "main.humidity")?;
    if !(0..=100).contains(&humidity) {
        return Err(ValidationError::invalid("main.humidity", format!("{humidity} is outside 0..=100")));
    }

    let pressure = required_f64(payload, "main.pressure")?;
    if pressure <= 0.0 {
        return Err(ValidationError::invalid("main.pressure", format!("{pressure} is not positive")));
    }

    let wind_speed = required_f64(payload, "wind.speed")?;
    if wind_speed < 0.0 {
        return Err(ValidationError::invalid("wind.speed", format!("{wind_speed} is negative")));
    }

    let condition = first_condition(payload)?;
    let weather_condition = match condition.get("main") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) => return Err(ValidationError::invalid("weather[0].main", "is empty")),
        Some(_) => return Err(ValidationError::invalid("weather[0].main", "is not a string")),
        None => return Err(ValidationError::missing("weather[0].main")),
    };
    let weather_description = match condition.get("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(ValidationError::invalid("weather[0].description", "is not a string")),
    };

    let cloudiness = optional_i64(payload, "clouds.all")?;
    if let Some(c) = cloudiness.filter(|c| !(0..=100).contains(c)) {
        return Err(ValidationError::invalid("clouds.all", format!("{c} is outside 0..=100")));
    }

    let visibility = optional_f64(payload, "visibility")?;
    if let Some(v) = visibility.filter(|v| *v < 0.0) {
        return Err(ValidationError::invalid("visibility", format!("{v} is negative")));
    }

    Ok(NormalizedRecord {
        city: city.to_string(),
        timestamp: timestamp.to_string(),
        temperature,
        humidity: humidity as i16,
        pressure,
        weather_condition,
        wind_speed,
        weather_description,
        visibility,
        cloudiness: cloudiness.map(|c| c as i16),
        country: optional_str(payload, "sys.country")?,
        sunrise: optional_i64(payload, "sys.sunrise")?,
        sunset: optional_i64(payload, "sys.sunset")?,
    })
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(payload, |node, segment| node.get(segment)).filter(|v| !v.is_null())
}

fn first_condition(payload: &Value) -> Result<&Value, ValidationError> {
    match payload.get("weather") {
        Some(Value::Array(items)) => items.first().ok_or_else(|| ValidationError::invalid("weather", "is empty")),
        Some(_) => Err(ValidationError::invalid("weather", "is not an array")),
        None => Err(ValidationError::missing("weather")),
    }
}

fn required_f64(payload: &Value, field: &'static str) -> Result<f64, ValidationError> {
    optional_f64(payload, field)?.ok_or_else(|| ValidationError::missing(field))
}

fn required_i64(payload: &Value, field: &'static str) -> Result<i64, ValidationError> {
    optional_i64(payload, field)?.ok_or_else(|| ValidationError::missing(field))
}

fn optional_f64(payload: &Value, field: &'static str) -> Result<Option<f64>, ValidationError> {
    let Some(value) = lookup(payload, field) else {
        return Ok(None);
    };
    match value.as_f64() {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(ValidationError::invalid(field, "is not a number")),
    }
}

fn optional_i64(payload: &Value, field: &'static str) -> Result<Option<i64>, ValidationError> {
    let Some(value) = lookup(payload, field) else {
        return Ok(None);
    };
    if let Some(n) = value.as_i64() {
        return Ok(Some(n));
    }
    // Some upstream responses encode integral readings as `63.0`.
    match value.as_f64() {
        Some(n) if n.is_finite() && n.fract() == 0.0 => Ok(Some(n as i64)),
        _ => Err(ValidationError::invalid(field, "is not an integer")),
    }
}

fn optional_str(payload: &Value, field: &'static str) -> Result<Option<String>, ValidationError> {
    match lookup(payload, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::invalid(field, "is not a string")),
    }
}

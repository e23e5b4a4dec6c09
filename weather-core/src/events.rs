//! Structured log lines for the external monitoring collaborator.
//!
//! Every line is `key=value` pairs so it can be parsed without a JSON logger:
//! `event=ingest city="Cape Town" phase=fetch outcome=ok latency_ms=212`.

use log::Level;
use std::fmt::Write;

use crate::error::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Normalize,
    RawWrite,
    RecordWrite,
    /// The whole pipeline of one city.
    City,
    /// The whole invocation.
    Run,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Fetch => "fetch",
            Phase::Normalize => "normalize",
            Phase::RawWrite => "raw_write",
            Phase::RecordWrite => "record_write",
            Phase::City => "city",
            Phase::Run => "run",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event<'a> {
    pub city: Option<&'a str>,
    pub phase: Phase,
    pub failure: Option<(FailureKind, String)>,
    pub latency_ms: u64,
    pub extra: Vec<(&'static str, String)>,
}

impl<'a> Event<'a> {
    pub fn city(city: &'a str, phase: Phase, latency_ms: u64) -> Self {
        Self { city: Some(city), phase, failure: None, latency_ms, extra: Vec::new() }
    }

    pub fn run(latency_ms: u64) -> Self {
        Self { city: None, phase: Phase::Run, failure: None, latency_ms, extra: Vec::new() }
    }

    pub fn failed(mut self, kind: FailureKind, cause: impl ToString) -> Self {
        self.failure = Some((kind, cause.to_string()));
        self
    }

    pub fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.extra.push((key, value.to_string()));
        self
    }

    pub fn level(&self) -> Level {
        if self.failure.is_some() { Level::Warn } else { Level::Info }
    }

    pub fn render(&self) -> String {
        let mut line = String::from("event=ingest");
        if let Some(city) = self.city {
            let _ = write!(line, " city={}", quote(city));
        }
        let _ = write!(line, " phase={}", self.phase.as_str());
        match &self.failure {
            None => line.push_str(" outcome=ok"),
            Some((kind, cause)) => {
                let _ = write!(line, " outcome=failed error_kind={kind} error={}", quote(cause));
            }
        }
        for (key, value) in &self.extra {
            let _ = write!(line, " {key}={}", quote(value));
        }
        let _ = write!(line, " latency_ms={}", self.latency_ms);
        line
    }

    pub fn emit(&self) {
        log::log!(self.level(), "{}", self.render());
    }
}

/// Quote values containing spaces, quotes or `=`; leave plain tokens bare.
fn quote(value: &str) -> String {
    if !value.is_empty() && !value.contains(|c: char| c.is_whitespace() || c == '"' || c == '=') {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_success() {
        let line = Event::city("Cape Town", Phase::Fetch, 212).render();
        assert_eq!(line, "event=ingest city=\"Cape Town\" phase=fetch outcome=ok latency_ms=212");
    }

    #[test]
    fn renders_failure_with_kind() {
        let event = Event::city("Durban", Phase::RawWrite, 5).failed(FailureKind::RawWriteFailed, "access \"denied\"");
        assert_eq!(event.level(), Level::Warn);
        assert_eq!(
            event.render(),
            "event=ingest city=Durban phase=raw_write outcome=failed error_kind=RawWriteFailed error=\"access \\\"denied\\\"\" latency_ms=5"
        );
    }

    #[test]
    fn renders_run_with_extras() {
        let line = Event::run(900).with("attempted", 4).with("succeeded", 3).render();
        assert_eq!(line, "event=ingest phase=run outcome=ok attempted=4 succeeded=3 latency_ms=900");
    }
}

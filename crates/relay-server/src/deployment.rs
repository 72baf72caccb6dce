//! Build and deployment metadata reported by `/health` and the benchmark.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Server version reported to clients.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where this build came from. Read once at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    /// `BUILD_COMMIT`, default `"unknown"`.
    pub commit: String,
    /// `BUILD_TIME`, default the process start time.
    pub timestamp: String,
    /// `BUILD_ACTOR`, default `"manual"`.
    pub actor: String,
    /// `BUILD_RUN_ID`, default empty.
    pub run_id: String,
    /// `BUILD_RUN_URL`, default empty.
    pub run_url: String,
}

impl DeploymentInfo {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), Utc::now())
    }

    /// Read through `lookup`. Missing or empty values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, now: DateTime<Utc>) -> Self {
        let get = |key: &str, default: String| {
            lookup(key).filter(|v| !v.is_empty()).unwrap_or(default)
        };
        Self {
            commit: get("BUILD_COMMIT", "unknown".into()),
            timestamp: get("BUILD_TIME", rfc3339(now)),
            actor: get("BUILD_ACTOR", "manual".into()),
            run_id: get("BUILD_RUN_ID", String::new()),
            run_url: get("BUILD_RUN_URL", String::new()),
        }
    }
}

impl Default for DeploymentInfo {
    fn default() -> Self {
        Self::from_lookup(|_| None, Utc::now())
    }
}

/// RFC 3339 UTC with second precision, e.g. `2024-05-01T12:00:00Z`.
pub fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

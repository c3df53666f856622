use crate::query::error::QueryError;
use crate::query::runner::PollPolicy;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const BASE_URL_VAR: &str = "FORECAST_BIAS_BASE_URL";
pub const API_KEY_VAR: &str = "FORECAST_BIAS_API_KEY";
pub const POLL_INTERVAL_VAR: &str = "FORECAST_BIAS_POLL_INTERVAL_SECS";
pub const TIMEOUT_VAR: &str = "FORECAST_BIAS_TIMEOUT_SECS";

/// Connection settings for [`crate::HttpQueryService`] and the runner polling it.
///
/// # Examples
///
/// ```
/// use forecast_bias::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .base_url("https://queries.example.org/v1")
///     .api_key("secret")
///     .request_timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.poll_policy.initial_interval, Duration::from_secs(2));
/// ```
#[derive(Clone, bon::Builder)]
pub struct ServiceConfig {
    #[builder(into)]
    pub base_url: String,
    #[builder(into)]
    pub api_key: Option<String>,
    #[builder(default)]
    pub poll_policy: PollPolicy,
    /// Timeout of each individual HTTP request, not of the whole query.
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
}

impl ServiceConfig {
    /// Reads the configuration from `FORECAST_BIAS_*` environment variables.
    ///
    /// `FORECAST_BIAS_BASE_URL` is required. `FORECAST_BIAS_API_KEY`,
    /// `FORECAST_BIAS_POLL_INTERVAL_SECS` (initial poll interval) and
    /// `FORECAST_BIAS_TIMEOUT_SECS` (overall query timeout) are optional.
    pub fn from_env() -> Result<Self, QueryError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, QueryError> {
        let base_url = lookup(BASE_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| QueryError::Config(format!("{BASE_URL_VAR} is not set")))?;

        let mut poll_policy = PollPolicy::default();
        if let Some(secs) = parse_var::<f64>(&lookup, POLL_INTERVAL_VAR)? {
            poll_policy.initial_interval = seconds(POLL_INTERVAL_VAR, secs)?;
        }
        if let Some(secs) = parse_var::<f64>(&lookup, TIMEOUT_VAR)? {
            poll_policy.timeout = seconds(TIMEOUT_VAR, secs)?;
        }

        Ok(ServiceConfig::builder()
            .base_url(base_url)
            .maybe_api_key(lookup(API_KEY_VAR).filter(|key| !key.is_empty()))
            .poll_policy(poll_policy)
            .build())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, QueryError> {
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| QueryError::Config(format!("{name} is not a number: '{raw}'")))
        })
        .transpose()
}

fn seconds(name: &str, secs: f64) -> Result<Duration, QueryError> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| QueryError::Config(format!("{name} must be a positive number of seconds")))
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("poll_policy", &self.poll_policy)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = ServiceConfig::from_lookup(lookup(&[
            (BASE_URL_VAR, "https://queries.example.org/v1"),
            (API_KEY_VAR, "secret"),
            (POLL_INTERVAL_VAR, "0.5"),
            (TIMEOUT_VAR, "120"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://queries.example.org/v1");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.poll_policy.initial_interval, Duration::from_millis(500));
        assert_eq!(config.poll_policy.timeout, Duration::from_secs(120));
        assert_eq!(config.poll_policy.max_interval, Duration::from_secs(30));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_defaults() {
        let config =
            ServiceConfig::from_lookup(lookup(&[(BASE_URL_VAR, "http://localhost:8080")])).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.poll_policy, PollPolicy::default());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            ServiceConfig::from_lookup(lookup(&[])),
            Err(QueryError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_lookup(lookup(&[
                (BASE_URL_VAR, "http://localhost"),
                (TIMEOUT_VAR, "soon"),
            ])),
            Err(QueryError::Config(_))
        ));
        assert!(ServiceConfig::from_lookup(lookup(&[
            (BASE_URL_VAR, "http://localhost"),
            (POLL_INTERVAL_VAR, "0"),
        ]))
        .is_err());
    }
}

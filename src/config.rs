//! Deserializable dispatcher configuration.
//!
//! Durations are written as (fractional) seconds:
//!
//! ```toml
//! base_url = "https://api.example.com/v1"
//! request_timeout = 15
//!
//! [default_headers]
//! content-type = "application/json"
//!
//! [renewal]
//! timeout = 10
//! preemptive_window = 30
//! ```

// self
use crate::{_prelude::*, error::ConfigError, renewal::RenewalPolicy};

/// Default per-request timeout applied by the reqwest transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(30);

/// Settings used by [`Dispatcher::from_config`](crate::dispatch::Dispatcher::from_config).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DispatcherConfig {
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Per-request timeout; zero disables it.
	#[serde(default = "default_request_timeout", with = "seconds")]
	pub request_timeout: Duration,
	/// Headers attached to every request unless the request sets them itself.
	#[serde(default = "default_headers")]
	pub default_headers: BTreeMap<String, String>,
	/// Renewal tunables.
	#[serde(default)]
	pub renewal: RenewalPolicy,
}
impl DispatcherConfig {
	/// Creates a configuration with defaults for everything but the base URL.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			default_headers: default_headers(),
			renewal: RenewalPolicy::default(),
		}
	}

	/// Parses `base_url` and creates a configuration with defaults.
	pub fn parse(base_url: &str) -> Result<Self> {
		let base_url = Url::parse(base_url).map_err(|source| ConfigError::InvalidBaseUrl { source })?;

		Ok(Self::new(base_url))
	}

	/// Overrides the per-request timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Adds or replaces one default header.
	pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.insert(name.into(), value.into());

		self
	}

	/// Replaces the renewal policy.
	pub fn with_renewal(mut self, renewal: RenewalPolicy) -> Self {
		self.renewal = renewal;

		self
	}

	/// Checks the base URL, the durations, and the default headers.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") || self.base_url.cannot_be_a_base() {
			return Err(ConfigError::UnsupportedBaseUrl { url: self.base_url.to_string() });
		}
		if self.request_timeout.is_negative() {
			return Err(ConfigError::NonPositiveDuration { field: "request_timeout" });
		}

		self.renewal.validate()?;
		self.header_map()?;

		Ok(())
	}

	/// Builds the default header map.
	pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
		let mut headers = HeaderMap::with_capacity(self.default_headers.len());

		for (name, value) in &self.default_headers {
			let header_name = HeaderName::from_bytes(name.as_bytes())
				.map_err(|_| ConfigError::InvalidHeaderName { name: name.clone() })?;
			let header_value = HeaderValue::from_str(value)
				.map_err(|_| ConfigError::InvalidHeaderValue { name: name.clone() })?;

			headers.insert(header_name, header_value);
		}

		Ok(headers)
	}

	/// Builds the reqwest client described by this configuration.
	#[cfg(feature = "reqwest")]
	pub fn build_client(&self) -> Result<ReqwestClient> {
		let mut builder = ReqwestClient::builder();

		if self.request_timeout.is_positive() {
			builder = builder.timeout(self.request_timeout.unsigned_abs());
		}

		Ok(builder.build().map_err(ConfigError::from)?)
	}
}

fn default_request_timeout() -> Duration {
	DEFAULT_REQUEST_TIMEOUT
}

fn default_headers() -> BTreeMap<String, String> {
	BTreeMap::from([(header::CONTENT_TYPE.as_str().to_owned(), "application/json".to_owned())])
}

/// Serde helpers reading and writing [`Duration`]s as (fractional) seconds.
pub mod seconds {
	// crates.io
	use serde::{Deserializer, Serializer, de::Error as _};
	// self
	use crate::_prelude::*;

	/// Writes `duration` as fractional seconds.
	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_f64(duration.as_seconds_f64())
	}

	/// Reads a non-negative number of seconds.
	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let seconds = f64::deserialize(deserializer)?;

		if seconds < 0. {
			return Err(D::Error::custom(format!(
				"expected a non-negative number of seconds, got {seconds}"
			)));
		}

		Duration::checked_seconds_f64(seconds)
			.ok_or_else(|| D::Error::custom(format!("{seconds} seconds is out of range")))
	}
}

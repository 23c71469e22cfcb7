//! Crate-level error types for configuration, body codecs, and credential renewal.
//!
//! Request failures are never reported through [`Error`]: they are classified into
//! [`Outcome`](crate::outcome::Outcome) values. [`Error`] only covers what can go wrong before a
//! request exists (building clients, validating configuration) or after a successful response
//! (decoding its body).

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Request or response body could not be encoded or decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than `http` or `https`, or cannot carry paths.
	#[error("Base URL must be an absolute http(s) URL: {url}.")]
	UnsupportedBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// Token endpoint URL cannot be parsed.
	#[error("Token endpoint URL is invalid.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// A configured default header has an invalid name.
	#[error("Header name `{name}` is invalid.")]
	InvalidHeaderName {
		/// Offending header name.
		name: String,
	},
	/// A configured default header has an invalid value.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeaderValue {
		/// Header whose value was rejected.
		name: String,
	},
	/// A timeout or window must not be negative, and timeouts must not be zero.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Configuration field that failed validation.
		field: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Body encoding and decoding failures.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Response body is not the JSON shape the caller asked for.
	#[error("Response body could not be decoded as JSON.")]
	Json {
		/// Structured parsing failure, including the path to the offending field.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be encoded as JSON.")]
	Encode {
		/// Underlying serializer failure.
		#[source]
		source: serde_json::Error,
	},
	/// Response body is not valid UTF-8.
	#[error("Response body is not valid UTF-8.")]
	Utf8(#[from] std::string::FromUtf8Error),
}

/// Reasons a credential renewal did not produce a new credential.
///
/// The type is [`Clone`] because a single renewal result is delivered to every request that was
/// waiting on it.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RenewalError {
	/// Identity provider refused to issue a new credential.
	#[error("Identity provider rejected the renewal: {reason}.")]
	Rejected {
		/// Provider- or source-supplied reason string.
		reason: String,
	},
	/// Identity provider could not be reached.
	#[error("Identity provider is unreachable: {message}.")]
	Unreachable {
		/// Transport failure summary.
		message: String,
	},
	/// Renewal did not finish within the configured bound.
	#[error("Credential renewal timed out after {after}.")]
	TimedOut {
		/// Timeout that elapsed.
		after: Duration,
	},
	/// Source has nothing to renew with (e.g., no refresh token was ever stored).
	#[error("No refresh token is available for renewal.")]
	MissingRefreshToken,
	/// Renewal task stopped before producing a result.
	#[error("Credential renewal was aborted before completing.")]
	Aborted,
}

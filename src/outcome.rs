//! The closed outcome taxonomy returned to callers.

// self
use crate::{_prelude::*, http::Response};

/// Final result of a dispatched request.
#[derive(Clone, Debug)]
pub enum Outcome {
	/// A `2xx` response.
	Success(Response),
	/// Anything else, already classified.
	Failure(Failure),
}
impl Outcome {
	/// Returns `true` for [`Outcome::Success`].
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	/// Failure kind, when the outcome is a failure.
	pub fn kind(&self) -> Option<FailureKind> {
		match self {
			Self::Success(_) => None,
			Self::Failure(failure) => Some(failure.kind),
		}
	}

	/// Returns the successful response, if any.
	pub fn response(&self) -> Option<&Response> {
		match self {
			Self::Success(response) => Some(response),
			Self::Failure(_) => None,
		}
	}

	/// Converts into a [`std::result::Result`] so callers can use `?`.
	pub fn into_result(self) -> Result<Response, Failure> {
		match self {
			Self::Success(response) => Ok(response),
			Self::Failure(failure) => Err(failure),
		}
	}

	/// Stable label suitable for span or metric fields.
	pub fn label(&self) -> &'static str {
		match self {
			Self::Success(_) => "success",
			Self::Failure(failure) => failure.kind.as_str(),
		}
	}
}
impl From<Failure> for Outcome {
	fn from(failure: Failure) -> Self {
		Self::Failure(failure)
	}
}

/// Classified failure with a deterministic, human-readable detail.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{detail}")]
pub struct Failure {
	/// Failure category.
	pub kind: FailureKind,
	/// Message describing the failure.
	pub detail: String,
}
impl Failure {
	/// Creates a failure of `kind` with `detail`.
	pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
		Self { kind, detail: detail.into() }
	}
}

/// Failure categories callers can match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
	/// No response was received.
	NetworkError,
	/// The server rejected the credential and no (further) renewal applies.
	AuthExpired,
	/// Renewal failed; an interactive login has been requested.
	SessionExpired,
	/// `403 Forbidden`.
	Forbidden,
	/// `404 Not Found`.
	NotFound,
	/// Any `5xx` status.
	ServerError(u16),
	/// Any other non-`2xx` status.
	HttpError(u16),
}
impl FailureKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NetworkError => "network_error",
			Self::AuthExpired => "auth_expired",
			Self::SessionExpired => "session_expired",
			Self::Forbidden => "forbidden",
			Self::NotFound => "not_found",
			Self::ServerError(_) => "server_error",
			Self::HttpError(_) => "http_error",
		}
	}

	/// Status code carried by the kind, if any.
	pub const fn status(self) -> Option<u16> {
		match self {
			Self::ServerError(status) | Self::HttpError(status) => Some(status),
			Self::Forbidden => Some(403),
			Self::NotFound => Some(404),
			Self::AuthExpired => Some(401),
			Self::NetworkError | Self::SessionExpired => None,
		}
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

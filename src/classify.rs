//! Pure mapping from [`RawOutcome`] to the caller-facing [`Outcome`].
//!
//! Priority order: no response, `401`, `403`, `404`, `5xx`, other non-`2xx`, `2xx`. Detail text
//! depends only on the status and the shape of the body, so classifying the same raw outcome
//! twice always yields the same result.

// self
use crate::{
	_prelude::*,
	error::RenewalError,
	http::{NoResponse, RawOutcome, Response},
	outcome::{Failure, FailureKind, Outcome},
};

const SERVER_MESSAGE_FIELDS: [&str; 4] = ["detail", "message", "error_description", "error"];

/// Classifies a raw transport outcome.
pub fn classify(raw: RawOutcome) -> Outcome {
	match raw {
		RawOutcome::NoResponse(failure) => network_error(&failure).into(),
		RawOutcome::Response(response) => classify_response(response),
	}
}

/// Builds the [`FailureKind::SessionExpired`] outcome for a failed renewal.
pub fn session_expired(err: &RenewalError) -> Outcome {
	Failure::new(
		FailureKind::SessionExpired,
		format!("Session expired and re-authentication is required. {err}"),
	)
	.into()
}

fn classify_response(response: Response) -> Outcome {
	let status = response.status;

	match status {
		StatusCode::UNAUTHORIZED =>
			Failure::new(FailureKind::AuthExpired, "Server rejected the bearer credential.").into(),
		StatusCode::FORBIDDEN => Failure::new(
			FailureKind::Forbidden,
			"Access to the requested resource is forbidden.",
		)
		.into(),
		StatusCode::NOT_FOUND =>
			Failure::new(FailureKind::NotFound, "The requested resource was not found.").into(),
		_ if status.is_server_error() => Failure::new(
			FailureKind::ServerError(status.as_u16()),
			format!("Server failed with status {}.", describe_status(status)),
		)
		.into(),
		_ if status.is_success() => Outcome::Success(response),
		_ => {
			let detail = server_message(&response.body).unwrap_or_else(|| {
				format!("Request failed with status {}.", describe_status(status))
			});

			Failure::new(FailureKind::HttpError(status.as_u16()), detail).into()
		},
	}
}

fn network_error(failure: &NoResponse) -> Failure {
	let detail = if failure.timed_out {
		format!("No response received before the request timed out: {}.", failure.reason)
	} else {
		format!("No response received from the server: {}.", failure.reason)
	};

	Failure::new(FailureKind::NetworkError, detail)
}

fn describe_status(status: StatusCode) -> String {
	match status.canonical_reason() {
		Some(reason) => format!("{} ({reason})", status.as_u16()),
		None => status.as_u16().to_string(),
	}
}

/// Extracts a message from a JSON error body.
///
/// `detail` may also be a list of validation entries, in which case the first entry's `msg` is
/// used.
fn server_message(body: &[u8]) -> Option<String> {
	let value = serde_json::from_slice::<serde_json::Value>(body).ok()?;
	let object = value.as_object()?;

	SERVER_MESSAGE_FIELDS.iter().find_map(|field| match object.get(*field)? {
		serde_json::Value::String(message) if !message.trim().is_empty() =>
			Some(message.trim().to_owned()),
		serde_json::Value::Array(entries) => entries
			.first()?
			.get("msg")?
			.as_str()
			.map(|message| message.trim().to_owned())
			.filter(|message| !message.is_empty()),
		_ => None,
	})
}

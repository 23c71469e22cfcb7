//! Scripted transport and credential source shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::atomic::{AtomicUsize, Ordering},
	time::Duration as StdDuration,
};
// crates.io
use bearer_dispatch::{
	credential::{Credential, CredentialSource, RenewFuture},
	error::RenewalError,
	http::{NoResponse, OutboundRequest, RawOutcome, Response, Transport, TransportFuture},
	oauth2::http::{StatusCode, header::AUTHORIZATION},
};
use parking_lot::Mutex;

type Handler = Box<dyn Fn(&OutboundRequest) -> RawOutcome + Send + Sync>;

/// One transmission observed by [`ScriptedTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
	pub path: String,
	pub bearer: Option<String>,
	pub retried: bool,
}

/// Transport answering from a closure, after an optional delay.
pub struct ScriptedTransport {
	handler: Handler,
	delay: StdDuration,
	calls: Mutex<Vec<Call>>,
}
impl ScriptedTransport {
	pub fn new(handler: impl 'static + Fn(&OutboundRequest) -> RawOutcome + Send + Sync) -> Self {
		Self { handler: Box::new(handler), delay: StdDuration::ZERO, calls: Default::default() }
	}

	/// Answers `200` for `Bearer {token}` and `401` for anything else.
	pub fn accepting(token: &'static str) -> Self {
		Self::new(move |request| {
			if bearer(request).as_deref() == Some(token) {
				status(StatusCode::OK)
			} else {
				status(StatusCode::UNAUTHORIZED)
			}
		})
	}

	/// Always answers with `code`.
	pub fn always(code: StatusCode) -> Self {
		Self::new(move |_| status(code))
	}

	/// Never receives a response.
	pub fn offline() -> Self {
		Self::new(|_| NoResponse::new("connection refused").into())
	}

	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay = delay;

		self
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().len()
	}
}
impl Transport for ScriptedTransport {
	fn transmit<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			self.calls.lock().push(Call {
				path: request.path().to_owned(),
				bearer: bearer(request),
				retried: request.is_retried(),
			});

			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}

			(self.handler)(request)
		})
	}
}

/// Credential source with scripted renewal results and call counters.
pub struct FakeSource {
	current: Mutex<Option<Credential>>,
	results: Mutex<VecDeque<Result<Credential, RenewalError>>>,
	delay: StdDuration,
	renewals: AtomicUsize,
	reauthentications: AtomicUsize,
}
impl FakeSource {
	pub fn new(token: &str) -> Self {
		Self {
			current: Mutex::new(Some(Credential::new(token))),
			results: Default::default(),
			delay: StdDuration::from_millis(25),
			renewals: AtomicUsize::new(0),
			reauthentications: AtomicUsize::new(0),
		}
	}

	pub fn with_credential(self, credential: Credential) -> Self {
		*self.current.lock() = Some(credential);

		self
	}

	/// Queues the result of the next `renew()` call.
	pub fn then(self, result: Result<Credential, RenewalError>) -> Self {
		self.results.lock().push_back(result);

		self
	}

	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay = delay;

		self
	}

	pub fn renewals(&self) -> usize {
		self.renewals.load(Ordering::SeqCst)
	}

	pub fn reauthentications(&self) -> usize {
		self.reauthentications.load(Ordering::SeqCst)
	}
}
impl CredentialSource for FakeSource {
	fn current_credential(&self) -> Option<Credential> {
		self.current.lock().clone()
	}

	fn renew(&self) -> RenewFuture<'_> {
		Box::pin(async move {
			self.renewals.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(self.delay).await;

			let result = self.results.lock().pop_front().unwrap_or_else(|| {
				Err(RenewalError::Rejected { reason: "no scripted renewal left".into() })
			});

			if let Ok(credential) = &result {
				*self.current.lock() = Some(credential.clone());
			}

			result
		})
	}

	fn initiate_reauthentication(&self) {
		self.reauthentications.fetch_add(1, Ordering::SeqCst);
	}
}

pub fn bearer(request: &OutboundRequest) -> Option<String> {
	request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()).map(str::to_owned)
}

pub fn status(code: StatusCode) -> RawOutcome {
	Response::new(code, b"{}".to_vec()).into()
}

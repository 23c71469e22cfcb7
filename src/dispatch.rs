//! The caller-facing request dispatcher.

// self
#[cfg(feature = "reqwest")] use crate::{config::DispatcherConfig, http::ReqwestTransport};
use crate::{
	_prelude::*,
	credential::CredentialSource,
	http::{OutboundRequest, Transport},
	obs::{self, RequestSpan, Stage},
	outcome::Outcome,
	renewal::{RenewalCoordinator, RenewalMetrics, RenewalPolicy},
};

/// Dispatcher backed by the bundled reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestDispatcher = Dispatcher<ReqwestTransport>;

/// Sends requests with the current bearer credential and renews it transparently on `401`.
///
/// Clones share the transport, the credential source, and the single-flight renewal state, so
/// one dispatcher (or its clones) should be used for every request of a session.
pub struct Dispatcher<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	coordinator: RenewalCoordinator,
}
impl<T> Dispatcher<T>
where
	T: ?Sized + Transport,
{
	/// Creates a dispatcher with the default [`RenewalPolicy`].
	pub fn new(transport: Arc<T>, source: Arc<dyn CredentialSource>) -> Self {
		Self::with_policy(transport, source, RenewalPolicy::default())
	}

	/// Creates a dispatcher with an explicit [`RenewalPolicy`].
	pub fn with_policy(
		transport: Arc<T>,
		source: Arc<dyn CredentialSource>,
		policy: RenewalPolicy,
	) -> Self {
		Self { transport, coordinator: RenewalCoordinator::new(source, policy) }
	}

	/// Returns the transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Returns the renewal coordinator shared by clones of this dispatcher.
	pub fn coordinator(&self) -> &RenewalCoordinator {
		&self.coordinator
	}

	/// Returns the renewal counters.
	pub fn renewal_metrics(&self) -> &RenewalMetrics {
		self.coordinator.metrics()
	}

	/// Sends `request` and returns its classified outcome.
	///
	/// The request is transmitted at most twice: once with the current credential and, after a
	/// `401` and a successful renewal, once more with the renewed one. Requests already marked as
	/// retried are never replayed.
	pub async fn send(&self, mut request: OutboundRequest) -> Outcome {
		let span = RequestSpan::new(Stage::Dispatch, request.method(), request.path());
		let outcome = span.instrument(self.dispatch(&mut request)).await;

		obs::record_outcome(&outcome);

		outcome
	}

	/// Sends a `GET` request.
	pub async fn get(&self, path: impl Into<String>) -> Outcome {
		self.send(OutboundRequest::get(path)).await
	}

	/// Sends a `DELETE` request.
	pub async fn delete(&self, path: impl Into<String>) -> Outcome {
		self.send(OutboundRequest::delete(path)).await
	}

	/// Sends a `POST` request with a JSON body.
	pub async fn post<B>(&self, path: impl Into<String>, body: &B) -> Result<Outcome>
	where
		B: ?Sized + Serialize,
	{
		Ok(self.send(OutboundRequest::post(path).json(body)?).await)
	}

	/// Sends a `PUT` request with a JSON body.
	pub async fn put<B>(&self, path: impl Into<String>, body: &B) -> Result<Outcome>
	where
		B: ?Sized + Serialize,
	{
		Ok(self.send(OutboundRequest::put(path).json(body)?).await)
	}

	/// Sends a `PATCH` request with a JSON body.
	pub async fn patch<B>(&self, path: impl Into<String>, body: &B) -> Result<Outcome>
	where
		B: ?Sized + Serialize,
	{
		Ok(self.send(OutboundRequest::patch(path).json(body)?).await)
	}

	async fn dispatch(&self, request: &mut OutboundRequest) -> Outcome {
		self.authorize(request).await;

		let raw = self.transport.transmit(request).await;

		self.coordinator.handle(&*self.transport, request, raw).await
	}

	async fn authorize(&self, request: &mut OutboundRequest) {
		// Read before the credential so a renewal landing in between is detected on `401`.
		let mut epoch = self.coordinator.epoch();
		let mut credential = self.coordinator.source().current_credential();

		let renewed = if !request.is_retried()
			&& credential.as_ref().is_some_and(|c| self.coordinator.should_renew_preemptively(c))
		{
			self.coordinator.renew_preemptively(epoch).await
		} else {
			None
		};

		if let Some(renewed) = renewed {
			epoch = self.coordinator.epoch();
			credential = Some(renewed);
		}

		request.authorize(credential.as_ref(), epoch);
	}
}
#[cfg(feature = "reqwest")]
impl Dispatcher<ReqwestTransport> {
	/// Validates `config` and builds a reqwest-backed dispatcher from it.
	pub fn from_config(
		config: &DispatcherConfig,
		source: Arc<dyn CredentialSource>,
	) -> Result<ReqwestDispatcher> {
		config.validate()?;

		let transport = ReqwestTransport::with_client(config.build_client()?, config.base_url.clone())
			.with_default_headers(config.header_map()?);

		Ok(Self::with_policy(Arc::new(transport), source, config.renewal))
	}
}
impl<T> Clone for Dispatcher<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self { transport: self.transport.clone(), coordinator: self.coordinator.clone() }
	}
}
impl<T> Debug for Dispatcher<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher").field("coordinator", &self.coordinator).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		credential::{Credential, RenewFuture, StaticCredentialSource},
		error::RenewalError,
		http::{RawOutcome, Response, TransportFuture},
		outcome::FailureKind,
	};

	/// Records the `Authorization` header of every transmission and answers from a script.
	#[derive(Default)]
	struct Recorder {
		seen: Mutex<Vec<Option<String>>>,
		script: Mutex<Vec<StatusCode>>,
	}
	impl Recorder {
		fn scripted(statuses: &[StatusCode]) -> Arc<Self> {
			let mut script = statuses.to_vec();

			script.reverse();

			Arc::new(Self { seen: Default::default(), script: Mutex::new(script) })
		}

		fn seen(&self) -> Vec<Option<String>> {
			self.seen.lock().clone()
		}
	}
	impl Transport for Recorder {
		fn transmit<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a> {
			Box::pin(async move {
				let header = request
					.headers()
					.get(AUTHORIZATION)
					.and_then(|value| value.to_str().ok())
					.map(str::to_owned);

				self.seen.lock().push(header);

				let status = self.script.lock().pop().unwrap_or(StatusCode::OK);

				RawOutcome::from(Response::new(status, "{}"))
			})
		}
	}

	struct Rotating {
		current: Mutex<Credential>,
		next: Credential,
	}
	impl CredentialSource for Rotating {
		fn current_credential(&self) -> Option<Credential> {
			Some(self.current.lock().clone())
		}

		fn renew(&self) -> RenewFuture<'_> {
			Box::pin(async move {
				*self.current.lock() = self.next.clone();

				Ok(self.next.clone())
			})
		}

		fn initiate_reauthentication(&self) {}
	}

	#[tokio::test]
	async fn attaches_current_credential() {
		let transport = Recorder::scripted(&[]);
		let dispatcher =
			Dispatcher::new(transport.clone(), Arc::new(StaticCredentialSource::new(Credential::new("t1"))));

		assert!(dispatcher.get("/me").await.is_success());
		assert_eq!(transport.seen(), vec![Some("Bearer t1".to_owned())]);
	}

	#[tokio::test]
	async fn anonymous_requests_strip_authorization() {
		let transport = Recorder::scripted(&[]);
		let dispatcher = Dispatcher::new(transport.clone(), Arc::new(StaticCredentialSource::anonymous()));
		let request = OutboundRequest::get("/public")
			.header(AUTHORIZATION, HeaderValue::from_static("Bearer forged"));

		assert!(dispatcher.send(request).await.is_success());
		assert_eq!(transport.seen(), vec![None]);
	}

	#[tokio::test]
	async fn static_source_401_surfaces_session_expired() {
		let transport = Recorder::scripted(&[StatusCode::UNAUTHORIZED]);
		let dispatcher =
			Dispatcher::new(transport.clone(), Arc::new(StaticCredentialSource::new(Credential::new("t1"))));
		let outcome = dispatcher.get("/me").await;

		assert_eq!(outcome.kind(), Some(FailureKind::SessionExpired));
		assert_eq!(transport.seen().len(), 1);
	}

	#[tokio::test]
	async fn replays_with_renewed_credential() {
		let transport = Recorder::scripted(&[StatusCode::UNAUTHORIZED, StatusCode::OK]);
		let source = Rotating { current: Mutex::new(Credential::new("old")), next: Credential::new("new") };
		let dispatcher = Dispatcher::new(transport.clone(), Arc::new(source));
		let outcome = dispatcher
			.post("/items", &serde_json::json!({ "name": "widget" }))
			.await
			.expect("JSON body should encode.");

		assert!(outcome.is_success());
		assert_eq!(transport.seen(), vec![Some("Bearer old".to_owned()), Some("Bearer new".to_owned())]);
		assert_eq!(dispatcher.renewal_metrics().started(), 1);
	}

	#[tokio::test]
	async fn second_401_after_replay_is_auth_expired() {
		let transport = Recorder::scripted(&[StatusCode::UNAUTHORIZED, StatusCode::UNAUTHORIZED]);
		let source = Rotating { current: Mutex::new(Credential::new("old")), next: Credential::new("new") };
		let dispatcher = Dispatcher::new(transport.clone(), Arc::new(source));

		assert_eq!(dispatcher.get("/me").await.kind(), Some(FailureKind::AuthExpired));
		assert_eq!(transport.seen().len(), 2);
	}

	#[tokio::test]
	async fn expiring_credential_is_renewed_before_dispatch() {
		let transport = Recorder::scripted(&[]);
		let source = Rotating {
			current: Mutex::new(Credential::new("old").with_expires_in(Duration::seconds(5))),
			next: Credential::new("new").with_expires_in(Duration::hours(1)),
		};
		let dispatcher = Dispatcher::new(transport.clone(), Arc::new(source));

		assert!(dispatcher.get("/me").await.is_success());
		assert_eq!(transport.seen(), vec![Some("Bearer new".to_owned())]);
		assert_eq!(dispatcher.coordinator().epoch(), 1);
	}

	#[tokio::test]
	async fn failed_preemptive_renewal_still_sends() {
		struct Failing;
		impl CredentialSource for Failing {
			fn current_credential(&self) -> Option<Credential> {
				Some(Credential::new("old").with_expires_in(Duration::seconds(5)))
			}

			fn renew(&self) -> RenewFuture<'_> {
				Box::pin(async { Err(RenewalError::Unreachable { message: "offline".into() }) })
			}

			fn initiate_reauthentication(&self) {}
		}

		let transport = Recorder::scripted(&[]);
		let dispatcher = Dispatcher::new(transport.clone(), Arc::new(Failing));

		assert!(dispatcher.get("/me").await.is_success());
		assert_eq!(transport.seen(), vec![Some("Bearer old".to_owned())]);
		assert_eq!(dispatcher.renewal_metrics().failed(), 1);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn from_config_rejects_invalid_configuration() {
		let config = DispatcherConfig::parse("ftp://files.example.com")
			.expect("Fixture URL should parse.");
		let err = Dispatcher::from_config(&config, Arc::new(StaticCredentialSource::anonymous()))
			.expect_err("Non-http base URLs should be rejected.");

		assert!(err.to_string().contains("ftp://files.example.com"));
	}
}

//! Single-flight credential renewal and the one-shot replay of rejected requests.
//!
//! Every `401 Unauthorized` that reaches [`RenewalCoordinator::handle`] on a request that was not
//! replayed yet joins the renewal already in flight or starts one. Exactly one call to
//! [`CredentialSource::renew`] runs per renewal, no matter how many requests wait on it. The call
//! runs on its own task and is bounded by [`RenewalPolicy::timeout`], so dropping a waiting
//! request never cancels or wedges the renewal for the others.

pub mod metrics;

mod state;

pub use metrics::RenewalMetrics;

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	classify::{self, classify},
	credential::{Credential, CredentialSource},
	error::{ConfigError, RenewalError},
	http::{OutboundRequest, RawOutcome, Transport},
	obs::{self, RenewalEvent, RequestSpan, Stage},
	outcome::Outcome,
};
use state::{Acquired, PendingRenewal, RenewalResult, RenewalState, SlotRelease};

/// Default upper bound for a single `renew()` call.
pub const DEFAULT_RENEWAL_TIMEOUT: Duration = Duration::seconds(10);
/// Default window before expiry in which a credential is renewed ahead of dispatch.
pub const DEFAULT_PREEMPTIVE_WINDOW: Duration = Duration::seconds(30);

/// Tunables for the renewal coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenewalPolicy {
	/// Upper bound for one `renew()` call; exceeding it fails the renewal.
	#[serde(with = "crate::config::seconds")]
	pub timeout: Duration,
	/// Credentials whose expiry hint falls inside this window are renewed before dispatch.
	///
	/// A zero window disables preemptive renewal.
	#[serde(with = "crate::config::seconds")]
	pub preemptive_window: Duration,
}
impl RenewalPolicy {
	/// Overrides the renewal timeout. Negative timeouts are clamped to zero, which
	/// [`validate`](Self::validate) rejects.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = if timeout.is_negative() { Duration::ZERO } else { timeout };

		self
	}

	/// Overrides the preemptive window. Negative windows are clamped to zero.
	pub fn with_preemptive_window(mut self, window: Duration) -> Self {
		self.preemptive_window = if window.is_negative() { Duration::ZERO } else { window };

		self
	}

	/// Disables preemptive renewal.
	pub fn without_preemptive_renewal(self) -> Self {
		self.with_preemptive_window(Duration::ZERO)
	}

	/// Checks that the timeout is strictly positive.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.timeout.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "renewal.timeout" });
		}
		if self.preemptive_window.is_negative() {
			return Err(ConfigError::NonPositiveDuration { field: "renewal.preemptive_window" });
		}

		Ok(())
	}
}
impl Default for RenewalPolicy {
	fn default() -> Self {
		Self { timeout: DEFAULT_RENEWAL_TIMEOUT, preemptive_window: DEFAULT_PREEMPTIVE_WINDOW }
	}
}

/// Serializes credential renewals across every request sharing one coordinator.
///
/// Clones share the in-flight marker, epoch, and metrics.
#[derive(Clone)]
pub struct RenewalCoordinator {
	source: Arc<dyn CredentialSource>,
	policy: RenewalPolicy,
	state: Arc<RenewalState>,
	metrics: Arc<RenewalMetrics>,
}
impl RenewalCoordinator {
	/// Creates a coordinator renewing through `source`.
	pub fn new(source: Arc<dyn CredentialSource>, policy: RenewalPolicy) -> Self {
		Self { source, policy, state: Default::default(), metrics: Default::default() }
	}

	/// Returns the credential source.
	pub fn source(&self) -> &Arc<dyn CredentialSource> {
		&self.source
	}

	/// Returns the active policy.
	pub fn policy(&self) -> &RenewalPolicy {
		&self.policy
	}

	/// Returns the renewal counters.
	pub fn metrics(&self) -> &RenewalMetrics {
		&self.metrics
	}

	/// Returns `true` while a renewal is in flight.
	pub fn is_renewing(&self) -> bool {
		self.state.in_flight()
	}

	/// Number of successful renewals so far.
	pub fn epoch(&self) -> u64 {
		self.state.epoch()
	}

	/// Resolves a first-attempt result into the final [`Outcome`].
	///
	/// Results other than a `401` on a request that was not replayed yet are classified as is. For
	/// those `401`s the request is marked as replayed, a renewal is joined or started, and on
	/// success the request is sent once more with the new credential. A failed renewal yields
	/// [`FailureKind::SessionExpired`](crate::outcome::FailureKind::SessionExpired) and the
	/// source is asked to re-authenticate exactly once for that renewal.
	pub async fn handle<T>(
		&self,
		transport: &T,
		request: &mut OutboundRequest,
		raw: RawOutcome,
	) -> Outcome
	where
		T: ?Sized + Transport,
	{
		if request.is_retried() || !raw.is_unauthorized() {
			return classify(raw);
		}

		request.mark_retried();

		let pending = match self.acquire(request.epoch()) {
			Ticket::Reuse(credential) => return self.replay(transport, request, credential).await,
			Ticket::Wait(pending) => pending,
		};

		match pending.wait().await {
			Ok(credential) => self.replay(transport, request, credential).await,
			Err(e) => {
				if pending.claim_reauthentication() {
					self.source.initiate_reauthentication();
				}

				classify::session_expired(&e)
			},
		}
	}

	/// Returns `true` when `credential` should be renewed before it is attached.
	pub fn should_renew_preemptively(&self, credential: &Credential) -> bool {
		let window = self.policy.preemptive_window;
		let now = OffsetDateTime::now_utc();

		window.is_positive()
			&& credential.expires_within(window, now)
			&& !self.state.renewed_within(window, now)
	}

	/// Renews ahead of dispatch, sharing the single-flight slot with `401` renewals.
	///
	/// Failures are logged and yield `None`; the caller proceeds with the credential it has and
	/// the regular `401` path takes over.
	pub async fn renew_preemptively(&self, seen_epoch: u64) -> Option<Credential> {
		match self.acquire(seen_epoch) {
			Ticket::Reuse(credential) => Some(credential),
			Ticket::Wait(pending) => match pending.wait().await {
				Ok(credential) => Some(credential),
				Err(e) => {
					obs::preemptive_renewal_failed(&e);

					None
				},
			},
		}
	}

	async fn replay<T>(
		&self,
		transport: &T,
		request: &mut OutboundRequest,
		credential: Credential,
	) -> Outcome
	where
		T: ?Sized + Transport,
	{
		request.authorize(Some(&credential), self.state.epoch());

		let span = RequestSpan::new(Stage::Replay, request.method(), request.path());
		let raw = span.instrument(transport.transmit(request)).await;

		classify(raw)
	}

	fn acquire(&self, mut seen_epoch: u64) -> Ticket {
		loop {
			match self.state.acquire(seen_epoch, |id| self.spawn_renewal(id)) {
				Acquired::Started(pending) => {
					self.metrics.record_started();
					obs::renewal_event(RenewalEvent::Started, pending.id);

					return Ticket::Wait(pending);
				},
				Acquired::Joined(pending) => {
					self.metrics.record_joined();
					obs::renewal_event(RenewalEvent::Joined, pending.id);

					return Ticket::Wait(pending);
				},
				Acquired::Advanced => {
					let epoch = self.state.epoch();

					if let Some(credential) =
						self.source.current_credential().filter(|credential| !credential.is_empty())
					{
						self.metrics.record_reused();
						obs::renewal_event(RenewalEvent::Reused, epoch);

						return Ticket::Reuse(credential);
					}

					// Renewed, but the source has nothing to serve; renew again.
					seen_epoch = epoch;
				},
			}
		}
	}

	fn spawn_renewal(&self, id: u64) -> JoinHandle<RenewalResult> {
		let source = self.source.clone();
		let state = self.state.clone();
		let metrics = self.metrics.clone();
		let timeout = self.policy.timeout;
		let release = SlotRelease::new(state.clone(), id);

		tokio::spawn(async move {
			let _release = release;
			let result = match tokio::time::timeout(timeout.unsigned_abs(), source.renew()).await {
				Ok(result) => result,
				Err(_) => Err(RenewalError::TimedOut { after: timeout }),
			};

			match &result {
				Ok(_) => {
					metrics.record_success();
					obs::renewal_event(RenewalEvent::Succeeded, id);
				},
				Err(e) => {
					metrics.record_failure(matches!(e, RenewalError::TimedOut { .. }));
					obs::renewal_failed(e, id);
				},
			}

			state.finish(id, &result);

			result
		})
	}
}
impl Debug for RenewalCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RenewalCoordinator")
			.field("policy", &self.policy)
			.field("state", &self.state)
			.field("metrics", &self.metrics)
			.finish()
	}
}

enum Ticket {
	Reuse(Credential),
	Wait(PendingRenewal),
}

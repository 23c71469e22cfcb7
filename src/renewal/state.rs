//! Single-flight bookkeeping shared by every request of one coordinator.

// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
// self
use crate::{_prelude::*, credential::Credential, error::RenewalError, obs};

pub(crate) type RenewalResult = Result<Credential, RenewalError>;

/// Handle on one renewal; clones observe the same result.
#[derive(Clone)]
pub(crate) struct PendingRenewal {
	pub(crate) id: u64,
	result: Shared<BoxFuture<'static, RenewalResult>>,
	reauthentication_claimed: Arc<AtomicBool>,
}
impl PendingRenewal {
	fn new(id: u64, task: JoinHandle<RenewalResult>) -> Self {
		let result = async move { task.await.unwrap_or(Err(RenewalError::Aborted)) }.boxed().shared();

		Self { id, result, reauthentication_claimed: Default::default() }
	}

	/// Waits for the renewal. Dropping the returned future does not cancel the renewal task.
	pub(crate) async fn wait(&self) -> RenewalResult {
		self.result.clone().await
	}

	/// Returns `true` for exactly one caller per renewal.
	pub(crate) fn claim_reauthentication(&self) -> bool {
		!self.reauthentication_claimed.swap(true, Ordering::AcqRel)
	}
}
impl Debug for PendingRenewal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingRenewal").field("id", &self.id).finish()
	}
}

/// Result of [`RenewalState::acquire`].
#[derive(Debug)]
pub(crate) enum Acquired {
	/// A renewal completed after the caller's epoch and none is in flight.
	Advanced,
	/// The caller attached to the renewal already in flight.
	Joined(PendingRenewal),
	/// The caller started a new renewal.
	Started(PendingRenewal),
}

/// Process-wide renewal marker.
///
/// Invariant: `slot.pending` is `Some` exactly while a renewal task is running, and `epoch` only
/// grows, by one per successful renewal, under the slot lock.
#[derive(Debug, Default)]
pub(crate) struct RenewalState {
	slot: Mutex<Slot>,
	epoch: AtomicU64,
	next_id: AtomicU64,
}
impl RenewalState {
	pub(crate) fn epoch(&self) -> u64 {
		self.epoch.load(Ordering::Acquire)
	}

	pub(crate) fn in_flight(&self) -> bool {
		self.slot.lock().pending.is_some()
	}

	pub(crate) fn renewed_within(&self, window: Duration, now: OffsetDateTime) -> bool {
		self.slot.lock().renewed_at.is_some_and(|renewed_at| now - renewed_at < window)
	}

	/// Joins the in-flight renewal, reports that one completed since `seen_epoch`, or starts a
	/// new one through `spawn`.
	pub(crate) fn acquire<F>(&self, seen_epoch: u64, spawn: F) -> Acquired
	where
		F: FnOnce(u64) -> JoinHandle<RenewalResult>,
	{
		let mut slot = self.slot.lock();

		if let Some(pending) = &slot.pending {
			return Acquired::Joined(pending.clone());
		}
		if self.epoch() > seen_epoch {
			return Acquired::Advanced;
		}

		let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
		let pending = PendingRenewal::new(id, spawn(id));

		slot.pending = Some(pending.clone());

		Acquired::Started(pending)
	}

	/// Called by the renewal task once `renew()` resolved.
	pub(crate) fn finish(&self, id: u64, result: &RenewalResult) {
		let mut slot = self.slot.lock();

		if result.is_ok() {
			self.epoch.fetch_add(1, Ordering::AcqRel);
			slot.renewed_at = Some(OffsetDateTime::now_utc());
		}
		slot.release(id);
	}

	/// Frees the slot held by renewal `id`, if it still holds it.
	fn release(&self, id: u64) -> bool {
		self.slot.lock().release(id)
	}
}

/// Frees the slot when the renewal task ends, including when it panics or is dropped.
pub(crate) struct SlotRelease {
	state: Arc<RenewalState>,
	id: u64,
}
impl SlotRelease {
	pub(crate) fn new(state: Arc<RenewalState>, id: u64) -> Self {
		Self { state, id }
	}
}
impl Drop for SlotRelease {
	fn drop(&mut self) {
		if self.state.release(self.id) {
			obs::renewal_failed(&RenewalError::Aborted, self.id);
		}
	}
}

#[derive(Debug, Default)]
struct Slot {
	pending: Option<PendingRenewal>,
	renewed_at: Option<OffsetDateTime>,
}
impl Slot {
	fn release(&mut self, id: u64) -> bool {
		if self.pending.as_ref().is_some_and(|pending| pending.id == id) {
			self.pending = None;

			return true;
		}

		false
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn ready(result: RenewalResult) -> impl FnOnce(u64) -> JoinHandle<RenewalResult> {
		move |_| tokio::spawn(async move { result })
	}

	#[tokio::test]
	async fn second_acquire_joins_in_flight_renewal() {
		let state = RenewalState::default();
		let first = match state.acquire(0, ready(Ok(Credential::new("fresh")))) {
			Acquired::Started(pending) => pending,
			other => panic!("First acquire should start a renewal, got {other:?}."),
		};
		let second = match state.acquire(0, |_| panic!("Joined acquire must not spawn.")) {
			Acquired::Joined(pending) => pending,
			other => panic!("Second acquire should join, got {other:?}."),
		};

		assert_eq!(first.id, second.id);
		assert!(state.in_flight());

		let result = second.wait().await.expect("Joined renewal should succeed.");

		state.finish(first.id, &Ok(result.clone()));

		assert_eq!(result.expose(), "fresh");
		assert_eq!(first.wait().await.map(|c| c.expose().to_owned()), Ok("fresh".into()));
		assert!(!state.in_flight());
		assert_eq!(state.epoch(), 1);
	}

	#[tokio::test]
	async fn acquire_after_completed_renewal_reports_advanced() {
		let state = RenewalState::default();
		let pending = match state.acquire(0, ready(Ok(Credential::new("fresh")))) {
			Acquired::Started(pending) => pending,
			other => panic!("Acquire should start a renewal, got {other:?}."),
		};

		state.finish(pending.id, &pending.wait().await);

		assert!(matches!(state.acquire(0, |_| panic!("Must not spawn.")), Acquired::Advanced));
		assert!(matches!(state.acquire(1, ready(Err(RenewalError::Aborted))), Acquired::Started(_)));
	}

	#[tokio::test]
	async fn failed_renewal_keeps_epoch_and_claims_reauthentication_once() {
		let state = RenewalState::default();
		let pending = match state.acquire(0, ready(Err(RenewalError::MissingRefreshToken))) {
			Acquired::Started(pending) => pending,
			other => panic!("Acquire should start a renewal, got {other:?}."),
		};
		let result = pending.wait().await;

		state.finish(pending.id, &result);

		assert_eq!(result, Err(RenewalError::MissingRefreshToken));
		assert_eq!(state.epoch(), 0);
		assert!(pending.claim_reauthentication());
		assert!(!pending.clone().claim_reauthentication());
	}

	#[tokio::test]
	async fn panicking_renewal_surfaces_as_aborted_and_frees_slot() {
		let state = Arc::new(RenewalState::default());
		let pending = match state.acquire(0, |id| {
			let release = SlotRelease::new(state.clone(), id);

			tokio::spawn(async move {
				let _release = release;

				panic!("renewal blew up")
			})
		}) {
			Acquired::Started(pending) => pending,
			other => panic!("Acquire should start a renewal, got {other:?}."),
		};

		assert_eq!(pending.wait().await, Err(RenewalError::Aborted));
		assert!(!state.in_flight());
		assert_eq!(state.epoch(), 0);
		assert!(matches!(
			state.acquire(0, ready(Ok(Credential::new("fresh")))),
			Acquired::Started(next) if next.id != pending.id
		));
	}
}

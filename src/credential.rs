//! Bearer credentials and the [`CredentialSource`] contract the dispatcher renews through.

#[cfg(feature = "reqwest")] pub mod refresh;

#[cfg(feature = "reqwest")] pub use refresh::RefreshTokenSource;

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, error::RenewalError};

/// Boxed future returned by [`CredentialSource::renew`].
pub type RenewFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, RenewalError>> + 'a + Send>>;

/// Holder of the current bearer credential.
///
/// The dispatcher only reads [`current_credential`](CredentialSource::current_credential) and
/// never writes to the source. [`renew`](CredentialSource::renew) is called by the renewal
/// coordinator, at most once per in-flight renewal, and the source is expected to make the
/// returned credential its new current one before the future resolves.
pub trait CredentialSource
where
	Self: 'static + Send + Sync,
{
	/// Returns the credential to attach to outbound requests, if any.
	fn current_credential(&self) -> Option<Credential>;

	/// Obtains a fresh credential from the identity provider.
	fn renew(&self) -> RenewFuture<'_>;

	/// Starts an interactive login out of band. Must return promptly.
	fn initiate_reauthentication(&self);
}

/// Opaque bearer token plus an optional expiry hint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	token: String,
	expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Wraps a bearer token without an expiry hint.
	pub fn new(token: impl Into<String>) -> Self {
		Self { token: token.into(), expires_at: None }
	}

	/// Wraps a JWT bearer token, reading the expiry hint from its `exp` claim.
	///
	/// Tokens that are not JWTs, or that carry no usable `exp`, yield a credential without a
	/// hint.
	pub fn from_jwt(token: impl Into<String>) -> Self {
		let token = token.into();
		let expires_at = jwt_expiry(&token);

		Self { token, expires_at }
	}

	/// Sets the absolute expiry hint.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the expiry hint relative to now.
	pub fn with_expires_in(self, ttl: Duration) -> Self {
		self.with_expires_at(OffsetDateTime::now_utc() + ttl)
	}

	/// Returns the raw bearer token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.token
	}

	/// Returns the expiry hint, if known.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Returns `true` when the bearer token is empty.
	pub fn is_empty(&self) -> bool {
		self.token.is_empty()
	}

	/// Returns `true` when the expiry hint falls within `window` of `now`.
	///
	/// Credentials without a hint never report as expiring.
	pub fn expires_within(&self, window: Duration, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at - now <= window)
	}

	/// Builds the `Authorization` header value for this credential.
	///
	/// Returns `None` for empty tokens and tokens that are not valid header characters.
	pub fn bearer_header(&self) -> Option<HeaderValue> {
		if self.is_empty() {
			return None;
		}

		let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token)).ok()?;

		value.set_sensitive(true);

		Some(value)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
impl Display for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Source that always serves the same credential and cannot renew it.
///
/// Useful for long-lived service tokens: a `401` surfaces as
/// [`FailureKind::SessionExpired`](crate::outcome::FailureKind::SessionExpired) after the
/// rejected renewal, and the optional hook is told to re-authenticate.
pub struct StaticCredentialSource {
	credential: Option<Credential>,
	on_reauthenticate: Option<Box<dyn Fn() + Send + Sync>>,
}
impl StaticCredentialSource {
	/// Serves `credential` for every request.
	pub fn new(credential: Credential) -> Self {
		Self { credential: Some(credential), on_reauthenticate: None }
	}

	/// Sends every request unauthenticated.
	pub fn anonymous() -> Self {
		Self { credential: None, on_reauthenticate: None }
	}

	/// Registers the hook fired by [`CredentialSource::initiate_reauthentication`].
	pub fn on_reauthenticate(mut self, hook: impl 'static + Fn() + Send + Sync) -> Self {
		self.on_reauthenticate = Some(Box::new(hook));

		self
	}
}
impl CredentialSource for StaticCredentialSource {
	fn current_credential(&self) -> Option<Credential> {
		self.credential.clone()
	}

	fn renew(&self) -> RenewFuture<'_> {
		Box::pin(async {
			Err(RenewalError::Rejected { reason: "static credentials cannot be renewed".into() })
		})
	}

	fn initiate_reauthentication(&self) {
		if let Some(hook) = &self.on_reauthenticate {
			hook();
		}
	}
}
impl Debug for StaticCredentialSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StaticCredentialSource")
			.field("credential", &self.credential)
			.field("on_reauthenticate_set", &self.on_reauthenticate.is_some())
			.finish()
	}
}

#[derive(Deserialize)]
struct ExpiryClaim {
	exp: Option<i64>,
}

fn jwt_expiry(token: &str) -> Option<OffsetDateTime> {
	let mut segments = token.split('.');
	let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);

	if segments.next().is_some() {
		return None;
	}

	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
	let claim = serde_json::from_slice::<ExpiryClaim>(&bytes).ok()?;

	OffsetDateTime::from_unix_timestamp(claim.exp?).ok()
}

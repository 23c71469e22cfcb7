//! Transport primitives: outbound requests, raw outcomes, and the [`Transport`] seam.
//!
//! The dispatcher's only dependency on an HTTP stack is [`Transport`]. Implementations turn an
//! [`OutboundRequest`] into a [`RawOutcome`] and must never fail in any other way: every
//! connection, DNS, TLS, or timeout problem becomes [`RawOutcome::NoResponse`] so the
//! classifier can map it. [`ReqwestTransport`] is the default implementation.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	credential::Credential,
	error::{ConfigError, DecodeError},
};

/// Boxed future returned by [`Transport::transmit`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = RawOutcome> + 'a + Send>>;

/// Abstraction over HTTP stacks that can deliver an [`OutboundRequest`].
///
/// Implementations must be `Send + Sync + 'static` so a dispatcher can be shared across tasks,
/// and `transmit` may be called twice for the same request (first attempt plus one replay).
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Sends the request and reports what came back.
	fn transmit<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a>;
}

/// A single outbound call, created per [`send`](crate::dispatch::Dispatcher::send).
#[derive(Clone, Debug)]
pub struct OutboundRequest {
	method: Method,
	path: String,
	headers: HeaderMap,
	body: Option<Vec<u8>>,
	retried: bool,
	epoch: u64,
}
impl OutboundRequest {
	/// Creates a request for `path`, resolved against the transport's base URL.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: HeaderMap::new(),
			body: None,
			retried: false,
			epoch: 0,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Shorthand for a `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets a raw body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `value` as the JSON body and sets `content-type: application/json`.
	pub fn json<T>(mut self, value: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(value).map_err(|source| DecodeError::Encode { source })?;

		self.headers
			.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Some(body);

		Ok(self)
	}

	/// Overrides the retried flag.
	///
	/// A request that starts out retried is never eligible for credential renewal; a `401`
	/// comes back as [`FailureKind::AuthExpired`](crate::outcome::FailureKind::AuthExpired).
	pub fn with_retried(mut self, retried: bool) -> Self {
		self.retried = retried;

		self
	}

	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Path (and optional query) relative to the base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Request headers, including the attached authorization header once authorized.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Request body, if any.
	pub fn body_bytes(&self) -> Option<&[u8]> {
		self.body.as_deref()
	}

	/// Returns `true` once the request has used its renewal cycle.
	pub fn is_retried(&self) -> bool {
		self.retried
	}

	pub(crate) fn mark_retried(&mut self) {
		self.retried = true;
	}

	pub(crate) fn epoch(&self) -> u64 {
		self.epoch
	}

	/// Attaches `credential` as the bearer header, or strips authorization when it is unusable.
	pub(crate) fn authorize(&mut self, credential: Option<&Credential>, epoch: u64) {
		self.epoch = epoch;

		match credential.and_then(Credential::bearer_header) {
			Some(value) => {
				self.headers.insert(AUTHORIZATION, value);
			},
			None => {
				self.headers.remove(AUTHORIZATION);
			},
		}
	}
}

/// What a transport observed for one transmission.
#[derive(Clone, Debug)]
pub enum RawOutcome {
	/// The server answered, with any status.
	Response(Response),
	/// Nothing came back (connection refused, DNS, TLS, timeout, ...).
	NoResponse(NoResponse),
}
impl RawOutcome {
	/// Status code, when a response was received.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Response(response) => Some(response.status),
			Self::NoResponse(_) => None,
		}
	}

	/// Returns `true` for a `401 Unauthorized` response.
	pub fn is_unauthorized(&self) -> bool {
		self.status() == Some(StatusCode::UNAUTHORIZED)
	}
}
impl From<Response> for RawOutcome {
	fn from(response: Response) -> Self {
		Self::Response(response)
	}
}
impl From<NoResponse> for RawOutcome {
	fn from(failure: NoResponse) -> Self {
		Self::NoResponse(failure)
	}
}

/// Details of a transmission that produced no response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoResponse {
	/// Transport failure summary.
	pub reason: String,
	/// Whether the failure was a timeout.
	pub timed_out: bool,
}
impl NoResponse {
	/// Creates a non-timeout failure.
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into(), timed_out: false }
	}

	/// Creates a timeout failure.
	pub fn timed_out(reason: impl Into<String>) -> Self {
		Self { reason: reason.into(), timed_out: true }
	}
}

/// HTTP response as received from the server.
#[derive(Clone, Debug)]
pub struct Response {
	/// Status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body.
	pub body: Vec<u8>,
}
impl Response {
	/// Creates a response with no headers.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Decodes the body as JSON, reporting the path to the first mismatching field.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| DecodeError::Json { source }.into())
	}

	/// Decodes the body as UTF-8 text.
	pub fn text(&self) -> Result<String> {
		String::from_utf8(self.body.clone()).map_err(|e| DecodeError::from(e).into())
	}
}

/// reqwest-backed [`Transport`] that resolves paths against a base URL.
///
/// Redirects are followed with reqwest's default policy. Every reqwest failure becomes
/// [`RawOutcome::NoResponse`], including failures while reading the body.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	base_url: Url,
	default_headers: HeaderMap,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps a default reqwest client.
	pub fn new(base_url: Url) -> Self {
		Self::with_client(ReqwestClient::default(), base_url)
	}

	/// Wraps an existing reqwest client.
	pub fn with_client(client: ReqwestClient, base_url: Url) -> Self {
		Self { client, base_url, default_headers: HeaderMap::new() }
	}

	/// Sets headers applied to every request unless the request sets them itself.
	pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
		self.default_headers = headers;

		self
	}

	/// Base URL requests are resolved against.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Joins `path` onto the base URL, keeping any base path prefix.
	pub fn resolve(&self, path: &str) -> Result<Url> {
		let joined = format!(
			"{}/{}",
			self.base_url.as_str().trim_end_matches('/'),
			path.trim_start_matches('/')
		);

		Url::parse(&joined).map_err(|source| ConfigError::InvalidBaseUrl { source }.into())
	}

	async fn execute(&self, request: &OutboundRequest) -> Result<Response, NoResponse> {
		let url = self.resolve(request.path()).map_err(|e| NoResponse::new(e.to_string()))?;
		let mut headers = self.default_headers.clone();

		for (name, value) in request.headers() {
			headers.insert(name.clone(), value.clone());
		}

		let mut builder = self.client.request(request.method().clone(), url).headers(headers);

		if let Some(body) = request.body_bytes() {
			builder = builder.body(body.to_vec());
		}

		let response = builder.send().await.map_err(no_response)?;
		let status = response.status();
		let headers = response.headers().to_owned();
		let body = response.bytes().await.map_err(no_response)?.to_vec();

		Ok(Response { status, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn transmit<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			match self.execute(request).await {
				Ok(response) => RawOutcome::Response(response),
				Err(failure) => RawOutcome::NoResponse(failure),
			}
		})
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}

#[cfg(feature = "reqwest")]
fn no_response(err: ReqwestError) -> NoResponse {
	if err.is_timeout() {
		NoResponse::timed_out(err.to_string())
	} else {
		NoResponse::new(err.to_string())
	}
}

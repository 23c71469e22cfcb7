//! [`CredentialSource`] backed by an OAuth 2.0 token endpoint and the `refresh_token` grant.
//!
//! The source keeps the access credential and refresh token in memory. An interactive login
//! performed elsewhere seeds them through [`RefreshTokenSource::store_tokens`]; afterwards every
//! renewal exchanges the refresh token at the token endpoint (for Keycloak,
//! `{server}/realms/{realm}/protocol/openid-connect/token`) and rotates it when the provider
//! issues a new one.

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, HttpRequest, HttpResponse, RefreshToken, RequestTokenError, Scope,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	credential::{Credential, CredentialSource, RenewFuture},
	error::{ConfigError, RenewalError},
	obs,
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type ReauthenticateHook = Box<dyn Fn() + Send + Sync>;

/// Credential source that renews through the `refresh_token` grant.
pub struct RefreshTokenSource {
	oauth_client: ConfiguredBasicClient,
	http_client: TokenEndpointClient,
	scopes: Vec<String>,
	tokens: RwLock<TokenPair>,
	renew_guard: AsyncMutex<()>,
	on_reauthenticate: Option<ReauthenticateHook>,
}
impl RefreshTokenSource {
	/// Creates a public-client source for the given token endpoint.
	///
	/// The internal reqwest client does not follow redirects; token endpoints answer directly.
	pub fn new(token_endpoint: &Url, client_id: impl Into<String>) -> Result<Self> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidTokenEndpoint { source })?;
		let http_client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self {
			oauth_client: BasicClient::new(ClientId::new(client_id.into())).set_token_uri(token_url),
			http_client: TokenEndpointClient(http_client),
			scopes: Vec::new(),
			tokens: RwLock::new(TokenPair::default()),
			renew_guard: AsyncMutex::new(()),
			on_reauthenticate: None,
		})
	}

	/// Authenticates as a confidential client (`client_secret_basic`).
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.oauth_client = self.oauth_client.set_client_secret(ClientSecret::new(secret.into()));

		self
	}

	/// Sends client credentials in the form body (`client_secret_post`) instead of a basic
	/// authorization header.
	pub fn with_credentials_in_body(mut self) -> Self {
		self.oauth_client = self.oauth_client.set_auth_type(AuthType::RequestBody);

		self
	}

	/// Requests the given scopes on every refresh.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Replaces the reqwest client used to reach the token endpoint.
	pub fn with_http_client(mut self, client: ReqwestClient) -> Self {
		self.http_client = TokenEndpointClient(client);

		self
	}

	/// Seeds the source with tokens obtained from an interactive login.
	pub fn with_tokens(self, access: Credential, refresh: impl Into<String>) -> Self {
		self.store_tokens(access, refresh);

		self
	}

	/// Registers the hook fired by [`CredentialSource::initiate_reauthentication`].
	pub fn on_reauthenticate(mut self, hook: impl 'static + Fn() + Send + Sync) -> Self {
		self.on_reauthenticate = Some(Box::new(hook));

		self
	}

	/// Replaces both tokens, typically once an interactive login completes.
	pub fn store_tokens(&self, access: Credential, refresh: impl Into<String>) {
		*self.tokens.write() = TokenPair { access: Some(access), refresh: Some(refresh.into()) };
	}

	/// Returns `true` while a refresh token is available.
	pub fn has_refresh_token(&self) -> bool {
		self.tokens.read().refresh.is_some()
	}

	async fn exchange(&self) -> Result<Credential, RenewalError> {
		let _serialized = self.renew_guard.lock().await;
		let refresh = self.tokens.read().refresh.clone().ok_or(RenewalError::MissingRefreshToken)?;
		let refresh_secret = RefreshToken::new(refresh);
		let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

		for scope in &self.scopes {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response =
			request.request_async(&self.http_client).await.map_err(map_request_error)?;
		let mut credential = Credential::from_jwt(response.access_token().secret().to_owned());

		if let Some(ttl) = response.expires_in().and_then(|ttl| Duration::try_from(ttl).ok()) {
			credential = credential.with_expires_in(ttl);
		}

		let mut tokens = self.tokens.write();

		tokens.access = Some(credential.clone());

		if let Some(rotated) = response.refresh_token() {
			tokens.refresh = Some(rotated.secret().to_owned());
		}

		Ok(credential)
	}
}
impl CredentialSource for RefreshTokenSource {
	fn current_credential(&self) -> Option<Credential> {
		self.tokens.read().access.clone()
	}

	fn renew(&self) -> RenewFuture<'_> {
		Box::pin(self.exchange())
	}

	fn initiate_reauthentication(&self) {
		// The refresh token was just rejected; keep it from being replayed.
		self.tokens.write().refresh = None;

		obs::reauthentication_requested();

		if let Some(hook) = &self.on_reauthenticate {
			hook();
		}
	}
}
impl Debug for RefreshTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let tokens = self.tokens.read();

		f.debug_struct("RefreshTokenSource")
			.field("scopes", &self.scopes)
			.field("access", &tokens.access)
			.field("refresh_token_set", &tokens.refresh.is_some())
			.field("on_reauthenticate_set", &self.on_reauthenticate.is_some())
			.finish()
	}
}

#[derive(Default)]
struct TokenPair {
	access: Option<Credential>,
	refresh: Option<String>,
}

/// reqwest adapter that satisfies the `oauth2` crate's [`AsyncHttpClient`] contract.
#[derive(Clone)]
struct TokenEndpointClient(ReqwestClient);
impl<'c> AsyncHttpClient<'c> for TokenEndpointClient {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

fn map_request_error(err: BasicRequestTokenError<HttpClientError<ReqwestError>>) -> RenewalError {
	match err {
		RequestTokenError::ServerResponse(response) => RenewalError::Rejected {
			reason: response
				.error_description()
				.cloned()
				.unwrap_or_else(|| response.error().as_ref().to_owned()),
		},
		RequestTokenError::Request(error) => RenewalError::Unreachable { message: error.to_string() },
		RequestTokenError::Parse(error, _body) =>
			RenewalError::Rejected { reason: format!("malformed token response ({error})") },
		RequestTokenError::Other(message) => RenewalError::Unreachable { message },
	}
}

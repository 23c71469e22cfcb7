//! Demonstrates a reqwest-backed dispatcher renewing an expired access token through a
//! refresh-token source, then replaying the rejected request.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use bearer_dispatch::{
	config::DispatcherConfig,
	credential::{Credential, RefreshTokenSource},
	dispatch::Dispatcher,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/realms/demo/protocol/openid-connect/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access-2\",\"refresh_token\":\"demo-refresh-2\",\"token_type\":\"bearer\",\"expires_in\":300}",
			);
		})
		.await;

	server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/auth/user-info")
				.header("authorization", "Bearer demo-access-1");
			then.status(401).body("{\"detail\":\"Token expired\"}");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/auth/user-info")
				.header("authorization", "Bearer demo-access-2");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"username\":\"demo\",\"roles\":[\"user\"]}");
		})
		.await;

	let source = Arc::new(
		RefreshTokenSource::new(
			&Url::parse(&server.url("/realms/demo/protocol/openid-connect/token"))?,
			"demo-client",
		)?
		.with_tokens(Credential::new("demo-access-1"), "demo-refresh-1")
		.on_reauthenticate(|| println!("Login required; redirecting to the identity provider.")),
	);
	let config = DispatcherConfig::parse(&server.url("/api"))?;
	let dispatcher = Dispatcher::from_config(&config, source)?;
	let profile = dispatcher
		.get("/auth/user-info")
		.await
		.into_result()?
		.json::<serde_json::Value>()?;

	token_mock.assert_calls_async(1).await;

	println!("Profile: {profile}");
	println!("Renewals started: {}", dispatcher.renewal_metrics().started());

	Ok(())
}

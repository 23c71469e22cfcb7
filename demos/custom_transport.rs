//! Demonstrates plugging a custom [`Transport`] into the dispatcher.
//!
//! The transport below answers in-process: `401` until it sees the renewed credential, then
//! `200`. The credential source renews by swapping in a new token.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use parking_lot::Mutex;
// self
use bearer_dispatch::{
	credential::{Credential, CredentialSource, RenewFuture},
	dispatch::Dispatcher,
	http::{OutboundRequest, Response, Transport, TransportFuture},
	oauth2::http::{StatusCode, header::AUTHORIZATION},
};

struct InProcess;
impl Transport for InProcess {
	fn transmit<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			let accepted =
				request.headers().get(AUTHORIZATION).is_some_and(|value| value == "Bearer rotated");
			let status = if accepted { StatusCode::OK } else { StatusCode::UNAUTHORIZED };

			Response::new(status, format!("{{\"path\":\"{}\"}}", request.path())).into()
		})
	}
}

struct Rotating(Mutex<Credential>);
impl CredentialSource for Rotating {
	fn current_credential(&self) -> Option<Credential> {
		Some(self.0.lock().clone())
	}

	fn renew(&self) -> RenewFuture<'_> {
		Box::pin(async move {
			let credential = Credential::new("rotated");

			*self.0.lock() = credential.clone();

			Ok(credential)
		})
	}

	fn initiate_reauthentication(&self) {
		println!("Login required.");
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let dispatcher = Dispatcher::new(
		Arc::new(InProcess),
		Arc::new(Rotating(Mutex::new(Credential::new("initial")))),
	);
	let outcome = dispatcher.get("/items").await;

	println!("Outcome: {}", outcome.label());
	println!("Body: {}", outcome.into_result()?.text()?);

	Ok(())
}

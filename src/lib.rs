//! Bearer-authenticated HTTP dispatch with transparent, single-flight credential renewal.
//!
//! Every request sent through a [`Dispatcher`](dispatch::Dispatcher) carries the current bearer
//! credential. A `401` response triggers at most one renewal cycle for that request, shared with
//! every other request that hits `401` while the renewal is in flight, followed by a single
//! replay. Whatever happens, callers receive a classified [`Outcome`](outcome::Outcome) instead
//! of a raw transport error.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod classify;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod obs;
pub mod outcome;
pub mod renewal;

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::{
			Arc,
			atomic::{AtomicBool, AtomicU64, Ordering},
		},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use oauth2::http::{
		HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
		header::{self, AUTHORIZATION},
	};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};

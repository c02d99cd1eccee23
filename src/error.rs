// Error taxonomy for document loading and operation dispatch

use http::{HeaderMap, StatusCode};
use thiserror::Error;

/// Errors surfaced by loading a document or invoking an operation
#[derive(Error, Debug)]
pub enum Error {
	#[error("failed to read document: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse document: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("invalid document: {0}")]
	Validation(String),

	#[error("conflicting configuration: {0}")]
	Configuration(String),

	#[error("missing required parameter '{parameter}' for '{nickname}'")]
	MissingParameter { parameter: String, nickname: String },

	#[error("'{nickname}' does not have parameters {names:?}")]
	UnknownParameter {
		nickname: String,
		names: Vec<String>,
	},

	#[error("unsupported operation: {0}")]
	UnsupportedOperation(String),

	#[error(transparent)]
	Remote(#[from] RemoteError),

	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error("API has no resource '{0}'")]
	UnknownResource(String),

	#[error("resource '{resource}' has no operation '{name}'")]
	UnknownOperation { resource: String, name: String },
}

impl Error {
	pub fn validation(message: impl Into<String>) -> Self {
		Self::Validation(message.into())
	}

	pub fn configuration(message: impl Into<String>) -> Self {
		Self::Configuration(message.into())
	}

	pub fn missing_parameter(parameter: impl Into<String>, nickname: impl Into<String>) -> Self {
		Self::MissingParameter {
			parameter: parameter.into(),
			nickname: nickname.into(),
		}
	}
}

/// An HTTP response with status >= 400, surfaced to the caller unretried.
///
/// Carries the raw body text for diagnostics. For status 400 only, `parsed`
/// holds a best-effort JSON decode of the body for programmatic inspection;
/// a decode failure leaves it `None`.
#[derive(Error, Debug)]
#[error("remote service returned {status}")]
pub struct RemoteError {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: String,
	pub parsed: Option<serde_json::Value>,
}

/// Failures raised by the transport layer itself, before any HTTP status
/// exists. The connection-reset class is retried exactly once inside the
/// built-in transport; everything else surfaces directly.
#[derive(Error, Debug)]
pub enum TransportError {
	#[error("connection reset: {0}")]
	ConnectionReset(String),

	#[error("request failed: {0}")]
	Request(String),

	#[error("invalid url '{url}': {message}")]
	InvalidUrl { url: String, message: String },

	#[error("websocket failed: {0}")]
	Websocket(String),

	#[error("websocket already closed")]
	WebsocketClosed,

	#[error("close failed: {}", failures.join("; "))]
	Close { failures: Vec<String> },
}

impl TransportError {
	pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidUrl {
			url: url.into(),
			message: message.into(),
		}
	}

	/// Whether this failure is in the transient class that warrants one
	/// retry after recycling the session.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::ConnectionReset(_))
	}
}

impl From<reqwest::Error> for TransportError {
	fn from(err: reqwest::Error) -> Self {
		if err.is_connect() || has_reset_in_chain(&err) {
			Self::ConnectionReset(err.to_string())
		} else {
			Self::Request(err.to_string())
		}
	}
}

/// Walk the source chain looking for an I/O error in the reset family. Mid
/// transfer resets surface from hyper wrapped several levels deep.
fn has_reset_in_chain(err: &(dyn std::error::Error + 'static)) -> bool {
	let mut source = err.source();
	while let Some(cause) = source {
		if let Some(io) = cause.downcast_ref::<std::io::Error>() {
			if matches!(
				io.kind(),
				std::io::ErrorKind::ConnectionReset
					| std::io::ErrorKind::ConnectionAborted
					| std::io::ErrorKind::BrokenPipe
					| std::io::ErrorKind::UnexpectedEof
			) {
				return true;
			}
		}
		source = cause.source();
	}
	false
}

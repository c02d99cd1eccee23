// Transport capability consumed by the loader and dispatcher
//
// The core never touches sockets itself: one HTTP request or one WebSocket
// upgrade at a time goes through this trait. `HttpTransport` is the built-in
// implementation; tests substitute their own.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{RemoteError, TransportError};

/// Ordered query parameters, appended in declaration order.
pub type QueryParams = Vec<(String, String)>;

/// A shareable open WebSocket connection. The transport keeps a clone of
/// every handle it hands out so `close()` can tear them all down.
pub type Websocket = Arc<dyn WebsocketHandle>;

/// Executes network I/O on behalf of the client.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Issue one HTTP request. Returns the response whatever its status;
	/// status mapping is the caller's concern.
	async fn request(
		&self,
		method: Method,
		url: &str,
		params: &QueryParams,
		body: Option<Bytes>,
		headers: HeaderMap,
	) -> Result<Response, TransportError>;

	/// Upgrade to a WebSocket connection. The returned handle stays
	/// registered with the transport until `close()`.
	async fn ws_connect(
		&self,
		url: &str,
		params: &QueryParams,
		headers: HeaderMap,
	) -> Result<Websocket, TransportError>;

	/// Release transport resources: every registered WebSocket handle and
	/// then the underlying session, best-effort even if individual closes
	/// fail.
	async fn close(&self) -> Result<(), TransportError>;
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
	status: StatusCode,
	headers: HeaderMap,
	body: Bytes,
}

impl Response {
	pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
		Self {
			status,
			headers,
			body,
		}
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}

	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	pub fn bytes(&self) -> &Bytes {
		&self.body
	}

	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
		serde_json::from_slice(&self.body)
	}

	/// Map status >= 400 into a [`RemoteError`] carrying status, headers,
	/// and raw body text. Only a 400 attempts a JSON decode of the body;
	/// decode failure is swallowed and the parsed payload left empty.
	pub fn error_for_status(self) -> Result<Response, RemoteError> {
		if self.status.as_u16() < 400 {
			return Ok(self);
		}
		let body = self.text();
		let parsed = if self.status == StatusCode::BAD_REQUEST {
			serde_json::from_str(&body).ok()
		} else {
			None
		};
		Err(RemoteError {
			status: self.status,
			headers: self.headers,
			body,
			parsed,
		})
	}
}

/// A message received over an open WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
	Text(String),
	Binary(Bytes),
}

/// One open WebSocket connection.
#[async_trait]
pub trait WebsocketHandle: Send + Sync {
	/// Next data message, or `None` once the peer has closed.
	async fn recv(&self) -> Result<Option<WsMessage>, TransportError>;

	async fn send_text(&self, text: &str) -> Result<(), TransportError>;

	/// Close the connection. Idempotent.
	async fn close(&self) -> Result<(), TransportError>;
}

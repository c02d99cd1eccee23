// Built-in Transport backed by reqwest and tokio-tungstenite
//
// Owns the connection pool, the live authenticator slot, and the registry of
// open WebSocket handles. A transient connection-reset failure triggers
// exactly one retry of the same request after recycling the session; no
// other failure class retries, and the retry itself is never retried.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::{HeaderMap, Method};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use crate::auth::Authenticator;
use crate::error::TransportError;
use crate::transport::{QueryParams, Response, Transport, Websocket, WebsocketHandle, WsMessage};

/// Session limits for the built-in transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
	/// Per-request timeout.
	pub timeout: Duration,
	/// Idle connections kept alive per host.
	pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			timeout: Duration::from_secs(600),
			pool_max_idle_per_host: 1,
		}
	}
}

/// The default [`Transport`] implementation.
pub struct HttpTransport {
	config: TransportConfig,
	session: ArcSwap<reqwest::Client>,
	authenticator: ArcSwap<Option<Authenticator>>,
	websockets: WebsocketRegistry,
}

impl HttpTransport {
	pub fn new() -> Result<Self, TransportError> {
		Self::with_config(TransportConfig::default())
	}

	pub fn with_config(config: TransportConfig) -> Result<Self, TransportError> {
		let session = build_session(&config)?;
		Ok(Self {
			config,
			session: ArcSwap::from_pointee(session),
			authenticator: ArcSwap::from_pointee(None),
			websockets: WebsocketRegistry::default(),
		})
	}

	/// Install an authenticator, replacing any previous one.
	pub fn set_authenticator(&self, authenticator: Authenticator) {
		self.authenticator.store(Arc::new(Some(authenticator)));
	}

	/// Scope HTTP Basic credentials to `host` (`None` matches any host).
	pub fn set_basic_auth(
		&self,
		host: Option<String>,
		username: impl Into<String>,
		password: impl Into<String>,
	) {
		self.set_authenticator(Authenticator::basic(host, username, password));
	}

	/// Scope an API key, sent as the conventional `api_key` query
	/// parameter, to `host` (`None` matches any host).
	pub fn set_api_key(&self, host: Option<String>, key: impl Into<String>) {
		self.set_authenticator(Authenticator::api_key(host, key));
	}

	/// Scope an API key, sent as query parameter `param_name`, to `host`.
	pub fn set_api_key_as(
		&self,
		host: Option<String>,
		key: impl Into<String>,
		param_name: impl Into<String>,
	) {
		self.set_authenticator(Authenticator::api_key_as(host, key, param_name));
	}

	/// Apply the authenticator to this request's headers and query set if
	/// its host scope matches the target.
	fn authenticate(&self, url: &Url, headers: &mut HeaderMap, params: &mut QueryParams) {
		let guard = self.authenticator.load();
		if let Some(auth) = guard.as_ref() {
			if auth.matches(url) {
				auth.apply(headers, params);
			}
		}
	}

	/// Swap in a fresh session, releasing the old pool's connections.
	fn recycle_session(&self) -> Result<(), TransportError> {
		let fresh = build_session(&self.config)?;
		self.session.store(Arc::new(fresh));
		Ok(())
	}

	async fn send_once(
		&self,
		method: &Method,
		url: &str,
		params: &QueryParams,
		body: Option<&Bytes>,
		headers: &HeaderMap,
	) -> Result<Response, TransportError> {
		let session = self.session.load_full();
		let mut request = session
			.request(method.clone(), url)
			.headers(headers.clone());
		if !params.is_empty() {
			request = request.query(params);
		}
		if let Some(body) = body {
			request = request.body(body.clone());
		}

		let response = request.send().await?;
		let status = response.status();
		let headers = response.headers().clone();
		let body = response.bytes().await?;
		Ok(Response::new(status, headers, body))
	}
}

fn build_session(config: &TransportConfig) -> Result<reqwest::Client, TransportError> {
	reqwest::Client::builder()
		.timeout(config.timeout)
		.pool_max_idle_per_host(config.pool_max_idle_per_host)
		.build()
		.map_err(|e| TransportError::Request(format!("failed to build http session: {e}")))
}

/// Run `attempt`; a failure in the transient reset class recycles the
/// session and runs it exactly once more. The second outcome surfaces
/// unchanged, so a retry is never itself retried, and no other failure
/// class retries at all.
async fn retry_once_on_reset<T, Fut>(
	url: &str,
	attempt: impl Fn() -> Fut,
	recycle: impl Fn() -> Result<(), TransportError>,
) -> Result<T, TransportError>
where
	Fut: Future<Output = Result<T, TransportError>>,
{
	match attempt().await {
		Ok(value) => Ok(value),
		Err(err) if err.is_transient() => {
			warn!(%url, error = %err, "connection reset, recycling session and retrying once");
			recycle()?;
			attempt().await
		},
		Err(err) => Err(err),
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn request(
		&self,
		method: Method,
		url: &str,
		params: &QueryParams,
		body: Option<Bytes>,
		headers: HeaderMap,
	) -> Result<Response, TransportError> {
		let parsed =
			Url::parse(url).map_err(|e| TransportError::invalid_url(url, e.to_string()))?;

		let mut params = params.clone();
		let mut headers = headers;
		self.authenticate(&parsed, &mut headers, &mut params);

		retry_once_on_reset(
			url,
			async || {
				self
					.send_once(&method, url, &params, body.as_ref(), &headers)
					.await
			},
			|| self.recycle_session(),
		)
		.await
	}

	async fn ws_connect(
		&self,
		url: &str,
		params: &QueryParams,
		headers: HeaderMap,
	) -> Result<Websocket, TransportError> {
		let mut parsed =
			Url::parse(url).map_err(|e| TransportError::invalid_url(url, e.to_string()))?;

		let mut params = params.clone();
		let mut headers = headers;
		self.authenticate(&parsed, &mut headers, &mut params);

		if !params.is_empty() {
			parsed.query_pairs_mut().extend_pairs(&params);
		}

		let mut request = parsed
			.as_str()
			.into_client_request()
			.map_err(|e| TransportError::Websocket(e.to_string()))?;
		request.headers_mut().extend(headers);

		debug!(url = %parsed, "opening websocket");
		let (stream, _response) = connect_async(request)
			.await
			.map_err(|e| TransportError::Websocket(e.to_string()))?;

		let handle: Websocket = Arc::new(TungsteniteWebsocket {
			stream: Mutex::new(Some(stream)),
		});
		self.websockets.register(handle.clone()).await;
		Ok(handle)
	}

	async fn close(&self) -> Result<(), TransportError> {
		let mut failures = self.websockets.close_all().await;

		// Recycling drops the old pool once in-flight requests finish;
		// reqwest has no explicit shutdown.
		if let Err(err) = self.recycle_session() {
			failures.push(err.to_string());
		}

		if failures.is_empty() {
			Ok(())
		} else {
			Err(TransportError::Close { failures })
		}
	}
}

impl std::fmt::Debug for HttpTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpTransport")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

/// Open WebSocket handles awaiting cleanup. Append-only between `close()`
/// calls: only successful upgrades add entries, only `close_all` drains.
#[derive(Default)]
struct WebsocketRegistry {
	handles: Mutex<Vec<Websocket>>,
}

impl WebsocketRegistry {
	async fn register(&self, handle: Websocket) {
		self.handles.lock().await.push(handle);
	}

	/// Close every registered handle, attempting all of them even when
	/// earlier closes fail. Returns the collected failure messages.
	async fn close_all(&self) -> Vec<String> {
		let handles = std::mem::take(&mut *self.handles.lock().await);
		let mut failures = Vec::new();
		for handle in handles {
			if let Err(err) = handle.close().await {
				failures.push(err.to_string());
			}
		}
		failures
	}
}

struct TungsteniteWebsocket {
	stream: Mutex<Option<WebSocketStream<MaybeTlsStream<TcpStream>>>>,
}

#[async_trait]
impl WebsocketHandle for TungsteniteWebsocket {
	async fn recv(&self) -> Result<Option<WsMessage>, TransportError> {
		let mut guard = self.stream.lock().await;
		let stream = guard.as_mut().ok_or(TransportError::WebsocketClosed)?;
		loop {
			match stream.next().await {
				None => return Ok(None),
				Some(Err(e)) => return Err(TransportError::Websocket(e.to_string())),
				Some(Ok(Message::Text(text))) => {
					return Ok(Some(WsMessage::Text(text.as_str().to_owned())));
				},
				Some(Ok(Message::Binary(data))) => {
					return Ok(Some(WsMessage::Binary(Bytes::from(data))));
				},
				Some(Ok(Message::Close(_))) => return Ok(None),
				// Control frames carry no payload for the caller.
				Some(Ok(_)) => continue,
			}
		}
	}

	async fn send_text(&self, text: &str) -> Result<(), TransportError> {
		let mut guard = self.stream.lock().await;
		let stream = guard.as_mut().ok_or(TransportError::WebsocketClosed)?;
		stream
			.send(Message::Text(text.to_owned().into()))
			.await
			.map_err(|e| TransportError::Websocket(e.to_string()))
	}

	async fn close(&self) -> Result<(), TransportError> {
		let Some(mut stream) = self.stream.lock().await.take() else {
			return Ok(());
		};
		stream
			.close(None)
			.await
			.map_err(|e| TransportError::Websocket(e.to_string()))
	}
}

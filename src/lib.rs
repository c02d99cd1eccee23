//! Dynamic client for services described by Swagger 1.1 API declarations.
//!
//! Given a resource listing (a URL, a file path, or an in-memory JSON
//! document), the loader resolves every referenced API declaration, runs an
//! extensible chain of processors over the combined document, and freezes it
//! into a tree of callable operations:
//!
//! - Resource listing → [`SwaggerClient`]
//! - API declaration → [`Resource`]
//! - Operation → [`Operation`], invoked with keyword arguments
//!
//! Keyword arguments are bound to path segments, query parameters, or
//! request-body fields according to each operation's declared parameters.
//! Operations flagged as websocket upgrades dispatch through the transport's
//! upgrade path instead of a plain HTTP request.
//!
//! ```no_run
//! use swagger11::{Kwargs, SwaggerClient};
//!
//! # async fn demo() -> Result<(), swagger11::Error> {
//! let client = SwaggerClient::from_url("http://ari.example.com/ari/api-docs/resources.json")
//! 	.basic_auth("asterisk", "asterisk")
//! 	.build()
//! 	.await?;
//!
//! let reply = client
//! 	.resource("channels")?
//! 	.operation("list")?
//! 	.call(Kwargs::new())
//! 	.await?;
//! # let _ = reply;
//! # client.close().await
//! # }
//! ```
//!
//! Only the legacy Swagger 1.1 dialect is supported. The `models` section of
//! each declaration is carried opaquely for external code generation; no
//! schema validation is performed beyond required/multi-value parameter
//! checks.

mod auth;
mod client;
mod dispatch;
mod error;
mod http_transport;
mod loader;
mod model;
mod processor;
mod transport;

pub use auth::{AuthScheme, Authenticator};
pub use client::{SwaggerClient, SwaggerClientBuilder};
pub use dispatch::{Kwargs, Operation, Reply, Resource};
pub use error::{Error, RemoteError, TransportError};
pub use http_transport::{HttpTransport, TransportConfig};
pub use loader::{DocumentSource, Loader};
pub use model::{
	ApiDeclaration, ApiEntry, HttpMethod, OperationSpec, ParamType, ParameterSpec, ResourceListing,
	ResourceListingApi,
};
pub use processor::{ParsingContext, ResourceNameProcessor, SwaggerProcessor, WebsocketProcessor};
pub use transport::{QueryParams, Response, Transport, Websocket, WebsocketHandle, WsMessage};

// Client facade: the loaded document exposed as a two-level lookup of
// resources and operations

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::auth::Authenticator;
use crate::dispatch::Resource;
use crate::error::Error;
use crate::http_transport::{HttpTransport, TransportConfig};
use crate::loader::{DocumentSource, Loader};
use crate::model::ResourceListing;
use crate::processor::SwaggerProcessor;
use crate::transport::Transport;

/// Client for a Swagger 1.1 described service.
///
/// Built from a resource listing; every declared operation is callable via
/// [`SwaggerClient::resource`] and [`Resource::operation`]. Construction is
/// all-or-nothing: the document is fully loaded and processed before the
/// client exists. Call [`SwaggerClient::close`] to release transport
/// resources when done.
pub struct SwaggerClient {
	document: ResourceListing,
	resources: IndexMap<String, Resource>,
	transport: Arc<dyn Transport>,
}

impl SwaggerClient {
	/// Load the resource listing from a URL.
	pub fn from_url(url: impl Into<String>) -> SwaggerClientBuilder {
		SwaggerClientBuilder::new(DocumentSource::Url(url.into()))
	}

	/// Load the resource listing from a local file.
	pub fn from_file(path: impl Into<PathBuf>) -> SwaggerClientBuilder {
		SwaggerClientBuilder::new(DocumentSource::File(path.into()))
	}

	/// Use an already-parsed resource listing. Referenced declarations must
	/// be embedded inline under `api_declaration`.
	pub fn from_document(document: Value) -> SwaggerClientBuilder {
		SwaggerClientBuilder::new(DocumentSource::Inline(document))
	}

	/// The loaded, processed, frozen document.
	pub fn document(&self) -> &ResourceListing {
		&self.document
	}

	pub fn resource(&self, name: &str) -> Result<&Resource, Error> {
		self
			.resources
			.get(name)
			.ok_or_else(|| Error::UnknownResource(name.to_owned()))
	}

	pub fn resources(&self) -> impl Iterator<Item = &Resource> {
		self.resources.values()
	}

	/// Close every open WebSocket handle and the underlying session. Both
	/// are attempted even if one fails; failures are aggregated.
	pub async fn close(&self) -> Result<(), Error> {
		Ok(self.transport.close().await?)
	}
}

impl std::fmt::Debug for SwaggerClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SwaggerClient")
			.field("base_path", &self.document.base_path)
			.field("resources", &self.resources.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Configures and constructs a [`SwaggerClient`].
///
/// Authentication is mutually exclusive: either the `basic_auth`
/// convenience or an explicit [`Authenticator`], never both. Supplying a
/// custom transport excludes both, since credentials live inside the
/// built-in transport.
pub struct SwaggerClientBuilder {
	source: DocumentSource,
	basic_auth: Option<(String, String)>,
	authenticator: Option<Authenticator>,
	processors: Vec<Box<dyn SwaggerProcessor>>,
	transport: Option<Arc<dyn Transport>>,
	config: TransportConfig,
}

impl SwaggerClientBuilder {
	fn new(source: DocumentSource) -> Self {
		Self {
			source,
			basic_auth: None,
			authenticator: None,
			processors: Vec::new(),
			transport: None,
			config: TransportConfig::default(),
		}
	}

	/// HTTP Basic credentials applied to every host.
	pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
		self.basic_auth = Some((username.into(), password.into()));
		self
	}

	/// An explicit, host-scoped authenticator.
	pub fn authenticator(mut self, authenticator: Authenticator) -> Self {
		self.authenticator = Some(authenticator);
		self
	}

	/// Register an additional processor, run after the built-ins.
	pub fn processor(mut self, processor: Box<dyn SwaggerProcessor>) -> Self {
		self.processors.push(processor);
		self
	}

	/// Substitute a custom transport implementation.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Session limits for the built-in transport.
	pub fn transport_config(mut self, config: TransportConfig) -> Self {
		self.config = config;
		self
	}

	/// Load the document, build the resource tree, and return the client.
	pub async fn build(self) -> Result<SwaggerClient, Error> {
		if self.basic_auth.is_some() && self.authenticator.is_some() {
			return Err(Error::configuration(
				"use basic_auth or an explicit authenticator, not both",
			));
		}
		if self.transport.is_some() && (self.basic_auth.is_some() || self.authenticator.is_some()) {
			return Err(Error::configuration(
				"authentication is configured on the built-in transport; a custom transport must carry its own",
			));
		}

		let transport: Arc<dyn Transport> = match self.transport {
			Some(transport) => transport,
			None => {
				let http = HttpTransport::with_config(self.config)?;
				if let Some((username, password)) = self.basic_auth {
					http.set_basic_auth(None, username, password);
				} else if let Some(authenticator) = self.authenticator {
					http.set_authenticator(authenticator);
				}
				Arc::new(http)
			},
		};

		let mut loader = Loader::new(transport.clone());
		for processor in self.processors {
			loader = loader.with_processor(processor);
		}
		let document = loader.load(self.source).await?;

		let mut resources = IndexMap::new();
		for api in &document.apis {
			let resource = Resource::build(api, transport.clone())?;
			let name = resource.name().to_owned();
			if resources.insert(name.clone(), resource).is_some() {
				warn!(resource = %name, "duplicate resource name, keeping the later definition");
			}
		}

		Ok(SwaggerClient {
			document,
			resources,
			transport,
		})
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use async_trait::async_trait;
	use bytes::Bytes;
	use http::{HeaderMap, Method, StatusCode};
	use serde_json::json;
	use std::sync::atomic::{AtomicBool, Ordering};

	use super::*;
	use crate::error::TransportError;
	use crate::transport::{QueryParams, Response, Websocket};

	#[derive(Default)]
	struct InertTransport {
		closed: AtomicBool,
	}

	#[async_trait]
	impl Transport for InertTransport {
		async fn request(
			&self,
			_method: Method,
			_url: &str,
			_params: &QueryParams,
			_body: Option<Bytes>,
			_headers: HeaderMap,
		) -> Result<Response, TransportError> {
			Ok(Response::new(StatusCode::OK, HeaderMap::new(), Bytes::new()))
		}

		async fn ws_connect(
			&self,
			_url: &str,
			_params: &QueryParams,
			_headers: HeaderMap,
		) -> Result<Websocket, TransportError> {
			Err(TransportError::Websocket("not supported".into()))
		}

		async fn close(&self) -> Result<(), TransportError> {
			self.closed.store(true, Ordering::SeqCst);
			Ok(())
		}
	}

	fn inline_listing() -> Value {
		json!({
			"swaggerVersion": "1.1",
			"basePath": "http://swagger.py.invalid/swagger-test",
			"apis": [{
				"path": "/api-docs/pet.json",
				"api_declaration": {
					"swaggerVersion": "1.1",
					"basePath": "http://swagger.py.invalid/swagger-test",
					"apis": [{
						"path": "/pet",
						"operations": [{"httpMethod": "GET", "nickname": "listPets"}]
					}],
					"models": {}
				}
			}]
		})
	}

	#[tokio::test]
	async fn builds_resources_from_inline_document() {
		let client = SwaggerClient::from_document(inline_listing())
			.transport(Arc::new(InertTransport::default()))
			.build()
			.await
			.unwrap();

		let resource = client.resource("pet").unwrap();
		assert!(resource.operation("listPets").is_ok());
	}

	#[tokio::test]
	async fn duplicate_resource_names_keep_the_later_definition() {
		// Both entries derive the name "pet" from their path stems.
		let doc = json!({
			"swaggerVersion": "1.1",
			"basePath": "http://swagger.py.invalid/swagger-test",
			"apis": [
				{
					"path": "/old/pet.json",
					"api_declaration": {
						"swaggerVersion": "1.1",
						"basePath": "http://swagger.py.invalid/swagger-test",
						"apis": [{
							"path": "/pet",
							"operations": [{"httpMethod": "GET", "nickname": "listPets"}]
						}],
						"models": {}
					}
				},
				{
					"path": "/new/pet.json",
					"api_declaration": {
						"swaggerVersion": "1.1",
						"basePath": "http://swagger.py.invalid/swagger-test",
						"apis": [{
							"path": "/pet/find",
							"operations": [{"httpMethod": "GET", "nickname": "findPets"}]
						}],
						"models": {}
					}
				}
			]
		});

		let client = SwaggerClient::from_document(doc)
			.transport(Arc::new(InertTransport::default()))
			.build()
			.await
			.unwrap();

		assert_eq!(client.resources().count(), 1);
		let resource = client.resource("pet").unwrap();
		assert!(resource.operation("findPets").is_ok());
		assert!(resource.operation("listPets").is_err());
	}

	#[tokio::test]
	async fn unknown_resource_is_a_named_not_found() {
		let client = SwaggerClient::from_document(inline_listing())
			.transport(Arc::new(InertTransport::default()))
			.build()
			.await
			.unwrap();

		let err = client.resource("hamster").unwrap_err();
		assert_matches!(err, Error::UnknownResource(name) => assert_eq!(name, "hamster"));
	}

	#[tokio::test]
	async fn conflicting_auth_is_a_configuration_error() {
		let err = SwaggerClient::from_document(inline_listing())
			.basic_auth("unit", "peekaboo")
			.authenticator(Authenticator::api_key(None, "abc123"))
			.build()
			.await
			.unwrap_err();

		assert_matches!(err, Error::Configuration(_));
	}

	#[tokio::test]
	async fn custom_transport_excludes_builder_auth() {
		let err = SwaggerClient::from_document(inline_listing())
			.transport(Arc::new(InertTransport::default()))
			.basic_auth("unit", "peekaboo")
			.build()
			.await
			.unwrap_err();

		assert_matches!(err, Error::Configuration(_));
	}

	#[tokio::test]
	async fn close_releases_the_transport() {
		let transport = Arc::new(InertTransport::default());
		let client = SwaggerClient::from_document(inline_listing())
			.transport(transport.clone())
			.build()
			.await
			.unwrap();

		client.close().await.unwrap();
		assert!(transport.closed.load(Ordering::SeqCst));
	}
}

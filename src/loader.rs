// Document loader: fetches the resource listing, resolves every referenced
// API declaration, runs the processor chain, and freezes the result
//
// Loads are all-or-nothing: a missing or unparsable referenced declaration
// fails the whole load and no partial document is ever returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::HeaderMap;
use http::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::model::ResourceListing;
use crate::processor::{
	ParsingContext, ResourceNameProcessor, SwaggerProcessor, WebsocketProcessor,
};
use crate::transport::{QueryParams, Transport};

/// Where a resource listing comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
	/// Fetch over HTTP(S) through the transport.
	Url(String),
	/// Read from the local filesystem.
	File(PathBuf),
	/// Already-parsed document. Relative declaration references cannot be
	/// resolved for inline documents; declarations must be embedded.
	Inline(Value),
}

impl DocumentSource {
	fn location(&self) -> Option<String> {
		match self {
			DocumentSource::Url(url) => Some(url.clone()),
			DocumentSource::File(path) => Some(path.display().to_string()),
			DocumentSource::Inline(_) => None,
		}
	}
}

/// Base location declaration paths resolve against.
enum ResolveBase {
	Url(Url),
	Dir(PathBuf),
	None,
}

/// Loads and assembles Swagger 1.1 documents.
///
/// URL fetches go through the same transport the client uses, so any
/// configured authenticator applies to declaration fetches as well.
pub struct Loader {
	transport: Arc<dyn Transport>,
	processors: Vec<Box<dyn SwaggerProcessor>>,
}

impl Loader {
	/// A loader with the built-in processors (resource naming and
	/// websocket detection) registered.
	pub fn new(transport: Arc<dyn Transport>) -> Self {
		Self {
			transport,
			processors: vec![
				Box::new(WebsocketProcessor),
				Box::new(ResourceNameProcessor),
			],
		}
	}

	/// Append a processor; it runs after the built-ins, in registration
	/// order.
	pub fn with_processor(mut self, processor: Box<dyn SwaggerProcessor>) -> Self {
		self.processors.push(processor);
		self
	}

	/// Load a resource listing: fetch, resolve every referenced
	/// declaration, run the processor chain, validate, and freeze.
	pub async fn load(&self, source: DocumentSource) -> Result<ResourceListing, Error> {
		let location = source.location();
		let (mut document, base) = match source {
			DocumentSource::Url(url) => {
				let document = self.fetch_url(&url).await?;
				let parsed = Url::parse(&url)
					.map_err(|e| Error::validation(format!("invalid listing url '{url}': {e}")))?;
				(document, ResolveBase::Url(parsed))
			},
			DocumentSource::File(path) => {
				let text = fs_err::tokio::read_to_string(&path).await?;
				let document = serde_json::from_str(&text)?;
				let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
				(document, ResolveBase::Dir(dir))
			},
			DocumentSource::Inline(value) => (value, ResolveBase::None),
		};

		self.resolve_declarations(&mut document, &base).await?;
		self.run_processors(&mut document, location.as_deref());

		let listing: ResourceListing = serde_json::from_value(document)?;
		listing.validate()?;
		info!(
			base_path = %listing.base_path,
			resources = listing.apis.len(),
			"loaded resource listing"
		);
		Ok(listing)
	}

	async fn fetch_url(&self, url: &str) -> Result<Value, Error> {
		debug!(%url, "fetching document");
		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
		let response = self
			.transport
			.request(http::Method::GET, url, &QueryParams::new(), None, headers)
			.await?
			.error_for_status()?;
		Ok(response.json()?)
	}

	/// Attach an `api_declaration` to every listing entry that does not
	/// already embed one, resolving each entry's `path` relative to the
	/// listing's own location.
	async fn resolve_declarations(
		&self,
		document: &mut Value,
		base: &ResolveBase,
	) -> Result<(), Error> {
		let Some(apis) = document.get_mut("apis").and_then(Value::as_array_mut) else {
			return Ok(());
		};

		for api in apis {
			if api.get("api_declaration").is_some() {
				continue;
			}
			let Some(path) = api.get("path").and_then(Value::as_str) else {
				return Err(Error::validation("listing entry has no path"));
			};
			let relative = path.trim_start_matches('/');

			let declaration = match base {
				ResolveBase::Url(listing_url) => {
					let target = listing_url.join(relative).map_err(|e| {
						Error::validation(format!("cannot resolve declaration path '{path}': {e}"))
					})?;
					self.fetch_url(target.as_str()).await?
				},
				ResolveBase::Dir(dir) => {
					let target = dir.join(relative);
					let text = fs_err::tokio::read_to_string(&target).await?;
					serde_json::from_str(&text)?
				},
				ResolveBase::None => {
					return Err(Error::validation(format!(
						"cannot resolve declaration path '{path}' for an in-memory document"
					)));
				},
			};
			api["api_declaration"] = declaration;
		}
		Ok(())
	}

	/// Walk the assembled document once per processor, in registration
	/// order. The context's location fields are refreshed at each step of
	/// the walk.
	fn run_processors(&self, document: &mut Value, location: Option<&str>) {
		let mut context = ParsingContext {
			document_location: location.map(str::to_owned),
			declaration_path: None,
			base_path: None,
		};

		for processor in &self.processors {
			context.base_path = base_path_of(document);
			processor.on_resource_listing(document, &mut context);

			let listing_base = base_path_of(document);
			let Some(apis) = document.get_mut("apis").and_then(Value::as_array_mut) else {
				continue;
			};
			for api in apis {
				context.base_path = listing_base.clone();
				context.declaration_path =
					api.get("path").and_then(Value::as_str).map(str::to_owned);
				processor.on_resource_listing_api(api, &mut context);

				let Some(declaration) = api.get_mut("api_declaration") else {
					continue;
				};
				context.base_path = base_path_of(declaration);
				processor.on_api_declaration(declaration, &mut context);

				let entries = declaration
					.get_mut("apis")
					.and_then(Value::as_array_mut)
					.into_iter()
					.flatten();
				for entry in entries {
					let operations = entry
						.get_mut("operations")
						.and_then(Value::as_array_mut)
						.into_iter()
						.flatten();
					for operation in operations {
						processor.on_operation(operation, &mut context);
					}
				}
			}
			context.declaration_path = None;
			context.base_path = None;
		}
	}
}

fn base_path_of(document: &Value) -> Option<String> {
	document
		.get("basePath")
		.and_then(Value::as_str)
		.map(str::to_owned)
}

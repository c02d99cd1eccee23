// Typed Swagger 1.1 document model
//
// Documents stay mutable JSON while the loader and processor chain work on
// them, then freeze into these types. Keys injected by processors that the
// model does not name explicitly are preserved in the `extra` maps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Root document enumerating the available API declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListing {
	pub swagger_version: String,
	pub base_path: String,
	pub apis: Vec<ResourceListingApi>,

	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

impl ResourceListing {
	/// Structural checks required before any operation may be built.
	pub fn validate(&self) -> Result<(), Error> {
		if self.base_path.is_empty() {
			return Err(Error::validation("resource listing basePath is empty"));
		}
		for api in &self.apis {
			let Some(decl) = &api.api_declaration else {
				return Err(Error::validation(format!(
					"listing entry '{}' has no API declaration",
					api.path
				)));
			};
			if decl.base_path.is_empty() {
				return Err(Error::validation(format!(
					"API declaration '{}' has an empty basePath",
					api.path
				)));
			}
		}
		Ok(())
	}
}

/// One entry in the resource listing.
///
/// `name` and the attached declaration are not authoritative input: the name
/// is derived from `path` by a processor, and the declaration is either
/// embedded inline or fetched by the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListingApi {
	pub path: String,

	#[serde(default)]
	pub description: Option<String>,

	#[serde(default)]
	pub name: Option<String>,

	#[serde(rename = "api_declaration", default)]
	pub api_declaration: Option<ApiDeclaration>,

	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

/// One group of endpoints and the models they reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDeclaration {
	pub swagger_version: String,
	pub base_path: String,

	#[serde(default)]
	pub resource_path: Option<String>,

	#[serde(default)]
	pub apis: Vec<ApiEntry>,

	/// Model schemas, opaque to the client; consumed only by external
	/// code generation.
	#[serde(default)]
	pub models: serde_json::Map<String, Value>,

	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

/// A URL template and the operations reachable under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEntry {
	/// URL template, possibly containing `{name}` placeholders.
	pub path: String,

	#[serde(default)]
	pub operations: Vec<OperationSpec>,

	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

/// One callable endpoint definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSpec {
	pub http_method: HttpMethod,

	/// Identity key for lookup; unique by convention within a declaration.
	pub nickname: String,

	#[serde(default)]
	pub parameters: Vec<ParameterSpec>,

	/// Set by [`crate::WebsocketProcessor`] from the document's upgrade
	/// hint, not authoritative input.
	#[serde(rename = "is_websocket", default)]
	pub is_websocket: bool,

	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

/// A declared operation parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
	pub name: String,
	pub param_type: ParamType,

	#[serde(default)]
	pub data_type: Option<String>,

	#[serde(default)]
	pub required: bool,

	#[serde(default)]
	pub allow_multiple: bool,
}

/// Where a parameter value is placed in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
	Path,
	Query,
	Body,
}

/// HTTP methods the 1.1 dialect declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	Get,
	Post,
	Put,
	Delete,
	Head,
	Options,
	Patch,
}

impl HttpMethod {
	pub fn as_http(&self) -> http::Method {
		match self {
			HttpMethod::Get => http::Method::GET,
			HttpMethod::Post => http::Method::POST,
			HttpMethod::Put => http::Method::PUT,
			HttpMethod::Delete => http::Method::DELETE,
			HttpMethod::Head => http::Method::HEAD,
			HttpMethod::Options => http::Method::OPTIONS,
			HttpMethod::Patch => http::Method::PATCH,
		}
	}
}

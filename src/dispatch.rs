// Operation dispatcher: binds keyword arguments to a declared parameter
// schema and issues the call through the transport
//
// Binding rules, in order: list values comma-join into one string; `path`
// parameters substitute `{name}` in the URI (URL-escaped); `query`
// parameters append to the query set; `body` parameters merge into a JSON
// object sent as the request payload. Missing required parameters and
// undeclared extras are call-time errors, never coerced or ignored.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Error;
use crate::model::{ApiDeclaration, OperationSpec, ParamType, ResourceListingApi};
use crate::transport::{QueryParams, Response, Transport, Websocket};

/// Keyword arguments for one operation call.
///
/// Insertion order is preserved; values are JSON so callers can pass
/// strings, numbers, booleans, arrays, or nested objects for body fields.
#[derive(Debug, Clone, Default)]
pub struct Kwargs(IndexMap<String, Value>);

impl Kwargs {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style insert: `Kwargs::new().set("petId", 1234)`.
	pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(name.into(), value.into());
		self
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	fn take(&mut self, name: &str) -> Option<Value> {
		self.0.shift_remove(name)
	}

	fn names(&self) -> Vec<String> {
		self.0.keys().cloned().collect()
	}
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Kwargs {
	fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
		Self(
			iter
				.into_iter()
				.map(|(n, v)| (n.into(), v.into()))
				.collect(),
		)
	}
}

/// What an invocation produced: a buffered HTTP response, or an open
/// WebSocket connection for upgrade operations.
pub enum Reply {
	Http(Response),
	Websocket(Websocket),
}

impl std::fmt::Debug for Reply {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Reply::Http(response) => f.debug_tuple("Http").field(response).finish(),
			Reply::Websocket(_) => f.write_str("Websocket"),
		}
	}
}

impl Reply {
	pub fn into_http(self) -> Result<Response, Error> {
		match self {
			Reply::Http(response) => Ok(response),
			Reply::Websocket(_) => Err(Error::UnsupportedOperation(
				"expected an HTTP response but the operation upgraded to a websocket".into(),
			)),
		}
	}

	pub fn into_websocket(self) -> Result<Websocket, Error> {
		match self {
			Reply::Websocket(ws) => Ok(ws),
			Reply::Http(_) => Err(Error::UnsupportedOperation(
				"expected a websocket but the operation returned an HTTP response".into(),
			)),
		}
	}
}

/// One callable endpoint, built once from its spec and immutable after.
pub struct Operation {
	uri: String,
	spec: OperationSpec,
	transport: Arc<dyn Transport>,
}

impl Operation {
	fn new(declaration: &ApiDeclaration, api_path: &str, spec: OperationSpec, transport: Arc<dyn Transport>) -> Self {
		Self {
			uri: format!("{}{}", declaration.base_path, api_path),
			spec,
			transport,
		}
	}

	pub fn nickname(&self) -> &str {
		&self.spec.nickname
	}

	pub fn spec(&self) -> &OperationSpec {
		&self.spec
	}

	/// URI template this operation dispatches to, before path substitution.
	pub fn uri(&self) -> &str {
		&self.uri
	}

	/// Invoke the operation with keyword arguments.
	pub async fn call(&self, mut kwargs: Kwargs) -> Result<Reply, Error> {
		let mut uri = self.uri.clone();
		let mut params = QueryParams::new();
		let mut body: Option<serde_json::Map<String, Value>> = None;
		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		for param in &self.spec.parameters {
			match kwargs.take(&param.name) {
				Some(value) => {
					// Lists collapse to one comma-joined string before any
					// routing, whatever the paramType.
					let value = match value {
						Value::Array(items) => Value::String(comma_join(&items)),
						other => other,
					};
					match param.param_type {
						ParamType::Path => {
							let placeholder = format!("{{{}}}", param.name);
							uri = uri.replace(&placeholder, &url_escape(&render_scalar(&value)));
						},
						ParamType::Query => params.push((param.name.clone(), render_scalar(&value))),
						ParamType::Body => {
							body
								.get_or_insert_with(serde_json::Map::new)
								.insert(param.name.clone(), value);
						},
					}
				},
				None if param.required => {
					return Err(Error::missing_parameter(&param.name, &self.spec.nickname));
				},
				None => {},
			}
		}

		if !kwargs.is_empty() {
			return Err(Error::UnknownParameter {
				nickname: self.spec.nickname.clone(),
				names: kwargs.names(),
			});
		}

		let payload = match body {
			Some(fields) => {
				headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
				Some(Bytes::from(serde_json::to_vec(&Value::Object(fields))?))
			},
			None => None,
		};

		let method = self.spec.http_method.as_http();
		debug!(nickname = %self.spec.nickname, %method, %uri, ?params, "dispatching operation");

		if self.spec.is_websocket {
			if payload.is_some() {
				return Err(Error::UnsupportedOperation(format!(
					"'{}' is a websocket operation and cannot send body data",
					self.spec.nickname
				)));
			}
			let uri = rewrite_ws_scheme(&uri);
			let handle = self.transport.ws_connect(&uri, &params, headers).await?;
			return Ok(Reply::Websocket(handle));
		}

		let response = self
			.transport
			.request(method, &uri, &params, payload, headers)
			.await?;
		Ok(Reply::Http(response.error_for_status()?))
	}
}

impl std::fmt::Debug for Operation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Operation")
			.field("nickname", &self.spec.nickname)
			.field("uri", &self.uri)
			.finish_non_exhaustive()
	}
}

/// Comma-join array elements into one string (no per-element quoting).
fn comma_join(items: &[Value]) -> String {
	items.iter().map(render_scalar).collect::<Vec<_>>().join(",")
}

/// Scalars render bare: strings without quotes, everything else as JSON.
fn render_scalar(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

fn url_escape(value: &str) -> String {
	url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn rewrite_ws_scheme(uri: &str) -> String {
	if let Some(rest) = uri.strip_prefix("https") {
		format!("wss{rest}")
	} else if let Some(rest) = uri.strip_prefix("http") {
		format!("ws{rest}")
	} else {
		uri.to_owned()
	}
}

/// One group of operations from a single API declaration, keyed by
/// nickname. Built once at load time, immutable after.
pub struct Resource {
	name: String,
	operations: IndexMap<String, Operation>,
}

impl Resource {
	pub(crate) fn build(
		api: &ResourceListingApi,
		transport: Arc<dyn Transport>,
	) -> Result<Self, Error> {
		let name = api
			.name
			.clone()
			.ok_or_else(|| Error::validation(format!("listing entry '{}' has no name", api.path)))?;
		let declaration = api.api_declaration.as_ref().ok_or_else(|| {
			Error::validation(format!("listing entry '{}' has no API declaration", api.path))
		})?;
		if declaration.base_path.is_empty() {
			return Err(Error::validation(format!(
				"API declaration '{}' has an empty basePath",
				api.path
			)));
		}

		let mut operations = IndexMap::new();
		for entry in &declaration.apis {
			for spec in &entry.operations {
				let nickname = spec.nickname.clone();
				let operation =
					Operation::new(declaration, &entry.path, spec.clone(), transport.clone());
				if operations.insert(nickname.clone(), operation).is_some() {
					// Uniqueness is convention, not enforced by the format;
					// the later definition wins.
					warn!(
						resource = %name,
						%nickname,
						"duplicate operation nickname, keeping the later definition"
					);
				}
			}
		}

		Ok(Self { name, operations })
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn operation(&self, nickname: &str) -> Result<&Operation, Error> {
		self
			.operations
			.get(nickname)
			.ok_or_else(|| Error::UnknownOperation {
				resource: self.name.clone(),
				name: nickname.to_owned(),
			})
	}

	pub fn operations(&self) -> impl Iterator<Item = &Operation> {
		self.operations.values()
	}

	/// Look up and invoke in one step.
	pub async fn call(&self, nickname: &str, kwargs: Kwargs) -> Result<Reply, Error> {
		self.operation(nickname)?.call(kwargs).await
	}
}

impl std::fmt::Debug for Resource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Resource")
			.field("name", &self.name)
			.field("operations", &self.operations.keys().collect::<Vec<_>>())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use async_trait::async_trait;
	use http::{Method, StatusCode};
	use serde_json::json;
	use tokio::sync::Mutex as AsyncMutex;

	use super::*;
	use crate::error::TransportError;
	use crate::transport::{WebsocketHandle, WsMessage};

	#[derive(Debug, Clone)]
	struct SentRequest {
		method: Method,
		url: String,
		params: QueryParams,
		body: Option<Bytes>,
		headers: HeaderMap,
	}

	#[derive(Default)]
	struct MockTransport {
		status: Option<StatusCode>,
		response_body: String,
		requests: AsyncMutex<Vec<SentRequest>>,
		ws_urls: AsyncMutex<Vec<String>>,
	}

	struct NullHandle;

	#[async_trait]
	impl WebsocketHandle for NullHandle {
		async fn recv(&self) -> Result<Option<WsMessage>, TransportError> {
			Ok(None)
		}
		async fn send_text(&self, _text: &str) -> Result<(), TransportError> {
			Ok(())
		}
		async fn close(&self) -> Result<(), TransportError> {
			Ok(())
		}
	}

	#[async_trait]
	impl Transport for MockTransport {
		async fn request(
			&self,
			method: Method,
			url: &str,
			params: &QueryParams,
			body: Option<Bytes>,
			headers: HeaderMap,
		) -> Result<Response, TransportError> {
			self.requests.lock().await.push(SentRequest {
				method,
				url: url.to_owned(),
				params: params.clone(),
				body,
				headers,
			});
			Ok(Response::new(
				self.status.unwrap_or(StatusCode::OK),
				HeaderMap::new(),
				Bytes::from(self.response_body.clone()),
			))
		}

		async fn ws_connect(
			&self,
			url: &str,
			_params: &QueryParams,
			_headers: HeaderMap,
		) -> Result<Websocket, TransportError> {
			self.ws_urls.lock().await.push(url.to_owned());
			Ok(Arc::new(NullHandle))
		}

		async fn close(&self) -> Result<(), TransportError> {
			Ok(())
		}
	}

	fn pet_listing_api() -> ResourceListingApi {
		let doc = json!({
			"path": "/api-docs/pet.json",
			"name": "pet",
			"api_declaration": {
				"swaggerVersion": "1.1",
				"basePath": "http://swagger.py.invalid/swagger-test",
				"apis": [
					{
						"path": "/pet",
						"operations": [
							{"httpMethod": "GET", "nickname": "listPets"},
							{
								"httpMethod": "POST",
								"nickname": "createPet",
								"parameters": [
									{"name": "name", "paramType": "query", "required": true},
									{"name": "tag", "paramType": "body"}
								]
							}
						]
					},
					{
						"path": "/pet/find",
						"operations": [{
							"httpMethod": "GET",
							"nickname": "findPets",
							"parameters": [
								{"name": "species", "paramType": "query", "allowMultiple": true}
							]
						}]
					},
					{
						"path": "/pet/{petId}",
						"operations": [{
							"httpMethod": "DELETE",
							"nickname": "deletePet",
							"parameters": [{"name": "petId", "paramType": "path"}]
						}]
					},
					{
						"path": "/events",
						"operations": [{
							"httpMethod": "GET",
							"nickname": "eventWebsocket",
							"is_websocket": true,
							"parameters": [
								{"name": "app", "paramType": "query"},
								{"name": "note", "paramType": "body"}
							]
						}]
					}
				]
			}
		});
		serde_json::from_value(doc).unwrap()
	}

	fn resource_with(transport: Arc<MockTransport>) -> Resource {
		Resource::build(&pet_listing_api(), transport).unwrap()
	}

	#[tokio::test]
	async fn path_parameter_substitutes_and_escapes() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport.clone());

		resource
			.call("deletePet", Kwargs::new().set("petId", 1234))
			.await
			.unwrap();

		let sent = transport.requests.lock().await;
		assert_eq!(sent[0].method, Method::DELETE);
		assert_eq!(sent[0].url, "http://swagger.py.invalid/swagger-test/pet/1234");
	}

	#[tokio::test]
	async fn path_parameter_with_reserved_characters() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport.clone());

		resource
			.call("deletePet", Kwargs::new().set("petId", "a/b c"))
			.await
			.unwrap();

		let sent = transport.requests.lock().await;
		assert_eq!(
			sent[0].url,
			"http://swagger.py.invalid/swagger-test/pet/a%2Fb+c"
		);
	}

	#[tokio::test]
	async fn list_values_comma_join() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport.clone());

		resource
			.call("findPets", Kwargs::new().set("species", vec!["cat", "dog"]))
			.await
			.unwrap();

		let sent = transport.requests.lock().await;
		assert_eq!(
			sent[0].params,
			vec![("species".to_string(), "cat,dog".to_string())]
		);
	}

	#[tokio::test]
	async fn body_fields_serialize_as_json_with_content_type() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport.clone());

		resource
			.call(
				"createPet",
				Kwargs::new().set("name", "Sparky").set("tag", "good dog"),
			)
			.await
			.unwrap();

		let sent = transport.requests.lock().await;
		assert_eq!(sent[0].params, vec![("name".to_string(), "Sparky".to_string())]);
		assert_eq!(
			sent[0].headers.get(CONTENT_TYPE).unwrap(),
			"application/json"
		);
		let body: Value = serde_json::from_slice(sent[0].body.as_ref().unwrap()).unwrap();
		assert_eq!(body, json!({"tag": "good dog"}));
	}

	#[tokio::test]
	async fn get_without_body_sends_none() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport.clone());

		resource.call("listPets", Kwargs::new()).await.unwrap();

		let sent = transport.requests.lock().await;
		assert!(sent[0].body.is_none());
		assert!(sent[0].headers.get(CONTENT_TYPE).is_none());
		assert_eq!(sent[0].headers.get(ACCEPT).unwrap(), "application/json");
	}

	#[tokio::test]
	async fn missing_required_parameter_names_parameter_and_nickname() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport);

		let err = resource.call("createPet", Kwargs::new()).await.unwrap_err();
		assert_matches!(
			err,
			Error::MissingParameter { parameter, nickname } => {
				assert_eq!(parameter, "name");
				assert_eq!(nickname, "createPet");
			}
		);
	}

	#[tokio::test]
	async fn undeclared_parameters_are_rejected() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport.clone());

		let err = resource
			.call("listPets", Kwargs::new().set("doesNotExist", "asdf"))
			.await
			.unwrap_err();
		assert_matches!(
			err,
			Error::UnknownParameter { nickname, names } => {
				assert_eq!(nickname, "listPets");
				assert_eq!(names, vec!["doesNotExist".to_string()]);
			}
		);
		// Nothing was dispatched.
		assert!(transport.requests.lock().await.is_empty());
	}

	#[tokio::test]
	async fn unknown_operation_is_a_named_not_found() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport);

		let err = resource.call("doesNotExist", Kwargs::new()).await.unwrap_err();
		assert_matches!(
			err,
			Error::UnknownOperation { resource, name } => {
				assert_eq!(resource, "pet");
				assert_eq!(name, "doesNotExist");
			}
		);
	}

	#[tokio::test]
	async fn duplicate_nicknames_keep_the_later_definition() {
		let doc = json!({
			"path": "/api-docs/pet.json",
			"name": "pet",
			"api_declaration": {
				"swaggerVersion": "1.1",
				"basePath": "http://swagger.py.invalid/swagger-test",
				"apis": [
					{
						"path": "/pet/old",
						"operations": [{"httpMethod": "GET", "nickname": "listPets"}]
					},
					{
						"path": "/pet/new",
						"operations": [{"httpMethod": "POST", "nickname": "listPets"}]
					}
				]
			}
		});
		let api: ResourceListingApi = serde_json::from_value(doc).unwrap();
		let transport = Arc::new(MockTransport::default());
		let resource = Resource::build(&api, transport.clone()).unwrap();
		assert_eq!(resource.operations().count(), 1);

		resource.call("listPets", Kwargs::new()).await.unwrap();

		let sent = transport.requests.lock().await;
		assert_eq!(sent[0].method, Method::POST);
		assert_eq!(sent[0].url, "http://swagger.py.invalid/swagger-test/pet/new");
	}

	#[tokio::test]
	async fn websocket_operation_rewrites_scheme_and_upgrades() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport.clone());

		let reply = resource
			.call("eventWebsocket", Kwargs::new().set("app", "demo"))
			.await
			.unwrap();
		assert_matches!(reply, Reply::Websocket(_));

		let urls = transport.ws_urls.lock().await;
		assert_eq!(urls[0], "ws://swagger.py.invalid/swagger-test/events");
		assert!(transport.requests.lock().await.is_empty());
	}

	#[tokio::test]
	async fn websocket_operation_rejects_body_data() {
		let transport = Arc::new(MockTransport::default());
		let resource = resource_with(transport.clone());

		let err = resource
			.call("eventWebsocket", Kwargs::new().set("note", "hi"))
			.await
			.unwrap_err();
		assert_matches!(err, Error::UnsupportedOperation(_));
		assert!(transport.ws_urls.lock().await.is_empty());
	}

	#[tokio::test]
	async fn remote_status_maps_to_remote_error() {
		let transport = Arc::new(MockTransport {
			status: Some(StatusCode::NOT_FOUND),
			response_body: r#"{"message": "no such pet"}"#.into(),
			..Default::default()
		});
		let resource = resource_with(transport);

		let err = resource
			.call("deletePet", Kwargs::new().set("petId", 1))
			.await
			.unwrap_err();
		assert_matches!(err, Error::Remote(remote) => {
			assert_eq!(remote.status, StatusCode::NOT_FOUND);
			assert!(remote.parsed.is_none());
		});
	}

	#[test]
	fn scheme_rewrite_handles_tls() {
		assert_eq!(rewrite_ws_scheme("http://h/x"), "ws://h/x");
		assert_eq!(rewrite_ws_scheme("https://h/x"), "wss://h/x");
	}

	#[test]
	fn rendering_covers_scalars_and_arrays() {
		assert_eq!(render_scalar(&json!("cat")), "cat");
		assert_eq!(render_scalar(&json!(7)), "7");
		assert_eq!(render_scalar(&json!(true)), "true");
		assert_eq!(comma_join(&[json!("a"), json!(1), json!(false)]), "a,1,false");
	}
}

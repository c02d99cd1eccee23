// Processor chain run over the assembled document during load
//
// Processors are pure mutation visitors: each hook may rewrite its JSON node
// in place and returns nothing. They run while the document is still raw
// JSON, before it freezes into the typed model, so anything they inject is
// visible to the freeze (named fields or the `extra` maps).

use serde_json::Value;

/// Where the loader currently is inside the document, for relative
/// resolution and error text.
///
/// The loader refreshes the location fields as the walk moves between
/// listing entries; hooks may mutate the context, but anything they write
/// into those fields is overwritten at the next entry.
#[derive(Debug, Clone, Default)]
pub struct ParsingContext {
	/// URL or file path the resource listing itself was loaded from.
	/// `None` for in-memory documents.
	pub document_location: Option<String>,
	/// `path` of the listing entry currently being walked.
	pub declaration_path: Option<String>,
	/// `basePath` in scope: the listing's own for listing-level hooks, the
	/// declaration's once the walk descends into one.
	pub base_path: Option<String>,
}

/// A visitor over the loaded document.
///
/// All four hooks default to no-ops; implement only the granularity you
/// need. Hooks may mutate the node in place but must not remove required
/// structural fields (`path`, `operations`, `parameters`); the loader does
/// not guard against that.
pub trait SwaggerProcessor: Send + Sync {
	/// Called once with the root resource listing.
	fn on_resource_listing(&self, listing: &mut Value, context: &mut ParsingContext) {
		let _ = (listing, context);
	}

	/// Called for each entry in the listing's `apis`.
	fn on_resource_listing_api(&self, api: &mut Value, context: &mut ParsingContext) {
		let _ = (api, context);
	}

	/// Called for each resolved API declaration.
	fn on_api_declaration(&self, declaration: &mut Value, context: &mut ParsingContext) {
		let _ = (declaration, context);
	}

	/// Called for each operation in each declaration.
	fn on_operation(&self, operation: &mut Value, context: &mut ParsingContext) {
		let _ = (operation, context);
	}
}

/// Derives each listing entry's `name` from the file stem of its `path`,
/// e.g. `/api-docs/pet.json` → `pet`. The name becomes the resource's
/// lookup key on the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceNameProcessor;

impl SwaggerProcessor for ResourceNameProcessor {
	fn on_resource_listing_api(&self, api: &mut Value, _context: &mut ParsingContext) {
		let Some(path) = api.get("path").and_then(Value::as_str) else {
			return;
		};
		let stem = file_stem(path).to_string();
		api["name"] = Value::String(stem);
	}
}

fn file_stem(path: &str) -> &str {
	let base = path.rsplit('/').next().unwrap_or(path);
	match base.rsplit_once('.') {
		Some((stem, _ext)) if !stem.is_empty() => stem,
		_ => base,
	}
}

/// Marks operations whose `upgrade` hint is `"websocket"` (as emitted by
/// Asterisk ARI declarations) so the dispatcher routes them through the
/// transport's upgrade path. Every operation ends up with an explicit
/// `is_websocket` flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebsocketProcessor;

impl SwaggerProcessor for WebsocketProcessor {
	fn on_operation(&self, operation: &mut Value, _context: &mut ParsingContext) {
		let is_websocket =
			operation.get("upgrade").and_then(Value::as_str) == Some("websocket");
		operation["is_websocket"] = Value::Bool(is_websocket);
	}
}

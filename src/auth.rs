// Per-host credential injection

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use url::Url;

use crate::transport::QueryParams;

/// Credentials scoped to a host, injected into outgoing requests.
///
/// The transport re-checks [`Authenticator::matches`] before every outbound
/// call, so credentials configured for one host never attach to a request
/// addressed to another.
#[derive(Debug, Clone)]
pub struct Authenticator {
	host: Option<String>,
	scheme: AuthScheme,
}

/// How the credentials are carried on the wire.
#[derive(Debug, Clone)]
pub enum AuthScheme {
	/// `Authorization: Basic base64(username:password)` header.
	Basic { username: String, password: String },
	/// A query parameter holding the key, `api_key` by default.
	ApiKey { key: String, param_name: String },
}

impl Authenticator {
	/// HTTP Basic credentials. `host == None` matches any host.
	pub fn basic(
		host: Option<String>,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self {
			host,
			scheme: AuthScheme::Basic {
				username: username.into(),
				password: password.into(),
			},
		}
	}

	/// API-key credentials carried as the conventional `api_key` query
	/// parameter.
	pub fn api_key(host: Option<String>, key: impl Into<String>) -> Self {
		Self::api_key_as(host, key, "api_key")
	}

	/// API-key credentials carried as a query parameter named `param_name`.
	pub fn api_key_as(
		host: Option<String>,
		key: impl Into<String>,
		param_name: impl Into<String>,
	) -> Self {
		Self {
			host,
			scheme: AuthScheme::ApiKey {
				key: key.into(),
				param_name: param_name.into(),
			},
		}
	}

	pub fn host(&self) -> Option<&str> {
		self.host.as_deref()
	}

	/// Whether these credentials apply to `url`. Only the host component is
	/// compared; scheme and port are not part of the match.
	pub fn matches(&self, url: &Url) -> bool {
		match &self.host {
			None => true,
			Some(host) => url.host_str() == Some(host.as_str()),
		}
	}

	/// Inject the credentials into the outgoing headers or query set.
	pub fn apply(&self, headers: &mut HeaderMap, params: &mut QueryParams) {
		match &self.scheme {
			AuthScheme::Basic { username, password } => {
				let encoded = BASE64.encode(format!("{username}:{password}"));
				if let Ok(mut value) = HeaderValue::from_str(&format!("Basic {encoded}")) {
					value.set_sensitive(true);
					headers.insert(AUTHORIZATION, value);
				}
			},
			AuthScheme::ApiKey { key, param_name } => {
				params.push((param_name.clone(), key.clone()));
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matches_compares_host_only() {
		let auth = Authenticator::basic(Some("swagger.py.invalid".into()), "unit", "peekaboo");

		assert!(auth.matches(&Url::parse("http://swagger.py.invalid/x").unwrap()));
		assert!(auth.matches(&Url::parse("https://swagger.py.invalid:8443/x").unwrap()));
		assert!(auth.matches(&Url::parse("ws://swagger.py.invalid/events").unwrap()));
		assert!(!auth.matches(&Url::parse("http://hackerz.py.invalid/x").unwrap()));
	}

	#[test]
	fn unscoped_authenticator_matches_any_host() {
		let auth = Authenticator::basic(None, "unit", "peekaboo");
		assert!(auth.matches(&Url::parse("http://anywhere.invalid/").unwrap()));
	}

	#[test]
	fn basic_sets_authorization_header() {
		let auth = Authenticator::basic(None, "unit", "peekaboo");
		let mut headers = HeaderMap::new();
		let mut params = QueryParams::new();
		auth.apply(&mut headers, &mut params);

		// base64("unit:peekaboo")
		assert_eq!(
			headers.get(AUTHORIZATION).unwrap(),
			"Basic dW5pdDpwZWVrYWJvbw=="
		);
		assert!(params.is_empty());
	}

	#[test]
	fn api_key_defaults_to_the_conventional_parameter_name() {
		let auth = Authenticator::api_key(None, "abc123");
		let mut headers = HeaderMap::new();
		let mut params = QueryParams::new();
		auth.apply(&mut headers, &mut params);
		assert_eq!(params, vec![("api_key".to_string(), "abc123".to_string())]);
	}

	#[test]
	fn api_key_adds_query_parameter() {
		let auth = Authenticator::api_key_as(None, "abc123", "test");
		let mut headers = HeaderMap::new();
		let mut params = QueryParams::new();
		auth.apply(&mut headers, &mut params);

		assert!(headers.is_empty());
		assert_eq!(params, vec![("test".to_string(), "abc123".to_string())]);
	}
}

//! Cookie types captured from and applied to a browser.

use serde::{Deserialize, Serialize};

/// SameSite cookie attribute.
///
/// Controls when cookies are sent with cross-site requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
	/// Cookie is sent with same-site and cross-site requests
	#[serde(rename = "None")]
	None,
	/// Cookie is sent with same-site requests and cross-site top-level navigations
	#[default]
	#[serde(rename = "Lax")]
	Lax,
	/// Cookie is only sent with same-site requests
	#[serde(rename = "Strict")]
	Strict,
}

impl SameSite {
	/// Parses the loose spellings engines report (`"lax"`, `"no_restriction"`, ...).
	///
	/// Unknown values fall back to [`SameSite::Lax`], the browser default.
	pub fn parse_lenient(raw: &str) -> Self {
		match raw.to_ascii_lowercase().as_str() {
			"strict" => SameSite::Strict,
			"none" | "no_restriction" => SameSite::None,
			_ => SameSite::Lax,
		}
	}
}

/// A browser cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(default)]
	pub domain: String,
	#[serde(default = "default_path")]
	pub path: String,
	/// Epoch milliseconds; `None` marks a session cookie.
	#[serde(default)]
	pub expires: Option<u64>,
	#[serde(default)]
	pub http_only: bool,
	#[serde(default)]
	pub secure: bool,
	#[serde(default)]
	pub same_site: SameSite,
	#[serde(default)]
	pub partitioned: bool,
}

fn default_path() -> String {
	"/".to_string()
}

impl Cookie {
	/// Creates a session cookie on `domain` with path `/`.
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: domain.into(),
			path: default_path(),
			expires: None,
			http_only: false,
			secure: false,
			same_site: SameSite::default(),
			partitioned: false,
		}
	}

	/// Sets the path for the cookie.
	pub fn path(mut self, path: impl Into<String>) -> Self {
		self.path = path.into();
		self
	}

	/// Sets the expiration in epoch milliseconds.
	pub fn expires(mut self, expires_ms: u64) -> Self {
		self.expires = Some(expires_ms);
		self
	}

	/// Sets whether the cookie is HTTP-only.
	pub fn http_only(mut self, http_only: bool) -> Self {
		self.http_only = http_only;
		self
	}

	/// Sets whether the cookie requires HTTPS.
	pub fn secure(mut self, secure: bool) -> Self {
		self.secure = secure;
		self
	}

	/// Sets the SameSite attribute.
	pub fn same_site(mut self, same_site: SameSite) -> Self {
		self.same_site = same_site;
		self
	}

	/// Marks the cookie as partitioned (CHIPS).
	pub fn partitioned(mut self, partitioned: bool) -> Self {
		self.partitioned = partitioned;
		self
	}

	/// Returns true for cookies without an expiry.
	pub fn is_session(&self) -> bool {
		self.expires.is_none()
	}

	/// Returns true when the cookie expired at or before `now_ms`.
	pub fn is_expired(&self, now_ms: u64) -> bool {
		self.expires.is_some_and(|at| at <= now_ms)
	}

	/// Identity used for last-write-wins merging: `(name, domain, path)`.
	pub fn key(&self) -> (&str, &str, &str) {
		(&self.name, &self.domain, &self.path)
	}
}

//! Utility functions shared across the application.

mod secret;

pub use secret::SecretString;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::fmt::Display;

/// Builder for URL query parameters.
///
/// Provides a fluent API for constructing query strings with proper URL encoding.
///
/// # Example
/// ```ignore
/// let query = QueryBuilder::new()
///     .param("scope", "all")
///     .optional("state", Some("opened"))
///     .optional("search", None::<&str>)
///     .build();
/// // Returns "?scope=all&state=opened"
/// ```
#[derive(Default)]
pub struct QueryBuilder {
    params: Vec<(String, String)>,
}

impl QueryBuilder {
    /// Create a new empty query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter (always included).
    pub fn param(mut self, key: &str, value: impl Display) -> Self {
        self.params.push((
            key.to_string(),
            urlencoding::encode(&value.to_string()).into_owned(),
        ));
        self
    }

    /// Add an optional parameter (only included if Some).
    pub fn optional<T: Display>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Add a boolean flag only when it is set.
    pub fn flag(self, key: &str, value: bool) -> Self {
        if value { self.param(key, true) } else { self }
    }

    /// Build the query string.
    ///
    /// Returns an empty string if no parameters were added,
    /// otherwise returns "?key1=value1&key2=value2...".
    pub fn build(self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.params
                    .into_iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        }
    }
}

/// Short hex id used to correlate log lines of one tool call.
pub fn request_id() -> String {
    format!("{:x}", rand::random::<u64>())
}

/// Unguessable URL-safe identifier for OAuth artifacts (client ids, states).
pub fn random_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

//! Transport capabilities consumed by source adapters.
//!
//! Adapters never open sockets or spawn processes themselves. They hold an
//! injected [`HttpTransport`] (request/response providers) or
//! [`CommandExecutor`] (the calendar provider, which shells out to a script)
//! and propagate the capability's error type unchanged.
//!
//! | Implementation | Module | Use |
//! |----------------|--------|-----|
//! | [`ReqwestTransport`] | [`http`] | Real HTTP via `reqwest` |
//! | [`ProcessExecutor`] | [`process`] | Real commands via `tokio::process` |
//! | [`MockHttpTransport`], [`MockExecutor`] | [`mock`] | Scripted test doubles |

pub mod http;
pub mod mock;
pub mod process;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

pub use http::ReqwestTransport;
pub use mock::{MockCommand, MockExecutor, MockHttpTransport, MockRoute, Outcome, RecordedRequest};
pub use process::ProcessExecutor;

/// Request headers, sorted for stable logging and matching.
pub type Headers = BTreeMap<String, String>;

/// Environment overrides passed to a command.
pub type Environment = BTreeMap<String, String>;

/// HTTP verbs supported by [`HttpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a request/response transport call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("resource not found")]
    NotFound,

    #[error("missing required headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    /// A configured header whose name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

/// Failure of a command execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("command exited with {}: {stderr}", describe_exit(.exit_code))]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("command timed out")]
    Timeout,

    #[error("working directory mismatch: expected {expected:?}, got {actual:?}")]
    WorkingDirectoryMismatch {
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("environment mismatch for '{key}'")]
    EnvironmentMismatch { key: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Request/response capability.
///
/// Implementors provide [`send`](HttpTransport::send); the verb helpers are
/// provided methods. Returns the response body on 2xx.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<String, TransportError>;

    async fn get(&self, url: &str, headers: &Headers) -> Result<String, TransportError> {
        self.send(Method::Get, url, None, headers).await
    }

    async fn post(
        &self,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<String, TransportError> {
        self.send(Method::Post, url, body, headers).await
    }

    async fn put(
        &self,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<String, TransportError> {
        self.send(Method::Put, url, body, headers).await
    }

    async fn delete(&self, url: &str, headers: &Headers) -> Result<String, TransportError> {
        self.send(Method::Delete, url, None, headers).await
    }
}

/// Command execution capability. Returns captured stdout on exit code 0.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        env: &Environment,
    ) -> Result<String, ExecError>;
}

/// Expand `${VAR_NAME}` patterns from the process environment.
///
/// Unset variables expand to the empty string.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut cursor = 0;
    while let Some(rel) = result[cursor..].find("${") {
        let start = cursor + rel;
        let end = match result[start..].find('}') {
            Some(pos) => start + pos,
            None => break,
        };
        let var_name = &result[start + 2..end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[end + 1..]);
        cursor = start + value.len();
    }
    result
}

/// Expand every header value with [`expand_env_vars`].
pub fn expand_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}

/// Append percent-encoded path segments and query pairs to a base URL.
pub fn endpoint_url(
    base: &str,
    segments: &[&str],
    query: &[(&str, &str)],
) -> Result<String, TransportError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base, e)))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(base.to_string()))?;
        path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_and_unknown_vars() {
        std::env::set_var("CHX_TRANSPORT_TEST_TOKEN", "s3cret");
        assert_eq!(
            expand_env_vars("Bearer ${CHX_TRANSPORT_TEST_TOKEN}"),
            "Bearer s3cret"
        );
        assert_eq!(expand_env_vars("x${CHX_TRANSPORT_TEST_UNSET_VAR}y"), "xy");
        assert_eq!(expand_env_vars("no vars"), "no vars");
        assert_eq!(expand_env_vars("dangling ${OPEN"), "dangling ${OPEN");
    }

    #[test]
    fn expanded_value_is_not_rescanned() {
        std::env::set_var("CHX_TRANSPORT_TEST_NESTED", "${HOME}");
        assert_eq!(expand_env_vars("${CHX_TRANSPORT_TEST_NESTED}"), "${HOME}");
    }

    #[test]
    fn endpoint_url_encodes_segments_and_query() {
        assert_eq!(
            endpoint_url("https://chat.test", &["api", "messages"], &[("channel", "general")])
                .unwrap(),
            "https://chat.test/api/messages?channel=general"
        );
        assert_eq!(
            endpoint_url("https://mail.test/v1/", &["mailboxes", "Sent Items"], &[]).unwrap(),
            "https://mail.test/v1/mailboxes/Sent%20Items"
        );
        assert!(matches!(
            endpoint_url("not a url", &["x"], &[]),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn exec_failed_display_includes_code() {
        let err = ExecError::Failed {
            exit_code: Some(2),
            stderr: "boom".into(),
        };
        assert_eq!(err.to_string(), "command exited with 2: boom");
        let err = ExecError::Failed {
            exit_code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("signal"));
    }
}

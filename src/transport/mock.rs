//! Scripted transport doubles.
//!
//! Injected into adapters in place of the real transports. Each registration
//! carries an [`Outcome`], so a canned response is either a success value or
//! an error, never both and never neither.
//!
//! ```rust
//! use comms_harness::transport::{Headers, HttpTransport, Method, MockHttpTransport, MockRoute};
//!
//! # tokio_test_block(async {
//! let http = MockHttpTransport::new();
//! http.register(Method::Get, "https://chat.test/api/messages", MockRoute::success(r#"{"messages":[]}"#));
//! let body = http.get("https://chat.test/api/messages", &Headers::new()).await.unwrap();
//! assert_eq!(body, r#"{"messages":[]}"#);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{CommandExecutor, Environment, ExecError, Headers, HttpTransport, Method, TransportError};

/// A canned result: exactly one of a value or an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Success(T),
    Failure(E),
}

impl<T, E> Outcome<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(err) => Err(err),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ═══════════════════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════════════════

/// One registered HTTP response.
#[derive(Debug, Clone)]
pub struct MockRoute {
    outcome: Outcome<String, TransportError>,
    required_headers: Vec<String>,
    delay: Option<Duration>,
}

impl MockRoute {
    pub fn success(body: impl Into<String>) -> Self {
        Self::from_outcome(Outcome::Success(body.into()))
    }

    pub fn failure(err: TransportError) -> Self {
        Self::from_outcome(Outcome::Failure(err))
    }

    pub fn from_outcome(outcome: Outcome<String, TransportError>) -> Self {
        Self {
            outcome,
            required_headers: Vec::new(),
            delay: None,
        }
    }

    /// Fail with [`TransportError::MissingHeaders`] unless the request carries `name`.
    pub fn require_header(mut self, name: impl Into<String>) -> Self {
        self.required_headers.push(name.into());
        self
    }

    /// Wait before answering; used to exercise fetch timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A request observed by [`MockHttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub headers: Headers,
}

/// In-memory [`HttpTransport`]. Unregistered routes answer
/// [`TransportError::NotFound`].
#[derive(Debug, Default)]
pub struct MockHttpTransport {
    routes: Mutex<HashMap<(Method, String), MockRoute>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, method: Method, url: impl Into<String>, route: MockRoute) {
        lock(&self.routes).insert((method, url.into()), route);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<String, TransportError> {
        lock(&self.requests).push(RecordedRequest {
            method,
            url: url.to_string(),
            body: body.map(str::to_string),
            headers: headers.clone(),
        });

        let route = lock(&self.routes).get(&(method, url.to_string())).cloned();
        let Some(route) = route else {
            return Err(TransportError::NotFound);
        };

        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }

        let missing: Vec<String> = route
            .required_headers
            .iter()
            .filter(|name| {
                !headers
                    .keys()
                    .any(|present| present.eq_ignore_ascii_case(name))
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TransportError::MissingHeaders(missing));
        }

        route.outcome.into_result()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════

/// One registered command result, with optional expectations on how the
/// command is invoked.
#[derive(Debug, Clone)]
pub struct MockCommand {
    outcome: Outcome<String, ExecError>,
    working_dir: Option<PathBuf>,
    env: Environment,
    delay: Option<Duration>,
}

impl MockCommand {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::from_outcome(Outcome::Success(stdout.into()))
    }

    pub fn failure(err: ExecError) -> Self {
        Self::from_outcome(Outcome::Failure(err))
    }

    pub fn from_outcome(outcome: Outcome<String, ExecError>) -> Self {
        Self {
            outcome,
            working_dir: None,
            env: Environment::new(),
            delay: None,
        }
    }

    pub fn expect_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn expect_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// In-memory [`CommandExecutor`]. Unregistered commands answer
/// [`ExecError::NotFound`].
#[derive(Debug, Default)]
pub struct MockExecutor {
    commands: Mutex<HashMap<String, MockCommand>>,
    invocations: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, command: impl Into<String>, registration: MockCommand) {
        lock(&self.commands).insert(command.into(), registration);
    }

    pub fn invocations(&self) -> Vec<String> {
        lock(&self.invocations).clone()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        env: &Environment,
    ) -> Result<String, ExecError> {
        lock(&self.invocations).push(command.to_string());

        let registration = lock(&self.commands).get(command).cloned();
        let Some(registration) = registration else {
            return Err(ExecError::NotFound(command.to_string()));
        };

        if let Some(delay) = registration.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(expected) = &registration.working_dir {
            if working_dir != Some(expected.as_path()) {
                return Err(ExecError::WorkingDirectoryMismatch {
                    expected: Some(expected.display().to_string()),
                    actual: working_dir.map(|d| d.display().to_string()),
                });
            }
        }

        for (key, value) in &registration.env {
            if env.get(key) != Some(value) {
                return Err(ExecError::EnvironmentMismatch { key: key.clone() });
            }
        }

        registration.outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_route_is_not_found() {
        let http = MockHttpTransport::new();
        let err = http.get("https://x.test/a", &Headers::new()).await.unwrap_err();
        assert_eq!(err, TransportError::NotFound);
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn failure_outcome_is_returned() {
        let http = MockHttpTransport::new();
        http.register(
            Method::Post,
            "https://x.test/search",
            MockRoute::failure(TransportError::Http {
                status: 500,
                message: "down".into(),
            }),
        );
        let err = http
            .post("https://x.test/search", Some("{}"), &Headers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn required_header_is_enforced_case_insensitively() {
        let http = MockHttpTransport::new();
        http.register(
            Method::Get,
            "https://x.test/a",
            MockRoute::success("ok").require_header("Authorization"),
        );

        let err = http.get("https://x.test/a", &Headers::new()).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::MissingHeaders(vec!["Authorization".into()])
        );

        let mut headers = Headers::new();
        headers.insert("authorization".into(), "Bearer t".into());
        assert_eq!(http.get("https://x.test/a", &headers).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn method_is_part_of_route_key() {
        let http = MockHttpTransport::new();
        http.register(Method::Get, "https://x.test/a", MockRoute::success("ok"));
        let err = http
            .delete("https://x.test/a", &Headers::new())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NotFound);
    }

    #[tokio::test]
    async fn executor_checks_working_dir_and_env() {
        let exec = MockExecutor::new();
        exec.register(
            "events",
            MockCommand::success("[]")
                .expect_working_dir("/srv/cal")
                .expect_env("TZ", "UTC"),
        );

        let err = exec
            .execute("events", Some(Path::new("/tmp")), &Environment::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::WorkingDirectoryMismatch { .. }));

        let err = exec
            .execute("events", Some(Path::new("/srv/cal")), &Environment::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExecError::EnvironmentMismatch { key: "TZ".into() });

        let mut env = Environment::new();
        env.insert("TZ".into(), "UTC".into());
        let out = exec
            .execute("events", Some(Path::new("/srv/cal")), &env)
            .await
            .unwrap();
        assert_eq!(out, "[]");
        assert_eq!(exec.invocations().len(), 3);
    }

    #[tokio::test]
    async fn unregistered_command_is_not_found() {
        let exec = MockExecutor::new();
        let err = exec
            .execute("nope", None, &Environment::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExecError::NotFound("nope".into()));
    }
}

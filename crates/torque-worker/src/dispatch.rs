//! Outbound HTTP dispatch and response classification.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use torque_core::Task;

/// Header reqwest sets automatically to identify the task to the hook.
pub const TASK_ID_HEADER: &str = "X-Task-Id";

/// What happened when we tried to deliver a task, before it's been turned
/// into a store transition. `Outcome::Retry`/`Outcome::Failed` always carry
/// an `error` description even on a non-2xx response, since `last_error` is
/// meant to tell an operator *why* without them having to go dig through
/// upstream logs.
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed { status_code: i32 },
    Retry { status_code: Option<i32>, error: String },
    Failed { status_code: Option<i32>, error: String },
}

/// Builds the reqwest `Client` every worker shares. Redirect policy, TLS
/// verification and connection pooling are client-level settings in
/// reqwest, so they're fixed here once rather than per request; only the
/// per-task timeout varies at call time.
pub fn build_client(max_redirects: usize) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(max_redirects))
        .tls_built_in_root_certs(true)
        .build()
}

/// Issue the outbound POST for one dispatch attempt and classify the result.
/// Never panics, never propagates a `reqwest::Error`. Every failure mode
/// (connect, timeout, TLS, too-many-redirects, DNS) becomes `Outcome::Retry`
/// per the transient-error classification below.
pub async fn dispatch_once(client: &reqwest::Client, task: &Task) -> Outcome {
    let headers = match build_headers(task) {
        Ok(headers) => headers,
        Err(err) => {
            // A header value with an embedded CR/LF or non-ASCII byte is a
            // stored-data problem, not a transient network condition; no
            // retry will fix it.
            return Outcome::Failed {
                status_code: None,
                error: format!("invalid stored header: {err}"),
            };
        }
    };

    let response = client
        .post(&task.url)
        .timeout(std::time::Duration::from_millis(task.timeout_ms as u64))
        .headers(headers)
        .body(task.body.clone())
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            return Outcome::Retry {
                status_code: None,
                error: describe_request_error(&err),
            };
        }
    };

    let status = response.status().as_u16() as i32;
    classify(status)
}

fn build_headers(task: &Task) -> Result<HeaderMap, anyhow::Error> {
    let mut headers = HeaderMap::new();
    for (name, value) in &task.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())?;
        let header_value = HeaderValue::from_str(value)?;
        headers.insert(header_name, header_value);
    }
    headers.insert(
        HeaderName::from_static("x-task-id"),
        HeaderValue::from_str(&task.id.to_string())?,
    );
    Ok(headers)
}

fn describe_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else if err.is_redirect() {
        "too many redirects".to_string()
    } else {
        err.to_string()
    }
}

/// Response classification table: `200` completes the task,
/// `500..=599` is transient and retried, everything else (including other
/// 2xx, 3xx after redirects are exhausted, and 4xx) is a permanent failure.
fn classify(status: i32) -> Outcome {
    if status == 200 {
        Outcome::Completed { status_code: status }
    } else if (500..=599).contains(&status) {
        Outcome::Retry {
            status_code: Some(status),
            error: format!("hook responded with status {status}"),
        }
    } else {
        Outcome::Failed {
            status_code: Some(status),
            error: format!("hook responded with status {status}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hundred_completes() {
        assert!(matches!(classify(200), Outcome::Completed { status_code: 200 }));
    }

    #[test]
    fn one_ninety_nine_fails() {
        assert!(matches!(classify(199), Outcome::Failed { .. }));
    }

    #[test]
    fn two_oh_one_fails() {
        assert!(matches!(classify(201), Outcome::Failed { .. }));
    }

    #[test]
    fn four_oh_four_fails() {
        assert!(matches!(classify(404), Outcome::Failed { .. }));
    }

    #[test]
    fn five_hundred_retries() {
        assert!(matches!(classify(500), Outcome::Retry { .. }));
    }

    #[test]
    fn five_ninety_nine_retries() {
        assert!(matches!(classify(599), Outcome::Retry { .. }));
    }
}

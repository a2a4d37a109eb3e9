//! Maps raw remote failures to user-facing messages.

use crate::error::{ApiError, RemoteError};

/// Translates a raw failure into an [`ApiError`].
pub fn translate(err: &RemoteError) -> ApiError {
    let status = err.status.unwrap_or(500);
    let (message, remediation) = match err.status {
        None => (
            "Remote API is unreachable".to_string(),
            "Check network connectivity; requests are retried automatically",
        ),
        Some(401) => (
            "API token is invalid or expired".to_string(),
            "Regenerate the integration token and update the configuration",
        ),
        Some(403) => (
            "Integration lacks access to this page".to_string(),
            "Share the page with the integration",
        ),
        Some(404) => (
            "Page was deleted or archived".to_string(),
            "The entity will be soft-deleted; restore the page from trash to resume syncing",
        ),
        Some(409) => (
            "Page was modified during sync".to_string(),
            "The change will be retried on the next cycle",
        ),
        Some(429) => (
            "Rate limit reached".to_string(),
            "Backing off automatically",
        ),
        Some(502..=504) => (
            "Remote API is temporarily unavailable".to_string(),
            "The circuit breaker will retry automatically",
        ),
        Some(code) => (
            format!("Remote API error ({code})"),
            "Check the remote service status and try again",
        ),
    };
    ApiError {
        status,
        kind: err.kind(),
        message,
        remediation: remediation.to_string(),
        raw: err.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;

    #[test]
    fn known_statuses_have_remediation() {
        let cases = [
            (401, "invalid or expired"),
            (403, "lacks access"),
            (404, "deleted or archived"),
            (409, "modified during sync"),
            (429, "Rate limit"),
            (503, "temporarily unavailable"),
        ];
        for (status, fragment) in cases {
            let api = translate(&RemoteError::status(status, "raw"));
            assert_eq!(api.status, status);
            assert!(api.message.contains(fragment), "{status}: {}", api.message);
            assert!(!api.remediation.is_empty());
            assert_eq!(api.raw, "raw");
        }
    }

    #[test]
    fn unknown_status_names_the_code() {
        let api = translate(&RemoteError::status(418, "teapot"));
        assert_eq!(api.message, "Remote API error (418)");
        assert_eq!(api.kind, RemoteErrorKind::Permanent);
    }

    #[test]
    fn network_failure_reads_as_500() {
        let api = translate(&RemoteError::network("reset"));
        assert_eq!(api.status, 500);
        assert_eq!(api.kind, RemoteErrorKind::Transient);
    }
}

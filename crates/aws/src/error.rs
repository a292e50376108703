//! SDK error classification.

use aws_sdk_ecr::config::http::HttpResponse;
use aws_sdk_ecr::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use ecr_cleaner_core::RegistryError;
use miette::Diagnostic;
use thiserror::Error;

/// Service error codes worth retrying.
const RETRYABLE_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "SlowDown",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalServerError",
    "InternalServerException",
    "ServerException",
    "InternalFailure",
];

/// Errors from AWS session setup.
#[derive(Error, Debug, Diagnostic)]
pub enum AwsError {
    /// Neither flags, environment nor profile named a region.
    #[error("No AWS region configured")]
    #[diagnostic(
        code(ecr_cleaner::aws::missing_region),
        help("Pass --region, set AWS_REGION, or configure a region for the profile")
    )]
    MissingRegion,

    /// STS could not tell who the credentials belong to.
    #[error("Failed to resolve the AWS caller identity")]
    #[diagnostic(
        code(ecr_cleaner::aws::caller_identity),
        help("Check that credentials are configured and not expired")
    )]
    CallerIdentity {
        /// Underlying classified error
        #[source]
        #[diagnostic_source]
        source: RegistryError,
    },
}

/// How an SDK call failed before any service error code was considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    /// The request could not be built.
    Construction,
    /// Connection, DNS or TLS failure.
    Dispatch,
    /// No response within the configured timeout.
    Timeout,
    /// A response arrived but could not be parsed.
    Response,
    /// The service answered with an error.
    Service,
}

fn is_transient(kind: FailureKind, code: Option<&str>, status: Option<u16>) -> bool {
    match kind {
        FailureKind::Construction => false,
        FailureKind::Dispatch | FailureKind::Timeout | FailureKind::Response => true,
        FailureKind::Service => {
            code.is_some_and(|code| RETRYABLE_CODES.contains(&code))
                || status.is_some_and(|status| status == 429 || status >= 500)
        }
    }
}

/// Map an SDK failure onto a [`RegistryError`].
///
/// Timeouts, dispatch failures, unreadable responses, throttling and server
/// faults are transient. Everything else, including unknown service codes,
/// is permanent. The service error code is preserved either way.
pub fn classify_sdk_error<E>(operation: &str, err: &SdkError<E, HttpResponse>) -> RegistryError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let kind = match err {
        SdkError::ConstructionFailure(_) => FailureKind::Construction,
        SdkError::TimeoutError(_) => FailureKind::Timeout,
        SdkError::DispatchFailure(_) => FailureKind::Dispatch,
        SdkError::ServiceError(_) => FailureKind::Service,
        _ => FailureKind::Response,
    };
    let code = err.code();
    let status = err.raw_response().map(|response| response.status().as_u16());
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(err).to_string(), ToString::to_string);

    let classified = if is_transient(kind, code, status) {
        RegistryError::transient(operation, message)
    } else {
        RegistryError::permanent(operation, message)
    };
    match code {
        Some(code) => classified.with_code(code),
        None => classified,
    }
}

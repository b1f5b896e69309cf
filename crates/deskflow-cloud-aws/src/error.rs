//! AWS SDK error mapping

use aws_sdk_workspaces::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use deskflow_cloud::ProviderError;

/// Fold an SDK error from any AWS client onto the provider error taxonomy
pub(crate) fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            ProviderError::Transport(format!("{operation}: {}", DisplayErrorContext(&err)))
        }
        SdkError::ServiceError(service) => classify(
            operation,
            service.err().code(),
            service.err().message().unwrap_or("no message"),
        ),
        _ => ProviderError::Api(format!("{operation}: {}", DisplayErrorContext(&err))),
    }
}

/// Classify a service error by its AWS error code
pub(crate) fn classify(operation: &str, code: Option<&str>, message: &str) -> ProviderError {
    let Some(code) = code else {
        return ProviderError::Api(format!("{operation}: {message}"));
    };
    let detail = format!("{operation}: {code}: {message}");

    match code {
        "AccessDeniedException"
        | "AccessDenied"
        | "UnauthorizedOperation"
        | "UnrecognizedClientException"
        | "InvalidClientTokenId"
        | "AuthFailure"
        | "ExpiredToken"
        | "ExpiredTokenException"
        | "InvalidSignatureException" => ProviderError::Authentication(detail),
        c if c.starts_with("ResourceNotFound") || c.ends_with(".NotFound") => {
            ProviderError::NotFound(detail)
        }
        c if c.starts_with("Invalid")
            || c.starts_with("Validation")
            || c.starts_with("ResourceLimitExceeded")
            || c.starts_with("ResourceAlreadyExists")
            || c.starts_with("OperationNotSupported") =>
        {
            ProviderError::InvalidRequest(detail)
        }
        _ => ProviderError::Api(detail),
    }
}

/// Builder rejected a request before it was sent
pub(crate) fn invalid_request(
    operation: &str,
    err: impl std::fmt::Display,
) -> ProviderError {
    ProviderError::InvalidRequest(format!("{operation}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_codes() {
        for code in [
            "AccessDeniedException",
            "UnrecognizedClientException",
            "ExpiredTokenException",
            "AuthFailure",
        ] {
            assert!(
                matches!(
                    classify("DescribeWorkspaces", Some(code), "denied"),
                    ProviderError::Authentication(_)
                ),
                "{code}"
            );
        }
    }

    #[test]
    fn test_not_found_codes() {
        assert!(matches!(
            classify("DeleteWorkspaceImage", Some("ResourceNotFoundException"), "gone"),
            ProviderError::NotFound(_)
        ));
        assert!(matches!(
            classify(
                "DescribeNetworkInterfaces",
                Some("InvalidNetworkInterfaceID.NotFound"),
                "gone"
            ),
            ProviderError::NotFound(_)
        ));
    }

    #[test]
    fn test_invalid_request_codes() {
        assert!(matches!(
            classify(
                "CreateWorkspaceBundle",
                Some("InvalidParameterValuesException"),
                "bad capacity"
            ),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify("ImportWorkspaceImage", Some("ResourceLimitExceededException"), "quota"),
            ProviderError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_unknown_code_is_api_error() {
        let err = classify("CreateWorkspaces", Some("InternalFailure"), "boom");
        assert_eq!(
            err,
            ProviderError::Api("CreateWorkspaces: InternalFailure: boom".to_string())
        );
        assert!(matches!(
            classify("CreateWorkspaces", None, "boom"),
            ProviderError::Api(_)
        ));
    }
}

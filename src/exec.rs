//! Response classification shared by every upstream call.

use reqwest::StatusCode;

use crate::error::{MAX_ERROR_BODY_CHARS, PaapiError, Result, truncate_str};
use crate::response::{ApiErrorResponse, ErrorData, SearchItemsResponse};

/// Upstream code for throttled requests.
pub(crate) const TOO_MANY_REQUESTS: &str = "TooManyRequests";

/// Upstream code for a well-formed search that matched nothing.
pub(crate) const NO_RESULTS: &str = "NoResults";

/// Maps an error entry to the error taxonomy.
///
/// Returns `None` for `NoResults`, which is an empty page rather than a failure.
fn classify_error(error: &ErrorData) -> Option<PaapiError> {
    match error.code.as_str() {
        NO_RESULTS => None,
        TOO_MANY_REQUESTS => Some(PaapiError::RateLimited {
            code: error.code.clone(),
            message: error.message.clone(),
        }),
        _ => Some(PaapiError::Upstream {
            code: error.code.clone(),
            message: error.message.clone(),
        }),
    }
}

/// Parses a successful response body.
///
/// An `Errors` list without any `SearchResult` is a failure unless every
/// entry is `NoResults`.
pub(crate) fn parse_success_response(text: &str) -> Result<SearchItemsResponse> {
    let response: SearchItemsResponse = serde_json::from_str(text)?;
    if response.search_result.is_none()
        && let Some(err) = response.errors.iter().find_map(classify_error)
    {
        return Err(err);
    }
    Ok(response)
}

/// Parses an error response body and returns the matching outcome.
///
/// `Ok` is only returned for `NoResults`, as an empty response.
pub(crate) fn parse_error_response(status: StatusCode, text: &str) -> Result<SearchItemsResponse> {
    match serde_json::from_str::<ApiErrorResponse>(text) {
        Ok(api_err) if !api_err.errors.is_empty() => {
            match api_err.errors.iter().find_map(classify_error) {
                Some(err) => Err(err),
                None => Ok(SearchItemsResponse::default()),
            }
        }
        Ok(api_err)
            if api_err
                .error_type
                .as_deref()
                .is_some_and(|t| t.contains("TooManyRequests")) =>
        {
            Err(PaapiError::RateLimited {
                code: TOO_MANY_REQUESTS.to_string(),
                message: truncate_str(text, MAX_ERROR_BODY_CHARS).to_string(),
            })
        }
        _ if status == StatusCode::TOO_MANY_REQUESTS => Err(PaapiError::RateLimited {
            code: TOO_MANY_REQUESTS.to_string(),
            message: truncate_str(text, MAX_ERROR_BODY_CHARS).to_string(),
        }),
        _ => Err(PaapiError::Http(format!(
            "HTTP {} with body: {}",
            status,
            truncate_str(text, MAX_ERROR_BODY_CHARS)
        ))),
    }
}

/// Handles response parsing for both success and error cases.
pub(crate) fn handle_response(status: StatusCode, text: &str) -> Result<SearchItemsResponse> {
    if status.is_success() {
        parse_success_response(text)
    } else {
        parse_error_response(status, text)
    }
}

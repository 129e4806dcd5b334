use subtle::ConstantTimeEq;

use crate::core::error::RenderError;

const BEARER_PREFIX: &str = "Bearer ";

/// Checks the shared render secret from `X-API-Key` or a bearer token.
pub fn authorize(
    expected: &str,
    api_key: Option<&str>,
    authorization: Option<&str>,
) -> Result<(), RenderError> {
    let presented = api_key
        .or_else(|| authorization.and_then(|value| value.strip_prefix(BEARER_PREFIX)))
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let Some(presented) = presented else {
        return Err(RenderError::Unauthorized);
    };

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(RenderError::Forbidden)
    }
}

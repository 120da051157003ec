use axum::http::HeaderMap;

use tawar_core::errors::ApplicationError;

pub const BUYER_ID_HEADER: &str = "x-buyer-id";

/// Identity seam: turns caller credentials into a buyer id. The default
/// implementation trusts an upstream gateway to have authenticated the
/// caller and to forward the id in a header.
pub trait IdentityResolver: Send + Sync {
    fn resolve_buyer(&self, headers: &HeaderMap) -> Result<String, ApplicationError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderIdentityResolver;

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve_buyer(&self, headers: &HeaderMap) -> Result<String, ApplicationError> {
        headers
            .get(BUYER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ApplicationError::Validation(format!("missing `{BUYER_ID_HEADER}` header"))
            })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use tawar_core::errors::ApplicationError;

    use super::{HeaderIdentityResolver, IdentityResolver, BUYER_ID_HEADER};

    #[test]
    fn resolves_trimmed_buyer_id() {
        let mut headers = HeaderMap::new();
        headers.insert(BUYER_ID_HEADER, " buyer-1 ".parse().expect("header value"));

        let buyer = HeaderIdentityResolver.resolve_buyer(&headers).expect("resolve");
        assert_eq!(buyer, "buyer-1");
    }

    #[test]
    fn missing_or_blank_header_is_a_validation_error() {
        let empty = HeaderMap::new();
        let error = HeaderIdentityResolver.resolve_buyer(&empty).expect_err("missing header");
        assert!(matches!(error, ApplicationError::Validation(_)));

        let mut blank = HeaderMap::new();
        blank.insert(BUYER_ID_HEADER, "   ".parse().expect("header value"));
        let error = HeaderIdentityResolver.resolve_buyer(&blank).expect_err("blank header");
        assert!(matches!(error, ApplicationError::Validation(_)));
    }
}

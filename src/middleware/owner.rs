//! Caller identity extractor.
//!
//! Authentication happens in front of vidsentry; the fronting layer passes
//! the authenticated user in a trusted header (`auth.owner_header`).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderName;
use vidsentry_core::config::AuthConfig;
use vidsentry_core::{Error, OwnerId};

use crate::server::AppContext;
use crate::error::AppError;

/// The identity of the caller, required by owner-scoped routes.
#[derive(Debug, Clone)]
pub struct Owner(pub OwnerId);

/// Resolve the configured identity header, falling back to the default
/// name when the configured one is not a valid header name.
pub fn owner_header(config: &AuthConfig) -> HeaderName {
    HeaderName::from_bytes(config.owner_header.to_ascii_lowercase().as_bytes())
        .unwrap_or_else(|_| HeaderName::from_static(AuthConfig::DEFAULT_OWNER_HEADER))
}

impl FromRequestParts<AppContext> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let header = owner_header(&ctx.config.auth);
        parts
            .headers
            .get(&header)
            .and_then(|v| v.to_str().ok())
            .and_then(OwnerId::parse)
            .map(Owner)
            .ok_or_else(|| {
                Error::Unauthorized(format!("missing or empty {header} header")).into()
            })
    }
}

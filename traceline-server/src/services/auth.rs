use base64::prelude::{Engine, BASE64_STANDARD};
use sha2::{Digest, Sha256};
use smallvec::SmallVec;
use thiserror::Error;
use traceline_event_schema::{
    AccessLevel, ApiKeyScope, OrgEnrichedApiKey, OrganizationId, Plan, ProjectId, RateLimitConfig,
};
use traceline_store::{ApiKeyRow, Store};

/// Why a request failed authentication.
///
/// The message is returned to the client; it must not leak key material.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("invalid Authorization header, expected Basic auth")]
    MalformedHeader,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("internal error during authentication")]
    Internal(#[source] traceline_store::StoreError),
}

/// The authenticated principal of one request.
#[derive(Clone, Debug)]
pub struct AuthedRequest {
    /// Project and access level the key grants.
    pub scope: ApiKeyScope,
    /// The key with the owning organization's billing state.
    pub api_key: OrgEnrichedApiKey,
}

/// Parses `Authorization: Basic base64(public_key:secret_key)`.
fn parse_basic(header: &str) -> Result<(String, String), AuthError> {
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or(AuthError::MalformedHeader)?;

    let decoded = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::MalformedHeader)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedHeader)?;

    let (public_key, secret_key) = decoded
        .split_once(':')
        .ok_or(AuthError::MalformedHeader)?;

    Ok((public_key.to_owned(), secret_key.to_owned()))
}

fn digest(secret_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Converts a verified key row into the request principal.
fn into_authed(row: ApiKeyRow) -> AuthedRequest {
    let access_level = match row.scope.as_str() {
        "scores" => AccessLevel::Scores,
        _ => AccessLevel::All,
    };

    // Parse failures on the plan come out as `Plan::Unknown`, which the rate
    // limiter rejects explicitly rather than silently applying a budget.
    let plan: Plan = row.plan.parse().unwrap_or(Plan::Unknown);

    let rate_limit_overrides: SmallVec<[RateLimitConfig; 4]> = match row.rate_limit_overrides {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|error| {
            traceline_log::warn!(
                org_id = row.org_id.as_str(),
                "ignoring malformed rate limit overrides: {error}",
            );
            SmallVec::new()
        }),
        None => SmallVec::new(),
    };

    AuthedRequest {
        scope: ApiKeyScope {
            project_id: ProjectId::new(row.project_id),
            access_level,
        },
        api_key: OrgEnrichedApiKey {
            org_id: OrganizationId::new(row.org_id),
            plan,
            rate_limit_overrides,
        },
    }
}

/// Verifies the `Authorization` header against the key store.
pub async fn verify_api_key(
    store: &Store,
    header: Option<&str>,
) -> Result<AuthedRequest, AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    let (public_key, secret_key) = parse_basic(header)?;

    let row = store
        .find_api_key(&public_key)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::InvalidCredentials)?;

    if digest(&secret_key) != row.hashed_secret_key {
        return Err(AuthError::InvalidCredentials);
    }

    Ok(into_authed(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ApiKeyRow {
        ApiKeyRow {
            public_key: "pk-tl-1234".to_owned(),
            hashed_secret_key: digest("sk-tl-secret"),
            project_id: "proj-1".to_owned(),
            scope: "all".to_owned(),
            org_id: "org-1".to_owned(),
            plan: "cloud:pro".to_owned(),
            rate_limit_overrides: None,
        }
    }

    #[test]
    fn parses_basic_auth() {
        let header = format!("Basic {}", BASE64_STANDARD.encode("pk-tl-1234:sk-tl-secret"));
        let (public_key, secret_key) = parse_basic(&header).unwrap();
        assert_eq!(public_key, "pk-tl-1234");
        assert_eq!(secret_key, "sk-tl-secret");
    }

    #[test]
    fn rejects_non_basic_schemes() {
        assert!(matches!(
            parse_basic("Bearer token"),
            Err(AuthError::MalformedHeader)
        ));
        assert!(matches!(
            parse_basic("Basic !!!"),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(digest("sk-tl-secret").len(), 64);
        assert_eq!(digest("a"), digest("a"));
        assert_ne!(digest("a"), digest("b"));
    }

    #[test]
    fn row_conversion_resolves_scope_and_plan() {
        let authed = into_authed(row());
        assert_eq!(authed.scope.access_level, AccessLevel::All);
        assert_eq!(authed.api_key.plan, Plan::CloudPro);
        assert!(authed.api_key.rate_limit_overrides.is_empty());

        let mut scores_row = row();
        scores_row.scope = "scores".to_owned();
        scores_row.plan = "made-up-plan".to_owned();
        let authed = into_authed(scores_row);
        assert_eq!(authed.scope.access_level, AccessLevel::Scores);
        assert_eq!(authed.api_key.plan, Plan::Unknown);
    }

    #[test]
    fn row_conversion_reads_overrides() {
        let mut with_overrides = row();
        with_overrides.rate_limit_overrides = Some(serde_json::json!([
            { "resource": "ingestion", "points": 10, "durationSeconds": 30 }
        ]));

        let authed = into_authed(with_overrides);
        assert_eq!(authed.api_key.rate_limit_overrides.len(), 1);
        assert_eq!(authed.api_key.rate_limit_overrides[0].points, Some(10));
    }
}

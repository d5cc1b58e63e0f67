use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{OrganizationId, Plan, ProjectId, RateLimitConfig, RateLimitResource};

/// What a verified API key is allowed to submit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Full ingestion access.
    #[default]
    All,
    /// Restricted keys may only submit `SCORE_CREATE` events.
    Scores,
}

/// The authenticated principal's permissions for one request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ApiKeyScope {
    /// The project the key belongs to.
    pub project_id: ProjectId,

    /// The key's access level.
    pub access_level: AccessLevel,
}

/// An API key enriched with the owning organization's billing state.
///
/// Produced by key verification and consumed by the rate limiter, which
/// resolves the effective budget as override > plan group > default.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OrgEnrichedApiKey {
    /// The owning organization.
    pub org_id: OrganizationId,

    /// The organization's billing plan.
    pub plan: Plan,

    /// Organization-specific budget overrides, at most one per resource.
    #[serde(default)]
    pub rate_limit_overrides: SmallVec<[RateLimitConfig; 4]>,
}

impl OrgEnrichedApiKey {
    /// Returns the override for `resource`, if one is configured.
    pub fn override_for(&self, resource: RateLimitResource) -> Option<&RateLimitConfig> {
        self.rate_limit_overrides
            .iter()
            .find(|config| config.resource == resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn override_lookup_matches_resource() {
        let key = OrgEnrichedApiKey {
            org_id: OrganizationId::new("org-1"),
            plan: Plan::CloudPro,
            rate_limit_overrides: smallvec![RateLimitConfig::limited(
                RateLimitResource::Ingestion,
                42,
                10
            )],
        };

        assert_eq!(
            key.override_for(RateLimitResource::Ingestion)
                .and_then(|c| c.points),
            Some(42)
        );
        assert!(key.override_for(RateLimitResource::Prompts).is_none());
    }
}

use traceline_event_schema::{OrgEnrichedApiKey, Plan, RateLimitConfig, RateLimitResource};

use crate::RateLimitError;

/// Equivalence class of billing plans sharing rate-limit budgets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanGroup {
    /// Self-serve plans: `default`, `cloud:hobby`, `cloud:pro`.
    Default,
    /// High-volume plans: `cloud:team`, `self-hosted:enterprise`.
    Team,
}

impl PlanGroup {
    /// Maps a plan to its group. Unknown plans have no group.
    pub fn from_plan(plan: Plan) -> Option<Self> {
        match plan {
            Plan::Default | Plan::CloudHobby | Plan::CloudPro => Some(Self::Default),
            Plan::CloudTeam | Plan::SelfHostedEnterprise => Some(Self::Team),
            Plan::Unknown => None,
        }
    }

    /// Returns the group's budget for `resource`.
    pub fn config(self, resource: RateLimitResource) -> RateLimitConfig {
        use RateLimitResource::*;

        match (self, resource) {
            (Self::Default, Ingestion) => RateLimitConfig::limited(resource, 100, 60),
            (Self::Default, Prompts) => RateLimitConfig::unlimited(resource),
            (Self::Default, PublicApi) => RateLimitConfig::limited(resource, 1_000, 60),
            (Self::Default, PublicApiMetrics) => RateLimitConfig::limited(resource, 10, 60),

            (Self::Team, Ingestion) => RateLimitConfig::limited(resource, 5_000, 60),
            (Self::Team, Prompts) => RateLimitConfig::unlimited(resource),
            (Self::Team, PublicApi) => RateLimitConfig::limited(resource, 10_000, 60),
            (Self::Team, PublicApiMetrics) => RateLimitConfig::limited(resource, 100, 60),
        }
    }
}

/// A resolved, enforceable budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EffectiveLimit {
    /// Admitted requests per window.
    pub points: u32,
    /// Window length in seconds.
    pub duration: u64,
}

/// Resolves the budget that applies to `api_key` for `resource`.
///
/// Returns `Ok(None)` when the resource is unlimited for this organization,
/// either explicitly (null budget) or through an override.
pub fn effective_limit(
    api_key: &OrgEnrichedApiKey,
    resource: RateLimitResource,
) -> Result<Option<EffectiveLimit>, RateLimitError> {
    let config = match api_key.override_for(resource) {
        Some(config) => *config,
        None => PlanGroup::from_plan(api_key.plan)
            .ok_or(RateLimitError::UnknownPlan(api_key.plan))?
            .config(resource),
    };

    match (config.points, config.duration) {
        (Some(points), Some(duration)) if duration > 0 => {
            Ok(Some(EffectiveLimit { points, duration }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;
    use traceline_event_schema::OrganizationId;

    use super::*;

    fn api_key(plan: Plan) -> OrgEnrichedApiKey {
        OrgEnrichedApiKey {
            org_id: OrganizationId::new("org-1"),
            plan,
            rate_limit_overrides: smallvec![],
        }
    }

    #[test]
    fn plan_group_mapping() {
        assert_eq!(PlanGroup::from_plan(Plan::CloudHobby), Some(PlanGroup::Default));
        assert_eq!(PlanGroup::from_plan(Plan::CloudPro), Some(PlanGroup::Default));
        assert_eq!(PlanGroup::from_plan(Plan::CloudTeam), Some(PlanGroup::Team));
        assert_eq!(
            PlanGroup::from_plan(Plan::SelfHostedEnterprise),
            Some(PlanGroup::Team)
        );
        assert_eq!(PlanGroup::from_plan(Plan::Unknown), None);
    }

    #[test]
    fn default_plan_ingestion_budget() {
        let limit = effective_limit(&api_key(Plan::Default), RateLimitResource::Ingestion)
            .unwrap()
            .unwrap();
        assert_eq!(limit.points, 100);
        assert_eq!(limit.duration, 60);
    }

    #[test]
    fn unlimited_resource_resolves_to_none() {
        let limit = effective_limit(&api_key(Plan::CloudTeam), RateLimitResource::Prompts).unwrap();
        assert!(limit.is_none());
    }

    #[test]
    fn unknown_plan_is_an_error() {
        let result = effective_limit(&api_key(Plan::Unknown), RateLimitResource::Ingestion);
        assert!(matches!(result, Err(RateLimitError::UnknownPlan(_))));
    }

    #[test]
    fn override_takes_precedence_over_plan() {
        let mut key = api_key(Plan::Default);
        key.rate_limit_overrides =
            smallvec![RateLimitConfig::limited(RateLimitResource::Ingestion, 7, 10)];

        let limit = effective_limit(&key, RateLimitResource::Ingestion)
            .unwrap()
            .unwrap();
        assert_eq!(limit.points, 7);
        assert_eq!(limit.duration, 10);
    }

    #[test]
    fn null_override_disables_the_limit() {
        let mut key = api_key(Plan::Default);
        key.rate_limit_overrides = smallvec![RateLimitConfig::unlimited(RateLimitResource::Ingestion)];

        let limit = effective_limit(&key, RateLimitResource::Ingestion).unwrap();
        assert!(limit.is_none());
    }
}

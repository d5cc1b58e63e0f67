use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A rate-limited resource.
///
/// Closed set; the name doubles as the Redis key segment for the limiter.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitResource {
    /// The batch ingestion endpoint.
    Ingestion,
    /// Prompt management endpoints.
    Prompts,
    /// The general public API.
    PublicApi,
    /// Metrics aggregation endpoints of the public API.
    PublicApiMetrics,
}

impl RateLimitResource {
    /// Returns the canonical name of this resource.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Prompts => "prompts",
            Self::PublicApi => "public-api",
            Self::PublicApiMetrics => "public-api-metrics",
        }
    }
}

impl fmt::Display for RateLimitResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The billing plan of an organization.
///
/// Unrecognized plan names deserialize to [`Plan::Unknown`]; the rate limiter
/// rejects those explicitly instead of guessing a budget.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum Plan {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "cloud:hobby")]
    CloudHobby,
    #[serde(rename = "cloud:pro")]
    CloudPro,
    #[serde(rename = "cloud:team")]
    CloudTeam,
    #[serde(rename = "self-hosted:enterprise")]
    SelfHostedEnterprise,
    #[serde(other)]
    Unknown,
}

impl Plan {
    /// Returns the canonical name of this plan.
    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::CloudHobby => "cloud:hobby",
            Self::CloudPro => "cloud:pro",
            Self::CloudTeam => "cloud:team",
            Self::SelfHostedEnterprise => "self-hosted:enterprise",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Plan {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "default" => Self::Default,
            "cloud:hobby" => Self::CloudHobby,
            "cloud:pro" => Self::CloudPro,
            "cloud:team" => Self::CloudTeam,
            "self-hosted:enterprise" => Self::SelfHostedEnterprise,
            _ => Self::Unknown,
        })
    }
}

/// Budget for one resource: `points` requests per `duration` seconds.
///
/// A `None` in either field means the resource is unlimited.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// The resource this budget applies to.
    pub resource: RateLimitResource,

    /// Number of admitted requests per window.
    pub points: Option<u32>,

    /// Window length in seconds.
    #[serde(rename = "durationSeconds")]
    pub duration: Option<u64>,
}

impl RateLimitConfig {
    /// A budget of `points` per `duration` seconds.
    pub fn limited(resource: RateLimitResource, points: u32, duration: u64) -> Self {
        Self {
            resource,
            points: Some(points),
            duration: Some(duration),
        }
    }

    /// An explicitly unlimited budget.
    pub fn unlimited(resource: RateLimitResource) -> Self {
        Self {
            resource,
            points: None,
            duration: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_known_and_unknown() {
        assert_eq!("cloud:pro".parse::<Plan>().unwrap(), Plan::CloudPro);
        assert_eq!("cloud:galactic".parse::<Plan>().unwrap(), Plan::Unknown);

        let plan: Plan = serde_json::from_str("\"cloud:team\"").unwrap();
        assert_eq!(plan, Plan::CloudTeam);

        let plan: Plan = serde_json::from_str("\"not-a-plan\"").unwrap();
        assert_eq!(plan, Plan::Unknown);
    }

    #[test]
    fn resource_names_are_kebab_case() {
        assert_eq!(RateLimitResource::PublicApiMetrics.name(), "public-api-metrics");
        let resource: RateLimitResource = serde_json::from_str("\"public-api\"").unwrap();
        assert_eq!(resource, RateLimitResource::PublicApi);
    }
}

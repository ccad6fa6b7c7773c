//! Backend registry
//!
//! Static mapping from [`TaskCategory`] to the [`BackendProfile`] that serves
//! it. The registry is built once at startup, validated on construction, and
//! only read afterwards, so it can be shared behind an `Arc` without locking.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::TaskCategory;
use crate::error::RouterError;

/// Model identifier and invocation parameters for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProfile {
    pub category: TaskCategory,
    /// Backend model identifier, e.g. `gpt-4o`.
    pub model_id: String,
    /// Gateway tool invoked for this category.
    pub tool_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-attempt time budget.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl BackendProfile {
    /// Profile using the category's default tool name.
    pub fn new(category: TaskCategory, model_id: impl Into<String>) -> Self {
        Self {
            category,
            model_id: model_id.into(),
            tool_name: category.tool_name().to_string(),
            max_tokens: 4000,
            temperature: 0.4,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = tool_name.into();
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.model_id.trim().is_empty() {
            return Err(format!("{}: model_id must not be empty", self.category));
        }
        if self.tool_name.trim().is_empty() {
            return Err(format!("{}: tool_name must not be empty", self.category));
        }
        if self.max_tokens == 0 {
            return Err(format!("{}: max_tokens must be > 0", self.category));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "{}: temperature must be in [0, 2], got {}",
                self.category, self.temperature
            ));
        }
        if self.timeout.is_zero() {
            return Err(format!("{}: timeout must be > 0", self.category));
        }
        Ok(())
    }
}

/// Read-only category → profile table.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    profiles: BTreeMap<TaskCategory, BackendProfile>,
}

impl BackendRegistry {
    /// Build a registry, rejecting duplicate, missing or invalid profiles.
    pub fn new(profiles: impl IntoIterator<Item = BackendProfile>) -> Result<Self, RouterError> {
        let mut map = BTreeMap::new();
        for profile in profiles {
            profile.validate().map_err(RouterError::Configuration)?;
            let category = profile.category;
            if map.insert(category, profile).is_some() {
                return Err(RouterError::Configuration(format!(
                    "duplicate backend profile for {category}"
                )));
            }
        }

        let missing: Vec<String> = TaskCategory::ALL
            .iter()
            .filter(|c| !map.contains_key(*c))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(RouterError::Configuration(format!(
                "no backend profile for: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { profiles: map })
    }

    /// Profile serving `category`.
    pub fn resolve(&self, category: TaskCategory) -> Result<&BackendProfile, RouterError> {
        self.profiles.get(&category).ok_or_else(|| {
            tracing::error!(%category, "backend registry has no profile; deployment is misconfigured");
            RouterError::Configuration(format!("no backend profile for {category}"))
        })
    }

    /// All profiles in category order.
    pub fn profiles(&self) -> impl Iterator<Item = &BackendProfile> {
        self.profiles.values()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_set() -> Vec<BackendProfile> {
        vec![
            BackendProfile::new(TaskCategory::MathCode, "claude-3-5-sonnet-20240620"),
            BackendProfile::new(TaskCategory::VisionLanguage, "gpt-4o"),
            BackendProfile::new(TaskCategory::Light, "gpt-4o-mini"),
        ]
    }

    #[test]
    fn resolve_is_total() {
        let registry = BackendRegistry::new(full_set()).unwrap();
        for category in TaskCategory::ALL {
            let profile = registry.resolve(category).unwrap();
            assert_eq!(profile.category, category);
            assert_eq!(profile.tool_name, category.tool_name());
        }
        assert_eq!(
            registry.resolve(TaskCategory::Light).unwrap().model_id,
            "gpt-4o-mini"
        );
    }

    #[test]
    fn missing_category_rejected() {
        let mut profiles = full_set();
        profiles.retain(|p| p.category != TaskCategory::VisionLanguage);
        let err = BackendRegistry::new(profiles).unwrap_err();
        assert!(matches!(err, RouterError::Configuration(_)));
        assert!(err.to_string().contains("vision_language"));
    }

    #[test]
    fn duplicate_category_rejected() {
        let mut profiles = full_set();
        profiles.push(BackendProfile::new(TaskCategory::Light, "other"));
        let err = BackendRegistry::new(profiles).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn invalid_parameters_rejected() {
        let mut profiles = full_set();
        profiles[0] = profiles[0].clone().with_temperature(2.5);
        assert!(BackendRegistry::new(profiles).is_err());

        let mut profiles = full_set();
        profiles[1] = profiles[1].clone().with_max_tokens(0);
        assert!(BackendRegistry::new(profiles).is_err());

        let mut profiles = full_set();
        profiles[2] = profiles[2].clone().with_timeout(Duration::ZERO);
        assert!(BackendRegistry::new(profiles).is_err());
    }

    #[test]
    fn custom_tool_name_is_kept_and_validated() {
        let mut profiles = full_set();
        profiles[2] = profiles[2].clone().with_tool_name("summarize");
        let registry = BackendRegistry::new(profiles).unwrap();
        assert_eq!(registry.resolve(TaskCategory::Light).unwrap().tool_name, "summarize");

        let mut profiles = full_set();
        profiles[0] = profiles[0].clone().with_tool_name("  ");
        let err = BackendRegistry::new(profiles).unwrap_err();
        assert!(err.to_string().contains("tool_name"));
    }

    #[test]
    fn profiles_iterate_in_category_order() {
        let registry = BackendRegistry::new(full_set().into_iter().rev()).unwrap();
        let order: Vec<_> = registry.profiles().map(|p| p.category).collect();
        assert_eq!(order, TaskCategory::ALL.to_vec());
    }

    #[test]
    fn profile_serializes_timeout_in_seconds() {
        let profile = BackendProfile::new(TaskCategory::Light, "gpt-4o")
            .with_timeout(Duration::from_millis(1500));
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["timeout"], 1.5);
        assert_eq!(json["category"], "light");
        let back: BackendProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout, Duration::from_millis(1500));
    }
}

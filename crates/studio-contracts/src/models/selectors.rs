use super::registry::{Capability, ModelRegistry, ModelSpec};

/// Ordered candidates for one capability, plus why the order differs from
/// what the caller asked for (if it does).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePlan {
    pub capability: Capability,
    pub models: Vec<ModelSpec>,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

impl CandidatePlan {
    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|model| model.name.clone()).collect()
    }

    pub fn first(&self) -> Option<&ModelSpec> {
        self.models.first()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Candidate order for `capability`. A requested model that supports the
    /// capability goes first and is not repeated; an unusable request is
    /// ignored with a reason. An empty plan is not an error: callers degrade.
    pub fn candidates(&self, requested: Option<&str>, capability: Capability) -> CandidatePlan {
        let defaults = self.registry.by_capability(capability);
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());

        let Some(requested_value) = requested else {
            return CandidatePlan {
                capability,
                models: defaults,
                requested: None,
                fallback_reason: None,
            };
        };

        if let Some(model) = self.registry.ensure(requested_value, capability) {
            let mut models = vec![model];
            models.extend(
                defaults
                    .into_iter()
                    .filter(|candidate| candidate.name != requested_value),
            );
            return CandidatePlan {
                capability,
                models,
                requested: Some(requested_value.to_string()),
                fallback_reason: None,
            };
        }

        CandidatePlan {
            capability,
            models: defaults,
            requested: Some(requested_value.to_string()),
            fallback_reason: Some(format!(
                "Requested model '{requested_value}' unavailable for capability '{capability}'."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> ModelSelector {
        ModelSelector::new(Some(ModelRegistry::from_specs([
            ModelSpec::new("a", "gemini", &[Capability::Portrait]),
            ModelSpec::new("b", "gemini", &[Capability::Portrait, Capability::Upscale]),
            ModelSpec::new("v", "gemini", &[Capability::Motion]),
        ])))
    }

    #[test]
    fn no_request_uses_registry_order() {
        let plan = selector().candidates(None, Capability::Portrait);
        assert_eq!(plan.names(), vec!["a", "b"]);
        assert!(plan.fallback_reason.is_none());
    }

    #[test]
    fn supported_request_moves_to_front_without_duplicates() {
        let plan = selector().candidates(Some("b"), Capability::Portrait);
        assert_eq!(plan.names(), vec!["b", "a"]);
        assert_eq!(plan.requested.as_deref(), Some("b"));
    }

    #[test]
    fn unsupported_request_falls_back_with_reason() {
        let plan = selector().candidates(Some("v"), Capability::Upscale);
        assert_eq!(plan.names(), vec!["b"]);
        assert_eq!(
            plan.fallback_reason.as_deref(),
            Some("Requested model 'v' unavailable for capability 'upscale'.")
        );
    }

    #[test]
    fn blank_request_is_treated_as_absent() {
        let plan = selector().candidates(Some("  "), Capability::Motion);
        assert_eq!(plan.names(), vec!["v"]);
        assert!(plan.requested.is_none());
    }

    #[test]
    fn empty_capability_yields_empty_plan() {
        let selector = ModelSelector::new(Some(ModelRegistry::from_specs([])));
        assert!(selector.candidates(None, Capability::Dataset).models.is_empty());
    }
}

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What a model is asked to do in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Portrait,
    Dataset,
    Upscale,
    Motion,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Portrait,
        Capability::Dataset,
        Capability::Upscale,
        Capability::Motion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Portrait => "portrait",
            Capability::Dataset => "dataset",
            Capability::Upscale => "upscale",
            Capability::Motion => "motion",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[Capability]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities.to_vec(),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Insertion-ordered model table. Order is preference order: the first model
/// supporting a capability is tried first.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn from_specs(specs: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            models: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    /// Offline registry backed by the `dryrun` provider only.
    pub fn dryrun() -> Self {
        Self::from_specs([
            ModelSpec::new(
                "dryrun-image-1",
                "dryrun",
                &[Capability::Portrait, Capability::Dataset, Capability::Upscale],
            ),
            ModelSpec::new("dryrun-video-1", "dryrun", &[Capability::Motion]),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    use Capability::{Dataset, Motion, Portrait, Upscale};

    let mut map = IndexMap::new();
    let mut insert = |name: &str, provider: &str, capabilities: &[Capability]| {
        map.insert(
            name.to_string(),
            ModelSpec::new(name, provider, capabilities),
        );
    };

    insert("gemini-3-pro-image-preview", "gemini", &[Portrait, Upscale]);
    insert("gemini-2.5-flash-image", "gemini", &[Portrait, Upscale]);
    insert(
        "gemini-2.0-flash-exp-image-generation",
        "gemini",
        &[Portrait, Dataset, Upscale],
    );
    insert("gemini-2.0-flash-exp", "gemini", &[Portrait, Dataset, Upscale]);
    insert("gemini-2.0-flash-thinking-exp", "gemini", &[Dataset]);
    insert("gemini-1.5-pro", "gemini", &[Dataset]);
    insert("veo-3.1-generate-preview", "gemini", &[Motion]);

    map
}

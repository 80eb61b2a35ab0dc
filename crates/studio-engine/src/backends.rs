use std::sync::Arc;

use anyhow::Result;
use studio_contracts::events::EventWriter;
use studio_contracts::models::{ModelRegistry, ModelSelector};
use studio_contracts::session::{SessionContext, StorageCredentials};

use crate::config::EngineConfig;
use crate::dryrun::{DryrunImageModel, DryrunVideoModel};
use crate::gemini::GeminiImageModel;
use crate::providers::ImageProviderRegistry;
use crate::stages::StageContext;
use crate::storage::{MemoryStore, ObjectStore, SupabaseStore};
use crate::video::{VeoVideoModel, VideoModel};

/// Factory for the provider clients a stage call needs.
///
/// Clients are built per call so blocking HTTP clients are created on the
/// thread that uses them.
pub trait Backends: Send + Sync {
    fn config(&self) -> &EngineConfig;
    fn image_providers(&self) -> ImageProviderRegistry;
    fn video_model(&self) -> Box<dyn VideoModel>;
    fn object_store(&self, credentials: &StorageCredentials) -> Result<Box<dyn ObjectStore>>;

    fn selector(&self) -> ModelSelector {
        ModelSelector::default()
    }
}

/// Gemini and Veo over HTTP, Supabase for storage.
#[derive(Debug, Clone)]
pub struct LiveBackends {
    config: EngineConfig,
}

impl LiveBackends {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl Backends for LiveBackends {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn image_providers(&self) -> ImageProviderRegistry {
        let mut providers = ImageProviderRegistry::new();
        providers.register(GeminiImageModel::new(&self.config));
        providers
    }

    fn video_model(&self) -> Box<dyn VideoModel> {
        Box::new(VeoVideoModel::new(&self.config))
    }

    fn object_store(&self, credentials: &StorageCredentials) -> Result<Box<dyn ObjectStore>> {
        Ok(Box::new(SupabaseStore::new(
            credentials,
            &self.config.storage_bucket,
            self.config.request_timeout,
        )?))
    }
}

/// Offline backends: hashed-color images, empty video jobs and one shared
/// in-memory bucket.
#[derive(Debug, Clone)]
pub struct DryrunBackends {
    config: EngineConfig,
    store: Arc<MemoryStore>,
}

impl DryrunBackends {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl Backends for DryrunBackends {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn image_providers(&self) -> ImageProviderRegistry {
        let mut providers = ImageProviderRegistry::new();
        providers.register(DryrunImageModel);
        providers
    }

    fn video_model(&self) -> Box<dyn VideoModel> {
        Box::new(DryrunVideoModel)
    }

    fn object_store(&self, _credentials: &StorageCredentials) -> Result<Box<dyn ObjectStore>> {
        Ok(Box::new(Arc::clone(&self.store)))
    }

    fn selector(&self) -> ModelSelector {
        ModelSelector::new(Some(ModelRegistry::dryrun()))
    }
}

/// Owned clients for one or more stage calls on the current thread.
pub struct StageKit {
    pub providers: ImageProviderRegistry,
    pub video: Box<dyn VideoModel>,
    pub selector: ModelSelector,
    pub config: EngineConfig,
}

impl StageKit {
    pub fn new(backends: &dyn Backends) -> Self {
        Self {
            providers: backends.image_providers(),
            video: backends.video_model(),
            selector: backends.selector(),
            config: backends.config().clone(),
        }
    }

    pub fn context<'a>(
        &'a self,
        session: &'a SessionContext,
        events: Option<&'a EventWriter>,
    ) -> StageContext<'a> {
        StageContext {
            session,
            providers: &self.providers,
            video: self.video.as_ref(),
            selector: &self.selector,
            config: &self.config,
            events,
        }
    }
}

use std::collections::BTreeMap;

use anyhow::Result;

/// One image-to-image call: a prompt plus the input picture.
#[derive(Debug, Clone, Copy)]
pub struct ImageInvocation<'a> {
    pub credential: &'a str,
    pub model: &'a str,
    pub prompt: &'a str,
    pub image: &'a [u8],
    pub mime_type: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// A remote (or fake) image model family.
///
/// `Ok(None)` means the call went through but the response held no image,
/// e.g. a text-only answer. Transport and HTTP failures are `Err`.
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, request: &ImageInvocation<'_>) -> Result<Option<GeneratedImage>>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageModel>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageModel + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageModel> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

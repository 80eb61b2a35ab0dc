use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use studio_contracts::pipeline::DatasetItem;
use studio_contracts::session::{SessionHandle, StorageCredentials};

use crate::{response_json_or_error, truncate_text};

const IMAGE_SUFFIX: &str = ".jpg";
const IMAGE_CONTENT_TYPE: &str = "image/jpeg";
const PLACEHOLDER_OBJECT: &str = ".emptyFolderPlaceholder";

/// Flat key/value blob store with public URLs. Writes overwrite.
pub trait ObjectStore: Send + Sync {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;
    fn public_url(&self, path: &str) -> String;
    /// Object names directly under `prefix/`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub url: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub id: u32,
    pub name: String,
    pub url: String,
    pub path: String,
}

/// Session-scoped uploads on top of an [`ObjectStore`]. Objects live at
/// `<session>/<name>.jpg`.
pub struct StorageHandoff<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> StorageHandoff<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    pub fn upload(&self, session: &SessionHandle, name: &str, bytes: &[u8]) -> Result<StoredObject> {
        let path = object_path(session, name);
        self.store
            .put(&path, bytes, IMAGE_CONTENT_TYPE)
            .with_context(|| format!("upload of {path} failed"))?;
        Ok(StoredObject {
            name: name.to_string(),
            url: self.store.public_url(&path),
            path,
        })
    }

    /// Uploads every item, dropping (and logging) the ones that fail.
    pub fn upload_batch(&self, session: &SessionHandle, items: &[DatasetItem]) -> Vec<StoredItem> {
        let mut stored = Vec::with_capacity(items.len());
        for item in items {
            match self.upload(session, &item.label, &item.image) {
                Ok(object) => stored.push(StoredItem {
                    id: item.id,
                    name: object.name,
                    url: object.url,
                    path: object.path,
                }),
                Err(err) => {
                    tracing::warn!(id = item.id, name = %item.label, error = %format!("{err:#}"), "batch upload dropped item");
                }
            }
        }
        stored
    }

    pub fn list(&self, session: &SessionHandle) -> Result<Vec<StoredObject>> {
        let names = self.store.list(session.as_str())?;
        Ok(names
            .into_iter()
            .filter(|name| name != PLACEHOLDER_OBJECT)
            .map(|file| {
                let path = format!("{session}/{file}");
                StoredObject {
                    name: file
                        .strip_suffix(IMAGE_SUFFIX)
                        .unwrap_or(&file)
                        .to_string(),
                    url: self.store.public_url(&path),
                    path,
                }
            })
            .collect())
    }
}

/// Storage key for an image. Separators inside `name` are flattened so every
/// object stays directly under the session prefix, and characters that would
/// end or escape a URL path become `-` so the key matches its public URL.
pub fn object_path(session: &SessionHandle, name: &str) -> String {
    let safe: String = name
        .trim()
        .chars()
        .map(|ch| {
            if matches!(ch, '/' | '\\' | '#' | '?' | '%') || ch.is_control() {
                '-'
            } else {
                ch
            }
        })
        .collect();
    format!("{session}/{safe}{IMAGE_SUFFIX}")
}

/// Supabase Storage REST API.
pub struct SupabaseStore {
    base_url: String,
    key: String,
    bucket: String,
    timeout: Duration,
    http: HttpClient,
}

impl SupabaseStore {
    pub fn new(credentials: &StorageCredentials, bucket: &str, timeout: Duration) -> Result<Self> {
        let base_url = credentials.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() || credentials.key.trim().is_empty() {
            bail!("Supabase URL and key are required");
        }
        Ok(Self {
            base_url,
            key: credentials.key.trim().to_string(),
            bucket: bucket.to_string(),
            timeout,
            http: HttpClient::new(),
        })
    }
}

impl ObjectStore for SupabaseStore {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let endpoint = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        );
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .timeout(self.timeout)
            .body(bytes.to_vec())
            .send()
            .with_context(|| format!("Supabase upload request failed ({path})"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!(
                "Supabase upload failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 256)
            );
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let endpoint = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .timeout(self.timeout)
            .json(&json!({
                "prefix": prefix,
                "limit": 100,
                "offset": 0,
                "sortBy": { "column": "name", "order": "asc" },
            }))
            .send()
            .with_context(|| format!("Supabase list request failed ({prefix})"))?;
        let payload = response_json_or_error("Supabase list", response)?;
        Ok(payload
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| entry.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

/// Process-local bucket for dryrun runs. Public URLs use the `memory://`
/// scheme and resolve to nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        self.objects
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{path}")
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let wanted = format!("{prefix}/");
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(objects
            .keys()
            .filter_map(|path| path.strip_prefix(&wanted))
            .map(str::to_string)
            .collect())
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        (**self).put(path, bytes, content_type)
    }

    fn public_url(&self, path: &str) -> String {
        (**self).public_url(path)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix)
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use anyhow::{bail, Result};

    use super::{MemoryStore, ObjectStore};

    /// Memory store that rejects puts whose path contains `fail_on`.
    pub struct FlakyStore {
        pub inner: MemoryStore,
        pub fail_on: String,
    }

    impl FlakyStore {
        pub fn failing_on(fragment: &str) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_on: fragment.to_string(),
            }
        }
    }

    impl ObjectStore for FlakyStore {
        fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
            if path.contains(self.fail_on.as_str()) {
                bail!("simulated upload failure");
            }
            self.inner.put(path, bytes, content_type)
        }

        fn public_url(&self, path: &str) -> String {
            self.inner.public_url(path)
        }

        fn list(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list(prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FlakyStore;
    use super::*;

    fn session() -> SessionHandle {
        SessionHandle::parse("session_1_abcdef12").unwrap()
    }

    #[test]
    fn upload_uses_session_prefix_and_jpg_suffix() -> Result<()> {
        let store = MemoryStore::default();
        let stored = StorageHandoff::new(&store).upload(&session(), "face", &[1, 2])?;
        assert_eq!(stored.path, "session_1_abcdef12/face.jpg");
        assert_eq!(stored.url, "memory://session_1_abcdef12/face.jpg");
        Ok(())
    }

    #[test]
    fn second_upload_overwrites() -> Result<()> {
        let store = MemoryStore::default();
        let handoff = StorageHandoff::new(&store);
        handoff.upload(&session(), "face", &[1])?;
        handoff.upload(&session(), "face", &[2])?;
        assert_eq!(store.paths().len(), 1);
        assert_eq!(store.get("session_1_abcdef12/face.jpg"), Some(vec![2]));
        Ok(())
    }

    #[test]
    fn batch_drops_exactly_the_failing_item() {
        let store = FlakyStore::failing_on("side_profile");
        let items = vec![
            DatasetItem::new(1, "professional", vec![1]),
            DatasetItem::new(3, "side_profile", vec![3]),
            DatasetItem::new(4, "outdoor", vec![4]),
        ];
        let stored = StorageHandoff::new(&store).upload_batch(&session(), &items);
        let ids: Vec<u32> = stored.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn names_with_separators_stay_under_the_session() {
        assert_eq!(
            object_path(&session(), "casual_3/4"),
            "session_1_abcdef12/casual_3-4.jpg"
        );
    }

    #[test]
    fn url_delimiters_in_names_cannot_shorten_the_key() -> Result<()> {
        assert_eq!(
            object_path(&session(), "me#1?v=2%20"),
            "session_1_abcdef12/me-1-v=2-20.jpg"
        );
        let store = MemoryStore::default();
        let stored = StorageHandoff::new(&store).upload(&session(), "pro#shot", &[1])?;
        assert_eq!(stored.path, "session_1_abcdef12/pro-shot.jpg");
        assert_eq!(store.paths(), vec![stored.path.clone()]);
        assert!(!stored.url.contains('#'));
        Ok(())
    }

    #[test]
    fn list_strips_suffix_and_placeholder() -> Result<()> {
        let store = MemoryStore::default();
        store.put("session_1_abcdef12/a.jpg", &[1], "image/jpeg")?;
        store.put("session_1_abcdef12/.emptyFolderPlaceholder", &[], "text/plain")?;
        store.put("other/b.jpg", &[1], "image/jpeg")?;
        let listed = StorageHandoff::new(&store).list(&session())?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a");
        assert_eq!(listed[0].path, "session_1_abcdef12/a.jpg");
        Ok(())
    }

    #[test]
    fn supabase_urls() -> Result<()> {
        let store = SupabaseStore::new(
            &StorageCredentials {
                url: "https://proj.supabase.co/".to_string(),
                key: "k".to_string(),
            },
            "ai-clone-images",
            Duration::from_secs(5),
        )?;
        assert_eq!(
            store.public_url("s/face.jpg"),
            "https://proj.supabase.co/storage/v1/object/public/ai-clone-images/s/face.jpg"
        );
        Ok(())
    }

    #[test]
    fn supabase_requires_credentials() {
        let missing = StorageCredentials {
            url: " ".to_string(),
            key: "k".to_string(),
        };
        assert!(SupabaseStore::new(&missing, "b", Duration::from_secs(1)).is_err());
    }
}

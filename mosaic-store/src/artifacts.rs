//! Image artifact storage
//!
//! Persists generated images before the session record ever references
//! them, so an `image_key` in a session always points at a stored object.

use crate::keys::sanitize;
use crate::object::ObjectStore;
use mosaic_core::StoreError;
use std::sync::Arc;
use uuid::Uuid;

/// Store for generated image artifacts.
pub struct ImageStore {
    store: Arc<dyn ObjectStore>,
}

impl ImageStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Persist image bytes and return the reference key.
    ///
    /// `target` groups the images of one generation run (a timestamp in
    /// practice); the UUID suffix keeps repeated runs of the same model
    /// from colliding.
    pub async fn save(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
        target: &str,
        model: &str,
    ) -> Result<String, StoreError> {
        let key = format!(
            "images/{}/{}-{}.{}",
            sanitize(target),
            sanitize(model),
            Uuid::now_v7(),
            extension_for(media_type),
        );
        self.store.put(&key, bytes).await?;
        Ok(key)
    }

    /// Fetch image bytes by reference key.
    pub async fn fetch(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let object = self.store.get(key).await?.ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        Ok(object.bytes)
    }
}

fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::MemoryObjectStore;

    #[tokio::test]
    async fn test_save_and_fetch() {
        let images = ImageStore::new(Arc::new(MemoryObjectStore::new()));
        let key = images
            .save(vec![1, 2, 3], "image/png", "20260825T1400", "flux-pro")
            .await
            .unwrap();

        assert!(key.starts_with("images/20260825T1400/flux-pro-"));
        assert!(key.ends_with(".png"));
        assert_eq!(images.fetch(&key).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fetch_missing_key() {
        let images = ImageStore::new(Arc::new(MemoryObjectStore::new()));
        let err = images.fetch("images/none.png").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_media_type_extensions() {
        let images = ImageStore::new(Arc::new(MemoryObjectStore::new()));
        let key = images
            .save(vec![0], "image/jpeg", "t", "m")
            .await
            .unwrap();
        assert!(key.ends_with(".jpg"));
    }
}

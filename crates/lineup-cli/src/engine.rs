//! Recognition engine: holds the published index snapshot and serves
//! point queries against it.
//!
//! Rebuild and load both produce a fresh [`Snapshot`] and publish it by
//! swapping the shared handle; a published snapshot is never mutated, so a
//! reader can never observe a half-built index.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use image::DynamicImage;
use lineup_core::{EmbedError, FaceEmbedder, IndexError, Snapshot};
use lineup_store::{EmbeddingStore, IdentityRecord, StoreError};
use thiserror::Error;

/// Neighbors consulted per query face.
pub const NEIGHBORS: usize = 15;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// One recognized face: the winning identity plus its display metadata
/// when the store still knows it.
#[derive(Debug)]
pub struct RecognizedFace {
    pub identity_id: String,
    pub display: Option<IdentityRecord>,
}

pub struct Engine {
    store: Arc<EmbeddingStore>,
    embedder: Arc<dyn FaceEmbedder>,
    index_prefix: PathBuf,
    dimension: usize,
    trees: usize,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl Engine {
    pub fn new(
        store: Arc<EmbeddingStore>,
        embedder: Arc<dyn FaceEmbedder>,
        index_prefix: PathBuf,
        dimension: usize,
        trees: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            index_prefix,
            dimension,
            trees,
            snapshot: RwLock::new(None),
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write().expect("snapshot lock poisoned") = Some(Arc::new(snapshot));
    }

    fn current(&self) -> Result<Arc<Snapshot>, EngineError> {
        let guard = self.snapshot.read().expect("snapshot lock poisoned");
        match guard.as_ref() {
            Some(snapshot) if !snapshot.is_empty() => Ok(snapshot.clone()),
            Some(_) => Err(IndexError::Unavailable("index has no slots".into()).into()),
            None => Err(IndexError::Unavailable("no snapshot published".into()).into()),
        }
    }

    /// Rebuild the snapshot from the store, persist the artifact pair, and
    /// publish it. Returns the slot count.
    pub fn rebuild(&self) -> Result<usize, EngineError> {
        let by_identity = self.store.embeddings_by_identity()?;
        let snapshot = Snapshot::build(&by_identity, self.dimension, self.trees)?;
        snapshot.save(&self.index_prefix)?;
        let slots = snapshot.len();
        self.publish(snapshot);
        Ok(slots)
    }

    /// Load the persisted snapshot pair and publish it. Returns the slot count.
    pub fn load(&self) -> Result<usize, EngineError> {
        let snapshot = Snapshot::load(self.dimension, &self.index_prefix)?;
        let slots = snapshot.len();
        self.publish(snapshot);
        Ok(slots)
    }

    /// Recognize every face in a query image, in detection order.
    ///
    /// Zero detected faces yields an empty vector, not an error. The only
    /// error a caller sees for a well-formed query is an unavailable index.
    pub fn recognize(&self, image: &DynamicImage) -> Result<Vec<RecognizedFace>, EngineError> {
        let snapshot = self.current()?;
        let faces = self.embedder.embed_faces(image)?;
        if faces.is_empty() {
            tracing::info!("no faces detected in query image");
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(faces.len());
        for (face_no, embedding) in faces.iter().enumerate() {
            let identity_id = snapshot.identify(embedding, NEIGHBORS)?;
            let display = match self.store.identity(&identity_id) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(identity = identity_id, error = %e, "metadata lookup failed");
                    None
                }
            };
            tracing::debug!(face = face_no, identity = identity_id, "face recognized");
            results.push(RecognizedFace {
                identity_id,
                display,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineup_core::Embedding;

    /// Embedder that reports a fixed set of faces for any image.
    struct StaticEmbedder(Vec<Embedding>);

    impl FaceEmbedder for StaticEmbedder {
        fn embed_faces(&self, _image: &DynamicImage) -> Result<Vec<Embedding>, EmbedError> {
            Ok(self.0.clone())
        }
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn seeded_store() -> Arc<EmbeddingStore> {
        let store = Arc::new(EmbeddingStore::open_in_memory().unwrap());
        for (id, base) in [("id1", 0.0f32), ("id2", 5.0)] {
            store
                .put_identity(&IdentityRecord {
                    identity_id: id.to_string(),
                    name: format!("Person {id}"),
                    page_url: None,
                    primary_image_url: None,
                })
                .unwrap();
            store.put_anchor(id, &emb(&[base, 0.0, 0.0, 0.0])).unwrap();
            store
                .put_verified(id, &emb(&[base + 0.1, 0.0, 0.0, 0.0]), 1)
                .unwrap();
        }
        store
    }

    fn engine(
        store: Arc<EmbeddingStore>,
        faces: Vec<Embedding>,
        prefix: PathBuf,
    ) -> Engine {
        Engine::new(store, Arc::new(StaticEmbedder(faces)), prefix, 4, 10)
    }

    #[test]
    fn test_recognize_without_snapshot_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(
            seeded_store(),
            vec![emb(&[0.0; 4])],
            dir.path().join("gallery"),
        );
        let err = eng.recognize(&DynamicImage::new_rgb8(1, 1)).unwrap_err();
        assert!(matches!(err, EngineError::Index(IndexError::Unavailable(_))));
    }

    #[test]
    fn test_rebuild_then_recognize_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(
            seeded_store(),
            vec![emb(&[5.05, 0.0, 0.0, 0.0])],
            dir.path().join("gallery"),
        );
        assert_eq!(eng.rebuild().unwrap(), 4);

        let results = eng.recognize(&DynamicImage::new_rgb8(1, 1)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity_id, "id2");
        assert_eq!(results[0].display.as_ref().unwrap().name, "Person id2");
    }

    #[test]
    fn test_recognize_no_faces_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(seeded_store(), vec![], dir.path().join("gallery"));
        eng.rebuild().unwrap();
        assert!(eng.recognize(&DynamicImage::new_rgb8(1, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_recognize_one_entry_per_face_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(
            seeded_store(),
            vec![emb(&[5.0, 0.0, 0.0, 0.0]), emb(&[0.0, 0.0, 0.0, 0.0])],
            dir.path().join("gallery"),
        );
        eng.rebuild().unwrap();

        let results = eng.recognize(&DynamicImage::new_rgb8(1, 1)).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["id2", "id1"]);
    }

    #[test]
    fn test_rebuild_persists_pair_for_fresh_load() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("gallery");
        let store = seeded_store();
        let eng = engine(store.clone(), vec![emb(&[0.05, 0.0, 0.0, 0.0])], prefix.clone());
        eng.rebuild().unwrap();

        // A separate engine restores the published pair from disk.
        let eng2 = engine(store, vec![emb(&[0.05, 0.0, 0.0, 0.0])], prefix);
        assert_eq!(eng2.load().unwrap(), 4);
        let results = eng2.recognize(&DynamicImage::new_rgb8(1, 1)).unwrap();
        assert_eq!(results[0].identity_id, "id1");
    }

    #[test]
    fn test_empty_store_rebuild_leaves_queries_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EmbeddingStore::open_in_memory().unwrap());
        let eng = engine(store, vec![emb(&[0.0; 4])], dir.path().join("gallery"));
        assert_eq!(eng.rebuild().unwrap(), 0);

        let err = eng.recognize(&DynamicImage::new_rgb8(1, 1)).unwrap_err();
        assert!(matches!(err, EngineError::Index(IndexError::Unavailable(_))));
    }
}

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Face embedding vector (typically 128-dimensional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Lower = more similar. Face-matching decisions compare this
    /// against a fixed tolerance rather than a per-identity one.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("image decode failed for {url}: {reason}")]
    Decode { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding backend failed: {0}")]
    Backend(String),
    #[error("expected {expected}-dim embedding, got {found}")]
    Dimension { expected: usize, found: usize },
}

/// External face-embedding capability.
///
/// Maps an image to zero or more fixed-dimension embeddings, one per
/// detected face, in detection order. An empty result is a legitimate
/// "no face in this image" outcome, not an error.
pub trait FaceEmbedder: Send + Sync {
    fn embed_faces(&self, image: &DynamicImage) -> Result<Vec<Embedding>, EmbedError>;
}

/// External image-fetching capability (URL or local path to decoded raster).
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<DynamicImage, FetchError>;
}

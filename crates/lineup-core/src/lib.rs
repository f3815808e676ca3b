//! Identity-matching primitives.
//!
//! Face embeddings in a Euclidean metric space, an annoy-style
//! random-projection forest for approximate nearest-neighbor search,
//! and majority-vote identification over an index snapshot.

pub mod index;
pub mod types;
pub mod vote;

pub use index::{AnnIndex, IndexError, Snapshot, DEFAULT_TREES};
pub use types::{EmbedError, Embedding, FaceEmbedder, FetchError, ImageFetcher};

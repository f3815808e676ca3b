//! Approximate nearest-neighbor index over face embeddings.
//!
//! An annoy-style forest of random-projection trees under Euclidean
//! distance. Each tree recursively splits the slot set by a hyperplane
//! through the midpoint of two randomly chosen members; queries walk all
//! trees best-first, pool candidate slots, then rank them by exact
//! distance. The forest is immutable once built; new embeddings are
//! incorporated by a full rebuild, never by incremental insert.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Embedding;
use crate::vote;

/// Default number of random-projection trees. More trees trade build time
/// for query recall; this is a tunable, not a correctness parameter.
pub const DEFAULT_TREES: usize = 10;

/// Stop splitting once a subtree holds this many slots or fewer.
const MAX_LEAF_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),
    #[error("expected {expected}-dim vector, got {found}")]
    Dimension { expected: usize, found: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
enum Node {
    Leaf {
        slots: Vec<u32>,
    },
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: u32,
        right: u32,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct RpTree {
    root: u32,
    nodes: Vec<Node>,
}

/// Static ANN structure over dense integer slots.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnnIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    trees: Vec<RpTree>,
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

impl AnnIndex {
    /// Build a forest over the given vectors. Slot `i` is `vectors[i]`.
    pub fn build(
        dimension: usize,
        vectors: Vec<Vec<f32>>,
        trees: usize,
    ) -> Result<Self, IndexError> {
        for v in &vectors {
            if v.len() != dimension {
                return Err(IndexError::Dimension {
                    expected: dimension,
                    found: v.len(),
                });
            }
        }

        let mut rng = StdRng::from_entropy();
        let n_trees = trees.max(1);
        let mut forest = Vec::with_capacity(n_trees);

        if !vectors.is_empty() {
            let all_slots: Vec<u32> = (0..vectors.len() as u32).collect();
            for _ in 0..n_trees {
                let mut nodes = Vec::new();
                let root = build_subtree(&vectors, all_slots.clone(), &mut nodes, &mut rng);
                forest.push(RpTree { root, nodes });
            }
        }

        tracing::debug!(
            slots = vectors.len(),
            trees = forest.len(),
            dimension,
            "ANN forest built"
        );

        Ok(Self {
            dimension,
            vectors,
            trees: forest,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Query the `k` nearest slots to `query`, ascending by exact distance.
    ///
    /// Walks all trees best-first by hyperplane margin, pools at least
    /// `k * trees` candidate slots, then ranks candidates exactly.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                found: query.len(),
            });
        }
        if self.vectors.is_empty() {
            return Err(IndexError::Unavailable("index has no slots".into()));
        }

        let search_k = k.saturating_mul(self.trees.len()).max(k);

        let mut heap: BinaryHeap<QueueEntry> = BinaryHeap::new();
        for (t, tree) in self.trees.iter().enumerate() {
            heap.push(QueueEntry {
                priority: f32::INFINITY,
                tree: t,
                node: tree.root,
            });
        }

        let mut seen: HashSet<u32> = HashSet::new();
        let mut candidates: Vec<u32> = Vec::new();

        while candidates.len() < search_k {
            let Some(entry) = heap.pop() else {
                break;
            };
            match &self.trees[entry.tree].nodes[entry.node as usize] {
                Node::Leaf { slots } => {
                    for &slot in slots {
                        if seen.insert(slot) {
                            candidates.push(slot);
                        }
                    }
                }
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    let margin = dot(normal, query) - offset;
                    heap.push(QueueEntry {
                        priority: entry.priority.min(margin),
                        tree: entry.tree,
                        node: *right,
                    });
                    heap.push(QueueEntry {
                        priority: entry.priority.min(-margin),
                        tree: entry.tree,
                        node: *left,
                    });
                }
            }
        }

        let mut ranked: Vec<(u32, f32)> = candidates
            .into_iter()
            .map(|slot| (slot, euclidean(&self.vectors[slot as usize], query)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        Ok(ranked)
    }
}

/// Best-first traversal entry: max-heap on the minimum margin along the
/// path, so the side of every split nearest the query is explored first.
struct QueueEntry {
    priority: f32,
    tree: usize,
    node: u32,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

fn build_subtree(
    vectors: &[Vec<f32>],
    slots: Vec<u32>,
    nodes: &mut Vec<Node>,
    rng: &mut StdRng,
) -> u32 {
    if slots.len() <= MAX_LEAF_SIZE {
        nodes.push(Node::Leaf { slots });
        return (nodes.len() - 1) as u32;
    }

    // Hyperplane through the midpoint of two distinct random members,
    // normal to the segment between them.
    let a = slots[rng.gen_range(0..slots.len())] as usize;
    let mut b = slots[rng.gen_range(0..slots.len())] as usize;
    for _ in 0..3 {
        if b != a {
            break;
        }
        b = slots[rng.gen_range(0..slots.len())] as usize;
    }

    let normal: Vec<f32> = vectors[a]
        .iter()
        .zip(vectors[b].iter())
        .map(|(x, y)| x - y)
        .collect();
    let norm = dot(&normal, &normal).sqrt();

    // Degenerate split (duplicate or coincident points): keep as one leaf.
    if norm < 1e-12 {
        nodes.push(Node::Leaf { slots });
        return (nodes.len() - 1) as u32;
    }

    let midpoint: Vec<f32> = vectors[a]
        .iter()
        .zip(vectors[b].iter())
        .map(|(x, y)| (x + y) / 2.0)
        .collect();
    let offset = dot(&normal, &midpoint);

    let mut left = Vec::new();
    let mut right = Vec::new();
    for slot in slots {
        let margin = dot(&normal, &vectors[slot as usize]) - offset;
        if margin > 0.0 || (margin == 0.0 && rng.gen::<bool>()) {
            right.push(slot);
        } else {
            left.push(slot);
        }
    }

    // An unbalanced hyperplane can leave one side empty; fall back to a
    // random halving so the recursion always makes progress.
    if left.is_empty() || right.is_empty() {
        let mut all: Vec<u32> = left.into_iter().chain(right).collect();
        all.shuffle(rng);
        let mid = all.len() / 2;
        right = all.split_off(mid);
        left = all;
    }

    let left_id = build_subtree(vectors, left, nodes, rng);
    let right_id = build_subtree(vectors, right, nodes, rng);
    nodes.push(Node::Split {
        normal,
        offset,
        left: left_id,
        right: right_id,
    });
    (nodes.len() - 1) as u32
}

/// Immutable index snapshot: ANN forest plus the slot→identity map,
/// built together and persisted as a coupled pair of artifacts.
#[derive(Debug)]
pub struct Snapshot {
    index: AnnIndex,
    slots: Vec<String>,
}

impl Snapshot {
    /// Build a snapshot from per-identity embedding sequences.
    ///
    /// Every embedding gets a dense slot in encounter order starting at 0;
    /// `slots[slot]` records the owning identity.
    pub fn build(
        by_identity: &BTreeMap<String, Vec<Embedding>>,
        dimension: usize,
        trees: usize,
    ) -> Result<Self, IndexError> {
        let mut vectors = Vec::new();
        let mut slots = Vec::new();
        for (identity, embeddings) in by_identity {
            for embedding in embeddings {
                vectors.push(embedding.values.clone());
                slots.push(identity.clone());
            }
        }

        let index = AnnIndex::build(dimension, vectors, trees)?;
        tracing::info!(
            identities = by_identity.len(),
            slots = slots.len(),
            "index snapshot built"
        );
        Ok(Self { index, slots })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Slot→identity map, one entry per index slot.
    pub fn slot_identities(&self) -> &[String] {
        &self.slots
    }

    /// Identify the best-supported identity for one query embedding:
    /// plurality vote over the `k` nearest neighbor slots, ties broken by
    /// first-encountered order in the neighbor list.
    pub fn identify(&self, query: &Embedding, k: usize) -> Result<String, IndexError> {
        if self.is_empty() {
            return Err(IndexError::Unavailable("index has no slots".into()));
        }
        let neighbors = self.index.nearest(&query.values, k)?;
        let identities = neighbors
            .iter()
            .map(|(slot, _)| self.slots[*slot as usize].as_str());
        vote::plurality(identities)
            .map(str::to_owned)
            .ok_or_else(|| IndexError::Unavailable("empty neighborhood".into()))
    }

    /// Raw nearest-neighbor query, exposed for diagnostics and tests.
    pub fn nearest(&self, query: &Embedding, k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.index.nearest(&query.values, k)
    }

    fn artifact_paths(prefix: &Path) -> (PathBuf, PathBuf) {
        (
            PathBuf::from(format!("{}.index.json", prefix.display())),
            PathBuf::from(format!("{}.slots.json", prefix.display())),
        )
    }

    /// Persist the index structure and the slot map as two coupled files.
    pub fn save(&self, prefix: &Path) -> Result<(), IndexError> {
        let (index_path, slots_path) = Self::artifact_paths(prefix);
        if let Some(parent) = index_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        serde_json::to_writer(BufWriter::new(File::create(&index_path)?), &self.index)?;
        serde_json::to_writer(BufWriter::new(File::create(&slots_path)?), &self.slots)?;
        tracing::info!(
            index = %index_path.display(),
            slots = %slots_path.display(),
            "index snapshot saved"
        );
        Ok(())
    }

    /// Restore a snapshot pair from disk.
    ///
    /// Fails with [`IndexError::Unavailable`] if either artifact is missing
    /// or the pair is inconsistent with itself or with the declared
    /// dimension. A snapshot that cannot be restored is not a usable index,
    /// whatever the cause.
    pub fn load(dimension: usize, prefix: &Path) -> Result<Self, IndexError> {
        let (index_path, slots_path) = Self::artifact_paths(prefix);
        for path in [&index_path, &slots_path] {
            if !path.exists() {
                return Err(IndexError::Unavailable(format!(
                    "missing artifact {}",
                    path.display()
                )));
            }
        }

        let index: AnnIndex = serde_json::from_reader(BufReader::new(File::open(&index_path)?))?;
        let slots: Vec<String> = serde_json::from_reader(BufReader::new(File::open(&slots_path)?))?;

        if index.dimension() != dimension {
            return Err(IndexError::Unavailable(format!(
                "stored index is {}-dimensional, expected {}",
                index.dimension(),
                dimension
            )));
        }
        if index.len() != slots.len() {
            return Err(IndexError::Unavailable(format!(
                "slot map has {} entries for {} index slots",
                slots.len(),
                index.len()
            )));
        }

        tracing::info!(slots = slots.len(), dimension, "index snapshot loaded");
        Ok(Self { index, slots })
    }
}

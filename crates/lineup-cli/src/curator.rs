//! Gallery curation: turn a noisy scraped photo pool into a small set of
//! verified embeddings per identity.
//!
//! Every identity has one trusted anchor embedding taken from a single-face
//! primary photo. Candidates are processed in fixed-size batches with one
//! worker thread per candidate; a candidate is accepted when its closest
//! detected face lies within the match tolerance of the anchor. Batch
//! boundaries are the only decision points: fast-reject abandons an
//! identity that can no longer reach the minimum gallery size, early-stop
//! halts once the gallery cap is reached.

use std::fmt;
use std::sync::Arc;

use lineup_core::{Embedding, FaceEmbedder, ImageFetcher};
use lineup_store::{CandidatePhoto, EmbeddingStore, StoreError};

/// Minimum candidate pool (and minimum achievable gallery) per identity.
pub const MIN_CANDIDATES: usize = 10;
/// Candidates dispatched per batch, one worker thread each.
pub const BATCH_SIZE: usize = 10;
/// Gallery cap: verified embeddings beyond this add query cost without
/// materially improving recognition accuracy.
pub const MAX_VERIFIED: usize = 20;
/// Euclidean distance at or below which a face matches the anchor. One
/// global threshold, not per-identity.
pub const MATCH_TOLERANCE: f32 = 0.6;

/// Why an identity was skipped before any batch was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No anchor embedding, so no ground truth to match against.
    MissingAnchor,
    /// Candidate pool below [`MIN_CANDIDATES`].
    InsufficientCandidates { found: usize },
}

/// Terminal outcome of one identity's curation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurationOutcome {
    Skipped(SkipReason),
    /// Fast-reject: the projected maximum achievable gallery fell below
    /// [`MIN_CANDIDATES`]. A deliberate early termination, not an error.
    Aborted,
    /// Curation finished with this many verified embeddings persisted.
    Completed(usize),
}

impl CurationOutcome {
    /// Stable label for the audit log.
    pub fn label(&self) -> &'static str {
        match self {
            CurationOutcome::Skipped(SkipReason::MissingAnchor) => "missing_anchor",
            CurationOutcome::Skipped(SkipReason::InsufficientCandidates { .. }) => {
                "insufficient_candidates"
            }
            CurationOutcome::Aborted => "fast_reject",
            CurationOutcome::Completed(_) => "completed",
        }
    }

    pub fn verified(&self) -> usize {
        match self {
            CurationOutcome::Completed(n) => *n,
            _ => 0,
        }
    }
}

impl fmt::Display for CurationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurationOutcome::Skipped(SkipReason::MissingAnchor) => {
                write!(f, "skipped: no anchor embedding")
            }
            CurationOutcome::Skipped(SkipReason::InsufficientCandidates { found }) => {
                write!(f, "skipped: {found} candidates, need {MIN_CANDIDATES}")
            }
            CurationOutcome::Aborted => write!(f, "aborted: cannot reach minimum gallery"),
            CurationOutcome::Completed(n) => write!(f, "completed: {n} verified"),
        }
    }
}

pub struct Curator {
    store: Arc<EmbeddingStore>,
    fetcher: Arc<dyn ImageFetcher>,
    embedder: Arc<dyn FaceEmbedder>,
}

impl Curator {
    pub fn new(
        store: Arc<EmbeddingStore>,
        fetcher: Arc<dyn ImageFetcher>,
        embedder: Arc<dyn FaceEmbedder>,
    ) -> Self {
        Self {
            store,
            fetcher,
            embedder,
        }
    }

    /// Curate one identity's gallery. See module docs for the batch policy.
    ///
    /// Per-candidate failures (fetch, embed, no face, no match) contribute
    /// nothing and never abort a batch. Store write failures on individual
    /// accepted pairs are logged and skipped.
    pub fn curate(&self, identity_id: &str) -> Result<CurationOutcome, StoreError> {
        let Some(anchor) = self.store.anchor(identity_id)? else {
            tracing::warn!(identity = identity_id, "no anchor embedding, skipping");
            return Ok(CurationOutcome::Skipped(SkipReason::MissingAnchor));
        };

        let candidates = self.store.candidate_photos(identity_id)?;
        let total = candidates.len();
        if total < MIN_CANDIDATES {
            tracing::warn!(
                identity = identity_id,
                candidates = total,
                "not enough candidate photos, skipping"
            );
            return Ok(CurationOutcome::Skipped(SkipReason::InsufficientCandidates {
                found: total,
            }));
        }

        let fetcher: &dyn ImageFetcher = self.fetcher.as_ref();
        let embedder: &dyn FaceEmbedder = self.embedder.as_ref();

        let mut accepted: Vec<(i64, Embedding)> = Vec::new();
        for (batch_no, batch) in candidates.chunks(BATCH_SIZE).enumerate() {
            // One worker per candidate; the scope join is the batch barrier.
            // Workers share nothing mutable: each gets the anchor and one
            // URL and returns a pure result.
            let results: Vec<Option<(i64, Embedding)>> = std::thread::scope(|s| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|photo| {
                        let anchor = &anchor;
                        s.spawn(move || evaluate_candidate(fetcher, embedder, anchor, photo))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("candidate worker panicked"))
                    .collect()
            });
            accepted.extend(results.into_iter().flatten());

            let processed = ((batch_no + 1) * BATCH_SIZE).min(total);
            let remaining = total - processed;

            // Fast-reject: best case, every remaining candidate matches.
            if accepted.len() + remaining < MIN_CANDIDATES {
                tracing::info!(
                    identity = identity_id,
                    accepted = accepted.len(),
                    remaining,
                    "cannot reach minimum gallery size, aborting"
                );
                return Ok(CurationOutcome::Aborted);
            }

            if accepted.len() >= MAX_VERIFIED {
                tracing::debug!(
                    identity = identity_id,
                    accepted = accepted.len(),
                    "gallery cap reached, stopping"
                );
                break;
            }
        }

        accepted.truncate(MAX_VERIFIED);
        let mut persisted = 0;
        for (photo_id, embedding) in &accepted {
            match self.store.put_verified(identity_id, embedding, *photo_id) {
                Ok(()) => persisted += 1,
                Err(e) => {
                    tracing::warn!(
                        identity = identity_id,
                        photo_id,
                        error = %e,
                        "failed to persist verified embedding, skipping"
                    );
                }
            }
        }

        tracing::info!(identity = identity_id, verified = persisted, "curation completed");
        Ok(CurationOutcome::Completed(persisted))
    }

    /// Curate every anchored identity that has not yet been curated,
    /// recording each outcome in the audit log. Returns the number of
    /// completed runs.
    ///
    /// Identities without an anchor are left for a later anchors pass and
    /// produce no audit row. Per-identity skips and aborts are recorded and
    /// passed over; only store-level failures propagate.
    pub fn curate_all(&self) -> Result<usize, StoreError> {
        let done: std::collections::HashSet<String> =
            self.store.curated_ids()?.into_iter().collect();
        let mut completed = 0;

        for identity_id in self.store.anchored_ids()? {
            if done.contains(&identity_id) {
                continue;
            }
            let outcome = self.curate(&identity_id)?;
            self.store
                .record_curation(&identity_id, outcome.label(), outcome.verified())?;
            if matches!(outcome, CurationOutcome::Completed(_)) {
                completed += 1;
            }
        }
        Ok(completed)
    }

    /// Derive anchors from primary photos for identities that lack one.
    ///
    /// A primary photo must contain exactly one face: zero faces yields
    /// nothing, and multiple faces make the identity ambiguous, so both are
    /// skipped. The multi-face rule is a hard failure for anchors only.
    /// Returns the number of anchors stored.
    pub fn process_anchors(&self) -> Result<usize, StoreError> {
        let mut stored = 0;
        for identity_id in self.store.identity_ids()? {
            if self.store.anchor(&identity_id)?.is_some() {
                continue;
            }
            let Some(record) = self.store.identity(&identity_id)? else {
                continue;
            };
            let Some(url) = record.primary_image_url else {
                tracing::warn!(identity = identity_id, "no primary photo url");
                continue;
            };

            let image = match self.fetcher.fetch(&url) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(identity = identity_id, error = %e, "primary photo fetch failed");
                    continue;
                }
            };
            let faces = match self.embedder.embed_faces(&image) {
                Ok(faces) => faces,
                Err(e) => {
                    tracing::warn!(identity = identity_id, error = %e, "primary photo embedding failed");
                    continue;
                }
            };

            match faces.len() {
                0 => {
                    tracing::warn!(identity = identity_id, "no face in primary photo");
                }
                1 => {
                    self.store.put_anchor(&identity_id, &faces[0])?;
                    stored += 1;
                }
                n => {
                    tracing::warn!(
                        identity = identity_id,
                        faces = n,
                        "multiple faces in primary photo, identity ambiguous"
                    );
                }
            }
        }
        Ok(stored)
    }
}

/// Evaluate one candidate photo against the anchor. Pure with respect to
/// the store: failures are logged and collapse to "no contribution".
fn evaluate_candidate(
    fetcher: &dyn ImageFetcher,
    embedder: &dyn FaceEmbedder,
    anchor: &Embedding,
    photo: &CandidatePhoto,
) -> Option<(i64, Embedding)> {
    let image = match fetcher.fetch(&photo.url) {
        Ok(image) => image,
        Err(e) => {
            tracing::debug!(url = %photo.url, error = %e, "candidate fetch failed");
            return None;
        }
    };
    let faces = match embedder.embed_faces(&image) {
        Ok(faces) => faces,
        Err(e) => {
            tracing::debug!(url = %photo.url, error = %e, "candidate embedding failed");
            return None;
        }
    };
    if faces.is_empty() {
        tracing::debug!(url = %photo.url, "no face in candidate photo");
        return None;
    }

    // Multi-face candidates are fine here: take the face closest to the anchor.
    let (best, distance) = faces
        .iter()
        .map(|face| (face, anchor.euclidean_distance(face)))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    if distance <= MATCH_TOLERANCE {
        Some((photo.photo_id, best.clone()))
    } else {
        tracing::debug!(url = %photo.url, distance, "no face within tolerance");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use lineup_core::{EmbedError, FetchError};
    use lineup_store::IdentityRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted behavior for one candidate ordinal.
    #[derive(Clone)]
    enum Script {
        Faces(Vec<Embedding>),
        NoFace,
        FetchFail,
    }

    /// Shared script table. The fetcher encodes the candidate ordinal in
    /// the image width; the embedder reads it back and replays the script.
    struct Backend {
        scripts: Vec<Script>,
        embed_calls: AtomicUsize,
    }

    struct ScriptedFetcher(Arc<Backend>);
    struct ScriptedEmbedder(Arc<Backend>);

    fn ordinal_from_url(url: &str) -> usize {
        url.rsplit('/')
            .next()
            .and_then(|name| name.strip_suffix(".jpg"))
            .and_then(|n| n.parse().ok())
            .expect("test url must end in <ordinal>.jpg")
    }

    impl ImageFetcher for ScriptedFetcher {
        fn fetch(&self, url: &str) -> Result<DynamicImage, FetchError> {
            let ordinal = ordinal_from_url(url);
            if matches!(self.0.scripts[ordinal], Script::FetchFail) {
                return Err(FetchError::Request {
                    url: url.to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
            Ok(DynamicImage::new_rgb8(ordinal as u32 + 1, 1))
        }
    }

    impl FaceEmbedder for ScriptedEmbedder {
        fn embed_faces(&self, image: &DynamicImage) -> Result<Vec<Embedding>, EmbedError> {
            self.0.embed_calls.fetch_add(1, Ordering::SeqCst);
            let ordinal = image.width() as usize - 1;
            match &self.0.scripts[ordinal] {
                Script::Faces(faces) => Ok(faces.clone()),
                Script::NoFace => Ok(vec![]),
                Script::FetchFail => unreachable!("fetch already failed"),
            }
        }
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn anchor() -> Embedding {
        emb(&[0.0, 0.0, 0.0, 0.0])
    }

    fn near() -> Embedding {
        emb(&[0.5, 0.0, 0.0, 0.0]) // distance 0.5 <= tolerance
    }

    fn far() -> Embedding {
        emb(&[0.9, 0.0, 0.0, 0.0]) // distance 0.9 > tolerance
    }

    /// Store with one identity, its anchor, and one candidate per script.
    fn curator_with(scripts: Vec<Script>, with_anchor: bool) -> (Curator, Arc<EmbeddingStore>, Arc<Backend>) {
        let store = Arc::new(EmbeddingStore::open_in_memory().unwrap());
        store
            .put_identity(&IdentityRecord {
                identity_id: "id1".to_string(),
                name: "Person One".to_string(),
                page_url: None,
                primary_image_url: None,
            })
            .unwrap();
        if with_anchor {
            store.put_anchor("id1", &anchor()).unwrap();
        }
        let urls: Vec<String> = (0..scripts.len())
            .map(|i| format!("https://photos.test/{i}.jpg"))
            .collect();
        store.add_candidate_photos("id1", &urls).unwrap();

        let backend = Arc::new(Backend {
            scripts,
            embed_calls: AtomicUsize::new(0),
        });
        let curator = Curator::new(
            store.clone(),
            Arc::new(ScriptedFetcher(backend.clone())),
            Arc::new(ScriptedEmbedder(backend.clone())),
        );
        (curator, store, backend)
    }

    #[test]
    fn test_missing_anchor_skips() {
        let scripts = vec![Script::Faces(vec![near()]); 12];
        let (curator, store, backend) = curator_with(scripts, false);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Skipped(SkipReason::MissingAnchor));
        assert_eq!(store.verified_count("id1").unwrap(), 0);
        assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_insufficient_candidates_skips_without_persisting() {
        let scripts = vec![Script::Faces(vec![near()]); 9];
        let (curator, store, backend) = curator_with(scripts, true);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(
            outcome,
            CurationOutcome::Skipped(SkipReason::InsufficientCandidates { found: 9 })
        );
        assert_eq!(store.verified_count("id1").unwrap(), 0);
        assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_twelve_candidate_scenario_completes_with_ten() {
        // u1..u10 match, u11 has no face, u12 is out of tolerance.
        let mut scripts = vec![Script::Faces(vec![near()]); 10];
        scripts.push(Script::NoFace);
        scripts.push(Script::Faces(vec![far()]));
        let (curator, store, _) = curator_with(scripts, true);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Completed(10));
        assert_eq!(store.verified_count("id1").unwrap(), 10);

        // Only the matching candidates' embeddings were persisted.
        let by_id = store.embeddings_by_identity().unwrap();
        let stored = by_id.get("id1").unwrap();
        assert_eq!(stored.len(), 11); // anchor + 10 verified
        assert!(stored[1..].iter().all(|e| *e == near()));
    }

    #[test]
    fn test_fetch_failures_contained() {
        // 8 matches, 2 fetch failures, 2 more matches: failures contribute
        // nothing but never abort the batch.
        let mut scripts = vec![Script::Faces(vec![near()]); 8];
        scripts.extend([Script::FetchFail, Script::FetchFail]);
        scripts.extend(vec![Script::Faces(vec![near()]); 2]);
        let (curator, store, _) = curator_with(scripts, true);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Completed(10));
        assert_eq!(store.verified_count("id1").unwrap(), 10);
    }

    #[test]
    fn test_fast_reject_stops_dispatching_batches() {
        // 15 candidates, none match: after the first batch the projected
        // maximum is 0 + 5 < 10, so the second batch must never run.
        let scripts = vec![Script::Faces(vec![far()]); 15];
        let (curator, store, backend) = curator_with(scripts, true);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Aborted);
        assert_eq!(store.verified_count("id1").unwrap(), 0);
        assert_eq!(backend.embed_calls.load(Ordering::SeqCst), BATCH_SIZE);
    }

    #[test]
    fn test_fast_reject_after_final_batch_persists_nothing() {
        // All 12 candidates resolve but only 8 match: 8 + 0 < 10 at the
        // final batch boundary, so the run aborts with nothing persisted.
        let mut scripts = vec![Script::Faces(vec![near()]); 8];
        scripts.extend(vec![Script::Faces(vec![far()]); 4]);
        let (curator, store, _) = curator_with(scripts, true);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Aborted);
        assert_eq!(store.verified_count("id1").unwrap(), 0);
    }

    #[test]
    fn test_early_stop_at_gallery_cap() {
        // 40 matching candidates: the cap is reached after two batches and
        // no further batch is dispatched.
        let scripts = vec![Script::Faces(vec![near()]); 40];
        let (curator, store, backend) = curator_with(scripts, true);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Completed(MAX_VERIFIED));
        assert_eq!(store.verified_count("id1").unwrap(), MAX_VERIFIED);
        assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 2 * BATCH_SIZE);
    }

    #[test]
    fn test_verified_never_exceeds_cap() {
        // Batches land at 5, 15, then 25 accepted; the persisted gallery
        // must still be truncated to the cap.
        let mut scripts = vec![Script::Faces(vec![near()]); 5];
        scripts.extend(vec![Script::NoFace; 5]);
        scripts.extend(vec![Script::Faces(vec![near()]); 20]);
        let (curator, store, _) = curator_with(scripts, true);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Completed(MAX_VERIFIED));
        assert_eq!(store.verified_count("id1").unwrap(), MAX_VERIFIED);
    }

    #[test]
    fn test_closest_face_selected_from_multi_face_candidate() {
        let mut scripts = vec![Script::Faces(vec![far(), near()])];
        scripts.extend(vec![Script::Faces(vec![near()]); 11]);
        let (curator, store, _) = curator_with(scripts, true);

        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Completed(12));
        let by_id = store.embeddings_by_identity().unwrap();
        // Every stored embedding is the near face, including the one from
        // the two-face candidate.
        assert!(by_id.get("id1").unwrap()[1..].iter().all(|e| *e == near()));
    }

    #[test]
    fn test_persist_failures_skipped_not_fatal() {
        let scripts = vec![Script::Faces(vec![near()]); 12];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.db");
        let store = Arc::new(EmbeddingStore::open(&path).unwrap());
        store
            .put_identity(&IdentityRecord {
                identity_id: "id1".to_string(),
                name: "Person One".to_string(),
                page_url: None,
                primary_image_url: None,
            })
            .unwrap();
        store.put_anchor("id1", &anchor()).unwrap();
        let urls: Vec<String> = (0..scripts.len())
            .map(|i| format!("https://photos.test/{i}.jpg"))
            .collect();
        store.add_candidate_photos("id1", &urls).unwrap();
        let backend = Arc::new(Backend {
            scripts,
            embed_calls: AtomicUsize::new(0),
        });
        let curator = Curator::new(
            store.clone(),
            Arc::new(ScriptedFetcher(backend.clone())),
            Arc::new(ScriptedEmbedder(backend)),
        );

        // A write transaction on a second connection makes every verified
        // insert fail with SQLITE_BUSY while reads keep working.
        let blocker = rusqlite::Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

        // All 12 candidates are accepted but none can be persisted: the run
        // still completes, reporting what actually landed.
        let outcome = curator.curate("id1").unwrap();
        assert_eq!(outcome, CurationOutcome::Completed(0));

        blocker.execute_batch("ROLLBACK").unwrap();
        assert_eq!(store.verified_count("id1").unwrap(), 0);
    }

    #[test]
    fn test_curate_all_records_outcomes() {
        let scripts = vec![Script::Faces(vec![near()]); 12];
        let (curator, store, _) = curator_with(scripts, true);
        // id2 has no anchor yet: it belongs to a later anchors pass and
        // must not accumulate audit rows on every sweep.
        store
            .put_identity(&IdentityRecord {
                identity_id: "id2".to_string(),
                name: "Person Two".to_string(),
                page_url: None,
                primary_image_url: None,
            })
            .unwrap();

        let completed = curator.curate_all().unwrap();
        assert_eq!(completed, 1);

        let log = store.recent_curations(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].identity_id, "id1");
        assert_eq!(log[0].outcome, "completed");

        // A second sweep adds nothing: id1 is curated, id2 still unanchored.
        assert_eq!(curator.curate_all().unwrap(), 0);
        assert_eq!(store.recent_curations(10).unwrap().len(), 1);
    }

    #[test]
    fn test_curate_all_skips_already_curated() {
        let scripts = vec![Script::Faces(vec![near()]); 12];
        let (curator, store, backend) = curator_with(scripts, true);
        store.put_verified("id1", &near(), 1).unwrap();

        let completed = curator.curate_all().unwrap();
        assert_eq!(completed, 0);
        assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_process_anchors_single_face_only() {
        // Ordinals double as primary photo scripts: id_a's primary has one
        // face, id_b's has two, id_c's has none.
        let scripts = vec![
            Script::Faces(vec![near()]),
            Script::Faces(vec![near(), far()]),
            Script::NoFace,
        ];
        let backend = Arc::new(Backend {
            scripts,
            embed_calls: AtomicUsize::new(0),
        });
        let store = Arc::new(EmbeddingStore::open_in_memory().unwrap());
        for (id, ordinal) in [("id_a", 0), ("id_b", 1), ("id_c", 2)] {
            store
                .put_identity(&IdentityRecord {
                    identity_id: id.to_string(),
                    name: id.to_string(),
                    page_url: None,
                    primary_image_url: Some(format!("https://photos.test/{ordinal}.jpg")),
                })
                .unwrap();
        }
        let curator = Curator::new(
            store.clone(),
            Arc::new(ScriptedFetcher(backend.clone())),
            Arc::new(ScriptedEmbedder(backend)),
        );

        let stored = curator.process_anchors().unwrap();
        assert_eq!(stored, 1);
        assert_eq!(store.anchor("id_a").unwrap(), Some(near()));
        assert!(store.anchor("id_b").unwrap().is_none());
        assert!(store.anchor("id_c").unwrap().is_none());
    }

    #[test]
    fn test_process_anchors_leaves_existing_anchor() {
        let scripts = vec![Script::Faces(vec![far()])];
        let backend = Arc::new(Backend {
            scripts,
            embed_calls: AtomicUsize::new(0),
        });
        let store = Arc::new(EmbeddingStore::open_in_memory().unwrap());
        store
            .put_identity(&IdentityRecord {
                identity_id: "id1".to_string(),
                name: "Person".to_string(),
                page_url: None,
                primary_image_url: Some("https://photos.test/0.jpg".to_string()),
            })
            .unwrap();
        store.put_anchor("id1", &anchor()).unwrap();
        let curator = Curator::new(
            store.clone(),
            Arc::new(ScriptedFetcher(backend.clone())),
            Arc::new(ScriptedEmbedder(backend.clone())),
        );

        assert_eq!(curator.process_anchors().unwrap(), 0);
        assert_eq!(store.anchor("id1").unwrap(), Some(anchor()));
        assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 0);
    }
}

//! Durable embedding store on SQLite.
//!
//! Holds identity display metadata, the candidate photo pool discovered by
//! the crawler, anchor and verified face embeddings, and a curation audit
//! log. Vectors are stored in one canonical encoding: a JSON array of f32,
//! written and parsed by a single codec.
//!
//! The connection sits behind a mutex so independent curation runs for
//! different identities can append concurrently without losing writes. No
//! identity is curated concurrently with itself.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use lineup_core::Embedding;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("anchor already set for identity {0}")]
    AnchorExists(String),
    #[error("stored vector for identity {identity} is malformed: {reason}")]
    MalformedVector { identity: String, reason: String },
}

/// Display metadata for a known identity, sourced from the crawler.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub identity_id: String,
    pub name: String,
    pub page_url: Option<String>,
    pub primary_image_url: Option<String>,
}

/// One unverified photo claimed to belong to an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePhoto {
    pub photo_id: i64,
    pub url: String,
}

/// One row of the curation audit log.
#[derive(Debug, Clone)]
pub struct CurationRecord {
    pub identity_id: String,
    pub outcome: String,
    pub verified: usize,
    pub created_at: String,
}

/// Row counts for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub identities: usize,
    pub anchors: usize,
    pub verified: usize,
    pub candidates: usize,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    identity_id        TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    page_url           TEXT,
    primary_image_url  TEXT
);
CREATE TABLE IF NOT EXISTS candidate_photos (
    photo_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id  TEXT NOT NULL REFERENCES identities(identity_id),
    url          TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS embeddings (
    embedding_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id      TEXT NOT NULL REFERENCES identities(identity_id),
    role             TEXT NOT NULL CHECK (role IN ('anchor', 'verified')),
    vector           TEXT NOT NULL,
    source_photo_id  INTEGER,
    created_at       TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_embeddings_one_anchor
    ON embeddings(identity_id) WHERE role = 'anchor';
CREATE INDEX IF NOT EXISTS idx_embeddings_identity ON embeddings(identity_id);
CREATE INDEX IF NOT EXISTS idx_candidates_identity ON candidate_photos(identity_id);
CREATE TABLE IF NOT EXISTS curation_log (
    log_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id  TEXT NOT NULL,
    outcome      TEXT NOT NULL,
    verified     INTEGER NOT NULL,
    created_at   TEXT NOT NULL
);
";

fn encode_vector(embedding: &Embedding) -> String {
    // Infallible: Vec<f32> always serializes.
    serde_json::to_string(&embedding.values).unwrap_or_default()
}

fn decode_vector(identity: &str, raw: &str) -> Result<Embedding, StoreError> {
    let values: Vec<f32> =
        serde_json::from_str(raw).map_err(|e| StoreError::MalformedVector {
            identity: identity.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Embedding::new(values))
}

/// Durable mapping from (identity, role) to face embeddings, plus the
/// surrounding identity metadata the pipeline needs.
pub struct EmbeddingStore {
    conn: Mutex<Connection>,
}

impl EmbeddingStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "embedding store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }

    /// Insert or update an identity's display metadata.
    pub fn put_identity(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO identities (identity_id, name, page_url, primary_image_url)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(identity_id) DO UPDATE SET
                 name = excluded.name,
                 page_url = excluded.page_url,
                 primary_image_url = excluded.primary_image_url",
            params![
                record.identity_id,
                record.name,
                record.page_url,
                record.primary_image_url
            ],
        )?;
        Ok(())
    }

    pub fn identity(&self, identity_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT identity_id, name, page_url, primary_image_url
                 FROM identities WHERE identity_id = ?1",
                params![identity_id],
                |row| {
                    Ok(IdentityRecord {
                        identity_id: row.get(0)?,
                        name: row.get(1)?,
                        page_url: row.get(2)?,
                        primary_image_url: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn identity_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT identity_id FROM identities ORDER BY identity_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Append candidate photo URLs to an identity's pool.
    pub fn add_candidate_photos(&self, identity_id: &str, urls: &[String]) -> Result<(), StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("INSERT INTO candidate_photos (identity_id, url) VALUES (?1, ?2)")?;
        for url in urls {
            stmt.execute(params![identity_id, url])?;
        }
        Ok(())
    }

    /// The identity's candidate photo pool, in insertion order.
    pub fn candidate_photos(&self, identity_id: &str) -> Result<Vec<CandidatePhoto>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT photo_id, url FROM candidate_photos
             WHERE identity_id = ?1 ORDER BY photo_id",
        )?;
        let photos = stmt
            .query_map(params![identity_id], |row| {
                Ok(CandidatePhoto {
                    photo_id: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    /// Set the identity's anchor embedding. At most one anchor per identity;
    /// a second attempt fails with [`StoreError::AnchorExists`].
    pub fn put_anchor(&self, identity_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let result = self.conn().execute(
            "INSERT INTO embeddings (identity_id, role, vector, created_at)
             VALUES (?1, 'anchor', ?2, ?3)",
            params![identity_id, encode_vector(embedding), Utc::now().to_rfc3339()],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::AnchorExists(identity_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn anchor(&self, identity_id: &str) -> Result<Option<Embedding>, StoreError> {
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT vector FROM embeddings
                 WHERE identity_id = ?1 AND role = 'anchor'",
                params![identity_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|r| decode_vector(identity_id, &r)).transpose()
    }

    /// Append one verified embedding, tagged with the photo it came from.
    pub fn put_verified(
        &self,
        identity_id: &str,
        embedding: &Embedding,
        source_photo_id: i64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO embeddings (identity_id, role, vector, source_photo_id, created_at)
             VALUES (?1, 'verified', ?2, ?3, ?4)",
            params![
                identity_id,
                encode_vector(embedding),
                source_photo_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// All embeddings grouped by identity: anchor first, then verified in
    /// insertion order. Input to the index builder.
    pub fn embeddings_by_identity(
        &self,
    ) -> Result<BTreeMap<String, Vec<Embedding>>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT identity_id, vector FROM embeddings
             ORDER BY identity_id,
                      CASE role WHEN 'anchor' THEN 0 ELSE 1 END,
                      embedding_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_identity: BTreeMap<String, Vec<Embedding>> = BTreeMap::new();
        for (identity, raw) in rows {
            let embedding = decode_vector(&identity, &raw)?;
            by_identity.entry(identity).or_default().push(embedding);
        }
        Ok(by_identity)
    }

    /// Identities that hold an anchor embedding, in id order.
    pub fn anchored_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT identity_id FROM embeddings
             WHERE role = 'anchor' ORDER BY identity_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Identities that already hold at least one verified embedding.
    pub fn curated_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT identity_id FROM embeddings
             WHERE role = 'verified' ORDER BY identity_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    pub fn verified_count(&self, identity_id: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM embeddings WHERE identity_id = ?1 AND role = 'verified'",
            params![identity_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Append an audit record for a finished curation attempt.
    pub fn record_curation(
        &self,
        identity_id: &str,
        outcome: &str,
        verified: usize,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO curation_log (identity_id, outcome, verified, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![identity_id, outcome, verified as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent curation attempts, newest first.
    pub fn recent_curations(&self, limit: usize) -> Result<Vec<CurationRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT identity_id, outcome, verified, created_at FROM curation_log
             ORDER BY log_id DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(CurationRecord {
                    identity_id: row.get(0)?,
                    outcome: row.get(1)?,
                    verified: row.get::<_, i64>(2)? as usize,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn();
        let count = |sql: &str| -> Result<usize, rusqlite::Error> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n as usize)
        };
        Ok(StoreStats {
            identities: count("SELECT COUNT(*) FROM identities")?,
            anchors: count("SELECT COUNT(*) FROM embeddings WHERE role = 'anchor'")?,
            verified: count("SELECT COUNT(*) FROM embeddings WHERE role = 'verified'")?,
            candidates: count("SELECT COUNT(*) FROM candidate_photos")?,
        })
    }
}

//! Persistent, named collections of (text, metadata, embedding) records.
//!
//! A collection lives in its own directory and is stored as three
//! artifacts that are always rewritten together:
//!
//! - `embeddings.bin`: the dense embedding matrix
//! - `texts.json`: the record texts, row-aligned with the matrix
//! - `metadata.json`: the record metadata, row-aligned with the matrix
//!
//! Every write puts a complete set of artifacts in a fresh `gen-*`
//! directory and then atomically replaces the `CURRENT` file naming the
//! live generation. A crash before that rename leaves the previous
//! generation in place; superseded generations are removed by the next
//! write.
//!
//! Writers hold an exclusive advisory lock on the collection's `.lock` file
//! for the whole read-merge-write cycle. Readers hold the shared lock while
//! loading.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use fd_lock::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    embedding::{Embedder, check_batch},
    error::{Error, Result},
    metadata::Metadata,
};

/// Collection used when none is named.
pub const DEFAULT_COLLECTION: &str = "default";

const EMBEDDINGS_FILE: &str = "embeddings.bin";
const TEXTS_FILE: &str = "texts.json";
const METADATA_FILE: &str = "metadata.json";
const LOCK_FILE: &str = ".lock";
const CURRENT_FILE: &str = "CURRENT";
const GENERATION_PREFIX: &str = "gen-";

/// Header size: 4 bytes row count + 4 bytes dimension.
const HEADER_SIZE: usize = 8;

/// Added to each vector norm so zero vectors score 0 instead of NaN.
const NORM_EPSILON: f32 = 1e-10;

/// A dense row-major matrix of embeddings, one row per record.
///
/// Binary format:
/// - 4 bytes: row count R (u32 LE)
/// - 4 bytes: embedding dimension D (u32 LE)
/// - R * D * 4 bytes: f32 values in row-major order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    dimension: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row width, or 0 for a matrix that has never held a row.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Flat array of f32 values: `data[row * dimension + col]`.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Get the embedding vector for a specific record.
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Append rows, fixing the dimension if the matrix is empty.
    fn append(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            if self.rows == 0 {
                self.dimension = vector.len();
            } else if vector.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            self.data.extend_from_slice(vector);
            self.rows += 1;
        }
        Ok(())
    }

    /// Cosine similarity of `query` against every row.
    fn cosine_similarities(&self, query: &[f32]) -> Vec<f32> {
        let query_norm = norm(query) + NORM_EPSILON;
        (0..self.rows)
            .map(|i| {
                let row = self.row(i);
                dot(query, row) / (query_norm * (norm(row) + NORM_EPSILON))
            })
            .collect()
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let rows = u32::try_from(self.rows).map_err(|_| {
            Error::Config(format!("too many rows to store: {}", self.rows))
        })?;
        let dimension = u32::try_from(self.dimension).map_err(|_| {
            Error::Config(format!("dimension too large: {}", self.dimension))
        })?;

        let mut bytes =
            Vec::with_capacity(HEADER_SIZE + std::mem::size_of_val(&*self.data));
        bytes.extend_from_slice(&rows.to_le_bytes());
        bytes.extend_from_slice(&dimension.to_le_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice(&self.data));
        Ok(bytes)
    }

    /// Returns `None` if the header and payload length disagree.
    fn decode(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..HEADER_SIZE)?;
        let rows = u32::from_le_bytes(header[0..4].try_into().ok()?) as usize;
        let dimension =
            u32::from_le_bytes(header[4..8].try_into().ok()?) as usize;

        let payload = &bytes[HEADER_SIZE..];
        let expected_len = rows.checked_mul(dimension)?.checked_mul(4)?;
        if payload.len() != expected_len || (rows > 0 && dimension == 0) {
            return None;
        }

        // Copy into an f32 buffer; the byte slice has no alignment guarantee.
        let mut data = vec![0f32; rows * dimension];
        bytemuck::cast_slice_mut::<f32, u8>(&mut data).copy_from_slice(payload);

        Some(Self {
            rows,
            dimension,
            data,
        })
    }
}

/// NaN sorts below every real score.
fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// A record returned by [`VectorIndex::similarity_search`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity to the query, in [-1, 1].
    pub score: f32,
}

#[derive(Debug, Default)]
struct Stored {
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
    embeddings: EmbeddingMatrix,
}

/// An open handle on one named collection.
///
/// Holds the whole collection in memory. Writes merge onto whatever is on
/// disk at the time, so several handles (or processes) may append to the
/// same collection; a handle only sees other writers' records after its own
/// next write or a reopen.
pub struct VectorIndex {
    name: String,
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
    embeddings: EmbeddingMatrix,
}

impl VectorIndex {
    /// Open (or create) the collection `name` under `root`.
    ///
    /// If the stored artifacts are unreadable or disagree on the record
    /// count, the collection is opened empty and a warning is logged. The
    /// files stay on disk until the next successful write replaces them.
    pub fn open(
        root: &Path,
        name: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        validate_name(name)?;
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)?;

        let stored = {
            let lock = open_lock(&dir)?;
            let _guard = lock.read().map_err(|_| Error::Lock(dir.clone()))?;
            load(&dir)?
        };

        debug!(
            collection = name,
            records = stored.texts.len(),
            dimension = stored.embeddings.dimension(),
            "opened collection"
        );

        Ok(Self {
            name: name.to_string(),
            dir,
            embedder,
            texts: stored.texts,
            metadatas: stored.metadatas,
            embeddings: stored.embeddings,
        })
    }

    /// Open a collection that must already exist.
    ///
    /// Unlike [`VectorIndex::open`], a missing collection is
    /// [`Error::NotFound`] and nothing is created.
    pub fn open_existing(
        root: &Path,
        name: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        if !Self::exists(root, name)? {
            return Err(Error::NotFound {
                kind: "collection",
                name: name.to_string(),
            });
        }
        Self::open(root, name, embedder)
    }

    /// Delete a collection and all of its records.
    ///
    /// Returns `false` if the collection did not exist.
    pub fn destroy(root: &Path, name: &str) -> Result<bool> {
        validate_name(name)?;
        let dir = root.join(name);
        if !dir.is_dir() {
            return Ok(false);
        }

        {
            let mut lock = open_lock(&dir)?;
            let _guard = lock.write().map_err(|_| Error::Lock(dir.clone()))?;
            remove_if_exists(&dir.join(CURRENT_FILE))?;
        }

        std::fs::remove_dir_all(&dir)?;
        debug!(collection = name, "destroyed collection");
        Ok(true)
    }

    /// Whether a collection named `name` exists under `root`.
    pub fn exists(root: &Path, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(root.join(name).is_dir())
    }

    /// Names of all collections under `root`, sorted.
    pub fn list(root: &Path) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Embed and append a batch of texts, then persist the collection.
    ///
    /// `metadatas` defaults to an empty mapping per text. The embedder is
    /// called once for the whole batch. The batch is appended to the
    /// collection as currently stored, and the handle is refreshed to that
    /// merged state. Nothing changes, in memory or on disk, unless every
    /// step succeeds.
    ///
    /// Returns the number of records added.
    pub fn add_texts(
        &mut self,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<usize> {
        let metadatas = match metadatas {
            Some(m) if m.len() != texts.len() => {
                return Err(Error::LengthMismatch {
                    texts: texts.len(),
                    metadatas: m.len(),
                });
            }
            Some(m) => m,
            None => vec![Metadata::new(); texts.len()],
        };

        if texts.is_empty() {
            return Ok(0);
        }

        let vectors = self.embedder.embed(&texts)?;
        check_batch(texts.len(), &vectors)?;
        let added = texts.len();

        let merged = {
            let mut lock = open_lock(&self.dir)?;
            let _guard =
                lock.write().map_err(|_| Error::Lock(self.dir.clone()))?;

            // Other writers may have committed since this handle loaded.
            let mut stored = load(&self.dir)?;
            stored.embeddings.append(&vectors)?;
            stored.texts.extend(texts);
            stored.metadatas.extend(metadatas);
            persist(&self.dir, &stored)?;
            stored
        };

        self.embeddings = merged.embeddings;
        self.texts = merged.texts;
        self.metadatas = merged.metadatas;

        debug!(
            collection = %self.name,
            added,
            total = self.texts.len(),
            "appended records"
        );
        Ok(added)
    }

    /// Rank every record by cosine similarity to `query`.
    ///
    /// Returns at most `top_k` hits, best first. Equal scores keep
    /// insertion order. An empty collection returns no hits without
    /// calling the embedder.
    pub fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(Error::Config("top_k must be positive".into()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&[query.to_string()])?;
        check_batch(1, &vectors)?;
        let query_embedding = vectors.into_iter().next().ok_or_else(|| {
            Error::Embedding("provider returned no query vector".into())
        })?;

        if query_embedding.len() != self.embeddings.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.embeddings.dimension(),
                actual: query_embedding.len(),
            });
        }

        let scores = self.embeddings.cosine_similarities(&query_embedding);
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| rank_key(scores[b]).total_cmp(&rank_key(scores[a])));
        order.truncate(top_k.min(self.len()));

        Ok(order
            .into_iter()
            .map(|i| SearchHit {
                text: self.texts[i].clone(),
                metadata: self.metadatas[i].clone(),
                score: scores[i],
            })
            .collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this collection's artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Embedding width, or 0 if nothing has been stored yet.
    pub fn dimension(&self) -> usize {
        self.embeddings.dimension()
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn metadatas(&self) -> &[Metadata] {
        &self.metadatas
    }

    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    /// Record count per `source` metadata value, sorted by source.
    ///
    /// Records without a source are not counted.
    pub fn sources(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for source in self.metadatas.iter().filter_map(Metadata::source) {
            *counts.entry(source).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(source, count)| (source.to_string(), count))
            .collect()
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("records", &self.texts.len())
            .field("dimension", &self.embeddings.dimension())
            .finish_non_exhaustive()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains(std::path::MAIN_SEPARATOR)
    {
        return Err(Error::Config(format!(
            "invalid collection name: {name:?}"
        )));
    }
    Ok(())
}

fn open_lock(dir: &Path) -> Result<RwLock<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.join(LOCK_FILE))?;
    Ok(RwLock::new(file))
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn discard(dir: &Path, reason: &str) -> Stored {
    warn!(
        dir = %dir.display(),
        reason,
        "collection artifacts are inconsistent, starting empty"
    );
    Stored::default()
}

/// Name of the live generation, if `pointer` holds a valid one.
fn parse_generation(pointer: &[u8]) -> Option<&str> {
    let name = std::str::from_utf8(pointer).ok()?.trim();
    let valid = name.len() > GENERATION_PREFIX.len()
        && name.starts_with(GENERATION_PREFIX)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(name)
}

fn load(dir: &Path) -> Result<Stored> {
    let Some(pointer) = read_optional(&dir.join(CURRENT_FILE))? else {
        return Ok(Stored::default());
    };
    let generation = match parse_generation(&pointer) {
        Some(name) => dir.join(name),
        None => return Ok(discard(dir, "CURRENT does not name a generation")),
    };
    if !generation.is_dir() {
        return Ok(discard(dir, "current generation is missing"));
    }
    load_generation(dir, &generation)
}

fn load_generation(dir: &Path, generation: &Path) -> Result<Stored> {
    let embeddings = match read_optional(&generation.join(EMBEDDINGS_FILE))? {
        None => EmbeddingMatrix::default(),
        Some(bytes) => match EmbeddingMatrix::decode(&bytes) {
            Some(matrix) => matrix,
            None => return Ok(discard(dir, "embedding matrix is malformed")),
        },
    };

    let texts: Vec<String> = match read_optional(&generation.join(TEXTS_FILE))? {
        None => Vec::new(),
        Some(bytes) => match serde_json::from_slice(&bytes) {
            Ok(texts) => texts,
            Err(e) => {
                return Ok(discard(dir, &format!("texts unreadable: {e}")));
            }
        },
    };

    let metadatas: Vec<Metadata> =
        match read_optional(&generation.join(METADATA_FILE))? {
            None => Vec::new(),
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(metadatas) => metadatas,
                Err(e) => {
                    return Ok(discard(
                        dir,
                        &format!("metadata unreadable: {e}"),
                    ));
                }
            },
        };

    if texts.len() != embeddings.rows() || metadatas.len() != texts.len() {
        return Ok(discard(
            dir,
            &format!(
                "{} texts, {} metadatas, {} embedding rows",
                texts.len(),
                metadatas.len(),
                embeddings.rows()
            ),
        ));
    }

    Ok(Stored {
        texts,
        metadatas,
        embeddings,
    })
}

/// Write all three artifacts into a new generation, then switch `CURRENT`
/// to it with an atomic rename. Must be called under the write lock.
fn persist(dir: &Path, stored: &Stored) -> Result<()> {
    let generation = tempfile::Builder::new()
        .prefix(GENERATION_PREFIX)
        .tempdir_in(dir)?;

    write_synced(
        &generation.path().join(EMBEDDINGS_FILE),
        &stored.embeddings.encode()?,
    )?;
    write_synced(
        &generation.path().join(METADATA_FILE),
        &serde_json::to_vec_pretty(&stored.metadatas)?,
    )?;
    write_synced(
        &generation.path().join(TEXTS_FILE),
        &serde_json::to_vec_pretty(&stored.texts)?,
    )?;

    let name = generation
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Config("generation directory name is not UTF-8".into())
        })?;
    write_atomic(dir, CURRENT_FILE, name.as_bytes())?;
    let _ = generation.keep();

    remove_stale_generations(dir, &name);
    Ok(())
}

/// Remove every generation except `live`. Failures are only logged.
fn remove_stale_generations(dir: &Path, live: &str) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not list generations");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == live || !name.starts_with(GENERATION_PREFIX) {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(entry.path()) {
            warn!(generation = name, error = %e, "could not remove stale generation");
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(file_name))
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}

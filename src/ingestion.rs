use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    chunking::{ChunkingConfig, chunk_text},
    error::{Error, Result},
    metadata::Metadata,
    vector_index::VectorIndex,
};

/// Metadata key for the first word offset of a chunk.
pub const START_KEY: &str = "start";
/// Metadata key for the exclusive end word offset of a chunk.
pub const END_KEY: &str = "end";

/// Summary of one indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedDocument {
    /// Identifier stored as the `source` of every chunk (the file name).
    pub source: String,
    pub path: PathBuf,
    /// Number of chunks added to the collection.
    pub chunks: usize,
}

/// Name used to cite a document: its file name, or the whole path when it
/// has none.
fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read, chunk, embed and store one text document.
///
/// All chunks go to the index in a single [`VectorIndex::add_texts`] call,
/// so a document is either fully indexed or not at all. A document with no
/// words adds nothing.
pub fn index_document(
    index: &mut VectorIndex,
    path: &Path,
    config: &ChunkingConfig,
) -> Result<IndexedDocument> {
    if !path.is_file() {
        return Err(Error::NotFound {
            kind: "document",
            name: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let source = source_name(path);
    let chunks = chunk_text(&content, config)?;

    let (texts, metadatas): (Vec<String>, Vec<Metadata>) = chunks
        .into_iter()
        .map(|chunk| {
            let metadata = Metadata::for_chunk(&source, chunk.chunk_id)
                .with(START_KEY, chunk.start)
                .with(END_KEY, chunk.end);
            (chunk.text, metadata)
        })
        .unzip();

    let added = index.add_texts(texts, Some(metadatas))?;
    debug!(collection = index.name(), %source, chunks = added, "indexed document");

    Ok(IndexedDocument {
        source,
        path: path.to_path_buf(),
        chunks: added,
    })
}

/// Index documents one after another.
///
/// `on_indexed` is called after each document is persisted. The first
/// failure, from indexing or from `on_indexed`, stops the run; documents
/// indexed before it stay in the collection.
pub fn index_documents<P: AsRef<Path>>(
    index: &mut VectorIndex,
    paths: &[P],
    config: &ChunkingConfig,
    mut on_indexed: impl FnMut(&IndexedDocument) -> Result<()>,
) -> Result<Vec<IndexedDocument>> {
    config.validate()?;

    let mut indexed = Vec::with_capacity(paths.len());
    for path in paths {
        let document = index_document(index, path.as_ref(), config)?;
        on_indexed(&document)?;
        indexed.push(document);
    }

    info!(
        collection = index.name(),
        documents = indexed.len(),
        chunks = indexed.iter().map(|d| d.chunks).sum::<usize>(),
        "indexing finished"
    );
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        metadata::MetadataValue,
        testing::{FailingEmbedder, FakeEmbedder},
    };

    fn words(range: std::ops::Range<usize>) -> String {
        range.map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn open(tmp: &tempfile::TempDir, embedder: Arc<FakeEmbedder>) -> VectorIndex {
        VectorIndex::open(&tmp.path().join("index"), "papers", embedder).unwrap()
    }

    #[test]
    fn long_document_is_split_and_chunk_two_is_retrievable() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("paper.txt");
        std::fs::write(&doc, words(0..1300)).unwrap();

        let embedder = Arc::new(FakeEmbedder::new(512));
        let mut index = open(&tmp, embedder.clone());

        let indexed =
            index_document(&mut index, &doc, &ChunkingConfig::default())
                .unwrap();
        assert_eq!(indexed.source, "paper.txt");
        assert_eq!(indexed.chunks, 3);
        assert_eq!(index.len(), 3);
        assert_eq!(embedder.batch_sizes(), vec![3]);

        let metadata = &index.metadatas()[1];
        assert_eq!(metadata.source(), Some("paper.txt"));
        assert_eq!(metadata.chunk_id(), Some(1));
        assert_eq!(metadata.get(START_KEY), Some(&MetadataValue::Int(450)));
        assert_eq!(metadata.get(END_KEY), Some(&MetadataValue::Int(1050)));

        let hits = index.similarity_search(&words(900..1300), 3).unwrap();
        assert_eq!(hits[0].metadata.chunk_id(), Some(2));
    }

    #[test]
    fn missing_document_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = open(&tmp, Arc::new(FakeEmbedder::new(8)));

        let result = index_document(
            &mut index,
            &tmp.path().join("ghost.txt"),
            &ChunkingConfig::default(),
        );
        assert!(matches!(
            result,
            Err(Error::NotFound {
                kind: "document",
                ..
            })
        ));
    }

    #[test]
    fn blank_document_adds_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("blank.md");
        std::fs::write(&doc, "   \r\n  ").unwrap();

        let embedder = Arc::new(FakeEmbedder::new(8));
        let mut index = open(&tmp, embedder.clone());
        let indexed =
            index_document(&mut index, &doc, &ChunkingConfig::default())
                .unwrap();

        assert_eq!(indexed.chunks, 0);
        assert!(index.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn failure_keeps_earlier_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("a.txt");
        let second = tmp.path().join("b.txt");
        std::fs::write(&first, "alpha beta gamma").unwrap();
        std::fs::write(&second, "delta epsilon").unwrap();
        let missing = tmp.path().join("missing.txt");

        let embedder = Arc::new(FakeEmbedder::new(16));
        let mut index = open(&tmp, embedder.clone());

        let mut seen = Vec::new();
        let result = index_documents(
            &mut index,
            &[first, missing, second],
            &ChunkingConfig::default(),
            |doc| {
                seen.push(doc.source.clone());
                Ok(())
            },
        );
        assert!(result.is_err());
        assert_eq!(seen, vec!["a.txt"]);

        let reopened = open(&tmp, embedder);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.metadatas()[0].source(), Some("a.txt"));
    }

    #[test]
    fn embedder_failure_adds_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("a.txt");
        std::fs::write(&doc, "alpha beta").unwrap();

        let mut index = VectorIndex::open(
            &tmp.path().join("index"),
            "papers",
            Arc::new(FailingEmbedder),
        )
        .unwrap();
        assert!(
            index_document(&mut index, &doc, &ChunkingConfig::default())
                .is_err()
        );
        assert!(index.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_before_reading() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder = Arc::new(FakeEmbedder::new(8));
        let mut index = open(&tmp, embedder.clone());
        let config = ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 10,
        };

        let result = index_documents(
            &mut index,
            &[tmp.path().join("anything.txt")],
            &config,
            |_| Ok(()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(embedder.calls(), 0);
    }
}

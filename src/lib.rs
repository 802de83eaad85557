//! autoresearcher - ask questions against your own documents.
//!
//! Documents are split into overlapping word windows, embedded, and stored
//! in a named on-disk collection. A question is answered either with one
//! generation call grounded on the most similar passages, or by a
//! searcher -> critic -> writer chain that summarizes, reviews and rewrites
//! before answering. Embeddings and generations come from providers behind
//! the [`Embedder`] and [`Generator`] traits; [`OllamaClient`] implements
//! both against a local Ollama server.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use autoresearcher::{
//!     ConfigDb, DataDir, OllamaClient, Settings, VectorIndex,
//!     agents, ingestion,
//!     settings::Overrides,
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config_db = ConfigDb::open(&data_dir.config_db()).unwrap();
//! let settings = Settings::resolve(&config_db, &Overrides::default()).unwrap();
//! let client = Arc::new(OllamaClient::from_settings(&settings));
//!
//! let mut index =
//!     VectorIndex::open(&data_dir.index_root().unwrap(), "papers", client.clone())
//!         .unwrap();
//! ingestion::index_document(
//!     &mut index,
//!     "paper.txt".as_ref(),
//!     &settings.chunking,
//! )
//! .unwrap();
//!
//! let answer = agents::run(
//!     &index,
//!     client.as_ref(),
//!     "What quantization technique is used?",
//!     settings.top_k,
//! )
//! .unwrap();
//! println!("{}", answer.final_answer);
//! ```

pub mod agents;
pub mod ask;
pub mod chunking;
pub mod config_db;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod generation;
pub mod ingestion;
pub mod mcp;
pub mod metadata;
pub mod ollama;
pub mod prompts;
pub mod retrieval;
pub mod settings;
pub mod vector_index;
pub mod walker;

#[cfg(test)]
mod testing;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use embedding::Embedder;
pub use error::{Error, Result};
pub use generation::{GenerationParams, Generator};
pub use ollama::OllamaClient;
pub use settings::Settings;
pub use vector_index::{SearchHit, VectorIndex};

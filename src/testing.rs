//! Deterministic providers for unit tests.

use std::{
    collections::{HashMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    generation::{GenerationParams, Generator},
};

/// Bag-of-words embedder: each lowercase word adds 1.0 to a hashed bucket.
/// Specific texts can be pinned to exact vectors.
pub struct FakeEmbedder {
    dimension: usize,
    pinned: HashMap<String, Vec<f32>>,
    batches: Mutex<Vec<usize>>,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            pinned: HashMap::new(),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Embedder for FakeEmbedder {
    fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches.lock().unwrap().push(batch.len());
        Ok(batch
            .iter()
            .map(|text| {
                self.pinned
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| self.hashed(text))
            })
            .collect())
    }
}

/// Embedder whose provider is always down.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _batch: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding("provider offline".into()))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
    pub params: GenerationParams,
}

/// Generator that answers `reply #N` for the N-th call (from 1) and can be
/// told to fail on a given call.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: Mutex<Vec<RecordedCall>>,
    fail_on: Option<usize>,
    counter: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(
        &self,
        system: &str,
        user: &str,
        params: GenerationParams,
    ) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            user: user.to_string(),
            params,
        });
        if self.fail_on == Some(n) {
            return Err(Error::Generation(format!("call {n} failed")));
        }
        Ok(format!("reply #{n}"))
    }
}

use tracing::debug;

use crate::{
    error::Result,
    generation::{GenerationParams, Generator},
    prompts::RAG_SYSTEM_PROMPT,
    vector_index::{SearchHit, VectorIndex},
};

/// Returned by [`answer`] when retrieval finds nothing.
pub const NO_RELEVANT_INFORMATION: &str =
    "I could not find any relevant information in the current index.";

/// Separator placed between rendered passages.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Default number of passages retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;

/// Largest `top_k` accepted from users.
pub const MAX_TOP_K: usize = 50;

pub const ANSWER_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.2,
    max_tokens: 600,
};

/// Retrieve the `top_k` passages most similar to `question`.
pub fn retrieve(
    index: &VectorIndex,
    question: &str,
    top_k: usize,
) -> Result<Vec<SearchHit>> {
    let hits = index.similarity_search(question, top_k)?;
    debug!(
        collection = index.name(),
        top_k,
        hits = hits.len(),
        "retrieved passages"
    );
    Ok(hits)
}

/// Label for a passage: `[Source: paper.txt, Chunk: 3]`.
pub fn passage_label(hit: &SearchHit) -> String {
    let source = hit.metadata.source().unwrap_or("unknown");
    let chunk_id = hit.metadata.chunk_id().unwrap_or(-1);
    format!("[Source: {source}, Chunk: {chunk_id}]")
}

/// Render passages as labeled blocks joined by [`BLOCK_SEPARATOR`].
///
/// # Examples
///
/// ```
/// use autoresearcher::{metadata::Metadata, retrieval::render_context};
/// use autoresearcher::vector_index::SearchHit;
///
/// let hits = vec![
///     SearchHit {
///         text: "first".into(),
///         metadata: Metadata::for_chunk("a.txt", 0),
///         score: 0.9,
///     },
///     SearchHit { text: "second".into(), metadata: Metadata::new(), score: 0.5 },
/// ];
/// assert_eq!(
///     render_context(&hits),
///     "[Source: a.txt, Chunk: 0]\nfirst\n\n---\n\n[Source: unknown, Chunk: -1]\nsecond"
/// );
/// ```
pub fn render_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("{}\n{}", passage_label(hit), hit.text))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// Answer a question in one generation call grounded on retrieved passages.
///
/// If nothing is retrieved, returns [`NO_RELEVANT_INFORMATION`] without
/// calling the generator. Otherwise returns the generated text verbatim.
pub fn answer(
    index: &VectorIndex,
    generator: &dyn Generator,
    question: &str,
    top_k: usize,
) -> Result<String> {
    let hits = retrieve(index, question, top_k)?;
    if hits.is_empty() {
        return Ok(NO_RELEVANT_INFORMATION.to_string());
    }

    let user = format!(
        "Question:\n{question}\n\n\
         Context from documents:\n{}\n\n\
         Now provide a clear, concise answer based only on this context.",
        render_context(&hits)
    );

    generator.generate(RAG_SYSTEM_PROMPT, &user, ANSWER_PARAMS)
}

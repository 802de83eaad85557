//! The Searcher -> Critic -> Writer answer chain.
//!
//! Each stage is a value that the next stage consumes:
//!
//! ```text
//! question --search()--> Searched --critique()--> Critiqued --write()--> AgentAnswer
//! ```
//!
//! A stage only sees what the previous one handed over, so the chain has no
//! shared mutable state, and it cannot be run out of order. Any stage error
//! ends the chain; there is no partial answer.

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::Result,
    generation::{GenerationParams, Generator},
    prompts::{CRITIC_SYSTEM_PROMPT, SEARCHER_SYSTEM_PROMPT, WRITER_SYSTEM_PROMPT},
    retrieval::{self, passage_label, render_context},
    vector_index::{SearchHit, VectorIndex},
};

/// Searcher summary used when retrieval finds nothing.
pub const NO_RELEVANT_CONTEXT: &str = "No relevant context found in the index.";

pub const SEARCHER_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.2,
    max_tokens: 600,
};

pub const CRITIC_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.2,
    max_tokens: 400,
};

pub const WRITER_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.25,
    max_tokens: 900,
};

/// Output of the Searcher stage.
#[derive(Debug, Clone)]
pub struct Searched {
    pub question: String,
    pub summary: String,
    pub retrieved: Vec<SearchHit>,
}

/// Output of the Critic stage.
#[derive(Debug, Clone)]
pub struct Critiqued {
    pub question: String,
    pub summary: String,
    pub feedback: String,
    /// Passage labels carried through for the final answer.
    pub sources: Vec<String>,
}

/// The finished pipeline state.
#[derive(Debug, Clone, Serialize)]
pub struct AgentAnswer {
    pub question: String,
    pub searcher_summary: String,
    pub critic_feedback: String,
    pub final_answer: String,
    /// Labels of the passages the Searcher retrieved, best first.
    pub sources: Vec<String>,
}

/// Searcher: retrieve passages and summarize them.
///
/// With nothing retrieved, the summary is [`NO_RELEVANT_CONTEXT`] and no
/// generation call is made.
pub fn search(
    index: &VectorIndex,
    generator: &dyn Generator,
    question: &str,
    top_k: usize,
) -> Result<Searched> {
    let retrieved = retrieval::retrieve(index, question, top_k)?;

    if retrieved.is_empty() {
        debug!(stage = "searcher", "no passages, skipping summary");
        return Ok(Searched {
            question: question.to_string(),
            summary: NO_RELEVANT_CONTEXT.to_string(),
            retrieved,
        });
    }

    let user = format!(
        "Question:\n{question}\n\n\
         Context from vector store:\n{}\n\n\
         Now produce the requested summary.",
        render_context(&retrieved)
    );
    let summary =
        generator.generate(SEARCHER_SYSTEM_PROMPT, &user, SEARCHER_PARAMS)?;
    debug!(stage = "searcher", passages = retrieved.len(), "summarized");

    Ok(Searched {
        question: question.to_string(),
        summary,
        retrieved,
    })
}

impl Searched {
    /// Critic: review the summary against the question.
    ///
    /// Runs even when the Searcher found nothing; it only reads the summary.
    pub fn critique(self, generator: &dyn Generator) -> Result<Critiqued> {
        let user = format!(
            "Question:\n{}\n\n\
             Searcher agent summary:\n{}\n\n\
             Now critique the summary as per your instructions.",
            self.question, self.summary
        );
        let feedback =
            generator.generate(CRITIC_SYSTEM_PROMPT, &user, CRITIC_PARAMS)?;
        debug!(stage = "critic", "reviewed summary");

        Ok(Critiqued {
            sources: self.retrieved.iter().map(passage_label).collect(),
            question: self.question,
            summary: self.summary,
            feedback,
        })
    }
}

impl Critiqued {
    /// Writer: produce the final structured answer.
    pub fn write(self, generator: &dyn Generator) -> Result<AgentAnswer> {
        let user = format!(
            "Question:\n{}\n\n\
             Searcher agent summary:\n{}\n\n\
             Critic agent feedback:\n{}\n\n\
             Now produce the final structured answer as per your instructions.",
            self.question, self.summary, self.feedback
        );
        let final_answer =
            generator.generate(WRITER_SYSTEM_PROMPT, &user, WRITER_PARAMS)?;
        debug!(stage = "writer", "wrote final answer");

        Ok(AgentAnswer {
            question: self.question,
            searcher_summary: self.summary,
            critic_feedback: self.feedback,
            final_answer,
            sources: self.sources,
        })
    }
}

/// Run the whole chain for one question.
pub fn run(
    index: &VectorIndex,
    generator: &dyn Generator,
    question: &str,
    top_k: usize,
) -> Result<AgentAnswer> {
    let answer = search(index, generator, question, top_k)?
        .critique(generator)?
        .write(generator)?;
    info!(
        collection = index.name(),
        sources = answer.sources.len(),
        "agent pipeline finished"
    );
    Ok(answer)
}

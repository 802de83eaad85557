//! One entry point for both answering modes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    agents::{self, AgentAnswer},
    error::Result,
    generation::Generator,
    retrieval,
    vector_index::VectorIndex,
};

/// How a question is answered.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// One grounded generation call.
    #[default]
    Rag,
    /// Searcher, Critic and Writer in sequence.
    Agents,
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnswerMode::Rag => "rag",
            AnswerMode::Agents => "agents",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Answer {
    Rag { question: String, answer: String },
    Agents(AgentAnswer),
}

impl Answer {
    /// The text shown to the user.
    pub fn text(&self) -> &str {
        match self {
            Answer::Rag { answer, .. } => answer,
            Answer::Agents(agent) => &agent.final_answer,
        }
    }

    pub fn mode(&self) -> AnswerMode {
        match self {
            Answer::Rag { .. } => AnswerMode::Rag,
            Answer::Agents(_) => AnswerMode::Agents,
        }
    }
}

pub fn ask(
    index: &VectorIndex,
    generator: &dyn Generator,
    question: &str,
    top_k: usize,
    mode: AnswerMode,
) -> Result<Answer> {
    match mode {
        AnswerMode::Rag => Ok(Answer::Rag {
            question: question.to_string(),
            answer: retrieval::answer(index, generator, question, top_k)?,
        }),
        AnswerMode::Agents => Ok(Answer::Agents(agents::run(
            index, generator, question, top_k,
        )?)),
    }
}

//! Latency and answer-length measurements over a fixed question set.

use std::{io::Write, time::Instant};

use serde::Serialize;
use tracing::info;

use crate::{
    ask::{AnswerMode, ask},
    error::{Error, Result},
    generation::Generator,
    vector_index::VectorIndex,
};

/// Questions asked when none are supplied.
pub const DEFAULT_QUESTIONS: &[&str] = &[
    "Explain the pruning strategy in this paper",
    "What are the main contributions?",
    "What evaluation metrics are used?",
    "What is the role of the C2f module?",
    "How much speed improvement is achieved?",
    "What hardware is used for testing?",
    "What is the model size after pruning?",
    "What quantization technique is used?",
];

/// One measured question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalRecord {
    /// Local date the question was asked, `YYYY-MM-DD`.
    pub date: String,
    pub collection: String,
    pub mode: AnswerMode,
    pub question: String,
    /// Wall-clock seconds for the whole answer, rounded to 10 ms.
    pub latency_secs: f64,
    /// Answer length in characters.
    pub answer_len: usize,
}

/// Read one question per non-blank line.
pub fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Ask every question in order and time each answer.
///
/// The first failure aborts the run.
pub fn evaluate<S: AsRef<str>>(
    index: &VectorIndex,
    generator: &dyn Generator,
    questions: &[S],
    mode: AnswerMode,
    top_k: usize,
) -> Result<Vec<EvalRecord>> {
    if questions.is_empty() {
        return Err(Error::Config("no questions to evaluate".into()));
    }

    let mut records = Vec::with_capacity(questions.len());
    for question in questions {
        let question = question.as_ref();
        let started = Instant::now();
        let answer = ask(index, generator, question, top_k, mode)?;
        let elapsed = started.elapsed().as_secs_f64();

        let record = EvalRecord {
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            collection: index.name().to_string(),
            mode,
            question: question.to_string(),
            latency_secs: (elapsed * 100.0).round() / 100.0,
            answer_len: answer.text().chars().count(),
        };
        info!(
            question,
            latency_secs = record.latency_secs,
            answer_len = record.answer_len,
            "evaluated"
        );
        records.push(record);
    }

    Ok(records)
}

/// Write records as JSON lines.
pub fn write_jsonl(records: &[EvalRecord], mut out: impl Write) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

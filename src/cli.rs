use std::path::PathBuf;

use autoresearcher::{
    ask::AnswerMode,
    retrieval::MAX_TOP_K,
    vector_index::DEFAULT_COLLECTION,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

fn parse_top_k(value: &str) -> Result<usize, String> {
    let top_k: usize = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if (1..=MAX_TOP_K).contains(&top_k) {
        Ok(top_k)
    } else {
        Err(format!("must be between 1 and {MAX_TOP_K}"))
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "autoresearcher",
    about = "Ask questions against your own documents",
    version
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Ollama server URL
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// Generation model served by Ollama
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Embedding model served by Ollama
    #[arg(long, global = true)]
    pub embed_model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, embed and store documents in a collection
    Index(IndexArgs),
    /// Show the passages most similar to a query
    Search(SearchArgs),
    /// Answer a question from a collection
    Ask(AskArgs),
    /// List the documents indexed in a collection
    Sources(CollectionArgs),
    /// Delete a collection and everything indexed in it
    Clear(ClearArgs),
    /// List collections
    List(ListArgs),
    /// Time answers to a list of questions
    Eval(EvalArgs),
    /// Show data directory, settings and collection sizes
    Status(StatusArgs),
    /// Inspect or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Files or directories to index (.md and .txt)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Target collection
    #[arg(short = 'c', long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Only index files whose path, relative to the given directory,
    /// matches this glob
    #[arg(long)]
    pub glob: Option<String>,

    /// Words per chunk (overrides the stored setting)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Words shared by consecutive chunks (overrides the stored setting)
    #[arg(long)]
    pub chunk_overlap: Option<usize>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Collection to search
    #[arg(short = 'c', long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Number of passages to return
    #[arg(short = 'n', long, value_parser = parse_top_k)]
    pub top_k: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub question: String,

    /// Collection to answer from
    #[arg(short = 'c', long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Number of passages to retrieve
    #[arg(short = 'n', long, value_parser = parse_top_k)]
    pub top_k: Option<usize>,

    /// Answering mode
    #[arg(short, long, value_enum, default_value_t = AnswerMode::Rag)]
    pub mode: AnswerMode,

    /// Output the full answer record as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Sources / Clear / List --

#[derive(Debug, Parser)]
pub struct CollectionArgs {
    /// Collection to inspect
    #[arg(short = 'c', long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ClearArgs {
    /// Collection to delete
    pub collection: String,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Eval --

#[derive(Debug, Parser)]
pub struct EvalArgs {
    /// Collection to evaluate against
    #[arg(short = 'c', long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Answering mode
    #[arg(short, long, value_enum, default_value_t = AnswerMode::Agents)]
    pub mode: AnswerMode,

    /// File with one question per line (default: built-in question set)
    #[arg(long)]
    pub questions: Option<PathBuf>,

    /// Write JSON lines here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of passages to retrieve
    #[arg(short = 'n', long, value_parser = parse_top_k)]
    pub top_k: Option<usize>,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show every setting with its effective value and where it came from
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting in config.redb
    Set {
        /// Setting key (e.g. generation_model, top_k)
        key: String,
        /// New value
        value: String,
    },
    /// Remove a stored setting (revert to default)
    Unset {
        /// Setting key
        key: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "autoresearcher",
            &mut std::io::stdout(),
        );
    }
}

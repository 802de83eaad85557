use std::{path::PathBuf, sync::Arc};

use autoresearcher::{
    ConfigDb,
    DataDir,
    Error,
    OllamaClient,
    Result,
    Settings,
    VectorIndex,
    ask::{self, Answer},
    chunking::ChunkingConfig,
    evaluation,
    ingestion,
    mcp,
    retrieval,
    settings::{Overrides, Setting},
    walker,
};
use clap::Parser;
use kdam::{BarExt, tqdm};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("AUTORESEARCHER_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let overrides = Overrides {
        ollama_url: cli.ollama_url,
        generation_model: cli.model,
        embedding_model: cli.embed_model,
    };

    match cli.command {
        Command::Index(args) => {
            let settings = Settings::resolve(&config_db, &overrides)?;
            cmd_index(&data_dir, &settings, &args)?;
        }
        Command::Search(args) => {
            let settings = Settings::resolve(&config_db, &overrides)?;
            cmd_search(&data_dir, &settings, &args)?;
        }
        Command::Ask(args) => {
            let settings = Settings::resolve(&config_db, &overrides)?;
            cmd_ask(&data_dir, &settings, &args)?;
        }
        Command::Sources(args) => {
            let settings = Settings::resolve(&config_db, &overrides)?;
            cmd_sources(&data_dir, &settings, &args)?;
        }
        Command::Clear(args) => {
            cmd_clear(&data_dir, &args.collection)?;
        }
        Command::List(args) => {
            let settings = Settings::resolve(&config_db, &overrides)?;
            cmd_list(&data_dir, &settings, args.json)?;
        }
        Command::Eval(args) => {
            let settings = Settings::resolve(&config_db, &overrides)?;
            cmd_eval(&data_dir, &settings, &args)?;
        }
        Command::Status(args) => {
            let settings = Settings::resolve(&config_db, &overrides)?;
            cmd_status(&data_dir, &settings, args.json)?;
        }
        Command::Config { action } => {
            cmd_config(&config_db, &overrides, action)?;
        }
        Command::Mcp => {
            let settings = Settings::resolve(&config_db, &overrides)?;
            mcp::run_mcp(&data_dir, &settings)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn client(settings: &Settings) -> Arc<OllamaClient> {
    Arc::new(OllamaClient::from_settings(settings))
}

fn cmd_index(
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::IndexArgs,
) -> Result<()> {
    let chunking = ChunkingConfig {
        chunk_size: args.chunk_size.unwrap_or(settings.chunking.chunk_size),
        chunk_overlap: args
            .chunk_overlap
            .unwrap_or(settings.chunking.chunk_overlap),
    };
    chunking.validate()?;

    let matcher = args
        .glob
        .as_deref()
        .map(|pattern| {
            globset::Glob::new(pattern)
                .map(|glob| glob.compile_matcher())
                .map_err(|e| Error::Config(format!("invalid glob pattern: {e}")))
        })
        .transpose()?;

    let files: Vec<PathBuf> = walker::discover_all(&args.paths, matcher.as_ref())?
        .into_iter()
        .map(|f| f.absolute_path)
        .collect();

    if files.is_empty() {
        eprintln!("No documents found.");
        return Ok(());
    }

    let mut index = VectorIndex::open(
        &data_dir.index_root()?,
        &args.collection,
        client(settings),
    )?;

    let mut pb = tqdm!(total = files.len(), desc = "Indexing", unit = "doc");
    let indexed =
        ingestion::index_documents(&mut index, &files, &chunking, |_| {
            pb.update(1)?;
            Ok(())
        })?;
    eprintln!();

    let chunks: usize = indexed.iter().map(|doc| doc.chunks).sum();
    eprintln!(
        "Indexed {} documents ({chunks} chunks) into '{}', {} records total.",
        indexed.len(),
        args.collection,
        index.len()
    );
    Ok(())
}

fn cmd_search(
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::SearchArgs,
) -> Result<()> {
    let index = VectorIndex::open_existing(
        &data_dir.index_root()?,
        &args.collection,
        client(settings),
    )?;
    let top_k = args.top_k.unwrap_or(settings.top_k);
    let hits = retrieval::retrieve(&index, &args.query, top_k)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("No passages found.");
    } else {
        for (rank, hit) in hits.iter().enumerate() {
            println!(
                "{}. {} (score: {:.3})",
                rank + 1,
                retrieval::passage_label(hit),
                hit.score
            );
            println!("   {}", preview(&hit.text, 200));
        }
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().nth(max_chars).is_some() {
        out.push_str("...");
    }
    out
}

fn cmd_ask(
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::AskArgs,
) -> Result<()> {
    let client = client(settings);
    let index = VectorIndex::open_existing(
        &data_dir.index_root()?,
        &args.collection,
        client.clone(),
    )?;
    let top_k = args.top_k.unwrap_or(settings.top_k);

    let answer =
        ask::ask(&index, client.as_ref(), &args.question, top_k, args.mode)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    match &answer {
        Answer::Rag { answer, .. } => println!("{answer}"),
        Answer::Agents(agent) => {
            println!("{}", agent.final_answer);
            if !agent.sources.is_empty() {
                println!("\nRetrieved:");
                for source in &agent.sources {
                    println!("  {source}");
                }
            }
        }
    }
    Ok(())
}

fn cmd_sources(
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::CollectionArgs,
) -> Result<()> {
    let index = VectorIndex::open_existing(
        &data_dir.index_root()?,
        &args.collection,
        client(settings),
    )?;
    let sources = index.sources();

    if args.json {
        let items: Vec<_> = sources
            .iter()
            .map(|(source, chunks)| {
                serde_json::json!({ "source": source, "chunks": chunks })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if sources.is_empty() {
        println!("No documents indexed in '{}'.", args.collection);
    } else {
        for (source, chunks) in &sources {
            println!("{source}\t{chunks} chunks");
        }
    }
    Ok(())
}

fn cmd_clear(data_dir: &DataDir, collection: &str) -> Result<()> {
    if !VectorIndex::destroy(&data_dir.index_root()?, collection)? {
        return Err(Error::NotFound {
            kind: "collection",
            name: collection.to_string(),
        });
    }
    println!("Cleared collection '{collection}'");
    Ok(())
}

#[derive(Debug, Serialize)]
struct CollectionSummary {
    name: String,
    records: usize,
    sources: usize,
    dimension: usize,
}

fn collection_summaries(
    data_dir: &DataDir,
    settings: &Settings,
) -> Result<Vec<CollectionSummary>> {
    let root = data_dir.index_root()?;
    let client = client(settings);
    let mut summaries = Vec::new();
    for name in VectorIndex::list(&root)? {
        match VectorIndex::open(&root, &name, client.clone()) {
            Ok(index) => summaries.push(CollectionSummary {
                records: index.len(),
                sources: index.sources().len(),
                dimension: index.dimension(),
                name,
            }),
            Err(e) => warn!(collection = %name, error = %e, "skipping collection"),
        }
    }
    Ok(summaries)
}

fn cmd_list(data_dir: &DataDir, settings: &Settings, json: bool) -> Result<()> {
    let summaries = collection_summaries(data_dir, settings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else if summaries.is_empty() {
        println!("No collections.");
    } else {
        for c in &summaries {
            println!("{}\t{} records", c.name, c.records);
        }
    }
    Ok(())
}

fn cmd_eval(
    data_dir: &DataDir,
    settings: &Settings,
    args: &cli::EvalArgs,
) -> Result<()> {
    let questions: Vec<String> = match &args.questions {
        Some(path) => {
            evaluation::parse_questions(&std::fs::read_to_string(path)?)
        }
        None => evaluation::DEFAULT_QUESTIONS
            .iter()
            .map(|q| q.to_string())
            .collect(),
    };

    let client = client(settings);
    let index = VectorIndex::open_existing(
        &data_dir.index_root()?,
        &args.collection,
        client.clone(),
    )?;
    let top_k = args.top_k.unwrap_or(settings.top_k);

    let records = evaluation::evaluate(
        &index,
        client.as_ref(),
        &questions,
        args.mode,
        top_k,
    )?;

    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            evaluation::write_jsonl(&records, std::io::BufWriter::new(file))?;
            eprintln!("Saved {} records to {}", records.len(), path.display());
        }
        None => evaluation::write_jsonl(&records, std::io::stdout().lock())?,
    }
    Ok(())
}

fn cmd_status(data_dir: &DataDir, settings: &Settings, json: bool) -> Result<()> {
    let summaries = collection_summaries(data_dir, settings)?;

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "settings": settings,
            "collections": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Ollama: {}", settings.ollama_url);
        println!("Generation model: {}", settings.generation_model);
        println!("Embedding model: {}", settings.embedding_model);
        println!(
            "Chunking: {} words, {} overlap",
            settings.chunking.chunk_size, settings.chunking.chunk_overlap
        );
        println!("Collections: {}", summaries.len());
        for c in &summaries {
            println!(
                "  {}: {} records from {} sources (dim {})",
                c.name, c.records, c.sources, c.dimension
            );
        }
    }
    Ok(())
}

fn cmd_config(
    config_db: &ConfigDb,
    overrides: &Overrides,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { json } => {
            let described = Settings::describe(config_db, overrides)?;
            if json {
                let map: serde_json::Map<_, _> = described
                    .iter()
                    .map(|(setting, value, origin)| {
                        (
                            setting.key().to_string(),
                            serde_json::json!({ "value": value, "origin": origin }),
                        )
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (setting, value, origin) in &described {
                    let origin = serde_json::to_value(origin)?;
                    println!(
                        "{setting}\t{value}\t({})",
                        origin.as_str().unwrap_or_default()
                    );
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let setting: Setting = key.parse()?;
            Settings::store(config_db, setting, &value)?;
            println!("Set {setting} = {value}");
        }
        ConfigAction::Unset { key } => {
            let setting: Setting = key.parse()?;
            if config_db.remove_setting(setting.key())? {
                println!("Unset {setting} (now {})", setting.default_value());
            } else {
                println!("{setting} was not set");
            }
        }
    }
    Ok(())
}

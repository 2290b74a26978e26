use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rag_qa::config::Config;
use rag_qa::instrumentation::{self, QueryLog};
use rag_qa::knowledge::{self, Chunker};
use rag_qa::pipeline::{AskOptions, Rag};
use rag_qa::server::{self, AppState};
use rag_qa::{build_rag, ScoredDocument};

#[derive(Parser)]
#[command(name = "rag-qa", about = "Question answering over a local knowledge base")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines (also enabled by LOG_FORMAT=json)
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a knowledge base (.json, .txt, .md, or a directory) into the vector store
    Ingest {
        path: PathBuf,
        /// Target chunk size in bytes for plain-text files
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,
        /// Bytes repeated between consecutive chunks
        #[arg(long, default_value_t = 128)]
        overlap: usize,
    },
    /// Answer a single question
    Ask {
        question: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Show the most similar documents without generating an answer
    Search {
        question: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Ask questions in a loop
    Interactive {
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print vector collection statistics
    Stats,
    /// Run evaluation on a question set
    Eval {
        /// Path to JSONL file with questions
        path: PathBuf,
    },
}

#[derive(clap::Args)]
struct RetrievalArgs {
    /// Number of documents to retrieve
    #[arg(short = 'k', long)]
    top_k: Option<u64>,
    /// Minimum similarity score
    #[arg(long)]
    threshold: Option<f32>,
}

impl RetrievalArgs {
    fn options(&self, defaults: AskOptions) -> AskOptions {
        AskOptions {
            top_k: self.top_k.unwrap_or(defaults.top_k),
            score_threshold: self.threshold.unwrap_or(defaults.score_threshold),
        }
    }
}

#[derive(serde::Deserialize)]
struct EvalQuestion {
    question: String,
    expected_answer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json_logs = cli.log_json || std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    instrumentation::init_tracing(json_logs);

    let config = Config::from_env()?;
    let rag = build_rag(&config)?;

    match cli.command {
        Commands::Ingest {
            path,
            chunk_size,
            overlap,
        } => {
            let documents = knowledge::load_path(&path, &Chunker::new(chunk_size, overlap))?;
            if documents.is_empty() {
                anyhow::bail!("No documents found in {}", path.display());
            }
            let stored = rag.ingest(&documents).await?;
            println!("Ingested {} documents into {}", stored, config.collection_name);
        }
        Commands::Ask {
            question,
            retrieval,
        } => {
            let options = retrieval.options(rag.defaults());
            let answer = rag.answer_with(&question, &options).await?;
            println!("\n{}\n", answer.text);
            print_sources(&answer.context);
            println!("{}", QueryLog::from_answer(&answer, options.top_k).summary());
        }
        Commands::Search {
            question,
            retrieval,
        } => {
            let hits = rag
                .search(&question, &retrieval.options(rag.defaults()))
                .await?;
            if hits.is_empty() {
                println!("No relevant documents found.");
            }
            print_sources(&hits);
        }
        Commands::Interactive { retrieval } => {
            interactive(&rag, retrieval.options(rag.defaults())).await?;
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.service_host.clone());
            let port = port.unwrap_or(config.service_port);
            let state = AppState::new(Arc::new(rag), &config);
            server::serve(state, &host, port).await?;
        }
        Commands::Stats => {
            let stats = rag.stats().await?;
            println!("Collection: {}", stats.name);
            println!("  Points: {}", stats.points_count);
            println!("  Status: {}", stats.status);
            if let Some(dim) = stats.dimension {
                println!("  Dimension: {}", dim);
            }
        }
        Commands::Eval { path } => eval(&rag, &path).await?,
    }

    Ok(())
}

fn print_sources(hits: &[ScoredDocument]) {
    for (i, hit) in hits.iter().enumerate() {
        let meta = &hit.document.metadata;
        println!("{}. {} (score: {:.3})", i + 1, hit.document.label(), hit.score);
        if let Some(chapter) = &meta.chapter_title {
            println!("   Chapter {}: {}", meta.chapter_number.as_deref().unwrap_or("?"), chapter);
        }
        if !meta.key_terms.is_empty() {
            println!("   Key terms: {}", meta.key_terms.join(", "));
        }
    }
}

async fn interactive(rag: &Rag, options: AskOptions) -> Result<()> {
    println!("Ask a question. Commands: 'stats' for collection statistics, 'exit' to quit.");
    let stdin = std::io::stdin();

    loop {
        print!("\n> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("Failed to read input")? == 0 {
            break;
        }
        let input = line.trim();

        match input.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => break,
            "stats" => {
                match rag.stats().await {
                    Ok(stats) => println!("{}: {} points ({})", stats.name, stats.points_count, stats.status),
                    Err(e) => eprintln!("ERROR: {}", e),
                }
                continue;
            }
            _ => {}
        }

        if rag.generator_available() {
            match rag.answer_with(input, &options).await {
                Ok(answer) => {
                    println!("\n{}\n", answer.text);
                    print_sources(&answer.context);
                }
                Err(e) => eprintln!("ERROR ({}): {}", e.stage(), e),
            }
        } else {
            match rag.search(input, &options).await {
                Ok(hits) if hits.is_empty() => println!("No relevant documents found."),
                Ok(hits) => {
                    println!("\n{}\n", hits[0].document.content);
                    print_sources(&hits);
                }
                Err(e) => eprintln!("ERROR ({}): {}", e.stage(), e),
            }
        }
    }

    Ok(())
}

async fn eval(rag: &Rag, path: &Path) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open eval file: {}", path.display()))?;
    let reader = std::io::BufReader::new(file);

    let mut logs: Vec<QueryLog> = Vec::new();
    let mut errors = 0;
    let mut graded = 0;
    let mut correct = 0;

    for (i, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }

        let eq: EvalQuestion =
            serde_json::from_str(&line).with_context(|| format!("Failed to parse line {}", i + 1))?;

        eprintln!("\n[{}] {}", i + 1, eq.question);

        match rag.answer(&eq.question).await {
            Ok(answer) => {
                if let Some(expected) = &eq.expected_answer {
                    graded += 1;
                    if answer.text.to_lowercase().contains(&expected.to_lowercase()) {
                        correct += 1;
                    }
                }
                let log = QueryLog::from_answer(&answer, rag.defaults().top_k);
                println!("  {}", log.summary());
                logs.push(log);
            }
            Err(e) => {
                eprintln!("  ERROR ({}): {}", e.stage(), e);
                errors += 1;
            }
        }
    }

    if !logs.is_empty() {
        println!("\n=== Evaluation Summary ===");
        println!("Questions: {} (errors: {})", logs.len(), errors);
        if graded > 0 {
            println!("Expected answer found: {}/{}", correct, graded);
        }

        let avg_latency =
            logs.iter().map(|l| l.total_latency_ms).sum::<u64>() as f64 / logs.len() as f64;
        let avg_results =
            logs.iter().map(|l| l.num_results as usize).sum::<usize>() as f64 / logs.len() as f64;
        let total_tokens: u32 = logs.iter().map(|l| l.total_tokens()).sum();
        let total_cost: f64 = logs.iter().map(|l| l.cost).sum();

        println!("Avg results: {:.1}", avg_results);
        println!("Avg latency: {:.1}s", avg_latency / 1000.0);
        println!("Total tokens: {}", total_tokens);
        println!("Total cost: ${:.4}", total_cost);
    }

    Ok(())
}

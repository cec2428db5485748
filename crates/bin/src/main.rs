//! Yuho CLI binary.
//!
//! Answers questions about periodic reports filed on EDINET by printing the
//! extracted report text for a downstream summarizer.

mod integration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use integration::cache_manager::{open_cache, print_cache_info};
use integration::code_list::load_directory;
use std::io::BufRead;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use yuho::data::FilingRegistry;
use yuho::data::edinet::EdinetClient;
use yuho::{EntityDirectory, ReportQa, SectionVocabulary, Settings, Turn};

#[derive(Parser)]
#[command(name = "yuho")]
#[command(about = "Yuho: question answering over EDINET periodic reports", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about a company's report
    Ask {
        /// Question, e.g. "トヨタの2024年3月期の事業等のリスク"
        question: String,

        /// Force refresh cached filings
        #[arg(long)]
        refresh: bool,

        /// Print the answer as JSON instead of the rendered context
        #[arg(long)]
        json: bool,
    },

    /// Answer questions read line by line from stdin as one conversation
    Chat {
        /// Force refresh cached filings
        #[arg(long)]
        refresh: bool,
    },

    /// List the report sections that can be asked about
    Sections,

    /// Show the issuers matching a company name or code
    Resolve {
        /// Company name, filer code or securities code
        mention: String,
    },

    /// Inspect or clear the filing cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache location and entries
    Info,
    /// Delete every cached filing
    Clear,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Ask {
            question,
            refresh,
            json,
        } => {
            ask(&question, refresh, json, settings).await?;
        }
        Commands::Chat { refresh } => {
            chat(refresh, settings).await?;
        }
        Commands::Sections => list_sections(),
        Commands::Resolve { mention } => {
            let client = EdinetClient::new(settings.api_key.clone())?;
            let directory = load_with_spinner(&settings, &client).await?;
            print_candidates(&directory, &mention);
        }
        Commands::Cache { action } => {
            let cache = open_cache(&settings)?;
            match action {
                CacheAction::Info => {
                    println!("Filing cache:");
                    print_cache_info(&cache)?;
                }
                CacheAction::Clear => {
                    let removed = cache.clear()?;
                    println!("Removed {} cached filing(s) from {}", removed, cache.dir().display());
                }
            }
        }
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

async fn load_with_spinner(
    settings: &Settings,
    client: &EdinetClient,
) -> Result<EntityDirectory, Box<dyn std::error::Error>> {
    let pb = spinner("Loading EDINET code list...");
    match load_directory(settings, client).await {
        Ok(directory) => {
            pb.finish_with_message(format!("Loaded {} issuers", directory.len()));
            Ok(directory)
        }
        Err(e) => {
            pb.finish_with_message("Failed to load code list");
            Err(e.into())
        }
    }
}

async fn build_service(settings: Settings) -> Result<ReportQa, Box<dyn std::error::Error>> {
    if settings.api_key.is_none() {
        log::warn!("EDINET_API_KEY is not set; document searches will be rejected by EDINET");
    }
    let client = Arc::new(EdinetClient::new(settings.api_key.clone())?);
    let directory = Arc::new(load_with_spinner(&settings, &client).await?);
    let registry: Arc<dyn FilingRegistry> = client;
    Ok(ReportQa::builder(directory, registry, settings).build()?)
}

async fn ask(
    question: &str,
    refresh: bool,
    json: bool,
    settings: Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let qa = build_service(settings).await?;

    let pb = spinner("Fetching filings...");
    let answer = qa.answer_question(question, refresh).await;
    pb.finish_and_clear();
    let answer = answer?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}", qa.render(question, &answer));
    }
    Ok(())
}

async fn chat(refresh: bool, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let qa = build_service(settings).await?;
    let mut history: Vec<Turn> = Vec::new();

    for line in std::io::stdin().lock().lines() {
        let question = line?;
        let question = question.trim();
        if question.is_empty() {
            continue;
        }

        let answer = qa
            .answer_in_conversation(question, &history, refresh)
            .await?;
        let rendered = qa.render(question, &answer);
        println!("{}\n", rendered);

        history.push(Turn::user(question));
        history.push(Turn::assistant(rendered));
    }
    Ok(())
}

fn list_sections() {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║{:^62}║", "SECURITIES REPORT SECTIONS");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    for def in SectionVocabulary::standard().all() {
        println!("  {:<6} {:<24} {:?}", def.id, def.title, def.code);
        if !def.aliases.is_empty() {
            println!("         aliases: {}", def.aliases.join(", "));
        }
    }
}

fn print_candidates(directory: &EntityDirectory, mention: &str) {
    let candidates = directory.rank(mention);
    if candidates.is_empty() {
        println!("No issuer matches {:?}", mention);
        return;
    }
    println!("{} issuer(s) match {:?}:", candidates.len(), mention);
    for candidate in candidates {
        let fye = candidate
            .issuer
            .fiscal_year_end_month
            .map_or_else(|| "-".to_string(), |m| format!("{}月", m));
        println!(
            "  {:<40} FYE {:<4} {:?}",
            candidate.issuer.to_string(),
            fye,
            candidate.kind
        );
    }
}

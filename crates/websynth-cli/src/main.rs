use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use websynth_core::{Depth, DomainHint, SourceAdapter};
use websynth_local::config::{Config, Services};
use websynth_local::format_output::{shape, ShapeOptions};
use websynth_local::llm::domain_instruction;
use websynth_local::pipeline::{Mode, Pipeline, PipelineOpts, SubQuery};

#[derive(Parser)]
#[command(name = "websynth", version, about = "Federated search and synthesis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, ValueEnum)]
enum DepthArg {
    Fast,
    Default,
    Deep,
}

impl From<DepthArg> for Depth {
    fn from(d: DepthArg) -> Self {
        match d {
            DepthArg::Fast => Depth::Fast,
            DepthArg::Default => Depth::Default,
            DepthArg::Deep => Depth::Deep,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// General web search and synthesis.
    Search {
        query: String,
        #[arg(long, value_enum, default_value = "default")]
        depth: DepthArg,
        #[arg(long)]
        json: bool,
    },
    /// Job postings search.
    Jobs {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Remote-work search.
    Remote {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Freelance gig search.
    Freelance {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Code / library search (GitHub code search + library docs).
    Code {
        query: String,
        #[arg(long)]
        json: bool,
    },
}

/// Restricts the adapter set per specialized subcommand, per spec.md §1's
/// "reuse the same pipeline with different source sets". `search` keeps the
/// full set built by [`Services::build`]; the specialized variants narrow it
/// to the adapters relevant to that domain.
fn adapters_for(command: &Command, all: &[Arc<dyn SourceAdapter>]) -> Vec<Arc<dyn SourceAdapter>> {
    let keep: Option<&[&str]> = match command {
        Command::Search { .. } => None,
        Command::Jobs { .. } | Command::Remote { .. } | Command::Freelance { .. } => {
            Some(&["searxng", "job_board"])
        }
        Command::Code { .. } => Some(&["searxng", "github_code", "huggingface"]),
    };
    match keep {
        None => all.to_vec(),
        Some(ids) => all
            .iter()
            .filter(|a| ids.contains(&a.id()))
            .cloned()
            .collect(),
    }
}

/// Direct scrapers (DuckDuckGo/Startpage) are general web search engines;
/// only the unrestricted `search` subcommand merges them in.
fn direct_scrapers_for(command: &Command, all: &[Arc<dyn SourceAdapter>]) -> Vec<Arc<dyn SourceAdapter>> {
    match command {
        Command::Search { .. } => all.to_vec(),
        _ => Vec::new(),
    }
}

fn domain_hint_for(command: &Command) -> DomainHint {
    match command {
        Command::Search { .. } => DomainHint::General,
        Command::Jobs { .. } => DomainHint::Jobs,
        Command::Remote { .. } => DomainHint::RemoteWork,
        Command::Freelance { .. } => DomainHint::Freelance,
        Command::Code { .. } => DomainHint::CodeHostingRepo,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let services = Services::build(config).await?;

    let (query, depth, json) = match &cli.command {
        Command::Search { query, depth, json } => (query.clone(), (*depth).into(), *json),
        Command::Jobs { query, json } => (query.clone(), Depth::Default, *json),
        Command::Remote { query, json } => (query.clone(), Depth::Default, *json),
        Command::Freelance { query, json } => (query.clone(), Depth::Default, *json),
        Command::Code { query, json } => (query.clone(), Depth::Default, *json),
    };

    let adapters = adapters_for(&cli.command, &services.adapters);
    let direct_scrapers = direct_scrapers_for(&cli.command, &services.direct_scrapers);
    let instruction = domain_instruction(domain_hint_for(&cli.command)).map(str::to_string);

    let pipeline = Pipeline::new(
        adapters,
        direct_scrapers,
        Arc::clone(&services.standard_fetcher),
        services.llm.clone(),
    );

    let opts = PipelineOpts {
        queries: vec![SubQuery {
            text: query.clone(),
            engines: None,
        }],
        depth,
        mode: Mode::Summary,
        instruction,
        max_fetch_urls: services.config.max_fetch_urls,
        content_limit: services.config.max_content_chars,
        url_rewriter: Some(Arc::new(websynth_local::rewrite::best_rewrite_candidate)),
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let record = pipeline.run(&query, &opts, &cancel).await?;
    let shaped = shape(&record, &ShapeOptions::default());

    if json {
        println!("{}", serde_json::to_string_pretty(&shaped)?);
    } else {
        println!("{}", shaped.answer);
        for fact in &shaped.facts {
            println!("- {}", fact.point);
        }
        println!();
        for source in &shaped.sources {
            println!("[{}] {} — {}", source.index, source.title, source.url);
        }
    }

    Ok(())
}

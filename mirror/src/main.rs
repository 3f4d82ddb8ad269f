use clap::{Parser, Subcommand};
use history::{Entity, WikiSnapshot};
use mirror::{inspect, server, BatchInitializer, MirrorConfig, SyncCoordinator, TransportGate};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "wikigit")]
#[command(about = "Replicate wiki page histories into git repositories")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, default_value = "wikigit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replicate the new revisions of one page
    Sync {
        /// Wiki snapshot (JSON)
        #[arg(short, long)]
        wiki: PathBuf,
        /// Page title
        title: String,
    },
    /// Replicate every page of the wiki
    Init {
        /// Wiki snapshot (JSON)
        #[arg(short, long)]
        wiki: PathBuf,
        /// Skip pages up to and including this key
        #[arg(long)]
        resume_after: Option<String>,
    },
    /// Print the replicated history of one page
    Log {
        /// Page title
        title: String,
    },
    /// Run the push authorization gate
    Serve {
        /// Wiki snapshot (JSON)
        #[arg(short, long)]
        wiki: PathBuf,
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = MirrorConfig::load(&cli.config)?;

    match cli.command {
        Commands::Sync { wiki, title } => sync(config, &wiki, &title).await?,
        Commands::Init { wiki, resume_after } => init(config, &wiki, resume_after).await?,
        Commands::Log { title } => log(&config, &title)?,
        Commands::Serve { wiki, listen } => serve(&wiki, listen).await?,
    }

    Ok(())
}

async fn sync(
    config: MirrorConfig,
    wiki: &Path,
    title: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let wiki = Arc::new(WikiSnapshot::load(wiki)?.into_wiki()?);
    let coordinator = SyncCoordinator::with_process_runner(config, wiki)?;

    let report = coordinator.sync(&Entity::new(title)).await?;
    match report.watermark {
        Some(watermark) => println!(
            "{}: {} new commit(s), watermark {}",
            report.entity, report.committed, watermark
        ),
        None => println!("{}: nothing to replicate", report.entity),
    }
    Ok(())
}

async fn init(
    config: MirrorConfig,
    wiki: &Path,
    resume_after: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let wiki = Arc::new(WikiSnapshot::load(wiki)?.into_wiki()?);
    let coordinator = Arc::new(SyncCoordinator::with_process_runner(config, wiki.clone())?);
    let initializer = BatchInitializer::new(coordinator, wiki);

    let report = initializer.run(resume_after.map(Entity::from_key)).await?;
    println!(
        "{} page(s) processed, {} commit(s), {} failure(s)",
        report.processed,
        report.committed,
        report.failures.len()
    );
    for failure in &report.failures {
        error!(entity = %failure.entity, "{}", failure.error);
    }
    if let Some(last) = &report.last {
        info!(last = %last, "Resume with --resume-after {}", last);
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} page(s) failed", report.failures.len()).into())
    }
}

fn log(config: &MirrorConfig, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let layout = config.layout(&Entity::new(title))?;
    for commit in inspect::read_history(&layout.git_dir, &config.branch)? {
        println!(
            "{} {} {} <{}> {}",
            &commit.sha[..10],
            commit.author_time.to_rfc3339(),
            commit.author_name,
            commit.author_email,
            commit.message.lines().next().unwrap_or_default()
        );
    }
    if let Some(watermark) = inspect::read_config_value(&layout.git_dir, &layout.watermark_key)? {
        println!("watermark: {}", watermark);
    }
    Ok(())
}

async fn serve(wiki: &Path, listen: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let wiki = Arc::new(WikiSnapshot::load(wiki)?.into_wiki()?);
    let gate = TransportGate::new(wiki.clone(), wiki);
    server::serve(listen, gate).await?;
    Ok(())
}

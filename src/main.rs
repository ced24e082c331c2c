//! Process entry point: parses CLI arguments, opens or creates the
//! project, and serves it (SPEC_FULL.md §6). The desktop GUI and
//! interactive shell named in §1's non-goals are not implemented here;
//! this binary only drives the replay server.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::IntoDiagnostic;

use crystal_config::Config;
use crystal_model::Project;
use crystal_net::{ClientConfig, Downloader};
use crystal_scheduler::executor::{DefaultExecutor, NoLinks};
use crystal_scheduler::Scheduler;

/// How many consecutive ports to try after the configured one before
/// giving up (SPEC_FULL.md §6: bind falls forward to the next free
/// port rather than failing outright).
const MAX_PORT_FALLBACK_ATTEMPTS: u16 = 50;

#[derive(Debug, Parser)]
#[command(author, version, about = "Archive and replay websites", long_about = None)]
struct Cli {
    /// Path to the project directory. Created if it does not exist.
    project_path: PathBuf,

    /// Address to bind the replay server to.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the replay server to; falls forward to the next
    /// free port if this one is taken.
    #[arg(long)]
    port: Option<u16>,

    /// Force the project open read-only regardless of bind host.
    #[arg(long)]
    readonly: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.project_path).into_diagnostic()?;
    if let Some(host) = &cli.host {
        config.bind_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.bind_port = port;
    }
    if cli.readonly {
        config.readonly = Some(true);
    }
    let readonly = config.effective_readonly();

    let project = if cli.project_path.join("database.sqlite").exists() {
        Project::open(&cli.project_path, readonly).await.into_diagnostic()?
    } else {
        if readonly {
            miette::bail!("{} does not exist and cannot be created read-only", cli.project_path.display());
        }
        Project::create(&cli.project_path).await.into_diagnostic()?
    };
    let project = Arc::new(project);

    let client_config = ClientConfig {
        user_agent: config.user_agent.clone(),
        header_timeout: std::time::Duration::from_secs(config.http_timeout_secs),
        proxy: None,
    };
    let downloader = Arc::new(Downloader::new(&client_config).into_diagnostic()?);
    let executor = Arc::new(DefaultExecutor::new(project.clone(), downloader, Arc::new(NoLinks)));
    let politeness = crystal_scheduler::Politeness::new(std::time::Duration::from_millis(config.politeness_delay_ms));
    let scheduler = Arc::new(Scheduler::with_politeness(executor, politeness));

    if !readonly {
        restore_hibernated_work(&project, &scheduler).await?;
    }

    let scheduler_handle = scheduler.clone();
    tokio::spawn(async move { scheduler_handle.run().await });

    let (listener, bound_addr) = bind_with_fallback(&config.bind_host, config.bind_port).await?;
    tracing::info!(addr = %bound_addr, readonly, "crystal listening");

    let state = crystal_server::AppState::new(project.clone(), scheduler.clone(), bound_addr.to_string());
    crystal_server::serve(state, listener).await.into_diagnostic()?;

    if !readonly {
        hibernate_incomplete_work(&project, &scheduler).await?;
    }
    Ok(())
}

/// Restores whatever top-level downloads were still in flight when the
/// project was last closed (SPEC_FULL.md §4.6 Hibernation), before the
/// scheduler starts dispatching.
async fn restore_hibernated_work(project: &Arc<Project>, scheduler: &Arc<Scheduler>) -> miette::Result<()> {
    let Some(encoded) = project.take_hibernate_snapshot().await.into_diagnostic()? else {
        return Ok(());
    };
    match crystal_scheduler::hibernate::decode(&encoded) {
        Ok(snapshot) => {
            tracing::info!(entries = snapshot.entries.len(), "restoring hibernated downloads");
            crystal_scheduler::hibernate::restore(scheduler.root(), snapshot);
        }
        Err(err) => tracing::warn!(error = %err, "discarding malformed hibernation snapshot"),
    }
    Ok(())
}

/// On a clean shutdown with incomplete work, serializes the scheduler's
/// remaining top-level tasks so the next open can resume them
/// (SPEC_FULL.md §4.6 Hibernation).
async fn hibernate_incomplete_work(project: &Arc<Project>, scheduler: &Arc<Scheduler>) -> miette::Result<()> {
    scheduler.cancel_all();

    let repo = project.repository();
    let mut last_downloaded = std::collections::HashMap::new();
    for group in repo.list_groups().await.into_diagnostic()? {
        last_downloaded.insert(group.id, group.last_downloaded_member_id);
    }

    let snapshot = crystal_scheduler::hibernate::snapshot(scheduler.root(), |group_id| {
        last_downloaded.get(&group_id).copied().flatten()
    });
    if snapshot.entries.is_empty() {
        return Ok(());
    }

    tracing::info!(entries = snapshot.entries.len(), "hibernating incomplete downloads");
    let encoded = crystal_scheduler::hibernate::encode(&snapshot).into_diagnostic()?;
    project.save_hibernate_snapshot(&encoded).await.into_diagnostic()?;
    Ok(())
}

async fn bind_with_fallback(host: &str, starting_port: u16) -> miette::Result<(tokio::net::TcpListener, SocketAddr)> {
    let ip: IpAddr = host.parse().into_diagnostic()?;
    for offset in 0..=MAX_PORT_FALLBACK_ATTEMPTS {
        let addr = SocketAddr::new(ip, starting_port.saturating_add(offset));
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => return Ok((listener, addr)),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(e).into_diagnostic(),
        }
    }
    miette::bail!("no free port found starting at {host}:{starting_port}")
}

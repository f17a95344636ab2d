//! ldap-fixture runner
//!
//! Serves a throwaway LDAP directory until interrupted, for poking at the
//! fixture with ordinary LDAP tools:
//!
//!   ldap-fixture --port 10389
//!   ldapsearch -x -H ldap://localhost:10389 -b dc=liftweb,dc=net
//!
//! The working directory is deleted on exit.

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::Parser;
use ldap_fixture_server::{EmbeddedDirectory, FixtureConfig, ADMIN_DN};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "ldap-fixture")]
#[command(about = "Disposable embedded LDAP directory")]
struct Args {
    /// Port to listen on, 0 for any free port [default: 10389]
    #[arg(short, long)]
    port: Option<u16>,

    /// Root DN served by the directory [default: dc=liftweb,dc=net]
    #[arg(short, long)]
    root_dn: Option<String>,

    /// Working directory, wiped on start and deleted on exit
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Refuse anonymous binds and reads
    #[arg(long)]
    no_anonymous: bool,

    /// Keep an in-memory log of every write
    #[arg(long)]
    changelog: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let config = build_config(&args)?;
    let port = config.port;
    let root_dn = config.root_dn.clone();
    let directory = EmbeddedDirectory::with_config(config);
    let addr = directory
        .init_server(port)
        .await
        .context("failed to start the directory")?;

    println!("\n========================================");
    println!("  ldap-fixture Running");
    println!("========================================");
    println!("  URL:       ldap://localhost:{}", addr.port());
    println!("  Root DN:   {}", root_dn);
    println!("  Admin:     {}", ADMIN_DN);
    println!("  Work dir:  {}", directory.work_dir().path().display());
    println!("========================================\n");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutting down...");
    directory
        .stop_server()
        .await
        .context("failed to stop the directory")?;
    Ok(())
}

/// Configuration file (or defaults) with command-line overrides applied.
fn build_config(args: &Args) -> Result<FixtureConfig> {
    let mut config = match &args.config {
        Some(path) => FixtureConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => FixtureConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(root_dn) = &args.root_dn {
        config.root_dn = root_dn.clone();
    }
    if let Some(work_dir) = &args.work_dir {
        config.work_dir = Some(work_dir.clone());
    }
    if args.no_anonymous {
        config.allow_anonymous_access = false;
    }
    if args.changelog {
        config.changelog_enabled = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

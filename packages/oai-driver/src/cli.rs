//! Command-line interface for the driver.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Properties;
use crate::driver::FedoraOaiDriver;
use crate::error::Result;
use crate::provider::OaiDriver;

/// Fedora OAI Driver - Query a Fedora repository the way an OAI provider would.
#[derive(Parser)]
#[command(name = "fedora-oai-driver")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Driver properties file
    #[arg(short, long, default_value = "proai.properties")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the repository's Identify document.
    Identify,

    /// Print the timestamp of the most recently changed record.
    LatestDate,

    /// List the configured metadata formats.
    Formats,

    /// List the repository's sets.
    Sets,
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let driver = init_driver(&cli.config)?;

    let result = match cli.command {
        Commands::Identify => identify_command(&driver),
        Commands::LatestDate => latest_date_command(&driver),
        Commands::Formats => formats_command(&driver),
        Commands::Sets => sets_command(&driver),
    };

    driver.close()?;
    result
}

fn init_driver(config: &Path) -> Result<FedoraOaiDriver> {
    let props = Properties::load(config)?;
    FedoraOaiDriver::init(&props)
}

/// Run `f` behind a spinner on stderr.
fn with_spinner<T>(message: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = f();
    pb.finish_and_clear();
    result
}

fn identify_command(driver: &FedoraOaiDriver) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    driver.write_identify(&mut out)?;
    out.flush()?;
    Ok(())
}

fn latest_date_command(driver: &FedoraOaiDriver) -> Result<()> {
    let latest = with_spinner("Querying latest change date...", || driver.latest_date())?;
    println!(
        "{} {}",
        style("Latest change:").bold(),
        style(latest.format("%Y-%m-%dT%H:%M:%S%.3fZ")).green()
    );
    Ok(())
}

fn formats_command(driver: &FedoraOaiDriver) -> Result<()> {
    for format in driver.list_metadata_formats()? {
        println!("{}", style(&format.prefix).cyan().bold());
        println!("  Namespace: {}", format.namespace_uri);
        println!("  Schema: {}", format.schema_location);
        println!("  Dissemination: {}", format.dissemination_type);
    }
    Ok(())
}

fn sets_command(driver: &FedoraOaiDriver) -> Result<()> {
    let sets = with_spinner("Querying sets...", || driver.list_set_info())?;

    for set in &sets {
        match &set.dissemination {
            Some(diss) => println!(
                "{} -> {} -> {}",
                style(&set.spec).cyan(),
                set.name,
                style(diss).dim()
            ),
            None => println!("{} -> {}", style(&set.spec).cyan(), set.name),
        }
    }
    println!();
    println!("{} {}", style("Sets:").bold(), sets.len());
    Ok(())
}

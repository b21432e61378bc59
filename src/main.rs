pub mod config;
pub mod data;
pub mod join;
pub mod render;
pub mod server;
pub mod states;
pub mod types;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use types::{JoinedCounties, School};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the population density vs school locations map for a state
    Generate {
        /// Two letter state abbreviation; prompts interactively when omitted
        #[arg(short, long)]
        state: Option<String>,
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the generated maps and a point-in-county density lookup API
    Serve {
        /// Two letter state abbreviation; prompts interactively when omitted
        #[arg(short, long)]
        state: Option<String>,
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { state, config } => {
            let app_config = config::AppConfig::load_or_default(config)?;
            let state = resolve_state(state)?;

            let (joined, schools) = load_and_join(&app_config, &state).await?;
            let path = render::render_map(&app_config.render, &state, &joined, &schools)?;

            if let Err(e) = open::that(&path) {
                tracing::warn!("Could not open {:?} in a viewer: {}", path, e);
            }
        }
        Commands::Serve { state, config } => {
            let app_config = config::AppConfig::load_or_default(config)?;
            let state = resolve_state(state)?;

            let (joined, schools) = load_and_join(&app_config, &state).await?;
            server::start_server(app_config, joined, schools).await?;
        }
    }

    Ok(())
}

/// Take the state code from the CLI argument, or fall back to the
/// interactive re-prompt loop on stdin.
fn resolve_state(arg: &Option<String>) -> Result<String> {
    match arg {
        Some(code) => states::validate_state(code),
        None => {
            let stdin = io::stdin();
            states::prompt_state(&mut stdin.lock(), &mut io::stdout())
        }
    }
}

/// Run the full pipeline up to (but not including) rendering: load the
/// two tables, fetch the boundary collection, and join.
async fn load_and_join(
    config: &config::AppConfig,
    state: &str,
) -> Result<(JoinedCounties, Vec<School>)> {
    let schools = data::load_schools(&config.input.schools_csv, state)?;
    println!("Loaded {} schools in {}", schools.len(), state);

    let population = data::load_population(&config.input.population_csv(state))?;
    println!("Loaded {} population rows", population.len());

    let counties = data::fetch_counties(&config.input.counties_url).await?;

    let range = states::fips_range(state)
        .ok_or_else(|| anyhow!("No FIPS bounds for state {}", state))?;
    let joined = join::join_counties(&counties, &population, range);
    println!("Joined {} counties for {}", joined.len(), state);

    Ok((joined, schools))
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use impactscope::{
    config::ServiceConfig, logging, web, ImpactMedium, ImpactParameters, ImpactService,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Asteroid impact radii and population exposure")]
struct Cli {
    /// Path to a YAML service configuration (built-in defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// GeoNames account used by the place-directory provider
    #[arg(long, global = true, env = "GEONAMES_USER")]
    geonames_user: Option<String>,

    /// NASA API key for the NEO endpoints
    #[arg(long, global = true, env = "NASA_KEY", hide_env_values = true)]
    nasa_key: Option<String>,

    /// Log level when RUST_LOG is not set (overrides the configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Damage radii and energy for an impactor
    Radii(ImpactArgs),
    /// Population within the given radii of a point
    Exposure {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Radius in km; repeat for several radii
        #[arg(long = "radius", required = true)]
        radii: Vec<f64>,
        #[arg(long)]
        year: Option<u16>,
    },
    /// Damage radii plus the population exposed to them
    Assess {
        #[command(flatten)]
        impact: ImpactArgs,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long)]
        year: Option<u16>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Args)]
struct ImpactArgs {
    /// Impactor diameter in meters
    #[arg(long)]
    diameter_m: f64,
    /// Entry speed in km/s
    #[arg(long)]
    speed_kms: f64,
    /// Entry angle from the horizontal, degrees
    #[arg(long, default_value_t = 45.0)]
    angle_deg: f64,
    /// ground, airburst or water
    #[arg(long, default_value = "ground")]
    medium: ImpactMedium,
}

impl ImpactArgs {
    fn params(&self) -> ImpactParameters {
        ImpactParameters::new(self.diameter_m, self.speed_kms, self.angle_deg, self.medium)
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ServiceConfig::default(),
    }
    .with_credentials(cli.geonames_user.clone(), cli.nasa_key.clone());

    logging::init(cli.log_level.as_deref().unwrap_or(&config.logging.level));

    match cli.command {
        Command::Radii(impact) => {
            let service = ImpactService::from_config(&config)?;
            print_json(&service.compute_damage_radii(&impact.params())?)
        }
        Command::Exposure {
            lat,
            lng,
            radii,
            year,
        } => {
            let service = ImpactService::from_config(&config)?;
            print_json(&service.estimate_exposure(lat, lng, &radii, year).await?)
        }
        Command::Assess {
            impact,
            lat,
            lng,
            year,
        } => {
            let service = ImpactService::from_config(&config)?;
            print_json(&service.assess(&impact.params(), lat, lng, year).await?)
        }
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            web::run(config).await
        }
    }
}

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wb_components::{
    config::SystemConfig, factory::Definition, fetch::{DocumentFetcher, FsFetcher, HttpFetcher}, system::System, CreateOptions,
    Error, FactoryError, InternalResult,
};

#[derive(Parser)]
#[command(author, version, about = "Render a component definition", long_about = None)]
struct Cli {
    /// Path to the definition JSON
    definition: PathBuf,

    /// Instance data merged over the definition defaults, as JSON
    #[arg(short, long)]
    data: Option<String>,

    /// State applied after creation
    #[arg(short, long)]
    state: Option<String>,

    /// Variant class key
    #[arg(long)]
    variant: Option<String>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory absolute dependency paths are served from
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Fetch dependency definitions over HTTP from this URL instead of `--root`
    #[arg(long)]
    base_url: Option<String>,

    /// Also print the scoped stylesheet
    #[arg(long)]
    css: bool,
}

async fn run(cli: &Cli) -> InternalResult<()> {
    let config = match &cli.config {
        Some(path) => SystemConfig::from_file(path)?,
        None => SystemConfig::default(),
    };
    debug!("config: {:?}", config);

    let text = std::fs::read_to_string(&cli.definition).map_err(|e| {
        Error::internal(format!(
            "Failed to read definition {}: {}",
            cli.definition.display(),
            e
        ))
    })?;
    let definition = Definition::from_json(&text)?;
    let name = definition.name.clone();

    let base = cli
        .definition
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| cli.root.clone());
    let fetcher: Arc<dyn DocumentFetcher> = match &cli.base_url {
        Some(url) => {
            debug!("Fetching dependencies from {}", url);
            Arc::new(HttpFetcher::new(url.clone()))
        }
        None => Arc::new(FsFetcher::new(cli.root.clone()).with_base(base)),
    };
    let system = System::new(&config, fetcher);
    system.factory().register_definition(definition);
    info!("Definition {} loaded", name);

    let data = match &cli.data {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| Error::internal(format!("Invalid --data JSON: {}", e)))?,
        None => serde_json::Value::Null,
    };
    let mut options = CreateOptions::with_data(data);
    if let Some(variant) = &cli.variant {
        options = options.variant(variant);
    }

    let instance = system
        .factory()
        .create(&name, options)
        .await
        .ok_or(FactoryError::DefinitionNotFound { name })?;
    if let Some(state) = &cli.state {
        instance.set_state(state);
    }

    println!("{}", instance.outer_html());
    if cli.css {
        if let Some(css) = instance.stylesheet() {
            println!();
            print!("{}", css);
        }
    }

    instance.destroy();
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

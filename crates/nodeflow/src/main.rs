mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nodeflow")]
#[command(about = "Provision and decommission cloud nodes from declarative templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configuration and summarize it
    Validate,
    /// List the templates of a class
    Templates {
        /// Template class (node, dns)
        #[arg(default_value = "node")]
        class: String,
    },
    /// Resolve a template against the configuration and print it
    Expand {
        /// Template class (node, dns)
        class: String,
        /// Template name
        name: String,
        /// Parameters (key=value)
        #[arg(short = 'p', long = "param", value_parser = commands::parse_param)]
        params: Vec<(String, String)>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate => commands::validate::handle()?,
        Commands::Templates { class } => commands::templates::handle(&class).await?,
        Commands::Expand {
            class,
            name,
            params,
        } => commands::expand::handle(&class, &name, params).await?,
        Commands::Version => {
            println!("nodeflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

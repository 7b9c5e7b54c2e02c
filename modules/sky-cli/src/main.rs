//! `sky`: command-line access to a Sky server.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sky_client::{ClientConfig, DataType, Property, SkyClient, Table};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

mod import;

#[derive(Parser)]
#[command(name = "sky")]
#[command(about = "Sky event store client")]
#[command(version)]
struct Cli {
    /// Server host (overrides SKY_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port (overrides SKY_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is up
    Ping,

    /// List tables
    Tables,

    /// Create a table
    CreateTable { name: String },

    /// Delete a table and all of its data
    DropTable { name: String },

    /// List a table's properties
    Properties { table: String },

    /// Add a property to a table's schema
    CreateProperty {
        table: String,
        name: String,
        /// string, integer, float, boolean or factor
        data_type: DataType,
        #[arg(long)]
        transient: bool,
    },

    /// Remove a property from a table's schema
    DropProperty { table: String, name: String },

    /// Print an object's events as JSON lines
    Events { table: String, object_id: String },

    /// Stream JSON-lines events into a table
    Import {
        table: String,
        /// Read from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show object count for a table
    Stats { table: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::from_default_env()
        .add_directive("sky=info".parse().expect("static directive"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    let client = SkyClient::from_config(config)?;

    match cli.command {
        Commands::Ping => {
            if !client.ping().await {
                bail!("{} is not responding", client.config().base_url());
            }
            println!("ok");
        }
        Commands::Tables => {
            for table in client.get_tables().await? {
                println!("{}", table.name);
            }
        }
        Commands::CreateTable { name } => {
            client.create_table(&Table::new(name)).await?;
        }
        Commands::DropTable { name } => {
            client.delete_table(&name).await?;
        }
        Commands::Properties { table } => {
            for p in client.table(table).get_properties().await? {
                let kind = if p.transient { "transient" } else { "permanent" };
                println!("{}\t{}\t{}\t{}", p.id, p.name, p.data_type, kind);
            }
        }
        Commands::CreateProperty {
            table,
            name,
            data_type,
            transient,
        } => {
            let created = client
                .table(table)
                .create_property(&Property::new(name, transient, data_type))
                .await?;
            println!("{}", created.id);
        }
        Commands::DropProperty { table, name } => {
            client.table(table).delete_property(&name).await?;
        }
        Commands::Events { table, object_id } => {
            for event in client.table(table).get_events(&object_id).await? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Commands::Import { table, file } => {
            let table = client.table(table);
            let count = match file {
                Some(path) => {
                    let file = tokio::fs::File::open(&path).await?;
                    import::import(&table, BufReader::new(file)).await?
                }
                None => import::import(&table, BufReader::new(tokio::io::stdin())).await?,
            };
            println!("{count} events imported");
        }
        Commands::Stats { table } => {
            let count = client
                .table(table)
                .stats()
                .await?
                .map(|s| s.count)
                .unwrap_or_default();
            println!("{count}");
        }
    }

    Ok(())
}

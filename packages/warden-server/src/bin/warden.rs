//! Operator CLI for inspecting the effective authorization configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use warden_core::{QueryDescriptor, TableRef, TenantId};
use warden_server::isolation::TenantPredicateInjector;
use warden_server::service::ServerConfig;
use warden_server::telemetry::{init_tracing, LogFormat};

/// Warden - multi-tenant request authorization
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the tenant column
    #[arg(long, global = true, env = "WARDEN_TENANT_COLUMN")]
    tenant_column: Option<String>,

    /// Override the sentinel tenant used when none is resolved
    #[arg(long, global = true, env = "WARDEN_DEFAULT_TENANT", allow_hyphen_values = true)]
    default_tenant: Option<i64>,

    /// Override the exempt tables (comma separated)
    #[arg(long, global = true, env = "WARDEN_EXEMPT_TABLES", value_delimiter = ',')]
    exempt_tables: Option<Vec<String>>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "WARDEN_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the WHERE clause a query would receive
    Explain {
        /// Tables touched by the query, as `name` or `name:alias` (comma separated)
        #[arg(long, required = true, value_delimiter = ',')]
        table: Vec<String>,

        /// Tenant of the caller; omitted means no tenant in context
        #[arg(long, allow_hyphen_values = true)]
        tenant: Option<i64>,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn effective_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(column) = &cli.tenant_column {
        config.tenant.tenant_column.clone_from(column);
    }
    if let Some(tenant) = cli.default_tenant {
        config.tenant.default_tenant = TenantId(tenant);
    }
    if let Some(tables) = &cli.exempt_tables {
        config.tenant.exempt_tables = tables
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    config.validate()?;
    Ok(config)
}

fn parse_table(spec: &str) -> Result<TableRef> {
    let table = match spec.split_once(':') {
        Some((name, alias)) => TableRef::new(name.trim())?.with_alias(alias.trim())?,
        None => TableRef::new(spec.trim())?,
    };
    Ok(table)
}

fn explain(config: &ServerConfig, tables: &[String], tenant: Option<i64>) -> Result<()> {
    let injector = TenantPredicateInjector::new(&config.tenant)?;
    let mut query = QueryDescriptor::new();
    for spec in tables {
        query = query.with_table(parse_table(spec).with_context(|| format!("bad table {spec:?}"))?);
    }

    let injection = injector.inject_for(query, tenant.map(TenantId))?;
    println!("WHERE {}", injection.query.literal_where());
    match injection.fallback {
        Some(fallback) => println!(
            "fallback: no tenant, scoped {} to sentinel tenant {}",
            fallback.tables.join(", "),
            fallback.sentinel
        ),
        None => println!("fallback: none"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(format)?;

    let config = effective_config(&cli)?;
    match &cli.command {
        Commands::Explain { table, tenant } => explain(&config, table, *tenant),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

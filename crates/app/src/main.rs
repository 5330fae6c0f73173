//! Souk Application CLI

use std::{process, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use souk_app::{
    database::{self, Db},
    domain::{
        buyers::{BuyersService, PgBuyersService, data::NewBuyer, records::{BuyerRole, BuyerUuid}},
        carts::sweep::{CartSweeper, SweepConfig},
        notifications::TracingDispatcher,
        tenants::{PgTenantsService, TenantsService, data::NewTenant, records::TenantUuid},
    },
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "souk-app", about = "Souk CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Tenant(TenantCommand),
    Buyer(BuyerCommand),
    Sweep(SweepCommand),
}

#[derive(Debug, Args)]
struct TenantCommand {
    #[command(subcommand)]
    command: TenantSubcommand,
}

#[derive(Debug, Subcommand)]
enum TenantSubcommand {
    Create(CreateTenantArgs),
}

#[derive(Debug, Args)]
struct CreateTenantArgs {
    /// Tenant display name
    #[arg(long)]
    name: String,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Optional tenant UUID; generated when omitted
    #[arg(long)]
    tenant_uuid: Option<Uuid>,
}

#[derive(Debug, Args)]
struct BuyerCommand {
    #[command(subcommand)]
    command: BuyerSubcommand,
}

#[derive(Debug, Subcommand)]
enum BuyerSubcommand {
    Create(CreateBuyerArgs),
}

#[derive(Debug, Args)]
struct CreateBuyerArgs {
    /// Buyer display name
    #[arg(long)]
    name: String,

    /// Buyer role: retail or wholesale
    #[arg(long, default_value = "retail")]
    role: String,

    /// Tenant UUID the buyer belongs to
    #[arg(long)]
    tenant_uuid: Uuid,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[derive(Debug, Args)]
struct SweepCommand {
    #[command(subcommand)]
    command: SweepSubcommand,
}

#[derive(Debug, Subcommand)]
enum SweepSubcommand {
    Run(RunSweepArgs),
}

#[derive(Debug, Args)]
struct RunSweepArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Seconds between sweep passes
    #[arg(long, default_value_t = 3600)]
    interval_secs: u64,

    /// Hours a cart must sit untouched before it counts as abandoned
    #[arg(long, default_value_t = 24)]
    abandoned_after_hours: i64,
}

#[tokio::main]
pub async fn main() {
    let _env = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        eprintln!("{error}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Tenant(TenantCommand {
            command: TenantSubcommand::Create(args),
        }) => create_tenant(args).await,
        Commands::Buyer(BuyerCommand {
            command: BuyerSubcommand::Create(args),
        }) => create_buyer(args).await,
        Commands::Sweep(SweepCommand {
            command: SweepSubcommand::Run(args),
        }) => run_sweep(args).await,
    }
}

async fn create_tenant(args: CreateTenantArgs) -> Result<(), String> {
    let pool = database::connect(&args.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let service = PgTenantsService::new(pool);
    let tenant_uuid = args.tenant_uuid.map_or_else(TenantUuid::new, TenantUuid::from_uuid);

    let tenant = service
        .create_tenant(NewTenant {
            uuid: tenant_uuid,
            name: args.name,
        })
        .await
        .map_err(|error| format!("failed to create tenant: {error}"))?;

    println!("tenant_uuid: {}", tenant.uuid);
    println!("tenant_name: {}", tenant.name);

    Ok(())
}

async fn create_buyer(args: CreateBuyerArgs) -> Result<(), String> {
    let role = BuyerRole::from_db(&args.role)
        .ok_or_else(|| format!("unknown buyer role: {}", args.role))?;

    let pool = database::connect(&args.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let service = PgBuyersService::new(Db::new(pool));

    let buyer = service
        .create_buyer(
            TenantUuid::from_uuid(args.tenant_uuid),
            NewBuyer {
                uuid: BuyerUuid::new(),
                name: args.name,
                role,
            },
        )
        .await
        .map_err(|error| format!("failed to create buyer: {error}"))?;

    println!("buyer_uuid: {}", buyer.uuid);
    println!("buyer_name: {}", buyer.name);
    println!("buyer_role: {}", buyer.role.as_str());

    Ok(())
}

async fn run_sweep(args: RunSweepArgs) -> Result<(), String> {
    let pool = database::connect(&args.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let sweeper = CartSweeper::new(
        Db::new(pool),
        SweepConfig {
            interval: Duration::from_secs(args.interval_secs),
            abandoned_after_hours: args.abandoned_after_hours,
        },
        Arc::new(TracingDispatcher),
    );

    sweeper.run().await;

    Ok(())
}

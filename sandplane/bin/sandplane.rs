use clap::{CommandFactory, Parser};
use sandplane::{
    cli::{AnsiStyles, SandplaneArgs, SandplaneSubcommand},
    config::PlaneConfig,
    lifecycle::SandboxService,
    server,
    store::{self, SANDPLANE_DB_MIGRATOR},
    utils, SandplaneResult,
};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> SandplaneResult<()> {
    dotenvy::dotenv().ok();

    let args = SandplaneArgs::parse();

    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.default_log_filter())),
        )
        .init();

    utils::check_or_set_env()?;

    let config_path = args.config_path();
    match args.subcommand {
        Some(SandplaneSubcommand::Serve { port }) => {
            let mut config = PlaneConfig::load(&config_path).await?;
            if let Some(port) = port {
                config.set_server_port(port);
            }
            serve(config).await?;
        }
        Some(SandplaneSubcommand::Migrate) => {
            let config = PlaneConfig::load(&config_path).await?;
            migrate(config).await?;
        }
        None => {
            SandplaneArgs::command().print_help()?;
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn serve(config: PlaneConfig) -> SandplaneResult<()> {
    let listener = TcpListener::bind(config.server_addr()).await?;
    let service = SandboxService::open(config).await?;
    service.spawn_reaper();

    println!(
        "{} {}",
        "sandplane listening on".header(),
        format!("http://{}", listener.local_addr()?).literal()
    );

    let server = tokio::spawn(server::serve(listener, service.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    service.shutdown().await;

    server.await??;
    Ok(())
}

async fn migrate(config: PlaneConfig) -> SandplaneResult<()> {
    let path = config.database_path();
    let pool = store::init_db(&path, &SANDPLANE_DB_MIGRATOR).await?;
    store::seed(&pool, &config).await?;

    println!(
        "{} {}",
        "database ready at".valid(),
        path.display().to_string().literal()
    );
    Ok(())
}

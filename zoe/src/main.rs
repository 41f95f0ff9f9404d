use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use zoe::{Application, Config, config::Command, telemetry};

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

/// `zoe setup-admin`: create (or with `--reset`, repair) the admin account and exit
async fn setup_admin(config: &Config, password: Option<String>, reset: bool) -> anyhow::Result<()> {
    let Some(password) = password.or_else(|| config.admin.password.clone()) else {
        anyhow::bail!("No admin password given: pass --password or set admin.password");
    };

    let pool = SqlitePoolOptions::new().max_connections(1).connect(&config.database.url).await?;
    zoe::migrator().run(&pool).await?;

    let admin = zoe::create_initial_admin_user(config, &password, &pool, reset).await?;
    pool.close().await;

    println!("Admin account '{}' is ready ({})", admin.username, admin.id);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = zoe::config::Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry()?;

    tracing::debug!("{:?}", args);

    if let Some(Command::SetupAdmin { password, reset }) = args.command {
        return setup_admin(&config, password, reset).await;
    }

    // Run the application with graceful shutdown on SIGTERM/Ctrl+C
    Application::new(config).await?.serve(shutdown_signal()).await
}

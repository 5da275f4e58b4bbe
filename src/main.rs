use std::env;

use anyhow::Context;
use pgspider_lineage::config::{AppConfig, LogConfig};
use tracing_appender::non_blocking::WorkerGuard;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    // Check if running in CLI mode
    let cli_mode = take_flag(&mut args, &["--cli"]);

    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = AppConfig::from_file(&config_path).map_err(std::io::Error::other)?;

    // Keep the file writer alive for the entire program lifetime
    let guard = init_logging(&config.logging, cli_mode).map_err(std::io::Error::other)?;
    tracing::info!("Loaded configuration from {}", config_path);

    if cli_mode {
        let code = run_cli_mode(&config, args);
        // Flush buffered log lines before exiting
        drop(guard);
        if code != 0 {
            std::process::exit(code);
        }
        Ok(())
    } else {
        let result = run_server_mode(config).await;
        drop(guard);
        result
    }
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    if let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) {
        args.remove(pos);
        true
    } else {
        false
    }
}

async fn run_server_mode(config: AppConfig) -> std::io::Result<()> {
    let server = config
        .server
        .clone()
        .ok_or_else(|| std::io::Error::other("Missing [server] section in config"))?;

    let source = pgspider_lineage::build_source(&config).map_err(std::io::Error::other)?;

    let store = match (&config.store, config.store_url()) {
        (Some(store), Some(url)) => {
            let pool = pgspider_lineage::db::create_pool(&url, store.pool_size as u32)
                .map_err(std::io::Error::other)?;
            tracing::info!(
                "Lineage store pool created with max_size={}",
                store.pool_size
            );
            Some(pool)
        }
        _ => None,
    };

    // Note: Diesel migrations should be run manually using diesel CLI:
    // diesel migration run
    let state = pgspider_lineage::handlers::AppState {
        source,
        service_name: config.source.service_name.clone(),
        store,
    };
    pgspider_lineage::server::start_server(
        &server.host,
        server.port,
        server.worker_threads,
        state,
    )
    .await
}

fn init_logging(config: &LogConfig, cli_mode: bool) -> anyhow::Result<WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pgspider_lineage.log")
        .max_log_files(config.max_log_files)
        .build(&config.log_dir)
        .context("Failed to create rolling log file")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Parse log level
    let log_level = config
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    // CLI output owns stdout
    let console = if cli_mode {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(console))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Returns the process exit code.
fn run_cli_mode(config: &AppConfig, mut args: Vec<String>) -> i32 {
    let pretty = take_flag(&mut args, &["--pretty", "-p"]);
    let json_mode = take_flag(&mut args, &["--json", "-j"]);
    let store_mode = take_flag(&mut args, &["--store", "-s"]);

    if let Some(unknown) = args.first() {
        eprintln!("Unknown argument: {}", unknown);
        return 2;
    }

    match run_once(config, json_mode, pretty, store_mode) {
        Ok(0) => 0,
        Ok(failed) => {
            tracing::error!("{} lineage items failed", failed);
            1
        }
        Err(e) => {
            tracing::error!("Error: {:#}", e);
            1
        }
    }
}

fn run_once(
    config: &AppConfig,
    json_mode: bool,
    pretty: bool,
    store_mode: bool,
) -> anyhow::Result<usize> {
    let source = pgspider_lineage::build_source(config)?;

    let mut store = if store_mode {
        let url = config
            .store_url()
            .context("--store requires a [store] section in config")?;
        let pool = pgspider_lineage::db::create_pool(&url, 1)?;
        Some(pool.get().context("Failed to get lineage store connection")?)
    } else {
        None
    };

    let service_name = &config.source.service_name;
    let failed = pgspider_lineage::drain(source.records(), |request| {
        if json_mode {
            if pretty {
                println!("{}", serde_json::to_string_pretty(&request)?);
            } else {
                println!("{}", serde_json::to_string(&request)?);
            }
        } else {
            println!("{} -> {}", request.from_table(), request.to_table());
        }
        if let Some(conn) = store.as_mut() {
            pgspider_lineage::db::insert_lineage_edge(conn, service_name, &request)?;
        }
        Ok(())
    });
    Ok(failed)
}

use clap::Parser;
use risk_guard::cli::{Cli, Commands};
use risk_guard::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::parse(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    let _telemetry = risk_guard::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Serve(args) => {
            tracing::info!("Starting risk service");
            args.execute(&config).await?;
        }
        Commands::Check(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  HTTP: {}", config.service.http_addr);
            println!("  Simulation mode: {}", config.service.simulation_mode);
            println!(
                "  Risk: monitor={}ms check_budget={}ms cache_budget={}ms margin_leverage={}",
                config.risk.monitor_interval_ms,
                config.risk.check_budget_ms,
                config.risk.cache_budget_ms,
                config.risk.margin_leverage
            );
            println!(
                "  Breaker: {} hard violations / {}s",
                config.risk.breaker_threshold, config.risk.breaker_window_secs
            );
            println!(
                "  Cache: redis={}",
                config.cache.redis_url.as_deref().unwrap_or("none")
            );
            println!(
                "  Alerts: redis={} prefix={}",
                config.alerts.redis_url.as_deref().unwrap_or("none"),
                config.alerts.topic_prefix
            );
            println!(
                "  Policies: {}",
                config
                    .sources
                    .policy_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "built-in defaults".to_string())
            );
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use solana_wallet_core::rpc::HealthReport;
use solana_wallet_core::{RpcGateway, SolanaNetwork, WalletConfig};

/// Check the configured Solana RPC endpoints
#[derive(Parser, Debug)]
#[command(name = "solana-wallet-core")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Report health of the wallet's primary and fallback RPC endpoints", long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to ~/.solana-wallet/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn load_config(&self) -> Result<WalletConfig> {
        match &self.config {
            Some(path) => {
                let mut config = WalletConfig::from_file(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                config.apply_env();
                Ok(config)
            }
            None => WalletConfig::load().context("failed to load wallet config"),
        }
    }
}

#[derive(Serialize)]
struct HealthSummary {
    network: String,
    primary: HealthReport,
    fallback: Option<HealthReport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let gateway = RpcGateway::new(&config.rpc).context("failed to build RPC gateway")?;
    let network = SolanaNetwork::detect(gateway.endpoint());
    info!(endpoint = gateway.endpoint(), network = network.name(), "checking endpoint health");

    let (primary, fallback) = tokio::join!(gateway.get_health(), gateway.get_fallback_health());
    let summary = HealthSummary {
        network: network.name().to_string(),
        primary,
        fallback,
    };

    if cli.json {
        let rendered = serde_json::to_string_pretty(&summary).context("failed to encode health report")?;
        println!("{}", rendered);
    } else {
        println!("Network: {}", summary.network);
        print_report("primary", &summary.primary);
        match &summary.fallback {
            Some(report) => print_report("fallback", report),
            None => println!("fallback: not configured"),
        }
    }

    if !summary.primary.is_ok() {
        anyhow::bail!("primary endpoint {} is unhealthy", summary.primary.endpoint);
    }
    Ok(())
}

fn print_report(label: &str, report: &HealthReport) {
    let status = if report.is_ok() { "ok" } else { "unhealthy" };
    match report.error {
        Some(kind) => println!(
            "{}: {} {} ({} ms, {})",
            label,
            report.endpoint,
            status,
            report.latency_ms,
            kind.user_message()
        ),
        None => println!("{}: {} {} ({} ms)", label, report.endpoint, status, report.latency_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from(["solana-wallet-core", "--json", "--config", "/tmp/wallet.json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/wallet.json")));

        let cli = Cli::try_parse_from(["solana-wallet-core"]).unwrap();
        assert!(!cli.json);
        assert!(cli.config.is_none());
        assert!(Cli::try_parse_from(["solana-wallet-core", "--verbose"]).is_err());
    }

    #[test]
    fn test_config_path_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut expected = WalletConfig::default();
        expected.rpc.primary_url = "http://127.0.0.1:8899".to_string();
        std::fs::write(&path, serde_json::to_vec(&expected).unwrap()).unwrap();

        let cli = Cli::try_parse_from(["solana-wallet-core", "-c", path.to_str().unwrap()]).unwrap();
        let config = cli.load_config().unwrap();
        if std::env::var(solana_wallet_core::config::RPC_URL_ENV).is_err() {
            assert_eq!(config.rpc.primary_url, "http://127.0.0.1:8899");
        }

        let missing = Cli::try_parse_from(["solana-wallet-core", "--config", "/nonexistent/wallet.json"]).unwrap();
        assert!(missing.load_config().is_err());
    }
}

// nowgate: ESP-NOW radio to MQTT gateway daemon.

mod config;
mod gateway;
mod link;
mod logging;
mod mqtt;
mod radio;
mod timers;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::gateway::SessionEnd;

const VERSION: &str = env!("CARGO_PKG_VERSION");

enum Cli {
    Version,
    Run { config: Option<PathBuf> },
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Cli> {
    let mut config = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return Ok(Cli::Version),
            "--config" | "-c" => match args.next() {
                Some(p) => config = Some(PathBuf::from(p)),
                None => bail!("{} needs a path", arg),
            },
            other => match other.strip_prefix("--config=") {
                Some(p) => config = Some(PathBuf::from(p)),
                None => bail!("unknown argument {:?}", other),
            },
        }
    }
    Ok(Cli::Run { config })
}

fn main() -> Result<()> {
    let config_path = match parse_args(std::env::args().skip(1))? {
        Cli::Version => {
            println!("nowgate-linux {}", VERSION);
            return Ok(());
        }
        Cli::Run { config } => config,
    };

    let cfg = config::load(config_path.as_deref())?;
    logging::init_tracing(cfg.log_format)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(cfg, config_path.as_deref()))
}

async fn run(mut cfg: config::Config, config_path: Option<&Path>) -> Result<()> {
    let started = Instant::now();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "signal handler");
        }
        let _ = shutdown_tx.send(true);
    });

    info!(version = VERSION, "nowgate starting");
    loop {
        match gateway::run_session(&cfg, started, &mut shutdown_rx).await? {
            SessionEnd::Shutdown => break,
            end => {
                info!(?end, "reloading configuration");
                match config::load(config_path) {
                    Ok(c) => cfg = c,
                    Err(e) => warn!(error = %e, "reload failed; keeping previous configuration"),
                }
            }
        }
    }
    info!("nowgate stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn version_flag() {
        assert!(matches!(parse_args(args(&["-V"])).unwrap(), Cli::Version));
        assert!(matches!(
            parse_args(args(&["--config", "a.toml", "--version"])).unwrap(),
            Cli::Version
        ));
    }

    #[test]
    fn config_path_forms() {
        let Cli::Run { config } = parse_args(args(&["--config", "/etc/x.toml"])).unwrap() else {
            panic!("expected run");
        };
        assert_eq!(config, Some(PathBuf::from("/etc/x.toml")));
        let Cli::Run { config } = parse_args(args(&["--config=y.toml"])).unwrap() else {
            panic!("expected run");
        };
        assert_eq!(config, Some(PathBuf::from("y.toml")));
        let Cli::Run { config } = parse_args(Vec::new()).unwrap() else {
            panic!("expected run");
        };
        assert!(config.is_none());
    }

    #[test]
    fn bad_arguments() {
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
    }
}

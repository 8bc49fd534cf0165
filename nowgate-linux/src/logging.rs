//! Tracing subscriber setup.

use anyhow::Result;
use serde::Deserialize;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "NOWGATE_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `NOWGATE_LOG` wins, then `RUST_LOG`, then `info`.
fn directive(own: Option<String>, rust_log: Option<String>) -> String {
    own.or(rust_log)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

fn filter() -> EnvFilter {
    let d = directive(std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok());
    EnvFilter::try_new(&d).unwrap_or_else(|err| {
        eprintln!("invalid log directive {:?} ({}); using {}", d, err, DEFAULT_DIRECTIVE);
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}

/// Install the global subscriber. Call once per process.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry().with(filter());
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(false))
            .try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_precedence() {
        assert_eq!(directive(Some("debug".into()), Some("warn".into())), "debug");
        assert_eq!(directive(None, Some("warn".into())), "warn");
        assert_eq!(directive(None, None), "info");
        assert_eq!(directive(Some(" ".into()), None), "info");
    }

    #[test]
    fn format_names() {
        #[derive(Deserialize)]
        struct W {
            f: LogFormat,
        }
        let w: W = toml::from_str("f = \"json\"").unwrap();
        assert_eq!(w.f, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}

use anyhow::{Context, Result};
use embedload_vector_store::{ConnectionConfig, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

pub const HOST_ENV: &str = "EMBEDLOAD_HOST";
pub const PORT_ENV: &str = "EMBEDLOAD_PORT";

/// Flag value, then environment, then default.
pub fn resolve_host(flag: Option<String>, env: Option<String>) -> String {
    flag.or_else(|| env.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}

pub fn resolve_port(flag: Option<u16>, env: Option<&str>) -> Result<u16> {
    if let Some(port) = flag {
        return Ok(port);
    }
    match env.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<u16>()
            .with_context(|| format!("{PORT_ENV}={raw} is not a valid port")),
        None => Ok(DEFAULT_PORT),
    }
}

pub struct ConnectionFlags {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

/// Resolve connection settings once, reading the environment overrides.
pub fn connection_config(flags: ConnectionFlags) -> Result<ConnectionConfig> {
    let host = resolve_host(flags.host, std::env::var(HOST_ENV).ok());
    let port = resolve_port(flags.port, std::env::var(PORT_ENV).ok().as_deref())?;
    Ok(ConnectionConfig {
        host,
        port,
        max_retries: flags.retries,
        retry_delay: Duration::from_secs(flags.retry_delay_secs),
        timeout: Duration::from_secs(flags.timeout_secs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_env_beats_default() {
        assert_eq!(
            resolve_host(Some("a".into()), Some("b".into())),
            "a".to_string()
        );
        assert_eq!(resolve_host(None, Some("b".into())), "b".to_string());
        assert_eq!(resolve_host(None, Some("  ".into())), DEFAULT_HOST);
        assert_eq!(resolve_host(None, None), DEFAULT_HOST);
    }

    #[test]
    fn port_env_is_parsed() {
        assert_eq!(resolve_port(Some(1), Some("2")).unwrap(), 1);
        assert_eq!(resolve_port(None, Some(" 2 ")).unwrap(), 2);
        assert_eq!(resolve_port(None, None).unwrap(), DEFAULT_PORT);
        assert!(resolve_port(None, Some("nope")).is_err());
    }
}

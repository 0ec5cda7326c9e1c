//! Server flags and the optional JSON mount configuration file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use hardware::{MountArgs, MountConfig};
use tracing::info;

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    pub bind_address: String,

    /// JSON mount configuration; replaces the mount flags when given
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ServerArgs {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.bind_address, self.port))
    }

    /// Mount configuration from `--config` if set, otherwise from the flags.
    pub fn mount_config(&self, mount: &MountArgs) -> Result<MountConfig> {
        let config = match &self.config {
            Some(path) => load_mount_config(path)?,
            None => mount.to_config(),
        };
        config.validate().context("Invalid mount configuration")?;
        Ok(config)
    }
}

pub fn load_mount_config(path: &Path) -> Result<MountConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: MountConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    info!("Loaded mount configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        mount: MountArgs,
        #[command(flatten)]
        server: ServerArgs,
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.json", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(
            cli.server.socket_addr().unwrap(),
            "0.0.0.0:5000".parse::<SocketAddr>().unwrap()
        );
        let config = cli.server.mount_config(&cli.mount).unwrap();
        assert_eq!(config, MountConfig::default());
    }

    #[test]
    fn test_config_file_replaces_flags() {
        let path = temp_file("mount-config", r#"{"yaw_line": 17, "step": 5}"#);
        let cli = TestCli::parse_from([
            "test",
            "--yaw-line",
            "3",
            "--config",
            path.to_str().unwrap(),
        ]);
        let config = cli.server.mount_config(&cli.mount).unwrap();
        assert_eq!(config.yaw_line, 17);
        assert_eq!(config.step, 5.0);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_invalid_config_file_rejected() {
        let path = temp_file("mount-config-bad", r#"{"yaw_line": 9}"#);
        let server = ServerArgs {
            port: DEFAULT_PORT,
            bind_address: "127.0.0.1".into(),
            config: Some(path.clone()),
        };
        let mount = TestCli::parse_from(["test"]).mount;
        assert!(server.mount_config(&mount).is_err());
        std::fs::remove_file(path).unwrap();

        let missing = ServerArgs {
            config: Some(PathBuf::from("/nonexistent/mount.json")),
            ..server
        };
        assert!(missing.mount_config(&mount).is_err());
    }

    #[test]
    fn test_bad_bind_address() {
        let server = ServerArgs {
            port: 80,
            bind_address: "not an address".into(),
            config: None,
        };
        assert!(server.socket_addr().is_err());
    }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::combat::rules::CombatRules;
use crate::scheduler::pulse::PulseTimings;
use crate::world::room::Vnum;

const USAGE: &str = "usage: diku [config.yml] [port]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub world_path: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub storage: StorageKind,
    pub player_dir: PathBuf,
    pub player_cache: usize,
    pub shutdown_grace_secs: u64,
    pub start_room: Option<Vnum>,
    pub combat: CombatRules,
    pub pulses: PulseTimings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            world_path: PathBuf::from("data/world.yml"),
            log_level: "info".to_string(),
            log_dir: PathBuf::from("log"),
            storage: StorageKind::File,
            player_dir: PathBuf::from("data/players"),
            player_cache: 64,
            shutdown_grace_secs: 10,
            start_room: None,
            combat: CombatRules::default(),
            pulses: PulseTimings::default(),
        }
    }
}

impl AppConfig {
    /// `diku [config.yml] [port]`, with `DIKU_*` environment overrides applied
    /// between the file and the port argument.
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        Self::from_args_with_env(args, |key| std::env::var(key).ok())
    }

    pub fn from_args_with_env(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let mut rest = args.iter().skip(1);
        let mut config_path = None;
        let mut port_arg = None;
        if let Some(first) = rest.next() {
            if first.parse::<u16>().is_ok() {
                port_arg = Some(first.clone());
            } else {
                config_path = Some(PathBuf::from(first));
                port_arg = rest.next().cloned();
            }
        }
        if rest.next().is_some() {
            return Err(USAGE.to_string());
        }

        let mut config = match config_path {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        if let Some(port) = port_arg {
            config.port = parse_port(&port).map_err(|err| format!("{}\n{}", err, USAGE))?;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let data = std::fs::read_to_string(path)
            .map_err(|err| format!("config read failed for {}: {}", path.display(), err))?;
        Self::from_yaml_str(&data)
            .map_err(|err| format!("config parse failed for {}: {}", path.display(), err))
    }

    pub fn from_yaml_str(data: &str) -> Result<Self, String> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|err| err.to_string())
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        let value = |key: &str| {
            env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(host) = value("DIKU_HOST") {
            self.host = host;
        }
        if let Some(port) = value("DIKU_PORT") {
            self.port = parse_port(&port).map_err(|err| format!("DIKU_PORT: {}", err))?;
        }
        if let Some(level) = value("DIKU_LOG") {
            self.log_level = level;
        }
        if let Some(dir) = value("DIKU_PLAYER_DIR") {
            self.player_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_port(value: &str) -> Result<u16, String> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| format!("invalid port '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("diku")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_arguments() {
        let config = AppConfig::from_args_with_env(&args(&[]), no_env).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:4000");
        assert_eq!(config.storage, StorageKind::File);
    }

    #[test]
    fn yaml_file_then_env_then_port_argument() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diku.yml");
        std::fs::write(
            &path,
            "host: 127.0.0.1\nport: 5000\nstorage: memory\nstart_room: 3001\n\
             combat:\n  critical_rolls: false\npulses:\n  violence: 1\n",
        )
        .unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let config = AppConfig::from_args_with_env(&args(&[&path_arg]), no_env).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.start_room, Some(Vnum(3001)));
        assert!(!config.combat.critical_rolls);
        assert_eq!(config.pulses.violence, 1.0);
        assert_eq!(config.pulses.mobile, 10.0);

        let env: HashMap<&str, &str> = [("DIKU_PORT", "6000"), ("DIKU_LOG", "debug")].into();
        let lookup = |key: &str| env.get(key).map(|value| value.to_string());
        let config = AppConfig::from_args_with_env(&args(&[&path_arg]), lookup).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.log_level, "debug");

        let config = AppConfig::from_args_with_env(&args(&[&path_arg, "7000"]), lookup).unwrap();
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn lone_port_argument() {
        let config = AppConfig::from_args_with_env(&args(&["4444"]), no_env).unwrap();
        assert_eq!(config.port, 4444);
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(AppConfig::from_args_with_env(&args(&["a.yml", "1", "2"]), no_env)
            .unwrap_err()
            .starts_with("usage"));
        assert!(AppConfig::from_args_with_env(&args(&["/nonexistent/diku.yml"]), no_env).is_err());
        let bad_env = |key: &str| (key == "DIKU_PORT").then(|| "lots".to_string());
        assert!(AppConfig::from_args_with_env(&args(&[]), bad_env).is_err());
        assert!(AppConfig::from_yaml_str("storage: cloud").is_err());
    }
}

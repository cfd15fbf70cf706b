use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

#[derive(Deserialize, Debug, Clone)]
pub struct SystemConfig
{
    /// Directory holding one store per schema.
    pub datapath: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StoreConfig
{
    /// Backend name, `rocks` or `mem`.
    pub name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LogConfig
{
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig
{
    fn default() -> Self
    {
        LogConfig { filter: default_log_filter() }
    }
}

fn default_log_filter() -> String
{
    String::from("db_worker=info")
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServiceConfig
{
    pub system: SystemConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
}

pub fn get_config_str(configfile: &Path) -> std::io::Result<String>
{
    match std::fs::read_to_string(configfile) {
        Ok(config_str) => Ok(config_str),
        Err(e) => Err(std::io::Error::new(
                e.kind(),
                std::format!("failed to read config file {}, err: {}",
                             configfile.display(), e))),
    }
}

pub fn parse_config(config_str: &str) -> std::io::Result<ServiceConfig>
{
    match serde_json::from_str(config_str) {
        Ok(config) => Ok(config),
        Err(e) => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData, std::format!(
                    "parsing json config failed, err: {}", e)))
    }
}

pub fn read_and_parse_config(configfile: &Path) -> std::io::Result<ServiceConfig>
{
    parse_config(&get_config_str(configfile)?)
}

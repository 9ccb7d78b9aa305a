use serde::Deserialize;

use crate::error::Result;
use crate::storage::buffer::BufferOptions;
use crate::storage::StorageType;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub storage_type: StorageType,
    pub data_dir: String,
    pub buffer: BufferOptions,
}

impl Config {
    /// Build the configuration from defaults, an optional file and
    /// `BUFPOOL`-prefixed environment variables. The `buffer.*` keys keep
    /// the property names of existing deployments.
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "debug")?
            .set_default("storage_type", "memory")?
            .set_default("data_dir", "data")?
            .set_default("buffer.buffer_count", 1024)?
            .set_default("buffer.lru_k", 2)?
            .set_default("buffer.crt", 100_000)?
            .set_default("buffer.rit", 200_000)?
            .set_default("buffer.anchor_stripes", 1009)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("BUFPOOL"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() -> Result<()> {
        let cfg = Config::new("")?;
        assert_eq!(LogLevel::Debug, cfg.log_level);
        assert_eq!(StorageType::Memory, cfg.storage_type);
        assert_eq!("data", cfg.data_dir);
        assert_eq!(1024, cfg.buffer.buffer_count);
        assert_eq!(2, cfg.buffer.lru_k);
        assert_eq!(100_000, cfg.buffer.crt);
        assert_eq!(200_000, cfg.buffer.rit);
        assert_eq!(1009, cfg.buffer.anchor_stripes);
        Ok(())
    }
}

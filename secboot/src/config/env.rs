// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Keylime Authors
use crate::config::SecbootConfigError;
use config::{ConfigError, Environment, Map, Source, Value};
use log::*;

pub static ENV_PREFIX: &str = "SECBOOT";

/// Configuration options set through `SECBOOT_<OPTION>` environment
/// variables, usable as a source on top of the configuration files.
#[derive(Clone, Debug)]
pub struct EnvConfig {
    map: Map<String, Value>,
}

impl EnvConfig {
    pub fn new() -> Result<Self, SecbootConfigError> {
        let env_source = Environment::with_prefix(ENV_PREFIX)
            .separator(".")
            .prefix_separator("_");

        let collected = env_source.collect()?;
        collected
            .iter()
            .for_each(|(c, v)| debug!("Environment configuration {c}={v}"));

        Ok(EnvConfig {
            map: Map::from([("secboot".to_string(), Value::from(collected))]),
        })
    }
}

impl Source for EnvConfig {
    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        Ok(self.map.clone())
    }

    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Keylime Authors
use crate::config::*;
use config::{
    builder::DefaultState, Config, ConfigBuilder, File, FileFormat,
    FileSourceFile,
};
use glob::glob;
use log::*;
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};

pub static GLOBAL_CONFIG_OVERRIDE_ENV_VAR: &str = "SECBOOT_CONFIG";

/// A configuration file, or a directory of configuration snippets.
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Directory(PathBuf),
}

#[derive(Debug, Default)]
pub struct FileConfigBuilder {
    sources: Vec<ConfigSource>,
    environment: bool,
}

// wrapper struct just to deserialize
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    secboot: SecbootConfig,
}

fn toml_file(path: &Path) -> File<FileSourceFile, FileFormat> {
    File::new(&path.display().to_string(), FileFormat::Toml).required(false)
}

fn default_builder(
) -> Result<ConfigBuilder<DefaultState>, SecbootConfigError> {
    let default_config = SecbootConfig::default();
    Ok(Config::builder()
        .set_default("secboot.tcti", default_config.tcti)?
        .set_default("secboot.pcr_digest_alg", default_config.pcr_digest_alg)?)
}

impl FileConfigBuilder {
    /// Creates a new, empty ConfigBuilder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single file as a configuration source.
    ///
    /// # Arguments
    ///
    /// * `path` - A path to the configuration file.
    pub fn file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(ConfigSource::File(path.into()));
        self
    }

    /// Adds a directory as a configuration source.
    /// All files within this directory will be loaded through globbing.
    ///
    /// # Arguments
    ///
    /// * `path` - A path to the directory.
    pub fn directory(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(ConfigSource::Directory(path.into()));
        self
    }

    /// Applies the options set in `SECBOOT_*` environment variables on top
    /// of the configuration files.
    pub fn environment(&mut self) -> &mut Self {
        self.environment = true;
        self
    }

    /// Load the configuration files from the default locations
    pub fn load_default_locations(&mut self) -> &mut Self {
        self.file(DEFAULT_CONFIG)
            .directory(DEFAULT_CONFIG_SNIPPETS_DIR)
    }

    /// Loads the configuration. Later sources override earlier ones and
    /// missing files are skipped. If `SECBOOT_CONFIG` is set, only the file
    /// it names is loaded and it must exist.
    pub fn build(&mut self) -> Result<SecbootConfig, SecbootConfigError> {
        let override_file = env::var(GLOBAL_CONFIG_OVERRIDE_ENV_VAR)
            .ok()
            .filter(|path| !path.is_empty());

        let files = match override_file {
            Some(path) => {
                if !Path::new(&path).exists() {
                    return Err(SecbootConfigError::MissingEnvConfigFile {
                        file: path,
                    });
                }
                warn!(
                    "Configuration replaced by {GLOBAL_CONFIG_OVERRIDE_ENV_VAR}: {path}"
                );
                vec![toml_file(Path::new(&path)).required(true)]
            }
            None => self.source_files()?,
        };
        debug!("Loading configuration from {} files", files.len());

        self.finish(default_builder()?.add_source(files))
    }

    /// Expands the configured sources into the files to load, in order.
    fn source_files(
        &self,
    ) -> Result<Vec<File<FileSourceFile, FileFormat>>, SecbootConfigError>
    {
        let mut files = Vec::new();
        for source in &self.sources {
            match source {
                ConfigSource::File(path) => files.push(toml_file(path)),
                ConfigSource::Directory(path) => {
                    let pattern = path.join("*").display().to_string();
                    files.extend(
                        glob(&pattern)
                            .map_err(SecbootConfigError::GlobPattern)?
                            .filter_map(|entry| entry.ok())
                            .map(|path| toml_file(&path)),
                    );
                }
            }
        }
        Ok(files)
    }

    fn finish(
        &self,
        mut builder: ConfigBuilder<DefaultState>,
    ) -> Result<SecbootConfig, SecbootConfigError> {
        if self.environment {
            builder = builder.add_source(EnvConfig::new()?);
        }
        let f: FileConfig = builder.build()?.try_deserialize()?;
        debug!("File configuration build process finished.");
        Ok(f.secboot)
    }
}

/// Loads the configuration from the default locations, with the
/// environment applied on top.
pub fn load_default_config() -> Result<SecbootConfig, SecbootConfigError> {
    FileConfigBuilder::new()
        .load_default_locations()
        .environment()
        .build()
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Keylime Authors
use crate::algorithms::AlgorithmError;
use config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecbootConfigError {
    // Error from config crate
    #[error("Error from the config crate")]
    Config(#[from] ConfigError),

    // Glob error
    #[error("Glob pattern error")]
    GlobPattern(#[from] glob::PatternError),

    // Unsupported algorithm set in an option
    #[error("Invalid value for option '{option}'")]
    InvalidAlgorithm {
        option: String,
        source: AlgorithmError,
    },

    // Missing configuration file set in SECBOOT_CONFIG
    #[error("Missing file {file} set in 'SECBOOT_CONFIG' environment variable")]
    MissingEnvConfigFile { file: String },
}

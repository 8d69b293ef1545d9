// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Keylime Authors
mod base;
mod env;
mod error;
mod file_config;

pub use base::*;
pub use env::*;
pub use error::*;
pub use file_config::*;

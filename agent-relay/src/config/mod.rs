// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads relay.yaml, validates structure, resolves variable interpolation,
// and computes a deterministic contract hash.

mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::load_config;
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;

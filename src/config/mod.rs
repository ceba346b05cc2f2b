//! Toolchain configuration.
//!
//! Reporting strings always name the conventional tools; the
//! configuration only decides which programs actually get spawned, so a
//! machine with `flex` under a nonstandard name or a pinned bison build
//! can still use the harness unchanged.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Programs the dispatcher spawns, one per build step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Scanner generator.
    pub lex_program: String,
    /// Parser generator.
    pub yacc_program: String,
    /// C compiler for generated scanners and parsers.
    pub cc_program: String,
    /// Compiler for the assembly listings a custom run produces.
    pub asm_program: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            lex_program: "lex".to_string(),
            yacc_program: "yacc".to_string(),
            cc_program: "gcc".to_string(),
            asm_program: "cc".to_string(),
        }
    }
}

impl ToolchainConfig {
    /// Loads a TOML config file. Missing keys fall back to the defaults,
    /// so a file can override just one program.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

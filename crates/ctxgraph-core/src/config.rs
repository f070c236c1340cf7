use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CtxGraphError, Result};

/// Engine-wide configuration (§6). Loaded from an optional TOML/JSON/YAML
/// file plus `CTXGRAPH_*` environment overrides via the `config` crate, the
/// same layering the teacher uses for its own settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_size_limit_bytes: u64,
    /// Advisory only — the working-memory cache uses demand-driven
    /// staleness, not a TTL sweep (see Open Questions in DESIGN.md).
    pub cache_expiry_minutes: u64,
    pub context_token_limit: usize,
    pub enable_context_injection: bool,
    pub suppress_patterns: Vec<String>,
    pub file_specific_suppressions: HashMap<String, Vec<String>>,
    pub global_pattern_suppressions: HashMap<String, bool>,
    /// Root directory for append-only JSONL logs (`injections/`,
    /// `warnings/`, `session_metrics/` subdirectories).
    pub data_root: PathBuf,
    pub symbol_cache_max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_size_limit_bytes: 50 * 1024,
            cache_expiry_minutes: 60,
            context_token_limit: 500,
            enable_context_injection: true,
            suppress_patterns: Vec::new(),
            file_specific_suppressions: HashMap::new(),
            global_pattern_suppressions: HashMap::new(),
            data_root: PathBuf::from(".ctxgraph"),
            symbol_cache_max_entries: 1000,
        }
    }
}

impl Config {
    /// Loads configuration, layering an optional config file over the
    /// built-in defaults, then applying `CTXGRAPH_`-prefixed environment
    /// overrides. Missing file is not an error — defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::default();
        let mut builder = config::Config::builder()
            .set_default("cache_size_limit_bytes", defaults.cache_size_limit_bytes)
            .map_err(|e| CtxGraphError::Configuration(e.to_string()))?
            .set_default("cache_expiry_minutes", defaults.cache_expiry_minutes)
            .map_err(|e| CtxGraphError::Configuration(e.to_string()))?
            .set_default("context_token_limit", defaults.context_token_limit as i64)
            .map_err(|e| CtxGraphError::Configuration(e.to_string()))?
            .set_default("enable_context_injection", defaults.enable_context_injection)
            .map_err(|e| CtxGraphError::Configuration(e.to_string()))?
            .set_default("data_root", defaults.data_root.to_string_lossy().to_string())
            .map_err(|e| CtxGraphError::Configuration(e.to_string()))?
            .set_default(
                "symbol_cache_max_entries",
                defaults.symbol_cache_max_entries as i64,
            )
            .map_err(|e| CtxGraphError::Configuration(e.to_string()))?;

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(config::Environment::with_prefix("CTXGRAPH").separator("__"));

        let built = builder
            .build()
            .map_err(|e| CtxGraphError::Configuration(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| CtxGraphError::Configuration(e.to_string()))
    }

    /// Suppression precedence (most specific wins), per §6:
    /// file+pattern-type > global pattern-type > file-level > directory-level.
    pub fn is_suppressed(&self, file: &str, pattern_type: &str) -> bool {
        if let Some(types) = self.file_specific_suppressions.get(file) {
            if types.iter().any(|t| t == pattern_type) {
                return true;
            }
        }
        if self
            .global_pattern_suppressions
            .get(pattern_type)
            .copied()
            .unwrap_or(false)
        {
            return true;
        }
        if self.suppress_patterns.iter().any(|p| p == file) {
            return true;
        }
        self.suppress_patterns.iter().any(|pattern| {
            globset::Glob::new(pattern)
                .map(|g| g.compile_matcher().is_match(file))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.cache_size_limit_bytes, 50 * 1024);
        assert_eq!(c.context_token_limit, 500);
        assert!(c.enable_context_injection);
    }

    #[test]
    fn file_specific_suppression_wins_over_global_allow() {
        let mut c = Config::default();
        c.file_specific_suppressions
            .insert("a.py".to_string(), vec!["decorator".to_string()]);
        assert!(c.is_suppressed("a.py", "decorator"));
        assert!(!c.is_suppressed("b.py", "decorator"));
    }

    #[test]
    fn global_pattern_suppression_applies_to_all_files() {
        let mut c = Config::default();
        c.global_pattern_suppressions
            .insert("metaclass".to_string(), true);
        assert!(c.is_suppressed("any/file.py", "metaclass"));
    }
}

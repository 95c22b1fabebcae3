// Parser safety limits module
//
// Provides configurable resource limits to prevent:
// - Stack overflow from deeply nested brackets, blocks and substitutions
// - Memory exhaustion from very large scripts
// - Runaway token or node counts from pathological input
//
// All limits have permissive defaults and can be overridden via a TOML file

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Parser safety limits with permissive defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ParserLimits {
    // Lexer limits
    pub max_input_size: usize,        // Maximum source size in bytes
    pub max_token_count: usize,       // Maximum number of tokens consumed per parse
    pub max_identifier_length: usize, // Maximum identifier length in bytes
    pub max_string_length: usize,     // Maximum string literal length in bytes

    // Parser limits
    pub max_nesting_depth: usize, // Maximum recursion depth of the parser

    // Tree limits
    pub max_ast_nodes: usize, // Maximum nodes per tree
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_input_size: 10_000_000,    // 10 MB
            max_token_count: 1_000_000,    // 1M tokens
            max_identifier_length: 1_000,  // 1k bytes
            max_string_length: 10_000_000, // 10 MB
            max_nesting_depth: 256,
            max_ast_nodes: 2_000_000, // 2M nodes
        }
    }
}

impl ParserLimits {
    /// Create with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Load limits from the `[limits]` table of a TOML file, falling back to defaults
    ///
    /// Returns error only if the TOML is malformed, not if the file is missing
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, LimitError> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| LimitError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            LimitError::Malformed { message, .. } => LimitError::Malformed {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse limits from TOML text, overriding only the keys that are present
    pub fn from_toml_str(content: &str) -> Result<Self, LimitError> {
        let config: LimitsFile = toml::from_str(content).map_err(|e| LimitError::Malformed {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;

        let mut limits = Self::default();

        if let Some(section) = config.limits {
            if let Some(v) = section.max_input_size {
                limits.max_input_size = v;
            }
            if let Some(v) = section.max_token_count {
                limits.max_token_count = v;
            }
            if let Some(v) = section.max_identifier_length {
                limits.max_identifier_length = v;
            }
            if let Some(v) = section.max_string_length {
                limits.max_string_length = v;
            }
            if let Some(v) = section.max_nesting_depth {
                limits.max_nesting_depth = v;
            }
            if let Some(v) = section.max_ast_nodes {
                limits.max_ast_nodes = v;
            }
        }

        limits.validate()?;
        Ok(limits)
    }

    /// Validate that all limits are reasonable (positive, not absurdly large)
    pub fn validate(&self) -> Result<(), LimitError> {
        const MAX_REASONABLE: usize = 100_000_000; // 100 MB

        if self.max_input_size == 0 || self.max_input_size > MAX_REASONABLE {
            return Err(LimitError::invalid("max_input_size", self.max_input_size));
        }

        if self.max_token_count == 0 {
            return Err(LimitError::invalid("max_token_count", self.max_token_count));
        }

        if self.max_identifier_length == 0 || self.max_identifier_length > 100_000 {
            return Err(LimitError::invalid(
                "max_identifier_length",
                self.max_identifier_length,
            ));
        }

        if self.max_string_length == 0 || self.max_string_length > MAX_REASONABLE {
            return Err(LimitError::invalid(
                "max_string_length",
                self.max_string_length,
            ));
        }

        if self.max_nesting_depth == 0 || self.max_nesting_depth > 10_000 {
            return Err(LimitError::invalid(
                "max_nesting_depth",
                self.max_nesting_depth,
            ));
        }

        if self.max_ast_nodes == 0 || self.max_ast_nodes > 50_000_000 {
            return Err(LimitError::invalid("max_ast_nodes", self.max_ast_nodes));
        }

        Ok(())
    }
}

/// TOML configuration structures for deserialization
#[derive(Debug, Deserialize)]
struct LimitsFile {
    limits: Option<LimitsSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LimitsSection {
    max_input_size: Option<usize>,
    max_token_count: Option<usize>,
    max_identifier_length: Option<usize>,
    max_string_length: Option<usize>,
    max_nesting_depth: Option<usize>,
    max_ast_nodes: Option<usize>,
}

/// Error type for limit validation and loading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimitError {
    #[error("Limit error: failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("Limit error: failed to parse {path}: {message}")]
    Malformed { path: String, message: String },
    #[error("Limit error: invalid limit '{name}': {value} (must be positive and reasonable)")]
    Invalid { name: &'static str, value: usize },
}

impl LimitError {
    fn invalid(name: &'static str, value: usize) -> Self {
        Self::Invalid { name, value }
    }
}

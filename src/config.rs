//! Engine configuration.
//!
//! ```json
//! {
//!   "parallel": true,
//!   "parallel_threshold": 64,
//!   "max_tree_depth": 32,
//!   "constants": [{ "symbol": "atm", "value": 101325.0, "unit": "Pa" }]
//! }
//! ```
//!
//! Every field is optional; missing ones take their defaults.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Upper bound accepted for `max_tree_depth`.
pub const MAX_TREE_DEPTH_LIMIT: usize = 1024;

/// A system constant registered at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantConfig {
    pub symbol: String,
    pub value: f64,
    /// Symbol of a registered unit (`"1"` for dimensionless).
    pub unit: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Settings for one [`Workspace`](crate::Workspace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluate wide levels on the rayon pool (needs the `parallel` feature).
    pub parallel: bool,
    /// Smallest level width worth handing to rayon.
    pub parallel_threshold: usize,
    /// Default depth for dependency trees.
    pub max_tree_depth: usize,
    /// Recompute affected nodes right after every mutation.
    pub auto_recalculate: bool,
    pub constants: Vec<ConstantConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: 64,
            max_tree_depth: 32,
            auto_recalculate: false,
            constants: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallel_threshold == 0 {
            return Err(Error::Config("parallel_threshold must be at least 1".into()));
        }
        if self.max_tree_depth > MAX_TREE_DEPTH_LIMIT {
            return Err(Error::Config(format!(
                "max_tree_depth {} exceeds the limit of {MAX_TREE_DEPTH_LIMIT}",
                self.max_tree_depth
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for c in &self.constants {
            if !seen.insert(c.symbol.as_str()) {
                return Err(Error::Config(format!("constant '{}' is configured twice", c.symbol)));
            }
            if !c.value.is_finite() {
                return Err(Error::Config(format!("constant '{}' must be finite", c.symbol)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.parallel);
        assert_eq!(config.parallel_threshold, 64);
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_json(
            r#"{"parallel": false, "constants": [{"symbol": "atm", "value": 101325.0, "unit": "Pa"}]}"#,
        )
        .unwrap();
        assert!(!config.parallel);
        assert_eq!(config.max_tree_depth, 32);
        assert_eq!(config.constants[0].symbol, "atm");
        assert_eq!(config.constants[0].description, None);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"parallel_threshold": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"max_tree_depth": 100000}"#),
            Err(Error::Config(_))
        ));
        let dup = r#"{"constants": [
            {"symbol": "k", "value": 1.0, "unit": "1"},
            {"symbol": "k", "value": 2.0, "unit": "1"}
        ]}"#;
        assert!(matches!(EngineConfig::from_json(dup), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(EngineConfig::from_json("{parallel"), Err(Error::Json(_))));
    }
}

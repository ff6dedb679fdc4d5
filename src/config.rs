//! YAML configuration for encoders and classifiers.
//!
//! Both blocks are optional and every field inside them has a default, so a
//! config file only lists what it changes. Use [`load_config`] to read one.
//!
//! ```yaml
//! encoder:
//!   num_layers: 4
//!   input_size: 80
//!   hidden_size: 256
//!   projection_size: 64
//!   num_heads: 4
//!   right_window: 2
//!   attn_every_n_layers: 2
//!   causal: true
//! classifier:
//!   hidden_size: 128
//!   depth: 2
//!   has_attention: true
//! ```

use crate::model::classifier::ClassifierConfig;
use crate::model::encoder::EncoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Streaming encoder topology.
    pub encoder: EncoderConfig,
    /// Text classifier hyperparameters.
    pub classifier: ClassifierConfig,
}

/// Load a configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file doesn't exist, contains invalid YAML or names
/// an unknown field.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&data)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_blocks_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.yaml");
        fs::write(
            &path,
            "encoder:\n  num_layers: 3\n  right_window: 2\nclassifier:\n  has_attention: true\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.encoder.num_layers, 3);
        assert_eq!(config.encoder.right_window, 2);
        assert_eq!(config.encoder.highway_bias, -2.0);
        assert!(config.classifier.has_attention);
        assert_eq!(config.classifier.depth, 2);
    }

    #[test]
    fn unknown_fields_and_missing_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "encoder:\n  layers: 3\n").unwrap();
        assert!(load_config(&path).is_err());
        assert!(load_config(dir.path().join("missing.yaml")).is_err());
    }
}

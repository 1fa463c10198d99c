use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_IGNORE_SIZE, DEFAULT_MAX_SIZE, DEFAULT_MIN_SIZE};
use crate::error::{CellstreamError, Result};

/// Blob size limits for tracking, in pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Blobs with area `<= ignore_size` are noise.
    #[serde(default = "default_ignore_size")]
    pub ignore_size: usize,
    /// Blobs with area `< min_size` are discarded.
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    /// Blobs with area `> max_size` are discarded; `None` disables the limit.
    /// Written as `0` in config files, since TOML has no null.
    #[serde(default = "default_max_size", with = "zero_as_none")]
    pub max_size: Option<usize>,
}

fn default_ignore_size() -> usize {
    DEFAULT_IGNORE_SIZE
}

fn default_min_size() -> usize {
    DEFAULT_MIN_SIZE
}

fn default_max_size() -> Option<usize> {
    Some(DEFAULT_MAX_SIZE)
}

mod zero_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.unwrap_or(0) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let value = usize::deserialize(d)?;
        Ok((value > 0).then_some(value))
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            ignore_size: DEFAULT_IGNORE_SIZE,
            min_size: DEFAULT_MIN_SIZE,
            max_size: Some(DEFAULT_MAX_SIZE),
        }
    }
}

impl TrackingConfig {
    /// Whether a blob of `area` pixels is a plausible cell.
    pub fn accepts(&self, area: usize) -> bool {
        area > self.ignore_size
            && area >= self.min_size
            && self.max_size.is_none_or(|max| area <= max)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_size {
            if max < self.min_size {
                return Err(CellstreamError::InvalidParameter(format!(
                    "max_size ({max}) must be >= min_size ({})",
                    self.min_size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size_window() {
        let cfg = TrackingConfig::default();
        assert!(!cfg.accepts(300));
        assert!(!cfg.accepts(999));
        assert!(cfg.accepts(1000));
        assert!(cfg.accepts(10_000));
        assert!(!cfg.accepts(10_001));
    }

    #[test]
    fn test_ignore_size_dominates_min_size() {
        let cfg = TrackingConfig {
            ignore_size: 50,
            min_size: 10,
            max_size: None,
        };
        assert!(!cfg.accepts(50));
        assert!(cfg.accepts(51));
        assert!(cfg.accepts(usize::MAX));
    }

    #[test]
    fn test_unlimited_max_size_serializes_as_zero() {
        let cfg = TrackingConfig {
            max_size: None,
            ..TrackingConfig::default()
        };
        let text = toml::to_string(&cfg).unwrap();
        assert!(text.contains("max_size = 0"));
        let back: TrackingConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.max_size, None);
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let cfg = TrackingConfig {
            ignore_size: 0,
            min_size: 100,
            max_size: Some(10),
        };
        assert!(cfg.validate().is_err());
    }
}

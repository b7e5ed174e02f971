//! Filesystem creation parameters
//!
//! Sizes are given the way the UZIX tools accept them: a decimal number
//! followed by an optional unit letter, `b` for 512-byte blocks and `K`/`k`
//! for kilobytes; a bare number is a byte count. Every size must be a
//! multiple of the block size.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockdev::BLOCK_SIZE;
use crate::format::INODES_PER_BLOCK;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid size specification: {0:?}")]
    InvalidSize(String),
    #[error("Sizes must be multiples of 512 bytes (block size), got {0}")]
    NotBlockMultiple(u64),
    #[error("Layout needs {needed} bytes but the image holds {total} bytes")]
    TooSmall { needed: u64, total: u64 },
    #[error("{what} of {blocks} blocks exceeds its on-disk field")]
    TooLarge { what: &'static str, blocks: u64 },
    #[error("At least one inode block is required")]
    NoInodes,
}

/// A size in bytes, always a whole number of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "SizeRepr", into = "String")]
pub struct SizeSpec(u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeRepr {
    Bytes(u64),
    Text(String),
}

impl TryFrom<SizeRepr> for SizeSpec {
    type Error = ConfigError;

    fn try_from(repr: SizeRepr) -> Result<Self, Self::Error> {
        match repr {
            SizeRepr::Bytes(bytes) => Self::from_bytes(bytes),
            SizeRepr::Text(text) => text.parse(),
        }
    }
}

impl From<SizeSpec> for String {
    fn from(size: SizeSpec) -> Self {
        size.to_string()
    }
}

impl SizeSpec {
    /// A size of `bytes` bytes
    pub fn from_bytes(bytes: u64) -> Result<Self, ConfigError> {
        if bytes % BLOCK_SIZE as u64 != 0 {
            return Err(ConfigError::NotBlockMultiple(bytes));
        }
        Ok(Self(bytes))
    }

    /// A size of `blocks` blocks
    pub const fn from_blocks(blocks: u64) -> Self {
        Self(blocks * BLOCK_SIZE as u64)
    }

    /// Size in bytes
    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Size in blocks
    pub fn blocks(&self) -> u64 {
        self.0 / BLOCK_SIZE as u64
    }
}

impl FromStr for SizeSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ConfigError::InvalidSize(s.to_string());

        let (digits, unit) = match s.char_indices().last() {
            Some((idx, 'b')) => (&s[..idx], BLOCK_SIZE as u64),
            Some((idx, 'K')) | Some((idx, 'k')) => (&s[..idx], 1024),
            Some(_) => (s, 1),
            None => return Err(invalid()),
        };

        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let bytes = value.checked_mul(unit).ok_or_else(invalid)?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "0")
        } else if self.0 % 1024 == 0 {
            write!(f, "{}K", self.0 / 1024)
        } else {
            write!(f, "{}b", self.blocks())
        }
    }
}

/// Parameters for creating a new image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Total image size
    pub image_size: SizeSpec,
    /// Space given to inode blocks
    pub inode_size: SizeSpec,
    /// Space reserved between the superblock and the inode blocks
    pub reserved_size: SizeSpec,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            image_size: SizeSpec::from_blocks(1440),
            inode_size: SizeSpec::from_blocks(25),
            reserved_size: SizeSpec::from_blocks(0),
        }
    }
}

impl FormatConfig {
    /// Total blocks in the image
    pub fn total_blocks(&self) -> u64 {
        self.image_size.blocks()
    }

    /// Number of inode blocks
    pub fn inode_blocks(&self) -> u64 {
        self.inode_size.blocks()
    }

    /// Number of reserved blocks
    pub fn reserved_blocks(&self) -> u64 {
        self.reserved_size.blocks()
    }

    /// Data blocks left once boot, superblock, reserved and inode blocks are laid out
    pub fn data_blocks(&self) -> u64 {
        self.total_blocks()
            .saturating_sub(2 + self.reserved_blocks() + self.inode_blocks())
    }

    /// Check that the layout fits and every field fits its on-disk width
    pub fn validate(&self) -> Result<(), ConfigError> {
        // boot block, superblock and the root directory block
        let needed = self.reserved_size.bytes() + self.inode_size.bytes() + 3 * BLOCK_SIZE as u64;
        if needed > self.image_size.bytes() {
            return Err(ConfigError::TooSmall {
                needed,
                total: self.image_size.bytes(),
            });
        }
        if self.inode_blocks() == 0 {
            return Err(ConfigError::NoInodes);
        }
        if self.total_blocks() > u16::MAX as u64 {
            return Err(ConfigError::TooLarge {
                what: "image",
                blocks: self.total_blocks(),
            });
        }
        // the boot block records the reserved count in a single byte
        if self.reserved_blocks() > u8::MAX as u64 {
            return Err(ConfigError::TooLarge {
                what: "reserved area",
                blocks: self.reserved_blocks(),
            });
        }
        if self.inode_blocks() * INODES_PER_BLOCK as u64 > u16::MAX as u64 {
            return Err(ConfigError::TooLarge {
                what: "inode area",
                blocks: self.inode_blocks(),
            });
        }
        Ok(())
    }

    /// Load a configuration from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: FormatConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save_json_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_size_spec_units() {
        assert_eq!("720K".parse::<SizeSpec>().unwrap().bytes(), 737_280);
        assert_eq!("720k".parse::<SizeSpec>().unwrap().blocks(), 1440);
        assert_eq!("25b".parse::<SizeSpec>().unwrap().bytes(), 12_800);
        assert_eq!("368640".parse::<SizeSpec>().unwrap().blocks(), 720);
        assert_eq!("0".parse::<SizeSpec>().unwrap().bytes(), 0);
    }

    #[test]
    fn test_size_spec_rejects_bad_input() {
        assert!(matches!(
            "1000".parse::<SizeSpec>(),
            Err(ConfigError::NotBlockMultiple(1000))
        ));
        assert!(matches!("".parse::<SizeSpec>(), Err(ConfigError::InvalidSize(_))));
        assert!(matches!("12M".parse::<SizeSpec>(), Err(ConfigError::InvalidSize(_))));
        assert!(matches!("-5b".parse::<SizeSpec>(), Err(ConfigError::InvalidSize(_))));
    }

    #[test]
    fn test_size_spec_display() {
        assert_eq!(SizeSpec::from_blocks(1440).to_string(), "720K");
        assert_eq!(SizeSpec::from_blocks(25).to_string(), "25b");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = FormatConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.total_blocks(), 1440);
        assert_eq!(config.inode_blocks(), 25);
        assert_eq!(config.data_blocks(), 1413);
    }

    #[test]
    fn test_layout_must_fit() {
        let config = FormatConfig {
            image_size: SizeSpec::from_blocks(20),
            inode_size: SizeSpec::from_blocks(19),
            reserved_size: SizeSpec::from_blocks(0),
        };
        assert!(matches!(config.validate(), Err(ConfigError::TooSmall { .. })));

        let config = FormatConfig {
            image_size: SizeSpec::from_blocks(70_000),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::TooLarge { .. })));
    }

    #[test]
    fn test_reserved_area_fits_boot_byte() {
        let config = FormatConfig {
            image_size: SizeSpec::from_blocks(2000),
            inode_size: SizeSpec::from_blocks(25),
            reserved_size: SizeSpec::from_blocks(255),
        };
        assert!(config.validate().is_ok());

        let config = FormatConfig {
            reserved_size: SizeSpec::from_blocks(256),
            ..config
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooLarge {
                what: "reserved area",
                blocks: 256
            })
        ));
    }

    #[test]
    fn test_json_roundtrip_and_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("format.json");

        std::fs::write(&path, r#"{ "image_size": "360K", "reserved_size": 1024 }"#).unwrap();
        let config = FormatConfig::from_json_file(&path).unwrap();
        assert_eq!(config.total_blocks(), 720);
        assert_eq!(config.inode_blocks(), 25);
        assert_eq!(config.reserved_blocks(), 2);

        config.save_json_file(&path).unwrap();
        assert_eq!(FormatConfig::from_json_file(&path).unwrap(), config);

        std::fs::write(&path, r#"{ "image_size": "100" }"#).unwrap();
        assert!(matches!(
            FormatConfig::from_json_file(&path),
            Err(ConfigError::Json(_))
        ));
    }
}

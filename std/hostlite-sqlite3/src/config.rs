///
/// # Bridge Configuration
///
/// Connection and codec settings, loadable from TOML. Every field is
/// optional; an empty document yields `BridgeConfig::default()`.
///
/// ## Example
///
/// ```toml
/// [open]
/// read_only = false
/// create = true
/// uri = false
/// busy_timeout_ms = 250
///
/// [codec]
/// integers = "wide"   # "narrow" (32-bit, default) or "wide" (64-bit)
/// text = "latin1"     # "utf8" (default) or "latin1"
/// ```
///
/// `busy_timeout_ms` is unset by default, so lock contention surfaces as
/// `Step::Busy` immediately and retry policy stays with the caller.
///

use std::ffi::c_int;
use std::path::Path;

use rusqlite::ffi;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub open: OpenConfig,
    pub codec: CodecConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenConfig {
    pub read_only: bool,
    pub create: bool,
    pub uri: bool,
    pub busy_timeout_ms: Option<u32>,
}

impl Default for OpenConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            create: true,
            uri: false,
            busy_timeout_ms: None,
        }
    }
}

impl OpenConfig {
    /// Flags for `sqlite3_open_v2`
    pub fn flags(&self) -> c_int {
        let mut flags = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE
        };
        if self.create && !self.read_only {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        flags
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    pub integers: IntegerWidth,
    pub text: TextEncoding,
}

/// How INTEGER cells are read back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegerWidth {
    /// 32-bit reads; wider stored values wrap modulo 2^32
    #[default]
    Narrow,
    /// Full 64-bit reads
    Wide,
}

/// How TEXT is encoded on bind and decoded on read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// One byte per character, code points 0..=255 only
    Latin1,
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

//! Configuration type definitions
//!
//! These types represent the runtime configuration of the loader. Every field
//! has a default, so an empty file (or no file at all) is a valid config.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opcode of a near relative `call rel32`
pub const CALL_OPCODE: u8 = 0xE8;

/// Root configuration for the loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Plugin discovery settings
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Host call site redirected to the deferred init barrier
    #[serde(default)]
    pub anchor: AnchorConfig,

    /// Worker thread settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            plugins: PluginsConfig::default(),
            anchor: AnchorConfig::default(),
            worker: WorkerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// The anchor to patch, or `None` when patching is disabled
    pub fn anchor(&self) -> Option<&AnchorConfig> {
        self.anchor.enabled.then_some(&self.anchor)
    }

    /// Check the values serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        let ext = &self.plugins.extension;
        if ext.is_empty() {
            return Err(Error::Config("plugins.extension must not be empty".to_string()));
        }
        if ext.contains(['/', '\\', '*', '?', '.']) {
            return Err(Error::Config(format!(
                "plugins.extension '{}' must be a bare extension without dots, wildcards or separators",
                ext
            )));
        }
        if self.plugins.init_symbol.is_empty() {
            return Err(Error::Config("plugins.init_symbol must not be empty".to_string()));
        }
        if self.plugins.init_symbol.contains('\0') {
            return Err(Error::Config("plugins.init_symbol must not contain NUL".to_string()));
        }
        if self.plugins.directory.as_os_str().is_empty() {
            return Err(Error::Config("plugins.directory must not be empty".to_string()));
        }
        if let Some(expected) = &self.anchor.expected {
            if expected.len() != 5 || expected[0] != CALL_OPCODE {
                return Err(Error::Config(format!(
                    "anchor.expected must be 5 bytes starting with the call opcode {:02X}",
                    CALL_OPCODE
                )));
            }
        }
        Ok(())
    }
}

/// Plugin discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Plugin directory, relative to the host executable's directory
    #[serde(default = "default_plugin_dir")]
    pub directory: std::path::PathBuf,

    /// File extension plugins must carry, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Exported symbol of the optional zero-argument initializer
    #[serde(default = "default_init_symbol")]
    pub init_symbol: String,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_dir(),
            extension: default_extension(),
            init_symbol: default_init_symbol(),
        }
    }
}

fn default_plugin_dir() -> std::path::PathBuf {
    "plugins".into()
}

fn default_extension() -> String {
    "asi".to_string()
}

fn default_init_symbol() -> String {
    "InitAsi".to_string()
}

/// Location of the host call instruction redirected to the init barrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    /// Patch the host at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Offset of the call instruction from the host image base
    #[serde(default = "default_anchor_offset")]
    pub offset: u64,

    /// Bytes expected at the anchor before patching, e.g. `"E8 12 34 56 78"`.
    /// When unset only the call opcode is checked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_hex",
        deserialize_with = "deserialize_hex"
    )]
    pub expected: Option<Vec<u8>>,
}

/// Call into the host's startup routine right before its larger initialization
pub const DEFAULT_ANCHOR_OFFSET: u64 = 0x5C489;

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            offset: DEFAULT_ANCHOR_OFFSET,
            expected: None,
        }
    }
}

fn default_anchor_offset() -> u64 {
    DEFAULT_ANCHOR_OFFSET
}

/// Parse a whitespace separated hex byte string
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let compact: String = s.split_whitespace().collect();
    hex::decode(&compact).map_err(|e| Error::Config(format!("invalid hex bytes '{}': {}", s, e)))
}

/// Format bytes as upper-case hex pairs separated by spaces
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    let encoded = hex::encode_upper(bytes);
    let pairs: Vec<&str> = (0..encoded.len())
        .step_by(2)
        .map(|i| &encoded[i..i + 2])
        .collect();
    pairs.join(" ")
}

fn serialize_hex<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => serializer.serialize_some(&format_hex_bytes(bytes)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_hex<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Vec<u8>>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| parse_hex_bytes(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Worker thread settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Load plugins on a background thread. When false the pass always runs inline.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name given to the worker thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thread_name: default_thread_name(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_thread_name() -> String {
    "asi-loader".to_string()
}

/// Global logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Log file path, relative paths resolve against the host directory
    pub file: Option<std::path::PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

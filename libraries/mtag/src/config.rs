/// Engine configuration
use mtag_core::{Registry, Result, TagError};
use mtag_formats::{
    ApeAdapter, BuiltinFormats, Id3v1Adapter, Id3v2Adapter, Id3v2Version, APE_FORMAT,
    ID3V1_FORMAT, ID3V2_FORMAT, ID3V2_MAX_PADDING,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Format created by `tag(None, true)` on a file without tags
    #[serde(default = "default_format")]
    pub default_format: String,

    #[serde(default = "default_id3v2")]
    pub id3v2: Id3v2Settings,

    #[serde(default = "default_ape")]
    pub ape: ApeSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Id3v2Settings {
    /// Revision written on save (3 or 4)
    #[serde(default = "default_id3v2_version")]
    pub version: u8,

    /// Zero bytes appended after the last frame
    #[serde(default)]
    pub padding: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApeSettings {
    #[serde(default = "default_write_header")]
    pub write_header: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            id3v2: default_id3v2(),
            ape: default_ape(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// Environment variables use the `MTAG` prefix and `__` as the nesting
    /// separator, e.g. `MTAG__ID3V2__VERSION=3`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path).required(true));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("MTAG")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings
            .build()
            .map_err(|e| TagError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| TagError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if Id3v2Version::from_major(self.id3v2.version).is_none() {
            return Err(TagError::Config(format!(
                "id3v2.version must be 3 or 4, got {}",
                self.id3v2.version
            )));
        }

        if self.id3v2.padding > ID3V2_MAX_PADDING {
            return Err(TagError::Config(format!(
                "id3v2.padding must be at most {} bytes, got {}",
                ID3V2_MAX_PADDING, self.id3v2.padding
            )));
        }

        let builtin = [ID3V2_FORMAT, APE_FORMAT, ID3V1_FORMAT];
        if !builtin.contains(&self.default_format.as_str()) {
            return Err(TagError::Config(format!(
                "default_format '{}' is not one of {:?}",
                self.default_format, builtin
            )));
        }

        Ok(())
    }

    /// Built-in adapters carrying the configured write settings
    pub fn builtin_formats(&self) -> Result<BuiltinFormats> {
        self.validate()?;
        let version = Id3v2Version::from_major(self.id3v2.version).unwrap_or_default();

        Ok(BuiltinFormats {
            id3v2: Id3v2Adapter::new()
                .with_version(version)
                .with_padding(self.id3v2.padding),
            ape: ApeAdapter::new().with_header(self.ape.write_header),
            id3v1: Id3v1Adapter::new(),
        })
    }

    /// A registry with the built-in formats configured by this config
    pub fn build_registry(&self) -> Result<Registry> {
        let mut registry = Registry::new();
        self.builtin_formats()?.register_into(&mut registry)?;
        Ok(registry)
    }
}

// Default values
fn default_format() -> String {
    ID3V2_FORMAT.to_string()
}

fn default_id3v2() -> Id3v2Settings {
    Id3v2Settings {
        version: default_id3v2_version(),
        padding: 0,
    }
}

fn default_id3v2_version() -> u8 {
    4
}

fn default_ape() -> ApeSettings {
    ApeSettings {
        write_header: default_write_header(),
    }
}

fn default_write_header() -> bool {
    true
}

//! Sectioned key/value configuration
//!
//! Controller settings and processor secrets are both kept as named
//! sections of string values. On disk they are TOML documents whose
//! top-level tables are the sections:
//!
//! ```toml
//! ["Distributed Cache Client"]
//! "Server Hostname" = "cache.internal"
//! "Server Port" = 4557
//! _requires_service = "DistributedMapCacheServer"
//! ```
//!
//! Keys starting with `_` are directives for the deployer and are never
//! sent to the server.

use crate::error::{DeployError, Result};
use nifi_types::{Properties, PropertyValue};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Prefix marking a key as a deployer directive
pub const DIRECTIVE_PREFIX: char = '_';

/// Directive naming a service that must exist before this one is enabled
pub const REQUIRES_SERVICE: &str = "requires_service";

/// Key holding the component type of a service created from its section
pub const TYPE_KEY: &str = "type";

/// One named group of settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    values: BTreeMap<String, String>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value of a `_`-prefixed directive
    pub fn directive(&self, name: &str) -> Option<&str> {
        self.get(&format!("{}{}", DIRECTIVE_PREFIX, name))
    }

    /// Settings to send to the server, with directives removed
    pub fn properties(&self) -> Properties {
        self.values
            .iter()
            .filter(|(key, _)| !key.starts_with(DIRECTIVE_PREFIX))
            .map(|(key, value)| (key.clone(), PropertyValue::plain(value.clone())))
            .collect()
    }

    /// Number of settings, directives excluded
    pub fn property_count(&self) -> usize {
        self.values
            .keys()
            .filter(|key| !key.starts_with(DIRECTIVE_PREFIX))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A set of named sections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySections {
    sections: BTreeMap<String, Section>,
}

impl PropertySections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_section(mut self, name: impl Into<String>, section: Section) -> Self {
        self.insert(name, section);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, section: Section) {
        self.sections.insert(name.into(), section);
    }

    /// Parse a TOML document; every top-level table is a section
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let document: toml::Table = source
            .parse()
            .map_err(|e: toml::de::Error| DeployError::Config(e.to_string()))?;

        let mut sections = Self::new();
        for (name, value) in document {
            let toml::Value::Table(table) = value else {
                return Err(DeployError::Config(format!(
                    "top-level key '{}' must be a section table",
                    name
                )));
            };
            let mut section = Section::new();
            for (key, value) in table {
                let value = scalar_to_string(&value).ok_or_else(|| {
                    DeployError::Config(format!(
                        "section '{}' key '{}' must be a scalar value",
                        name, key
                    ))
                })?;
                section.values.insert(key, value);
            }
            sections.sections.insert(name, section);
        }
        Ok(sections)
    }

    /// Load a single TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| DeployError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&source).map_err(|e| match e {
            DeployError::Config(message) => {
                DeployError::Config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Load a file if it exists, otherwise start empty
    pub fn load_optional_file(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::load_file(path)
        } else {
            debug!(path = %path.display(), "No section file, continuing without");
            Ok(Self::new())
        }
    }

    /// Merge every `*.toml` file of a directory, in file name order
    ///
    /// A missing directory yields an empty set.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut sections = Self::new();
        if !dir.is_dir() {
            debug!(path = %dir.display(), "No section directory, continuing without");
            return Ok(sections);
        }

        let entries = std::fs::read_dir(dir)
            .map_err(|e| DeployError::Config(format!("cannot list {}: {}", dir.display(), e)))?;
        let mut files: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext == "toml"))
            .collect();
        files.sort();

        for file in files {
            for (name, section) in Self::load_file(&file)?.sections {
                if sections.sections.contains_key(&name) {
                    warn!(section = %name, file = %file.display(), "Section defined twice, later file wins");
                }
                sections.sections.insert(name, section);
            }
        }
        Ok(sections)
    }

    /// Section stored under exactly `name`
    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Section for a component name, trying the name as given and then
    /// with spaces replaced by underscores
    pub fn find(&self, name: &str) -> Option<(&str, &Section)> {
        if let Some((key, section)) = self.sections.get_key_value(name) {
            return Some((key.as_str(), section));
        }
        let normalized = normalize(name);
        self.sections
            .get_key_value(normalized.as_str())
            .map(|(key, section)| (key.as_str(), section))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Space-to-underscore form used for file and section names
pub fn normalize(name: &str) -> String {
    name.replace(' ', "_")
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

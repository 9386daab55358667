//! Built-in rule categories and preset bundles.
//!
//! The table is embedded JSON, parsed once on first use and shared read-only.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static CATALOG: Lazy<RuleCatalog> = Lazy::new(|| {
    serde_json::from_str(include_str!("catalog.json")).expect("Invalid embedded rule catalog")
});

/// Where traffic matching a category goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Through the category's selector group
    #[default]
    Proxy,
    /// Straight out, group defaults to `DIRECT`
    Direct,
    /// Dropped, no group
    Reject,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::Proxy => "proxy",
            Policy::Direct => "direct",
            Policy::Reject => "reject",
        })
    }
}

/// Match criteria of one category or custom rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMatch {
    pub domain_suffix: Vec<String>,
    pub domain_keyword: Vec<String>,
    pub ip_cidr: Vec<String>,
    pub geosite: Vec<String>,
    pub geoip: Vec<String>,
    pub protocol: Vec<String>,
}

impl RuleMatch {
    pub fn is_empty(&self) -> bool {
        self.domain_suffix.is_empty()
            && self.domain_keyword.is_empty()
            && self.ip_cidr.is_empty()
            && self.geosite.is_empty()
            && self.geoip.is_empty()
            && self.protocol.is_empty()
    }
}

/// A named rule category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCategory {
    /// Locale-invariant key, also the group name
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub policy: Policy,
    #[serde(flatten)]
    pub matches: RuleMatch,
}

#[derive(Debug, Clone, Deserialize)]
struct Preset {
    key: String,
    rules: Vec<String>,
}

/// The static category table with its presets.
#[derive(Debug, Deserialize)]
pub struct RuleCatalog {
    categories: Vec<RuleCategory>,
    presets: Vec<Preset>,
}

impl RuleCatalog {
    /// All categories in catalog order.
    pub fn categories(&self) -> &[RuleCategory] {
        &self.categories
    }

    /// Look up a category by its key.
    pub fn category(&self, name: &str) -> Option<&RuleCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Category names of a preset, in evaluation order.
    pub fn preset(&self, key: &str) -> Option<&[String]> {
        self.presets
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.rules.as_slice())
    }

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.key.as_str())
    }
}

/// The embedded catalog.
pub fn catalog() -> &'static RuleCatalog {
    &CATALOG
}

/// Category names of a built-in preset.
pub fn preset(key: &str) -> Option<&'static [String]> {
    catalog().preset(key)
}

/// Keys of the built-in presets.
pub fn preset_names() -> Vec<&'static str> {
    catalog().preset_names().collect()
}

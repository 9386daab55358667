//! Resolve a rule selection into the ordered list of effective rules.

use std::collections::HashSet;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use super::catalog::{self, Policy, RuleMatch};
use crate::error::{Result, SublinkError};
use crate::options::BuildOptions;
use crate::uri::percent_decode;

/// Preset used whenever a selection cannot be resolved.
pub const DEFAULT_PRESET: &str = "minimal";

/// Catalog part of a rule selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectedRules {
    /// A preset key such as `minimal`
    Preset(String),
    /// Explicit category names, in evaluation order
    Names(Vec<String>),
}

impl Default for SelectedRules {
    fn default() -> Self {
        SelectedRules::Preset(DEFAULT_PRESET.to_string())
    }
}

/// A user-defined rule, appended after the catalog categories.
///
/// Every match list accepts either a JSON array or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomRule {
    pub name: String,
    #[serde(deserialize_with = "string_or_list")]
    pub domain_suffix: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub domain_keyword: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub ip_cidr: Vec<String>,
    #[serde(alias = "site", deserialize_with = "string_or_list")]
    pub geosite: Vec<String>,
    #[serde(alias = "ip", deserialize_with = "string_or_list")]
    pub geoip: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub protocol: Vec<String>,
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let items = match Raw::deserialize(deserializer)? {
        Raw::List(items) => items,
        Raw::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// What the caller asked for: catalog categories plus custom rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSelection {
    pub rules: SelectedRules,
    pub custom: Vec<CustomRule>,
}

impl RuleSelection {
    pub fn preset(key: impl Into<String>) -> Self {
        Self {
            rules: SelectedRules::Preset(key.into()),
            custom: Vec::new(),
        }
    }

    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: SelectedRules::Names(names.into_iter().map(Into::into).collect()),
            custom: Vec::new(),
        }
    }

    /// Append custom rules.
    pub fn with_custom(mut self, custom: impl IntoIterator<Item = CustomRule>) -> Self {
        self.custom.extend(custom);
        self
    }

    /// Build a selection from request parameters.
    ///
    /// `selected` is a preset key or a (possibly percent-encoded) JSON array
    /// of names; anything else selects the `minimal` preset. `custom` is a
    /// JSON array of custom rules and is ignored when unparseable.
    pub fn from_query(selected: Option<&str>, custom: Option<&str>) -> Self {
        let rules = match selected.map(str::trim).filter(|s| !s.is_empty()) {
            None => SelectedRules::default(),
            Some(key) if catalog::preset(key).is_some() => SelectedRules::Preset(key.to_string()),
            Some(raw) => match serde_json::from_str::<Vec<String>>(&percent_decode(raw)) {
                Ok(names) => SelectedRules::Names(names),
                Err(e) => {
                    warn!(selected = raw, error = %e, "unparseable rule selection, using {}", DEFAULT_PRESET);
                    SelectedRules::default()
                }
            },
        };

        let custom = match custom.map(str::trim).filter(|s| !s.is_empty()) {
            None => Vec::new(),
            Some(raw) => serde_json::from_str(&percent_decode(raw)).unwrap_or_else(|e| {
                warn!(error = %e, "ignoring unparseable custom rules");
                Vec::new()
            }),
        };

        Self { rules, custom }
    }
}

/// One resolved rule, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRule {
    pub name: String,
    pub policy: Policy,
    /// Match lists; `ip_cidr` here is left empty, see [`EffectiveRule::ip_cidr`]
    pub matches: RuleMatch,
    pub ip_cidr: Vec<IpNet>,
    pub custom: bool,
}

impl EffectiveRule {
    /// Routing target: the rule's own group, or the reject sink.
    pub fn target<'a>(&'a self, options: &'a BuildOptions) -> &'a str {
        match self.policy {
            Policy::Reject => &options.reject_tag,
            Policy::Proxy | Policy::Direct => &self.name,
        }
    }

    /// Whether the rule gets its own selector group.
    pub fn has_group(&self) -> bool {
        self.policy != Policy::Reject
    }

    fn new(name: &str, policy: Policy, matches: &RuleMatch, custom: bool) -> Self {
        let mut matches = matches.clone();
        let ip_cidr = std::mem::take(&mut matches.ip_cidr)
            .into_iter()
            .filter_map(|cidr| match cidr.parse::<IpNet>() {
                Ok(net) => Some(net),
                Err(e) => {
                    warn!(rule = name, cidr = %cidr, error = %e, "dropping invalid CIDR");
                    None
                }
            })
            .collect();
        Self {
            name: name.to_string(),
            policy,
            matches,
            ip_cidr,
            custom,
        }
    }
}

impl From<&CustomRule> for RuleMatch {
    fn from(rule: &CustomRule) -> Self {
        RuleMatch {
            domain_suffix: rule.domain_suffix.clone(),
            domain_keyword: rule.domain_keyword.clone(),
            ip_cidr: rule.ip_cidr.clone(),
            geosite: rule.geosite.clone(),
            geoip: rule.geoip.clone(),
            protocol: rule.protocol.clone(),
        }
    }
}

/// Resolve a selection, failing on an unknown preset key.
pub fn resolve_strict(selection: &RuleSelection) -> Result<Vec<EffectiveRule>> {
    let names: Vec<&str> = match &selection.rules {
        SelectedRules::Preset(key) => catalog::preset(key)
            .ok_or_else(|| SublinkError::RuleResolution(key.clone()))?
            .iter()
            .map(String::as_str)
            .collect(),
        SelectedRules::Names(names) => names.iter().map(String::as_str).collect(),
    };
    Ok(materialize(&names, &selection.custom))
}

/// Resolve a selection; an unknown preset falls back to `minimal`.
pub fn resolve(selection: &RuleSelection) -> Vec<EffectiveRule> {
    match resolve_strict(selection) {
        Ok(rules) => rules,
        Err(e) => {
            warn!(error = %e, "falling back to {} preset", DEFAULT_PRESET);
            let names: Vec<&str> = catalog::preset(DEFAULT_PRESET)
                .unwrap_or_default()
                .iter()
                .map(String::as_str)
                .collect();
            materialize(&names, &selection.custom)
        }
    }
}

fn materialize(names: &[&str], custom: &[CustomRule]) -> Vec<EffectiveRule> {
    let catalog = catalog::catalog();
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(names.len() + custom.len());

    for name in names {
        let Some(category) = catalog.category(name) else {
            debug!(rule = *name, "unknown rule category");
            continue;
        };
        if seen.insert(category.name.as_str()) {
            rules.push(EffectiveRule::new(
                &category.name,
                category.policy,
                &category.matches,
                false,
            ));
        }
    }

    for rule in custom {
        let name = rule.name.trim();
        if name.is_empty() {
            continue;
        }
        if !seen.insert(name) {
            warn!(rule = name, "custom rule shadows an earlier rule, skipping");
            continue;
        }
        rules.push(EffectiveRule::new(name, Policy::Proxy, &rule.into(), true));
    }

    rules
}

use serde::Deserialize;

const DEFAULT_SELECTOR: &str = "Node Select";
const DEFAULT_SINGBOX_RULE_SET_BASE: &str =
    "https://raw.githubusercontent.com/SagerNet/sing-geosite/rule-set";
const DEFAULT_SINGBOX_GEOIP_BASE: &str =
    "https://raw.githubusercontent.com/SagerNet/sing-geoip/rule-set";
const DEFAULT_SURGE_RULE_SET_BASE: &str =
    "https://raw.githubusercontent.com/Loyalsoldier/surge-rules/release/ruleset";

/// Options shared by every config builder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Name of the manual selector group over all proxies
    pub selector_name: String,
    pub direct_tag: String,
    pub reject_tag: String,
    /// URL prefix of sing-box `geosite-<tag>.srs` rule sets
    pub singbox_rule_set_base: String,
    /// URL prefix of sing-box `geoip-<tag>.srs` rule sets
    pub singbox_geoip_base: String,
    /// URL prefix of Surge `<tag>.txt` rule sets
    pub surge_rule_set_base: String,
    /// Country routed direct by the catch-all rule
    pub catch_all_geoip: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            selector_name: DEFAULT_SELECTOR.to_string(),
            direct_tag: "DIRECT".to_string(),
            reject_tag: "REJECT".to_string(),
            singbox_rule_set_base: DEFAULT_SINGBOX_RULE_SET_BASE.to_string(),
            singbox_geoip_base: DEFAULT_SINGBOX_GEOIP_BASE.to_string(),
            surge_rule_set_base: DEFAULT_SURGE_RULE_SET_BASE.to_string(),
            catch_all_geoip: "cn".to_string(),
        }
    }
}

impl BuildOptions {
    /// Create new build options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the selector group name.
    pub fn with_selector_name(mut self, name: impl Into<String>) -> Self {
        self.selector_name = name.into();
        self
    }

    pub fn with_direct_tag(mut self, tag: impl Into<String>) -> Self {
        self.direct_tag = tag.into();
        self
    }

    pub fn with_reject_tag(mut self, tag: impl Into<String>) -> Self {
        self.reject_tag = tag.into();
        self
    }

    pub fn with_singbox_rule_set_base(mut self, base: impl Into<String>) -> Self {
        self.singbox_rule_set_base = base.into();
        self
    }

    pub fn with_singbox_geoip_base(mut self, base: impl Into<String>) -> Self {
        self.singbox_geoip_base = base.into();
        self
    }

    pub fn with_surge_rule_set_base(mut self, base: impl Into<String>) -> Self {
        self.surge_rule_set_base = base.into();
        self
    }

    /// Set the country code of the catch-all direct rule.
    pub fn with_catch_all_geoip(mut self, code: impl Into<String>) -> Self {
        self.catch_all_geoip = code.into();
        self
    }

    /// Catch-all country code as the rule engines spell it (`CN`).
    pub(crate) fn catch_all_upper(&self) -> String {
        self.catch_all_geoip.to_uppercase()
    }

    pub(crate) fn singbox_geosite_url(&self, tag: &str) -> String {
        format!(
            "{}/geosite-{}.srs",
            self.singbox_rule_set_base.trim_end_matches('/'),
            tag
        )
    }

    pub(crate) fn singbox_geoip_url(&self, tag: &str) -> String {
        format!(
            "{}/geoip-{}.srs",
            self.singbox_geoip_base.trim_end_matches('/'),
            tag
        )
    }

    pub(crate) fn surge_rule_set_url(&self, tag: &str) -> String {
        format!("{}/{}.txt", self.surge_rule_set_base.trim_end_matches('/'), tag)
    }
}

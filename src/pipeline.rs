//! End-to-end conversion: share links in, config text out.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::builder::{ConfigBuilder, Target};
use crate::error::{Result, SublinkError};
use crate::options::BuildOptions;
use crate::rules::{resolve, RuleSelection};
use crate::types::Node;
use crate::uri::parse_batch;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    SingBox,
    Clash,
    Surge,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::SingBox => "singbox",
            TargetKind::Clash => "clash",
            TargetKind::Surge => "surge",
        }
    }

    /// HTTP content type of the rendered config.
    pub fn content_type(&self) -> &'static str {
        match self {
            TargetKind::SingBox => "application/json; charset=utf-8",
            TargetKind::Clash => "text/yaml; charset=utf-8",
            TargetKind::Surge => "text/plain; charset=utf-8",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = SublinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "singbox" | "sing-box" => Ok(TargetKind::SingBox),
            "clash" | "mihomo" => Ok(TargetKind::Clash),
            "surge" => Ok(TargetKind::Surge),
            other => Err(SublinkError::ConfigValidation(format!(
                "unknown target format: {}",
                other
            ))),
        }
    }
}

/// Inputs of one conversion.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub target: TargetKind,
    /// Share links, one per entry; entries may hold several lines
    pub lines: Vec<String>,
    pub selection: RuleSelection,
    /// Base document text to merge into
    pub base: Option<String>,
    /// Surge only: URL the profile refreshes from
    pub subscription_url: Option<String>,
    pub options: BuildOptions,
}

impl ConvertRequest {
    pub fn new(target: TargetKind, lines: Vec<String>) -> Self {
        Self {
            target,
            lines,
            selection: RuleSelection::default(),
            base: None,
            subscription_url: None,
            options: BuildOptions::default(),
        }
    }

    pub fn with_selection(mut self, selection: RuleSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_subscription_url(mut self, url: impl Into<String>) -> Self {
        self.subscription_url = Some(url.into());
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }
}

/// Parse, classify, build and render.
///
/// Bad lines and nodes the target cannot express are skipped; the call
/// only fails when no link parses at all or the build itself fails.
pub fn convert(request: &ConvertRequest) -> Result<String> {
    let batch = parse_batch(request.lines.iter().flat_map(|entry| entry.lines()));
    if batch.nodes.is_empty() {
        return Err(SublinkError::ConfigValidation(format!(
            "no valid share link among {} input line(s)",
            batch.errors.len()
        )));
    }
    if !batch.errors.is_empty() {
        warn!(
            parsed = batch.nodes.len(),
            failed = batch.errors.len(),
            "some share links were skipped"
        );
    }

    render_nodes(request, &batch.nodes)
}

/// Classify, build and render already parsed nodes. `request.lines` is
/// ignored.
pub fn render_nodes(request: &ConvertRequest, nodes: &[Node]) -> Result<String> {
    let rules = resolve(&request.selection);
    debug!(target_format = %request.target, nodes = nodes.len(), rules = rules.len(), "building config");

    match request.target {
        #[cfg(feature = "singbox")]
        TargetKind::SingBox => render::<crate::builder::SingBox>(request, nodes, rules),
        #[cfg(feature = "clash")]
        TargetKind::Clash => render::<crate::builder::Clash>(request, nodes, rules),
        #[cfg(feature = "surge")]
        TargetKind::Surge => {
            let built = ConfigBuilder::<crate::builder::Surge, _>::new(request.options.clone())
                .add_proxies(nodes)
                .apply_rules(rules)?
                .build_with_base(request.base.as_deref())?;
            let built = match &request.subscription_url {
                Some(url) => built.with_subscription_url(url.as_str()),
                None => built,
            };
            built.format_config()
        }
        #[allow(unreachable_patterns)]
        other => Err(SublinkError::ConfigValidation(format!(
            "{} support is not compiled in",
            other
        ))),
    }
}

fn render<T: Target>(
    request: &ConvertRequest,
    nodes: &[Node],
    rules: Vec<crate::rules::EffectiveRule>,
) -> Result<String> {
    ConfigBuilder::<T, _>::new(request.options.clone())
        .add_proxies(nodes)
        .apply_rules(rules)?
        .build_with_base(request.base.as_deref())?
        .format_config()
}

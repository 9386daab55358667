//! Config document synthesis.
//!
//! A [`ConfigBuilder`] moves through four states, each transition consuming
//! the builder:
//!
//! ```text
//! Empty --add_proxies--> ProxiesLoaded --apply_rules--> RulesApplied --build--> Built
//! ```
//!
//! The target format is a type parameter implementing [`Target`]; the three
//! supported engines live in their own modules.

#[cfg(feature = "clash")]
mod clash;
#[cfg(feature = "singbox")]
mod singbox;
#[cfg(feature = "surge")]
mod surge;

#[cfg(feature = "clash")]
pub use clash::{Clash, ClashProxy};
#[cfg(feature = "singbox")]
pub use singbox::{SingBox, SingboxOutbound};
#[cfg(feature = "surge")]
pub use surge::{Surge, SurgeDocument, SurgeProxy};

use std::collections::HashSet;
use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::error::{Result, SublinkError};
use crate::options::BuildOptions;
use crate::rules::{EffectiveRule, Policy};
use crate::types::Node;

/// A config format the builder can emit.
pub trait Target {
    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// Proxy stanza in the target's own shape.
    type Proxy: Clone + PartialEq;

    /// The whole config document.
    type Document;

    /// Convert a node, or `None` when the format cannot express it.
    fn convert_proxy(node: &Node) -> Option<Self::Proxy>;

    fn proxy_tag(proxy: &Self::Proxy) -> &str;

    fn set_proxy_tag(proxy: &mut Self::Proxy, tag: String);

    /// Document used when the caller supplies no base.
    fn default_document(options: &BuildOptions) -> Self::Document;

    /// Parse a caller-supplied base document.
    fn parse_base(text: &str) -> Result<Self::Document>;

    /// Replace the proxy, group and rule sections of `document`.
    fn assemble(
        document: &mut Self::Document,
        proxies: &[Self::Proxy],
        groups: &[ProxyGroup],
        rules: &[EffectiveRule],
        options: &BuildOptions,
    ) -> Result<()>;

    /// Serialize the finished document.
    fn format_config(document: &Self::Document) -> Result<String>;
}

/// A manual selection group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyGroup {
    pub name: String,
    pub members: Vec<String>,
}

/// Initial state, nothing loaded.
#[derive(Debug)]
pub struct Empty;

/// Proxies converted, rules not yet applied.
#[derive(Debug)]
pub struct ProxiesLoaded<P> {
    proxies: Vec<P>,
}

/// Groups and rules synthesized.
#[derive(Debug)]
pub struct RulesApplied<P> {
    proxies: Vec<P>,
    groups: Vec<ProxyGroup>,
    rules: Vec<EffectiveRule>,
}

/// Finished document.
#[derive(Debug)]
pub struct Built<D> {
    document: D,
}

/// Type-state config builder for target `T`.
#[derive(Debug)]
pub struct ConfigBuilder<T: Target, S> {
    options: BuildOptions,
    state: S,
    _target: PhantomData<T>,
}

impl<T: Target, S> ConfigBuilder<T, S> {
    fn with_state<N>(self, state: N) -> ConfigBuilder<T, N> {
        ConfigBuilder {
            options: self.options,
            state,
            _target: PhantomData,
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }
}

impl<T: Target> ConfigBuilder<T, Empty> {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            state: Empty,
            _target: PhantomData,
        }
    }

    /// Convert and load nodes. Nodes the target cannot express are logged
    /// and skipped.
    pub fn add_proxies<'a, I>(self, nodes: I) -> ConfigBuilder<T, ProxiesLoaded<T::Proxy>>
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let mut builder = self.with_state(ProxiesLoaded {
            proxies: Vec::new(),
        });
        for node in nodes {
            if let Err(e) = builder.add_node(node) {
                warn!(target_format = T::NAME, tag = node.tag(), error = %e, "skipping node");
            }
        }
        builder
    }
}

impl<T: Target> ConfigBuilder<T, ProxiesLoaded<T::Proxy>> {
    /// Convert one node and add it.
    pub fn add_node(&mut self, node: &Node) -> Result<()> {
        let proxy = T::convert_proxy(node).ok_or(SublinkError::UnsupportedNodeForTarget {
            target: T::NAME,
            kind: node.kind(),
        })?;
        self.add_proxy_to_config(proxy);
        Ok(())
    }

    /// Add a converted proxy.
    ///
    /// Proxies are keyed by tag: when the tag is already present the
    /// existing proxy is kept and `proxy` is dropped.
    pub fn add_proxy_to_config(&mut self, proxy: T::Proxy) {
        let proxies = &mut self.state.proxies;
        let tag = T::proxy_tag(&proxy);
        if proxies.iter().any(|p| T::proxy_tag(p) == tag) {
            debug!(tag, "proxy tag already present");
            return;
        }
        proxies.push(proxy);
    }

    pub fn proxies(&self) -> &[T::Proxy] {
        &self.state.proxies
    }

    /// Synthesize groups for `rules`.
    ///
    /// Fails with `ConfigValidation` when no proxy was loaded.
    pub fn apply_rules(
        self,
        rules: Vec<EffectiveRule>,
    ) -> Result<ConfigBuilder<T, RulesApplied<T::Proxy>>> {
        if self.state.proxies.is_empty() {
            return Err(SublinkError::ConfigValidation(format!(
                "{} config needs at least one proxy",
                T::NAME
            )));
        }
        let mut proxies = self.state.proxies;
        rename_reserved::<T>(&mut proxies, &rules, &self.options);
        let tags: Vec<&str> = proxies.iter().map(T::proxy_tag).collect();
        let groups = synthesize_groups(&tags, &rules, &self.options);
        Ok(ConfigBuilder {
            options: self.options,
            state: RulesApplied {
                proxies,
                groups,
                rules,
            },
            _target: PhantomData,
        })
    }
}

impl<T: Target> ConfigBuilder<T, RulesApplied<T::Proxy>> {
    pub fn groups(&self) -> &[ProxyGroup] {
        &self.state.groups
    }

    pub fn rules(&self) -> &[EffectiveRule] {
        &self.state.rules
    }

    /// Assemble the document into `base`, or into the target's default.
    pub fn build(self, base: Option<T::Document>) -> Result<ConfigBuilder<T, Built<T::Document>>> {
        let mut document = base.unwrap_or_else(|| T::default_document(&self.options));
        T::assemble(
            &mut document,
            &self.state.proxies,
            &self.state.groups,
            &self.state.rules,
            &self.options,
        )?;
        Ok(self.with_state(Built { document }))
    }

    /// Like [`build`](Self::build), parsing the base from text first.
    pub fn build_with_base(
        self,
        base: Option<&str>,
    ) -> Result<ConfigBuilder<T, Built<T::Document>>> {
        let base = base
            .filter(|text| !text.trim().is_empty())
            .map(T::parse_base)
            .transpose()?;
        self.build(base)
    }
}

impl<T: Target> ConfigBuilder<T, Built<T::Document>> {
    pub fn document(&self) -> &T::Document {
        &self.state.document
    }

    pub fn into_document(self) -> T::Document {
        self.state.document
    }

    pub fn format_config(&self) -> Result<String> {
        T::format_config(&self.state.document)
    }
}

/// Rename proxies whose tag is a group or sink name, `"<tag> #n"` like
/// batch parsing does.
fn rename_reserved<T: Target>(
    proxies: &mut [T::Proxy],
    rules: &[EffectiveRule],
    options: &BuildOptions,
) {
    let mut taken: HashSet<String> = [
        &options.selector_name,
        &options.direct_tag,
        &options.reject_tag,
    ]
    .into_iter()
    .cloned()
    .chain(rules.iter().filter(|r| r.has_group()).map(|r| r.name.clone()))
    .collect();
    let reserved = taken.clone();
    taken.extend(proxies.iter().map(|p| T::proxy_tag(p).to_string()));

    for proxy in proxies.iter_mut() {
        let base = T::proxy_tag(proxy).to_string();
        if !reserved.contains(&base) {
            continue;
        }
        let mut n = 2;
        let mut tag = format!("{} #{}", base, n);
        while taken.contains(&tag) {
            n += 1;
            tag = format!("{} #{}", base, n);
        }
        warn!(from = %base, to = %tag, "proxy tag clashes with a group name");
        taken.insert(tag.clone());
        T::set_proxy_tag(proxy, tag);
    }
}

/// Selector first, then one group per category that routes to a group.
fn synthesize_groups(
    proxy_tags: &[&str],
    rules: &[EffectiveRule],
    options: &BuildOptions,
) -> Vec<ProxyGroup> {
    let mut groups = Vec::with_capacity(rules.len() + 1);
    groups.push(ProxyGroup {
        name: options.selector_name.clone(),
        members: proxy_tags.iter().map(|t| t.to_string()).collect(),
    });

    for rule in rules.iter().filter(|r| r.has_group()) {
        let members = match rule.policy {
            Policy::Direct => vec![options.direct_tag.clone(), options.selector_name.clone()],
            _ => vec![
                options.selector_name.clone(),
                options.direct_tag.clone(),
                options.reject_tag.clone(),
            ],
        };
        groups.push(ProxyGroup {
            name: rule.name.clone(),
            members,
        });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{resolve, RuleSelection};

    #[test]
    fn test_synthesize_groups() {
        let options = BuildOptions::default();
        let rules = resolve(&RuleSelection::names(["Ad Block", "Private", "Github"]));
        let groups = synthesize_groups(&["A", "B"], &rules, &options);

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Node Select", "Private", "Github"]);
        assert_eq!(groups[0].members, ["A", "B"]);
        assert_eq!(groups[1].members, ["DIRECT", "Node Select"]);
        assert_eq!(groups[2].members, ["Node Select", "DIRECT", "REJECT"]);
    }

    #[cfg(feature = "singbox")]
    #[test]
    fn test_same_tag_keeps_first_proxy() {
        let a = crate::uri::parse("trojan://one@a.example.com:443#Dup").unwrap();
        let b = crate::uri::parse("trojan://two@b.example.com:443#Dup").unwrap();
        let builder = ConfigBuilder::<SingBox, _>::new(BuildOptions::default()).add_proxies([&a, &b]);

        assert_eq!(builder.proxies().len(), 1);
        assert_eq!(builder.proxies()[0].server, "a.example.com");
    }

    #[cfg(feature = "singbox")]
    #[test]
    fn test_reserved_tags_are_renamed() {
        let nodes: Vec<Node> = [
            "trojan://a@a.example.com:443#Private",
            "trojan://b@b.example.com:443#DIRECT",
            "trojan://c@c.example.com:443#Private%20%232",
            "trojan://d@d.example.com:443#Tokyo",
        ]
        .iter()
        .map(|line| crate::uri::parse(line).unwrap())
        .collect();

        let builder = ConfigBuilder::<SingBox, _>::new(BuildOptions::default())
            .add_proxies(&nodes)
            .apply_rules(resolve(&RuleSelection::preset("minimal")))
            .unwrap();
        assert_eq!(
            builder.groups()[0].members,
            ["Private #3", "DIRECT #2", "Private #2", "Tokyo"]
        );
    }
}

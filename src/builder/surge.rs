//! Surge plaintext target.

use std::borrow::Cow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{Built, ConfigBuilder, ProxyGroup, Target};
use crate::error::{Result, SublinkError};
use crate::options::BuildOptions;
use crate::rules::EffectiveRule;
use crate::types::{Network, Node, Tls, Transport};

/// Section header: `[Name]`
static SECTION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(.+)\]$").expect("SECTION_HEADER: hardcoded regex is invalid")
});

const MANAGED_CONFIG: &str = "#!MANAGED-CONFIG";
const UPDATE_INTERVAL_SECS: u64 = 43200;

const PROXY_SECTION: &str = "Proxy";
const GROUP_SECTION: &str = "Proxy Group";
const RULE_SECTION: &str = "Rule";

/// Protocols Surge's `PROTOCOL` rule understands.
const SURGE_PROTOCOLS: &[&str] = &["http", "https", "tcp", "udp", "quic", "stun"];

/// Surge config.
#[derive(Debug, Clone, Copy)]
pub struct Surge;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    lines: Vec<String>,
}

/// A Surge profile: ordered `[Section]`s of raw lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SurgeDocument {
    managed_url: Option<String>,
    /// Lines before the first section header
    preamble: Vec<String>,
    sections: Vec<Section>,
}

impl SurgeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse profile text. Blank lines are dropped; an existing
    /// `#!MANAGED-CONFIG` header is remembered.
    pub fn parse(text: &str) -> Self {
        let mut document = Self::new();
        for line in text.lines().map(str::trim_end) {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix(MANAGED_CONFIG) {
                document.managed_url = rest.split_whitespace().next().map(str::to_string);
                continue;
            }
            if let Some(caps) = SECTION_HEADER.captures(line.trim()) {
                document.sections.push(Section {
                    name: caps[1].to_string(),
                    lines: Vec::new(),
                });
                continue;
            }
            match document.sections.last_mut() {
                Some(section) => section.lines.push(line.to_string()),
                None => document.preamble.push(line.to_string()),
            }
        }
        document
    }

    /// Lines of a section, if present.
    pub fn section(&self, name: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.lines.as_slice())
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Replace a section's lines, appending the section if missing.
    pub fn set_section(&mut self, name: &str, lines: Vec<String>) {
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(section) => section.lines = lines,
            None => self.sections.push(Section {
                name: name.to_string(),
                lines,
            }),
        }
    }

    /// Emit a `#!MANAGED-CONFIG` header pointing at `url`.
    pub fn set_managed_url(&mut self, url: impl Into<String>) {
        self.managed_url = Some(url.into());
    }

    pub fn managed_url(&self) -> Option<&str> {
        self.managed_url.as_deref()
    }
}

impl fmt::Display for SurgeDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(url) = &self.managed_url {
            writeln!(
                f,
                "{} {} interval={} strict=false",
                MANAGED_CONFIG, url, UPDATE_INTERVAL_SECS
            )?;
        }
        for line in &self.preamble {
            writeln!(f, "{}", line)?;
        }
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 || !self.preamble.is_empty() || self.managed_url.is_some() {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for line in &section.lines {
                writeln!(f, "{}", line)?;
            }
        }
        Ok(())
    }
}

/// One `[Proxy]` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurgeProxy {
    pub name: String,
    pub kind: &'static str,
    pub server: String,
    pub port: u16,
    pub params: Vec<(&'static str, String)>,
}

impl SurgeProxy {
    fn new(kind: &'static str, node: &Node) -> Self {
        Self {
            name: proxy_name(node.tag()),
            kind,
            server: node.server().to_string(),
            port: node.port(),
            params: Vec::new(),
        }
    }

    fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    fn param_opt(self, key: &'static str, value: Option<&str>) -> Self {
        match value.filter(|v| !v.is_empty()) {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    fn tls(self, tls: &Tls) -> Self {
        let proxy = self.param_opt("sni", tls.sni.as_deref());
        if tls.insecure {
            proxy.param("skip-cert-verify", "true")
        } else {
            proxy
        }
    }

    /// Only tcp and ws are expressible.
    fn transport(self, transport: Option<&Transport>) -> Option<Self> {
        match transport.map(|t| (&t.network, t)) {
            None | Some((Network::Tcp, _)) => Some(self),
            Some((Network::Ws, t)) => Some(
                self.param("ws", "true")
                    .param_opt("ws-path", t.path.as_deref())
                    .param_opt(
                        "ws-headers",
                        t.host.as_ref().map(|h| format!("Host:{}", h)).as_deref(),
                    ),
            ),
            Some((network, _)) => {
                debug!(network = %network, "surge has no such transport");
                None
            }
        }
    }
}

/// Proxy names sit left of `=` and inside comma lists, so neither may appear.
fn proxy_name(tag: &str) -> String {
    tag.replace([',', '='], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a parameter value that would otherwise break the line.
fn quote_value(value: &str) -> Cow<'_, str> {
    let needs_quotes = value.contains([',', '=', '"'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\\\"")))
    } else {
        Cow::Borrowed(value)
    }
}

impl fmt::Display for SurgeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}, {}, {}", self.name, self.kind, self.server, self.port)?;
        for (key, value) in &self.params {
            write!(f, ", {}={}", key, quote_value(value))?;
        }
        Ok(())
    }
}

impl Target for Surge {
    const NAME: &'static str = "surge";

    type Proxy = SurgeProxy;
    type Document = SurgeDocument;

    fn convert_proxy(node: &Node) -> Option<SurgeProxy> {
        match node {
            Node::Shadowsocks(n) => {
                let proxy = SurgeProxy::new("ss", node)
                    .param("encrypt-method", n.cipher.as_str())
                    .param("password", n.password.as_str());
                match n.plugin.as_deref() {
                    None => Some(proxy),
                    Some("obfs-local" | "simple-obfs" | "obfs") => {
                        let opts = n.plugin_opts.as_deref().unwrap_or_default();
                        let mut proxy = proxy;
                        for (key, value) in opts.split(';').filter_map(|p| p.split_once('=')) {
                            match key.trim() {
                                "obfs" => proxy = proxy.param("obfs", value.trim()),
                                "obfs-host" => proxy = proxy.param("obfs-host", value.trim()),
                                _ => {}
                            }
                        }
                        Some(proxy)
                    }
                    Some(_) => None,
                }
            }
            Node::Vmess(n) => {
                let mut proxy = SurgeProxy::new("vmess", node).param("username", n.uuid.as_str());
                if let Some(tls) = &n.tls {
                    proxy = proxy.param("tls", "true").tls(tls);
                }
                if n.alter_id == 0 {
                    proxy = proxy.param("vmess-aead", "true");
                }
                proxy.transport(Some(&n.transport))
            }
            Node::Trojan(n) => {
                let tls = n.tls.as_ref()?;
                if tls.reality.is_some() {
                    return None;
                }
                SurgeProxy::new("trojan", node)
                    .param("password", n.password.as_str())
                    .tls(tls)
                    .transport(n.transport.as_ref())
            }
            Node::Hysteria2(n) => {
                if n.obfs.is_some() {
                    return None;
                }
                Some(
                    SurgeProxy::new("hysteria2", node)
                        .param("password", n.password.as_str())
                        .tls(&n.tls),
                )
            }
            Node::Tuic(n) => Some(
                SurgeProxy::new("tuic-v5", node)
                    .param("password", n.password.as_str())
                    .param("uuid", n.uuid.as_str())
                    .param_opt("alpn", n.tls.alpn.first().map(String::as_str))
                    .tls(&n.tls),
            ),
            Node::Vless(_) => None,
        }
    }

    fn proxy_tag(proxy: &SurgeProxy) -> &str {
        &proxy.name
    }

    fn set_proxy_tag(proxy: &mut SurgeProxy, tag: String) {
        proxy.name = proxy_name(&tag);
    }

    fn default_document(_options: &BuildOptions) -> SurgeDocument {
        let mut document = SurgeDocument::new();
        document.set_section(
            "General",
            vec![
                "loglevel = notify".to_string(),
                "skip-proxy = 127.0.0.1, 192.168.0.0/16, 10.0.0.0/8, 172.16.0.0/12, 100.64.0.0/10, localhost, *.local".to_string(),
                "dns-server = system, 1.1.1.1, 8.8.8.8".to_string(),
            ],
        );
        document
    }

    fn parse_base(text: &str) -> Result<SurgeDocument> {
        let document = SurgeDocument::parse(text);
        if document.sections.is_empty() {
            return Err(SublinkError::ConfigValidation(
                "surge base config has no [Section]".to_string(),
            ));
        }
        Ok(document)
    }

    fn assemble(
        document: &mut SurgeDocument,
        proxies: &[SurgeProxy],
        groups: &[ProxyGroup],
        rules: &[EffectiveRule],
        options: &BuildOptions,
    ) -> Result<()> {
        document.set_section(PROXY_SECTION, proxies.iter().map(|p| p.to_string()).collect());
        document.set_section(
            GROUP_SECTION,
            groups
                .iter()
                .map(|g| format!("{} = select, {}", g.name, g.members.join(", ")))
                .collect(),
        );

        let mut lines = Vec::new();
        for rule in rules {
            lines.extend(rule_lines(rule, options));
        }
        lines.push(format!("GEOIP,{},{}", options.catch_all_upper(), options.direct_tag));
        lines.push(format!("FINAL,{}", options.selector_name));
        document.set_section(RULE_SECTION, lines);
        Ok(())
    }

    fn format_config(document: &SurgeDocument) -> Result<String> {
        Ok(document.to_string())
    }
}

impl ConfigBuilder<Surge, Built<SurgeDocument>> {
    /// Mark the profile as managed, refreshed from `url`.
    pub fn with_subscription_url(mut self, url: impl Into<String>) -> Self {
        self.state.document.set_managed_url(url);
        self
    }
}

fn rule_lines(rule: &EffectiveRule, options: &BuildOptions) -> Vec<String> {
    let target = rule.target(options);
    let matches = &rule.matches;
    let mut lines = Vec::new();

    for site in &matches.geosite {
        lines.push(format!(
            "RULE-SET,{},{}",
            options.surge_rule_set_url(site),
            target
        ));
    }
    for suffix in &matches.domain_suffix {
        lines.push(format!("DOMAIN-SUFFIX,{},{}", suffix, target));
    }
    for keyword in &matches.domain_keyword {
        lines.push(format!("DOMAIN-KEYWORD,{},{}", keyword, target));
    }
    for net in &rule.ip_cidr {
        let kind = match net {
            ipnet::IpNet::V4(_) => "IP-CIDR",
            ipnet::IpNet::V6(_) => "IP-CIDR6",
        };
        lines.push(format!("{},{},{},no-resolve", kind, net, target));
    }
    for ip in &matches.geoip {
        // Surge only knows ISO country codes
        if ip.len() == 2 && ip.chars().all(|c| c.is_ascii_alphabetic()) {
            lines.push(format!("GEOIP,{},{}", ip.to_uppercase(), target));
        } else {
            debug!(rule = %rule.name, geoip = %ip, "surge has no such geoip set, skipping");
        }
    }
    for protocol in &matches.protocol {
        let lower = protocol.to_lowercase();
        if SURGE_PROTOCOLS.contains(&lower.as_str()) {
            lines.push(format!("PROTOCOL,{},{}", lower.to_uppercase(), target));
        } else {
            debug!(rule = %rule.name, protocol = %protocol, "surge cannot match protocol, skipping");
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{resolve, RuleSelection};
    use crate::uri::parse;

    fn convert(line: &str) -> Option<SurgeProxy> {
        Surge::convert_proxy(&parse(line).unwrap())
    }

    #[test]
    fn test_delimiters_in_names_and_values() {
        let proxy = convert("trojan://p%2Cw%3Dx@a.example.com:443#A%2C%20B%3DC").unwrap();
        assert_eq!(
            proxy.to_string(),
            r#"A B C = trojan, a.example.com, 443, password="p,w=x""#
        );

        let proxy = convert("trojan://say%22hi%22@a.example.com:443#Q").unwrap();
        assert_eq!(
            proxy.to_string(),
            r#"Q = trojan, a.example.com, 443, password="say\"hi\"""#
        );
    }

    #[test]
    fn test_section_header_pattern() {
        assert!(SECTION_HEADER.is_match("[Proxy Group]"));
        assert!(!SECTION_HEADER.is_match("[]"));
    }

    #[test]
    fn test_proxy_lines() {
        let ss = convert("ss://YWVzLTI1Ni1nY206cGFzcw@1.1.1.1:8388#S").unwrap();
        assert_eq!(
            ss.to_string(),
            "S = ss, 1.1.1.1, 8388, encrypt-method=aes-256-gcm, password=pass"
        );

        let trojan = convert(
            "trojan://pw@t.example.com:443?sni=t.example.com&allowInsecure=1&type=ws&path=%2Fws#T",
        )
        .unwrap();
        assert_eq!(
            trojan.to_string(),
            "T = trojan, t.example.com, 443, password=pw, sni=t.example.com, skip-cert-verify=true, ws=true, ws-path=/ws"
        );

        let tuic = convert("tuic://u:p@q.example.com:443?alpn=h3&sni=q.example.com#Q").unwrap();
        assert_eq!(
            tuic.to_string(),
            "Q = tuic-v5, q.example.com, 443, password=p, uuid=u, alpn=h3, sni=q.example.com"
        );
    }

    #[test]
    fn test_unsupported_nodes() {
        assert!(convert("vless://u@v.example.com:443?security=tls#V").is_none());
        assert!(convert("trojan://pw@t.example.com:443?type=grpc&serviceName=s#T").is_none());
        assert!(convert("ss://YWVzLTI1Ni1nY206cHc=@s.com:8388?plugin=v2ray-plugin#S").is_none());
    }

    #[test]
    fn test_document_roundtrip_keeps_other_sections() {
        let text = "#!MANAGED-CONFIG https://old.example interval=1\n[General]\nloglevel = verbose\n\n[Proxy]\nold = direct\n\n[Host]\nexample.com = 1.2.3.4\n";
        let document = Surge::parse_base(text).unwrap();
        assert_eq!(document.managed_url(), Some("https://old.example"));
        assert_eq!(
            document.section_names().collect::<Vec<_>>(),
            ["General", "Proxy", "Host"]
        );
        assert_eq!(document.section("Host").unwrap(), ["example.com = 1.2.3.4"]);
        assert!(Surge::parse_base("no sections here").is_err());
    }

    #[test]
    fn test_build_with_managed_header() {
        let node = parse("hy2://pw@h.example.com:443?sni=h.example.com#H").unwrap();
        let text = ConfigBuilder::<Surge, _>::new(BuildOptions::default())
            .add_proxies([&node])
            .apply_rules(resolve(&RuleSelection::names(["Google", "P2P"])))
            .unwrap()
            .build(None)
            .unwrap()
            .with_subscription_url("https://sub.example/surge?config=x")
            .format_config()
            .unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("#!MANAGED-CONFIG https://sub.example/surge?config=x interval=43200 strict=false")
        );
        assert!(text.contains("\n[General]\n"));
        assert!(text.contains("H = hysteria2, h.example.com, 443, password=pw, sni=h.example.com"));
        assert!(text.contains("Node Select = select, H"));
        assert!(text.contains("Google = select, Node Select, DIRECT, REJECT"));
        assert!(text.contains("RULE-SET,"));
        assert!(!text.contains("bittorrent"));
        assert!(!text.contains("GEOIP,GOOGLE"));
        assert!(text.ends_with("GEOIP,CN,DIRECT\nFINAL,Node Select\n"));
    }
}

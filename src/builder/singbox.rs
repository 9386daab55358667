//! sing-box JSON target.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{ProxyGroup, Target};
use crate::error::{Result, SublinkError};
use crate::options::BuildOptions;
use crate::rules::EffectiveRule;
use crate::types::{Network, Node, Tls, Transport};

/// sing-box JSON config.
#[derive(Debug, Clone, Copy)]
pub struct SingBox;

/// One sing-box outbound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingboxOutbound {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Shadowsocks cipher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// VMess cipher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfs: Option<SingboxObfs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub congestion_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp_relay_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<SingboxTls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<SingboxTransport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingboxObfs {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingboxTls {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utls: Option<SingboxUtls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reality: Option<SingboxReality>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingboxUtls {
    pub enabled: bool,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingboxReality {
    pub enabled: bool,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingboxTransport {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// `http` transport host list
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl SingboxOutbound {
    fn new(kind: &'static str, node: &Node) -> Self {
        Self {
            kind,
            tag: node.tag().to_string(),
            server: node.server().to_string(),
            server_port: node.port(),
            uuid: None,
            password: None,
            method: None,
            security: None,
            alter_id: None,
            flow: None,
            plugin: None,
            plugin_opts: None,
            obfs: None,
            congestion_control: None,
            udp_relay_mode: None,
            tls: None,
            transport: None,
        }
    }
}

fn convert_tls(tls: &Tls) -> SingboxTls {
    SingboxTls {
        enabled: true,
        server_name: tls.sni.clone(),
        alpn: tls.alpn.clone(),
        insecure: tls.insecure,
        utls: tls.fingerprint.as_ref().map(|fp| SingboxUtls {
            enabled: true,
            fingerprint: fp.clone(),
        }),
        reality: tls.reality.as_ref().map(|r| SingboxReality {
            enabled: true,
            public_key: r.public_key.clone(),
            short_id: r.short_id.clone(),
        }),
    }
}

fn convert_transport(transport: &Transport) -> Option<SingboxTransport> {
    let mut out = SingboxTransport {
        kind: transport.network.to_string(),
        path: None,
        host: Vec::new(),
        headers: BTreeMap::new(),
        service_name: None,
    };
    match &transport.network {
        Network::Tcp => return None,
        Network::Ws => {
            out.path = transport.path.clone();
            if let Some(host) = &transport.host {
                out.headers.insert("Host".to_string(), host.clone());
            }
        }
        Network::HttpUpgrade => {
            out.path = transport.path.clone();
            out.host = transport.host.iter().cloned().collect();
        }
        Network::Http | Network::H2 => {
            out.kind = "http".to_string();
            out.path = transport.path.clone();
            out.host = transport
                .host
                .iter()
                .flat_map(|h| h.split(','))
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }
        Network::Grpc => {
            out.service_name = transport.grpc_service_name().map(str::to_string);
        }
        Network::Quic => {}
        Network::Other(name) => {
            debug!(network = %name, "sing-box has no such transport, using tcp");
            return None;
        }
    }
    Some(out)
}

impl Target for SingBox {
    const NAME: &'static str = "sing-box";

    type Proxy = SingboxOutbound;
    type Document = Value;

    fn convert_proxy(node: &Node) -> Option<SingboxOutbound> {
        let outbound = match node {
            Node::Vmess(n) => SingboxOutbound {
                uuid: Some(n.uuid.clone()),
                security: Some(n.cipher.clone()),
                alter_id: Some(n.alter_id),
                tls: n.tls.as_ref().map(convert_tls),
                transport: convert_transport(&n.transport),
                ..SingboxOutbound::new("vmess", node)
            },
            Node::Vless(n) => SingboxOutbound {
                uuid: Some(n.uuid.clone()),
                flow: n.flow.clone(),
                tls: n.tls.as_ref().map(convert_tls),
                transport: n.transport.as_ref().and_then(convert_transport),
                ..SingboxOutbound::new("vless", node)
            },
            Node::Shadowsocks(n) => SingboxOutbound {
                method: Some(n.cipher.clone()),
                password: Some(n.password.clone()),
                plugin: n.plugin.clone(),
                plugin_opts: n.plugin_opts.clone(),
                ..SingboxOutbound::new("shadowsocks", node)
            },
            Node::Trojan(n) => SingboxOutbound {
                password: Some(n.password.clone()),
                tls: n.tls.as_ref().map(convert_tls),
                transport: n.transport.as_ref().and_then(convert_transport),
                ..SingboxOutbound::new("trojan", node)
            },
            Node::Hysteria2(n) => SingboxOutbound {
                password: Some(n.password.clone()),
                obfs: n.obfs.as_ref().map(|kind| SingboxObfs {
                    kind: kind.clone(),
                    password: n.obfs_password.clone(),
                }),
                tls: Some(convert_tls(&n.tls)),
                ..SingboxOutbound::new("hysteria2", node)
            },
            Node::Tuic(n) => SingboxOutbound {
                uuid: Some(n.uuid.clone()),
                password: Some(n.password.clone()),
                congestion_control: n.congestion_control.clone(),
                udp_relay_mode: n.udp_relay_mode.clone(),
                tls: Some(convert_tls(&n.tls)),
                ..SingboxOutbound::new("tuic", node)
            },
        };
        Some(outbound)
    }

    fn proxy_tag(proxy: &SingboxOutbound) -> &str {
        &proxy.tag
    }

    fn set_proxy_tag(proxy: &mut SingboxOutbound, tag: String) {
        proxy.tag = tag;
    }

    fn default_document(options: &BuildOptions) -> Value {
        json!({
            "log": { "level": "info" },
            "dns": {
                "servers": [
                    { "tag": "dns_proxy", "address": "tcp://1.1.1.1", "strategy": "ipv4_only" }
                ]
            },
            "inbounds": [
                { "type": "mixed", "tag": "mixed-in", "listen": "0.0.0.0", "listen_port": 2080 }
            ],
            "outbounds": [
                { "type": "direct", "tag": options.direct_tag },
                { "type": "block", "tag": options.reject_tag }
            ],
            "route": { "rules": [], "rule_set": [] }
        })
    }

    fn parse_base(text: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(SublinkError::ConfigValidation(
                "sing-box base config must be a JSON object".to_string(),
            ));
        }
        Ok(value)
    }

    fn assemble(
        document: &mut Value,
        proxies: &[SingboxOutbound],
        groups: &[ProxyGroup],
        rules: &[EffectiveRule],
        options: &BuildOptions,
    ) -> Result<()> {
        let root = document.as_object_mut().ok_or_else(|| {
            SublinkError::ConfigValidation("sing-box config must be a JSON object".to_string())
        })?;

        let mut outbounds = Vec::with_capacity(groups.len() + proxies.len() + 2);
        for group in groups {
            outbounds.push(json!({
                "type": "selector",
                "tag": group.name,
                "outbounds": group.members,
            }));
        }
        for proxy in proxies {
            outbounds.push(serde_json::to_value(proxy)?);
        }
        outbounds.push(json!({ "type": "direct", "tag": options.direct_tag }));
        outbounds.push(json!({ "type": "block", "tag": options.reject_tag }));
        root.insert("outbounds".to_string(), Value::Array(outbounds));

        let mut rule_sets = RuleSets::default();
        let mut route_rules = Vec::new();
        for rule in rules {
            route_rules.extend(route_rules_for(rule, options, &mut rule_sets));
        }
        let catch_all = format!("geoip-{}", options.catch_all_geoip);
        rule_sets.add(&catch_all, options.singbox_geoip_url(&options.catch_all_geoip), options);
        route_rules.push(json!({
            "rule_set": [catch_all],
            "outbound": options.direct_tag,
        }));

        let route = root
            .entry("route")
            .or_insert_with(|| Value::Object(Map::new()));
        if !route.is_object() {
            *route = Value::Object(Map::new());
        }
        if let Some(route) = route.as_object_mut() {
            route.insert("rules".to_string(), Value::Array(route_rules));
            route.insert("rule_set".to_string(), Value::Array(rule_sets.entries));
            route.insert("final".to_string(), json!(options.selector_name));
        }
        Ok(())
    }

    fn format_config(document: &Value) -> Result<String> {
        Ok(serde_json::to_string_pretty(document)?)
    }
}

/// Remote rule sets referenced by the route, first-seen order.
#[derive(Default)]
struct RuleSets {
    entries: Vec<Value>,
    tags: Vec<String>,
}

impl RuleSets {
    fn add(&mut self, tag: &str, url: String, options: &BuildOptions) {
        if self.tags.iter().any(|t| t == tag) {
            return;
        }
        self.tags.push(tag.to_string());
        self.entries.push(json!({
            "tag": tag,
            "type": "remote",
            "format": "binary",
            "url": url,
            "download_detour": options.direct_tag,
        }));
    }
}

/// Route rules of one category. Protocol matches get a rule of their own,
/// sing-box would AND them with the destination matches otherwise.
fn route_rules_for(
    rule: &EffectiveRule,
    options: &BuildOptions,
    rule_sets: &mut RuleSets,
) -> Vec<Value> {
    let outbound = rule.target(options);
    let matches = &rule.matches;

    let mut tags = Vec::new();
    for site in &matches.geosite {
        let tag = format!("geosite-{}", site);
        rule_sets.add(&tag, options.singbox_geosite_url(site), options);
        tags.push(tag);
    }
    for ip in &matches.geoip {
        let tag = format!("geoip-{}", ip);
        rule_sets.add(&tag, options.singbox_geoip_url(ip), options);
        tags.push(tag);
    }

    let mut object = Map::new();
    if !matches.domain_suffix.is_empty() {
        object.insert("domain_suffix".to_string(), json!(matches.domain_suffix));
    }
    if !matches.domain_keyword.is_empty() {
        object.insert("domain_keyword".to_string(), json!(matches.domain_keyword));
    }
    if !rule.ip_cidr.is_empty() {
        let cidrs: Vec<String> = rule.ip_cidr.iter().map(|net| net.to_string()).collect();
        object.insert("ip_cidr".to_string(), json!(cidrs));
    }
    if !tags.is_empty() {
        object.insert("rule_set".to_string(), json!(tags));
    }

    let mut out = Vec::with_capacity(2);
    if !object.is_empty() {
        object.insert("outbound".to_string(), json!(outbound));
        out.push(Value::Object(object));
    }
    if !matches.protocol.is_empty() {
        out.push(json!({ "protocol": matches.protocol, "outbound": outbound }));
    }
    if out.is_empty() {
        debug!(rule = %rule.name, "rule has nothing to match");
    }
    out
}

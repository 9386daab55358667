//! Clash Meta (mihomo) YAML target.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::{ProxyGroup, Target};
use crate::error::{Result, SublinkError};
use crate::options::BuildOptions;
use crate::rules::EffectiveRule;
use crate::types::{Network, Node, Tls, Transport};

/// Clash Meta YAML config.
#[derive(Debug, Clone, Copy)]
pub struct Clash;

/// One entry of `proxies`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClashProxy {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub server: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "alterId", skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    /// SNI for vmess and vless
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,
    /// SNI for trojan, hysteria2 and tuic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_cert_verify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grpc_opts: Option<GrpcOpts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h2_opts: Option<H2Opts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reality_opts: Option<RealityOpts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfs_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub congestion_controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp_relay_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Mapping>,
    #[serde(rename = "v2ray-http-upgrade", skip_serializing_if = "Option::is_none")]
    pub http_upgrade: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GrpcOpts {
    pub grpc_service_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct H2Opts {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RealityOpts {
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

impl ClashProxy {
    fn new(kind: &'static str, node: &Node) -> Self {
        Self {
            name: node.tag().to_string(),
            kind,
            server: node.server().to_string(),
            port: node.port(),
            uuid: None,
            alter_id: None,
            cipher: None,
            password: None,
            udp: Some(true),
            tls: None,
            servername: None,
            sni: None,
            alpn: Vec::new(),
            skip_cert_verify: None,
            client_fingerprint: None,
            flow: None,
            network: None,
            ws_opts: None,
            grpc_opts: None,
            h2_opts: None,
            reality_opts: None,
            plugin: None,
            plugin_opts: None,
            obfs: None,
            obfs_password: None,
            congestion_controller: None,
            udp_relay_mode: None,
        }
    }

    /// TLS fields; vmess and vless name the SNI `servername`.
    fn with_tls(mut self, tls: Option<&Tls>, servername: bool) -> Self {
        let Some(tls) = tls else {
            return self;
        };
        self.tls = Some(true);
        if servername {
            self.servername = tls.sni.clone();
        } else {
            self.sni = tls.sni.clone();
        }
        self.alpn = tls.alpn.clone();
        self.skip_cert_verify = tls.insecure.then_some(true);
        self.client_fingerprint = tls.fingerprint.clone();
        self.reality_opts = tls.reality.as_ref().map(|r| RealityOpts {
            public_key: r.public_key.clone(),
            short_id: r.short_id.clone(),
        });
        self
    }

    fn with_transport(mut self, transport: Option<&Transport>) -> Self {
        let Some(transport) = transport else {
            return self;
        };
        match &transport.network {
            Network::Tcp => {}
            Network::Ws | Network::HttpUpgrade => {
                self.network = Some("ws".to_string());
                let headers = transport.host.as_ref().map(|host| {
                    let mut headers = Mapping::new();
                    headers.insert("Host".into(), host.as_str().into());
                    headers
                });
                self.ws_opts = Some(WsOpts {
                    path: transport.path.clone(),
                    headers,
                    http_upgrade: (transport.network == Network::HttpUpgrade).then_some(true),
                });
            }
            Network::Grpc => {
                self.network = Some("grpc".to_string());
                self.grpc_opts = Some(GrpcOpts {
                    grpc_service_name: transport.grpc_service_name().unwrap_or_default().to_string(),
                });
            }
            Network::H2 | Network::Http => {
                self.network = Some("h2".to_string());
                self.h2_opts = Some(H2Opts {
                    host: transport.host.iter().cloned().collect(),
                    path: transport.path.clone(),
                });
            }
            other => self.network = Some(other.to_string()),
        }
        self
    }
}

/// Split `k=v;flag` plugin options into a mapping. The obfs plugin is
/// renamed the way Clash spells it.
fn plugin_options(plugin: &str, opts: Option<&str>) -> (String, Option<Mapping>) {
    let obfs = matches!(plugin, "obfs-local" | "simple-obfs" | "obfs");
    let name = if obfs { "obfs" } else { plugin }.to_string();

    let Some(opts) = opts.filter(|o| !o.is_empty()) else {
        return (name, None);
    };
    let mut mapping = Mapping::new();
    for part in opts.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value): (&str, Value) = match part.split_once('=') {
            Some((k, v)) => (k, v.into()),
            None => (part, true.into()),
        };
        let key = match (obfs, key) {
            (true, "obfs") => "mode",
            (true, "obfs-host") => "host",
            (_, key) => key,
        };
        mapping.insert(key.into(), value);
    }
    (name, Some(mapping))
}

impl Target for Clash {
    const NAME: &'static str = "clash";

    type Proxy = ClashProxy;
    type Document = Mapping;

    fn convert_proxy(node: &Node) -> Option<ClashProxy> {
        let proxy = match node {
            Node::Vmess(n) => ClashProxy {
                uuid: Some(n.uuid.clone()),
                alter_id: Some(n.alter_id),
                cipher: Some(n.cipher.clone()),
                ..ClashProxy::new("vmess", node)
            }
            .with_tls(n.tls.as_ref(), true)
            .with_transport(Some(&n.transport)),
            Node::Vless(n) => ClashProxy {
                uuid: Some(n.uuid.clone()),
                flow: n.flow.clone(),
                ..ClashProxy::new("vless", node)
            }
            .with_tls(n.tls.as_ref(), true)
            .with_transport(n.transport.as_ref()),
            Node::Shadowsocks(n) => {
                let (plugin, plugin_opts) = match &n.plugin {
                    Some(plugin) => {
                        let (name, opts) = plugin_options(plugin, n.plugin_opts.as_deref());
                        (Some(name), opts)
                    }
                    None => (None, None),
                };
                ClashProxy {
                    cipher: Some(n.cipher.clone()),
                    password: Some(n.password.clone()),
                    plugin,
                    plugin_opts,
                    ..ClashProxy::new("ss", node)
                }
            }
            Node::Trojan(n) => {
                let mut proxy = ClashProxy {
                    password: Some(n.password.clone()),
                    ..ClashProxy::new("trojan", node)
                }
                .with_tls(n.tls.as_ref(), false)
                .with_transport(n.transport.as_ref());
                // trojan is TLS-only in Clash; the flag is implied
                proxy.tls = None;
                proxy
            }
            Node::Hysteria2(n) => {
                let mut proxy = ClashProxy {
                    password: Some(n.password.clone()),
                    obfs: n.obfs.clone(),
                    obfs_password: n.obfs_password.clone(),
                    ..ClashProxy::new("hysteria2", node)
                }
                .with_tls(Some(&n.tls), false);
                proxy.tls = None;
                proxy
            }
            Node::Tuic(n) => {
                let mut proxy = ClashProxy {
                    uuid: Some(n.uuid.clone()),
                    password: Some(n.password.clone()),
                    congestion_controller: n.congestion_control.clone(),
                    udp_relay_mode: n.udp_relay_mode.clone(),
                    ..ClashProxy::new("tuic", node)
                }
                .with_tls(Some(&n.tls), false);
                proxy.tls = None;
                proxy
            }
        };
        Some(proxy)
    }

    fn proxy_tag(proxy: &ClashProxy) -> &str {
        &proxy.name
    }

    fn set_proxy_tag(proxy: &mut ClashProxy, tag: String) {
        proxy.name = tag;
    }

    fn default_document(_options: &BuildOptions) -> Mapping {
        let mut dns = Mapping::new();
        dns.insert("enable".into(), true.into());
        dns.insert("enhanced-mode".into(), "fake-ip".into());
        dns.insert(
            "nameserver".into(),
            Value::Sequence(vec!["1.1.1.1".into(), "8.8.8.8".into()]),
        );

        let mut document = Mapping::new();
        document.insert("port".into(), 7890.into());
        document.insert("socks-port".into(), 7891.into());
        document.insert("allow-lan".into(), false.into());
        document.insert("mode".into(), "rule".into());
        document.insert("log-level".into(), "info".into());
        document.insert("dns".into(), Value::Mapping(dns));
        document
    }

    fn parse_base(text: &str) -> Result<Mapping> {
        match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(mapping) => Ok(mapping),
            _ => Err(SublinkError::ConfigValidation(
                "clash base config must be a YAML mapping".to_string(),
            )),
        }
    }

    fn assemble(
        document: &mut Mapping,
        proxies: &[ClashProxy],
        groups: &[ProxyGroup],
        rules: &[EffectiveRule],
        options: &BuildOptions,
    ) -> Result<()> {
        let proxies = proxies
            .iter()
            .map(serde_yaml::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let groups: Vec<Value> = groups
            .iter()
            .map(|group| {
                let mut mapping = Mapping::new();
                mapping.insert("name".into(), group.name.as_str().into());
                mapping.insert("type".into(), "select".into());
                mapping.insert(
                    "proxies".into(),
                    Value::Sequence(group.members.iter().map(|m| m.as_str().into()).collect()),
                );
                Value::Mapping(mapping)
            })
            .collect();

        let mut lines = Vec::new();
        for rule in rules {
            lines.extend(rule_lines(rule, options));
        }
        lines.push(format!("GEOIP,{},{}", options.catch_all_upper(), options.direct_tag));
        lines.push(format!("MATCH,{}", options.selector_name));

        document.insert("proxies".into(), Value::Sequence(proxies));
        document.insert("proxy-groups".into(), Value::Sequence(groups));
        document.insert(
            "rules".into(),
            Value::Sequence(lines.into_iter().map(Value::String).collect()),
        );
        Ok(())
    }

    fn format_config(document: &Mapping) -> Result<String> {
        Ok(serde_yaml::to_string(document)?)
    }
}

fn rule_lines(rule: &EffectiveRule, options: &BuildOptions) -> Vec<String> {
    let target = rule.target(options);
    let matches = &rule.matches;
    let mut lines = Vec::new();

    for site in &matches.geosite {
        lines.push(format!("GEOSITE,{},{}", site, target));
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
        lines.push(format!("GEOIP,{},{},no-resolve", ip.to_uppercase(), target));
    }
    if !matches.protocol.is_empty() {
        debug!(rule = %rule.name, protocols = ?matches.protocol, "clash has no protocol rules, skipping");
    }
    lines
}

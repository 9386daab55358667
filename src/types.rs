use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Proxy protocol kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Vmess,
    Vless,
    Shadowsocks,
    Trojan,
    Hysteria2,
    Tuic,
}

impl NodeKind {
    /// All supported kinds
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Vmess,
        NodeKind::Vless,
        NodeKind::Shadowsocks,
        NodeKind::Trojan,
        NodeKind::Hysteria2,
        NodeKind::Tuic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Vmess => "vmess",
            NodeKind::Vless => "vless",
            NodeKind::Shadowsocks => "shadowsocks",
            NodeKind::Trojan => "trojan",
            NodeKind::Hysteria2 => "hysteria2",
            NodeKind::Tuic => "tuic",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport network of a stream-based node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Network {
    #[default]
    Tcp,
    Ws,
    Grpc,
    Http,
    H2,
    HttpUpgrade,
    Quic,
    /// Anything else, carried through unchanged
    Other(String),
}

impl Network {
    pub fn as_str(&self) -> &str {
        match self {
            Network::Tcp => "tcp",
            Network::Ws => "ws",
            Network::Grpc => "grpc",
            Network::Http => "http",
            Network::H2 => "h2",
            Network::HttpUpgrade => "httpupgrade",
            Network::Quic => "quic",
            Network::Other(s) => s,
        }
    }
}

impl FromStr for Network {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Ok(match s.as_str() {
            "" | "tcp" => Network::Tcp,
            "ws" | "websocket" => Network::Ws,
            "grpc" => Network::Grpc,
            "http" => Network::Http,
            "h2" => Network::H2,
            "httpupgrade" => Network::HttpUpgrade,
            "quic" => Network::Quic,
            _ => Network::Other(s),
        })
    }
}

impl From<String> for Network {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(network) => network,
            Err(never) => match never {},
        }
    }
}

impl From<Network> for String {
    fn from(network: Network) -> Self {
        network.as_str().to_string()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream transport settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transport {
    pub network: Network,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl Transport {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    /// gRPC service name; vmess links carry it in `path`.
    pub fn grpc_service_name(&self) -> Option<&str> {
        self.service_name.as_deref().or(self.path.as_deref())
    }
}

/// REALITY parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reality {
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

/// TLS settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reality: Option<Reality>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmessNode {
    pub tag: String,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    #[serde(default)]
    pub alter_id: u32,
    pub cipher: String,
    #[serde(default)]
    pub transport: Transport,
    /// Header obfuscation type (`http`); `None` means `none`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<Tls>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlessNode {
    pub tag: String,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<Tls>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowsocksNode {
    pub tag: String,
    pub server: String,
    pub port: u16,
    pub cipher: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrojanNode {
    pub tag: String,
    pub server: String,
    pub port: u16,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<Tls>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hysteria2Node {
    pub tag: String,
    pub server: String,
    pub port: u16,
    pub password: String,
    /// QUIC always runs TLS
    #[serde(default)]
    pub tls: Tls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuicNode {
    pub tag: String,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    pub password: String,
    #[serde(default)]
    pub tls: Tls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congestion_control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_relay_mode: Option<String>,
}

/// Canonical proxy node, one variant per protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Vmess(VmessNode),
    Vless(VlessNode),
    Shadowsocks(ShadowsocksNode),
    Trojan(TrojanNode),
    Hysteria2(Hysteria2Node),
    Tuic(TuicNode),
}

macro_rules! each_node {
    ($node:expr, $n:ident => $body:expr) => {
        match $node {
            Node::Vmess($n) => $body,
            Node::Vless($n) => $body,
            Node::Shadowsocks($n) => $body,
            Node::Trojan($n) => $body,
            Node::Hysteria2($n) => $body,
            Node::Tuic($n) => $body,
        }
    };
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Vmess(_) => NodeKind::Vmess,
            Node::Vless(_) => NodeKind::Vless,
            Node::Shadowsocks(_) => NodeKind::Shadowsocks,
            Node::Trojan(_) => NodeKind::Trojan,
            Node::Hysteria2(_) => NodeKind::Hysteria2,
            Node::Tuic(_) => NodeKind::Tuic,
        }
    }

    pub fn tag(&self) -> &str {
        each_node!(self, n => &n.tag)
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        each_node!(self, n => n.tag = tag)
    }

    pub fn server(&self) -> &str {
        each_node!(self, n => &n.server)
    }

    pub fn port(&self) -> u16 {
        each_node!(self, n => n.port)
    }

    /// TLS settings, if the node runs over TLS
    pub fn tls(&self) -> Option<&Tls> {
        match self {
            Node::Vmess(n) => n.tls.as_ref(),
            Node::Vless(n) => n.tls.as_ref(),
            Node::Trojan(n) => n.tls.as_ref(),
            Node::Hysteria2(n) => Some(&n.tls),
            Node::Tuic(n) => Some(&n.tls),
            Node::Shadowsocks(_) => None,
        }
    }

    /// Stream transport, if the protocol has one
    pub fn transport(&self) -> Option<&Transport> {
        match self {
            Node::Vmess(n) => Some(&n.transport),
            Node::Vless(n) => n.transport.as_ref(),
            Node::Trojan(n) => n.transport.as_ref(),
            Node::Shadowsocks(_) | Node::Hysteria2(_) | Node::Tuic(_) => None,
        }
    }
}

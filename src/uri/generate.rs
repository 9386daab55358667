use std::fmt;

use serde_json::{Map, Value as JsonValue};
use url::form_urlencoded::Serializer;

use super::{encode_base64, encode_component};
use crate::types::{
    Hysteria2Node, Node, ShadowsocksNode, Tls, Transport, TrojanNode, TuicNode, VlessNode,
    VmessNode,
};

/// Generate a share link from a node.
pub fn generate(node: &Node) -> String {
    match node {
        Node::Vmess(n) => generate_vmess(n),
        Node::Vless(n) => generate_vless(n),
        Node::Shadowsocks(n) => generate_shadowsocks(n),
        Node::Trojan(n) => generate_trojan(n),
        Node::Hysteria2(n) => generate_hysteria2(n),
        Node::Tuic(n) => generate_tuic(n),
    }
}

impl Node {
    /// Share link for this node, see [`generate`].
    pub fn to_uri(&self) -> String {
        generate(self)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&generate(self))
    }
}

/// Query string builder that leaves out empty values.
struct QueryBuilder(Serializer<'static, String>);

impl QueryBuilder {
    fn new() -> Self {
        Self(Serializer::new(String::new()))
    }

    fn push(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.0.append_pair(key, value);
        }
        self
    }

    fn push_flag(&mut self, key: &str, on: bool) -> &mut Self {
        if on {
            self.0.append_pair(key, "1");
        }
        self
    }

    fn push_tls(&mut self, tls: &Tls) -> &mut Self {
        let alpn = tls.alpn.join(",");
        self.push("sni", tls.sni.as_deref())
            .push("alpn", Some(alpn.as_str()))
            .push("fp", tls.fingerprint.as_deref());
        if let Some(reality) = &tls.reality {
            self.push("pbk", Some(reality.public_key.as_str()))
                .push("sid", reality.short_id.as_deref());
        }
        self.push_flag("insecure", tls.insecure)
    }

    fn push_transport(&mut self, transport: &Transport) -> &mut Self {
        self.push("type", Some(transport.network.as_str()))
            .push("host", transport.host.as_deref())
            .push("path", transport.path.as_deref())
            .push("serviceName", transport.service_name.as_deref())
            .push("mode", transport.mode.as_deref())
    }

    fn finish(mut self) -> String {
        self.0.finish()
    }
}

fn security_label(tls: Option<&Tls>) -> &'static str {
    match tls {
        Some(tls) if tls.reality.is_some() => "reality",
        Some(_) => "tls",
        None => "none",
    }
}

fn host_port(server: &str, port: u16) -> String {
    if server.contains(':') {
        format!("[{}]:{}", server, port)
    } else {
        format!("{}:{}", server, port)
    }
}

fn assemble(
    scheme: &str,
    secret: Option<&str>,
    server: &str,
    port: u16,
    query: String,
    tag: &str,
) -> String {
    let mut uri = format!("{}://", scheme);
    if let Some(secret) = secret {
        uri.push_str(&encode_component(secret));
        uri.push('@');
    }
    uri.push_str(&host_port(server, port));
    if !query.is_empty() {
        uri.push('?');
        uri.push_str(&query);
    }
    if !tag.is_empty() {
        uri.push('#');
        uri.push_str(&encode_component(tag));
    }
    uri
}

fn generate_vmess(node: &VmessNode) -> String {
    let tls = node.tls.as_ref();
    let mut config = Map::new();
    config.insert("v".into(), "2".into());
    config.insert("ps".into(), node.tag.as_str().into());
    config.insert("add".into(), node.server.as_str().into());
    config.insert("port".into(), node.port.into());
    config.insert("id".into(), node.uuid.as_str().into());
    config.insert("aid".into(), node.alter_id.into());
    config.insert("scy".into(), node.cipher.as_str().into());
    config.insert("net".into(), node.transport.network.as_str().into());
    config.insert(
        "type".into(),
        node.header_type.as_deref().unwrap_or("none").into(),
    );
    config.insert(
        "host".into(),
        node.transport.host.as_deref().unwrap_or_default().into(),
    );
    config.insert(
        "path".into(),
        node.transport.path.as_deref().unwrap_or_default().into(),
    );
    config.insert("tls".into(), if tls.is_some() { "tls" } else { "" }.into());
    config.insert(
        "sni".into(),
        tls.and_then(|t| t.sni.as_deref()).unwrap_or_default().into(),
    );
    config.insert(
        "alpn".into(),
        tls.map(|t| t.alpn.join(",")).unwrap_or_default().into(),
    );
    config.insert(
        "fp".into(),
        tls.and_then(|t| t.fingerprint.as_deref())
            .unwrap_or_default()
            .into(),
    );

    // Empty strings and numeric zeros go, `port` excepted; `aid: 0` included.
    config.retain(|key, value| match value {
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Number(n) => key == "port" || n.as_u64() != Some(0),
        _ => true,
    });

    let json = JsonValue::Object(config).to_string();
    format!("vmess://{}", encode_base64(json))
}

fn generate_vless(node: &VlessNode) -> String {
    let mut query = QueryBuilder::new();
    query
        .push("encryption", node.encryption.as_deref())
        .push("flow", node.flow.as_deref());
    if let Some(tls) = &node.tls {
        query.push("security", Some(security_label(Some(tls))));
        query.push_tls(tls);
    }
    if let Some(transport) = &node.transport {
        query.push_transport(transport);
    }
    assemble(
        "vless",
        Some(node.uuid.as_str()),
        &node.server,
        node.port,
        query.finish(),
        &node.tag,
    )
}

fn generate_trojan(node: &TrojanNode) -> String {
    let mut query = QueryBuilder::new();
    query.push("security", Some(security_label(node.tls.as_ref())));
    if let Some(tls) = &node.tls {
        query.push_tls(tls);
    }
    if let Some(transport) = &node.transport {
        query.push_transport(transport);
    }
    assemble(
        "trojan",
        Some(node.password.as_str()),
        &node.server,
        node.port,
        query.finish(),
        &node.tag,
    )
}

fn generate_hysteria2(node: &Hysteria2Node) -> String {
    let mut query = QueryBuilder::new();
    query
        .push_tls(&node.tls)
        .push("obfs", node.obfs.as_deref())
        .push("obfs-password", node.obfs_password.as_deref());
    assemble(
        "hysteria2",
        Some(node.password.as_str()),
        &node.server,
        node.port,
        query.finish(),
        &node.tag,
    )
}

/// Credentials travel in the query, not in userinfo.
fn generate_tuic(node: &TuicNode) -> String {
    let mut query = QueryBuilder::new();
    query
        .push("uuid", Some(node.uuid.as_str()))
        .push("password", Some(node.password.as_str()))
        .push_tls(&node.tls)
        .push("congestion_control", node.congestion_control.as_deref())
        .push("udp_relay_mode", node.udp_relay_mode.as_deref());
    assemble(
        "tuic",
        None,
        &node.server,
        node.port,
        query.finish(),
        &node.tag,
    )
}

fn generate_shadowsocks(node: &ShadowsocksNode) -> String {
    let userinfo = encode_base64(format!("{}:{}", node.cipher, node.password));
    let mut query = QueryBuilder::new();
    if node.plugin.is_some() {
        query
            .push("plugin", node.plugin.as_deref())
            .push("plugin-opts", node.plugin_opts.as_deref());
    }

    let mut uri = format!(
        "ss://{}@{}",
        userinfo,
        host_port(&node.server, node.port)
    );
    let query = query.finish();
    if !query.is_empty() {
        uri.push('?');
        uri.push_str(&query);
    }
    if !node.tag.is_empty() {
        uri.push('#');
        uri.push_str(&encode_component(&node.tag));
    }
    uri
}

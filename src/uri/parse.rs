use std::collections::{HashMap, HashSet};

use serde_json::Value as JsonValue;

use super::{decode_base64_utf8, percent_decode};
use crate::error::{Result, SublinkError};
use crate::types::{
    Hysteria2Node, Network, Node, Reality, ShadowsocksNode, Tls, Transport, TrojanNode, TuicNode,
    VlessNode, VmessNode,
};

/// Default port for vmess links without a usable `port`
const VMESS_DEFAULT_PORT: u16 = 443;

/// Parse a single share link.
pub fn parse(line: &str) -> Result<Node> {
    let line = line.trim();
    let (scheme, rest) = line
        .split_once("://")
        .ok_or_else(|| SublinkError::UnsupportedProtocol(truncate(line)))?;

    match scheme.to_lowercase().as_str() {
        "vmess" => parse_vmess(rest),
        "vless" => parse_vless(rest),
        "ss" => parse_shadowsocks(rest),
        "trojan" => parse_trojan(rest),
        "hysteria2" | "hy2" => parse_hysteria2(rest),
        "tuic" => parse_tuic(rest),
        other => Err(SublinkError::UnsupportedProtocol(other.to_string())),
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}

/// Query parameters of a share link; blank values count as absent.
#[derive(Debug, Default)]
struct Query(HashMap<String, String>);

impl Query {
    fn parse(query: &str) -> Self {
        Self(
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.string(k))
    }

    fn flag(&self, keys: &[&str]) -> bool {
        keys.iter()
            .filter_map(|k| self.get(k))
            .any(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
    }

    fn list(&self, key: &str) -> Vec<String> {
        split_list(self.get(key).unwrap_or_default())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `userinfo@host:port?query#fragment`, split but not yet interpreted.
#[derive(Debug)]
struct Authority {
    userinfo: Option<String>,
    server: String,
    port: u16,
    query: Query,
    tag: String,
}

impl Authority {
    fn parse(scheme: &'static str, rest: &str) -> Result<Self> {
        let (before_fragment, fragment) = match rest.split_once('#') {
            Some((before, fragment)) => (before, Some(fragment)),
            None => (rest, None),
        };
        let (address, query) = match before_fragment.split_once('?') {
            Some((address, query)) => (address, query),
            None => (before_fragment, ""),
        };
        let address = address.trim_end_matches('/');

        let (userinfo, host_port) = match address.rsplit_once('@') {
            Some((userinfo, host_port)) => (Some(userinfo.to_string()), host_port),
            None => (None, address),
        };
        let (server, port) = parse_server_info(scheme, host_port)?;

        Ok(Self {
            userinfo: userinfo.filter(|u| !u.is_empty()),
            server,
            port,
            query: Query::parse(query),
            tag: fragment.map(percent_decode).unwrap_or_default(),
        })
    }

    /// Percent-decoded userinfo, required.
    fn secret(&self, scheme: &'static str, what: &str) -> Result<String> {
        self.userinfo
            .as_deref()
            .map(percent_decode)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SublinkError::malformed(scheme, format!("missing {}", what)))
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
fn parse_server_info(scheme: &'static str, host_port: &str) -> Result<(String, u16)> {
    let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| SublinkError::malformed(scheme, "unterminated IPv6 host"))?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| SublinkError::malformed(scheme, "missing port"))?;
        (host, port)
    } else {
        host_port
            .rsplit_once(':')
            .ok_or_else(|| SublinkError::malformed(scheme, "missing port"))?
    };

    if host.is_empty() {
        return Err(SublinkError::malformed(scheme, "missing server"));
    }
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| SublinkError::malformed(scheme, format!("invalid port: {}", port)))?;
    Ok((host.to_string(), port))
}

fn tls_from_query(query: &Query, security: &str) -> Tls {
    let reality = if security == "reality" {
        query.string("pbk").map(|public_key| Reality {
            public_key,
            short_id: query.string("sid"),
        })
    } else {
        None
    };
    Tls {
        sni: query.first_of(&["sni", "peer"]),
        alpn: query.list("alpn"),
        fingerprint: query.string("fp"),
        insecure: query.flag(&["insecure", "allowInsecure", "allow_insecure"]),
        reality,
    }
}

fn transport_from_query(query: &Query) -> Option<Transport> {
    let network = query.get("type");
    let host = query.string("host");
    let path = query.string("path");
    let service_name = query.string("serviceName");
    let mode = query.string("mode");

    if network.is_none()
        && host.is_none()
        && path.is_none()
        && service_name.is_none()
        && mode.is_none()
    {
        return None;
    }

    Some(Transport {
        network: network.unwrap_or_default().parse().unwrap_or_default(),
        host,
        path,
        service_name,
        mode,
    })
}

fn security(query: &Query) -> String {
    query.get("security").unwrap_or_default().to_lowercase()
}

fn parse_vless(rest: &str) -> Result<Node> {
    let authority = Authority::parse("vless", rest)?;
    let uuid = authority.secret("vless", "uuid")?;
    let query = &authority.query;

    let security = security(query);
    let tls = match security.as_str() {
        "tls" | "reality" | "xtls" => Some(tls_from_query(query, &security)),
        _ => None,
    };

    Ok(Node::Vless(VlessNode {
        uuid,
        encryption: query.string("encryption"),
        flow: query.string("flow"),
        transport: transport_from_query(query),
        tls,
        tag: authority.tag,
        server: authority.server,
        port: authority.port,
    }))
}

fn parse_trojan(rest: &str) -> Result<Node> {
    let authority = Authority::parse("trojan", rest)?;
    let password = authority.secret("trojan", "password")?;
    let query = &authority.query;

    // trojan runs over TLS unless told otherwise
    let security = security(query);
    let tls = (security != "none").then(|| tls_from_query(query, &security));

    Ok(Node::Trojan(TrojanNode {
        password,
        transport: transport_from_query(query),
        tls,
        tag: authority.tag,
        server: authority.server,
        port: authority.port,
    }))
}

fn parse_hysteria2(rest: &str) -> Result<Node> {
    let authority = Authority::parse("hysteria2", rest)?;
    let query = &authority.query;
    let password = match authority.secret("hysteria2", "password") {
        Ok(password) => password,
        Err(e) => query.string("auth").ok_or(e)?,
    };

    Ok(Node::Hysteria2(Hysteria2Node {
        password,
        tls: tls_from_query(query, "tls"),
        obfs: query.string("obfs"),
        obfs_password: query.first_of(&["obfs-password", "obfs_password"]),
        tag: authority.tag,
        server: authority.server,
        port: authority.port,
    }))
}

fn parse_tuic(rest: &str) -> Result<Node> {
    let authority = Authority::parse("tuic", rest)?;
    let query = &authority.query;

    let (mut uuid, mut password) = match authority.userinfo.as_deref() {
        Some(userinfo) => match userinfo.split_once(':') {
            Some((uuid, password)) => (Some(percent_decode(uuid)), Some(percent_decode(password))),
            None => (Some(percent_decode(userinfo)), None),
        },
        None => (None, None),
    };
    if uuid.as_deref().map_or(true, str::is_empty) {
        uuid = query.string("uuid");
    }
    if password.as_deref().map_or(true, str::is_empty) {
        password = query.string("password");
    }

    let uuid = uuid.ok_or_else(|| SublinkError::malformed("tuic", "missing uuid"))?;
    let password = password.ok_or_else(|| SublinkError::malformed("tuic", "missing password"))?;

    Ok(Node::Tuic(TuicNode {
        uuid,
        password,
        tls: tls_from_query(query, "tls"),
        congestion_control: query.first_of(&["congestion_control", "congestion-control"]),
        udp_relay_mode: query.first_of(&["udp_relay_mode", "udp-relay-mode"]),
        tag: authority.tag,
        server: authority.server,
        port: authority.port,
    }))
}

fn parse_shadowsocks(rest: &str) -> Result<Node> {
    let (before_fragment, fragment) = match rest.split_once('#') {
        Some((before, fragment)) => (before, Some(fragment)),
        None => (rest, None),
    };
    let (main, query) = match before_fragment.split_once('?') {
        Some((main, query)) => (main, Query::parse(query)),
        None => (before_fragment, Query::default()),
    };
    let main = main.trim().trim_end_matches('/');
    if main.is_empty() {
        return Err(SublinkError::malformed("ss", "empty link"));
    }

    let (credentials, host_port) = match main.rsplit_once('@') {
        Some((userinfo, host_port)) => (decode_ss_userinfo(userinfo)?, host_port.to_string()),
        None => {
            // legacy form: base64(method:password@host:port)
            let decoded = decode_base64_utf8(main)
                .ok_or_else(|| SublinkError::malformed("ss", "invalid base64 payload"))?;
            let (userinfo, host_port) = decoded
                .rsplit_once('@')
                .ok_or_else(|| SublinkError::malformed("ss", "missing server"))?;
            (split_method_password(userinfo)?, host_port.to_string())
        }
    };
    let (server, port) = parse_server_info("ss", host_port.trim())?;
    let (cipher, password) = credentials;

    // SIP002 packs options into `plugin=name;opts`
    let (plugin, plugin_opts) = match (query.string("plugin"), query.string("plugin-opts")) {
        (Some(plugin), None) => match plugin.split_once(';') {
            Some((name, opts)) => (
                Some(name.to_string()),
                Some(opts.to_string()).filter(|o| !o.is_empty()),
            ),
            None => (Some(plugin), None),
        },
        (plugin, opts) => (plugin, opts),
    };

    Ok(Node::Shadowsocks(ShadowsocksNode {
        tag: fragment.map(percent_decode).unwrap_or_default(),
        server,
        port,
        cipher,
        password,
        plugin,
        plugin_opts,
    }))
}

/// Userinfo is `base64(method:password)`, or plain `method:password`.
fn decode_ss_userinfo(userinfo: &str) -> Result<(String, String)> {
    let userinfo = percent_decode(userinfo);
    if let Some(decoded) = decode_base64_utf8(&userinfo) {
        if decoded.contains(':') {
            return split_method_password(&decoded);
        }
    }
    split_method_password(&userinfo)
}

fn split_method_password(s: &str) -> Result<(String, String)> {
    let (method, password) = s
        .split_once(':')
        .ok_or_else(|| SublinkError::malformed("ss", "userinfo is not method:password"))?;
    if method.is_empty() {
        return Err(SublinkError::malformed("ss", "missing method"));
    }
    Ok((method.to_string(), password.to_string()))
}

fn json_string(obj: &JsonValue, key: &str) -> Option<String> {
    let s = match obj.get(key)? {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(s).filter(|s| !s.is_empty())
}

fn json_number<T: std::str::FromStr>(obj: &JsonValue, key: &str) -> Option<T> {
    json_string(obj, key)?.parse().ok()
}

fn parse_vmess(rest: &str) -> Result<Node> {
    let payload = rest.split('#').next().unwrap_or_default();
    let text = decode_base64_utf8(payload)
        .ok_or_else(|| SublinkError::malformed("vmess", "invalid base64 payload"))?;
    let obj: JsonValue = serde_json::from_str(&text)
        .map_err(|e| SublinkError::malformed("vmess", format!("invalid JSON: {}", e)))?;
    if !obj.is_object() {
        return Err(SublinkError::malformed("vmess", "payload is not a JSON object"));
    }

    let server = json_string(&obj, "add")
        .ok_or_else(|| SublinkError::malformed("vmess", "missing add"))?;
    let uuid =
        json_string(&obj, "id").ok_or_else(|| SublinkError::malformed("vmess", "missing id"))?;

    let transport = Transport {
        network: json_string(&obj, "net")
            .unwrap_or_default()
            .parse()
            .unwrap_or(Network::Tcp),
        host: json_string(&obj, "host"),
        path: json_string(&obj, "path"),
        service_name: None,
        mode: None,
    };

    let tls = (json_string(&obj, "tls").as_deref() == Some("tls")).then(|| Tls {
        sni: json_string(&obj, "sni"),
        alpn: split_list(&json_string(&obj, "alpn").unwrap_or_default()),
        fingerprint: json_string(&obj, "fp"),
        insecure: false,
        reality: None,
    });

    Ok(Node::Vmess(VmessNode {
        tag: json_string(&obj, "ps").unwrap_or_default(),
        server,
        port: json_number(&obj, "port").unwrap_or(VMESS_DEFAULT_PORT),
        uuid,
        alter_id: json_number(&obj, "aid").unwrap_or(0),
        cipher: json_string(&obj, "scy").unwrap_or_else(|| "auto".to_string()),
        transport,
        header_type: json_string(&obj, "type").filter(|t| t != "none"),
        tls,
    }))
}

/// A line that failed to parse.
#[derive(Debug)]
pub struct LineError {
    /// 1-based line number
    pub line: usize,
    pub error: SublinkError,
}

/// Result of parsing many lines; failures do not abort the batch.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub nodes: Vec<Node>,
    pub errors: Vec<LineError>,
}

/// Parse a batch of share links.
///
/// Blank lines are skipped and failing lines are logged and collected in
/// [`ParsedBatch::errors`]. Tags are made unique within the batch: empty tags
/// become `"<kind> <server>:<port>"` and repeats get a ` #n` suffix.
pub fn parse_batch<I, S>(lines: I) -> ParsedBatch
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut batch = ParsedBatch::default();
    let mut used_tags = HashSet::new();

    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }

        match parse(line) {
            Ok(mut node) => {
                let base = if node.tag().trim().is_empty() {
                    format!("{} {}:{}", node.kind(), node.server(), node.port())
                } else {
                    node.tag().to_string()
                };
                let mut tag = base.clone();
                let mut n = 2;
                while used_tags.contains(&tag) {
                    tag = format!("{} #{}", base, n);
                    n += 1;
                }
                if tag != node.tag() {
                    node.set_tag(tag.clone());
                }
                used_tags.insert(tag);
                batch.nodes.push(node);
            }
            Err(error) => {
                tracing::warn!(line = idx + 1, %error, "skipping share link");
                batch.errors.push(LineError {
                    line: idx + 1,
                    error,
                });
            }
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::NodeKind;

    #[test]
    fn test_parse_vless_full() {
        let node = parse(
            "vless://11111111-1111-1111-1111-111111111111@example.com:443?encryption=none&security=tls&sni=example.com&type=ws&path=%2Fws#MyNode",
        )
        .unwrap();
        let Node::Vless(v) = node else {
            panic!("expected vless")
        };
        assert_eq!(v.uuid, "11111111-1111-1111-1111-111111111111");
        assert_eq!(v.server, "example.com");
        assert_eq!(v.port, 443);
        assert_eq!(v.tag, "MyNode");
        assert_eq!(v.encryption.as_deref(), Some("none"));
        let tls = v.tls.unwrap();
        assert_eq!(tls.sni.as_deref(), Some("example.com"));
        let transport = v.transport.unwrap();
        assert_eq!(transport.network, Network::Ws);
        assert_eq!(transport.path.as_deref(), Some("/ws"));
    }

    #[test]
    fn test_parse_vless_reality() {
        let node = parse(
            "vless://uuid@1.2.3.4:8443?security=reality&pbk=PUBKEY&sid=ab12&fp=chrome&flow=xtls-rprx-vision#R",
        )
        .unwrap();
        let Node::Vless(v) = node else {
            panic!("expected vless")
        };
        let tls = v.tls.unwrap();
        let reality = tls.reality.unwrap();
        assert_eq!(reality.public_key, "PUBKEY");
        assert_eq!(reality.short_id.as_deref(), Some("ab12"));
        assert_eq!(tls.fingerprint.as_deref(), Some("chrome"));
        assert_eq!(v.flow.as_deref(), Some("xtls-rprx-vision"));
    }

    #[test]
    fn test_parse_vless_without_security_has_no_tls() {
        let Node::Vless(v) = parse("vless://uuid@h.com:80").unwrap() else {
            panic!("expected vless")
        };
        assert!(v.tls.is_none());
        assert!(v.transport.is_none());
        assert_eq!(v.tag, "");
    }

    #[test]
    fn test_parse_ipv6_host() {
        let node = parse("trojan://pw@[2001:db8::1]:443#v6").unwrap();
        assert_eq!(node.server(), "2001:db8::1");
        assert_eq!(node.port(), 443);
    }

    #[test]
    fn test_parse_trojan_defaults_to_tls() {
        let Node::Trojan(t) = parse("trojan://p%40ss@t.com:443?sni=x.com").unwrap() else {
            panic!("expected trojan")
        };
        assert_eq!(t.password, "p@ss");
        assert_eq!(t.tls.unwrap().sni.as_deref(), Some("x.com"));

        let Node::Trojan(t) = parse("trojan://pw@t.com:443?security=none").unwrap() else {
            panic!("expected trojan")
        };
        assert!(t.tls.is_none());
    }

    #[test]
    fn test_parse_hysteria2_alias_and_obfs() {
        let node = parse(
            "hy2://secret@h.com:8443?sni=s.com&insecure=1&obfs=salamander&obfs-password=op#H",
        )
        .unwrap();
        let Node::Hysteria2(h) = node else {
            panic!("expected hysteria2")
        };
        assert_eq!(h.password, "secret");
        assert!(h.tls.insecure);
        assert_eq!(h.tls.sni.as_deref(), Some("s.com"));
        assert_eq!(h.obfs.as_deref(), Some("salamander"));
        assert_eq!(h.obfs_password.as_deref(), Some("op"));
    }

    #[test]
    fn test_parse_hysteria2_auth_query() {
        let Node::Hysteria2(h) = parse("hysteria2://h.com:443?auth=fromquery").unwrap() else {
            panic!("expected hysteria2")
        };
        assert_eq!(h.password, "fromquery");
    }

    #[test]
    fn test_parse_tuic_userinfo_and_query() {
        let Node::Tuic(t) =
            parse("tuic://uuid-1:pw@t.com:443?congestion_control=bbr&alpn=h3#T").unwrap()
        else {
            panic!("expected tuic")
        };
        assert_eq!(t.uuid, "uuid-1");
        assert_eq!(t.password, "pw");
        assert_eq!(t.congestion_control.as_deref(), Some("bbr"));
        assert_eq!(t.tls.alpn, vec!["h3".to_string()]);

        let Node::Tuic(t) =
            parse("tuic://t.com:443?uuid=uuid-2&password=pw2&udp_relay_mode=native").unwrap()
        else {
            panic!("expected tuic")
        };
        assert_eq!(t.uuid, "uuid-2");
        assert_eq!(t.password, "pw2");
        assert_eq!(t.udp_relay_mode.as_deref(), Some("native"));
    }

    #[test]
    fn test_parse_tuic_missing_password() {
        let err = parse("tuic://uuid@t.com:443").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedUri);
    }

    #[test]
    fn test_parse_ss_sip002() {
        // base64("aes-256-gcm:pw")
        let Node::Shadowsocks(s) = parse("ss://YWVzLTI1Ni1nY206cHc=@s.com:8388#X").unwrap() else {
            panic!("expected shadowsocks")
        };
        assert_eq!(s.cipher, "aes-256-gcm");
        assert_eq!(s.password, "pw");
        assert_eq!(s.server, "s.com");
        assert_eq!(s.port, 8388);
        assert_eq!(s.tag, "X");
    }

    #[test]
    fn test_parse_ss_plain_userinfo() {
        let Node::Shadowsocks(s) = parse("ss://chacha20-ietf-poly1305:pa:ss@s.com:8388").unwrap()
        else {
            panic!("expected shadowsocks")
        };
        assert_eq!(s.cipher, "chacha20-ietf-poly1305");
        assert_eq!(s.password, "pa:ss");
    }

    #[test]
    fn test_parse_ss_legacy_whole_base64() {
        // base64("aes-128-gcm:test@192.168.100.1:8888")
        let link = format!(
            "ss://{}#Legacy",
            crate::uri::encode_base64("aes-128-gcm:test@192.168.100.1:8888")
        );
        let Node::Shadowsocks(s) = parse(&link).unwrap() else {
            panic!("expected shadowsocks")
        };
        assert_eq!(s.cipher, "aes-128-gcm");
        assert_eq!(s.password, "test");
        assert_eq!(s.server, "192.168.100.1");
        assert_eq!(s.port, 8888);
        assert_eq!(s.tag, "Legacy");
    }

    #[test]
    fn test_parse_ss_plugin_forms() {
        let Node::Shadowsocks(s) = parse(
            "ss://YWVzLTI1Ni1nY206cHc=@s.com:8388/?plugin=obfs-local%3Bobfs%3Dhttp%3Bobfs-host%3Dx.com",
        )
        .unwrap() else {
            panic!("expected shadowsocks")
        };
        assert_eq!(s.plugin.as_deref(), Some("obfs-local"));
        assert_eq!(s.plugin_opts.as_deref(), Some("obfs=http;obfs-host=x.com"));

        let Node::Shadowsocks(s) = parse(
            "ss://YWVzLTI1Ni1nY206cHc=@s.com:8388?plugin=v2ray-plugin&plugin-opts=mode%3Dwebsocket",
        )
        .unwrap() else {
            panic!("expected shadowsocks")
        };
        assert_eq!(s.plugin.as_deref(), Some("v2ray-plugin"));
        assert_eq!(s.plugin_opts.as_deref(), Some("mode=websocket"));
    }

    #[test]
    fn test_parse_vmess() {
        let json = r#"{"v":"2","ps":"VM","add":"v.com","port":"8443","id":"uuid","aid":"4","net":"ws","type":"none","host":"cdn.com","path":"/p","tls":"tls","sni":"s.com","alpn":"h2,http/1.1"}"#;
        let link = format!("vmess://{}", crate::uri::encode_base64(json));
        let Node::Vmess(v) = parse(&link).unwrap() else {
            panic!("expected vmess")
        };
        assert_eq!(v.tag, "VM");
        assert_eq!(v.port, 8443);
        assert_eq!(v.alter_id, 4);
        assert_eq!(v.cipher, "auto");
        assert_eq!(v.transport.network, Network::Ws);
        assert_eq!(v.transport.host.as_deref(), Some("cdn.com"));
        assert!(v.header_type.is_none());
        let tls = v.tls.unwrap();
        assert_eq!(tls.alpn, vec!["h2".to_string(), "http/1.1".to_string()]);
    }

    #[test]
    fn test_parse_vmess_port_defaults() {
        let json = r#"{"add":"v.com","port":"abc","id":"uuid"}"#;
        let link = format!("vmess://{}", crate::uri::encode_base64(json));
        let Node::Vmess(v) = parse(&link).unwrap() else {
            panic!("expected vmess")
        };
        assert_eq!(v.port, 443);
        assert!(v.tls.is_none());
    }

    #[test]
    fn test_parse_vmess_bad_payload() {
        let err = parse("vmess://!!!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedUri);
    }

    #[test]
    fn test_parse_fragment_decode_failure_keeps_raw() {
        let node = parse("trojan://pw@t.com:443#%FFname").unwrap();
        assert_eq!(node.tag(), "%FFname");
    }

    #[test]
    fn test_parse_unsupported_scheme() {
        let err = parse("ssr://abcdef").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedProtocol);
        let err = parse("not-a-uri").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedProtocol);
    }

    #[test]
    fn test_parse_missing_port() {
        let err = parse("vless://uuid@host.com").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedUri);
        let err = parse("vless://uuid@host.com:99999").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedUri);
    }

    #[test]
    fn test_parse_scheme_case_insensitive() {
        assert_eq!(
            parse("VLESS://uuid@h.com:443").unwrap().kind(),
            NodeKind::Vless
        );
    }

    #[test]
    fn test_parse_batch_skips_bad_lines() {
        let batch = parse_batch([
            "vless://uuid@a.com:443#A",
            "not-a-uri",
            "",
            "trojan://pw@b.com:443#B",
        ]);
        assert_eq!(batch.nodes.len(), 2);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].line, 2);
    }

    #[test]
    fn test_parse_batch_unique_tags() {
        let batch = parse_batch([
            "trojan://pw@a.com:443#HK",
            "trojan://pw@b.com:443#HK",
            "trojan://pw@c.com:443",
        ]);
        let tags: Vec<&str> = batch.nodes.iter().map(|n| n.tag()).collect();
        assert_eq!(tags, ["HK", "HK #2", "trojan c.com:443"]);
    }
}

//! Integration tests for the parse, classify and build pipeline.

use serde_json::Value;

use sublink_r::builder::{ConfigBuilder, SingBox, Surge};
use sublink_r::rules::preset;
use sublink_r::types::ShadowsocksNode;
use sublink_r::{
    convert, generate, parse, parse_batch, resolve, BuildOptions, ConvertRequest, Node,
    RuleSelection, Target, TargetKind,
};

const VLESS_A: &str =
    "vless://11111111-1111-1111-1111-111111111111@1.2.3.4:443?security=tls&sni=a.com#A";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rule_names(selection: RuleSelection) -> Vec<String> {
    resolve(&selection).into_iter().map(|r| r.name).collect()
}

#[test]
fn test_vless_with_malformed_line_to_singbox() {
    init_tracing();

    let request = ConvertRequest::new(
        TargetKind::SingBox,
        vec![VLESS_A.to_string(), "not-a-uri".to_string()],
    )
    .with_selection(RuleSelection::from_query(Some("minimal"), None));
    let config: Value = serde_json::from_str(&convert(&request).unwrap()).unwrap();

    let proxies: Vec<&Value> = config["outbounds"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|o| o["type"] == "vless")
        .collect();
    assert_eq!(proxies.len(), 1);
    assert_eq!(proxies[0]["tag"], "A");
    assert_eq!(proxies[0]["server"], "1.2.3.4");
    assert_eq!(proxies[0]["server_port"], 443);
    assert_eq!(proxies[0]["tls"]["server_name"], "a.com");

    let outbounds: Vec<&str> = config["route"]["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["outbound"].as_str().unwrap())
        .collect();
    let mut expected: Vec<&str> = preset("minimal")
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    expected.push("DIRECT");
    assert_eq!(outbounds, expected);
}

#[test]
fn test_shadowsocks_generate_scenario() {
    let node = Node::Shadowsocks(ShadowsocksNode {
        tag: "X".into(),
        server: "s.com".into(),
        port: 8388,
        cipher: "aes-256-gcm".into(),
        password: "pw".into(),
        plugin: None,
        plugin_opts: None,
    });
    let uri = generate(&node);
    assert_eq!(uri, "ss://YWVzLTI1Ni1nY206cHc=@s.com:8388#X");

    match parse(&uri).unwrap() {
        Node::Shadowsocks(ss) => {
            assert_eq!(ss.cipher, "aes-256-gcm");
            assert_eq!(ss.password, "pw");
            assert_eq!(ss.server, "s.com");
            assert_eq!(ss.port, 8388);
        }
        other => panic!("expected shadowsocks, got {:?}", other),
    }
}

#[test]
fn test_malformed_line_does_not_sink_batch() {
    let lines = [
        "trojan://pw@a.example.com:443#A",
        "vless://missing-port@b.example.com#B",
        "hy2://pw@c.example.com:443#C",
        "tuic://u:p@d.example.com:443#D",
    ];
    let batch = parse_batch(lines);
    assert_eq!(batch.nodes.len(), 3);
    assert_eq!(batch.errors.len(), 1);
    assert_eq!(batch.errors[0].line, 2);
}

#[test]
fn test_batch_tags_are_unique() {
    let batch = parse_batch([
        "trojan://pw@a.example.com:443#Same",
        "trojan://pw@b.example.com:443#Same",
        "trojan://pw@c.example.com:443",
    ]);
    let tags: Vec<&str> = batch.nodes.iter().map(|n| n.tag()).collect();
    assert_eq!(tags, ["Same", "Same #2", "trojan c.example.com:443"]);
}

#[test]
fn test_add_proxy_to_config_is_idempotent() {
    let node = parse(VLESS_A).unwrap();
    let proxy = SingBox::convert_proxy(&node).unwrap();

    let mut once =
        ConfigBuilder::<SingBox, _>::new(BuildOptions::default()).add_proxies(Vec::<&Node>::new());
    once.add_proxy_to_config(proxy.clone());

    let mut twice =
        ConfigBuilder::<SingBox, _>::new(BuildOptions::default()).add_proxies(Vec::<&Node>::new());
    twice.add_proxy_to_config(proxy.clone());
    twice.add_proxy_to_config(proxy);

    assert_eq!(once.proxies(), twice.proxies());
    assert_eq!(twice.proxies().len(), 1);
}

#[test]
fn test_re_adding_a_tag_is_a_no_op() {
    let a = parse("trojan://one@a.example.com:443#Dup").unwrap();
    let b = parse("trojan://two@b.example.com:443#Dup").unwrap();
    let mut builder =
        ConfigBuilder::<SingBox, _>::new(BuildOptions::default()).add_proxies([&a]);
    builder.add_proxy_to_config(SingBox::convert_proxy(&b).unwrap());

    let tags: Vec<&str> = builder.proxies().iter().map(|p| p.tag.as_str()).collect();
    assert_eq!(tags, ["Dup"]);
    assert_eq!(builder.proxies()[0].password.as_deref(), Some("one"));
}

#[test]
fn test_singbox_outbound_tags_are_unique() {
    let request = ConvertRequest::new(
        TargetKind::SingBox,
        vec![
            "trojan://a@a.example.com:443#Private".to_string(),
            "trojan://b@b.example.com:443#DIRECT".to_string(),
        ],
    );
    let config: Value = serde_json::from_str(&convert(&request).unwrap()).unwrap();
    let tags: Vec<&str> = config["outbounds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["tag"].as_str().unwrap())
        .collect();

    let mut unique = tags.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), tags.len(), "{:?}", tags);
    assert!(tags.contains(&"Private #2"));
    assert!(tags.contains(&"DIRECT #2"));
}

#[test]
fn test_clash_proxy_names_differ_from_groups() {
    let request = ConvertRequest::new(
        TargetKind::Clash,
        vec!["trojan://a@a.example.com:443#Node Select".to_string()],
    );
    let config: serde_yaml::Value = serde_yaml::from_str(&convert(&request).unwrap()).unwrap();
    assert_eq!(config["proxies"][0]["name"], "Node Select #2");
    assert_eq!(config["proxy-groups"][0]["proxies"][0], "Node Select #2");
}

#[test]
fn test_balanced_extends_minimal_in_order() {
    let minimal = rule_names(RuleSelection::preset("minimal"));
    let balanced = rule_names(RuleSelection::preset("balanced"));
    assert!(balanced.len() > minimal.len());

    let common: Vec<&String> = balanced.iter().filter(|n| minimal.contains(n)).collect();
    assert_eq!(common, minimal.iter().collect::<Vec<_>>());
}

#[test]
fn test_unknown_preset_matches_minimal() {
    assert_eq!(
        resolve(&RuleSelection::preset("does-not-exist")),
        resolve(&RuleSelection::preset("minimal"))
    );
    assert_eq!(
        RuleSelection::from_query(Some("does-not-exist"), None),
        RuleSelection::preset("minimal")
    );
}

#[test]
fn test_catch_all_is_always_last() {
    for target in [TargetKind::SingBox, TargetKind::Clash, TargetKind::Surge] {
        let custom = r#"[{"name":"Work","domain_suffix":"corp.example"}]"#;
        let request = ConvertRequest::new(target, vec!["trojan://pw@t.example.com:443#T".into()])
            .with_selection(RuleSelection::from_query(Some("comprehensive"), Some(custom)));
        let text = convert(&request).unwrap();

        match target {
            TargetKind::SingBox => {
                let config: Value = serde_json::from_str(&text).unwrap();
                let rules = config["route"]["rules"].as_array().unwrap();
                let n = rules.len();
                assert_eq!(rules[n - 2]["outbound"], "Work");
                assert_eq!(rules[n - 1]["rule_set"][0], "geoip-cn");
                assert_eq!(config["route"]["final"], "Node Select");
            }
            TargetKind::Clash => {
                let config: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
                let rules: Vec<&str> = config["rules"]
                    .as_sequence()
                    .unwrap()
                    .iter()
                    .filter_map(serde_yaml::Value::as_str)
                    .collect();
                assert_eq!(
                    &rules[rules.len() - 3..],
                    [
                        "DOMAIN-SUFFIX,corp.example,Work",
                        "GEOIP,CN,DIRECT",
                        "MATCH,Node Select"
                    ]
                );
            }
            TargetKind::Surge => {
                assert!(text.ends_with(
                    "DOMAIN-SUFFIX,corp.example,Work\nGEOIP,CN,DIRECT\nFINAL,Node Select\n"
                ));
            }
        }
    }
}

#[test]
fn test_surge_skips_vless_but_keeps_others() {
    let request = ConvertRequest::new(
        TargetKind::Surge,
        vec![VLESS_A.to_string(), "trojan://pw@t.example.com:443#T".to_string()],
    )
    .with_subscription_url("https://sub.example/surge");
    let text = convert(&request).unwrap();

    assert!(text.starts_with("#!MANAGED-CONFIG https://sub.example/surge"));
    assert!(text.contains("T = trojan, t.example.com, 443, password=pw"));
    assert!(!text.contains("1.2.3.4"));
}

#[test]
fn test_surge_base_sections_survive() {
    let base = "[General]\nloglevel = verbose\n\n[Host]\nexample.com = 1.2.3.4\n\n[Rule]\nFINAL,OLD\n";
    let node = parse("trojan://pw@t.example.com:443#T").unwrap();
    let built = ConfigBuilder::<Surge, _>::new(BuildOptions::default())
        .add_proxies([&node])
        .apply_rules(resolve(&RuleSelection::preset("minimal")))
        .unwrap()
        .build_with_base(Some(base))
        .unwrap();

    let document = built.document();
    assert_eq!(document.section("General").unwrap(), ["loglevel = verbose"]);
    assert_eq!(document.section("Host").unwrap(), ["example.com = 1.2.3.4"]);
    let rules = document.section("Rule").unwrap();
    assert!(!rules.iter().any(|r| r == "FINAL,OLD"));
    assert_eq!(rules.last().map(String::as_str), Some("FINAL,Node Select"));
}

#[test]
fn test_custom_options_flow_through() {
    let options = BuildOptions::new()
        .with_selector_name("Proxy")
        .with_direct_tag("direct")
        .with_reject_tag("block");
    let request = ConvertRequest::new(TargetKind::Clash, vec![VLESS_A.to_string()])
        .with_selection(RuleSelection::names(["Ad Block"]))
        .with_options(options);
    let text = convert(&request).unwrap();
    let config: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();

    let rules: Vec<&str> = config["rules"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap())
        .collect();
    assert_eq!(rules[0], "GEOSITE,category-ads-all,block");
    assert_eq!(&rules[rules.len() - 2..], ["GEOIP,CN,direct", "MATCH,Proxy"]);
    assert_eq!(config["proxy-groups"][0]["name"], "Proxy");
}

//! Sublink - proxy share links to sing-box, Clash and Surge configs
//!
//! This library provides:
//! - A codec for `vmess://`, `vless://`, `ss://`, `trojan://`,
//!   `hysteria2://` (`hy2://`) and `tuic://` share links
//! - A catalog of rule categories with `minimal`, `balanced` and
//!   `comprehensive` presets
//! - Type-state config builders for sing-box (JSON), Clash Meta (YAML) and
//!   Surge (plaintext)
//!
//! # Example
//!
//! ```rust
//! use sublink_r::{convert, ConvertRequest, RuleSelection, TargetKind};
//!
//! let request = ConvertRequest::new(
//!     TargetKind::SingBox,
//!     vec![
//!         "vless://11111111-1111-1111-1111-111111111111@1.2.3.4:443?security=tls&sni=a.com#A".to_string(),
//!         "not-a-uri".to_string(),
//!     ],
//! )
//! .with_selection(RuleSelection::preset("minimal"));
//!
//! let config = convert(&request).unwrap();
//! assert!(config.contains("\"server_port\": 443"));
//! ```
//!
//! # Builder states
//!
//! ```text
//! Empty --add_proxies--> ProxiesLoaded --apply_rules--> RulesApplied --build--> Built
//! ```
//!
//! `apply_rules` fails when no proxy could be loaded, `build` merges into an
//! optional base document and replaces only its proxy, group and rule
//! sections.

pub mod builder;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod rules;
pub mod store;
pub mod subscription;
pub mod types;
pub mod uri;

pub use builder::{ConfigBuilder, ProxyGroup, Target};
#[cfg(feature = "clash")]
pub use builder::Clash;
#[cfg(feature = "singbox")]
pub use builder::SingBox;
#[cfg(feature = "surge")]
pub use builder::Surge;
pub use error::{ErrorKind, Result, SublinkError};
pub use options::BuildOptions;
pub use pipeline::{convert, render_nodes, ConvertRequest, TargetKind};
pub use rules::{resolve, resolve_strict, CustomRule, EffectiveRule, Policy, RuleSelection};
pub use store::{
    load_base_config, load_config, save_base_config, save_config, update_config_nodes, KvStore,
    MemoryStore, SavedConfig,
};
pub use subscription::{collect_lines, decode_subscription, encode_subscription, Fetcher};
pub use types::{Network, Node, NodeKind, Reality, Tls, Transport};
pub use uri::{generate, parse, parse_batch};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_workflow() {
        let lines = [
            "trojan://secret@t.example.com:443?sni=t.example.com#Tokyo",
            "ss://YWVzLTI1Ni1nY206cGFzcw@1.1.1.1:8388#Osaka",
            "vmess://garbage",
        ];
        let batch = parse_batch(lines);
        assert_eq!(batch.nodes.len(), 2);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].line, 3);

        let rules = resolve(&RuleSelection::preset("balanced"));
        let config = ConfigBuilder::<Clash, _>::new(BuildOptions::default())
            .add_proxies(&batch.nodes)
            .apply_rules(rules)
            .unwrap()
            .build(None)
            .unwrap()
            .format_config()
            .unwrap();

        assert!(config.contains("name: Tokyo"));
        assert!(config.contains("MATCH,Node Select"));
    }

    #[test]
    fn test_build_without_proxies_fails() {
        let node = parse("vless://u@v.example.com:443?security=tls#V").unwrap();
        let result = ConfigBuilder::<Surge, _>::new(BuildOptions::default())
            .add_proxies([&node])
            .apply_rules(resolve(&RuleSelection::preset("minimal")));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConfigValidation);
    }
}

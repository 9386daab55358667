//! Rule catalog and classification.

pub mod catalog;
mod classifier;

pub use catalog::{catalog, preset, preset_names, Policy, RuleCatalog, RuleCategory, RuleMatch};
pub use classifier::{
    resolve, resolve_strict, CustomRule, EffectiveRule, RuleSelection, SelectedRules,
    DEFAULT_PRESET,
};

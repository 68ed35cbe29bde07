//! YAML configuration for filter chains.
//!
//! ```yaml
//! default_chain: default
//! accept_by_default: false
//! max_recursion_depth: 32
//! chains:
//!   default:
//!     - action: reject
//!       if: { type: HEARTBEAT, from: 10.10 }
//!     - action: call
//!       chain: gcs_in
//!       if: { to: 1.0/8 }
//!     - action: accept
//!       priority: -3
//!   gcs_in:
//!     - action: accept
//!       priority: 3
//!       if: { type: 76 }
//! ```

use crate::chain::{validate_chain_name, ChainSet};
use crate::conditional::{If, PacketType};
use crate::filter::{Filter, DEFAULT_MAX_RECURSION_DEPTH};
use crate::rule::{Action, Rule};
use anyhow::{anyhow, bail, Context, Result};
use mavtables_core::error::ChainError;
use mavtables_core::MavSubnet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Condition of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    /// Message name or numeric message ID
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub packet_type: Option<String>,
    /// Source subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Destination subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Inclusive lower bound on the packet priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_priority: Option<i32>,
    /// Inclusive upper bound on the packet priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority: Option<i32>,
}

fn parse_subnet(field: &str, text: &str) -> Result<MavSubnet> {
    text.parse()
        .with_context(|| format!("Invalid '{}' subnet: {}", field, text))
}

impl ConditionConfig {
    /// Validate the condition without building it
    pub fn validate(&self) -> Result<()> {
        self.to_condition().map(|_| ())
    }

    /// Convert to a condition
    pub fn to_condition(&self) -> Result<If> {
        if let (Some(min), Some(max)) = (self.min_priority, self.max_priority) {
            if min > max {
                bail!("min_priority ({}) is greater than max_priority ({})", min, max);
            }
        }

        let mut condition = If::any();
        if let Some(packet_type) = &self.packet_type {
            if packet_type.is_empty() {
                bail!("Packet type cannot be empty");
            }
            let parsed: PacketType = packet_type
                .parse()
                .map_err(|_| anyhow!("Invalid packet type: {}", packet_type))?;
            condition = condition.with_type(parsed);
        }
        if let Some(from) = &self.from {
            condition = condition.with_source(parse_subnet("from", from)?);
        }
        if let Some(to) = &self.to {
            condition = condition.with_dest(parse_subnet("to", to)?);
        }
        if let Some(min) = self.min_priority {
            condition = condition.with_min_priority(min);
        }
        if let Some(max) = self.max_priority {
            condition = condition.with_max_priority(max);
        }
        Ok(condition)
    }
}

/// Kind of action a rule takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Accept the packet
    Accept,
    /// Reject the packet
    Reject,
    /// Evaluate another chain, resuming here on fallthrough
    Call,
    /// Continue in another chain without returning
    GoTo,
}

/// One rule of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// What the rule does
    pub action: ActionKind,
    /// Target chain, for `call` and `goto`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    /// Priority given to accepted packets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Condition the packet must meet
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionConfig>,
}

impl RuleConfig {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            chain: None,
            priority: None,
            condition: None,
        }
    }

    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_condition(mut self, condition: ConditionConfig) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Validate the rule shape and condition (chain existence is checked by
    /// [`FilterConfig::validate`])
    pub fn validate(&self) -> Result<()> {
        match (self.action, &self.chain) {
            (ActionKind::Call | ActionKind::GoTo, None) => {
                bail!("'{:?}' rule requires a target chain", self.action)
            }
            (ActionKind::Accept | ActionKind::Reject, Some(chain)) => {
                bail!("'{:?}' rule cannot have a target chain ({})", self.action, chain)
            }
            _ => {}
        }
        if self.action == ActionKind::Reject && self.priority.is_some() {
            bail!("Reject rule cannot have a priority");
        }
        if let Some(condition) = &self.condition {
            condition.validate()?;
        }
        Ok(())
    }

    /// Build the rule, resolving chain names in `chains`
    pub fn into_rule(self, chains: &mut ChainSet) -> Result<Rule> {
        self.validate()?;

        let target = match &self.chain {
            Some(name) => Some(chains.chain(name)?),
            None => None,
        };
        let action = match (self.action, target) {
            (ActionKind::Accept, _) => Action::Accept {
                priority: self.priority,
                condition: None,
            },
            (ActionKind::Reject, _) => Action::reject(),
            (ActionKind::Call, Some(chain)) => Action::Call {
                chain,
                priority: self.priority,
                condition: None,
            },
            (ActionKind::GoTo, Some(chain)) => Action::GoTo {
                chain,
                priority: self.priority,
                condition: None,
            },
            (kind, None) => bail!("'{:?}' rule requires a target chain", kind),
        };

        let rule = Rule::new(action);
        Ok(match &self.condition {
            Some(condition) => rule.with_condition(condition.to_condition()?),
            None => rule,
        })
    }
}

fn default_chain_name() -> String {
    "default".to_string()
}

fn default_max_recursion_depth() -> usize {
    DEFAULT_MAX_RECURSION_DEPTH
}

/// Complete filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Chain every packet starts in
    #[serde(default = "default_chain_name")]
    pub default_chain: String,
    /// Accept packets no rule decides
    #[serde(default)]
    pub accept_by_default: bool,
    /// Limit on nested `call`/`goto`
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,
    /// Rules by chain name
    #[serde(default)]
    pub chains: BTreeMap<String, Vec<RuleConfig>>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            default_chain: default_chain_name(),
            accept_by_default: false,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            chains: BTreeMap::new(),
        }
    }
}

impl FilterConfig {
    /// Load and validate filter configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(
            path = %path.display(),
            chain_count = config.chains.len(),
            default_chain = %config.default_chain,
            "Loaded filter configuration"
        );

        Ok(config)
    }

    /// Parse and validate filter configuration from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FilterConfig =
            serde_yaml::from_str(yaml).context("Failed to parse filter configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_recursion_depth == 0 {
            bail!("max_recursion_depth must be greater than zero");
        }

        if !self.chains.contains_key(&self.default_chain) {
            bail!("Default chain '{}' is not defined", self.default_chain);
        }

        for (name, rules) in &self.chains {
            validate_chain_name(name)?;

            for (index, rule) in rules.iter().enumerate() {
                let location = || format!("Rule #{} of chain '{}'", index + 1, name);

                rule.validate().with_context(location)?;
                if let Some(target) = &rule.chain {
                    if !self.chains.contains_key(target) {
                        return Err(ChainError::UndefinedChain {
                            name: target.clone(),
                        })
                        .with_context(location);
                    }
                }
            }
        }

        Ok(())
    }

    /// Build the chain set and wrap it in a [`Filter`]
    pub fn into_filter(self) -> Result<Filter> {
        self.validate()?;

        let mut chains = ChainSet::new();
        let root = chains.chain(&self.default_chain)?;
        for name in self.chains.keys() {
            chains.chain(name)?;
        }

        for (name, rules) in self.chains {
            let chain = chains.chain(&name)?;
            for rule in rules {
                let rule = rule.into_rule(&mut chains)?;
                chains.append(&chain, rule)?;
            }
        }

        info!(
            chains = chains.len(),
            default_chain = %root,
            accept_by_default = self.accept_by_default,
            max_recursion_depth = self.max_recursion_depth,
            "Built filter"
        );

        Ok(Filter::new(Arc::new(chains), root)
            .with_accept_by_default(self.accept_by_default)
            .with_max_recursion_depth(self.max_recursion_depth))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Saved filter configuration");

        Ok(())
    }
}

/// Example configurations
impl FilterConfig {
    /// A ground station and a vehicle subnet with commands prioritised.
    pub fn example() -> Self {
        let mut chains = BTreeMap::new();
        chains.insert(
            "default".to_string(),
            vec![
                RuleConfig::new(ActionKind::Reject).with_condition(ConditionConfig {
                    packet_type: Some("HEARTBEAT".to_string()),
                    from: Some("10.10".to_string()),
                    ..Default::default()
                }),
                RuleConfig::new(ActionKind::Call)
                    .with_chain("vehicles")
                    .with_condition(ConditionConfig {
                        to: Some("1.0/8".to_string()),
                        ..Default::default()
                    }),
                RuleConfig::new(ActionKind::Accept).with_priority(-1),
            ],
        );
        chains.insert(
            "vehicles".to_string(),
            vec![
                RuleConfig::new(ActionKind::Accept)
                    .with_priority(3)
                    .with_condition(ConditionConfig {
                        packet_type: Some("COMMAND_LONG".to_string()),
                        from: Some("255.0/8".to_string()),
                        ..Default::default()
                    }),
                RuleConfig::new(ActionKind::Reject).with_condition(ConditionConfig {
                    packet_type: Some("PARAM_SET".to_string()),
                    ..Default::default()
                }),
            ],
        );

        FilterConfig {
            default_chain: default_chain_name(),
            accept_by_default: false,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            chains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Context as EvalContext;
    use mavtables_core::{MavAddress, MavPacket};

    fn packet(name: &str, source: &str) -> MavPacket {
        MavPacket::builder(0, name)
            .source(source.parse().unwrap())
            .build()
    }

    fn ctx(dest: &str) -> EvalContext<'static> {
        EvalContext::new(dest.parse::<MavAddress>().unwrap())
    }

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
default_chain: main
chains:
  main:
    - action: goto
      chain: sub
      priority: 4
      if: { type: 76, to: 1.0/8 }
    - action: reject
  sub:
    - action: accept
"#;
        let config = FilterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_recursion_depth, DEFAULT_MAX_RECURSION_DEPTH);
        assert!(!config.accept_by_default);
        assert_eq!(
            config.chains["main"][0],
            RuleConfig::new(ActionKind::GoTo)
                .with_chain("sub")
                .with_priority(4)
                .with_condition(ConditionConfig {
                    packet_type: Some("76".to_string()),
                    to: Some("1.0/8".to_string()),
                    ..Default::default()
                })
        );
    }

    #[test]
    fn test_validation_errors() {
        let missing_default = "default_chain: main\nchains:\n  other: []\n";
        assert!(FilterConfig::from_yaml(missing_default).is_err());

        let undefined_target = "chains:\n  default:\n    - action: call\n      chain: nowhere\n";
        let err = FilterConfig::from_yaml(undefined_target).unwrap_err();
        assert!(format!("{:#}", err).contains("nowhere"));
        assert!(format!("{:#}", err).contains("Rule #1 of chain 'default'"));
        assert_eq!(
            err.downcast_ref::<ChainError>(),
            Some(&ChainError::UndefinedChain {
                name: "nowhere".to_string()
            })
        );

        let bad_subnet = "chains:\n  default:\n    - action: accept\n      if: { from: 1.2/17 }\n";
        assert!(FilterConfig::from_yaml(bad_subnet).is_err());

        let bad_name = "default_chain: 'a b'\nchains:\n  'a b': []\n";
        assert!(FilterConfig::from_yaml(bad_name).is_err());

        let bad_range = "chains:\n  default:\n    - action: accept\n      if: { min_priority: 3, max_priority: 1 }\n";
        assert!(FilterConfig::from_yaml(bad_range).is_err());

        let unknown_action = "chains:\n  default:\n    - action: drop\n";
        assert!(FilterConfig::from_yaml(unknown_action).is_err());

        let missing_target = "chains:\n  default:\n    - action: goto\n";
        assert!(FilterConfig::from_yaml(missing_target).is_err());

        let reject_priority = "chains:\n  default:\n    - action: reject\n      priority: 2\n";
        assert!(FilterConfig::from_yaml(reject_priority).is_err());

        let zero_depth = "max_recursion_depth: 0\nchains:\n  default: []\n";
        assert!(FilterConfig::from_yaml(zero_depth).is_err());
    }

    #[test]
    fn test_into_filter() {
        let yaml = r#"
accept_by_default: true
max_recursion_depth: 4
chains:
  default:
    - action: reject
      if: { type: HEARTBEAT, from: 10.10 }
    - action: call
      chain: gcs
      priority: 2
    - action: reject
      if: { to: 9.0/8 }
  gcs:
    - action: accept
      if: { from: 255.0/8 }
"#;
        let filter = FilterConfig::from_yaml(yaml).unwrap().into_filter().unwrap();
        assert_eq!(filter.max_recursion_depth(), 4);
        assert_eq!(filter.root().name(), "default");

        assert_eq!(
            filter.will_accept(&packet("HEARTBEAT", "10.10"), &ctx("1.1")),
            (false, 0)
        );
        assert_eq!(
            filter.will_accept(&packet("HEARTBEAT", "255.1"), &ctx("1.1")),
            (true, 2)
        );
        assert_eq!(
            filter.will_accept(&packet("HEARTBEAT", "1.1"), &ctx("9.1")),
            (false, 0)
        );
        // Falls through everything: accept_by_default.
        assert_eq!(
            filter.will_accept(&packet("HEARTBEAT", "1.1"), &ctx("2.1")),
            (true, 0)
        );
    }

    #[test]
    fn test_example_config() {
        let config = FilterConfig::example();
        assert!(config.validate().is_ok());
        let filter = config.into_filter().unwrap();

        let command = MavPacket::builder(76, "COMMAND_LONG")
            .source("255.190".parse().unwrap())
            .build();
        assert_eq!(filter.will_accept(&command, &ctx("1.1")), (true, 3));
        assert_eq!(
            filter.will_accept(&packet("PARAM_SET", "255.190"), &ctx("1.1")),
            (false, 0)
        );
        assert_eq!(
            filter.will_accept(&packet("HEARTBEAT", "1.1"), &ctx("255.190")),
            (true, -1)
        );
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.yaml");

        let config = FilterConfig::example();
        config.to_file(&path).unwrap();
        let loaded = FilterConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        assert!(FilterConfig::from_file(dir.path().join("missing.yaml")).is_err());
    }
}

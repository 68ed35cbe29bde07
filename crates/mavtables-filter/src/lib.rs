//! Rule-chain packet filtering for MAVLink
//!
//! Packets are matched against named chains of rules, much like a network
//! firewall:
//!
//! - Conditions ([`If`]) on message type, source and destination subnets and
//!   priority range
//! - Terminal actions (`accept`, `reject`) and jumps to other chains (`call`
//!   resumes on fallthrough, `goto` does not)
//! - Bounded recursion, so chains may refer to themselves or each other
//! - A default policy for packets no rule decides
//! - YAML configuration
//!
//! # Examples
//!
//! ```rust
//! use mavtables_core::{MavAddress, MavPacket};
//! use mavtables_filter::{Context, Decision, FilterConfig};
//!
//! let config = FilterConfig::from_yaml(r#"
//! chains:
//!   default:
//!     - action: call
//!       chain: gcs
//!       if: { from: 255.0/8 }
//!     - action: reject
//!   gcs:
//!     - action: accept
//!       priority: 3
//!       if: { type: COMMAND_LONG }
//! "#).unwrap();
//! let filter = config.into_filter().unwrap();
//!
//! let command = MavPacket::builder(76, "COMMAND_LONG")
//!     .source(MavAddress::new(255, 190))
//!     .build();
//! let ctx = Context::new(MavAddress::new(1, 1));
//! assert_eq!(filter.decide(&command, &ctx), Decision::Accept { priority: 3 });
//! ```

pub mod chain;
pub mod conditional;
pub mod config;
pub mod filter;
pub mod recursion;
pub mod rule;

// Re-export commonly used types
pub use chain::{Chain, ChainId, ChainRef, ChainSet, Context, Verdict};
pub use conditional::{If, PacketType};
pub use config::{ActionKind, ConditionConfig, FilterConfig, RuleConfig};
pub use filter::{Decision, Filter, FilterStats, RejectReason, DEFAULT_MAX_RECURSION_DEPTH};
pub use recursion::{RecursionData, RecursionGuard};
pub use rule::{Action, Rule};

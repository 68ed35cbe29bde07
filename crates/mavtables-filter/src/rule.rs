//! Actions and the rules that carry them.

use crate::chain::{ChainRef, ChainSet, Context, Verdict};
use crate::conditional::If;
use crate::recursion::{RecursionData, RecursionGuard};
use mavtables_core::error::RecursionError;
use mavtables_core::Packet;
use std::fmt;
use tracing::trace;

/// What a matching rule does with a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Accept, optionally with a priority.
    Accept {
        priority: Option<i32>,
        condition: Option<If>,
    },
    /// Reject.
    Reject { condition: Option<If> },
    /// Transfer to another chain; its verdict is final.
    GoTo {
        chain: ChainRef,
        priority: Option<i32>,
        condition: Option<If>,
    },
    /// Evaluate another chain and resume here if it falls through.
    Call {
        chain: ChainRef,
        priority: Option<i32>,
        condition: Option<If>,
    },
}

impl Action {
    pub fn accept() -> Self {
        Action::Accept {
            priority: None,
            condition: None,
        }
    }

    pub fn reject() -> Self {
        Action::Reject { condition: None }
    }

    pub fn goto(chain: ChainRef) -> Self {
        Action::GoTo {
            chain,
            priority: None,
            condition: None,
        }
    }

    pub fn call(chain: ChainRef) -> Self {
        Action::Call {
            chain,
            priority: None,
            condition: None,
        }
    }

    /// Set the priority. A no-op on `Reject`.
    ///
    /// On `GoTo` and `Call` the priority only applies to an accept from the
    /// target chain that did not set a priority itself.
    pub fn with_priority(mut self, value: i32) -> Self {
        match &mut self {
            Action::Accept { priority, .. }
            | Action::GoTo { priority, .. }
            | Action::Call { priority, .. } => *priority = Some(value),
            Action::Reject { .. } => {}
        }
        self
    }

    /// Attach a condition that must hold for the action to run.
    pub fn with_condition(mut self, value: If) -> Self {
        match &mut self {
            Action::Accept { condition, .. }
            | Action::Reject { condition }
            | Action::GoTo { condition, .. }
            | Action::Call { condition, .. } => *condition = Some(value),
        }
        self
    }

    pub fn priority(&self) -> Option<i32> {
        match self {
            Action::Accept { priority, .. }
            | Action::GoTo { priority, .. }
            | Action::Call { priority, .. } => *priority,
            Action::Reject { .. } => None,
        }
    }

    pub fn condition(&self) -> Option<&If> {
        match self {
            Action::Accept { condition, .. }
            | Action::Reject { condition }
            | Action::GoTo { condition, .. }
            | Action::Call { condition, .. } => condition.as_ref(),
        }
    }

    /// Chain this action jumps to, if any.
    pub fn target(&self) -> Option<&ChainRef> {
        match self {
            Action::GoTo { chain, .. } | Action::Call { chain, .. } => Some(chain),
            _ => None,
        }
    }

    /// Run the action, assuming every condition already matched.
    pub fn apply(
        &self,
        chains: &ChainSet,
        packet: &dyn Packet,
        ctx: &Context<'_>,
        recursion: &RecursionData,
    ) -> Result<Verdict, RecursionError> {
        match self {
            Action::Accept { priority, .. } => Ok(Verdict::Accept(*priority)),
            Action::Reject { .. } => Ok(Verdict::Reject),
            Action::GoTo {
                chain, priority, ..
            } => match invoke(chains, chain, packet, ctx, recursion)? {
                Verdict::Continue => Ok(Verdict::Default),
                verdict => Ok(verdict.or_priority(*priority)),
            },
            Action::Call {
                chain, priority, ..
            } => Ok(invoke(chains, chain, packet, ctx, recursion)?.or_priority(*priority)),
        }
    }
}

/// Evaluate `target` one level deeper.
fn invoke(
    chains: &ChainSet,
    target: &ChainRef,
    packet: &dyn Packet,
    ctx: &Context<'_>,
    recursion: &RecursionData,
) -> Result<Verdict, RecursionError> {
    let _guard = RecursionGuard::enter(recursion, target.name())?;
    trace!(
        chain = %target.name(),
        depth = recursion.depth(),
        "Entering chain"
    );

    // A reference from another set resolves to nothing, like an empty chain.
    match chains.get(target.id()) {
        Some(chain) => chain.evaluate(chains, packet, ctx, recursion),
        None => Ok(Verdict::Continue),
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Accept { .. } => write!(f, "accept")?,
            Action::Reject { .. } => write!(f, "reject")?,
            Action::GoTo { chain, .. } => write!(f, "goto {}", chain)?,
            Action::Call { chain, .. } => write!(f, "call {}", chain)?,
        }
        if let Some(priority) = self.priority() {
            write!(f, " with priority {}", priority)?;
        }
        if let Some(condition) = self.condition() {
            write!(f, " {}", condition)?;
        }
        Ok(())
    }
}

/// An action guarded by an optional condition.
///
/// The rule matches only when both its own condition and the action's
/// condition hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    condition: Option<If>,
    action: Action,
}

impl Rule {
    pub fn new(action: Action) -> Self {
        Self {
            condition: None,
            action,
        }
    }

    pub fn with_condition(mut self, condition: If) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn condition(&self) -> Option<&If> {
        self.condition.as_ref()
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    #[inline]
    pub fn matches(&self, packet: &dyn Packet, dest: mavtables_core::MavAddress) -> bool {
        self.condition
            .as_ref()
            .map_or(true, |c| c.check(packet, dest))
            && self
                .action
                .condition()
                .map_or(true, |c| c.check(packet, dest))
    }

    /// Verdict of this rule alone: `Continue` when it does not match.
    pub fn evaluate(
        &self,
        chains: &ChainSet,
        packet: &dyn Packet,
        ctx: &Context<'_>,
        recursion: &RecursionData,
    ) -> Result<Verdict, RecursionError> {
        if !self.matches(packet, ctx.dest) {
            return Ok(Verdict::Continue);
        }
        self.action.apply(chains, packet, ctx, recursion)
    }
}

impl From<Action> for Rule {
    fn from(action: Action) -> Self {
        Rule::new(action)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        match (&self.condition, self.action.condition()) {
            (Some(condition), Some(_)) => write!(f, " and {}", condition),
            (Some(condition), None) => write!(f, " {}", condition),
            (None, _) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavtables_core::{MavAddress, MavPacket};

    fn packet() -> MavPacket {
        MavPacket::builder(0, "HEARTBEAT")
            .source(MavAddress::new(1, 1))
            .build()
    }

    fn run(action: Action, chains: &ChainSet) -> Verdict {
        let ctx = Context::new(MavAddress::new(2, 2));
        let recursion = RecursionData::new(8);
        Rule::new(action)
            .evaluate(chains, &packet(), &ctx, &recursion)
            .unwrap()
    }

    #[test]
    fn test_accept_and_reject() {
        let chains = ChainSet::new();
        assert_eq!(run(Action::accept(), &chains), Verdict::Accept(None));
        assert_eq!(
            run(Action::accept().with_priority(3), &chains),
            Verdict::Accept(Some(3))
        );
        assert_eq!(run(Action::reject(), &chains), Verdict::Reject);
        assert_eq!(Action::reject().with_priority(3).priority(), None);
    }

    #[test]
    fn test_goto_fallthrough_becomes_default() {
        let mut chains = ChainSet::new();
        let empty = chains.chain("empty").unwrap();
        assert_eq!(run(Action::goto(empty.clone()), &chains), Verdict::Default);
        assert_eq!(run(Action::call(empty), &chains), Verdict::Continue);
    }

    #[test]
    fn test_jump_priority_fills_missing_priority_only() {
        let mut chains = ChainSet::new();
        let plain = chains.chain("plain").unwrap();
        chains.append(&plain, Rule::new(Action::accept())).unwrap();
        let explicit = chains.chain("explicit").unwrap();
        chains
            .append(&explicit, Rule::new(Action::accept().with_priority(1)))
            .unwrap();

        assert_eq!(
            run(Action::call(plain.clone()).with_priority(5), &chains),
            Verdict::Accept(Some(5))
        );
        assert_eq!(
            run(Action::goto(plain).with_priority(5), &chains),
            Verdict::Accept(Some(5))
        );
        assert_eq!(
            run(Action::goto(explicit).with_priority(5), &chains),
            Verdict::Accept(Some(1))
        );
    }

    #[test]
    fn test_rule_and_action_conditions_are_anded() {
        let chains = ChainSet::new();
        let ctx = Context::new(MavAddress::new(2, 2));
        let recursion = RecursionData::new(8);

        let rule = Rule::new(Action::accept().with_condition(If::any().with_name("HEARTBEAT")))
            .with_condition(If::any().with_dest("3.0/8".parse().unwrap()));
        assert!(!rule.matches(&packet(), ctx.dest));
        assert_eq!(
            rule.evaluate(&chains, &packet(), &ctx, &recursion).unwrap(),
            Verdict::Continue
        );

        let rule = Rule::new(Action::accept().with_condition(If::any().with_name("HEARTBEAT")))
            .with_condition(If::any().with_dest("2.0/8".parse().unwrap()));
        assert!(rule.matches(&packet(), ctx.dest));
    }

    #[test]
    fn test_display() {
        let mut chains = ChainSet::new();
        let gcs = chains.chain("gcs_in").unwrap();

        assert_eq!(Action::accept().to_string(), "accept");
        assert_eq!(
            Rule::new(Action::accept().with_priority(3)).with_condition(
                If::any()
                    .with_name("HEARTBEAT")
                    .with_source("1.0/8".parse().unwrap())
                    .with_dest("255.0".parse().unwrap())
            )
            .to_string(),
            "accept with priority 3 if HEARTBEAT from 1.0/8 to 255.0"
        );
        assert_eq!(
            Action::call(gcs.clone()).with_priority(-2).to_string(),
            "call gcs_in with priority -2"
        );
        assert_eq!(
            Rule::new(Action::goto(gcs).with_condition(If::any().with_id(76)))
                .with_condition(If::any())
                .to_string(),
            "goto gcs_in if #76 and if any"
        );
    }
}

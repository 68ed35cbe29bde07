//! Chains of rules and the arena that owns them.
//!
//! Chains are stored in a [`ChainSet`] and refer to each other through
//! [`ChainRef`] handles (arena index plus name), so self references and
//! cycles need no shared ownership. A set is built once, then frozen behind an
//! `Arc` and evaluated from any number of threads.

use crate::recursion::RecursionData;
use crate::rule::Rule;
use mavtables_core::error::{ChainError, RecursionError};
use mavtables_core::{MavAddress, Packet};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Outcome of evaluating a rule or a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Forward the packet, with the priority if one was set.
    Accept(Option<i32>),
    /// Drop the packet.
    Reject,
    /// No rule matched; evaluation carries on in the caller.
    Continue,
    /// A `goto` target fell through; the filter's default policy decides.
    Default,
}

impl Verdict {
    /// Fill in `priority` on an accept that has none.
    #[inline]
    pub fn or_priority(self, priority: Option<i32>) -> Self {
        match self {
            Verdict::Accept(None) => Verdict::Accept(priority),
            other => other,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Verdict::Continue)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accept(None) => write!(f, "accept"),
            Verdict::Accept(Some(priority)) => write!(f, "accept with priority {}", priority),
            Verdict::Reject => write!(f, "reject"),
            Verdict::Continue => write!(f, "continue"),
            Verdict::Default => write!(f, "default"),
        }
    }
}

/// Per-packet evaluation inputs besides the packet itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context<'a> {
    /// Address the packet is being offered to.
    pub dest: MavAddress,
    /// Label of the connection the packet arrived on, for diagnostics.
    pub ingress: Option<&'a str>,
}

impl<'a> Context<'a> {
    pub fn new(dest: MavAddress) -> Self {
        Self { dest, ingress: None }
    }

    pub fn with_ingress(mut self, ingress: &'a str) -> Self {
        self.ingress = Some(ingress);
        self
    }
}

/// Index of a chain in its [`ChainSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId(usize);

impl ChainId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to a chain: its arena index plus its name for display and errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainRef {
    id: ChainId,
    name: Arc<str>,
}

impl ChainRef {
    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Named, ordered list of rules.
#[derive(Debug, Clone)]
pub struct Chain {
    name: Arc<str>,
    rules: Vec<Rule>,
}

impl Chain {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate the rules in order and return the first terminal verdict.
    ///
    /// Returns `Continue` when no rule decides.
    pub fn evaluate(
        &self,
        chains: &ChainSet,
        packet: &dyn Packet,
        ctx: &Context<'_>,
        recursion: &RecursionData,
    ) -> Result<Verdict, RecursionError> {
        for (index, rule) in self.rules.iter().enumerate() {
            let verdict = rule.evaluate(chains, packet, ctx, recursion)?;
            if verdict.is_terminal() {
                trace!(
                    chain = %self.name,
                    rule = index,
                    verdict = %verdict,
                    "Chain decided"
                );
                return Ok(verdict);
            }
        }
        Ok(Verdict::Continue)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "chain {} {{", self.name)?;
        for rule in &self.rules {
            writeln!(f, "    {};", rule)?;
        }
        write!(f, "}}")
    }
}

/// Arena of chains, addressed by [`ChainId`].
#[derive(Debug, Clone, Default)]
pub struct ChainSet {
    chains: Vec<Chain>,
    by_name: HashMap<Arc<str>, ChainId>,
}

/// Chain names must be non-empty and free of whitespace.
pub fn validate_chain_name(name: &str) -> Result<(), ChainError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ChainError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl ChainSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference to the chain called `name`, creating an empty one if needed.
    ///
    /// Forward references are how `goto`/`call` rules name chains whose rules
    /// are appended later.
    pub fn chain(&mut self, name: &str) -> Result<ChainRef, ChainError> {
        if let Some(found) = self.find(name) {
            return Ok(found);
        }
        validate_chain_name(name)?;

        let id = ChainId(self.chains.len());
        let name: Arc<str> = Arc::from(name);
        self.chains.push(Chain {
            name: name.clone(),
            rules: Vec::new(),
        });
        self.by_name.insert(name.clone(), id);
        Ok(ChainRef { id, name })
    }

    /// Append a rule to the end of a chain.
    pub fn append(&mut self, chain: &ChainRef, rule: Rule) -> Result<(), ChainError> {
        match self.chains.get_mut(chain.id.0) {
            Some(target) if target.name == chain.name => {
                target.rules.push(rule);
                Ok(())
            }
            _ => Err(ChainError::UnknownChain {
                name: chain.name().to_string(),
            }),
        }
    }

    pub fn get(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<ChainRef> {
        self.by_name
            .get_key_value(name)
            .map(|(name, id)| ChainRef {
                id: *id,
                name: name.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Chains in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter()
    }
}

impl fmt::Display for ChainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, chain) in self.chains.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
                writeln!(f)?;
            }
            write!(f, "{}", chain)?;
        }
        Ok(())
    }
}

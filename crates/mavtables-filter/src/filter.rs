//! The top-level filter a connection consults before queueing a packet.

use crate::chain::{ChainRef, ChainSet, Context, Verdict};
use crate::recursion::RecursionData;
use mavtables_core::error::RecursionError;
use mavtables_core::Packet;
use metrics::{counter, describe_counter};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Nesting limit for `goto`/`call` when none is configured.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 32;

/// Final decision on a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward with this priority (0 when no rule set one).
    Accept { priority: i32 },
    /// Drop, and why.
    Reject(RejectReason),
}

impl Decision {
    #[inline]
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept { .. })
    }
}

/// Why a packet was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// A `reject` rule matched.
    Explicit,
    /// No rule decided and the default policy is to reject.
    Default,
    /// Chain invocation nested too deeply.
    Recursion(RecursionError),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Explicit => write!(f, "rejected by rule"),
            RejectReason::Default => write!(f, "rejected by default policy"),
            RejectReason::Recursion(err) => write!(f, "{}", err),
        }
    }
}

/// Snapshot of filter counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Total decisions
    pub total: u64,
    /// Decisions that accepted
    pub accepted: u64,
    /// Decisions that rejected, for any reason
    pub rejected: u64,
    /// Rejections caused by recursion errors
    pub recursion_errors: u64,
}

impl FilterStats {
    /// Acceptance rate as a percentage
    pub fn accept_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.accepted as f64 / self.total as f64) * 100.0
        }
    }
}

impl fmt::Display for FilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FilterStats(total: {}, accepted: {}, rejected: {}, recursion_errors: {}, accept_rate: {:.2}%)",
            self.total,
            self.accepted,
            self.rejected,
            self.recursion_errors,
            self.accept_rate()
        )
    }
}

#[derive(Debug, Default)]
struct FilterCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    recursion_errors: AtomicU64,
}

impl FilterCounters {
    fn record(&self, decision: &Decision) {
        match decision {
            Decision::Accept { .. } => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                counter!("filter_packets_accepted_total").increment(1);
            }
            Decision::Reject(reason) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                counter!("filter_packets_rejected_total").increment(1);
                if matches!(reason, RejectReason::Recursion(_)) {
                    self.recursion_errors.fetch_add(1, Ordering::Relaxed);
                    counter!("filter_recursion_errors_total").increment(1);
                }
            }
        }
    }

    fn snapshot(&self) -> FilterStats {
        let accepted = self.accepted.load(Ordering::Relaxed);
        let rejected = self.rejected.load(Ordering::Relaxed);
        FilterStats {
            total: accepted + rejected,
            accepted,
            rejected,
            recursion_errors: self.recursion_errors.load(Ordering::Relaxed),
        }
    }
}

/// Packet filter rooted at one chain of a frozen [`ChainSet`].
///
/// Evaluation takes `&self` only; share a filter between connections and
/// threads with an `Arc`.
///
/// # Examples
///
/// ```
/// use mavtables_core::{MavAddress, MavPacket};
/// use mavtables_filter::{Action, ChainSet, Context, Filter, If, Rule};
/// use std::sync::Arc;
///
/// let mut chains = ChainSet::new();
/// let root = chains.chain("default").unwrap();
/// chains
///     .append(&root, Rule::new(Action::accept().with_priority(2))
///         .with_condition(If::any().with_name("HEARTBEAT")))
///     .unwrap();
///
/// let filter = Filter::new(Arc::new(chains), root);
/// let packet = MavPacket::builder(0, "HEARTBEAT").build();
/// let ctx = Context::new(MavAddress::new(1, 1));
/// assert_eq!(filter.will_accept(&packet, &ctx), (true, 2));
/// ```
#[derive(Debug)]
pub struct Filter {
    chains: Arc<ChainSet>,
    root: ChainRef,
    accept_by_default: bool,
    max_recursion_depth: usize,
    counters: FilterCounters,
}

impl Filter {
    /// Filter that rejects anything its chains leave undecided.
    pub fn new(chains: Arc<ChainSet>, root: ChainRef) -> Self {
        describe_counter!("filter_packets_accepted_total", "Packets accepted by filters");
        describe_counter!("filter_packets_rejected_total", "Packets rejected by filters");
        describe_counter!(
            "filter_recursion_errors_total",
            "Packets rejected because chain nesting exceeded the limit"
        );

        Self {
            chains,
            root,
            accept_by_default: false,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            counters: FilterCounters::default(),
        }
    }

    /// Policy for packets no rule decides.
    pub fn with_accept_by_default(mut self, accept: bool) -> Self {
        self.accept_by_default = accept;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn chains(&self) -> &Arc<ChainSet> {
        &self.chains
    }

    pub fn root(&self) -> &ChainRef {
        &self.root
    }

    pub fn accept_by_default(&self) -> bool {
        self.accept_by_default
    }

    pub fn max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    /// Evaluate the root chain and resolve fallthrough with the default policy.
    pub fn decide(&self, packet: &dyn Packet, ctx: &Context<'_>) -> Decision {
        let recursion = RecursionData::new(self.max_recursion_depth);
        let verdict = match self.chains.get(self.root.id()) {
            Some(root) => root.evaluate(&self.chains, packet, ctx, &recursion),
            None => Ok(Verdict::Continue),
        };

        let decision = match verdict {
            Ok(Verdict::Accept(priority)) => Decision::Accept {
                priority: priority.unwrap_or(0),
            },
            Ok(Verdict::Reject) => Decision::Reject(RejectReason::Explicit),
            Ok(Verdict::Continue | Verdict::Default) => {
                if self.accept_by_default {
                    Decision::Accept { priority: 0 }
                } else {
                    Decision::Reject(RejectReason::Default)
                }
            }
            Err(err) => {
                warn!(
                    packet = %packet.name(),
                    source = %packet.source(),
                    dest = %ctx.dest,
                    ingress = ctx.ingress.unwrap_or("-"),
                    error = %err,
                    "Rejecting packet after recursion error"
                );
                Decision::Reject(RejectReason::Recursion(err))
            }
        };

        trace!(
            packet = %packet.name(),
            source = %packet.source(),
            dest = %ctx.dest,
            decision = ?decision,
            "Filter decision"
        );
        self.counters.record(&decision);
        decision
    }

    /// `(accepted, priority)` form of [`decide`](Self::decide).
    pub fn will_accept(&self, packet: &dyn Packet, ctx: &Context<'_>) -> (bool, i32) {
        match self.decide(packet, ctx) {
            Decision::Accept { priority } => (true, priority),
            Decision::Reject(_) => (false, 0),
        }
    }

    pub fn stats(&self) -> FilterStats {
        self.counters.snapshot()
    }
}

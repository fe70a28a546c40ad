use crate::{address::Address, token::TokenBalances};
use serde::{Deserialize, Serialize};

/// Per-address accumulator (spec.md §3 "Balance"). Invariant: `received >=
/// spent` on an honest chain; a violation is logged but never fatal
/// (spec.md §7, "Invariant" error kind).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub received: u64,
    pub spent: u64,
    pub forged: u64,
    pub tokens: TokenBalances,
    pub delegated_in: u64,
    pub delegated_out: u64,
    pub count_spent: u64,
    pub last_updated_height: u64,
}

impl BalanceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the `received >= spent` invariant; callers log and continue
    /// on `false` rather than treating it as fatal.
    pub fn is_consistent(&self) -> bool {
        self.received >= self.spent
    }

    /// Merges another (in-memory, single-block) accumulator into this one
    /// by summing every field, per spec.md §4.5 ("merge in-memory balances
    /// with stored balances... adding per-field").
    pub fn merge_add(&mut self, other: &BalanceInfo) {
        self.received = self.received.saturating_add(other.received);
        self.spent = self.spent.saturating_add(other.spent);
        self.forged = self.forged.saturating_add(other.forged);
        self.delegated_in = self.delegated_in.saturating_add(other.delegated_in);
        self.delegated_out = self.delegated_out.saturating_add(other.delegated_out);
        self.count_spent = self.count_spent.saturating_add(other.count_spent);
        for (token, amount) in &other.tokens {
            *self.tokens.entry(*token).or_insert(0) += amount;
        }
        self.last_updated_height = self.last_updated_height.max(other.last_updated_height);
    }
}

/// Running aggregate of total supply across all addresses (spec.md §3
/// "Metadata keys" — `CommonBalance`). `money` must equal
/// `sum(received - spent + forged)` over all addresses after every block
/// (spec.md §8, property 6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonBalance {
    pub money: u64,
}

/// One frame of a per-(from,to) delegation stack (spec.md §3 "Delegate
/// state"): pushed by a delegate tx, popped LIFO by an undelegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateFrame {
    pub value: u64,
    pub tx_hash: crate::hash::Hash,
}

/// Running total of forging rewards per intent status, accumulated across
/// all forging blocks (spec.md §3/§4.5 "ForgingSumsAll").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgingSums {
    pub f1: u64,
    pub f2: u64,
    pub f3: u64,
    pub f4: u64,
}

impl ForgingSums {
    pub fn add(&mut self, status: crate::transaction::IntentStatus, amount: u64) {
        use crate::transaction::IntentStatus::*;
        match status {
            ForgingF1 => self.f1 = self.f1.saturating_add(amount),
            ForgingF2 => self.f2 = self.f2.saturating_add(amount),
            ForgingF3 => self.f3 = self.f3.saturating_add(amount),
            ForgingF4 => self.f4 = self.f4.saturating_add(amount),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_add_sums_fields() {
        let mut a = BalanceInfo {
            received: 10,
            spent: 2,
            last_updated_height: 5,
            ..Default::default()
        };
        let b = BalanceInfo {
            received: 5,
            spent: 1,
            last_updated_height: 6,
            ..Default::default()
        };
        a.merge_add(&b);
        assert_eq!(a.received, 15);
        assert_eq!(a.spent, 3);
        assert_eq!(a.last_updated_height, 6);
    }

    #[test]
    fn consistency_check() {
        let ok = BalanceInfo {
            received: 10,
            spent: 5,
            ..Default::default()
        };
        assert!(ok.is_consistent());
        let bad = BalanceInfo {
            received: 1,
            spent: 5,
            ..Default::default()
        };
        assert!(!bad.is_consistent());
    }

    use proptest::prelude::*;

    fn arb_balance(received: u64, spent: u64, forged: u64, height: u64) -> BalanceInfo {
        BalanceInfo {
            received,
            spent,
            forged,
            last_updated_height: height,
            ..Default::default()
        }
    }

    proptest! {
        // spec.md §8 property 6 ("CommonBalance conservation") rests on
        // merge_add being exact, not just saturating-without-panicking:
        // summing two in-memory accumulators into a stored one must equal
        // summing all three fields directly, for any split across blocks.
        #[test]
        fn merge_add_is_exact_field_sum(
            r1 in 0u64..1_000_000, s1 in 0u64..1_000_000, f1 in 0u64..1_000_000, h1 in 0u64..1000,
            r2 in 0u64..1_000_000, s2 in 0u64..1_000_000, f2 in 0u64..1_000_000, h2 in 0u64..1000,
        ) {
            let mut merged = arb_balance(r1, s1, f1, h1);
            let incoming = arb_balance(r2, s2, f2, h2);
            merged.merge_add(&incoming);

            prop_assert_eq!(merged.received, r1 + r2);
            prop_assert_eq!(merged.spent, s1 + s2);
            prop_assert_eq!(merged.forged, f1 + f2);
            prop_assert_eq!(merged.last_updated_height, h1.max(h2));
        }

        // Order shouldn't matter: merging b into a then folding in c gives
        // the same totals as merging in the other order (associativity is
        // what lets the indexer merge one in-memory delta at a time without
        // caring which address touched the block first).
        #[test]
        fn merge_add_is_order_independent(
            r1 in 0u64..100_000, s1 in 0u64..100_000,
            r2 in 0u64..100_000, s2 in 0u64..100_000,
            r3 in 0u64..100_000, s3 in 0u64..100_000,
        ) {
            let a = arb_balance(r1, s1, 0, 0);
            let b = arb_balance(r2, s2, 0, 0);
            let c = arb_balance(r3, s3, 0, 0);

            let mut left = a.clone();
            left.merge_add(&b);
            left.merge_add(&c);

            let mut right = a;
            let mut bc = b;
            bc.merge_add(&c);
            right.merge_add(&bc);

            prop_assert_eq!(left.received, right.received);
            prop_assert_eq!(left.spent, right.spent);
        }
    }
}

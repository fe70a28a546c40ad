use serde::{Deserialize, Serialize};

/// Feature-module bitmap (design note "Module bitmap feature-gating"):
/// toggles which derived keyspaces a store was created with. Frozen after
/// the store's first write (spec.md §3 "Metadata keys" — `Modules`); any
/// later run must validate its configured set against the frozen one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modules {
    pub block: bool,
    pub balance: bool,
    pub txs: bool,
    pub addr_txs: bool,
    pub users: bool,
    pub v8: bool,
    pub node_test: bool,
}

impl Modules {
    pub fn all() -> Self {
        Self {
            block: true,
            balance: true,
            txs: true,
            addr_txs: true,
            users: true,
            v8: true,
            node_test: true,
        }
    }

    pub fn to_bitmap(self) -> u32 {
        let mut bits = 0u32;
        if self.block {
            bits |= 1 << 0;
        }
        if self.balance {
            bits |= 1 << 1;
        }
        if self.txs {
            bits |= 1 << 2;
        }
        if self.addr_txs {
            bits |= 1 << 3;
        }
        if self.users {
            bits |= 1 << 4;
        }
        if self.v8 {
            bits |= 1 << 5;
        }
        if self.node_test {
            bits |= 1 << 6;
        }
        bits
    }

    pub fn from_bitmap(bits: u32) -> Self {
        Self {
            block: bits & (1 << 0) != 0,
            balance: bits & (1 << 1) != 0,
            txs: bits & (1 << 2) != 0,
            addr_txs: bits & (1 << 3) != 0,
            users: bits & (1 << 4) != 0,
            v8: bits & (1 << 5) != 0,
            node_test: bits & (1 << 6) != 0,
        }
    }

    /// Validates that a freshly-configured module set matches the one a
    /// store was created with. A mismatch means the operator changed
    /// `modules` on an existing data directory, which spec.md §3 treats as
    /// an error (the bitmap is "frozen after first write").
    pub fn matches_frozen(&self, frozen: Modules) -> bool {
        *self == frozen
    }
}

impl Default for Modules {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_roundtrip() {
        let m = Modules {
            block: true,
            balance: false,
            txs: true,
            addr_txs: false,
            users: true,
            v8: false,
            node_test: true,
        };
        assert_eq!(Modules::from_bitmap(m.to_bitmap()), m);
    }

    #[test]
    fn frozen_mismatch_detected() {
        let created = Modules::all();
        let mut later = Modules::all();
        later.v8 = false;
        assert!(!later.matches_frozen(created));
    }
}

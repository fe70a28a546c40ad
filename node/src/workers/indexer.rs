//! Main indexer worker (C7, spec.md §4.5). Applies every accepted block to
//! the balance/tx/delegation/token keyspaces, one block at a time, under a
//! single-writer discipline, committing one atomic write batch per block.

use crate::store::{
    key_address, key_address_pair, key_address_seq, key_delegate, key_hash, BlockMetadata,
    Keyspace, MainBlockInfo, Storage, StorageJsonExt, StoreResult, WriteBatch,
};
use crate::workers::{WorkItem, WorkerMessage};
use chain_common::{
    Address, BalanceInfo, BlockInfo, CommonBalance, DelegateFrame, ForgingSums, Hash,
    TokenOperation, TransactionInfo, TransactionStatus,
};
use log::{error, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

const MAIN_BLOCK_KEY: &[u8] = b"MainBlock";
const COMMON_BALANCE_KEY: &[u8] = b"CommonBalance";
const FORGE_ALL_KEY: &[u8] = b"ForgingSumsAll";
const BLOCK_METADATA_KEY: &[u8] = b"BlockMetadata";
const LAST_N_TRANSACTIONS: usize = 100;

/// LIFO overlay over the `deleg:{from}:{to}:{seq}` keyspace, scoped to one
/// block so two transactions in the same block can push-then-pop
/// consistently (spec.md §4.5 "Ordering guarantees"). Frame index doubles
/// as its persisted `seq` — see `flush`.
struct DelegateOverlay {
    stacks: HashMap<(Address, Address), (usize, Vec<DelegateFrame>)>,
}

impl DelegateOverlay {
    fn new() -> Self {
        Self { stacks: HashMap::new() }
    }

    fn load<'a>(
        &'a mut self,
        store: &dyn Storage,
        from: Address,
        to: Address,
    ) -> StoreResult<&'a mut Vec<DelegateFrame>> {
        if !self.stacks.contains_key(&(from, to)) {
            let prefix = key_address_pair(&from, &to);
            let mut entries = store.scan_prefix(Keyspace::Delegate, &prefix)?;
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let frames: Vec<DelegateFrame> = entries
                .into_iter()
                .filter_map(|(_, v)| serde_json::from_slice(&v).ok())
                .collect();
            let original_len = frames.len();
            self.stacks.insert((from, to), (original_len, frames));
        }
        Ok(&mut self.stacks.get_mut(&(from, to)).unwrap().1)
    }

    fn push(&mut self, store: &dyn Storage, from: Address, to: Address, frame: DelegateFrame) -> StoreResult<()> {
        self.load(store, from, to)?.push(frame);
        Ok(())
    }

    /// Pops the most recently pushed, not-yet-popped frame for `(from,
    /// to)` — exactly the invariant of spec.md §8 property 5.
    fn pop(&mut self, store: &dyn Storage, from: Address, to: Address) -> StoreResult<Option<DelegateFrame>> {
        Ok(self.load(store, from, to)?.pop())
    }

    fn flush(self, batch: &mut WriteBatch) -> StoreResult<()> {
        for ((from, to), (original_len, frames)) in self.stacks {
            if frames.len() < original_len {
                for seq in frames.len()..original_len {
                    batch.delete(Keyspace::Delegate, key_delegate(&from, &to, seq as u64));
                }
            } else if frames.len() > original_len {
                for seq in original_len..frames.len() {
                    batch.put_json(Keyspace::Delegate, key_delegate(&from, &to, seq as u64), &frames[seq])?;
                }
            }
        }
        Ok(())
    }
}

pub struct IndexerWorker {
    store: Arc<dyn Storage>,
    last_100: Arc<Mutex<VecDeque<Hash>>>,
}

impl IndexerWorker {
    pub fn initial_watermark(store: &dyn Storage) -> StoreResult<u64> {
        match store.get_json::<MainBlockInfo>(Keyspace::MainMeta, MAIN_BLOCK_KEY)? {
            Some(info) => Ok(info.height),
            None => Ok(0),
        }
    }

    pub fn last_100_snapshot(&self) -> Vec<Hash> {
        self.last_100.lock().expect("mutex poisoned").iter().copied().collect()
    }

    pub fn new_last_100_handle() -> Arc<Mutex<VecDeque<Hash>>> {
        Arc::new(Mutex::new(VecDeque::with_capacity(LAST_N_TRANSACTIONS)))
    }

    /// Runs the worker loop to completion (returns on `Shutdown` or a
    /// fatal storage error). Spec.md §7: a write-batch failure is fatal to
    /// the worker *and the process* — the caller is expected to treat an
    /// `Err` return as grounds to abort the node, not retry silently.
    /// `last_100` is shared with the RPC layer so reads never need to go
    /// through the worker's own queue.
    pub fn run(
        store: Arc<dyn Storage>,
        receiver: Receiver<WorkerMessage>,
        last_100: Arc<Mutex<VecDeque<Hash>>>,
    ) -> anyhow::Result<()> {
        let worker = IndexerWorker { store: store.clone(), last_100 };
        let mut watermark = Self::initial_watermark(&*store)?;
        info!("main indexer resuming from height {watermark}");

        for message in receiver {
            match message {
                WorkerMessage::Shutdown => break,
                WorkerMessage::Apply(item) => {
                    let height = item.block.height();
                    if height <= watermark {
                        continue;
                    }
                    if let Some(tip) = store.get_json::<BlockMetadata>(Keyspace::BlockMeta, BLOCK_METADATA_KEY)? {
                        if height > watermark + 1 && item.block.header.parent_hash != tip.preferred_tip_hash {
                            error!("fatal inconsistency: block {height} parent does not match stored tip");
                            anyhow::bail!("chain inconsistency at height {height}");
                        }
                    }
                    worker.apply_block(&item)?;
                    watermark = height;
                }
            }
        }
        Ok(())
    }

    fn apply_block(&self, item: &WorkItem) -> anyhow::Result<()> {
        let block = &item.block;
        let mut batch = WriteBatch::new();
        let mut delegates = DelegateOverlay::new();
        let mut balances: HashMap<Address, BalanceInfo> = HashMap::new();
        // Absolute (not delta) `(delegated_in, delegated_out)` overlay, since
        // an undelegate can decrease these fields and `BalanceInfo::merge_add`
        // only ever adds. Lazily seeded from the stored balance on first
        // touch, then carried forward across transactions in this block.
        let mut delegate_balances: HashMap<Address, (u64, u64)> = HashMap::new();
        let mut forging_sums = self
            .store
            .get_json::<ForgingSums>(Keyspace::ForgeAll, FORGE_ALL_KEY)?
            .unwrap_or_default();

        for (seq, tx) in block.transactions.iter().enumerate() {
            let status = self.apply_transaction(tx, &mut delegates, &mut balances, &mut delegate_balances, &mut forging_sums, seq as u64, &mut batch)?;
            if let Some(status) = status {
                batch.put_json(Keyspace::TxStatus, key_hash(&tx.hash), &status)?;
                batch.put_json(
                    Keyspace::AddrStatus,
                    crate::store::key_address_hash(&tx.from, &tx.hash),
                    &status,
                )?;
            }
        }

        delegates.flush(&mut batch)?;

        if block.header.is_forging() {
            batch.put_json(Keyspace::ForgeAll, FORGE_ALL_KEY, &forging_sums)?;
        }

        let mut common_balance = self
            .store
            .get_json::<CommonBalance>(Keyspace::CommonBal, COMMON_BALANCE_KEY)?
            .unwrap_or_default();

        let empty_delta = BalanceInfo::default();
        let mut touched: std::collections::HashSet<Address> = balances.keys().copied().collect();
        touched.extend(delegate_balances.keys().copied());

        for address in &touched {
            let delta = balances.get(address).unwrap_or(&empty_delta);
            let mut stored = self
                .store
                .get_json::<BalanceInfo>(Keyspace::Balance, &key_address(address))?
                .unwrap_or_default();

            if stored.last_updated_height < block.height() {
                common_balance.money = common_balance
                    .money
                    .saturating_add(delta.received)
                    .saturating_sub(delta.spent)
                    .saturating_add(delta.forged);

                stored.merge_add(delta);
                if let Some((delegated_in, delegated_out)) = delegate_balances.get(address) {
                    stored.delegated_in = *delegated_in;
                    stored.delegated_out = *delegated_out;
                }
                stored.last_updated_height = block.height();
                if !stored.is_consistent() {
                    warn!("balance invariant violated for {address}: received < spent");
                }
                batch.put_json(Keyspace::Balance, key_address(address), &stored)?;
            }
        }
        batch.put_json(Keyspace::CommonBal, COMMON_BALANCE_KEY, &common_balance)?;

        batch.put_json(
            Keyspace::MainMeta,
            MAIN_BLOCK_KEY,
            &MainBlockInfo {
                height: block.height(),
                hash: *block.hash(),
                counter: block.height(),
            },
        )?;
        batch.put_json(
            Keyspace::BlockMeta,
            BLOCK_METADATA_KEY,
            &BlockMetadata {
                preferred_tip_hash: *block.hash(),
                preferred_parent_hash: block.header.parent_hash,
            },
        )?;

        self.store.commit(batch)?;

        let mut ring = self.last_100.lock().expect("mutex poisoned");
        for tx in &block.transactions {
            if ring.len() == LAST_N_TRANSACTIONS {
                ring.pop_front();
            }
            ring.push_back(tx.hash);
        }

        Ok(())
    }

    /// Loads `(delegated_in, delegated_out)` for `addr` into `overlay` from
    /// the stored balance on first touch, so in-block adjustments compose
    /// with whatever the address already had rather than starting at zero.
    fn delegate_balance_entry<'a>(
        &self,
        overlay: &'a mut HashMap<Address, (u64, u64)>,
        addr: Address,
    ) -> StoreResult<&'a mut (u64, u64)> {
        if !overlay.contains_key(&addr) {
            let stored = self
                .store
                .get_json::<BalanceInfo>(Keyspace::Balance, &key_address(&addr))?
                .unwrap_or_default();
            overlay.insert(addr, (stored.delegated_in, stored.delegated_out));
        }
        Ok(overlay.get_mut(&addr).unwrap())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_transaction(
        &self,
        tx: &TransactionInfo,
        delegates: &mut DelegateOverlay,
        balances: &mut HashMap<Address, BalanceInfo>,
        delegate_balances: &mut HashMap<Address, (u64, u64)>,
        forging_sums: &mut ForgingSums,
        seq: u64,
        batch: &mut WriteBatch,
    ) -> anyhow::Result<Option<TransactionStatus>> {
        let status = if let Some(record) = &tx.delegate {
            if record.is_delegate {
                delegates.push(
                    &*self.store,
                    tx.from,
                    tx.to,
                    DelegateFrame { value: record.value, tx_hash: tx.hash },
                )?;
                self.delegate_balance_entry(delegate_balances, tx.from)?.1 += record.value;
                self.delegate_balance_entry(delegate_balances, tx.to)?.0 += record.value;
                Some(TransactionStatus::Delegate)
            } else {
                let popped = delegates.pop(&*self.store, tx.from, tx.to)?;
                let value = popped.map(|f| f.value).unwrap_or(0);
                let from_entry = self.delegate_balance_entry(delegate_balances, tx.from)?;
                from_entry.1 = from_entry.1.saturating_sub(value);
                let to_entry = self.delegate_balance_entry(delegate_balances, tx.to)?;
                to_entry.0 = to_entry.0.saturating_sub(value);
                Some(TransactionStatus::UnDelegate { value, hash: tx.hash })
            }
        } else {
            None
        };

        batch.put_json(Keyspace::Tx, key_hash(&tx.hash), tx)?;
        batch.put_raw(Keyspace::AddrTxs, key_address_seq(&tx.from, seq), tx.file_offset.to_be_bytes().to_vec());
        if tx.to != tx.from {
            batch.put_raw(Keyspace::AddrTxs, key_address_seq(&tx.to, seq), tx.file_offset.to_be_bytes().to_vec());
        }

        let from_balance = balances.entry(tx.from).or_default();
        match tx.status {
            chain_common::IntentStatus::Success => {
                from_balance.spent = from_balance.spent.saturating_add(tx.value);
                from_balance.count_spent += 1;
            }
            chain_common::IntentStatus::NotSuccess | chain_common::IntentStatus::NodeTest => {}
            forging if forging.is_forging() => {
                forging_sums.add(tx.status, tx.value);
            }
            _ => {}
        }

        if tx.status == chain_common::IntentStatus::Success {
            let to_balance = balances.entry(tx.to).or_default();
            to_balance.received = to_balance.received.saturating_add(tx.value);
        } else if tx.status.is_forging() {
            let to_balance = balances.entry(tx.to).or_default();
            to_balance.forged = to_balance.forged.saturating_add(tx.value);
        }

        if let Some(op) = &tx.token {
            self.apply_token_operation(tx, op, balances, batch)?;
        }

        Ok(status)
    }

    fn apply_token_operation(
        &self,
        tx: &TransactionInfo,
        op: &TokenOperation,
        balances: &mut HashMap<Address, BalanceInfo>,
        batch: &mut WriteBatch,
    ) -> anyhow::Result<()> {
        let token_key = key_address(&tx.from);
        match op {
            TokenOperation::Create { symbol, name, token_type, decimals, emission, value, begin_distribution } => {
                let mut remaining = *value;
                for (addr, amount) in begin_distribution {
                    remaining = remaining.saturating_sub(*amount);
                    *balances.entry(*addr).or_default().tokens.entry(tx.from).or_insert(0) += amount;
                }
                *balances.entry(tx.from).or_default().tokens.entry(tx.from).or_insert(0) += remaining;

                let token = chain_common::Token {
                    address: tx.from,
                    symbol: symbol.clone(),
                    name: name.clone(),
                    token_type: *token_type,
                    decimals: *decimals,
                    emission: *emission,
                    owner: tx.from,
                    creation_tx: tx.hash,
                    begin_value: *value,
                    all_value: *value,
                };
                batch.put_json(Keyspace::Token, token_key, &token)?;
            }
            TokenOperation::ChangeOwner { new_owner } => {
                if let Some(mut token) = self.store.get_json::<chain_common::Token>(Keyspace::Token, &token_key)? {
                    token.owner = *new_owner;
                    batch.put_json(Keyspace::Token, token_key, &token)?;
                }
            }
            TokenOperation::ChangeEmission { emission } => {
                if let Some(mut token) = self.store.get_json::<chain_common::Token>(Keyspace::Token, &token_key)? {
                    token.emission = *emission;
                    batch.put_json(Keyspace::Token, token_key, &token)?;
                }
            }
            TokenOperation::AddTokens { target, amount } => {
                *balances.entry(*target).or_default().tokens.entry(tx.from).or_insert(0) += amount;
                if let Some(mut token) = self.store.get_json::<chain_common::Token>(Keyspace::Token, &token_key)? {
                    token.apply_add(*amount);
                    batch.put_json(Keyspace::Token, token_key, &token)?;
                }
            }
            TokenOperation::MoveTokens { amount } => {
                let entry = balances.entry(tx.to).or_default().tokens.entry(tx.from).or_insert(0);
                *entry += amount;
                let from_entry = balances.entry(tx.from).or_default().tokens.entry(tx.from).or_insert(0);
                *from_entry = from_entry.saturating_sub(*amount);
            }
            TokenOperation::BurnTokens { amount } => {
                let from_entry = balances.entry(tx.from).or_default().tokens.entry(tx.from).or_insert(0);
                *from_entry = from_entry.saturating_sub(*amount);
                let sink_entry = balances.entry(Address::ZERO).or_default().tokens.entry(tx.from).or_insert(0);
                *sink_entry += amount;
                if let Some(mut token) = self.store.get_json::<chain_common::Token>(Keyspace::Token, &token_key)? {
                    token.apply_burn(*amount);
                    batch.put_json(Keyspace::Token, token_key, &token)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RocksStorage;
    use chain_common::{BlockHeader, BlockKind, IntentStatus};

    fn store() -> (Arc<dyn Storage>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Storage> = Arc::new(RocksStorage::open(dir.path()).unwrap());
        (store, dir)
    }

    fn simple_tx(from: Address, to: Address, value: u64, status: IntentStatus, seq_hash: u8) -> TransactionInfo {
        TransactionInfo {
            hash: Hash::new([seq_hash; 32]),
            from,
            to,
            value,
            nonce: 0,
            data: Vec::new(),
            file_offset: 0,
            block_height: 0,
            status,
            delegate: None,
            token: None,
        }
    }

    fn block(height: u64, transactions: Vec<TransactionInfo>) -> WorkItem {
        let header = BlockHeader {
            hash: Hash::new([height as u8; 32]),
            parent_hash: Hash::new([(height - 1) as u8; 32]),
            height,
            size: 0,
            file_path: "blocks_0".into(),
            file_offset: 0,
            kind: BlockKind::Simple,
            producer_signature: None,
            producer_pubkey: None,
            producer_address: None,
            tx_count: transactions.len() as u32,
            signing_tx_count: 0,
        };
        WorkItem {
            block: Arc::new(BlockInfo { header, transactions }),
            raw_dump: Arc::new(Vec::new()),
        }
    }

    #[test]
    fn scenario_s1_transfer_updates_balances() {
        let (store, _dir) = store();
        let worker = IndexerWorker { store: store.clone(), last_100: Arc::new(Mutex::new(VecDeque::new())) };

        let genesis = Address::from_bytes([9u8; 25]);
        let alice = Address::from_bytes([1u8; 25]);
        let bob = Address::from_bytes([2u8; 25]);

        // seed Alice as the recipient of a transfer, so her own `spent` stays
        // untouched — a self-tx would both spend and receive for Alice.
        let seed = simple_tx(genesis, alice, 1000, IntentStatus::Success, 1);
        let transfer = simple_tx(alice, bob, 10, IntentStatus::Success, 2);

        worker.apply_block(&block(1, vec![seed])).unwrap();
        worker.apply_block(&block(2, vec![transfer])).unwrap();

        let alice_balance: BalanceInfo = store.get_json(Keyspace::Balance, &key_address(&alice)).unwrap().unwrap();
        let bob_balance: BalanceInfo = store.get_json(Keyspace::Balance, &key_address(&bob)).unwrap().unwrap();

        assert_eq!(alice_balance.spent, 10);
        assert_eq!(alice_balance.received, 1000);
        assert_eq!(bob_balance.received, 10);
    }

    #[test]
    fn scenario_s4_delegation_lifo() {
        let (store, _dir) = store();
        let worker = IndexerWorker { store: store.clone(), last_100: Arc::new(Mutex::new(VecDeque::new())) };

        let alice = Address::from_bytes([3u8; 25]);
        let bob = Address::from_bytes([4u8; 25]);

        let mut delegate_tx = simple_tx(alice, bob, 0, IntentStatus::Success, 10);
        delegate_tx.delegate = Some(chain_common::DelegateRecord { is_delegate: true, value: 50 });

        worker.apply_block(&block(10, vec![delegate_tx])).unwrap();

        let alice_after_delegate: BalanceInfo =
            store.get_json(Keyspace::Balance, &key_address(&alice)).unwrap().unwrap();
        assert_eq!(alice_after_delegate.delegated_out, 50);
        let bob_after_delegate: BalanceInfo =
            store.get_json(Keyspace::Balance, &key_address(&bob)).unwrap().unwrap();
        assert_eq!(bob_after_delegate.delegated_in, 50);

        let mut undelegate_tx = simple_tx(alice, bob, 0, IntentStatus::Success, 11);
        undelegate_tx.delegate = Some(chain_common::DelegateRecord { is_delegate: false, value: 0 });

        worker.apply_block(&block(12, vec![undelegate_tx.clone()])).unwrap();

        let status: TransactionStatus = store
            .get_json(Keyspace::TxStatus, &key_hash(&undelegate_tx.hash))
            .unwrap()
            .unwrap();
        match status {
            TransactionStatus::UnDelegate { value, .. } => assert_eq!(value, 50),
            other => panic!("expected UnDelegate, got {other:?}"),
        }

        // cross-block undelegate must restore delegated_out/delegated_in to
        // their pre-delegate (height-9) value, not just report the popped
        // value in the transaction status.
        let alice_after_undelegate: BalanceInfo =
            store.get_json(Keyspace::Balance, &key_address(&alice)).unwrap().unwrap();
        assert_eq!(alice_after_undelegate.delegated_out, 0);
        let bob_after_undelegate: BalanceInfo =
            store.get_json(Keyspace::Balance, &key_address(&bob)).unwrap().unwrap();
        assert_eq!(bob_after_undelegate.delegated_in, 0);
    }

    #[test]
    fn scenario_s6_token_create_distribution() {
        let (store, _dir) = store();
        let worker = IndexerWorker { store: store.clone(), last_100: Arc::new(Mutex::new(VecDeque::new())) };

        let creator = Address::from_bytes([5u8; 25]);
        let a = Address::from_bytes([6u8; 25]);
        let b = Address::from_bytes([7u8; 25]);

        let mut create_tx = simple_tx(creator, creator, 0, IntentStatus::Success, 20);
        create_tx.token = Some(chain_common::TokenOperation::Create {
            symbol: "TOK".to_string(),
            name: "Token".to_string(),
            token_type: chain_common::TokenType::Fungible,
            decimals: 0,
            emission: chain_common::EmissionPolicy::Fixed,
            value: 100,
            begin_distribution: vec![(a, 40), (b, 30)],
        });

        worker.apply_block(&block(20, vec![create_tx])).unwrap();

        let creator_balance: BalanceInfo =
            store.get_json(Keyspace::Balance, &key_address(&creator)).unwrap().unwrap();
        let a_balance: BalanceInfo = store.get_json(Keyspace::Balance, &key_address(&a)).unwrap().unwrap();
        let b_balance: BalanceInfo = store.get_json(Keyspace::Balance, &key_address(&b)).unwrap().unwrap();

        assert_eq!(*a_balance.tokens.get(&creator).unwrap(), 40);
        assert_eq!(*b_balance.tokens.get(&creator).unwrap(), 30);
        assert_eq!(*creator_balance.tokens.get(&creator).unwrap(), 30);

        let token: chain_common::Token =
            store.get_json(Keyspace::Token, &key_address(&creator)).unwrap().unwrap();
        assert_eq!(token.begin_value, 100);
        assert_eq!(token.all_value, 100);
    }

    #[test]
    fn watermark_gates_reapplication() {
        let (store, _dir) = store();
        assert_eq!(IndexerWorker::initial_watermark(&*store).unwrap(), 0);
    }

    use proptest::prelude::*;

    proptest! {
        // spec.md §8 property 5 ("delegate stack is LIFO"): for any sequence
        // of pushes followed by the same number of pops, the values must
        // come back in exactly reverse order, regardless of how `load`'s
        // cache interacts with `store.scan_prefix`.
        #[test]
        fn delegate_overlay_pops_in_reverse_push_order(values in prop::collection::vec(0u64..1_000_000, 1..20)) {
            let (store, _dir) = store();
            let from = Address::from_bytes([1u8; 25]);
            let to = Address::from_bytes([2u8; 25]);

            let mut overlay = DelegateOverlay::new();
            for &value in &values {
                overlay.push(&*store, from, to, DelegateFrame { value, tx_hash: Hash::ZERO }).unwrap();
            }

            let mut popped = Vec::new();
            for _ in 0..values.len() {
                popped.push(overlay.pop(&*store, from, to).unwrap().unwrap().value);
            }

            let mut expected = values.clone();
            expected.reverse();
            prop_assert_eq!(popped, expected);
            prop_assert!(overlay.pop(&*store, from, to).unwrap().is_none());
        }

        // Frames flushed to the store by one overlay must reload, in the
        // same order, into a fresh overlay — the LIFO invariant has to
        // survive a round-trip through `scan_prefix`, not just the
        // in-memory `Vec`.
        #[test]
        fn delegate_overlay_survives_flush_and_reload(values in prop::collection::vec(0u64..1_000_000, 1..20)) {
            let (store, _dir) = store();
            let from = Address::from_bytes([3u8; 25]);
            let to = Address::from_bytes([4u8; 25]);

            let mut overlay = DelegateOverlay::new();
            for &value in &values {
                overlay.push(&*store, from, to, DelegateFrame { value, tx_hash: Hash::ZERO }).unwrap();
            }
            let mut batch = WriteBatch::new();
            overlay.flush(&mut batch).unwrap();
            store.commit(batch).unwrap();

            let mut reloaded = DelegateOverlay::new();
            let mut popped = Vec::new();
            for _ in 0..values.len() {
                popped.push(reloaded.pop(&*store, from, to).unwrap().unwrap().value);
            }

            let mut expected = values.clone();
            expected.reverse();
            prop_assert_eq!(popped, expected);
        }
    }
}

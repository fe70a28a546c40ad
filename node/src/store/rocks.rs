//! RocksDB-backed `Storage` (spec.md §1: "the underlying ordered key-value
//! store, provided with atomic multi-key write batches, iterator scans with
//! key prefixes, and snapshot reads"). One column family per `Keyspace`.

use super::{Keyspace, Storage, StoreError, StoreResult, WriteBatch};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::path::Path;

pub struct RocksStorage {
    db: DB,
}

impl RocksStorage {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Keyspace::ALL
            .iter()
            .map(|ks| ColumnFamilyDescriptor::new(ks.name(), Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { db })
    }

    fn cf(&self, ks: Keyspace) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(ks.name())
            .ok_or_else(|| StoreError::Backend(format!("column family {} missing", ks.name())))
    }
}

impl Storage for RocksStorage {
    fn get_raw(&self, ks: Keyspace, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let cf = self.cf(ks)?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn scan_prefix(&self, ks: Keyspace, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(ks)?;
        let mut out = Vec::new();
        let iter = self.db.iterator_cf(cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut wb = rocksdb::WriteBatch::default();
        for (ks, key, value) in &batch.puts {
            let cf = self.cf(*ks)?;
            wb.put_cf(cf, key, value);
        }
        for (ks, key) in &batch.deletes {
            let cf = self.cf(*ks)?;
            wb.delete_cf(cf, key);
        }
        self.db.write(wb).map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_common::Address;

    fn temp_store() -> (RocksStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStorage::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (store, _dir) = temp_store();
        let mut batch = WriteBatch::new();
        batch.put_raw(Keyspace::Tx, b"abc".to_vec(), b"value".to_vec());
        store.commit(batch).unwrap();
        let got = store.get_raw(Keyspace::Tx, b"abc").unwrap();
        assert_eq!(got, Some(b"value".to_vec()));
    }

    #[test]
    fn scan_prefix_respects_boundary() {
        let (store, _dir) = temp_store();
        let addr_a = Address::from_bytes([1u8; 25]);
        let addr_b = Address::from_bytes([2u8; 25]);
        let mut batch = WriteBatch::new();
        batch.put_raw(Keyspace::AddrTxs, super::super::key_address_seq(&addr_a, 1), b"1".to_vec());
        batch.put_raw(Keyspace::AddrTxs, super::super::key_address_seq(&addr_a, 2), b"2".to_vec());
        batch.put_raw(Keyspace::AddrTxs, super::super::key_address_seq(&addr_b, 1), b"3".to_vec());
        store.commit(batch).unwrap();

        let scanned = store.scan_prefix(Keyspace::AddrTxs, &super::super::key_address(&addr_a)).unwrap();
        assert_eq!(scanned.len(), 2);
    }

    #[test]
    fn commit_is_atomic_across_keyspaces() {
        let (store, _dir) = temp_store();
        let mut batch = WriteBatch::new();
        batch.put_raw(Keyspace::Tx, b"k1".to_vec(), b"v1".to_vec());
        batch.put_raw(Keyspace::Balance, b"k2".to_vec(), b"v2".to_vec());
        store.commit(batch).unwrap();
        assert!(store.get_raw(Keyspace::Tx, b"k1").unwrap().is_some());
        assert!(store.get_raw(Keyspace::Balance, b"k2").unwrap().is_some());
    }
}

//! Fee-ordered pool of screened, pending transactions

use crate::crypto::{Address, Hash};
use crate::error::{LedgerError, Result};
use crate::transaction::{raw_tx_hash, Transaction};
use num::BigInt;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

pub const DEFAULT_MEMPOOL_CAPACITY: usize = 50_000;

#[derive(Debug, Clone)]
struct Entry {
    fee: BigInt,
    arrival: u64,
    hash: Hash,
    raw: Vec<u8>,
    senders: Vec<(Address, u64)>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fee == other.fee && self.arrival == other.arrival
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Higher fee first; on equal fees the earlier arrival wins.
    fn cmp(&self, other: &Self) -> Ordering {
        self.fee
            .cmp(&other.fee)
            .then_with(|| other.arrival.cmp(&self.arrival))
    }
}

#[derive(Debug, Clone, Copy)]
struct SenderQueue {
    last_sequence: u64,
    pending: usize,
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Entry>,
    hashes: HashSet<Hash>,
    senders: HashMap<Address, SenderQueue>,
    next_arrival: u64,
}

impl Inner {
    fn release(&mut self, entry: &Entry) {
        self.hashes.remove(&entry.hash);
        for (address, _) in &entry.senders {
            if let Some(queue) = self.senders.get_mut(address) {
                queue.pending = queue.pending.saturating_sub(1);
                if queue.pending == 0 {
                    self.senders.remove(address);
                }
            }
        }
    }
}

/// Every operation takes the one lock around the heap, so inserts may interleave
/// freely with a reap.
pub struct Mempool {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(DEFAULT_MEMPOOL_CAPACITY)
    }
}

impl Mempool {
    pub fn new(capacity: usize) -> Self {
        Mempool {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Queues a raw transaction. Its sequence for every signer must be above any
    /// sequence already queued for that signer.
    pub fn insert_transaction(&self, raw: &[u8]) -> Result<Hash> {
        let tx = Transaction::from_bytes(raw)?;
        if !tx.is_client_submittable() {
            return Err(LedgerError::UnauthorizedTx(format!(
                "{} transactions cannot be submitted",
                tx.kind()
            )));
        }

        let hash = raw_tx_hash(raw);
        let senders: Vec<(Address, u64)> = tx
            .signers()
            .into_iter()
            .map(|input| (input.address, input.sequence))
            .collect();

        let mut inner = self.inner.lock();
        if inner.hashes.contains(&hash) {
            return Err(LedgerError::InvalidTx(format!(
                "Transaction {} already in mempool",
                hex::encode(hash)
            )));
        }
        if inner.heap.len() >= self.capacity {
            return Err(LedgerError::MempoolFull);
        }
        for (address, sequence) in &senders {
            if let Some(queue) = inner.senders.get(address) {
                if *sequence <= queue.last_sequence {
                    return Err(LedgerError::InvalidSequence(format!(
                        "Sequence {} for {} is not above queued sequence {}",
                        sequence,
                        hex::encode(address),
                        queue.last_sequence
                    )));
                }
            }
        }

        for (address, sequence) in &senders {
            let queue = inner.senders.entry(*address).or_insert(SenderQueue {
                last_sequence: *sequence,
                pending: 0,
            });
            queue.last_sequence = *sequence;
            queue.pending += 1;
        }

        let arrival = inner.next_arrival;
        inner.next_arrival += 1;
        inner.hashes.insert(hash);
        inner.heap.push(Entry {
            fee: tx.fee().secondary,
            arrival,
            hash,
            raw: raw.to_vec(),
            senders,
        });
        debug!(tx = %hex::encode(hash), kind = tx.kind(), "Added transaction to mempool");
        Ok(hash)
    }

    pub fn size(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().hashes.contains(hash)
    }

    /// Removes and returns up to `max` raw transactions, highest fee first.
    pub fn reap(&self, max: usize) -> Vec<Vec<u8>> {
        let mut inner = self.inner.lock();
        let mut reaped = Vec::with_capacity(max.min(inner.heap.len()));
        while reaped.len() < max {
            let Some(entry) = inner.heap.pop() else {
                break;
            };
            inner.release(&entry);
            reaped.push(entry.raw);
        }
        reaped
    }

    /// Drops transactions that were included in a committed block.
    pub fn remove_committed(&self, hashes: &[Hash]) {
        let committed: HashSet<&Hash> = hashes.iter().collect();
        let mut inner = self.inner.lock();
        if !inner.hashes.iter().any(|h| committed.contains(h)) {
            return;
        }

        let (removed, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut inner.heap)
            .into_vec()
            .into_iter()
            .partition(|e| committed.contains(&e.hash));
        inner.heap = BinaryHeap::from(kept);
        for entry in &removed {
            inner.release(entry);
        }
        debug!(removed = removed.len(), "Pruned committed transactions from mempool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coins::Coins;
    use crate::crypto::KeyPair;
    use crate::transaction::{CoinbaseTx, SendTx, TxInput, TxOutput};
    use std::sync::Arc;
    use std::thread;

    fn raw_send(key: &KeyPair, sequence: u64, fee: u64) -> Vec<u8> {
        let mut tx = Transaction::Send(SendTx {
            fee: Coins::secondary_only(fee),
            inputs: vec![TxInput::new(key.address(), Coins::new(10, fee), sequence)],
            outputs: vec![TxOutput::new([9; 32], Coins::principal_only(10))],
        });
        tx.sign_with("mempool_test", key).unwrap();
        tx.to_bytes().unwrap()
    }

    fn fee_of(raw: &[u8]) -> BigInt {
        Transaction::from_bytes(raw).unwrap().fee().secondary
    }

    #[test]
    fn test_reap_in_fee_order() {
        let pool = Mempool::default();
        let fees = [3_000u64, 9_000, 1_000, 7_000, 5_000];
        for fee in fees {
            pool.insert_transaction(&raw_send(&KeyPair::generate(), 1, fee)).unwrap();
        }

        let first = pool.reap(2);
        assert_eq!(pool.size(), 3);
        let rest = pool.reap(10);
        assert_eq!(pool.size(), 0);

        let reaped: Vec<BigInt> = first.iter().chain(rest.iter()).map(|r| fee_of(r)).collect();
        let expected: Vec<BigInt> = [9_000, 7_000, 5_000, 3_000, 1_000]
            .into_iter()
            .map(BigInt::from)
            .collect();
        assert_eq!(reaped, expected);
    }

    #[test]
    fn test_equal_fees_reap_fifo() {
        let pool = Mempool::default();
        let raws: Vec<Vec<u8>> = (0..5).map(|_| raw_send(&KeyPair::generate(), 1, 2_000)).collect();
        for raw in &raws {
            pool.insert_transaction(raw).unwrap();
        }
        assert_eq!(pool.reap(5), raws);
    }

    #[test]
    fn test_rejects_duplicates_coinbase_and_stale_sequence() {
        let pool = Mempool::default();
        let key = KeyPair::generate();
        let raw = raw_send(&key, 2, 1_000);
        pool.insert_transaction(&raw).unwrap();

        assert!(matches!(pool.insert_transaction(&raw), Err(LedgerError::InvalidTx(_))));
        assert!(matches!(
            pool.insert_transaction(&raw_send(&key, 2, 5_000)),
            Err(LedgerError::InvalidSequence(_))
        ));
        assert!(matches!(
            pool.insert_transaction(&[0xff, 0x01]),
            Err(LedgerError::InvalidTx(_))
        ));

        let coinbase = Transaction::Coinbase(CoinbaseTx {
            proposer: TxInput::new(key.address(), Coins::zero(), 0),
            outputs: vec![],
            block_height: 1,
        });
        assert!(matches!(
            pool.insert_transaction(&coinbase.to_bytes().unwrap()),
            Err(LedgerError::UnauthorizedTx(_))
        ));

        pool.insert_transaction(&raw_send(&key, 3, 1_000)).unwrap();
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_sender_released_after_reap() {
        let pool = Mempool::default();
        let key = KeyPair::generate();
        pool.insert_transaction(&raw_send(&key, 5, 1_000)).unwrap();
        pool.reap(1);
        pool.insert_transaction(&raw_send(&key, 1, 1_000)).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_capacity() {
        let pool = Mempool::new(2);
        pool.insert_transaction(&raw_send(&KeyPair::generate(), 1, 1_000)).unwrap();
        pool.insert_transaction(&raw_send(&KeyPair::generate(), 1, 1_000)).unwrap();
        assert_eq!(
            pool.insert_transaction(&raw_send(&KeyPair::generate(), 1, 1_000)),
            Err(LedgerError::MempoolFull)
        );
    }

    #[test]
    fn test_remove_committed() {
        let pool = Mempool::default();
        let a = raw_send(&KeyPair::generate(), 1, 1_000);
        let b = raw_send(&KeyPair::generate(), 1, 2_000);
        let hash_a = pool.insert_transaction(&a).unwrap();
        pool.insert_transaction(&b).unwrap();

        pool.remove_committed(&[hash_a, [0; 32]]);
        assert_eq!(pool.size(), 1);
        assert!(!pool.contains(&hash_a));
        assert_eq!(pool.reap(5), vec![b]);
    }

    #[test]
    fn test_concurrent_insert_and_reap() {
        let pool = Arc::new(Mempool::default());
        let raws: Vec<Vec<u8>> = (0..64)
            .map(|i| raw_send(&KeyPair::generate(), 1, 1_000 + i))
            .collect();

        let handles: Vec<_> = raws
            .chunks(16)
            .map(|chunk| {
                let pool = Arc::clone(&pool);
                let chunk = chunk.to_vec();
                thread::spawn(move || {
                    for raw in chunk {
                        pool.insert_transaction(&raw).unwrap();
                    }
                })
            })
            .collect();
        let reaper = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.reap(10).len())
        };

        for handle in handles {
            handle.join().unwrap();
        }
        let reaped = reaper.join().unwrap();
        assert_eq!(pool.size(), 64 - reaped);

        let rest: Vec<BigInt> = pool.reap(64).iter().map(|r| fee_of(r)).collect();
        assert!(rest.windows(2).all(|w| w[0] > w[1]));
    }
}

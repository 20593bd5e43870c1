//! The user-operation mempool: the four lifecycle sets (outstanding,
//! available-outstanding, processing, submitted) and the reconciliation
//! algorithm that rebuilds available-outstanding against on-chain nonce
//! state.
//!
//! Storage is hash-indexed (`HashMap<B256, _>` plus an insertion-ordered
//! `Vec<B256>` per set) so lookups, inserts, and removes are all O(1).

pub mod types;

pub use types::{
    CompressedUserOperation, MempoolUserOperation, SubmittedUserOperation, TransactionInfo,
    UserOperation, UserOperationInfo,
};

use alloy_primitives::{Address, B256, U256};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::chain::{ChainError, EvmRpc};

/// Identifies one of the mempool's four lifecycle sets, used by
/// [`Mempool::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MempoolSet {
    Outstanding,
    AvailableOutstanding,
    Processing,
    Submitted,
}

#[derive(Default)]
struct IndexedSet<V> {
    order: Vec<B256>,
    by_hash: HashMap<B256, V>,
}

impl<V> IndexedSet<V> {
    fn insert(&mut self, hash: B256, value: V) {
        if !self.by_hash.contains_key(&hash) {
            self.order.push(hash);
        }
        self.by_hash.insert(hash, value);
    }

    /// Removes `hash`. A missing hash is logged by the caller, not treated
    /// as an error, so this returns the removed value rather than a result.
    fn remove(&mut self, hash: &B256) -> Option<V> {
        let removed = self.by_hash.remove(hash);
        if removed.is_some() {
            self.order.retain(|h| h != hash);
        }
        removed
    }

    fn dump(&self) -> Vec<&V> {
        self.order.iter().filter_map(|h| self.by_hash.get(h)).collect()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.by_hash.clear();
    }
}

/// The mempool for one `(entryPoint, chain)` pair.
#[derive(Default)]
pub struct Mempool {
    outstanding: IndexedSet<UserOperationInfo>,
    /// Purely a derived view: never populated by [`Self::add_outstanding`],
    /// only ever rebuilt wholesale by [`Self::reconcile`].
    available_outstanding: IndexedSet<UserOperationInfo>,
    processing: IndexedSet<UserOperationInfo>,
    submitted: IndexedSet<SubmittedUserOperation>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation to `outstanding`. Does not touch
    /// `available_outstanding`: that set only reflects the outcome of the
    /// next [`Self::reconcile`] call.
    pub fn add_outstanding(&mut self, info: UserOperationInfo) {
        self.outstanding.insert(info.uo_hash, info);
    }

    pub fn remove_outstanding(&mut self, hash: &B256) {
        if self.outstanding.remove(hash).is_none() {
            warn!(%hash, "remove_outstanding: hash not found");
        }
        self.available_outstanding.remove(hash);
    }

    pub fn dump_outstanding(&self) -> Vec<&UserOperationInfo> {
        self.outstanding.dump()
    }

    pub fn dump_available_outstanding(&self) -> Vec<&UserOperationInfo> {
        self.available_outstanding.dump()
    }

    pub fn add_processing(&mut self, info: UserOperationInfo) {
        self.available_outstanding.remove(&info.uo_hash);
        self.processing.insert(info.uo_hash, info);
    }

    pub fn remove_processing(&mut self, hash: &B256) {
        if self.processing.remove(hash).is_none() {
            warn!(%hash, "remove_processing: hash not found");
        }
    }

    pub fn dump_processing(&self) -> Vec<&UserOperationInfo> {
        self.processing.dump()
    }

    pub fn add_submitted(&mut self, submitted: SubmittedUserOperation) {
        let hash = submitted.info.uo_hash;
        self.processing.remove(&hash);
        self.submitted.insert(hash, submitted);
    }

    pub fn remove_submitted(&mut self, hash: &B256) {
        if self.submitted.remove(hash).is_none() {
            warn!(%hash, "remove_submitted: hash not found");
        }
    }

    pub fn dump_submitted(&self) -> Vec<&SubmittedUserOperation> {
        self.submitted.dump()
    }

    /// Clears one named set. `MempoolSet` has no "unknown set" variant, so
    /// this always succeeds.
    pub fn clear(&mut self, set: MempoolSet) {
        match set {
            MempoolSet::Outstanding => self.outstanding.clear(),
            MempoolSet::AvailableOutstanding => self.available_outstanding.clear(),
            MempoolSet::Processing => self.processing.clear(),
            MempoolSet::Submitted => self.submitted.clear(),
        }
    }

    /// Rebuilds `available_outstanding` from scratch as the exact-match set
    /// `{uo ∈ outstanding : onchain nonceValue == uo.nonceValue}`.
    /// `outstanding` and `processing` are never touched here: reconciliation
    /// only ever changes which outstanding operations are currently
    /// available to bundle, it never retires them.
    ///
    /// A whole-batch RPC failure is surfaced as `Err` and leaves
    /// `available_outstanding` untouched. A single `(sender, key)` pair whose
    /// oracle call failed (reported as `None` in that slot) carries over
    /// whatever membership those hashes had before this call, rather than
    /// dropping them.
    pub async fn reconcile(&mut self, entry_point: Address, rpc: &impl EvmRpc) -> Result<(), ChainError> {
        let mut by_sender_key: HashMap<(Address, U256), Vec<B256>> = HashMap::new();
        for info in self.outstanding.dump() {
            let uo = info.uo.as_uo();
            by_sender_key
                .entry((uo.sender, uo.nonce_key()))
                .or_default()
                .push(info.uo_hash);
        }

        let pairs: Vec<(Address, U256)> = by_sender_key.keys().copied().collect();
        if pairs.is_empty() {
            self.available_outstanding.clear();
            return Ok(());
        }

        let onchain_nonces = rpc.get_nonce_multicall(entry_point, &pairs).await?;
        let prior_available: HashSet<B256> = self.available_outstanding.order.iter().copied().collect();

        let mut next_available: IndexedSet<UserOperationInfo> = IndexedSet::default();
        for ((sender, key), onchain_nonce) in pairs.into_iter().zip(onchain_nonces) {
            let hashes = &by_sender_key[&(sender, key)];
            match onchain_nonce {
                Some(nonce) => {
                    let onchain_value = (nonce & U256::from(u64::MAX)).to::<u64>();
                    for hash in hashes {
                        if let Some(info) = self.outstanding.by_hash.get(hash) {
                            if info.uo.as_uo().nonce_value() == onchain_value {
                                next_available.insert(*hash, info.clone());
                            }
                        }
                    }
                }
                None => {
                    for hash in hashes {
                        if prior_available.contains(hash) {
                            if let Some(info) = self.outstanding.by_hash.get(hash) {
                                next_available.insert(*hash, info.clone());
                            }
                        }
                    }
                }
            }
        }

        self.available_outstanding = next_available;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::mock::MockEvmRpc;
    use alloy_primitives::keccak256;
    use std::time::Instant;

    fn info_with_nonce(value: u64) -> UserOperationInfo {
        let uo = UserOperation {
            sender: Address::repeat_byte(9),
            nonce: U256::from(value),
            init_code: alloy_primitives::Bytes::new(),
            call_data: alloy_primitives::Bytes::new(),
            call_gas_limit: U256::from(1u64),
            verification_gas_limit: U256::from(1u64),
            pre_verification_gas: U256::from(1u64),
            max_fee_per_gas: U256::from(1u64),
            max_priority_fee_per_gas: U256::from(1u64),
            paymaster_and_data: alloy_primitives::Bytes::new(),
            signature: alloy_primitives::Bytes::new(),
        };
        let uo_hash = keccak256(value.to_be_bytes());
        let now = Instant::now();
        UserOperationInfo {
            uo: MempoolUserOperation::Uo(uo),
            uo_hash,
            entry_point: Address::repeat_byte(3),
            first_submitted: now,
            last_replaced: now,
            referenced_contracts: None,
        }
    }

    #[test]
    fn add_outstanding_does_not_populate_available_outstanding() {
        let mut mempool = Mempool::new();
        mempool.add_outstanding(info_with_nonce(1));
        assert_eq!(mempool.dump_outstanding().len(), 1);
        assert_eq!(mempool.dump_available_outstanding().len(), 0);
    }

    #[test]
    fn add_processing_removes_from_available_but_not_outstanding() {
        let mut mempool = Mempool::new();
        let info = info_with_nonce(1);
        let hash = info.uo_hash;
        mempool.add_outstanding(info.clone());
        mempool.available_outstanding.insert(hash, info.clone());
        mempool.add_processing(info);
        assert_eq!(mempool.dump_outstanding().len(), 1);
        assert_eq!(mempool.dump_available_outstanding().len(), 0);
        assert_eq!(mempool.dump_processing().len(), 1);
    }

    #[test]
    fn remove_unknown_hash_is_not_fatal() {
        let mut mempool = Mempool::new();
        mempool.remove_outstanding(&B256::repeat_byte(0xEE));
    }

    #[test]
    fn clear_outstanding_does_not_clear_available_outstanding() {
        let mut mempool = Mempool::new();
        let info = info_with_nonce(1);
        let hash = info.uo_hash;
        mempool.add_outstanding(info.clone());
        mempool.available_outstanding.insert(hash, info);
        mempool.clear(MempoolSet::Outstanding);
        assert_eq!(mempool.dump_outstanding().len(), 0);
        assert_eq!(mempool.dump_available_outstanding().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_marks_exact_nonce_match_as_available() {
        let mut mempool = Mempool::new();
        let info = info_with_nonce(5);
        let hash = info.uo_hash;
        mempool.add_outstanding(info);

        let rpc = MockEvmRpc::default();
        *rpc.nonces.lock().unwrap() = vec![Some(U256::from(5u64))];

        mempool.reconcile(Address::repeat_byte(3), &rpc).await.unwrap();
        assert_eq!(mempool.dump_outstanding().len(), 1);
        let available = mempool.dump_available_outstanding();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].uo_hash, hash);
    }

    #[tokio::test]
    async fn reconcile_excludes_operation_not_at_onchain_nonce() {
        let mut mempool = Mempool::new();
        let info = info_with_nonce(10);
        mempool.add_outstanding(info);

        let rpc = MockEvmRpc::default();
        *rpc.nonces.lock().unwrap() = vec![Some(U256::from(0u64))];

        mempool.reconcile(Address::repeat_byte(3), &rpc).await.unwrap();
        assert_eq!(mempool.dump_outstanding().len(), 1);
        assert!(mempool.dump_available_outstanding().is_empty());
    }

    #[tokio::test]
    async fn reconcile_never_removes_from_outstanding_or_processing() {
        let mut mempool = Mempool::new();
        let info = info_with_nonce(10);
        mempool.add_outstanding(info);

        let rpc = MockEvmRpc::default();
        *rpc.nonces.lock().unwrap() = vec![Some(U256::from(999u64))];

        mempool.reconcile(Address::repeat_byte(3), &rpc).await.unwrap();
        assert_eq!(mempool.dump_outstanding().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_preserves_prior_availability_when_oracle_call_fails() {
        let mut mempool = Mempool::new();
        let info = info_with_nonce(5);
        let hash = info.uo_hash;
        mempool.add_outstanding(info.clone());
        mempool.available_outstanding.insert(hash, info);

        let rpc = MockEvmRpc::default();
        *rpc.nonces.lock().unwrap() = vec![None];

        mempool.reconcile(Address::repeat_byte(3), &rpc).await.unwrap();
        let available = mempool.dump_available_outstanding();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].uo_hash, hash);
    }

    #[tokio::test]
    async fn reconcile_drops_previously_unavailable_hash_when_oracle_call_fails() {
        let mut mempool = Mempool::new();
        let info = info_with_nonce(5);
        mempool.add_outstanding(info);

        let rpc = MockEvmRpc::default();
        *rpc.nonces.lock().unwrap() = vec![None];

        mempool.reconcile(Address::repeat_byte(3), &rpc).await.unwrap();
        assert!(mempool.dump_available_outstanding().is_empty());
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let mut mempool = Mempool::new();
        let info = info_with_nonce(5);
        mempool.add_outstanding(info);

        let rpc = MockEvmRpc::default();
        *rpc.nonces.lock().unwrap() = vec![Some(U256::from(5u64))];

        mempool.reconcile(Address::repeat_byte(3), &rpc).await.unwrap();
        let first = mempool.dump_available_outstanding().len();
        mempool.reconcile(Address::repeat_byte(3), &rpc).await.unwrap();
        let second = mempool.dump_available_outstanding().len();
        assert_eq!(first, second);
    }
}

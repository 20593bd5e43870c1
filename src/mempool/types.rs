//! User-operation and mempool entry types.
//!
//! `UserOperation`'s packed nonce splits a 256-bit value into a 192-bit key
//! and a 64-bit sequence value, and its `userOpHash` is computed as
//! `keccak256(abi.encode(opHash, entryPoint, chainId))`, matching the
//! EntryPoint v0.6 ABI.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use std::collections::HashSet;
use std::time::Instant;

/// A single ERC-4337 user operation (EntryPoint v0.6 ABI shape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// The 192-bit key half of the packed nonce.
    pub fn nonce_key(&self) -> U256 {
        self.nonce >> 64
    }

    /// The 64-bit sequence-value half of the packed nonce.
    pub fn nonce_value(&self) -> u64 {
        (self.nonce & U256::from(u64::MAX)).to::<u64>()
    }

    fn pack_for_hash(&self) -> Vec<u8> {
        (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode()
    }

    /// `keccak256(abi.encode(opHash, entryPoint, chainId))`, the canonical
    /// EntryPoint v0.6 `userOpHash`.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let op_hash = keccak256(self.pack_for_hash());
        keccak256((op_hash, entry_point, U256::from(chain_id)).abi_encode())
    }
}

/// A compressed user operation, as submitted through a compression extension
/// to the standard EntryPoint ABI. The inflated form is retained alongside
/// the raw bytes so validation and bundling can operate on a single
/// `UserOperation` view regardless of wire representation.
#[derive(Debug, Clone)]
pub struct CompressedUserOperation {
    pub compressed: Bytes,
    pub inflated: UserOperation,
}

/// Either representation a user operation can arrive in. Bundling logic only
/// ever needs [`Self::as_uo`]'s projection; the original wire bytes are kept
/// for resubmission.
#[derive(Debug, Clone)]
pub enum MempoolUserOperation {
    Uo(UserOperation),
    Compressed(CompressedUserOperation),
}

impl MempoolUserOperation {
    pub fn as_uo(&self) -> &UserOperation {
        match self {
            MempoolUserOperation::Uo(uo) => uo,
            MempoolUserOperation::Compressed(c) => &c.inflated,
        }
    }
}

/// The storage slots and contract code a user operation's validation touched,
/// used to decide whether a later resubmission must be revalidated because
/// one of them changed on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedContracts {
    pub addresses: HashSet<Address>,
    pub code_hash: B256,
}

/// A user operation as tracked inside the mempool: the operation itself,
/// its hash, the EntryPoint it targets, and the timestamps of its first
/// submission and its most recent fee-bump replacement.
#[derive(Debug, Clone)]
pub struct UserOperationInfo {
    pub uo: MempoolUserOperation,
    pub uo_hash: B256,
    pub entry_point: Address,
    pub first_submitted: Instant,
    pub last_replaced: Instant,
    pub referenced_contracts: Option<ReferencedContracts>,
}

/// The executor-side transaction an operation (or bundle of operations) was
/// included in, tracked while awaiting confirmation. `prior_transaction_hashes`
/// accumulates one entry per fee-bump replacement so a later receipt lookup
/// can check every hash the bundle has ever been broadcast under.
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub transaction_hash: B256,
    pub prior_transaction_hashes: Vec<B256>,
    pub executor: Address,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub first_submitted: Instant,
    pub last_replaced: Instant,
    /// Number of blocks this transaction was eligible for inclusion (its fee
    /// cleared the base fee) without actually landing, used to decide when a
    /// replacement bump is due.
    pub times_potentially_included: u32,
}

/// A user operation whose bundle transaction has been broadcast, awaiting
/// confirmation or reconciliation.
#[derive(Debug, Clone)]
pub struct SubmittedUserOperation {
    pub info: UserOperationInfo,
    pub transaction: TransactionInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_uo(nonce: U256) -> UserOperation {
        UserOperation {
            sender: Address::repeat_byte(1),
            nonce,
            init_code: Bytes::new(),
            call_data: Bytes::from_static(b"call"),
            call_gas_limit: U256::from(100_000u64),
            verification_gas_limit: U256::from(100_000u64),
            pre_verification_gas: U256::from(21_000u64),
            max_fee_per_gas: U256::from(1_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000u64),
            paymaster_and_data: Bytes::new(),
            signature: Bytes::from_static(b"sig"),
        }
    }

    #[test]
    fn nonce_splits_into_key_and_value() {
        let key = U256::from(7u64) << 64;
        let nonce = key | U256::from(42u64);
        let uo = sample_uo(nonce);
        assert_eq!(uo.nonce_key(), U256::from(7u64));
        assert_eq!(uo.nonce_value(), 42);
    }

    #[test]
    fn hash_is_deterministic_and_chain_bound() {
        let uo = sample_uo(U256::from(1u64));
        let entry_point = Address::repeat_byte(2);
        let h1 = uo.hash(entry_point, 1);
        let h2 = uo.hash(entry_point, 1);
        let h3 = uo.hash(entry_point, 2);
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }
}

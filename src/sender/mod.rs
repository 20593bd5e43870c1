//! The sender manager: arbitrates exclusive access to the bundler's pool of
//! executor wallets.
//!
//! Two interchangeable pool backends are supported: an in-process
//! semaphore-gated deque for a single bundler instance, and a Redis-backed
//! FIFO for a fleet of instances sharing one set of executor wallets. A miss
//! against the shared pool retries with capped exponential backoff plus
//! jitter rather than a fixed poll interval.

pub mod backend;
pub mod error;

pub use backend::{LocalWalletBackend, RedisWalletBackend, SharedWalletBackend};
pub use error::SenderError;

use alloy_primitives::Address;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, trace};

/// A leased wallet. Dropping this without calling [`SenderManager::push_wallet`]
/// leaves the wallet out of circulation until the process restarts — callers
/// are expected to always return it, on both the success and failure paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasedWallet(pub Address);

const SHARED_QUEUE_KEY: &str = "sender-manager";
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Exponential backoff with up to 20% jitter, so many bundler instances
/// racing the same shared queue don't retry in lockstep.
fn backoff_for_attempt(attempt: u32) -> Duration {
    let shift = attempt.min(12);
    let base = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let capped = base.min(MAX_BACKOFF.as_millis() as u64);
    let jitter = rand::random::<f64>() * 0.2 * capped as f64;
    Duration::from_millis(capped + jitter as u64)
}

enum Pool {
    /// In-process pool: a LIFO deque guarded by a semaphore sized to the
    /// wallet count, so a lease beyond capacity awaits a release instead of
    /// erroring immediately.
    Local {
        available: Mutex<VecDeque<Address>>,
        semaphore: Arc<Semaphore>,
    },
    /// Cross-process pool: a Redis-backed FIFO shared by every bundler
    /// instance pointed at the same `redisQueueEndpoint`.
    Shared(Arc<dyn SharedWalletBackend>),
}

/// Arbitrates exclusive leases over the configured executor wallets.
pub struct SenderManager {
    all_wallets: Vec<Address>,
    pool: Pool,
    last_used: DashMap<Address, Instant>,
}

impl SenderManager {
    /// Builds a manager backed by the local in-process pool.
    pub fn new_local(wallets: Vec<Address>) -> Self {
        let semaphore = Arc::new(Semaphore::new(wallets.len().max(1)));
        let available = Mutex::new(wallets.iter().copied().collect());
        Self {
            all_wallets: wallets,
            pool: Pool::Local { available, semaphore },
            last_used: DashMap::new(),
        }
    }

    /// Builds a manager backed by a shared queue. The wallet list is still
    /// needed for [`Self::get_all_wallets`]; the queue itself is seeded by
    /// the caller (typically once, at fleet bootstrap) via [`Self::seed_shared_queue`].
    pub fn new_shared(wallets: Vec<Address>, backend: Arc<dyn SharedWalletBackend>) -> Self {
        Self {
            all_wallets: wallets,
            pool: Pool::Shared(backend),
            last_used: DashMap::new(),
        }
    }

    /// Seeds the shared queue with every configured wallet, but only if it is
    /// currently empty, so restarting one instance in a fleet doesn't
    /// duplicate wallets already queued by another.
    pub async fn seed_shared_queue(&self) -> Result<(), SenderError> {
        if let Pool::Shared(backend) = &self.pool {
            if backend.llen(SHARED_QUEUE_KEY).await? == 0 {
                for wallet in &self.all_wallets {
                    backend.lpush(SHARED_QUEUE_KEY, &wallet.to_string()).await?;
                }
            }
        }
        Ok(())
    }

    /// All wallets configured for this manager, leased or not.
    pub fn get_all_wallets(&self) -> &[Address] {
        &self.all_wallets
    }

    /// Leases an available wallet, returning [`SenderError::NoWalletsConfigured`]
    /// if none were ever configured.
    pub async fn get_wallet(&self) -> Result<LeasedWallet, SenderError> {
        if self.all_wallets.is_empty() {
            return Err(SenderError::NoWalletsConfigured);
        }
        match &self.pool {
            Pool::Local { available, semaphore } => {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                let mut guard = available.lock().await;
                match guard.pop_back() {
                    Some(wallet) => {
                        permit.forget();
                        trace!(%wallet, "leased wallet from local pool");
                        Ok(LeasedWallet(wallet))
                    }
                    None => Err(SenderError::WalletPoolExhausted),
                }
            }
            Pool::Shared(backend) => {
                let mut attempt = 0u32;
                loop {
                    if let Some(raw) = backend.rpop(SHARED_QUEUE_KEY).await? {
                        let wallet: Address = raw.parse().expect("shared queue holds only addresses we pushed");
                        trace!(%wallet, "leased wallet from shared pool");
                        return Ok(LeasedWallet(wallet));
                    }
                    let delay = backoff_for_attempt(attempt);
                    debug!(attempt, ?delay, "shared wallet pool empty, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Returns a previously-leased wallet to the pool.
    pub async fn push_wallet(&self, wallet: LeasedWallet) -> Result<(), SenderError> {
        self.last_used.insert(wallet.0, Instant::now());
        match &self.pool {
            Pool::Local { available, semaphore } => {
                available.lock().await.push_back(wallet.0);
                semaphore.add_permits(1);
            }
            Pool::Shared(backend) => {
                backend.lpush(SHARED_QUEUE_KEY, &wallet.0.to_string()).await?;
            }
        }
        Ok(())
    }

    /// Number of wallets currently available to lease.
    pub async fn available_count(&self) -> usize {
        match &self.pool {
            Pool::Local { available, .. } => available.lock().await.len(),
            Pool::Shared(backend) => backend.llen(SHARED_QUEUE_KEY).await.unwrap_or(0),
        }
    }

    pub fn last_used(&self, wallet: Address) -> Option<Instant> {
        self.last_used.get(&wallet).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[tokio::test]
    async fn local_pool_leases_and_returns_lifo() {
        let manager = SenderManager::new_local(vec![addr(1), addr(2)]);
        let first = manager.get_wallet().await.unwrap();
        let second = manager.get_wallet().await.unwrap();
        assert_eq!(manager.available_count().await, 0);
        manager.push_wallet(first).await.unwrap();
        manager.push_wallet(second).await.unwrap();
        assert_eq!(manager.available_count().await, 2);
    }

    #[tokio::test]
    async fn empty_local_pool_errors_without_blocking() {
        let manager = SenderManager::new_local(vec![]);
        assert!(matches!(manager.get_wallet().await, Err(SenderError::NoWalletsConfigured)));
    }

    #[tokio::test]
    async fn shared_pool_is_fifo_across_leases() {
        let backend: Arc<dyn SharedWalletBackend> = Arc::new(LocalWalletBackend::default());
        let manager = SenderManager::new_shared(vec![addr(1), addr(2)], backend);
        manager.seed_shared_queue().await.unwrap();
        let first = manager.get_wallet().await.unwrap();
        assert_eq!(first.0, addr(1));
        manager.push_wallet(first).await.unwrap();
        let second = manager.get_wallet().await.unwrap();
        assert_eq!(second.0, addr(2));
    }

    #[tokio::test]
    async fn seed_shared_queue_is_a_no_op_when_already_seeded() {
        let backend: Arc<dyn SharedWalletBackend> = Arc::new(LocalWalletBackend::default());
        backend.lpush(SHARED_QUEUE_KEY, &addr(9).to_string()).await.unwrap();
        let manager = SenderManager::new_shared(vec![addr(1), addr(2)], backend);
        manager.seed_shared_queue().await.unwrap();
        assert_eq!(manager.available_count().await, 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let first = backoff_for_attempt(0);
        assert!(first >= Duration::from_millis(1) && first <= Duration::from_millis(2));
        let capped = backoff_for_attempt(20);
        assert!(capped >= MAX_BACKOFF && capped <= MAX_BACKOFF * 12 / 10);
    }
}

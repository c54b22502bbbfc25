//! Proof-of-work search and validation.

use log::debug;
use sha2::{Digest, Sha256};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::block::{Block, NONCE_OFFSET};

/// Leading-zero hex target for block hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: u32,
}

impl ProofOfWork {
    pub fn new(difficulty: u32) -> Self {
        Self { difficulty }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Hex SHA-256 of `payload`.
    pub fn digest(payload: &[u8]) -> String {
        hex::encode(Sha256::digest(payload))
    }

    /// The first `difficulty` hex characters are all `'0'`.
    pub fn meets_target(&self, hex_hash: &str) -> bool {
        let needed = self.difficulty as usize;
        hex_hash.len() >= needed && hex_hash.bytes().take(needed).all(|c| c == b'0')
    }

    /// Brute-force the nonce for `block`, starting from its current nonce.
    /// Returns the winning nonce and hash without touching the block.
    ///
    /// The payload is encoded once; only the nonce bytes change per attempt.
    pub fn mine(&self, block: &Block) -> (u32, String) {
        let mut payload = block.hashable_payload();
        let mut nonce = block.nonce;
        let mut attempts: u64 = 0;
        loop {
            payload[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
            let hash = Self::digest(&payload);
            attempts += 1;
            if self.meets_target(&hash) {
                debug!(
                    "mined height {} after {} attempts (nonce={}, hash={})",
                    block.height, attempts, nonce, hash
                );
                return (nonce, hash);
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Recompute the payload hash and check it against the stored hash and
    /// the target.
    pub fn validate(&self, block: &Block) -> bool {
        let expected = Self::digest(&block.hashable_payload());
        block.hash == expected && self.meets_target(&expected)
    }
}

/// Mining running on its own worker thread.
///
/// The search itself has no cancellation point; giving up on a task only
/// abandons its result, and the worker finishes in the background.
pub struct MiningTask {
    rx: mpsc::Receiver<Block>,
}

impl MiningTask {
    pub fn spawn(mut block: Block, pow: ProofOfWork) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            block.mine(&pow);
            // receiver may have been dropped by an impatient caller
            let _ = tx.send(block);
        });
        Self { rx }
    }

    /// Wait up to `timeout` for the mined block.
    pub fn wait(self, timeout: Duration) -> Option<Block> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    #[test]
    fn target_counts_leading_hex_zeros() {
        let pow = ProofOfWork::new(4);
        assert!(pow.meets_target("0000abcd"));
        assert!(!pow.meets_target("000fabcd"));
        assert!(!pow.meets_target("000"));
        assert!(ProofOfWork::new(0).meets_target("ffff"));
    }

    #[test]
    fn mine_is_pure() {
        let block = Block::new(vec![Transaction::coinbase("a", "b")], String::new(), 0);
        let pow = ProofOfWork::new(2);
        let first = pow.mine(&block);
        let second = pow.mine(&block);
        assert_eq!(first, second);
        assert!(block.hash.is_empty());
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn mined_hash_matches_payload_with_winning_nonce() {
        let mut block = Block::new(vec![Transaction::coinbase("a", "b")], "p".into(), 4);
        let pow = ProofOfWork::new(3);
        block.mine(&pow);
        assert!(block.hash.starts_with("000"));
        assert_eq!(block.hash, ProofOfWork::digest(&block.hashable_payload()));
        assert!(pow.validate(&block));
    }

    #[test]
    fn validate_rejects_unmined_block() {
        let block = Block::new(vec![Transaction::coinbase("a", "b")], "p".into(), 1);
        assert!(!ProofOfWork::new(1).validate(&block));
    }

    #[test]
    fn task_delivers_mined_block() {
        let block = Block::new(vec![Transaction::coinbase("a", "b")], String::new(), 0);
        let pow = ProofOfWork::new(2);
        let mined = MiningTask::spawn(block, pow)
            .wait(Duration::from_secs(30))
            .expect("mining at difficulty 2 finishes quickly");
        assert!(pow.validate(&mined));
    }

    #[test]
    fn wait_gives_up_on_slow_search() {
        let block = Block::new(vec![Transaction::coinbase("a", "slow")], String::new(), 0);
        // eight hex zeros takes billions of attempts
        let task = MiningTask::spawn(block, ProofOfWork::new(8));
        assert!(task.wait(Duration::from_millis(20)).is_none());
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::pow::ProofOfWork;
use crate::codec::{
    CodecError, Decode, Encode, get_i64, get_len, get_str, get_u32, put_i64, put_len, put_str,
    put_u32, read_bytes,
};
use crate::transaction::Transaction;

/// A single block in the ledger holding one or more transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: i64, // Unix timestamp (UTC)
    pub transactions: Vec<Transaction>,
    /// Hex hash of the predecessor; empty for genesis.
    pub previous_hash: String,
    /// Proof-of-work hash, empty until mined.
    pub hash: String,
    pub height: u32,
    pub nonce: u32, // Proof-of-Work nonce
}

impl Block {
    /// Create a new block (not mined yet). Call `mine()` to perform PoW.
    pub fn new(transactions: Vec<Transaction>, previous_hash: String, height: u32) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            transactions,
            previous_hash,
            hash: String::new(),
            height,
            nonce: 0,
        }
    }

    /// First block of a chain. Mined like every other block.
    pub fn genesis(coinbase: Transaction, pow: &ProofOfWork) -> Self {
        let mut block = Self::new(vec![coinbase], String::new(), 0);
        block.mine(pow);
        block
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_empty()
    }

    /// Everything the proof-of-work covers: the block minus its own hash.
    pub fn hashable_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u32(&mut out, self.height);
        put_u32(&mut out, self.nonce);
        put_i64(&mut out, self.timestamp);
        self.encode_transactions(&mut out);
        put_str(&mut out, &self.previous_hash);
        out
    }

    /// Run proof-of-work and stamp the winning nonce and hash.
    pub fn mine(&mut self, pow: &ProofOfWork) {
        let (nonce, hash) = pow.mine(self);
        self.nonce = nonce;
        self.hash = hash;
    }

    /// Cached hash matches the content and satisfies `pow`.
    /// Does not check linkage.
    pub fn is_valid(&self, pow: &ProofOfWork) -> bool {
        pow.validate(self)
    }

    fn encode_transactions(&self, out: &mut Vec<u8>) {
        put_len(out, self.transactions.len());
        for txn in &self.transactions {
            let bytes = txn.to_bytes();
            put_len(out, bytes.len());
            out.extend_from_slice(&bytes);
        }
    }
}

// Byte offset of the nonce inside the hashable payload (after height).
pub(crate) const NONCE_OFFSET: usize = 4;

impl Encode for Block {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.height);
        put_u32(out, self.nonce);
        put_i64(out, self.timestamp);
        self.encode_transactions(out);
        put_str(out, &self.hash);
        put_str(out, &self.previous_hash);
    }
}

impl Decode for Block {
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        let height = get_u32(input)?;
        let nonce = get_u32(input)?;
        let timestamp = get_i64(input)?;

        // each transaction carries at least its own 4-byte length
        let count = get_len(input, "transaction count", 4)?;
        if count == 0 {
            return Err(CodecError::EmptyBlock);
        }
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            let len = get_u32(input)? as usize;
            if len == 0 || len > input.len() {
                return Err(CodecError::InvalidLength {
                    what: "transaction",
                    len,
                    remaining: input.len(),
                });
            }
            let bytes = read_bytes(input, len)?;
            transactions.push(Transaction::from_bytes(bytes)?);
        }

        let hash = get_str(input)?;
        let previous_hash = get_str(input)?;

        Ok(Self {
            timestamp,
            transactions,
            previous_hash,
            hash,
            height,
            nonce,
        })
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.transactions.iter().map(|t| t.id.as_str()).collect();
        write!(
            f,
            "{{Hash: {:?}, PrevBlockHash: {:?}, Height: {}, Timestamp: {}, Transactions: {:?}, Nonce: {}}}",
            self.hash, self.previous_hash, self.height, self.timestamp, ids, self.nonce
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TxInput, TxOutput};
    use rand::Rng;

    fn pow() -> ProofOfWork {
        ProofOfWork::new(2)
    }

    fn payment(txid: &str) -> Transaction {
        Transaction::new(
            vec![TxInput {
                txid: txid.into(),
                vout: 0,
                unlock_script: "sig".into(),
            }],
            vec![TxOutput {
                value: 1,
                lock_script: "addr".into(),
            }],
        )
        .with_id()
    }

    #[test]
    fn genesis_is_mined_and_unlinked() {
        let b = Block::genesis(Transaction::coinbase("alice", ""), &pow());
        assert!(b.is_genesis());
        assert_eq!(b.height, 0);
        assert!(b.hash.starts_with("00"));
        assert!(b.is_valid(&pow()));
    }

    #[test]
    fn mining_produces_leading_zeros() {
        let mut b = Block::new(vec![payment("demo-txid")], "prev".into(), 1);
        assert!(b.hash.is_empty());
        b.mine(&pow());
        assert!(b.hash.starts_with("00"));
        assert_eq!(b.hash, ProofOfWork::digest(&b.hashable_payload()));
        assert!(b.is_valid(&pow()));
    }

    #[test]
    fn payload_ignores_old_hash() {
        let mut b = Block::new(vec![payment("x")], "prev".into(), 3);
        let before = b.hashable_payload();
        b.hash = "deadbeef".into();
        assert_eq!(before, b.hashable_payload());
    }

    #[test]
    fn invalid_when_mutated() {
        let mut b = Block::new(vec![payment("demo-txid")], "prev".into(), 2);
        b.mine(&pow());
        let old_hash = b.hash.clone();

        b.transactions.push(payment("x"));

        assert_ne!(old_hash, ProofOfWork::digest(&b.hashable_payload()));
        assert!(!b.is_valid(&pow()));
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let mut rng = rand::thread_rng();
        for i in 0..50 {
            let txs = (0..rng.gen_range(1..4))
                .map(|j| payment(&format!("tx-{i}-{j}")))
                .collect();
            let mut b = Block::new(txs, format!("{:064x}", rng.r#gen::<u128>()), rng.r#gen());
            b.nonce = rng.r#gen();
            b.timestamp = rng.r#gen();
            b.hash = format!("{:064x}", rng.r#gen::<u128>());
            assert_eq!(Block::from_bytes(&b.to_bytes()).unwrap(), b);
        }
    }

    #[test]
    fn truncated_block_is_rejected() {
        let mut b = Block::new(vec![payment("a"), payment("b")], "prev".into(), 7);
        b.mine(&pow());
        let bytes = b.to_bytes();
        for cut in 0..bytes.len() {
            assert!(Block::from_bytes(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn oversized_transaction_length_is_corruption() {
        let b = Block::new(vec![payment("a")], String::new(), 0);
        let mut bytes = b.to_bytes();
        // first transaction length sits after height, nonce, timestamp, count
        let at = 4 + 4 + 8 + 4;
        bytes[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Block::from_bytes(&bytes),
            Err(CodecError::InvalidLength {
                what: "transaction",
                ..
            })
        ));
    }

    #[test]
    fn zero_transactions_is_rejected() {
        let b = Block::new(vec![], String::new(), 0);
        assert_eq!(Block::from_bytes(&b.to_bytes()), Err(CodecError::EmptyBlock));
    }

    #[test]
    fn nonce_lives_at_fixed_offset() {
        let mut b = Block::new(vec![payment("a")], String::new(), 0);
        b.nonce = 0x0102_0304;
        let payload = b.hashable_payload();
        assert_eq!(
            &payload[NONCE_OFFSET..NONCE_OFFSET + 4],
            &0x0102_0304u32.to_le_bytes()
        );
    }
}

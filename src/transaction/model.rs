use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::{
    CodecError, Decode, Encode, get_i32, get_i64, get_len, get_str, put_i32, put_i64, put_len,
    put_str,
};

/// Value minted by a coinbase transaction.
pub const SUBSIDY: i64 = 100;

/// Output index carried by the single input of a coinbase transaction.
pub const COINBASE_VOUT: i32 = -1;

// Smallest encodings, used to sanity-check counts read from disk.
const MIN_INPUT_BYTES: usize = 4 + 4 + 4;
const MIN_OUTPUT_BYTES: usize = 4 + 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the transaction whose output is being spent.
    pub txid: String,
    /// Index of the spent output; `-1` for coinbase inputs.
    pub vout: i32,
    pub unlock_script: String,
}

impl TxInput {
    pub fn can_unlock_with(&self, data: &str) -> bool {
        self.unlock_script == data
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: i64,
    pub lock_script: String,
}

impl TxOutput {
    pub fn can_be_unlocked_with(&self, data: &str) -> bool {
        self.lock_script == data
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash; empty until `generate_id` is called.
    pub id: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            id: String::new(),
            inputs,
            outputs,
        }
    }

    /// Reward transaction minting `SUBSIDY` to `to`. An empty `data` is
    /// replaced with a default memo.
    pub fn coinbase(to: &str, data: &str) -> Self {
        let unlock_script = if data.is_empty() {
            format!("Reward to {to}")
        } else {
            data.to_string()
        };
        Self::reward(to, unlock_script)
    }

    /// Coinbase for the block at `height`. The height leads the memo so two
    /// blocks rewarding the same address with the same data get distinct ids.
    pub fn block_reward(to: &str, data: &str, height: u32) -> Self {
        let mut txn = Self::coinbase(to, data);
        for input in &mut txn.inputs {
            input.unlock_script = format!("{height}:{}", input.unlock_script);
        }
        txn
    }

    fn reward(to: &str, unlock_script: String) -> Self {
        Self::new(
            vec![TxInput {
                txid: String::new(),
                vout: COINBASE_VOUT,
                unlock_script,
            }],
            vec![TxOutput {
                value: SUBSIDY,
                lock_script: to.to_string(),
            }],
        )
    }

    /// Stamp the transaction with the SHA-256 of its encoding. The id field
    /// is blanked while hashing so the result does not depend on a prior id.
    pub fn generate_id(&mut self) {
        self.id.clear();
        let digest = Sha256::digest(self.to_bytes());
        self.id = hex::encode(digest);
    }

    /// Builder form of [`Transaction::generate_id`].
    pub fn with_id(mut self) -> Self {
        self.generate_id();
        self
    }

    pub fn is_coinbase(&self) -> bool {
        self.outputs.len() == 1
            && self.inputs.len() == 1
            && self.inputs[0].txid.is_empty()
            && self.inputs[0].vout == COINBASE_VOUT
    }

    pub fn total_output_value(&self) -> i128 {
        self.outputs.iter().map(|o| o.value as i128).sum()
    }

    /// Pays to `address` or, outside a coinbase, spends with its unlock data.
    pub fn involves(&self, address: &str) -> bool {
        self.outputs.iter().any(|o| o.can_be_unlocked_with(address))
            || (!self.is_coinbase() && self.inputs.iter().any(|i| i.can_unlock_with(address)))
    }
}

impl Encode for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        put_str(out, &self.id);

        put_len(out, self.inputs.len());
        for input in &self.inputs {
            put_str(out, &input.txid);
            put_i32(out, input.vout);
            put_str(out, &input.unlock_script);
        }

        put_len(out, self.outputs.len());
        for output in &self.outputs {
            put_str(out, &output.lock_script);
            put_i64(out, output.value);
        }
    }
}

impl Transaction {
    fn decode_fields(input: &mut &[u8]) -> Result<Self, CodecError> {
        let id = get_str(input)?;

        let input_count = get_len(input, "input count", MIN_INPUT_BYTES)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let txid = get_str(input)?;
            let vout = get_i32(input)?;
            let unlock_script = get_str(input)?;
            inputs.push(TxInput {
                txid,
                vout,
                unlock_script,
            });
        }

        let output_count = get_len(input, "output count", MIN_OUTPUT_BYTES)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let lock_script = get_str(input)?;
            let value = get_i64(input)?;
            outputs.push(TxOutput { value, lock_script });
        }

        Ok(Self {
            id,
            inputs,
            outputs,
        })
    }
}

impl Decode for Transaction {
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        Self::decode_fields(input).map_err(|e| CodecError::MalformedTransaction(Box::new(e)))
    }

    fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let mut input = data;
        let txn = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(CodecError::MalformedTransaction(Box::new(
                CodecError::TrailingBytes(input.len()),
            )));
        }
        Ok(txn)
    }
}

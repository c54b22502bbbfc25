use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::model::{Transaction, TxOutput};
use crate::blockchain::{Block, ChainIterator, KvEngine};
use crate::error::Result;

/// Identifies a specific transaction output by its txid and index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

/// Unspent outputs keyed by (txid, vout).
#[derive(Debug, Default, Clone)]
pub struct UtxoSet {
    map: HashMap<OutPoint, TxOutput>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, outpoint: OutPoint, output: TxOutput) {
        self.map.insert(outpoint, output);
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.map.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TxOutput)> {
        self.map.iter()
    }

    /// Remaining outputs grouped by transaction id, each list in output
    /// index order.
    pub fn by_transaction(&self) -> HashMap<String, Vec<TxOutput>> {
        let mut indexed: HashMap<&str, Vec<(u32, &TxOutput)>> = HashMap::new();
        for (op, out) in &self.map {
            indexed.entry(op.txid.as_str()).or_default().push((op.vout, out));
        }
        indexed
            .into_iter()
            .map(|(txid, mut outs)| {
                outs.sort_by_key(|(vout, _)| *vout);
                (
                    txid.to_string(),
                    outs.into_iter().map(|(_, o)| o.clone()).collect(),
                )
            })
            .collect()
    }

    /// Sum of unspent value locked to `lock_script`.
    pub fn balance(&self, lock_script: &str) -> i128 {
        self.map
            .values()
            .filter(|o| o.can_be_unlocked_with(lock_script))
            .map(|o| o.value as i128)
            .sum()
    }

    /// Picks outputs locked to `lock_script` until `amount` is covered.
    /// Returns the accumulated value and the chosen outpoints; the value is
    /// below `amount` when the owner cannot afford it.
    pub fn spendable(&self, lock_script: &str, amount: i64) -> (i64, Vec<OutPoint>) {
        let mut candidates: Vec<_> = self
            .map
            .iter()
            .filter(|(_, o)| o.can_be_unlocked_with(lock_script))
            .collect();
        // deterministic pick order
        candidates.sort_by(|a, b| a.0.txid.cmp(&b.0.txid).then(a.0.vout.cmp(&b.0.vout)));

        let mut accumulated: i64 = 0;
        let mut picked = Vec::new();
        for (op, out) in candidates {
            if accumulated >= amount {
                break;
            }
            accumulated = accumulated.saturating_add(out.value);
            picked.push(op.clone());
        }
        (accumulated, picked)
    }
}

/// Replays blocks from tip to genesis and keeps the outputs nobody spent.
///
/// Spends are indexed by the referenced transaction id, so an output is
/// already marked when the walk reaches the (older) block that created it.
#[derive(Debug, Default)]
pub struct UtxoAccumulator {
    spent: HashMap<String, HashSet<u32>>,
    unspent: UtxoSet,
}

impl UtxoAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one block. Blocks must arrive newest first.
    pub fn visit_block(&mut self, block: &Block) {
        // last-to-first so spends inside the same block land before the
        // transaction that created the output
        for txn in block.transactions.iter().rev() {
            self.visit_transaction(txn);
        }
    }

    fn visit_transaction(&mut self, txn: &Transaction) {
        let spent = self.spent.get(&txn.id);
        for (idx, output) in txn.outputs.iter().enumerate() {
            let vout = idx as u32;
            if spent.is_some_and(|s| s.contains(&vout)) {
                continue;
            }
            self.unspent.insert(
                OutPoint {
                    txid: txn.id.clone(),
                    vout,
                },
                output.clone(),
            );
        }

        if txn.is_coinbase() {
            return;
        }
        for input in &txn.inputs {
            match u32::try_from(input.vout) {
                Ok(vout) => {
                    self.spent
                        .entry(input.txid.clone())
                        .or_default()
                        .insert(vout);
                }
                Err(_) => warn!(
                    "ignoring input of {} with negative output index {}",
                    txn.id, input.vout
                ),
            }
        }
    }

    pub fn finish(self) -> UtxoSet {
        self.unspent
    }
}

/// Walk the whole chain once and return its unspent outputs.
pub fn find_unspent<E: KvEngine>(mut iter: ChainIterator<'_, E>) -> Result<UtxoSet> {
    let mut acc = UtxoAccumulator::new();
    let mut visited = 0usize;
    while iter.has_next() {
        let block = iter.next_block()?;
        acc.visit_block(&block);
        visited += 1;
    }
    let set = acc.finish();
    debug!(
        "UTXO scan visited {} blocks, {} unspent outputs",
        visited,
        set.len()
    );
    Ok(set)
}

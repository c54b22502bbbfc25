pub mod model;
pub mod utxo;

pub use model::{COINBASE_VOUT, SUBSIDY, Transaction, TxInput, TxOutput};
pub use utxo::{OutPoint, UtxoAccumulator, UtxoSet, find_unspent};

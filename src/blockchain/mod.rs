pub mod block;
pub mod iterator;
pub mod model;
pub mod pow;
pub mod store;

pub use block::Block;
pub use iterator::ChainIterator;
pub use model::Blockchain;
pub use pow::{MiningTask, ProofOfWork};
pub use store::{ChainStore, EngineError, KvEngine, LAST_KEY, MemoryKv, SledKv};

//! Node state: persistent block store, the in-memory UTXO set, and the
//! transaction memory pool.

pub mod mempool;
pub mod store;
pub mod utxo_set;

pub use mempool::{Mempool, MAX_POOL_SIZE, MIN_FEE_RATE};
pub use store::Storage;
pub use utxo_set::{OutPoint, Utxo, UtxoSet};

//! Small bookkeeping helpers shared by the skinning components.

pub mod index_pool;

pub use index_pool::IndexPool;

//! Concrete providers.

mod env;
mod etcd;
mod memory;

pub use env::EnvProvider;
pub use etcd::EtcdProvider;
pub use memory::MemoryProvider;

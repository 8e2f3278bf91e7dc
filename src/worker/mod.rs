pub mod block_poller;

pub use block_poller::{BlockPoller, BlockSource};

mod batch;
mod chain;
mod orchestrator;
mod utxo;

#[cfg(test)]
pub(crate) mod test_util;

pub use batch::*;
pub use chain::*;
pub use orchestrator::*;
pub use utxo::*;

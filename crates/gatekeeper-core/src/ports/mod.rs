//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod block_store;
mod clock;
mod sweep;
mod upstream;

pub use block_store::BlockStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use sweep::{SweepOutcome, Sweepable};
pub use upstream::UpstreamClient;

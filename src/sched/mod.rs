//! The scheduling core: policies, wait queues, and the donation graph.

pub mod core;
pub mod lottery;
pub mod policy;
pub mod priority;
pub mod queue;

pub use self::core::{SchedCore, ThreadSched};
pub use lottery::LotteryPolicy;
pub use policy::SchedPolicy;
pub use priority::PriorityPolicy;
pub use queue::{WaitQueue, Waiter, WaiterSet};

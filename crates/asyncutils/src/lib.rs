//! Cross-thread plumbing shared by the scheduler and the replay
//! server's dynamic-download wait (SPEC_FULL.md §5, §9): message
//! queues standing in for the source's `fg_call_later`/
//! `bg_call_later`, and a cancellation-safe future wrapper standing in
//! for its "interruptable future".

mod interruptable;
mod queues;

pub use crate::interruptable::{CancelHandle, Cancelled, Interruptable};
pub use crate::queues::{channel, MessageQueues, Receiver, Sender};

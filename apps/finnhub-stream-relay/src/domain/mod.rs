//! Domain layer - Core pooling logic and canonical price types.
//!
//! Nothing in this layer performs I/O. The pool drives the upstream feed
//! through the [`pool::FeedCommands`] trait, which adapters implement with
//! non-blocking sends.

pub mod pool;
pub mod tick;

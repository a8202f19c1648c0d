//! Sleeping synchronization primitives (spec §3, §4.5-§4.8), all built on
//! [`spinlock`] and [`wait_queue`].

pub mod condvar;
pub mod mailbox;
pub mod mutex;
pub mod semaphore;
pub mod spinlock;
pub mod wait_queue;

//! Core primitives shared by every ojjy kernel crate: leveled logging, the
//! spin lock used to guard kernel services, and the monotonic clock used for
//! bounded device waits.

#![cfg_attr(not(test), no_std)]

pub mod log;
pub mod sync;
pub mod time;

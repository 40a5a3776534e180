//! # Kernel synchronization primitives
//!
//! The kernel runs on a single CPU without preemption of kernel code, but
//! interrupt handlers (keyboard input) and the global allocator still need
//! `Sync` statics. [`SpinLock`] guards mutable state behind `&self`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};

//! # i686 Kernel Core
//!
//! Ties the memory manager, the device drivers and the filesystem together
//! and runs the boot sequence.
//!
//! ```text
//!  boot stub ──BootInfo──▶ kernel_main
//!                            │
//!                            ├─ boot::init_memory      frames, module mappings
//!                            ├─ BuiltinDrivers         memdev, tty, ramdisk
//!                            ├─ boot::attach_ramdisks  modules as block devices
//!                            └─ boot::fs_demo          tmpfs with device nodes
//!
//!  KernelAllocator ──▶ KernelHeap ──▶ KernelContext ──▶ Vmm ──▶ frames
//! ```
//!
//! Everything except the entry glue builds and tests on the host; the
//! context is generic over the page-table access so tests run against an
//! in-memory page directory.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod allocator;
pub mod boot;
pub mod context;
#[cfg(all(target_arch = "x86", target_os = "none"))]
mod entry;

pub use context::KernelContext;

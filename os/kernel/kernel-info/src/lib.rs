//! # Kernel Layout and Boot Interface
//!
//! Shared configuration for the i686 kernel: the virtual memory layout
//! ([`memory`]) and the boot information model ([`boot`]) handed from the
//! boot stub to the orchestrator.
//!
//! ```text
//! 0x0000_0000 ┌──────────────────────────────┐
//!             │  NULL page (never mapped)     │
//! U_MEM_START ├──────────────────────────────┤ 0x0010_0000
//!             │  User space                   │
//! K_MEM_START ├──────────────────────────────┤ 0xC000_0000
//!             │  Kernel image, boot modules   │
//! HEAP_START  ├──────────────────────────────┤ 0xD000_0000
//!             │  Kernel heap                  │
//! DEV_START   ├──────────────────────────────┤ 0xF000_0000
//!             │  Device mappings              │
//! PAGE_LIMIT  ├──────────────────────────────┤ 0xFFC0_0000
//!             │  Self-map window (PDE 1023)   │
//! 0xFFFF_FFFF └──────────────────────────────┘
//! ```
//!
//! Constants are checked at compile time so regions cannot overlap.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;

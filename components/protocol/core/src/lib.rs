//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

#![cfg_attr(not(test), no_std)]

//! Firmware-level control core of a Galvanize call-for-service button node.
//!
//! Three loosely coupled state machines — node lifecycle, send management,
//! power management — are bound together here against a single-threaded
//! cooperative [`galvanize_api::Scheduler`]. See `SPEC_FULL.md` for the
//! full module breakdown; this crate implements all of it except the
//! external collaborators (timer scheduler, radio adaptor, display
//! hardware, persisted configuration) which are contract-only.

use galvanize_api::TimeMs;
use rand_core::RngCore;

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::{debug, error, info, warn};
#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
use log::{debug, error, info, warn};

pub mod adapter;
pub mod codec;
pub mod display;
mod event_log;
pub mod node;
pub mod power;
pub mod send_manager;

pub use adapter::Adapter;
pub use codec::{DecodeError, Frame, Function};
pub use node::{NodeController, NodeState};

const MS_PER_S: TimeMs = 1000;

/// Firmware-baked node identifier (spec.md §3). Configurable in real
/// deployments; held as a plain constant here the way the teacher crate
/// keeps its network-tuning constants at the top of `lib.rs`.
pub const NODE_ID: u32 = 47;

/// Sentinel meaning "no address assigned yet" (spec.md I1).
pub const UNASSIGNED_ADDRESS: galvanize_api::NodeAddress = 0xFFFF;
/// Well-known broadcast address used by beacons.
pub const BEACON_ADDRESS: galvanize_api::NodeAddress = 0xBBBB;
/// Well-known broadcast address used by include grants.
pub const GRANT_ADDRESS: galvanize_api::NodeAddress = 0xBB00;

// Send Manager attempt schedule (spec.md §4.2).
pub(crate) const TS1_S: u32 = 3;
pub(crate) const TS2_S: u32 = 6;
pub(crate) const TS3_S: u32 = 4;
pub(crate) const TS4_S: u32 = 8;
pub(crate) const TS5_MS: TimeMs = 30 * MS_PER_S;
pub(crate) const TR1_MS: TimeMs = 360 * MS_PER_S;
pub(crate) const TR2_MS: TimeMs = 3600 * MS_PER_S;

// Node Controller / Power Manager timing (spec.md §4.4, §4.5, §9).
/// Chosen from among the three revisions that used 8s (spec.md §9 open
/// question); see DESIGN.md.
pub(crate) const T_RESET_PRESS_MS: TimeMs = 8 * MS_PER_S;
pub(crate) const T_START_PRESS_MS: TimeMs = 3 * MS_PER_S;
pub(crate) const T_SEARCH_MAX_MS: TimeMs = 30 * MS_PER_S;
pub(crate) const T_KEEP_AWAKE_MS: TimeMs = 5 * MS_PER_S;
pub(crate) const REVERT_DELAY_MS: TimeMs = 5 * MS_PER_S;
/// Threshold separating a "pressed -> reverting/normal" short tap from a
/// long press while in the `pressed` state (spec.md §4.5 table).
pub(crate) const T_PRESSED_CLEAR_MS: TimeMs = 3 * MS_PER_S;

/// Draw a uniform random duration in `[lo_s, hi_s]` seconds, at
/// decisecond resolution, as milliseconds. Mirrors the source's
/// `randint(10*lo, 10*hi) / 10` back-off draws (spec.md §4.2 `U(a,b)`).
pub(crate) fn uniform_ds_ms(rng: &mut impl RngCore, lo_s: u32, hi_s: u32) -> TimeMs {
    let lo_ds = lo_s * 10;
    let hi_ds = hi_s * 10;
    let span = hi_ds - lo_ds + 1;
    let ds = lo_ds + rng.next_u32() % span;
    ds as TimeMs * 100
}

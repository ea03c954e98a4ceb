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

//! Shared types crossing the boundary between the node control core
//! (`galvanize_core`) and whatever drives it (firmware main loop,
//! simulator, host test harness).
//!
//! Mirrors the split the teacher's `protocol_api` crate draws between a
//! protocol implementation and its host: a small set of value types plus
//! one trait contract (`Scheduler`), nothing that ties in a concrete
//! executor.

use heapless::{String, Vec};

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::Format;

/// Milliseconds since an arbitrary but monotonic epoch. The node core never
/// reads a wall clock directly; every timestamp arrives as an argument.
pub type TimeMs = u64;

/// 16-bit network address as assigned by the bridge.
pub type NodeAddress = u16;

/// Maximum length of a single display line. Must be large enough to hold
/// the longest fixed system-slot string (`Display::default`'s
/// `"Network connection successful"` is 29 bytes); 32 leaves headroom for
/// config-written `m1..m4` lines too.
pub const MAX_LINE_LEN: usize = 32;
/// Maximum encoded frame size exchanged with the radio adaptor. Must cover
/// the largest frame this node ever builds: an 8-byte header plus a
/// `config` line-write payload (`configType` + `length` bytes plus up to
/// `MAX_LINE_LEN` bytes of text), so it has to stay comfortably above
/// `MAX_LINE_LEN`, not equal to it.
pub const MAX_FRAME_LEN: usize = 48;
/// Maximum length of a host-assigned adaptor/manager identifier.
pub const MAX_HOST_ID_LEN: usize = 32;
/// Maximum length of a rendered, newline-joined user-message body.
pub const MAX_BODY_LEN: usize = 3 * (MAX_LINE_LEN + 1);

/// A host-assigned opaque identifier for a service adaptor (the radio
/// adaptor, the button adaptor) or the manager itself.
pub type HostId = String<MAX_HOST_ID_LEN>;

/// Named timer handles the node core schedules against. Each variant maps
/// to one of the single-valued handles of the data model: `searchID`,
/// `wakeupID`, `waitingID`, `revertID`. `Reconnect` supplements that list:
/// the recurring comms_failed back-off (spec.md §4.4) needs its own
/// tracked handle distinct from `wakeupID`, since both can be live at once
/// (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum TimerKind {
    Search,
    Wakeup,
    Waiting,
    Revert,
    Reconnect,
}

/// Cooperative single-threaded delayed-callback facility (spec.md §2,
/// component 1; §9 "Cooperative scheduling"). Implemented by the host: a
/// real firmware wraps a hardware timer queue, tests substitute a virtual
/// clock. The node core only ever holds a `Handle`, never the scheduler's
/// internal state.
pub trait Scheduler {
    type Handle: Copy + Eq;

    /// Schedule `timer` to fire after `delay_ms`, returning a handle that
    /// can later be cancelled. Does not itself cancel any other timer of
    /// the same `TimerKind` — callers are responsible for invariant I4
    /// (cancel-before-replace).
    fn schedule_after(&mut self, delay_ms: TimeMs, timer: TimerKind) -> Self::Handle;

    /// Cancel a previously scheduled callback. A silent no-op if the
    /// handle no longer refers to a live callback.
    fn cancel(&mut self, handle: Self::Handle);
}

/// Display font tag, carried through to the host's user-message renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Font {
    Small,
    Medium,
    Large,
}

/// A display slot rendered down to its active lines, ready to hand to the
/// host's user-message renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct RenderedMessage {
    pub lines: Vec<String<MAX_LINE_LEN>, 3>,
    pub font: Font,
}

/// Everything the node control core asks the outside world to physically
/// do. Analogous to the teacher's `Action<TIME, MESSAGE, CHANNEL>`: a pure
/// value the core computes and hands back, never executed in-line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Command {
    /// Transmit an already wire-encoded frame via the radio adaptor.
    Transmit(Vec<u8, MAX_FRAME_LEN>),
    /// Render a message on the display.
    Render(RenderedMessage),
}

/// Host service characteristics the adapter subscribes to (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Characteristic {
    GalvanizeButton,
    Buttons,
}

/// Outbound application state, mirrored to the host's `{status:"state"}`
/// envelope (spec.md §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum RunState {
    Stopped,
    Starting,
    Running,
}

/// Inbound host events, pre-parsed from the host's event envelopes
/// (spec.md §6.2). Base64 decoding of radio frames happens before this
/// point; `Radio` already carries raw frame bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum HostEvent {
    /// A collaborator announced a service characteristic it offers.
    Service {
        id: HostId,
        characteristic: Characteristic,
    },
    /// Raw (already base64-decoded) radio frame bytes.
    Radio { data: Vec<u8, MAX_FRAME_LEN> },
    /// Physical button transition.
    Button { left_button: u8, timestamp: TimeMs },
}

/// Outbound host commands, ready for the adapter's caller to serialize
/// into the host's envelope format (spec.md §6.2). Base64-encoding of
/// `Transmit::data` happens on the way out, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum HostCommand {
    Transmit {
        to: HostId,
        data: Vec<u8, MAX_FRAME_LEN>,
    },
    UserMessage {
        to: HostId,
        body: String<MAX_BODY_LEN>,
    },
    State {
        to: HostId,
        state: RunState,
    },
    Service {
        to: HostId,
        characteristics: Vec<Characteristic, 1>,
    },
}

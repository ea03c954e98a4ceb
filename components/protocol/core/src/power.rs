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

//! Power Manager (spec.md §4.4).
//!
//! `radioOn` is the shared resource of spec.md I3; this module only ever
//! flips it, it never reads it to gate anything (that happens in
//! `node.rs`, per I5). `reconnect()` touches `nodeState` and the display
//! too much to live here cleanly, so it stays in `NodeController`'s timer
//! dispatch (spec.md §4.4's Power Manager is thin by design — most of its
//! weight is in scheduling, not state).

use galvanize_api::{Command, NodeAddress, Scheduler, TimeMs, TimerKind};

use crate::codec::{encode, Function};
use crate::T_KEEP_AWAKE_MS;

const MS_PER_S: TimeMs = 1000;

/// Which action the next `wakeupID` callback should perform. The source's
/// `reactor.callLater(t, specificFunction)` dispatches to a concrete
/// function; here a single named handle (`wakeupID`) serves double duty,
/// so the pending action is tracked explicitly (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeupAction {
    GoToSleep,
    OnWakeup,
}

pub struct Power {
    pub radio_on: bool,
    pending_action: WakeupAction,
}

impl Default for Power {
    fn default() -> Self {
        Self {
            radio_on: false,
            pending_action: WakeupAction::OnWakeup,
        }
    }
}

impl Power {
    /// `setWakeup(w)` (spec.md §4.4): cancel any pending `wakeupID`, then
    /// arm it for either `goToSleep` (w == 0) or `onWakeup` (otherwise).
    pub fn set_wakeup<S: Scheduler>(
        &mut self,
        w: u16,
        wakeup_handle: &mut Option<S::Handle>,
        scheduler: &mut S,
    ) {
        if let Some(handle) = wakeup_handle.take() {
            scheduler.cancel(handle);
        }
        if w == 0 {
            self.pending_action = WakeupAction::GoToSleep;
            *wakeup_handle = Some(scheduler.schedule_after(T_KEEP_AWAKE_MS, TimerKind::Wakeup));
        } else {
            self.pending_action = WakeupAction::OnWakeup;
            let delay = 2 * w as TimeMs * MS_PER_S;
            *wakeup_handle = Some(scheduler.schedule_after(delay, TimerKind::Wakeup));
        }
    }

    /// Dispatch a fired `wakeupID`: either puts the radio to sleep, or
    /// emits a `woken_up` uplink to tell the bridge we're listening.
    pub fn on_wakeup_timer(
        &mut self,
        bridge_address: NodeAddress,
        node_address: NodeAddress,
    ) -> Option<Command> {
        match self.pending_action {
            WakeupAction::GoToSleep => {
                self.go_to_sleep();
                None
            }
            WakeupAction::OnWakeup => {
                let encoded = encode(bridge_address, node_address, Function::WokenUp, &[]);
                Some(Command::Transmit(encoded))
            }
        }
    }

    pub fn go_to_sleep(&mut self) {
        self.radio_on = false;
    }

    pub fn wake(&mut self) {
        self.radio_on = true;
    }
}

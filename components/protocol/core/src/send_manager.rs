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

//! Send Manager (spec.md §4.2).
//!
//! Owns the single in-flight uplink. Rather than a general queue, the
//! `sending` guard of the source is formalized here as a type invariant:
//! `enqueue` is rejected outright while `in_flight` is `Some` (spec.md §9
//! "Single in-flight uplink").
//!
//! Implements the `ts*`-timed attempt schedule (spec.md §4.2), not the
//! alternative beacon-synchronous legacy schedule — see DESIGN.md for why.

use galvanize_api::{Command, Scheduler, TimeMs, TimerKind, MAX_FRAME_LEN};
use heapless::Vec;
use rand_core::RngCore;

use crate::codec::Function;
use crate::{event_log_send_state, uniform_ds_ms, TS1_S, TS2_S, TS3_S, TS4_S, TS5_MS};

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::{debug, error, info, warn};
#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
use log::{debug, error, info, warn};

struct InFlight<H> {
    encoded: Vec<u8, MAX_FRAME_LEN>,
    function: Function,
    attempt: u8,
    waiting_handle: H,
}

/// Rejected because an uplink is already in flight (spec.md §7 `Busy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy;

/// What happened when the `waitingID` timer fired (spec.md §4.2 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitingOutcome {
    /// Attempts 2, 4, 5: retransmit and keep waiting.
    Retransmit,
    /// Attempt 3: yield the radio for `ts5` without retransmitting.
    CommsProblemTransient,
    /// Attempt 6: schedule exhausted, uplink dropped.
    CommsFailed,
    /// `waitingID` fired with nothing in flight; stale callback, ignored.
    Stale,
}

pub struct SendManager<H> {
    in_flight: Option<InFlight<H>>,
}

impl<H> Default for SendManager<H> {
    fn default() -> Self {
        Self { in_flight: None }
    }
}

impl<H: Copy + Eq> SendManager<H> {
    /// True iff `waitingID` is outstanding for an unacknowledged uplink
    /// (spec.md I2).
    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start an uplink if none is in flight (spec.md §4.2). Attempt 1:
    /// transmit immediately, arm `waitingID` for `U(ts1, ts2)`.
    pub fn enqueue<S: Scheduler<Handle = H>>(
        &mut self,
        encoded: Vec<u8, MAX_FRAME_LEN>,
        function: Function,
        timestamp: TimeMs,
        scheduler: &mut S,
        rng: &mut impl RngCore,
    ) -> Result<Command, Busy> {
        if self.in_flight.is_some() {
            warn!("send manager busy, dropping enqueue");
            return Err(Busy);
        }
        let waiting_handle =
            scheduler.schedule_after(uniform_ds_ms(rng, TS1_S, TS2_S), TimerKind::Waiting);
        let transmit = Command::Transmit(encoded.clone());
        event_log_send_state!(timestamp, 1);
        self.in_flight = Some(InFlight {
            encoded,
            function,
            attempt: 1,
            waiting_handle,
        });
        Ok(transmit)
    }

    /// An ack arrived for whichever uplink is currently in flight
    /// (spec.md §5 "independent of function tag"). Cancels `waitingID`,
    /// clears `sending`, ends the schedule.
    pub fn on_ack<S: Scheduler<Handle = H>>(&mut self, scheduler: &mut S) {
        if let Some(in_flight) = self.in_flight.take() {
            scheduler.cancel(in_flight.waiting_handle);
        } else {
            debug!("ack received with nothing in flight");
        }
    }

    /// `waitingID` fired; advance the attempt schedule.
    pub fn on_waiting_fired<S: Scheduler<Handle = H>>(
        &mut self,
        timestamp: TimeMs,
        scheduler: &mut S,
        rng: &mut impl RngCore,
    ) -> (WaitingOutcome, Option<Command>) {
        let Some(in_flight) = self.in_flight.as_mut() else {
            warn!("waitingID fired with nothing in flight");
            return (WaitingOutcome::Stale, None);
        };

        match in_flight.attempt {
            1 => {
                in_flight.attempt = 2;
                in_flight.waiting_handle =
                    scheduler.schedule_after(uniform_ds_ms(rng, TS3_S, TS4_S), TimerKind::Waiting);
                event_log_send_state!(timestamp, 2);
                let transmit = Command::Transmit(in_flight.encoded.clone());
                (WaitingOutcome::Retransmit, Some(transmit))
            }
            2 => {
                in_flight.attempt = 3;
                in_flight.waiting_handle = scheduler.schedule_after(TS5_MS, TimerKind::Waiting);
                event_log_send_state!(timestamp, 3);
                (WaitingOutcome::CommsProblemTransient, None)
            }
            3 => {
                in_flight.attempt = 4;
                in_flight.waiting_handle =
                    scheduler.schedule_after(uniform_ds_ms(rng, TS1_S, TS2_S), TimerKind::Waiting);
                event_log_send_state!(timestamp, 4);
                let transmit = Command::Transmit(in_flight.encoded.clone());
                (WaitingOutcome::Retransmit, Some(transmit))
            }
            4 => {
                in_flight.attempt = 5;
                in_flight.waiting_handle =
                    scheduler.schedule_after(uniform_ds_ms(rng, TS3_S, TS4_S), TimerKind::Waiting);
                event_log_send_state!(timestamp, 5);
                let transmit = Command::Transmit(in_flight.encoded.clone());
                (WaitingOutcome::Retransmit, Some(transmit))
            }
            _ => {
                // attempt 5's wait expired: 6 attempts total, give up.
                event_log_send_state!(timestamp, 6);
                self.in_flight = None;
                (WaitingOutcome::CommsFailed, None)
            }
        }
    }

    /// Function tag of the uplink currently in flight, for logging.
    pub fn in_flight_function(&self) -> Option<Function> {
        self.in_flight.as_ref().map(|f| f.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeScheduler {
        next_handle: u32,
        scheduled: HashMap<u32, (u64, TimerKind)>,
        cancelled: Vec<u32, 16>,
    }

    impl Scheduler for FakeScheduler {
        type Handle = u32;
        fn schedule_after(&mut self, delay_ms: u64, timer: TimerKind) -> u32 {
            self.next_handle += 1;
            self.scheduled.insert(self.next_handle, (delay_ms, timer));
            self.next_handle
        }
        fn cancel(&mut self, handle: u32) {
            let _ = self.cancelled.push(handle);
        }
    }

    #[test]
    fn busy_while_in_flight() {
        let mut send = SendManager::default();
        let mut scheduler = FakeScheduler::default();
        let mut rng = rand::thread_rng();
        let encoded = Vec::<u8, MAX_FRAME_LEN>::new();
        send.enqueue(encoded.clone(), Function::Alert, 0, &mut scheduler, &mut rng)
            .unwrap();
        assert_eq!(
            send.enqueue(encoded, Function::Alert, 0, &mut scheduler, &mut rng),
            Err(Busy)
        );
    }

    #[test]
    fn ack_clears_in_flight_and_cancels_timer() {
        let mut send = SendManager::default();
        let mut scheduler = FakeScheduler::default();
        let mut rng = rand::thread_rng();
        send.enqueue(Vec::new(), Function::Alert, 0, &mut scheduler, &mut rng)
            .unwrap();
        assert!(send.is_sending());
        send.on_ack(&mut scheduler);
        assert!(!send.is_sending());
        assert_eq!(scheduler.cancelled.len(), 1);
    }

    #[test]
    fn full_retry_schedule_reaches_comms_failed_after_six_attempts() {
        let mut send = SendManager::default();
        let mut scheduler = FakeScheduler::default();
        let mut rng = rand::thread_rng();
        send.enqueue(Vec::new(), Function::Alert, 0, &mut scheduler, &mut rng)
            .unwrap();

        let mut transmissions = 1; // attempt 1's immediate send
        let (outcome, cmd) = send.on_waiting_fired(0, &mut scheduler, &mut rng);
        assert_eq!(outcome, WaitingOutcome::Retransmit);
        assert!(cmd.is_some());
        transmissions += 1;

        let (outcome, cmd) = send.on_waiting_fired(0, &mut scheduler, &mut rng);
        assert_eq!(outcome, WaitingOutcome::CommsProblemTransient);
        assert!(cmd.is_none());

        let (outcome, cmd) = send.on_waiting_fired(0, &mut scheduler, &mut rng);
        assert_eq!(outcome, WaitingOutcome::Retransmit);
        assert!(cmd.is_some());
        transmissions += 1;

        let (outcome, cmd) = send.on_waiting_fired(0, &mut scheduler, &mut rng);
        assert_eq!(outcome, WaitingOutcome::Retransmit);
        assert!(cmd.is_some());
        transmissions += 1;

        let (outcome, _) = send.on_waiting_fired(0, &mut scheduler, &mut rng);
        assert_eq!(outcome, WaitingOutcome::CommsFailed);
        assert!(!send.is_sending());

        // four total transmissions: initial + attempts 2, 4, 5.
        assert_eq!(transmissions, 4);
    }
}

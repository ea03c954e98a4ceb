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

//! Event/Command Adapter (spec.md §4.6).
//!
//! Translates inbound host events (service announcements, radio frames,
//! button transitions) into Node Controller calls, and the controller's
//! [`Command`]s into host command envelopes ready for the caller to wrap in
//! JSON. Grounded directly on the `App`/`Galvanize` split of
//! `original_source/galvanize_node_a.py`: `onAdaptorService` becomes
//! [`Adapter::on_service`], `onAdaptorData`'s two branches become
//! [`Adapter::on_button`]/[`Adapter::on_radio_data`], and `setState`
//! becomes [`Adapter::state_command`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use galvanize_api::{
    Characteristic, Command, HostCommand, HostId, NodeAddress, RenderedMessage, RunState,
    Scheduler, TimeMs, MAX_BODY_LEN, MAX_FRAME_LEN,
};
use heapless::{String, Vec};
use rand_core::RngCore;

use crate::node::{Commands, NodeController};
use crate::{codec, BEACON_ADDRESS, GRANT_ADDRESS};

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::{debug, error, info, warn};
#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
use log::{debug, error, info, warn};

/// Base64 expansion of [`MAX_FRAME_LEN`] bytes (`ceil(48/3)*4`).
pub const MAX_B64_LEN: usize = 64;

/// A base64 encode/decode failure at the host boundary (spec.md §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Base64Error;

/// Up to one render plus one transmit come out of a single inbound event
/// (mirrors [`Commands`]'s sizing); `on_service` additionally returns a
/// subscription request plus a state update.
pub type AdapterCommands = Vec<HostCommand, 4>;

/// Decode a base64-encoded radio frame as carried in a `galvanize_button`
/// data event (spec.md §6.2). This is the one place the node core touches
/// `base64`; everything past this point deals in raw frame bytes.
pub fn decode_radio_data(data: &str) -> Result<Vec<u8, MAX_FRAME_LEN>, Base64Error> {
    let mut buf = [0u8; MAX_FRAME_LEN + 4];
    let len = STANDARD
        .decode_slice(data.as_bytes(), &mut buf)
        .map_err(|_| Base64Error)?;
    let mut out = Vec::new();
    out.extend_from_slice(&buf[..len]).map_err(|_| Base64Error)?;
    Ok(out)
}

/// Base64-encode a frame for the outbound `{request:"command", data:...}`
/// envelope.
pub fn encode_radio_data(frame: &[u8]) -> Result<String<MAX_B64_LEN>, Base64Error> {
    let mut buf = [0u8; MAX_B64_LEN];
    let len = STANDARD
        .encode_slice(frame, &mut buf[..])
        .map_err(|_| Base64Error)?;
    let bytes = Vec::<u8, MAX_B64_LEN>::from_slice(&buf[..len]).map_err(|_| Base64Error)?;
    String::from_utf8(bytes).map_err(|_| Base64Error)
}

fn render_body(message: &RenderedMessage) -> String<MAX_BODY_LEN> {
    let mut body = String::new();
    for (i, line) in message.lines.iter().enumerate() {
        if i > 0 {
            let _ = body.push('\n');
        }
        let _ = body.push_str(line);
    }
    body
}

/// Binds the Node Controller to whatever the host app framework calls it
/// with. Owns the two adaptor ids the original source tracks as
/// `lprsID`/`buttonsID`, plus this app's own id (the "from" on every
/// outbound status/user-message envelope, same role as the source's
/// `self.id`).
pub struct Adapter {
    own_id: HostId,
    lprs_id: Option<HostId>,
    buttons_id: Option<HostId>,
}

impl Adapter {
    pub fn new(own_id: HostId) -> Self {
        Self {
            own_id,
            lprs_id: None,
            buttons_id: None,
        }
    }

    pub fn lprs_id(&self) -> Option<&HostId> {
        self.lprs_id.as_ref()
    }

    pub fn buttons_id(&self) -> Option<&HostId> {
        self.buttons_id.as_ref()
    }

    /// Outbound `{status:"state", ...}` envelope (spec.md §6.2).
    pub fn state_command(&self, state: RunState) -> HostCommand {
        HostCommand::State {
            to: self.own_id.clone(),
            state,
        }
    }

    /// A collaborator announced a service characteristic (spec.md §4.6):
    /// remember its id, request a subscription with `interval: 0`. Mirrors
    /// `onAdaptorService`, which unconditionally reports `running` after
    /// handling any characteristic.
    pub fn on_service(&mut self, id: HostId, characteristic: Characteristic) -> AdapterCommands {
        match characteristic {
            Characteristic::GalvanizeButton => self.lprs_id = Some(id.clone()),
            Characteristic::Buttons => self.buttons_id = Some(id.clone()),
        }

        let mut characteristics = Vec::new();
        let _ = characteristics.push(characteristic);

        let mut commands = AdapterCommands::new();
        let _ = commands.push(HostCommand::Service {
            to: id,
            characteristics,
        });
        let _ = commands.push(self.state_command(RunState::Running));
        commands
    }

    fn translate(&self, commands: &Commands) -> AdapterCommands {
        let mut out = AdapterCommands::new();
        for command in commands {
            match command {
                Command::Transmit(data) => match self.lprs_id.clone() {
                    Some(to) => {
                        let _ = out.push(HostCommand::Transmit {
                            to,
                            data: data.clone(),
                        });
                    }
                    None => warn!("transmit requested before galvanize_button adaptor id is known"),
                },
                Command::Render(message) => {
                    let _ = out.push(HostCommand::UserMessage {
                        to: self.own_id.clone(),
                        body: render_body(message),
                    });
                }
            }
        }
        out
    }

    /// A `buttons` data event: `{leftButton, timeStamp}` (spec.md §4.6).
    pub fn on_button<H, S>(
        &mut self,
        left_button: u8,
        timestamp: TimeMs,
        node: &mut NodeController<H>,
        scheduler: &mut S,
        rng: &mut impl RngCore,
    ) -> AdapterCommands
    where
        H: Copy + Eq,
        S: Scheduler<Handle = H>,
    {
        let commands = node.on_button(left_button == 1, timestamp, scheduler, rng);
        self.translate(&commands)
    }

    /// A `galvanize_button` data event carrying an already base64-decoded
    /// frame (spec.md §4.6). Applies I5's `radioOn`/destination filter
    /// before handing the frame to the Node Controller; everything past
    /// that filter is the Node Controller's own responsibility.
    pub fn on_radio_data<H, S>(
        &mut self,
        data: &[u8],
        timestamp: TimeMs,
        node: &mut NodeController<H>,
        scheduler: &mut S,
        rng: &mut impl RngCore,
    ) -> AdapterCommands
    where
        H: Copy + Eq,
        S: Scheduler<Handle = H>,
    {
        let frame = match codec::decode(data) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("dropping malformed radio frame: {:?}", err);
                return AdapterCommands::new();
            }
        };

        let accepted: [NodeAddress; 3] = [node.node_address(), BEACON_ADDRESS, GRANT_ADDRESS];
        if !node.radio_on() || !accepted.contains(&frame.destination) {
            debug!("dropping frame: radio off or destination not accepted (I5)");
            return AdapterCommands::new();
        }

        let commands = node.on_radio_frame(&frame, timestamp, scheduler, rng);
        self.translate(&commands)
    }

    /// `searchID` fired (spec.md §4.5). Timer callbacks carry no host
    /// envelope of their own, but whatever they make the Node Controller
    /// do still needs translating, so every timer dispatch is routed
    /// through the adapter the same way host events are.
    pub fn on_search_timeout<H: Copy + Eq>(
        &self,
        timestamp: TimeMs,
        node: &mut NodeController<H>,
    ) -> AdapterCommands {
        self.translate(&node.on_search_timeout(timestamp))
    }

    /// `revertID` fired (spec.md §3 `revertMessage`).
    pub fn on_revert_timeout<H: Copy + Eq>(
        &self,
        timestamp: TimeMs,
        node: &mut NodeController<H>,
    ) -> AdapterCommands {
        self.translate(&node.on_revert_timeout(timestamp))
    }

    /// `waitingID` fired (spec.md §4.2).
    pub fn on_waiting_timeout<H, S>(
        &self,
        timestamp: TimeMs,
        node: &mut NodeController<H>,
        scheduler: &mut S,
        rng: &mut impl RngCore,
    ) -> AdapterCommands
    where
        H: Copy + Eq,
        S: Scheduler<Handle = H>,
    {
        self.translate(&node.on_waiting_timeout(timestamp, scheduler, rng))
    }

    /// The recurring `reconnect` timer (spec.md §4.4).
    pub fn on_reconnect_timeout<H, S>(
        &self,
        timestamp: TimeMs,
        node: &mut NodeController<H>,
        scheduler: &mut S,
    ) -> AdapterCommands
    where
        H: Copy + Eq,
        S: Scheduler<Handle = H>,
    {
        self.translate(&node.on_reconnect_timeout(timestamp, scheduler))
    }

    /// `wakeupID` fired (spec.md §4.4).
    pub fn on_wakeup_timeout<H: Copy + Eq>(&self, node: &mut NodeController<H>) -> AdapterCommands {
        self.translate(&node.on_wakeup_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use galvanize_api::TimerKind;

    #[derive(Default)]
    struct FakeScheduler {
        next_handle: u32,
        scheduled: HashMap<u32, (u64, TimerKind)>,
    }

    impl Scheduler for FakeScheduler {
        type Handle = u32;
        fn schedule_after(&mut self, delay_ms: u64, timer: TimerKind) -> u32 {
            self.next_handle += 1;
            self.scheduled.insert(self.next_handle, (delay_ms, timer));
            self.next_handle
        }
        fn cancel(&mut self, handle: u32) {
            self.scheduled.remove(&handle);
        }
    }

    fn own_id() -> HostId {
        HostId::try_from("galvanize_control").unwrap()
    }

    #[test]
    fn base64_round_trips_a_frame() {
        let frame = codec::encode(0x1234, 0xFFFF, crate::Function::Beacon, &[]);
        let encoded = encode_radio_data(&frame).unwrap();
        let decoded = decode_radio_data(&encoded).unwrap();
        assert_eq!(decoded.as_slice(), frame.as_slice());
    }

    #[test]
    fn on_service_remembers_id_and_reports_running() {
        let mut adapter = Adapter::new(own_id());
        let id = HostId::try_from("adaptor-1").unwrap();
        let commands = adapter.on_service(id.clone(), Characteristic::GalvanizeButton);
        assert_eq!(adapter.lprs_id(), Some(&id));
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[1], HostCommand::State { state: RunState::Running, .. }));
    }

    #[test]
    fn transmit_without_known_lprs_id_is_dropped() {
        let adapter = Adapter::new(own_id());
        let mut commands = Commands::new();
        let _ = commands.push(Command::Transmit(heapless::Vec::new()));
        assert!(adapter.translate(&commands).is_empty());
    }

    #[test]
    fn button_press_translates_to_host_commands() {
        let mut adapter = Adapter::new(own_id());
        adapter.lprs_id = Some(HostId::try_from("adaptor-1").unwrap());
        let mut node = NodeController::<u32>::default();
        let mut scheduler = FakeScheduler::default();
        let mut rng = rand::thread_rng();

        adapter.on_button(1, 0, &mut node, &mut scheduler, &mut rng);
        let commands = adapter.on_button(0, 3_100, &mut node, &mut scheduler, &mut rng);
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], HostCommand::UserMessage { .. }));
    }

    #[test]
    fn radio_frame_rejected_when_radio_is_off() {
        let mut adapter = Adapter::new(own_id());
        let mut node = NodeController::<u32>::default();
        let mut scheduler = FakeScheduler::default();
        let mut rng = rand::thread_rng();
        assert!(!node.radio_on());

        let beacon = codec::encode(BEACON_ADDRESS, 0x1234, crate::Function::Beacon, &[]);
        let commands = adapter.on_radio_data(&beacon, 0, &mut node, &mut scheduler, &mut rng);
        assert!(commands.is_empty());
    }
}

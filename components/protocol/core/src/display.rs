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

//! Display Controller & Config Processor (spec.md §4.3).
//!
//! Holds the four user-configurable message slots plus the fixed system
//! messages, and applies the `config` frame payload grammar. Analogous in
//! spirit to the teacher's `Context`: the one piece of runtime state that
//! mutates in place rather than being rebuilt, here driven entirely
//! through [`Display::apply_config`] rather than `Context::reset`.

use galvanize_api::{Font, RenderedMessage, MAX_LINE_LEN};
use heapless::{String, Vec};

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::{debug, error, info, warn};
#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
use log::{debug, error, info, warn};

/// Identifies one display slot: the four runtime-configurable slots plus
/// the fixed system slots (spec.md §3). `SuccessfulConnect`/`FailedConnect`
/// are carried from the original source (see SPEC_FULL.md §C.2) for
/// completeness; no transition in this core renders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKey {
    M1,
    M2,
    M3,
    M4,
    Initial,
    Search,
    SearchFailed,
    Connecting,
    SuccessfulConnect,
    FailedConnect,
    CommsProblem,
    CommsFailed,
}

const NUM_SLOTS: usize = 12;

impl SlotKey {
    const fn idx(self) -> usize {
        match self {
            SlotKey::M1 => 0,
            SlotKey::M2 => 1,
            SlotKey::M3 => 2,
            SlotKey::M4 => 3,
            SlotKey::Initial => 4,
            SlotKey::Search => 5,
            SlotKey::SearchFailed => 6,
            SlotKey::Connecting => 7,
            SlotKey::SuccessfulConnect => 8,
            SlotKey::FailedConnect => 9,
            SlotKey::CommsProblem => 10,
            SlotKey::CommsFailed => 11,
        }
    }

    /// Map a 1..=4 `DISPLAY_INDEX`/slot nibble to the corresponding
    /// user-configurable slot (spec.md §4.3).
    pub(crate) fn message_slot(nibble: u8) -> Option<SlotKey> {
        match nibble {
            1 => Some(SlotKey::M1),
            2 => Some(SlotKey::M2),
            3 => Some(SlotKey::M3),
            4 => Some(SlotKey::M4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    lines: [String<MAX_LINE_LEN>; 3],
    font: Font,
    active_lines: u8,
}

impl Slot {
    fn fixed(lines: [&str; 3], font: Font, active_lines: u8) -> Self {
        Self {
            lines: [
                String::try_from(lines[0]).unwrap(),
                String::try_from(lines[1]).unwrap(),
                String::try_from(lines[2]).unwrap(),
            ],
            font,
            active_lines,
        }
    }

    fn blank() -> Self {
        Self {
            lines: Default::default(),
            font: Font::Small,
            active_lines: 0,
        }
    }
}

fn string_from_bytes(bytes: &[u8]) -> String<MAX_LINE_LEN> {
    let mut out = String::new();
    match core::str::from_utf8(bytes) {
        Ok(text) => {
            for ch in text.chars() {
                if out.push(ch).is_err() {
                    break;
                }
            }
        }
        Err(_) => warn!("config line text is not valid utf-8, dropping"),
    }
    out
}

fn font_from_nibble(nibble: u8) -> Option<Font> {
    match nibble {
        1 => Some(Font::Small),
        2 => Some(Font::Medium),
        3 => Some(Font::Large),
        _ => None,
    }
}

/// What applying a config frame asked the caller to do in addition to
/// storing the change (spec.md §4.3 "force display slot").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// The change was stored; nothing else to do besides acking.
    Applied,
    /// A `D0`-class config frame asked for an immediate render.
    Render(SlotKey),
}

/// A `config` frame whose `configType` byte does not match any known
/// grammar (spec.md §7 `UnknownConfigType`): logged and dropped, no ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownConfigType;

pub struct Display {
    slots: [Slot; NUM_SLOTS],
    /// Whether a cancelled service call shows a transient `m3` screen
    /// before reverting to `m1` (spec.md §3 `revertMessage`).
    pub revert_message: bool,
}

impl Default for Display {
    fn default() -> Self {
        let mut slots: [Slot; NUM_SLOTS] = [
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
            Slot::blank(),
        ];
        slots[SlotKey::Initial.idx()] = Slot::fixed(
            ["Press button to connect", "to a network", ""],
            Font::Medium,
            2,
        );
        slots[SlotKey::Search.idx()] = Slot::fixed(["Searching for network", "", ""], Font::Medium, 1);
        slots[SlotKey::SearchFailed.idx()] = Slot::fixed(
            ["No network found", "Press to continue", ""],
            Font::Medium,
            2,
        );
        slots[SlotKey::Connecting.idx()] = Slot::fixed(
            ["Trying to connect to network", "Please wait", ""],
            Font::Medium,
            2,
        );
        slots[SlotKey::SuccessfulConnect.idx()] =
            Slot::fixed(["Network connection successful", "", ""], Font::Medium, 1);
        slots[SlotKey::FailedConnect.idx()] =
            Slot::fixed(["Network connection failed", "", ""], Font::Medium, 1);
        slots[SlotKey::CommsProblem.idx()] = Slot::fixed(
            ["Communication problem", "Temporarily not in use", ""],
            Font::Medium,
            2,
        );
        slots[SlotKey::CommsFailed.idx()] = Slot::fixed(
            ["Communication problem", "Button not in use", ""],
            Font::Medium,
            2,
        );
        Self {
            slots,
            revert_message: true,
        }
    }
}

impl Display {
    /// Render a slot down to its active lines (spec.md §4.3).
    pub fn render(&self, key: SlotKey) -> RenderedMessage {
        let slot = &self.slots[key.idx()];
        let mut lines = Vec::new();
        for line in slot.lines.iter().take(slot.active_lines as usize) {
            let _ = lines.push(line.clone());
        }
        RenderedMessage {
            lines,
            font: slot.font,
        }
    }

    pub fn number_lines(&self, key: SlotKey) -> u8 {
        self.slots[key.idx()].active_lines
    }

    /// Apply a `config` frame payload (spec.md §4.3 grammar).
    pub fn apply_config(&mut self, payload: &[u8]) -> Result<ConfigOutcome, UnknownConfigType> {
        let config_type = *payload.first().ok_or(UnknownConfigType)?;

        if config_type < 0x44 {
            let length = *payload.get(1).ok_or(UnknownConfigType)? as usize;
            let slot_nibble = (config_type >> 4) & 0x0F;
            let line_nibble = config_type & 0x0F;
            let slot = SlotKey::message_slot(slot_nibble).ok_or(UnknownConfigType)?;
            if !(1..=3).contains(&line_nibble) {
                return Err(UnknownConfigType);
            }
            let text = payload.get(2..2 + length).ok_or(UnknownConfigType)?;
            self.slots[slot.idx()].lines[(line_nibble - 1) as usize] = string_from_bytes(text);
            Ok(ConfigOutcome::Applied)
        } else if config_type & 0xF0 == 0xF0 {
            let info = *payload.get(1).ok_or(UnknownConfigType)?;
            let font = font_from_nibble((info & 0xF0) >> 4).ok_or(UnknownConfigType)?;
            let number_lines = info & 0x0F;
            if number_lines > 3 {
                return Err(UnknownConfigType);
            }
            let slot = SlotKey::message_slot(config_type & 0x0F).ok_or(UnknownConfigType)?;
            self.slots[slot.idx()].font = font;
            self.slots[slot.idx()].active_lines = number_lines;
            Ok(ConfigOutcome::Applied)
        } else if config_type & 0xF0 == 0xB0 {
            let byte1 = *payload.get(1).ok_or(UnknownConfigType)?;
            self.revert_message = byte1 & 1 != 0;
            Ok(ConfigOutcome::Applied)
        } else if config_type & 0xF0 == 0xD0 {
            let index = *payload.get(1).ok_or(UnknownConfigType)?;
            let slot = SlotKey::message_slot(index).ok_or(UnknownConfigType)?;
            Ok(ConfigOutcome::Render(slot))
        } else {
            Err(UnknownConfigType)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_slots_match_source_defaults() {
        let display = Display::default();
        assert!(display.revert_message);
        assert_eq!(display.number_lines(SlotKey::Initial), 2);
        assert_eq!(display.number_lines(SlotKey::M1), 0);
    }

    #[test]
    fn line_write_updates_slot() {
        let mut display = Display::default();
        // configType 0x12: m1, line 2; length 7; text "Hello!!"
        let mut payload = Vec::<u8, 16>::new();
        payload.extend_from_slice(&[0x12, 7]).unwrap();
        payload.extend_from_slice(b"Hello!!").unwrap();
        assert_eq!(display.apply_config(&payload), Ok(ConfigOutcome::Applied));

        // line count defaults to 0, so render() clamps to nothing until
        // formatting is configured too (spec.md scenario 4).
        assert_eq!(display.render(SlotKey::M1).lines.len(), 0);
        display.slots[SlotKey::M1.idx()].active_lines = 2;
        assert_eq!(display.render(SlotKey::M1).lines[1], "Hello!!");
    }

    #[test]
    fn formatting_sets_font_and_line_count() {
        let mut display = Display::default();
        // configType 0xF1: m1 formatting; info 0x23 -> font large(3)... wait
        // high nibble 2 = medium, low nibble 3 = 3 lines.
        let payload = [0xF1u8, 0x23];
        assert_eq!(display.apply_config(&payload), Ok(ConfigOutcome::Applied));
        assert_eq!(display.number_lines(SlotKey::M1), 3);
    }

    #[test]
    fn clearability_flag() {
        let mut display = Display::default();
        assert_eq!(display.apply_config(&[0xB0, 0x00]), Ok(ConfigOutcome::Applied));
        assert!(!display.revert_message);
        assert_eq!(display.apply_config(&[0xB0, 0x01]), Ok(ConfigOutcome::Applied));
        assert!(display.revert_message);
    }

    #[test]
    fn force_display_requests_render() {
        let mut display = Display::default();
        assert_eq!(
            display.apply_config(&[0xD0, 0x02]),
            Ok(ConfigOutcome::Render(SlotKey::M2))
        );
    }

    #[test]
    fn unknown_config_type_is_rejected() {
        let mut display = Display::default();
        assert_eq!(display.apply_config(&[0x55, 0x00]), Err(UnknownConfigType));
        assert_eq!(display.apply_config(&[]), Err(UnknownConfigType));
    }
}

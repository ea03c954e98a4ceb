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

//! Macros for generating parseable event log lines, same `$`-prefixed,
//! semicolon-delimited shape as the teacher crate's `event_log.rs` so the
//! simulator's CSV writer can parse this core's log output unchanged.

#[macro_export]
macro_rules! event_log {
    ($time:expr, $kind:expr, $content:expr) => {
        info!("${};{};{}", $time, $kind, $content);
    };
}

#[macro_export]
macro_rules! event_log_node_state {
    ($time:expr, $state:expr) => {
        event_log!($time, "node_state", $state);
    };
}

#[macro_export]
macro_rules! event_log_send_state {
    ($time:expr, $attempt:expr) => {
        event_log!($time, "send_attempt", $attempt);
    };
}

#[macro_export]
macro_rules! event_log_power {
    ($time:expr, $radio_on:expr) => {
        event_log!($time, "radio_on", $radio_on);
    };
}

#[macro_export]
macro_rules! event_log_msg {
    ($time:expr, $content:expr) => {
        event_log!($time, "message", $content);
    };
}

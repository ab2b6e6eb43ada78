// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod event;
pub mod message;
pub mod server;
pub mod session;
pub mod stream;
pub mod upstream;

// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Continuous fuzz-campaign orchestration for forge invariant suites: a
//! perpetual (test x configuration) grid of runner invocations, structured
//! failure capture, and offline counterexample reproduction.

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod forge;
pub mod repro;
pub mod scheduler;

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching core for distribution metrics recorded inside a serverless function.
//!
//! Producers hand [`metric::Distribution`] observations to a [`processor::Processor`],
//! which merges them into an open [`batch::Batch`]. A background task closes the batch on
//! every tick of the injected [`time::TimeService`], when the batch grows past its size
//! limit, or on [`processor::Processor::stop`], and hands it to a [`retry::Retrier`] that
//! ships it through a [`client::Client`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod api_key;
pub mod batch;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod logger;
pub mod metric;
pub mod processor;
pub mod retry;
pub mod time;

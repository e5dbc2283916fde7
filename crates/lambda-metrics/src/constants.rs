// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// How often the open batch is closed and shipped when nothing else triggers a flush.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15);

/// Points held by the open batch before an out-of-cycle flush is requested.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Total delivery attempts per batch when retries are enabled.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_SITE: &str = "datadoghq.com";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const DISTRIBUTION_POINTS_PATH: &str = "/api/v1/distribution_points";

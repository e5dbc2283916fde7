// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Lifecycle misuse of a [`crate::processor::Processor`].
///
/// Delivery outcomes never surface here; they are absorbed by the retrier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    #[error("Processor already started")]
    AlreadyStarted,

    #[error("Processor stopped")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProcessorError::AlreadyStarted.to_string(),
            "Processor already started"
        );
        assert_eq!(ProcessorError::Stopped.to_string(), "Processor stopped");
        let error = ConfigError::Invalid("DD_SITE cannot be empty".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: DD_SITE cannot be empty"
        );
    }
}

// SPDX-License-Identifier: CEPL-1.0
//! Structured sink for driver and validation-layer messages.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Verbose => "verbose",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Receives diagnostics from the graphics driver.
///
/// Injected at startup; the Vulkan debug messenger forwards every message it
/// receives here instead of printing from inside the callback.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, severity: Severity, code: i32, source: &str, message: &str);
}

/// Forwards diagnostics to `tracing` under the `validation` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, severity: Severity, code: i32, source: &str, message: &str) {
        match severity {
            Severity::Error => tracing::error!(target: "validation", code, source, "{message}"),
            Severity::Warning => tracing::warn!(target: "validation", code, source, "{message}"),
            Severity::Info => tracing::info!(target: "validation", code, source, "{message}"),
            Severity::Verbose => tracing::trace!(target: "validation", code, source, "{message}"),
        }
    }
}

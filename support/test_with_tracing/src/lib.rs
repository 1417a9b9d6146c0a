// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A `#[test]` replacement that routes `tracing` output from the test to the
//! test harness. Import it with `use test_with_tracing::test;` in place of the
//! built-in attribute.

#[cfg(test)]
extern crate self as test_with_tracing;

pub use test_with_tracing_macro::test;
use tracing::metadata::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Installs the process-wide subscriber. Called by every test generated with
/// [`test`]; later calls do nothing.
///
/// `RUST_LOG` selects targets with the `Targets` syntax. Without it, or if it
/// does not parse, everything at `debug` and above is shown.
#[doc(hidden)]
pub fn init() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let targets = std::env::var("RUST_LOG")
            .ok()
            .and_then(|var| var.parse::<Targets>().ok())
            .unwrap_or_else(|| Targets::new().with_default(LevelFilter::DEBUG));
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_test_writer()
            .with_max_level(LevelFilter::TRACE)
            .finish()
            .with(targets)
            .init();
    });
}

//! Aggregate release and changelog data for the Bluefin catalog.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use bluefin_releases_lib::{Host, run};
use std::io::Write;
use std::io::{stderr, stdout};

/// Host backed by the real process streams.
#[derive(Debug, Clone, Default)]
pub struct RealHost;

#[cfg_attr(coverage_nightly, coverage(off))]
impl Host for RealHost {
    fn output(&mut self) -> impl Write {
        stdout()
    }

    fn error(&mut self) -> impl Write {
        stderr()
    }

    fn exit(&mut self, code: i32) {
        std::process::exit(code);
    }
}

#[tokio::main]
#[cfg_attr(coverage_nightly, coverage(off))]
async fn main() {
    let mut host = RealHost;
    if let Err(e) = run(&mut host, std::env::args()).await {
        let _ = writeln!(host.error(), "error: {e:#}");
        host.exit(1);
    }
}

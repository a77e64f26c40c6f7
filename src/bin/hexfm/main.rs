//! hexfm - plays a short FM arpeggio through the default output device
//!
//! Run with: cargo run
//! Set RUST_LOG=hexfm=debug to watch table commits.

mod app;

use app::Demo;
use tracing_subscriber::EnvFilter;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    Demo::new()
        .bpm(132.0)
        .notes(&[57, 60, 64, 67, 69, 67, 64, 60])
        .bars(4)
        .run()
}

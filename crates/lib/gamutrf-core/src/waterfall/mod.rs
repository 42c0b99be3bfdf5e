//! Rolling waterfall history and the statistics drawn from it.

mod config;
mod state;

pub use config::WaterfallConfig;
pub use state::{ScanEntry, WaterfallState, YTick, format_scan_time};

//! Browser automation layer.
//!
//! Middleman pages that render their coupon button with JavaScript, and the
//! enrollment flow itself, are driven through headless Chrome. The manager
//! owns the browser process and hands out tabs; `PageDriver` wraps one tab
//! with the polling wait/click/read primitives the strategies and the
//! enrollment state machine are built on.
//!
//! A browser session has shared navigation state (current page, current tab),
//! so a session is owned by exactly one component at a time: the pipeline's
//! browser strategies use one headless session during resolution, and the
//! enroller provisions its own session afterwards.

pub mod config;
pub mod driver;
pub mod manager;

pub use config::BrowserConfig;
pub use driver::PageDriver;
pub use manager::{BrowserError, BrowserManager};

//! Live reload engine.
//!
//! Served files are recorded per page in a [`graph::ResourceGraph`]. When a
//! page opens its reload channel, the recorded files are watched through a
//! shared, reference-counted [`pool::WatcherPool`] and the first relevant
//! change is pushed to the tab over Server-Sent Events. Watches nobody needs
//! any more are closed by a periodic sweep.

mod graph;
mod manager;
mod pool;
mod sse;
mod subscription;
mod sweeper;
mod watch;

pub use manager::LiveReloadOptions;
pub(crate) use manager::LiveReloadManager;
pub(crate) use sse::sse_handler;

//! The coordinator's HTTP ingress: a boss thread that accepts TCP
//! connections and a fixed pool of worker threads that parse, dispatch,
//! and answer them against a [`blobcoord_client::Coordinator`].
//!
//! This crate deliberately does not depend on `mio`. `kimberlite-server`
//! uses `mio` to multiplex many connections on one thread per core; here
//! each worker thread instead owns a single-threaded tokio runtime so it
//! can `.await` the coordinator's async `get_*` calls, and handling one
//! blocking `std::net::TcpStream` connection at a time on that thread is
//! simple and sufficient at this ingress's concurrency (bounded by
//! `worker_thread_count`). Moving an `mio`-accepted, non-blocking socket
//! into a tokio `Runtime` safely needs `tokio::net::TcpStream::from_std`,
//! which is safe too — but mixing mio's edge-triggered readiness model
//! with tokio's own reactor on the same fd buys nothing once tokio is
//! already driving the async side, so the boss thread just uses a plain
//! blocking `TcpListener` instead and hands workers blocking streams.

pub mod connection;
pub mod error;
pub mod handler;
pub mod health;
pub mod http;
pub mod metrics;
pub mod server;
pub mod worker_pool;

pub use error::{ServerError, ServerResult};
pub use health::HealthState;
pub use metrics::Metrics;
pub use server::{Server, ShutdownHandle};

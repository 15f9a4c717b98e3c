//! Notification backends. The `NotifyBackend` trait lives in
//! `rollcall-common`; these are the implementations the daemon wires up.

pub mod memory;
pub mod noop;
pub mod webhook;

pub use memory::MemoryBackend;
pub use noop::NoopBackend;
pub use webhook::WebhookBackend;

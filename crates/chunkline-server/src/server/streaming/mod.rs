//! Bridges core pipelines onto HTTP response bodies.
//!
//! Each response is backed by an in-memory duplex pipe: a spawned task writes
//! framed bytes into one end and hyper streams the other end to the client.
//! A write only fails once the client has gone away, which aborts the task.

pub mod coordinator;
pub mod raw;

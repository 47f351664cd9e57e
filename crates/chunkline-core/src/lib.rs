#![doc = include_str!("../README.md")]

mod common;
pub mod dispatch;
pub mod frame;
pub mod loader;
pub mod sniff;
pub mod store;
pub mod wire;

pub use common::*;
pub use dispatch::{Dispatcher, ResultStream, Strategy};
pub use frame::{FrameState, FrameStats, FrameWriter, RawChunkWriter, write_chunked};
pub use loader::Loader;
pub use store::{FsStore, MemoryStore, ResourceStore};
pub use types::{EncodedChunk, LoadedResource, ResourceId};
pub use wire::parse_records;

//! Background link service and its write buffer pool

pub mod pool;
mod sdlc;

pub use pool::{WriteBuffer, WritePool, WRITE_BUFFER_SIZE};
pub use sdlc::{NoopServiceEvents, SdlcService, ServiceEvents};

//! # biu-sdlc
//!
//! SDLC serial link to traffic-signal field devices (BIU/SIU and CMU).

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Frame codec (byte stuffing + CRC16) and a streaming frame assembler
//! - Request encoder and typed response decoder for the message catalog
//! - Serial connection with paced reconnects
//! - A duplex background service with a bounded write queue
//! - A static status polling executor
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use biu_sdlc::prelude::*;
//!
//! let config = SdlcConfig::load("sdlc.json".as_ref())?;
//! let service = Arc::new(SdlcService::with_system_port(config, SdlcContext::default()));
//! service.start()?;
//!
//! let executor = Executor::new(service.clone()).start()?;
//! // ...
//! println!("{:?}", executor.static_status());
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod executor;
pub mod metrics;
pub mod protocol;
pub mod service;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::audit::{AuditAction, AuditRecord, AuditSink, MemoryAudit, TracingAudit};
    pub use crate::config::{DataBits, Parity, SdlcConfig, SerialSettings, StopBits};
    pub use crate::context::SdlcContext;
    pub use crate::executor::{Executor, ExecutorHandle, Metronome, StatusHandler};
    pub use crate::metrics::{Counter, Metrics, MetricsSink, NoopMetrics};
    pub use crate::protocol::{
        BiuFlags, BiuMask, CmuFrame, CodecError, ConnectionEvents, ConnectionState, DynamicStatus,
        FrameAssembler, FrameCodec, Identifier, PortOpener, ProtocolError, RequestEncoder,
        ResponseDecoder, SerialConnection, SerialStream, StaticStatus, StaticStatusMode,
    };
    pub use crate::service::{SdlcService, ServiceEvents, WritePool};
}

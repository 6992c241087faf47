//! # rift-server
//!
//! The dev server behind `rift dev`: a fixed-order middleware pipeline over a
//! shared [`ServerContext`], a [`ContentStore`] that lets unsaved editor
//! buffers shadow disk, and a [`ChangeWatcher`] that pushes hot updates only
//! for changes the [`ValidityGate`] accepts.
//!
//! ## Example
//!
//! ```no_run
//! use rift_config::ResolvedConfig;
//! use rift_server::{DevServer, StageRegistry};
//!
//! # async fn run() -> rift_server::Result<()> {
//! let config = ResolvedConfig::minimal("/path/to/project".into(), "development", Default::default());
//! let server = DevServer::new(config, &StageRegistry::new())?;
//! server.serve(([127, 0, 0, 1], 3000).into()).await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod content;
pub mod context;
pub mod error;
pub mod gate;
pub mod hmr;
pub mod pipeline;
pub mod request;
pub mod resolver;
pub mod server;
pub mod sfc;
pub mod watcher;

pub use bridge::{BridgeMessage, EditorBufferBridge};
pub use content::{BufferOverlay, ContentStore, DiskReader, ReadInterceptor};
pub use context::{InstalledMiddleware, ServerContext};
pub use error::{ContentReadError, InstallError, Result, ServerError};
pub use gate::{GateDecision, ValidityGate};
pub use hmr::{HmrClients, HmrMessage, ModuleKind, ModuleRegistry};
pub use pipeline::{Middleware, Next, Pipeline, PipelineBuilder, Stage, StageRegistry, build};
pub use request::{DevRequest, DevResponse, ResponseBody};
pub use resolver::PathResolver;
pub use server::DevServer;
pub use watcher::{ChangeEvent, ChangeOrigin, ChangeWatcher, WatcherState};

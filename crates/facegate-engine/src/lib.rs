//! Facegate session runtime.
//!
//! Hosts a [`facegate_core::SessionController`] on a dedicated engine thread,
//! loads the landmark extractor, replays recorded sessions, and submits the
//! final capture to the verification backend.

pub mod backend;
pub mod config;
pub mod engine;
pub mod models;
pub mod replay;

pub use backend::{encode_jpeg, Verdict, VerificationClient};
pub use config::Config;
pub use engine::{spawn_engine, EngineError, EngineHandle, EngineStatus, FrameReport};
pub use models::{load_extractor, ExtractorLoader};
pub use replay::{RecordedDecoder, RecordedExtractor, Replay, ReplayError, ReplayFrame, Trace, TraceFrame};

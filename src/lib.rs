//! Decoder for milo/rnd scene archives.
//!
//! [`archive::Archive`] splits a file into typed entries, [`session::DecodeSession`]
//! routes each one to its decoder and hands the results to a [`sink::SceneSink`].

pub mod anim;
pub mod archive;
pub mod config;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod material;
pub mod mesh;
pub mod packed;
pub mod platform;
pub mod session;
pub mod sink;
pub mod skeleton;
pub mod texture;

pub use archive::{find_archives, Archive, ArchiveFile};
pub use config::ImportOptions;
pub use error::{DecodeError, Result};
pub use platform::Platform;
pub use session::{DecodeReport, DecodeSession};
pub use sink::{SceneRecorder, SceneSink};

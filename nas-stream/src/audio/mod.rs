//! Collaborator boundaries and reference implementations
//!
//! - [`source`]: byte source trait and its event sender
//! - [`parser`]: packet parser trait
//! - [`output`]: renderer trait and its event sender
//! - [`http`], [`framing`], [`clock`]: implementations used by the CLI

pub mod clock;
pub mod framing;
pub mod http;
pub mod output;
pub mod parser;
pub mod source;

pub use clock::ClockRenderer;
pub use framing::FrameParser;
pub use http::HttpByteSource;
pub use output::{RenderState, Renderer, RendererEvent, RendererEvents};
pub use parser::{PacketParser, ParserEvent};
pub use source::{ByteSource, SourceEvent, SourceEvents};

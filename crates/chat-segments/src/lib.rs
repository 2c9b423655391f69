//! Incremental segment parser for streamed chat messages.
//!
//! Text produced by a language model arrives in chunks split at arbitrary
//! positions. This crate turns that stream into an ordered list of typed
//! segments: plain text runs interleaved with well-known inline tags such
//! as `<chart>...</chart>`, suitable for progressive rendering in a chat
//! UI. Unknown tags, half-seen tag names, and tags that never close all
//! degrade to literal text; no input byte is ever lost or duplicated.
//!
//! The pieces:
//!
//!  - [`TagRegistry`] names the recognized tags and classifies each as
//!    renderable or metadata.
//!  - [`SegmentParser::parse`] consumes appended text and mutates a
//!    message's [`SegmentList`], returning the [`ModifiedSet`] of segments
//!    the host needs to repaint.
//!  - [`SegmentParser::finalize`] settles whatever is still open when the
//!    stream ends.
//!  - [`MetadataDispatcher`] applies host-registered handlers to completed
//!    metadata segments exactly once.

mod finalizer;
mod metadata;
mod segment;
mod segment_parser;
mod tag_registry;

pub use metadata::{HandlerResult, MessageContext, MetadataDispatcher, MetadataHandler};
pub use segment::{
    MetadataSegment, ModifiedSet, Segment, SegmentId, SegmentList, SegmentStatus, TagSegment,
    TextSegment,
};
pub use segment_parser::SegmentParser;
pub use tag_registry::{
    is_valid_tag_name, RegistryError, RegistrySnapshot, TagKind, TagRegistry, TEXT_SEGMENT_NAME,
};

use rustc_hash::FxHashMap;

use crate::segment::{MetadataSegment, Segment, SegmentList, SegmentStatus};

/// Per-message context handed to metadata handlers alongside the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub message_id: Box<str>,
}

impl MessageContext {
    pub fn new(message_id: &str) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }
}

/// What a metadata handler reports back. The dispatcher logs failures and
/// moves on; it never retries.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Handler applied to a completed metadata segment.
pub type MetadataHandler = Box<dyn Fn(&MetadataSegment, &MessageContext) -> HandlerResult + Send + Sync>;

/// Applies metadata handlers to completed metadata segments exactly once.
///
/// The parser only classifies segments; the host runs a dispatch pass after
/// each successful parse call. A segment's one-shot `handler_invoked`
/// marker is set the moment its handler is chosen, before the handler's
/// outcome is known, so a segment is never delivered twice even when the
/// handler fails or the message is re-rendered. A completed metadata
/// segment whose tag has no handler yet is left unmarked and picked up by
/// a later pass if a handler appears.
#[derive(Default)]
pub struct MetadataDispatcher {
    handlers: FxHashMap<Box<str>, MetadataHandler>,
}

impl MetadataDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the handler for `tag`, replacing any previous one.
    pub fn on<F>(&mut self, tag: &str, handler: F)
    where
        F: Fn(&MetadataSegment, &MessageContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.insert(tag.into(), Box::new(handler));
    }

    /// Removes the handler for `tag`. Safe when none is installed.
    pub fn remove(&mut self, tag: &str) {
        self.handlers.remove(tag);
    }

    pub fn has_handler(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Walks the segment list and invokes handlers for every completed,
    /// not-yet-delivered metadata segment. Returns how many handlers ran.
    pub fn dispatch(&self, segments: &mut SegmentList, context: &MessageContext) -> usize {
        let mut invoked = 0;

        for segment in segments.segments_mut() {
            let Segment::Metadata(metadata) = segment else {
                continue;
            };
            if metadata.status() != SegmentStatus::Completed || metadata.handler_invoked() {
                continue;
            }

            let Some(handler) = self.handlers.get(metadata.tag()) else {
                log::debug!(
                    "no metadata handler for <{}> in message {}",
                    metadata.tag(),
                    context.message_id
                );
                continue;
            };

            metadata.mark_handler_invoked();
            invoked += 1;
            if let Err(error) = handler(metadata, context) {
                log::error!(
                    "metadata handler for <{}> failed on segment {} of message {}: {error}",
                    metadata.tag(),
                    metadata.id(),
                    context.message_id
                );
            }
        }

        invoked
    }
}

impl std::fmt::Debug for MetadataDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataDispatcher")
            .field("tags", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

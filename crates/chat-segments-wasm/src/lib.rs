//! Browser binding for the chat segment parser.
//!
//! Exposes one [`MessageStream`] per chat message. The JS host feeds it
//! appended text as chunks arrive, reads back the segment list by index,
//! and patches its DOM using the returned modified segment ids as keys.

use chat_segments::{ModifiedSet, Segment, SegmentList, SegmentParser, TagKind, TagRegistry};
use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// One streamed chat message and its parser state.
#[wasm_bindgen]
pub struct MessageStream {
    registry: TagRegistry,
    parser: SegmentParser,
    segments: SegmentList,
}

fn modified_ids(modified: &ModifiedSet) -> Box<[u32]> {
    modified.iter().map(|id| id.get()).collect()
}

#[wasm_bindgen]
impl MessageStream {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            registry: TagRegistry::new(),
            parser: SegmentParser::new(),
            segments: SegmentList::new(),
        }
    }

    /// Adds a recognized tag. Returns `false` for names the registry
    /// rejects (the reserved `text`, or names outside the tag grammar).
    pub fn register_tag(&mut self, name: &str, metadata: bool) -> bool {
        let kind = if metadata {
            TagKind::Metadata
        } else {
            TagKind::Renderable
        };
        self.registry.register(name, kind).is_ok()
    }

    pub fn unregister_tag(&mut self, name: &str) {
        self.registry.unregister(name);
    }

    /// Parses newly produced text. Returns the ids of the segments that
    /// were created or changed, in the order they were first touched.
    pub fn append(&mut self, text: &str) -> Box<[u32]> {
        let modified = self
            .parser
            .parse(text, &self.registry, &mut self.segments, true);
        modified_ids(&modified)
    }

    /// Ends the stream, settling any still-open segment.
    pub fn finish(&mut self) -> Box<[u32]> {
        let modified = self.parser.finalize(&self.registry, &mut self.segments);
        modified_ids(&modified)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_id(&self, index: usize) -> Option<u32> {
        self.segment(index).map(|segment| segment.id().get())
    }

    /// `"text"` or `"tag"`.
    pub fn segment_kind(&self, index: usize) -> Option<String> {
        self.segment(index).map(|segment| {
            let kind = if segment.is_text() { "text" } else { "tag" };
            kind.to_owned()
        })
    }

    pub fn segment_tag(&self, index: usize) -> Option<String> {
        self.segment(index)
            .and_then(Segment::tag)
            .map(str::to_owned)
    }

    pub fn segment_raw(&self, index: usize) -> Option<String> {
        self.segment(index).map(|segment| segment.raw().to_owned())
    }

    /// `"completed"`, `"streaming"`, or `"incomplete"`.
    pub fn segment_status(&self, index: usize) -> Option<String> {
        self.segment(index)
            .map(|segment| segment.status().as_str().to_owned())
    }

    pub fn segment_is_metadata(&self, index: usize) -> Option<bool> {
        self.segment(index).map(Segment::is_metadata)
    }

    /// The literal input consumed so far.
    pub fn reconstruct(&self) -> String {
        self.segments.reconstruct()
    }
}

impl Default for MessageStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStream {
    fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.iter().nth(index)
    }
}

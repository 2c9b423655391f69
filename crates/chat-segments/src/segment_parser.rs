use std::borrow::Cow;

use memchr::{memchr, memmem};

use crate::segment::{
    MetadataSegment, ModifiedSet, Segment, SegmentId, SegmentList, SegmentStatus, TagSegment,
    TextSegment,
};
use crate::tag_registry::{tag_name_span, RegistrySnapshot, TagKind, TagRegistry};

/// The incremental parser: turns a growing stream of model text into the
/// ordered segment list of one message.
///
/// The parser itself carries no per-message state other than a cached
/// registry snapshot; the segment list is owned by the message and borrowed
/// mutably for the duration of each call. Calls for one message must be
/// serialized by the caller; distinct messages may be parsed concurrently
/// with distinct parser values.
///
/// # Example
///
/// ```
/// use chat_segments::{SegmentList, SegmentParser, TagKind, TagRegistry};
///
/// let registry = TagRegistry::from_tags([("chart", TagKind::Renderable)]).unwrap();
/// let mut parser = SegmentParser::new();
/// let mut segments = SegmentList::new();
///
/// parser.parse("Hi <chart>", &registry, &mut segments, true);
/// parser.parse("{}</chart>!", &registry, &mut segments, false);
///
/// assert_eq!(segments.len(), 3);
/// assert_eq!(segments.reconstruct(), "Hi <chart>{}</chart>!");
/// ```
#[derive(Debug, Default)]
pub struct SegmentParser {
    snapshot: Option<RegistrySnapshot>,
}

impl SegmentParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `append`, the text newly produced since the previous call,
    /// and updates `segments` in place.
    ///
    /// `streaming` indicates whether more input is expected. When it is
    /// `false` every construct must resolve: unmatched tag openings become
    /// literal text and nothing is left streaming or incomplete.
    ///
    /// Returns the set of segments created or changed by this call so the
    /// host can patch its UI in place, keyed by segment id.
    ///
    /// `append` must not contain text that was already parsed, and must not
    /// split a multi-byte sequence (guaranteed by `&str`).
    pub fn parse(
        &mut self,
        append: &str,
        registry: &TagRegistry,
        segments: &mut SegmentList,
        streaming: bool,
    ) -> ModifiedSet {
        let stale = self
            .snapshot
            .as_ref()
            .map_or(true, |snapshot| snapshot.fingerprint() != registry.fingerprint());
        if stale {
            log::trace!(
                "rebuilding registry snapshot (fingerprint {:#018x})",
                registry.fingerprint()
            );
            self.snapshot = Some(registry.snapshot());
        }
        let snapshot = self
            .snapshot
            .as_ref()
            .expect("snapshot was refreshed above");

        /*
         * If the previous call left an open tail, reconstruct the literal
         * input that produced it and reparse it together with the new
         * text. Decisions made while the tail was only partially visible
         * (a half-seen name, a body with no closer yet) are revisited in
         * full here.
         */
        let popped = segments.pop_open_tail();
        let buffer: Cow<'_, str> = match &popped {
            None => Cow::Borrowed(append),
            Some(tail) => {
                let mut buffer = String::with_capacity(
                    tail.raw().len() + tail.tag().map_or(0, str::len) + append.len() + 4,
                );
                tail.reconstruct_into(&mut buffer);
                buffer.push_str(append);
                log::trace!("reattached open tail {} for reparse", tail.id());
                Cow::Owned(buffer)
            }
        };

        let mut scan = Scan {
            segments: &mut *segments,
            snapshot,
            streaming,
            touched: Vec::new(),
            reusable_tail: popped.as_ref().map(|tail| (tail.id(), tail.is_text())),
        };
        scan.run(&buffer);
        let Scan { touched, .. } = scan;

        /*
         * Status reevaluation. Completed tags are definitively closed and
         * incomplete segments stay provisional; everything else that was
         * created or grew settles on `streaming` only while it is the last
         * segment of an unfinished stream.
         */
        let last_id = segments.last().map(Segment::id);
        for &id in &touched {
            let is_last = Some(id) == last_id;
            let segment = segments
                .get_mut(id)
                .expect("touched segments are still present");
            match segment.status() {
                SegmentStatus::Incomplete => {}
                SegmentStatus::Completed if !segment.is_text() => {}
                _ => {
                    let status = if streaming && is_last {
                        SegmentStatus::Streaming
                    } else {
                        SegmentStatus::Completed
                    };
                    segment.set_status(status);
                }
            }
        }

        /*
         * A reattached tail that was re-created byte-for-byte identical
         * (same variant, name, raw, and status) did not change from the
         * host's point of view and is kept out of the modified set.
         */
        let mut modified = ModifiedSet::default();
        for &id in &touched {
            if let Some(original) = popped.as_ref().filter(|tail| tail.id() == id) {
                if segments.get(id) == Some(original) {
                    continue;
                }
            }
            modified.insert(id);
        }
        modified
    }
}

/// One left-to-right pass over the working buffer.
struct Scan<'a> {
    segments: &'a mut SegmentList,
    snapshot: &'a RegistrySnapshot,
    streaming: bool,

    /// Ids created or grown during this pass, in first-touch order.
    touched: Vec<SegmentId>,

    /// The popped tail's id, claimable by the first segment this pass
    /// produces when the variant family (text vs. tag) matches. A variant
    /// flip retires the id instead; retired ids are never reused.
    reusable_tail: Option<(SegmentId, bool)>,
}

impl Scan<'_> {
    fn run(&mut self, buffer: &str) {
        let bytes = buffer.as_bytes();
        let len = bytes.len();
        let mut at = 0;

        while at < len {
            let lt = match memchr(b'<', &bytes[at..]) {
                Some(found) => at + found,
                None => {
                    // Nothing left in the buffer but text.
                    self.emit_text(&buffer[at..]);
                    break;
                }
            };

            if lt > at {
                self.emit_text(&buffer[at..lt]);
            }

            /*
             * Tag names match their longest valid span after the `<`. A
             * span of zero covers the plain-text uses of `<` (as in "<3")
             * without further inspection.
             */
            let name_start = lt + 1;
            let name_len = tag_name_span(&bytes[name_start..]);
            let name_end = name_start + name_len;
            let name = &buffer[name_start..name_end];

            if name_end == len {
                /*
                 * The name runs into the end of the buffer, so nothing is
                 * decided: the next chunk may extend it, and even a name
                 * that is recognized as seen so far may grow into a
                 * different one. While streaming this is a provisional
                 * segment (possibly with an empty name, for a lone `<`).
                 * On the final call there is no next chunk and the `<` is
                 * literal text.
                 */
                if self.streaming {
                    self.push_tag(name, "", SegmentStatus::Incomplete);
                    break;
                }
                self.emit_text("<");
                at = name_start;
                continue;
            }

            let opens_tag = name_len > 0
                && b'>' == bytes[name_end]
                && self.snapshot.lookup(name).is_some();
            if !opens_tag {
                /*
                 * Rejected: an unknown name, a name terminated by anything
                 * other than `>` (whitespace included; `<chart >` does not
                 * open a tag), or no name at all. Only the `<` itself is
                 * settled as text; scanning resumes right after it since
                 * the rest may still contain tags.
                 */
                self.emit_text("<");
                at = name_start;
                continue;
            }

            /*
             * A recognized opening delimiter. The segment is complete only
             * if the exact closer appears later in the buffer; `<` inside
             * the body never opens a nested tag, so the search is a plain
             * substring match.
             */
            let body_start = name_end + 1;
            let mut closer = Vec::with_capacity(name_len + 3);
            closer.extend_from_slice(b"</");
            closer.extend_from_slice(name.as_bytes());
            closer.push(b'>');

            if let Some(found) = memmem::find(&bytes[body_start..], &closer) {
                let close_at = body_start + found;
                self.push_tag(
                    name,
                    &buffer[body_start..close_at],
                    SegmentStatus::Completed,
                );
                at = close_at + closer.len();
                continue;
            }

            if self.streaming {
                // Open tag, body still arriving.
                self.push_tag(name, &buffer[body_start..], SegmentStatus::Streaming);
                break;
            }

            // Final call with no closer in sight: the `<` is literal text.
            self.emit_text("<");
            at = name_start;
        }
    }

    /// Emits text content, growing the last segment when it is already a
    /// text segment so that no two text segments sit side by side.
    fn emit_text(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }

        if let Some(Segment::Text(text)) = self.segments.last_mut() {
            text.raw.push_str(chunk);
            let id = text.id();
            self.reusable_tail = None;
            self.touch(id);
            return;
        }

        let id = self.claim_id(true);
        self.segments.push(Segment::Text(TextSegment {
            id,
            raw: chunk.to_owned(),
            status: SegmentStatus::Streaming,
        }));
        self.touch(id);
    }

    /// Emits a tag segment, classified against the snapshot taken at the
    /// start of the call. Provisional names are classified the same way so
    /// an upgrade does not change the variant unless the name changed.
    fn push_tag(&mut self, name: &str, raw: &str, status: SegmentStatus) {
        let id = self.claim_id(false);
        let segment = match self.snapshot.lookup(name) {
            Some(TagKind::Metadata) => Segment::Metadata(MetadataSegment {
                id,
                tag: name.into(),
                raw: raw.to_owned(),
                status,
                handler_invoked: false,
            }),
            _ => Segment::Renderable(TagSegment {
                id,
                tag: name.into(),
                raw: raw.to_owned(),
                status,
            }),
        };
        self.segments.push(segment);
        self.touch(id);
    }

    fn claim_id(&mut self, text: bool) -> SegmentId {
        match self.reusable_tail.take() {
            Some((id, was_text)) if was_text == text => id,
            _ => self.segments.alloc_id(),
        }
    }

    fn touch(&mut self, id: SegmentId) {
        if !self.touched.contains(&id) {
            self.touched.push(id);
        }
    }
}

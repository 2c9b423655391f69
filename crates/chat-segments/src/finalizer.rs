use crate::segment::{ModifiedSet, Segment, SegmentList, SegmentStatus, TextSegment};
use crate::segment_parser::SegmentParser;
use crate::tag_registry::TagRegistry;

impl SegmentParser {
    /// Ends the stream for one message.
    ///
    /// Equivalent to a final `parse("", .., streaming = false)` followed by
    /// a defensive backward pass: any segment still open after the final
    /// parse is settled, with tag segments that never proved themselves
    /// rewritten as literal text preserving their id. The final parse
    /// already resolves every open construct, so the pass normally finds
    /// nothing to do.
    ///
    /// Call it once; it is safe to abandon a message without finalizing.
    pub fn finalize(
        &mut self,
        registry: &TagRegistry,
        segments: &mut SegmentList,
    ) -> ModifiedSet {
        let mut modified = self.parse("", registry, segments, false);

        let list = segments.segments_mut();
        let mut index = list.len();
        while index > 0 {
            index -= 1;
            if SegmentStatus::Completed == list[index].status() {
                break;
            }

            let id = list[index].id();
            if list[index].is_text() {
                log::trace!("finalize settled streaming text {id}");
                list[index].set_status(SegmentStatus::Completed);
                modified.insert(id);
                continue;
            }

            /*
             * An open tag segment at end of stream can no longer complete;
             * its literal reconstruction becomes text. Merging into a
             * preceding text segment keeps text coalesced.
             */
            let mut raw = String::new();
            list[index].reconstruct_into(&mut raw);
            log::trace!("finalize rewrote open tag {id} as literal text");

            if index > 0 && list[index - 1].is_text() {
                list.remove(index);
                if let Segment::Text(previous) = &mut list[index - 1] {
                    previous.raw.push_str(&raw);
                    previous.status = SegmentStatus::Completed;
                    modified.insert(previous.id());
                }
            } else {
                list[index] = Segment::Text(TextSegment {
                    id,
                    raw,
                    status: SegmentStatus::Completed,
                });
                modified.insert(id);
            }
        }

        modified
    }
}

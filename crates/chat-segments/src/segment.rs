use std::fmt;

use rustc_hash::FxHashSet;

/// Identity of one segment within its message.
///
/// Ids are assigned from a per-message counter as segments are created and
/// are never reused, even when a segment is removed and replaced during
/// reinterpretation. Within the segment list ids are strictly increasing
/// with position, which makes them a stable key for in-place UI patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentId(u32);

impl SegmentId {
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle status of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SegmentStatus {
    /// Terminal. The segment's content will not change again.
    Completed,

    /// Actively growing. The raw content may still be appended to; the
    /// segment will eventually become `Completed`.
    Streaming,

    /// Provisional. A `<` followed by a partial name has been seen but the
    /// construct has been neither proven a recognized tag nor disproven.
    /// The next parse call either upgrades it or rewrites it as text.
    Incomplete,
}

impl SegmentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            SegmentStatus::Completed => "completed",
            SegmentStatus::Streaming => "streaming",
            SegmentStatus::Incomplete => "incomplete",
        }
    }
}

/// A run of plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextSegment {
    pub(crate) id: SegmentId,
    pub(crate) raw: String,
    pub(crate) status: SegmentStatus,
}

/// A recognized renderable tag.
///
/// `raw` holds only the characters between the opening `>` and the closing
/// `</name>`; the delimiters themselves are never part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagSegment {
    pub(crate) id: SegmentId,
    pub(crate) tag: Box<str>,
    pub(crate) raw: String,
    pub(crate) status: SegmentStatus,
}

/// A recognized metadata tag.
///
/// Not displayed inline; once completed, the host applies the registered
/// metadata handler to it exactly once, tracked by the one-shot
/// `handler_invoked` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetadataSegment {
    pub(crate) id: SegmentId,
    pub(crate) tag: Box<str>,
    pub(crate) raw: String,
    pub(crate) status: SegmentStatus,
    pub(crate) handler_invoked: bool,
}

impl TextSegment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }
}

impl TagSegment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }
}

impl MetadataSegment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    pub fn handler_invoked(&self) -> bool {
        self.handler_invoked
    }

    /// Sets the one-shot dispatch marker. Setting it is irreversible.
    pub fn mark_handler_invoked(&mut self) {
        self.handler_invoked = true;
    }
}

/// One element of a parsed message: a text run, a renderable tag, or a
/// metadata tag.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "lowercase"))]
pub enum Segment {
    Text(TextSegment),
    Renderable(TagSegment),
    Metadata(MetadataSegment),
}

impl Segment {
    pub fn id(&self) -> SegmentId {
        match self {
            Segment::Text(segment) => segment.id,
            Segment::Renderable(segment) => segment.id,
            Segment::Metadata(segment) => segment.id,
        }
    }

    pub fn status(&self) -> SegmentStatus {
        match self {
            Segment::Text(segment) => segment.status,
            Segment::Renderable(segment) => segment.status,
            Segment::Metadata(segment) => segment.status,
        }
    }

    /// The raw content: the text run itself, or a tag's inner content.
    pub fn raw(&self) -> &str {
        match self {
            Segment::Text(segment) => &segment.raw,
            Segment::Renderable(segment) => &segment.raw,
            Segment::Metadata(segment) => &segment.raw,
        }
    }

    /// The tag name, for tag segments.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Segment::Text(_) => None,
            Segment::Renderable(segment) => Some(&segment.tag),
            Segment::Metadata(segment) => Some(&segment.tag),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Segment::Text(_))
    }

    pub fn is_tag(&self) -> bool {
        !self.is_text()
    }

    pub fn is_metadata(&self) -> bool {
        matches!(self, Segment::Metadata(_))
    }

    pub fn as_text(&self) -> Option<&TextSegment> {
        match self {
            Segment::Text(segment) => Some(segment),
            _ => None,
        }
    }

    pub fn as_renderable(&self) -> Option<&TagSegment> {
        match self {
            Segment::Renderable(segment) => Some(segment),
            _ => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&MetadataSegment> {
        match self {
            Segment::Metadata(segment) => Some(segment),
            _ => None,
        }
    }

    pub(crate) fn set_status(&mut self, status: SegmentStatus) {
        match self {
            Segment::Text(segment) => segment.status = status,
            Segment::Renderable(segment) => segment.status = status,
            Segment::Metadata(segment) => segment.status = status,
        }
    }

    /// Appends the literal input fragment this segment stands for.
    ///
    /// Text reconstructs as its raw content. Tags reconstruct according to
    /// status: `<tag>raw</tag>` when completed, `<tag>raw` while streaming,
    /// and `<partial` while incomplete (no `>` has been seen yet, and an
    /// incomplete name may even be empty).
    pub fn reconstruct_into(&self, out: &mut String) {
        match self {
            Segment::Text(segment) => out.push_str(&segment.raw),
            Segment::Renderable(TagSegment {
                tag, raw, status, ..
            })
            | Segment::Metadata(MetadataSegment {
                tag, raw, status, ..
            }) => match status {
                SegmentStatus::Completed => {
                    out.push('<');
                    out.push_str(tag);
                    out.push('>');
                    out.push_str(raw);
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
                SegmentStatus::Streaming => {
                    out.push('<');
                    out.push_str(tag);
                    out.push('>');
                    out.push_str(raw);
                }
                SegmentStatus::Incomplete => {
                    out.push('<');
                    out.push_str(tag);
                }
            },
        }
    }
}

/// The ordered segments of one message.
///
/// The list is exclusively owned by the message; the parser borrows it
/// mutably for the duration of a call, and the host reads it in between.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentList {
    segments: Vec<Segment>,
    next_id: u32,
}

impl SegmentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Finds a segment by id. Ids are strictly increasing with position,
    /// so this is a binary search.
    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments
            .binary_search_by_key(&id, Segment::id)
            .ok()
            .map(|index| &self.segments[index])
    }

    /// The literal input consumed so far: the concatenated textual
    /// reconstruction of every segment in order.
    pub fn reconstruct(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            segment.reconstruct_into(&mut out);
        }
        out
    }

    pub(crate) fn alloc_id(&mut self) -> SegmentId {
        let id = SegmentId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Removes and returns the tail if it is still open (streaming or
    /// incomplete). Completed tails stay put.
    pub(crate) fn pop_open_tail(&mut self) -> Option<Segment> {
        match self.segments.last() {
            Some(segment) if segment.status() != SegmentStatus::Completed => self.segments.pop(),
            _ => None,
        }
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut()
    }

    pub(crate) fn get_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments
            .binary_search_by_key(&id, Segment::id)
            .ok()
            .map(|index| &mut self.segments[index])
    }

    pub(crate) fn segments_mut(&mut self) -> &mut Vec<Segment> {
        &mut self.segments
    }
}

impl<'a> IntoIterator for &'a SegmentList {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// The segments created or changed by a single parse call, in the order
/// they were first touched. The host uses this to drive minimal UI updates.
#[derive(Debug, Default, Clone)]
pub struct ModifiedSet {
    order: Vec<SegmentId>,
    members: FxHashSet<SegmentId>,
}

impl ModifiedSet {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.members.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.order.iter().copied()
    }

    pub(crate) fn insert(&mut self, id: SegmentId) {
        if self.members.insert(id) {
            self.order.push(id);
        }
    }
}

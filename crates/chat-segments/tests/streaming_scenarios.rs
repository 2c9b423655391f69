//! End-to-end scenarios: full transcripts pushed through the parser in
//! realistic chunkings, checked against the exact expected segment lists.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chat_segments::{
    MessageContext, MetadataDispatcher, Segment, SegmentList, SegmentParser, SegmentStatus,
    TagKind, TagRegistry,
};
use pretty_assertions::assert_eq;

fn registry() -> TagRegistry {
    TagRegistry::from_tags([
        ("chart", TagKind::Renderable),
        ("chat", TagKind::Renderable),
        ("prompt", TagKind::Renderable),
        ("trace", TagKind::Metadata),
    ])
    .unwrap()
}

/// (kind, tag, raw, status) for each segment, for structural comparison.
fn shape(segments: &SegmentList) -> Vec<(&'static str, String, String, &'static str)> {
    segments
        .iter()
        .map(|segment| {
            let kind = match segment {
                Segment::Text(_) => "text",
                Segment::Renderable(_) => "tag",
                Segment::Metadata(_) => "meta",
            };
            (
                kind,
                segment.tag().unwrap_or("").to_owned(),
                segment.raw().to_owned(),
                segment.status().as_str(),
            )
        })
        .collect()
}

#[test]
fn single_chunk_mixed() {
    let registry = registry();
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();

    parser.parse("Hi <prompt>Go</prompt>!", &registry, &mut segments, false);

    assert_eq!(
        shape(&segments),
        vec![
            ("text", "".into(), "Hi ".into(), "completed"),
            ("tag", "prompt".into(), "Go".into(), "completed"),
            ("text", "".into(), "!".into(), "completed"),
        ]
    );
}

#[test]
fn split_inside_tag_name() {
    let registry = registry();
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();

    parser.parse("text <ch", &registry, &mut segments, true);
    assert_eq!(
        shape(&segments),
        vec![
            ("text", "".into(), "text ".into(), "completed"),
            ("tag", "ch".into(), "".into(), "incomplete"),
        ]
    );

    parser.parse("art>{a:1}</chart> end", &registry, &mut segments, false);
    assert_eq!(
        shape(&segments),
        vec![
            ("text", "".into(), "text ".into(), "completed"),
            ("tag", "chart".into(), "{a:1}".into(), "completed"),
            ("text", "".into(), " end".into(), "completed"),
        ]
    );
}

#[test]
fn prefix_ambiguity_is_upgraded_not_discarded() {
    let registry = registry();
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();

    // "cha" is a strict prefix of both "chat" and "chart"; nothing may be
    // emitted for it until the name is settled.
    parser.parse("<cha", &registry, &mut segments, true);
    assert_eq!(
        shape(&segments),
        vec![("tag", "cha".into(), "".into(), "incomplete")]
    );
    let provisional = segments.last().unwrap().id();

    parser.parse("rt>x</chart>", &registry, &mut segments, false);
    assert_eq!(
        shape(&segments),
        vec![("tag", "chart".into(), "x".into(), "completed")]
    );
    assert_eq!(segments.last().unwrap().id(), provisional);
}

#[test]
fn recognized_prefix_must_stay_provisional() {
    // "chat" is itself recognized but must not be emitted while the name
    // can still grow into a different recognized tag.
    let mut registry = registry();
    registry.register("chats", TagKind::Renderable).unwrap();
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();

    parser.parse("<chat", &registry, &mut segments, true);
    assert_eq!(
        shape(&segments),
        vec![("tag", "chat".into(), "".into(), "incomplete")]
    );

    parser.parse("s>x</chats>", &registry, &mut segments, false);
    assert_eq!(
        shape(&segments),
        vec![("tag", "chats".into(), "x".into(), "completed")]
    );
}

#[test]
fn unrecognized_completed_tag_is_text() {
    let registry = registry();
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();

    parser.parse("a<foo>b</foo>c", &registry, &mut segments, false);

    assert_eq!(
        shape(&segments),
        vec![("text", "".into(), "a<foo>b</foo>c".into(), "completed")]
    );
}

#[test]
fn metadata_tag_with_json_dispatches_once() {
    let registry = registry();
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();
    let context = MessageContext::new("scenario-5");

    let invocations = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = MetadataDispatcher::new();
    dispatcher.on("trace", {
        let invocations = invocations.clone();
        move |segment, _| {
            assert_eq!(segment.raw(), "{\"id\":1}");
            invocations.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    });

    parser.parse("<trace>{\"id\":", &registry, &mut segments, true);
    dispatcher.dispatch(&mut segments, &context);

    parser.parse("1}</trace>done", &registry, &mut segments, false);
    dispatcher.dispatch(&mut segments, &context);
    dispatcher.dispatch(&mut segments, &context);

    assert_eq!(
        shape(&segments),
        vec![
            ("meta", "trace".into(), "{\"id\":1}".into(), "completed"),
            ("text", "".into(), "done".into(), "completed"),
        ]
    );
    assert_eq!(invocations.load(Ordering::Relaxed), 1);
}

#[test]
fn unclosed_streaming_tag_at_end_of_stream() {
    let registry = registry();

    // Resolved by a final parse call...
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();
    parser.parse("start <chart>partial", &registry, &mut segments, false);
    assert_eq!(
        shape(&segments),
        vec![("text", "".into(), "start <chart>partial".into(), "completed")]
    );

    // ...and equivalently by streaming then finalizing.
    let mut parser = SegmentParser::new();
    let mut streamed = SegmentList::new();
    parser.parse("start <chart>partial", &registry, &mut streamed, true);
    parser.finalize(&registry, &mut streamed);
    assert_eq!(shape(&streamed), shape(&segments));
}

#[test]
fn one_character_per_chunk() {
    let registry = registry();
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();

    let input = "Hi <chart>{a:1}</chart> <trace>t</trace>!";
    for (at, ch) in input.char_indices() {
        let end = at + ch.len_utf8();
        parser.parse(&input[at..end], &registry, &mut segments, true);
        assert_eq!(
            segments.reconstruct(),
            &input[..end],
            "reconstruction must track the consumed prefix"
        );
    }
    parser.finalize(&registry, &mut segments);

    assert_eq!(
        shape(&segments),
        vec![
            ("text", "".into(), "Hi ".into(), "completed"),
            ("tag", "chart".into(), "{a:1}".into(), "completed"),
            ("text", "".into(), " ".into(), "completed"),
            ("meta", "trace".into(), "t".into(), "completed"),
            ("text", "".into(), "!".into(), "completed"),
        ]
    );
}

#[test]
fn boundary_inputs() {
    let registry = registry();

    for (input, expected_raw) in [
        ("", ""),
        ("   \n\t ", "   \n\t "),
        ("<", "<"),
        ("<<<", "<<<"),
        ("</>", "</>"),
        ("<>", "<>"),
        ("<3 hearts", "<3 hearts"),
    ] {
        let mut parser = SegmentParser::new();
        let mut segments = SegmentList::new();
        parser.parse(input, &registry, &mut segments, true);
        parser.finalize(&registry, &mut segments);

        if expected_raw.is_empty() {
            assert!(segments.is_empty(), "{input:?} should produce no segments");
        } else {
            assert_eq!(
                shape(&segments),
                vec![("text", "".into(), expected_raw.into(), "completed")],
                "for input {input:?}"
            );
        }
    }
}

#[test]
fn multibyte_text_survives_any_split() {
    let registry = registry();
    let input = "héllo <chart>données</chart> 世界!";

    let mut whole = SegmentList::new();
    let mut parser = SegmentParser::new();
    parser.parse(input, &registry, &mut whole, false);

    let mut chunked = SegmentList::new();
    let mut parser = SegmentParser::new();
    for (at, ch) in input.char_indices() {
        parser.parse(&input[at..at + ch.len_utf8()], &registry, &mut chunked, true);
    }
    parser.finalize(&registry, &mut chunked);

    assert_eq!(shape(&chunked), shape(&whole));
    assert_eq!(chunked.reconstruct(), input);
}

#[test]
fn registration_mid_stream_upgrades_existing_provisional() {
    let mut registry = registry();
    let mut parser = SegmentParser::new();
    let mut segments = SegmentList::new();

    parser.parse("see <figure", &registry, &mut segments, true);
    assert_eq!(segments.last().unwrap().status(), SegmentStatus::Incomplete);

    registry.register("figure", TagKind::Renderable).unwrap();
    parser.parse(">f1</figure>", &registry, &mut segments, false);

    assert_eq!(
        shape(&segments),
        vec![
            ("text", "".into(), "see ".into(), "completed"),
            ("tag", "figure".into(), "f1".into(), "completed"),
        ]
    );
}

use formlab_core::{
    decode_all, ChatIntent, ChatMode, ChatResponse, NdjsonDecoder, StreamEvent, TaskId,
};
use proptest::prelude::*;

fn reply(text: &str, task_id: Option<i64>) -> ChatResponse {
    ChatResponse {
        mode: if task_id.is_some() {
            ChatMode::AsyncTask
        } else {
            ChatMode::Sync
        },
        intent: ChatIntent::General,
        reply: text.to_string(),
        follow_up_question: None,
        task_id: task_id.map(TaskId),
        query_result: None,
        tool_traces: Vec::new(),
        degraded: false,
        retryable: false,
        audit_id: None,
    }
}

fn encode(events: &[StreamEvent]) -> Vec<u8> {
    events.iter().flat_map(|e| e.to_line().into_bytes()).collect()
}

fn decode_chunked(body: &[u8], cuts: &[usize]) -> Vec<StreamEvent> {
    let mut decoder = NdjsonDecoder::new();
    let mut events = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        let cut = cut.min(body.len());
        if cut < start {
            continue;
        }
        events.extend(decoder.push(&body[start..cut]));
        start = cut;
    }
    events.extend(decoder.push(&body[start..]));
    events.extend(decoder.finish());
    events
}

fn arb_event() -> impl Strategy<Value = StreamEvent> {
    let text = "[a-z0-9 光固化\"\\\\{}]{0,24}";
    prop_oneof![
        Just(StreamEvent::Start),
        text.prop_map(StreamEvent::delta),
        (text, proptest::option::of(1i64..500))
            .prop_map(|(t, id)| StreamEvent::done(reply(&t, id))),
        text.prop_map(StreamEvent::error),
        Just(StreamEvent::Delta { content: None }),
    ]
}

#[test]
fn malformed_line_between_valid_lines_is_skipped() {
    let mut body = StreamEvent::Start.to_line().into_bytes();
    body.extend_from_slice(b"{\"type\":\"delta\",\"content\":\n");
    body.extend(StreamEvent::delta("ok").to_line().into_bytes());

    let events = decode_all(&body);
    assert_eq!(events, vec![StreamEvent::Start, StreamEvent::delta("ok")]);
}

#[test]
fn last_object_without_newline_is_flushed() {
    let mut body = StreamEvent::Start.to_line().into_bytes();
    let done = StreamEvent::done(reply("final", None));
    body.extend_from_slice(done.to_line().trim_end().as_bytes());

    let events = decode_all(&body);
    assert_eq!(events, vec![StreamEvent::Start, done]);
}

#[test]
fn blank_lines_are_not_counted_as_dropped() {
    let mut decoder = NdjsonDecoder::new();
    let events = decoder.push(b"\n\n{\"type\":\"start\"}\n\n");
    assert_eq!(events, vec![StreamEvent::Start]);
    assert_eq!(decoder.dropped_lines(), 0);
}

#[test]
fn unknown_event_type_is_dropped() {
    let mut decoder = NdjsonDecoder::new();
    let events = decoder.push(b"{\"type\":\"heartbeat\"}\n{\"type\":\"start\"}\n");
    assert_eq!(events, vec![StreamEvent::Start]);
    assert_eq!(decoder.dropped_lines(), 1);
}

proptest! {
    #[test]
    fn chunk_boundaries_do_not_change_events(
        events in prop::collection::vec(arb_event(), 0..16),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
    ) {
        let body = encode(&events);
        let mut cuts: Vec<usize> = cuts.iter().map(|i| i.index(body.len() + 1)).collect();
        cuts.sort_unstable();

        let whole = decode_all(&body);
        prop_assert_eq!(&whole, &events);
        prop_assert_eq!(decode_chunked(&body, &cuts), whole);
    }

    #[test]
    fn byte_at_a_time_matches_whole_body(events in prop::collection::vec(arb_event(), 1..6)) {
        let body = encode(&events);
        let cuts: Vec<usize> = (1..body.len()).collect();
        prop_assert_eq!(decode_chunked(&body, &cuts), events);
    }

    #[test]
    fn garbage_lines_never_remove_valid_events(
        events in prop::collection::vec(arb_event(), 1..8),
        garbage in "[a-z{}:]{1,12}",
    ) {
        let mut body = Vec::new();
        for event in &events {
            body.extend_from_slice(garbage.as_bytes());
            body.push(b'\n');
            body.extend(event.to_line().into_bytes());
        }
        let decoded = decode_all(&body);
        prop_assert_eq!(decoded, events);
    }
}

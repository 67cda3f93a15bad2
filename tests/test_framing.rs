//! Tests for newline framing of CLI output
//!
//! Lines must come out the same no matter how the byte stream is chunked.

use kodegen_claude_bridge::LineFramer;

const STREAM: &str = "{\"type\":\"system\",\"subtype\":\"init\"}\n\
                      {\"type\":\"assistant\",\"text\":\"caf\u{e9} \u{1f980}\"}\r\n\
                      \n   \n\
                      {\"type\":\"result\",\"is_error\":false}";

fn frame_in_chunks(bytes: &[u8], split_points: &[usize]) -> Vec<String> {
    let mut framer = LineFramer::default();
    let mut lines = Vec::new();
    let mut start = 0;
    for &end in split_points.iter().chain(std::iter::once(&bytes.len())) {
        lines.extend(framer.push(&bytes[start..end]));
        start = end;
    }
    lines.extend(framer.finish());
    lines
}

#[test]
fn test_single_chunk() {
    let lines = frame_in_chunks(STREAM.as_bytes(), &[]);
    assert_eq!(
        lines,
        vec![
            "{\"type\":\"system\",\"subtype\":\"init\"}",
            "{\"type\":\"assistant\",\"text\":\"caf\u{e9} \u{1f980}\"}",
            "{\"type\":\"result\",\"is_error\":false}",
        ]
    );
}

#[test]
fn test_every_two_way_split_gives_the_same_lines() {
    let bytes = STREAM.as_bytes();
    let expected = frame_in_chunks(bytes, &[]);
    for split in 1..bytes.len() {
        assert_eq!(frame_in_chunks(bytes, &[split]), expected, "split at {split}");
    }
}

#[test]
fn test_byte_at_a_time() {
    let bytes = STREAM.as_bytes();
    let points: Vec<usize> = (1..bytes.len()).collect();
    assert_eq!(frame_in_chunks(bytes, &points), frame_in_chunks(bytes, &[]));
}

#[test]
fn test_multibyte_character_split_across_chunks() {
    let crab = "\u{1f980}".as_bytes();
    let mut framer = LineFramer::default();
    assert!(framer.push(&crab[..2]).is_empty());
    assert!(framer.push(&crab[2..]).is_empty());
    assert_eq!(framer.push(b"\n"), vec!["\u{1f980}"]);
}

#[test]
fn test_whitespace_only_lines_are_skipped() {
    let mut framer = LineFramer::default();
    assert!(framer.push("\n \t \n\r\n").is_empty());
    assert_eq!(framer.finish(), None);
}

#[test]
fn test_oversized_line_does_not_poison_the_stream() {
    let mut framer = LineFramer::new(16);
    let long = "x".repeat(40);
    let mut lines = framer.push(format!("{long}\nshort\n"));
    lines.extend(framer.push(long.as_str()));
    lines.extend(framer.push("\nafter\n"));
    assert_eq!(lines, vec!["short", "after"]);
    assert_eq!(framer.overflows(), 2);
}

//! Bounding untrusted payloads before any parsing happens.

use memchr::memrchr;

/// How far back from the cut the window will look for a tidier boundary.
const BOUNDARY_LOOKBACK_BYTES: usize = 4 * 1024;

/// Clamp a payload to at most `max_bytes`, preferring a cut that does not
/// split a tag, an entity or a UTF-8 sequence.
///
/// Everything before the cut is kept, so candidates found before truncation
/// are still recovered. The boundary search only looks a few KiB back; a
/// "tag" that opened further back than that is most likely a `<` inside
/// script text and is cut through.
///
/// ```rust
/// use reel_extract::bounded_window;
/// let html = b"<div>Hello</div><span>World</span>";
/// assert_eq!(bounded_window(html, 100), html);
/// assert_eq!(bounded_window(html, 20), b"<div>Hello</div>");
/// ```
pub fn bounded_window(payload: &[u8], max_bytes: usize) -> &[u8] {
    if payload.len() <= max_bytes {
        return payload;
    }
    let candidate = &payload[..max_bytes];
    let floor = max_bytes.saturating_sub(BOUNDARY_LOOKBACK_BYTES);
    let tail = &candidate[floor..];
    let open_tag = memrchr(b'<', tail);
    let close_tag = memrchr(b'>', tail);
    if let Some(open) = open_tag
        && close_tag.is_none_or(|gt| gt < open)
    {
        // Inside a tag, cut before the '<'.
        return &candidate[..floor + open];
    }
    let amp = memrchr(b'&', tail);
    let semi = memrchr(b';', tail);
    if let Some(amp) = amp
        && semi.is_none_or(|semi| semi < amp)
        && tail.len() - amp <= 12
    {
        // Inside an entity, cut before the '&'.
        return &candidate[..floor + amp];
    }
    &candidate[..utf8_floor(candidate)]
}

/// Length of the longest prefix of `bytes` that does not end part-way through
/// a UTF-8 sequence.
pub(crate) fn utf8_floor(bytes: &[u8]) -> usize {
    let len = bytes.len();
    // A sequence is at most four bytes, so only the last three can be a
    // dangling lead or continuation.
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            b if b & 0b1000_0000 == 0 => 1,
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            // Not a valid lead byte; leave it for lossy decoding.
            _ => return len,
        };
        return if width > back { len - back } else { len };
    }
    len
}

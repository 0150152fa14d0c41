//! Splits command output into chat-sized messages.
//!
//! Sizes are counted in Unicode scalar values. A full window is cut at its
//! last line break when it has one; the text after the break seeds the next
//! window. A limit of `0` means unbounded for both parameters.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedOutput {
    pub chunks: Vec<String>,
    /// Input remained after `max_chunks` chunks were produced.
    pub truncated: bool,
}

pub fn chunk(output: &str, max_symbols: usize, max_chunks: usize) -> Vec<String> {
    chunk_output(output, max_symbols, max_chunks).chunks
}

pub fn chunk_output(output: &str, max_symbols: usize, max_chunks: usize) -> ChunkedOutput {
    let mut result = ChunkedOutput::default();
    let mut window = String::new();
    let mut window_len = 0usize;
    let mut chars = output.chars().peekable();

    while let Some(ch) = chars.next() {
        window.push(ch);
        window_len += 1;
        let exhausted = chars.peek().is_none();

        if max_symbols > 0 && window_len == max_symbols {
            match window.rfind('\n') {
                Some(lf) => {
                    let carry = window.split_off(lf + 1);
                    window.truncate(lf);
                    if !window.is_empty() {
                        result.chunks.push(std::mem::take(&mut window));
                    }
                    window_len = carry.chars().count();
                    window = carry;
                }
                None => {
                    result.chunks.push(std::mem::take(&mut window));
                    window_len = 0;
                }
            }
            if limit_reached(&result, max_chunks) {
                result.truncated = !window.is_empty() || !exhausted;
                return result;
            }
        }

        if exhausted {
            break;
        }
    }

    if window.ends_with('\n') {
        window.pop();
    }
    if !window.is_empty() {
        result.chunks.push(window);
    }
    result
}

fn limit_reached(result: &ChunkedOutput, max_chunks: usize) -> bool {
    max_chunks > 0 && result.chunks.len() >= max_chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_has_no_chunks() {
        assert!(chunk("", 10, 5).is_empty());
        assert!(chunk("", 0, 0).is_empty());
    }

    #[test]
    fn short_output_is_one_chunk() {
        assert_eq!(chunk("uptime 3 days", 100, 5), vec!["uptime 3 days"]);
        assert_eq!(chunk("a\nb\nc", 100, 5), vec!["a\nb\nc"]);
    }

    #[test]
    fn unbounded_size_keeps_everything_together() {
        let output = "line one\nline two\nline three\n";
        assert_eq!(chunk(output, 0, 1), vec!["line one\nline two\nline three"]);
    }

    #[test]
    fn splits_on_last_line_break() {
        assert_eq!(
            chunk("0123456789\n0123456789", 12, 5),
            vec!["0123456789", "0123456789"]
        );
    }

    #[test]
    fn window_ending_at_line_break_drops_trailing_empty_segment() {
        assert_eq!(chunk("abc\n", 4, 0), vec!["abc"]);
        assert_eq!(chunk("abc\ndef\n", 4, 0), vec!["abc", "def"]);
    }

    #[test]
    fn cuts_mid_line_without_line_break() {
        assert_eq!(chunk("abcdefghij", 4, 0), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn counts_code_points_not_bytes() {
        let output = "ééééé";
        assert_eq!(chunk(output, 2, 0), vec!["éé", "éé", "é"]);
    }

    #[test]
    fn stops_after_max_chunks_and_reports_truncation() {
        let chunked = chunk_output("aaaa\nbbbb\ncccc\ndddd", 5, 2);
        assert_eq!(chunked.chunks, vec!["aaaa", "bbbb"]);
        assert!(chunked.truncated);

        let exact = chunk_output("aaaa\nbbbb\n", 5, 2);
        assert_eq!(exact.chunks, vec!["aaaa", "bbbb"]);
        assert!(!exact.truncated);
    }

    #[test]
    fn line_chunks_rejoin_into_the_original_lines() {
        let lines: Vec<String> = (0..40).map(|i| format!("row {i:02} ok")).collect();
        let output = lines.join("\n");
        let chunks = chunk(&output, 32, 0);
        assert!(chunks.iter().all(|c| c.chars().count() <= 32));
        assert_eq!(chunks.join("\n"), output);
    }

    #[test]
    fn truncated_chunks_rejoin_into_a_bounded_prefix() {
        let lines: Vec<String> = (0..40).map(|i| format!("row {i:02} ok")).collect();
        let output = lines.join("\n");
        let chunked = chunk_output(&output, 32, 3);
        assert!(chunked.truncated);
        assert_eq!(chunked.chunks.len(), 3);

        let rejoined = chunked.chunks.join("\n");
        assert!(output.starts_with(&rejoined));
        assert!(rejoined.chars().count() <= 3 * 32);
        assert!(rejoined.len() < output.len());

        let unbroken = "x".repeat(100);
        let cut = chunk_output(&unbroken, 16, 2);
        assert!(cut.truncated);
        assert_eq!(cut.chunks.concat(), unbroken[..32]);
    }

    #[test]
    fn is_deterministic() {
        let output = "alpha\nbeta\ngamma\ndelta\nepsilon\n";
        assert_eq!(chunk(output, 7, 3), chunk(output, 7, 3));
    }
}

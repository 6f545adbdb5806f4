/// Words per chunk when splitting extracted document text.
pub const CHUNK_SIZE: usize = 500;
/// Words shared between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 100;

/// Split `text` into overlapping word windows for embedding.
///
/// Windows are `CHUNK_SIZE` words with `CHUNK_OVERLAP` words of overlap, so
/// the stride is 400 and a text of W words yields ceil(W / 400) chunks. The
/// last chunk may be shorter. Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let stride = CHUNK_SIZE - CHUNK_OVERLAP;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + CHUNK_SIZE).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += stride;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("   \n\t  ").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text(&words(42));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].split_whitespace().count(), 42);
    }

    #[test]
    fn chunk_count_follows_stride() {
        // ceil(W / 400) for W > 0
        for (w, expected) in [(1, 1), (400, 1), (401, 2), (500, 2), (1000, 3), (1200, 3)] {
            assert_eq!(chunk_text(&words(w)).len(), expected, "W={w}");
        }
    }

    #[test]
    fn consecutive_chunks_overlap_by_100_words() {
        let chunks = chunk_text(&words(1000));
        let first: Vec<&str> = chunks[0].split_whitespace().collect();
        let second: Vec<&str> = chunks[1].split_whitespace().collect();
        assert_eq!(first.len(), 500);
        assert_eq!(&first[400..], &second[..100]);
    }

    #[test]
    fn last_chunk_may_be_short() {
        let chunks = chunk_text(&words(900));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].split_whitespace().count(), 100);
    }
}

const DEFAULT: usize = 384;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Longest input considered by [`CharacterNgramEmbedder`]. Page text beyond
/// this is head-truncated deterministically; no chunking happens here so the
/// `(pdf_path, page_number)` identity stays one-record-per-page.
const MAX_EMBED_CHARS: usize = 8_192;

/// Maps a text to a fixed-dimension unit-norm vector. Cosine similarity over
/// these vectors reduces to an inner product. The same text must embed to
/// the same vector within a session; swapping the embedder requires
/// re-indexing the collection.
pub trait Embedder {
    fn dimensions(&self) -> usize;

    /// `None` signals an internal failure; callers skip the record and log.
    fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Deterministic character-trigram hashing embedder. Not a learned model,
/// but stable across machines and good enough to rank handwriting OCR
/// output by lexical overlap.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().take(MAX_EMBED_CHARS).collect();

        if chars.is_empty() {
            // The zero vector: search("") is defined and must not fail.
            return Some(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Some(vector)
    }
}

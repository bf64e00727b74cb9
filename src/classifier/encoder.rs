//! Sentence encoders: text in, fixed-width embedding out.

use sha2::{Digest, Sha256};

/// Maps a sentence to a dense embedding of `dims()` floats.
pub trait SentenceEncoder: Send + Sync {
    fn dims(&self) -> usize;

    fn encode(&self, text: &str) -> Vec<f32>;
}

/// Default embedding width.
pub const DEFAULT_DIMS: usize = 2048;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.8;
const TRIGRAM_WEIGHT: f32 = 0.4;

/// Feature-hashing encoder over word unigrams, word bigrams and character
/// trigrams.
///
/// Each feature is hashed with SHA-256; the first 8 bytes pick a bucket and
/// the next byte picks a sign, so collisions tend to cancel rather than
/// accumulate. Output is L2-normalised. Identical input always yields an
/// identical vector, on every platform and build.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dims: usize,
}

impl HashingEncoder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn add(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

impl SentenceEncoder for HashingEncoder {
    fn dims(&self) -> usize {
        self.dims
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dims];
        let words = tokenize(text);

        for word in &words {
            self.add(&mut vector, &format!("w:{word}"), UNIGRAM_WEIGHT);

            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for tri in padded.windows(3) {
                let tri: String = tri.iter().collect();
                self.add(&mut vector, &format!("c:{tri}"), TRIGRAM_WEIGHT);
            }
        }
        for pair in words.windows(2) {
            self.add(&mut vector, &format!("b:{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// Lower-cased word tokens. Apostrophes stay inside words ("what's").
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

//! Sample message generation.
//!
//! When no message is given on the command line, a few are generated to
//! exercise the interesting paths of the link.
//!
//! # Design
//!
//! Generated messages cycle through:
//! - Short ASCII sentences (one frame)
//! - Cyrillic text (two bytes per letter in UTF-8, one in Windows-1251)
//! - Long text that needs several frames
//! - Text full of `{` `}` so the escape byte appears in payloads
//!
//! Only ASCII and Cyrillic are used, so every message is representable in
//! both wire encodings.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const LATIN_WORDS: &[&str] = &[
    "frame", "link", "channel", "byte", "parity", "signal", "station", "carrier", "slot",
    "backoff", "jam", "sequence", "payload", "flag", "escape", "medium",
];

const CYRILLIC_WORDS: &[&str] = &[
    "кадр", "канал", "сигнал", "байт", "ошибка", "передача", "приём", "станция", "флаг",
    "код", "линия", "пакет",
];

/// Generate `count` messages, deterministically from `seed`.
pub fn generate_sample_messages(seed: u64, count: usize) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..count)
        .map(|i| {
            let (vocabulary, lo, hi) = match i % 4 {
                0 => (LATIN_WORDS, 2, 6),
                1 => (CYRILLIC_WORDS, 3, 8),
                2 => (LATIN_WORDS, 25, 40),
                _ => (LATIN_WORDS, 3, 6),
            };
            let words = rng_len(&mut rng, lo, hi);
            let text = sentence(&mut rng, vocabulary, words);
            if i % 4 == 3 {
                format!("{{{}}}", text.replace(' ', "} {"))
            } else {
                text
            }
        })
        .collect()
}

fn rng_len(rng: &mut ChaCha8Rng, lo: usize, hi: usize) -> usize {
    rng.gen_range(lo..=hi)
}

fn sentence(rng: &mut ChaCha8Rng, words: &[&str], len: usize) -> String {
    (0..len)
        .filter_map(|_| words.choose(rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

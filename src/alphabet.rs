use rand::Rng;

/// Candidate display characters, ordered. Letters first, then digits, so the
/// ramp reads as hex-dump noise rather than counting.
pub const GLYPH_SET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fixed ordered set of characters a grid cell may hold.
///
/// Immutable for the process lifetime; every replacement character the
/// flicker policy picks comes from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphAlphabet {
    chars: &'static [u8],
}

impl GlyphAlphabet {
    pub const fn new() -> Self {
        Self { chars: GLYPH_SET }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.chars.get(index).copied()
    }

    pub fn contains(&self, character: u8) -> bool {
        self.chars.contains(&character)
    }

    /// Uniform random pick.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        self.chars[rng.gen_range(0..self.chars.len())]
    }
}

impl Default for GlyphAlphabet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::GlyphAlphabet;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn alphabet_is_non_empty_letters_and_digits() {
        let alphabet = GlyphAlphabet::new();
        assert!(!alphabet.is_empty());
        assert_eq!(alphabet.len(), 36);
        assert!(alphabet.contains(b'A'));
        assert!(alphabet.contains(b'9'));
        assert!(!alphabet.contains(b' '));
    }

    #[test]
    fn pick_always_returns_a_member() {
        let alphabet = GlyphAlphabet::new();
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..200 {
            assert!(alphabet.contains(alphabet.pick(&mut rng)));
        }
    }

    #[test]
    fn indexing_is_stable() {
        let alphabet = GlyphAlphabet::new();
        assert_eq!(alphabet.get(0), Some(b'A'));
        assert_eq!(alphabet.get(25), Some(b'Z'));
        assert_eq!(alphabet.get(26), Some(b'0'));
        assert_eq!(alphabet.get(35), Some(b'9'));
        assert_eq!(alphabet.get(36), None);
    }
}

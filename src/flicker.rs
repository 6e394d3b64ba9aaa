//! Per-cell mutation policy.
//!
//! A cell only ever changes while the fog is actively touching it; touched
//! cells mutate either with the pointer-motion-scaled rate (bright cells
//! only) or with the slow ambient rate. Both paths gate on a second
//! independent coin flip, which halves the effective rate while keeping the
//! rate constants themselves simple to tune. The second flip is load-bearing
//! for the visual cadence; do not fold it into the rate.

use rand::Rng;

use crate::alphabet::GlyphAlphabet;
use crate::classify::CellClass;

/// Ambient mutation probability per composite pass.
pub const BASE_RATE: f32 = 0.008;
/// Mutation probability ceiling under fast pointer motion.
pub const MAX_RATE: f32 = 0.15;
/// Fog activation threshold: below this the cell is never touched.
pub const TOUCH_THRESHOLD: f32 = 0.03;
/// Brightness floor for the motion-triggered path.
pub const MOTION_BRIGHTNESS: f32 = 0.35;
/// Gain applied to the pointer speed estimate before clamping.
pub const SPEED_GAIN: f32 = 20.0;

/// Stateless policy; all randomness comes from the injected generator.
#[derive(Debug, Clone, Copy)]
pub struct FlickerPolicy {
    alphabet: GlyphAlphabet,
}

impl FlickerPolicy {
    pub fn new(alphabet: GlyphAlphabet) -> Self {
        Self { alphabet }
    }

    /// Pointer-motion-scaled mutation probability for this pass.
    pub fn head_rate(speed_estimate: f32) -> f32 {
        (speed_estimate * SPEED_GAIN).min(1.0) * (MAX_RATE - BASE_RATE)
    }

    /// The dominant suppressor: most background cells never activate.
    pub fn is_touched(class: &CellClass) -> bool {
        class.aura + class.core > TOUCH_THRESHOLD
    }

    /// Decide whether the cell mutates this pass. Returns the replacement
    /// character, or `None` to leave the cell untouched. Draw order and
    /// short-circuiting are part of the contract: an untouched cell consumes
    /// no randomness at all.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        class: &CellClass,
        head_rate: f32,
        rng: &mut R,
    ) -> Option<u8> {
        if !Self::is_touched(class) {
            return None;
        }

        if class.brightness > MOTION_BRIGHTNESS
            && rng.gen::<f32>() < head_rate
            && rng.gen::<f32>() > 0.5
        {
            return Some(self.alphabet.pick(rng));
        }

        if rng.gen::<f32>() < BASE_RATE && rng.gen::<f32>() > 0.5 {
            return Some(self.alphabet.pick(rng));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::{FlickerPolicy, BASE_RATE, MAX_RATE};
    use crate::alphabet::GlyphAlphabet;
    use crate::classify::classify;
    use rand::{Error, RngCore};

    /// Deterministic RNG yielding a scripted sequence of unit-interval
    /// floats, with a counter so tests can assert how many draws were
    /// consumed.
    struct ScriptedRng {
        words: Vec<u32>,
        cursor: usize,
        consumed: usize,
    }

    impl ScriptedRng {
        fn from_floats(values: &[f32]) -> Self {
            let words = values
                .iter()
                .map(|v| ((v * (1u32 << 24) as f32) as u32) << 8)
                .collect();
            Self {
                words,
                cursor: 0,
                consumed: 0,
            }
        }
    }

    impl RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            let word = self.words[self.cursor % self.words.len()];
            self.cursor += 1;
            self.consumed += 1;
            word
        }

        fn next_u64(&mut self) -> u64 {
            let high = self.next_u32() as u64;
            let low = self.next_u32() as u64;
            (high << 32) | low
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(4) {
                let word = self.next_u32().to_le_bytes();
                chunk.copy_from_slice(&word[..chunk.len()]);
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn head_rate_scales_and_clamps_with_speed() {
        let rate = FlickerPolicy::head_rate(0.1);
        assert!((rate - (MAX_RATE - BASE_RATE)).abs() < 1e-6);
        assert!((rate - 0.142).abs() < 1e-6);

        let slow = FlickerPolicy::head_rate(0.01);
        assert!((slow - 0.2 * (MAX_RATE - BASE_RATE)).abs() < 1e-6);

        assert_eq!(FlickerPolicy::head_rate(0.0), 0.0);
    }

    #[test]
    fn untouched_cells_never_mutate_and_draw_nothing() {
        let policy = FlickerPolicy::new(GlyphAlphabet::new());
        // A forced-trigger script: every draw would pass its gate.
        let mut rng = ScriptedRng::from_floats(&[0.0, 0.99]);

        for sample in [0u8, 1u8] {
            let class = classify(sample, sample, sample, 12);
            assert!(!FlickerPolicy::is_touched(&class));
            assert_eq!(policy.mutate(&class, 1.0, &mut rng), None);
        }
        assert_eq!(rng.consumed, 0);
    }

    #[test]
    fn motion_flicker_requires_both_draws() {
        let policy = FlickerPolicy::new(GlyphAlphabet::new());
        let bright = classify(240, 240, 240, 12);

        // First draw passes, second coin flip fails; the ambient path then
        // fails its first draw. No mutation.
        let mut rng = ScriptedRng::from_floats(&[0.0, 0.2, 0.9, 0.9]);
        assert_eq!(policy.mutate(&bright, 0.142, &mut rng), None);

        // Both draws pass: mutation fires and picks from the alphabet.
        let mut rng = ScriptedRng::from_floats(&[0.0, 0.9, 0.1]);
        let replacement = policy.mutate(&bright, 0.142, &mut rng);
        assert!(replacement.is_some());
        assert!(GlyphAlphabet::new().contains(replacement.unwrap()));
    }

    #[test]
    fn dim_cells_skip_the_motion_path() {
        let policy = FlickerPolicy::new(GlyphAlphabet::new());
        // Touched but below the motion brightness floor.
        let dim = classify(60, 60, 60, 12);
        assert!(FlickerPolicy::is_touched(&dim));
        assert!(dim.brightness <= 0.35);

        // Ambient path: first draw must beat BASE_RATE, not head_rate.
        let mut rng = ScriptedRng::from_floats(&[BASE_RATE * 0.5, 0.9, 0.3]);
        assert!(policy.mutate(&dim, 1.0, &mut rng).is_some());

        let mut rng = ScriptedRng::from_floats(&[BASE_RATE * 2.0, 0.9]);
        assert_eq!(policy.mutate(&dim, 1.0, &mut rng), None);
    }

    #[test]
    fn ambient_flicker_also_needs_the_second_flip() {
        let policy = FlickerPolicy::new(GlyphAlphabet::new());
        let dim = classify(60, 60, 60, 12);

        let mut rng = ScriptedRng::from_floats(&[0.0, 0.5]);
        // Second draw of exactly 0.5 fails the strict > 0.5 gate.
        assert_eq!(policy.mutate(&dim, 0.0, &mut rng), None);
    }
}

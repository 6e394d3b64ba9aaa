use rand::Rng;

use crate::alphabet::GlyphAlphabet;

/// Persistent per-cell character state.
///
/// Created whole (randomly filled) and replaced whole on any dimension
/// change; between frames only cells the flicker policy elects to mutate
/// differ. Owned by the frame driver; everything else borrows it for a
/// single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphGrid {
    cols: u32,
    rows: u32,
    cells: Vec<u8>,
}

impl GlyphGrid {
    pub fn new<R: Rng + ?Sized>(cols: u32, rows: u32, alphabet: GlyphAlphabet, rng: &mut R) -> Self {
        let len = cols as usize * rows as usize;
        let mut cells = Vec::with_capacity(len);
        for _ in 0..len {
            cells.push(alphabet.pick(rng));
        }
        Self { cols, rows, cells }
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn matches_dims(&self, cols: u32, rows: u32) -> bool {
        self.cols == cols && self.rows == rows
    }

    pub fn get(&self, col: u32, row: u32) -> u8 {
        self.cells[(row * self.cols + col) as usize]
    }

    pub fn set(&mut self, col: u32, row: u32, character: u8) {
        self.cells[(row * self.cols + col) as usize] = character;
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }
}

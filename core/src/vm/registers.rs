/// Capacity of the register bank in 32-bit words.
pub const REGISTER_COUNT: usize = 8192;

/// Fixed bank of 32-bit registers.
///
/// There is a single backing store; the typed accessors reinterpret bits and
/// never convert, so writing a float and reading an int yields the IEEE-754
/// bit pattern.
pub struct RegisterBank {
    words: Box<[u32; REGISTER_COUNT]>,
}

impl RegisterBank {
    pub fn new() -> Self {
        Self {
            words: Box::new([0; REGISTER_COUNT]),
        }
    }

    /// Zeroes every register.
    pub fn reset(&mut self) {
        self.words.fill(0);
    }

    #[inline]
    pub fn u32(&self, idx: usize) -> u32 {
        self.words[idx]
    }

    #[inline]
    pub fn i32(&self, idx: usize) -> i32 {
        self.words[idx] as i32
    }

    #[inline]
    pub fn f32(&self, idx: usize) -> f32 {
        f32::from_bits(self.words[idx])
    }

    #[inline]
    pub fn set_u32(&mut self, idx: usize, value: u32) {
        self.words[idx] = value;
    }

    #[inline]
    pub fn set_i32(&mut self, idx: usize, value: i32) {
        self.words[idx] = value as u32;
    }

    #[inline]
    pub fn set_f32(&mut self, idx: usize, value: f32) {
        self.words[idx] = value.to_bits();
    }

    pub fn as_words(&self) -> &[u32] {
        &self.words[..]
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

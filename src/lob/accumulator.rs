use bytes::Bytes;

use crate::error::SqlBridgeError;

/// Capacity of a fresh accumulator buffer.
pub const INITIAL_CAPACITY: usize = 1024;

/// Folds LOB chunks into one contiguous buffer.
///
/// When the next chunk does not fit, a new buffer of `1.5 * (capacity + chunk)` is allocated and
/// the current contents are copied forward, so `n` units cost `O(log n)` reallocations.
#[derive(Debug)]
pub struct LobAccumulator {
    buffer: Vec<u8>,
    regrowths: usize,
}

impl Default for LobAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl LobAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_CAPACITY),
            regrowths: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let required = self.buffer.len() + chunk.len();
        if required > self.buffer.capacity() {
            let grown_capacity = (self.buffer.capacity() + chunk.len()) * 3 / 2;
            let mut grown = Vec::with_capacity(grown_capacity.max(required));
            grown.extend_from_slice(&self.buffer);
            self.buffer = grown;
            self.regrowths += 1;
        }
        self.buffer.extend_from_slice(chunk);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of times the buffer was reallocated.
    #[must_use]
    pub fn regrowths(&self) -> usize {
        self.regrowths
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buffer)
    }

    /// # Errors
    /// Returns [`SqlBridgeError::UnsupportedConversionError`] if the collected bytes are not
    /// valid UTF-8.
    pub fn into_string(self) -> Result<String, SqlBridgeError> {
        String::from_utf8(self.buffer).map_err(|err| {
            SqlBridgeError::unsupported(format!("character LOB is not valid UTF-8: {err}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_inputs_fit_the_initial_buffer() {
        let mut acc = LobAccumulator::new();
        acc.push(b"hello ");
        acc.push(b"world");
        assert_eq!(acc.regrowths(), 0);
        assert_eq!(acc.capacity(), INITIAL_CAPACITY);
        assert_eq!(acc.into_bytes(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn growth_follows_one_and_a_half_rule() {
        let mut acc = LobAccumulator::new();
        acc.push(&[1u8; 1000]);
        acc.push(&[2u8; 100]);
        assert_eq!(acc.regrowths(), 1);
        assert_eq!(acc.capacity(), (INITIAL_CAPACITY + 100) * 3 / 2);
        assert_eq!(acc.len(), 1100);
    }

    #[test]
    fn regrowths_stay_logarithmic() {
        let mut acc = LobAccumulator::new();
        let chunk = [7u8; 100];
        for _ in 0..10_000 {
            acc.push(&chunk);
        }
        assert_eq!(acc.len(), 1_000_000);
        // 1.5^17 * 1024 > 1_000_000
        assert!(acc.regrowths() <= 17, "regrowths: {}", acc.regrowths());
        assert!(acc.into_bytes().iter().all(|b| *b == 7));
    }
}

//! Per-direction counter nonces.
//!
//! Each direction of a connection owns one 64-bit counter, starting at 0
//! and incremented after every AEAD operation (twice per chunk: length
//! block, then payload block). Wire layout:
//!
//! ```text
//! [ counter (8, little-endian) | zeros (4) ]
//! ```

use crate::core::{FramingError, AEAD_NONCE_SIZE};

/// Monotonic nonce counter for one direction of one connection.
///
/// Never reset, never shared between directions. Overflow is a fatal
/// error rather than a wrap.
#[derive(Debug)]
pub struct NonceCounter {
    counter: u64,
}

impl NonceCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Current counter value (the value the next operation will use).
    pub fn value(&self) -> u64 {
        self.counter
    }

    /// Return the wire nonce for the current value, then increment.
    pub fn next(&mut self) -> Result<[u8; AEAD_NONCE_SIZE], FramingError> {
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        nonce[..8].copy_from_slice(&self.counter.to_le_bytes());
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or(FramingError::NonceExhausted)?;
        Ok(nonce)
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, value: u64) {
        self.counter = value;
    }
}

impl Default for NonceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_wire_layout() {
        let mut counter = NonceCounter::new();
        counter.set(0x0123456789abcdef);

        let nonce = counter.next().unwrap();
        assert_eq!(&nonce[..8], &0x0123456789abcdefu64.to_le_bytes());
        assert_eq!(&nonce[8..], &[0u8; 4]);
    }

    #[test]
    fn test_nonce_increments() {
        let mut counter = NonceCounter::new();
        assert_eq!(counter.value(), 0);

        let first = counter.next().unwrap();
        assert_eq!(first, [0u8; 12]);
        assert_eq!(counter.value(), 1);

        let second = counter.next().unwrap();
        assert_eq!(&second[..8], &1u64.to_le_bytes());
        assert_eq!(counter.value(), 2);
    }

    #[test]
    fn test_nonce_overflow_is_fatal() {
        let mut counter = NonceCounter::new();
        counter.set(u64::MAX);
        assert!(matches!(
            counter.next(),
            Err(FramingError::NonceExhausted)
        ));
    }
}

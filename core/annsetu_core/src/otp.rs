//! Code sources for pickup and drop codes.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::Rng;

use crate::types::Otp;

/// Supplies candidate one-time codes.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> Otp;

    /// Draw a pickup/drop pair whose two codes differ.
    fn next_pair(&self) -> (Otp, Otp) {
        let pickup = self.next_code();
        loop {
            let drop = self.next_code();
            if drop != pickup {
                return (pickup, drop);
            }
        }
    }
}

/// Codes drawn from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCodeSource;

impl CodeSource for OsCodeSource {
    fn next_code(&self) -> Otp {
        let value = OsRng.gen_range(Otp::MIN..=Otp::MAX);
        // gen_range stays within MIN..=MAX, which is exactly Otp's domain.
        Otp::new(value).unwrap_or_else(|| unreachable!("code {value} outside range"))
    }
}

/// Replays a fixed list of codes, cycling when exhausted.
///
/// Deterministic source for exercising collision handling.
#[derive(Debug)]
pub struct SequenceCodeSource {
    codes: Mutex<VecDeque<Otp>>,
}

impl SequenceCodeSource {
    /// Panics if `codes` is empty or any value is outside `1000..=9999`.
    pub fn new(codes: &[u16]) -> Self {
        assert!(!codes.is_empty(), "SequenceCodeSource needs at least one code");
        let codes = codes
            .iter()
            .map(|&c| Otp::new(c).unwrap_or_else(|| panic!("{c} is not a 4-digit code")))
            .collect();
        Self {
            codes: Mutex::new(codes),
        }
    }
}

impl CodeSource for SequenceCodeSource {
    fn next_code(&self) -> Otp {
        let mut codes = self.codes.lock();
        let code = codes[0];
        codes.rotate_left(1);
        code
    }
}

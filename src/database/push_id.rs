//! Chronologically ordered push keys.
//!
//! A key is 8 characters of millisecond timestamp followed by 12 random
//! characters, all drawn from an alphabet whose byte order matches its
//! index order, so keys sort by creation time as plain strings.

use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

pub const PUSH_ID_LEN: usize = 20;

#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_time: i64,
    last_random: [u8; 12],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a key for `now_millis`.
    ///
    /// Keys from one generator are strictly increasing, even within a single
    /// millisecond or when the clock steps backwards.
    pub fn generate(&mut self, now_millis: i64) -> String {
        let now = now_millis.max(self.last_time);
        if now == self.last_time {
            self.increment_random();
        } else {
            self.last_time = now;
            let mut rng = rand::thread_rng();
            for digit in self.last_random.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
        }

        let mut key = [0u8; PUSH_ID_LEN];
        let mut ts = self.last_time;
        for slot in key[..8].iter_mut().rev() {
            *slot = PUSH_CHARS[(ts % 64) as usize];
            ts /= 64;
        }

        for (slot, digit) in key[8..].iter_mut().zip(self.last_random.iter()) {
            *slot = PUSH_CHARS[*digit as usize];
        }

        key.iter().map(|&b| b as char).collect()
    }

    fn increment_random(&mut self) {
        for digit in self.last_random.iter_mut().rev() {
            if *digit == 63 {
                *digit = 0;
            } else {
                *digit += 1;
                return;
            }
        }
        // Every random digit overflowed; borrow the next millisecond.
        self.last_time += 1;
    }
}

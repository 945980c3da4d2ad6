//! Room code generation.

use huddle_protocol::RoomCode;
use rand::Rng;

/// Characters a room code may contain.
///
/// Digits 0/1 and letters I/L/O are left out so a code read aloud or copied
/// by hand can't be mistaken for another.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Produces fixed-length room codes drawn uniformly from [`CODE_ALPHABET`].
///
/// The generator does not know which codes are taken; the registry retries
/// on collision.
#[derive(Debug, Clone, Copy)]
pub struct RoomCodeGenerator {
    len: usize,
}

impl RoomCodeGenerator {
    pub fn new(len: usize) -> Self {
        Self { len }
    }

    /// Generates a fresh random code.
    pub fn generate(&self) -> RoomCode {
        let mut rng = rand::rng();
        let code = (0..self.len)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        RoomCode(code)
    }
}

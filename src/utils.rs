// Raffle Program - Utility Functions

/// One random word delivered by the coordinator: a 256-bit unsigned integer, big-endian
pub type RandomWord = [u8; 32];

/// Build a random word holding a small integer value
pub fn word_from_u64(value: u64) -> RandomWord {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Reduce a random word modulo the pool size.
///
/// This is plain modulo selection over the full 256-bit value. It is slightly
/// biased whenever `pool_size` does not divide 2^256; for realistic pool sizes
/// the bias is negligible and the selection law is kept as is.
pub fn winner_index(word: &RandomWord, pool_size: usize) -> Option<usize> {
    if pool_size == 0 {
        return None;
    }
    let modulus = pool_size as u128;
    let remainder = word
        .iter()
        .fold(0u128, |acc, byte| (acc * 256 + *byte as u128) % modulus);
    Some(remainder as usize)
}

/// Convert lamports to SOL (for display purposes)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 1_000_000_000.0
}

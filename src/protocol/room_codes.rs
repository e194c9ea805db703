use rand::Rng;

use super::types::ROOM_CODE_LENGTH;

/// Generate a room code avoiding confusing characters (0, O, I, 1).
/// Uses uppercase letters and numbers for easy verbal sharing.
pub fn generate_room_code() -> String {
    generate_room_code_of_length(ROOM_CODE_LENGTH)
}

/// Generate a clean room code of the requested length.
pub fn generate_room_code_of_length(length: usize) -> String {
    const CLEAN_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
    if length == 0 {
        return String::new();
    }
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CLEAN_CHARS.len());
            // SAFETY: `idx` is produced by `random_range(0..len)`, so it is
            // always within [0, len).
            #[allow(clippy::indexing_slicing)]
            let ch = CLEAN_CHARS[idx] as char;
            ch
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_the_configured_length() {
        assert_eq!(generate_room_code().len(), ROOM_CODE_LENGTH);
        assert_eq!(generate_room_code_of_length(10).len(), 10);
        assert_eq!(generate_room_code_of_length(0), "");
    }

    #[test]
    fn codes_avoid_confusing_characters() {
        for _ in 0..100 {
            let code = generate_room_code();
            for ch in code.chars() {
                assert!(
                    !matches!(ch, '0' | 'O' | 'I' | '1'),
                    "code {code} contains confusing character {ch}"
                );
                assert!(ch.is_ascii_uppercase() || ch.is_ascii_digit());
            }
        }
    }
}

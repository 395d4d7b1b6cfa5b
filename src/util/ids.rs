use rand::Rng;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Returns `len` random characters drawn from `[0-9a-z]`.
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36_ALPHABET[rng.gen_range(0..BASE36_ALPHABET.len())] as char)
        .collect()
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_suffix_uses_lowercase_alphanumerics() {
        let value = random_base36(32);
        assert_eq!(value.len(), 32);
        assert!(value
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}

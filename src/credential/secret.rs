use rand::Rng;

/// Alphabet for recovery codes. Drops `0 O 1 I L` so a code read from a
/// printout or phone screen types back unambiguously.
const RECOVERY_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const RECOVERY_CODE_LEN: usize = 10;

/// 256 bits of CSPRNG output, hex-encoded. Safe to embed in a URL.
pub fn generate_link_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Uniform 6-digit decimal code. `random_range` rejects rather than wrapping,
/// so every code from 000000 to 999999 is equally likely.
pub fn generate_otp_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:06}")
}

fn generate_recovery_code() -> String {
    let mut rng = rand::rng();
    (0..RECOVERY_CODE_LEN)
        .map(|_| RECOVERY_ALPHABET[rng.random_range(0..RECOVERY_ALPHABET.len())] as char)
        .collect()
}

/// Generate a batch of recovery codes, retrying on the (astronomically rare)
/// intra-batch duplicate until the batch is distinct.
pub fn generate_recovery_batch(count: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(count);
    let mut codes = Vec::with_capacity(count);
    while codes.len() < count {
        let code = generate_recovery_code();
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }
    codes
}

/// Strip separators and upcase so user-typed codes compare against what was
/// generated.
pub fn normalize_recovery_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_secret_is_64_hex_chars() {
        let secret = generate_link_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn link_secrets_are_unique() {
        let a = generate_link_secret();
        let b = generate_link_secret();
        assert_ne!(a, b);
    }

    #[test]
    fn otp_code_is_always_six_digits() {
        for _ in 0..1000 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn recovery_codes_use_unambiguous_alphabet() {
        for code in generate_recovery_batch(10) {
            assert_eq!(code.len(), RECOVERY_CODE_LEN);
            for c in code.chars() {
                assert!(RECOVERY_ALPHABET.contains(&(c as u8)), "unexpected char {c}");
                assert!(!"0O1IL".contains(c));
            }
        }
    }

    #[test]
    fn recovery_batches_have_no_internal_duplicates() {
        // 10_000 batches of 10; any collision inside a batch fails the run.
        for _ in 0..10_000 {
            let batch = generate_recovery_batch(10);
            let unique: std::collections::HashSet<_> = batch.iter().collect();
            assert_eq!(unique.len(), batch.len());
        }
    }

    #[test]
    fn normalize_strips_separators_and_case() {
        assert_eq!(normalize_recovery_code("abcd-efgh-23"), "ABCDEFGH23");
        assert_eq!(normalize_recovery_code(" abCD efGH23 "), "ABCDEFGH23");
    }
}

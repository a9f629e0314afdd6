//! Identifier helpers
use bech32::Bech32m;
use uuid7::uuid7;

/// Mints a time-ordered id: a fresh uuid7 encoded as bech32m under the given prefix,
/// e.g. `req_1...`. Callers with their own id scheme can ignore this.
pub fn generate_id(prefix: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(prefix)?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix_and_are_unique() {
        let a = generate_id("req_").unwrap();
        let b = generate_id("req_").unwrap();

        assert!(a.starts_with("req_1"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(generate_id("").is_err());
    }
}

//! Utility functions for identifier generation

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32, the hrp doubles as a type prefix
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Lower-cases and collapses separators so that `Vice-Principal`, `vice principal`
/// and `VICE_PRINCIPAL` all compare equal.
pub fn normalise_token(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' | '.' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bech32_ids_carry_prefix() {
        let id = new_uuid_to_bech32("exam_").unwrap();
        assert!(id.starts_with("exam_1"));
    }

    #[test]
    fn normalise_collapses_separators() {
        assert_eq!(normalise_token("  Vice--Principal "), "vice_principal");
        assert_eq!(normalise_token("HEAD OF_department"), "head_of_department");
        assert_eq!(normalise_token(""), "");
    }
}

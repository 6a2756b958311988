use anyhow::{Error, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

/// Standard alphabet, padding optional. Mobile clients are inconsistent about trailing `=`.
const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Drops a `data:<mime>;base64,` prefix if present.
pub fn strip_data_url_prefix(encoded: &str) -> &str {
    let trimmed = encoded.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(',') {
            return payload.trim()
        }
    }
    trimmed
}

/// base64_to_bytes decodes a base64 or data URL payload.
///
/// ASCII whitespace anywhere in the payload is skipped, so MIME-style line
/// wrapping decodes the same as a single line.
pub fn base64_to_bytes(encoded: &str) -> Result<Vec<u8>> {
    let payload: String = strip_data_url_prefix(encoded)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(Error::msg("empty base64 payload"))
    }
    let bytes = BASE64_LENIENT.decode(&payload)?;
    if bytes.is_empty() {
        return Err(Error::msg("base64 payload decoded to zero bytes"))
    }
    Ok(bytes)
}

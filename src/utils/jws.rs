//! Compact JWS helpers: base64url segment codec, DER-to-JOSE ECDSA
//! signature conversion, and decoding of nested signed payloads.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

#[derive(Debug, thiserror::Error)]
pub enum JwsError {
    #[error("Invalid DER signature: {0}")]
    InvalidDer(String),

    #[error("Invalid JWS format: expected at least 2 dot-separated segments")]
    InvalidFormat,

    #[error("Base64 decode failed: {0}")]
    Base64(String),

    #[error("JSON parse failed: {0}")]
    Json(String),
}

pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn b64url_decode(data: &str) -> Result<Vec<u8>, JwsError> {
    URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|e| JwsError::Base64(e.to_string()))
}

/// Convert a DER-encoded ECDSA signature (SEQUENCE of two INTEGERs) into
/// the fixed-width r‖s form JOSE requires. `width` is the curve integer
/// width in bytes (32 for P-256), so the output is always `2 * width`.
///
/// DER integers are signed and minimal: a value with the high bit set
/// carries one 0x00 pad byte (stripped here), and small values encode in
/// fewer than `width` bytes (left-zero-padded here).
pub fn der_signature_to_jose(der: &[u8], width: usize) -> Result<Vec<u8>, JwsError> {
    let mut pos = 0usize;

    let (tag, seq_len) = read_tlv(der, &mut pos)?;
    if tag != 0x30 {
        return Err(JwsError::InvalidDer(format!(
            "expected SEQUENCE (0x30), got 0x{:02x}",
            tag
        )));
    }
    if pos + seq_len != der.len() {
        return Err(JwsError::InvalidDer(
            "SEQUENCE length does not match signature length".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(width * 2);
    for name in ["r", "s"] {
        let (tag, len) = read_tlv(der, &mut pos)?;
        if tag != 0x02 {
            return Err(JwsError::InvalidDer(format!(
                "expected INTEGER (0x02) for {}, got 0x{:02x}",
                name, tag
            )));
        }
        let bytes = der
            .get(pos..pos + len)
            .ok_or_else(|| JwsError::InvalidDer(format!("truncated INTEGER for {}", name)))?;
        pos += len;

        // Strip the single sign-padding byte DER adds when the high bit is
        // set; anything longer cannot fit the curve width.
        let bytes = match bytes.len() {
            n if n == width + 1 && bytes[0] == 0x00 => &bytes[1..],
            n if n > width => {
                return Err(JwsError::InvalidDer(format!(
                    "INTEGER {} is {} bytes, wider than the curve ({})",
                    name, n, width
                )))
            }
            _ => bytes,
        };

        // Left-zero-pad short integers to the fixed width.
        out.extend(std::iter::repeat(0u8).take(width - bytes.len()));
        out.extend_from_slice(bytes);
    }

    if pos != der.len() {
        return Err(JwsError::InvalidDer(
            "trailing bytes after second INTEGER".to_string(),
        ));
    }

    Ok(out)
}

fn read_tlv(der: &[u8], pos: &mut usize) -> Result<(u8, usize), JwsError> {
    let tag = *der
        .get(*pos)
        .ok_or_else(|| JwsError::InvalidDer("truncated tag".to_string()))?;
    *pos += 1;

    let first = *der
        .get(*pos)
        .ok_or_else(|| JwsError::InvalidDer("truncated length".to_string()))?;
    *pos += 1;

    // Short form, or long form with 1-2 length bytes (ECDSA signatures
    // never need more).
    let len = if first < 0x80 {
        first as usize
    } else {
        let count = (first & 0x7f) as usize;
        if count == 0 || count > 2 {
            return Err(JwsError::InvalidDer(format!(
                "unsupported length encoding 0x{:02x}",
                first
            )));
        }
        let mut len = 0usize;
        for _ in 0..count {
            let byte = *der
                .get(*pos)
                .ok_or_else(|| JwsError::InvalidDer("truncated long-form length".to_string()))?;
            *pos += 1;
            len = (len << 8) | byte as usize;
        }
        len
    };

    Ok((tag, len))
}

/// Decode the payload (middle segment) of a compact JWS without verifying
/// the signature. Apple's inner transaction and renewal payloads are
/// consumed this way; signer authenticity is not checked here.
pub fn decode_jws_payload(jws: &str) -> Result<serde_json::Value, JwsError> {
    let mut segments = jws.trim().split('.');
    let _header = segments.next().ok_or(JwsError::InvalidFormat)?;
    let payload = segments.next().ok_or(JwsError::InvalidFormat)?;

    let bytes = b64url_decode(payload)?;
    let text = String::from_utf8(bytes).map_err(|e| JwsError::Json(e.to_string()))?;

    serde_json::from_str(&text).map_err(|e| JwsError::Json(e.to_string()))
}

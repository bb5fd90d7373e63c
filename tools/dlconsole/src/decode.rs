//! Byte-to-text decoding for child process output.
//!
//! Tools on Windows commonly write in the console code page, so Shift_JIS is
//! tried first there and UTF-8 first everywhere else. Lossy UTF-8 is the last
//! resort so a line is never dropped.

use encoding_rs::SHIFT_JIS;

pub fn decode_line(bytes: &[u8]) -> String {
    if cfg!(windows) {
        decode_shift_jis(bytes)
            .or_else(|| decode_utf8(bytes))
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
    } else {
        decode_utf8(bytes)
            .or_else(|| decode_shift_jis(bytes))
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
    }
}

fn decode_utf8(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(ToOwned::to_owned)
}

fn decode_shift_jis(bytes: &[u8]) -> Option<String> {
    let (decoded, _, had_errors) = SHIFT_JIS.decode(bytes);
    if had_errors {
        None
    } else {
        Some(decoded.into_owned())
    }
}

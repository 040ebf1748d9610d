//! Byte pattern search used to find JPEG markers and multipart boundaries.

/// Signature of a JPEG file (start of image marker).
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Returns the index of the first position where `needle` fully matches
/// inside `haystack`, scanning left to right.
///
/// An empty needle never matches.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let (&first, rest) = needle.split_first()?;
    if haystack.len() < needle.len() {
        return None;
    }

    let last_start = haystack.len() - needle.len();
    let mut start = 0;
    while start <= last_start {
        // jump to the next candidate first byte
        let offset = haystack[start..=last_start]
            .iter()
            .position(|&b| b == first)?;
        start += offset;
        if &haystack[start + 1..start + needle.len()] == rest {
            return Some(start);
        }
        start += 1;
    }

    None
}

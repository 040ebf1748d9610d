use std::fmt;

use crate::{Result, StreamError};

/// Delimiter prepended to the boundary value at the start of every part.
pub const BOUNDARY_PREFIX: &str = "--";

/// Multipart boundary token separating consecutive JPEG parts.
///
/// Always carries the `--` prefix and is never empty beyond it.
#[derive(Clone, PartialEq, Eq)]
pub struct Boundary(Vec<u8>);

impl Boundary {
    /// Build a boundary from a raw value, adding the `--` prefix when the
    /// value does not already carry it.
    pub fn new(value: &str) -> Result<Self> {
        let value = value.trim().trim_matches('"').trim();
        let bare = value.strip_prefix(BOUNDARY_PREFIX).unwrap_or(value);
        if bare.is_empty() {
            return Err(StreamError::protocol("empty multipart boundary"));
        }

        let mut token = Vec::with_capacity(BOUNDARY_PREFIX.len() + bare.len());
        token.extend_from_slice(BOUNDARY_PREFIX.as_bytes());
        token.extend_from_slice(bare.as_bytes());
        Ok(Self(token))
    }

    /// Parse the boundary out of a `Content-Type` header value.
    ///
    /// The `boundary` parameter is preferred; cameras that send a bare
    /// `type=value` header are accepted as well.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self> {
        let content_type = content_type
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                StreamError::protocol("missing Content-Type header")
            })?;

        if !content_type.contains('=') {
            return Err(StreamError::protocol(format!(
                "Content-Type `{content_type}` declares no boundary, \
                 the camera is likely not returning an MJPEG stream"
            )));
        }

        let named = content_type.split(';').find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("boundary")
                .then_some(value)
        });

        let value = match named {
            Some(value) => value,
            None => content_type
                .split_once('=')
                .map(|(_, rest)| rest.split(';').next().unwrap_or(rest))
                .unwrap_or_default(),
        };

        Self::new(value)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Boundary({})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case("multipart/x-mixed-replace; boundary=myboundary", "--myboundary")]
    #[case("multipart/x-mixed-replace;boundary=--myboundary", "--myboundary")]
    #[case("multipart/x-mixed-replace; boundary=\"quoted\"", "--quoted")]
    #[case(
        "multipart/x-mixed-replace; BOUNDARY=abc; charset=utf-8",
        "--abc"
    )]
    #[case("multipart/x-mixed-replace; charset=utf-8; boundary=b", "--b")]
    #[case("multipart/x-mixed-replace=frame", "--frame")]
    #[case("  multipart/x-mixed-replace; boundary= spaced ", "--spaced")]
    fn parses_boundary(#[case] header: &str, #[case] expected: &str) {
        let boundary = Boundary::from_content_type(Some(header)).unwrap();
        assert_eq!(boundary.as_bytes(), expected.as_bytes());
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("image/jpeg"))]
    #[case(Some("multipart/x-mixed-replace; boundary="))]
    #[case(Some("multipart/x-mixed-replace; boundary=\"--\""))]
    fn rejects_header_without_boundary(#[case] header: Option<&str>) {
        let err = Boundary::from_content_type(header).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn display_shows_token() {
        let boundary = Boundary::new("frame").unwrap();
        assert_eq!(boundary.to_string(), "--frame");
        assert_eq!(boundary.len(), 7);
    }
}

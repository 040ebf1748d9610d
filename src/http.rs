use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use tokio_util::io::StreamReader;

use crate::boundary::Boundary;
use crate::config::{StreamConfig, StreamEndpoint};
use crate::{Result, StreamError};

type ChunkStream =
    Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// Response body of a multipart stream, readable as a byte stream.
pub type BodyReader = StreamReader<ChunkStream, Bytes>;

/// Adapt a stream of body chunks for reading. Transport errors surface as
/// I/O errors of the reader.
pub fn body_reader<S>(chunks: S) -> BodyReader
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let chunks = chunks
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    StreamReader::new(Box::pin(chunks))
}

/// Send the GET request and validate that the reply is a multipart stream.
///
/// Basic credentials are attached when the endpoint carries any.
pub async fn connect(
    endpoint: &StreamEndpoint,
    config: &StreamConfig,
) -> Result<(Boundary, BodyReader)> {
    let label = endpoint.label();
    let mut headers = HeaderMap::new();
    let user_agent =
        HeaderValue::from_str(&config.user_agent).map_err(|_| {
            StreamError::config("user agent is not a valid header")
        })?;
    headers.insert(USER_AGENT, user_agent);

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout())
        .build()?;

    let mut request = client.get(endpoint.url.clone());
    if let Some(credentials) = endpoint.auth() {
        debug!("mjpeg/{}: using basic authentication", label);
        request = request.basic_auth(
            &credentials.username,
            Some(&credentials.password),
        );
    }

    let response =
        tokio::time::timeout(config.connect_timeout(), request.send())
            .await
            .map_err(|_| {
                StreamError::Connection(format!(
                    "no response from {} within {:?}",
                    label,
                    config.connect_timeout()
                ))
            })??;

    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let boundary = Boundary::from_content_type(content_type)?;
    info!("mjpeg/{}: response received, boundary {}", label, boundary);

    Ok((boundary, body_reader(response.bytes_stream())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn body_reader_splits_large_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"0123456789")),
            Ok(Bytes::from_static(b"ab")),
        ];
        let mut reader = body_reader(stream::iter(chunks));

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"0123");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"456789ab");
    }

    #[tokio::test]
    async fn body_reader_skips_empty_chunks() {
        let chunks = vec![
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"x")),
        ];
        let mut reader = body_reader(stream::iter(chunks));

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 1);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }
}

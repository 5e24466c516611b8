// Chunked HTTP framing for live frames, for clients that cannot upgrade
// to a WebSocket. Each chunk is a 4-byte big-endian length followed by one
// JSON frame, Brotli-compressed per chunk when the client accepts it.
use crate::domain::metric::StreamFrame;
use async_compression::tokio::bufread::BrotliEncoder;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::Stream;
use tokio::io::AsyncReadExt;

pub const CONTENT_TYPE: &str = "application/x-ndframe+json";

pub fn chunked_frame_stream<S>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = StreamFrame> + Send + 'static,
{
    let byte_stream = stream.then(move |frame| async move { encode_chunk(&frame, compress).await });

    // No Content-Encoding header: chunks are compressed individually, the
    // HTTP body as a whole is not.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn encode_chunk(frame: &StreamFrame, compress: bool) -> Result<Bytes, std::io::Error> {
    let json = serde_json::to_vec(frame)?;

    let payload = if compress {
        let mut encoder = BrotliEncoder::new(std::io::Cursor::new(json));
        let mut compressed = Vec::new();
        encoder.read_to_end(&mut compressed).await?;
        compressed
    } else {
        json
    };

    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(payload.len() as u32);
    chunk.put_slice(&payload);
    Ok(chunk.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::MetricValue;
    use async_compression::tokio::bufread::BrotliDecoder;
    use bytes::Buf;

    fn frame() -> StreamFrame {
        StreamFrame::Value {
            binding: "w1".into(),
            topic: "online-users".into(),
            seq: 3,
            metric: MetricValue::new(512),
        }
    }

    #[tokio::test]
    async fn test_plain_chunk_is_length_prefixed_json() {
        let mut chunk = encode_chunk(&frame(), false).await.unwrap();
        let len = chunk.get_u32() as usize;
        assert_eq!(len, chunk.len());
        let decoded: StreamFrame = serde_json::from_slice(&chunk).unwrap();
        assert_eq!(decoded, frame());
    }

    #[tokio::test]
    async fn test_compressed_chunk_decodes() {
        let mut chunk = encode_chunk(&frame(), true).await.unwrap();
        let len = chunk.get_u32() as usize;
        assert_eq!(len, chunk.len());

        let mut decoder = BrotliDecoder::new(std::io::Cursor::new(chunk.to_vec()));
        let mut json = Vec::new();
        decoder.read_to_end(&mut json).await.unwrap();
        assert_eq!(serde_json::from_slice::<StreamFrame>(&json).unwrap(), frame());
    }

    #[tokio::test]
    async fn test_response_headers() {
        let response = chunked_frame_stream(futures::stream::iter(vec![frame()]), true).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], CONTENT_TYPE);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }
}

use std::error::Error as StdError;

use exn::ResultExt;
use futures::{Stream, StreamExt};

use crate::error::{ErrorKind, Result};
use crate::models::Payload;

const INITIAL_CAPACITY: usize = 64 * 1024;

/// Read a body stream into memory, stopping at `ceiling` bytes.
///
/// The ceiling is enforced on what is actually read, never on a declared
/// `Content-Length`, so chunked bodies and lying headers are bounded the same
/// way. Reading stops as soon as the ceiling is reached and the stream is
/// dropped, which closes the underlying connection. A body that fills the
/// ceiling exactly is reported truncated, since telling it apart would take
/// one more pull.
pub async fn read_bounded<S, B, E>(stream: S, ceiling: usize) -> Result<Payload>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: StdError + Send + Sync + 'static,
{
    let mut stream = std::pin::pin!(stream);
    let mut bytes = Vec::with_capacity(ceiling.min(INITIAL_CAPACITY));
    let mut truncated = false;
    loop {
        if bytes.len() >= ceiling {
            truncated = true;
            break;
        }
        let Some(chunk) = stream.next().await else {
            break;
        };
        let chunk = chunk.or_raise(|| ErrorKind::Network("body stream interrupted".to_string()))?;
        let chunk = chunk.as_ref();
        let room = ceiling - bytes.len();
        bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
    if truncated {
        tracing::debug!(ceiling, "response body truncated at ceiling");
    }
    Ok(Payload {
        bytes,
        truncated,
        declared_length: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunks(count: usize, size: usize) -> Vec<std::result::Result<Vec<u8>, io::Error>> {
        (0..count).map(|_| Ok(vec![b'a'; size])).collect()
    }

    #[tokio::test]
    async fn reads_small_bodies_whole() {
        let payload = read_bounded(stream::iter(chunks(3, 10)), 100).await.unwrap();
        assert_eq!(payload.len(), 30);
        assert!(!payload.truncated);
    }

    #[tokio::test]
    async fn one_byte_short_of_the_ceiling_is_whole() {
        let payload = read_bounded(stream::iter(chunks(3, 33)), 100).await.unwrap();
        assert_eq!(payload.len(), 99);
        assert!(!payload.truncated);
    }

    #[tokio::test]
    async fn filling_the_ceiling_counts_as_truncated() {
        let payload = read_bounded(stream::iter(chunks(4, 25)), 100).await.unwrap();
        assert_eq!(payload.len(), 100);
        assert!(payload.truncated);
    }

    #[tokio::test]
    async fn stops_pulling_once_the_ceiling_is_hit() {
        // 20 MiB offered in 64 KiB chunks, 1 MiB ceiling.
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let body = stream::iter(0..320).map(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(vec![b'x'; 64 * 1024])
        });
        let payload = read_bounded(body, 1024 * 1024).await.unwrap();
        assert_eq!(payload.len(), 1024 * 1024);
        assert!(payload.truncated);
        // Sixteen chunks fill the ceiling; the seventeenth is never awaited.
        assert_eq!(pulled.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn stream_errors_are_network_errors() {
        let body = stream::iter(vec![Ok(vec![1u8; 4]), Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))]);
        let error = read_bounded(body, 100).await.unwrap_err();
        assert!(matches!(&*error, ErrorKind::Network(_)));
        assert!(error.is_retryable());
    }
}

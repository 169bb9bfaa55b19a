//! A tiny canned HTTP/1.1 server for adapter tests.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub(crate) enum Body {
    Fixed(Vec<u8>),
    /// Endless chunked body, written until the client hangs up.
    EndlessChunked,
}

#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Body,
}
impl Reply {
    pub(crate) fn json(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Body::Fixed(body.into()),
        }
    }

    pub(crate) fn html(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".into(), "text/html".into())],
            body: Body::Fixed(body.into()),
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Fixed(b"{}".to_vec()),
        }
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A request as the server saw it: request line plus raw headers and body.
#[derive(Debug, Clone)]
pub(crate) struct Seen {
    pub(crate) line: String,
    pub(crate) head: String,
    pub(crate) body: String,
}

pub(crate) struct Server {
    pub(crate) base: String,
    pub(crate) seen: Arc<Mutex<Vec<Seen>>>,
}

/// Serve `routes` (matched by path-and-query prefix, first match wins) until
/// the test ends. Unmatched paths get a 404.
pub(crate) async fn serve(routes: Vec<(&'static str, Reply)>) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/", listener.local_addr().unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let routes = Arc::new(routes);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let _ = handle(stream, &routes, &log).await;
            });
        }
    });
    Server { base, seen }
}

async fn handle(mut stream: TcpStream, routes: &[(&'static str, Reply)], log: &Mutex<Vec<Seen>>) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(at) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break at + 4;
        }
    };
    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let length = head
        .lines()
        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>()))
        .and_then(Result::ok)
        .unwrap_or(0);
    while buffer.len() < head_end + length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    let line = head.lines().next().unwrap_or_default().to_string();
    let target = line.split(' ').nth(1).unwrap_or("/").to_string();
    log.lock().unwrap().push(Seen {
        line: line.clone(),
        head: head.clone(),
        body: String::from_utf8_lossy(&buffer[head_end..]).to_string(),
    });
    let reply = routes
        .iter()
        .find(|(prefix, _)| target.starts_with(prefix))
        .map(|(_, reply)| reply.clone())
        .unwrap_or_else(|| Reply::status(404));
    let mut response = format!("HTTP/1.1 {} X\r\nConnection: close\r\n", reply.status);
    for (name, value) in &reply.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    match reply.body {
        Body::Fixed(body) => {
            response.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
            stream.write_all(response.as_bytes()).await?;
            stream.write_all(&body).await?;
        },
        Body::EndlessChunked => {
            response.push_str("Transfer-Encoding: chunked\r\n\r\n");
            stream.write_all(response.as_bytes()).await?;
            let piece = vec![b'a'; 16 * 1024];
            loop {
                stream.write_all(format!("{:x}\r\n", piece.len()).as_bytes()).await?;
                stream.write_all(&piece).await?;
                stream.write_all(b"\r\n").await?;
            }
        },
    }
    stream.shutdown().await
}

//! Loopback HTTP server for client tests.
//!
//! Answers each connection with the canned response of the first matching
//! `(method, path)` route (404 otherwise) and records every request.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub(crate) struct MockResponse {
    status: u16,
    content_type: &'static str,
    body: String,
    hold_open: bool,
}

impl MockResponse {
    pub(crate) fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
            hold_open: false,
        }
    }

    pub(crate) fn empty(status: u16) -> Self {
        Self::json(status, "")
    }

    /// A complete `text/event-stream` body; the connection closes after it.
    pub(crate) fn event_stream(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: body.to_string(),
            hold_open: false,
        }
    }

    /// Sends `body` and then keeps the connection open forever.
    pub(crate) fn stalled_event_stream(body: &str) -> Self {
        Self {
            hold_open: true,
            ..Self::event_stream(body)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Routes = Arc<Vec<(String, String, MockResponse)>>;
type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

pub(crate) struct MockServer {
    url: String,
    requests: Recorded,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn start(routes: Vec<(&str, &str, MockResponse)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let routes: Routes = Arc::new(
            routes
                .into_iter()
                .map(|(m, p, r)| (m.to_string(), p.to_string(), r))
                .collect(),
        );
        let requests: Recorded = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, routes.clone(), recorded.clone()));
            }
        });

        Self {
            url: format!("http://127.0.0.1:{port}"),
            requests,
            handle,
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, routes: Routes, recorded: Recorded) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let response = routes
        .iter()
        .find(|(m, p, _)| *m == request.method && *p == request.path)
        .map(|(_, _, r)| r.clone())
        .unwrap_or_else(|| MockResponse::json(404, r#"{"error":"no route"}"#));
    recorded.lock().unwrap().push(request);

    let reason = if (200..300).contains(&response.status) {
        "OK"
    } else {
        "Error"
    };
    let head = if response.hold_open {
        format!(
            "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nCache-Control: no-cache\r\n\r\n",
            response.status, response.content_type
        )
    } else {
        format!(
            "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            response.status,
            response.content_type,
            response.body.len()
        )
    };
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(response.body.as_bytes()).await;
    let _ = stream.flush().await;

    if response.hold_open {
        std::future::pending::<()>().await;
    }
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if !read_more(stream, &mut buf).await {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?;
    let path = target.split('?').next().unwrap_or(target).to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let mut rest = buf.split_off(head_end);
    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok());
    let chunked = headers
        .iter()
        .any(|(k, v)| k == "transfer-encoding" && v.eq_ignore_ascii_case("chunked"));

    let body = if let Some(len) = content_length {
        while rest.len() < len {
            if !read_more(stream, &mut rest).await {
                break;
            }
        }
        rest.truncate(len);
        rest
    } else if chunked {
        read_chunked(stream, rest).await?
    } else {
        Vec::new()
    };

    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

async fn read_chunked(stream: &mut TcpStream, mut raw: Vec<u8>) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    let mut pos = 0;
    loop {
        let line_end = loop {
            if let Some(i) = find(&raw[pos..], b"\r\n") {
                break pos + i;
            }
            if !read_more(stream, &mut raw).await {
                return None;
            }
        };
        let size_line = String::from_utf8_lossy(&raw[pos..line_end]).into_owned();
        let size = usize::from_str_radix(size_line.split(';').next()?.trim(), 16).ok()?;
        let data_start = line_end + 2;
        while raw.len() < data_start + size + 2 {
            if !read_more(stream, &mut raw).await {
                return None;
            }
        }
        if size == 0 {
            return Some(body);
        }
        body.extend_from_slice(&raw[data_start..data_start + size]);
        pos = data_start + size + 2;
    }
}

async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut tmp = [0u8; 8192];
    match stream.read(&mut tmp).await {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&tmp[..n]);
            true
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

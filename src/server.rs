//! Read-only status page. `GET /` renders a table of titles and sizes,
//! `GET /update` returns the current sizes as a JSON array in record order.
//! It only ever stats the target files.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::downloader::downloaded_size;
use crate::errors::{Result, ScrapeError};
use crate::record::StreamRecord;

struct StatusState {
    records: Arc<[StreamRecord]>,
    output_dir: PathBuf,
    poll_interval: Duration,
}

pub struct ProgressServer {
    listener: TcpListener,
    state: Arc<StatusState>,
}

impl ProgressServer {
    /// Binds the status page on `addr`; port 0 picks a free port.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Bind`] if the address cannot be bound.
    pub async fn bind(
        addr: &str,
        records: Arc<[StreamRecord]>,
        output_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ScrapeError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        Ok(ProgressServer {
            listener,
            state: Arc::new(StatusState {
                records,
                output_dir: output_dir.into(),
                poll_interval,
            }),
        })
    }

    /// # Errors
    ///
    /// Fails if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(|source| ScrapeError::Bind {
            addr: "status server".to_owned(),
            source,
        })
    }

    /// # Errors
    ///
    /// Fails if the socket has no local address.
    pub fn url(&self) -> Result<String> {
        let addr = self.local_addr()?;
        if addr.ip().is_unspecified() {
            Ok(format!("http://localhost:{}/", addr.port()))
        } else {
            Ok(format!("http://{addr}/"))
        }
    }

    /// Serves requests until the task is dropped.
    pub async fn serve(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    log::warn!("Fail to accept status connection: {e}");
                    continue;
                }
            };
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &state).await {
                    log::warn!("Fail to answer {peer}: {e}");
                }
            });
        }
    }
}

async fn handle_connection(mut stream: TcpStream, state: &StatusState) -> std::io::Result<()> {
    let mut reader = BufReader::new(&mut stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    // Drain the headers; nothing in them matters here.
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts
        .next()
        .unwrap_or_default()
        .split('?')
        .next()
        .unwrap_or_default();

    let (status, content_type, body) = match (method, path) {
        ("GET", "/") => ("200 OK", "text/html; charset=utf-8", render_index(state).await),
        ("GET", "/update") => match serde_json::to_string(&current_sizes(state).await) {
            Ok(json) => ("200 OK", "application/json", json),
            Err(e) => {
                log::warn!("Fail to encode sizes: {e}");
                ("500 Internal Server Error", "text/plain", String::new())
            }
        },
        ("GET", _) => ("404 Not Found", "text/plain", "not found".to_owned()),
        _ => ("405 Method Not Allowed", "text/plain", "method not allowed".to_owned()),
    };

    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body.as_bytes()).await?;
    stream.shutdown().await
}

async fn current_sizes(state: &StatusState) -> Vec<String> {
    let mut sizes = Vec::with_capacity(state.records.len());
    for record in state.records.iter() {
        sizes.push(downloaded_size(&state.output_dir, record).await);
    }
    sizes
}

async fn render_index(state: &StatusState) -> String {
    let sizes = current_sizes(state).await;
    let mut rows = String::new();
    for (i, (record, size)) in state.records.iter().zip(&sizes).enumerate() {
        let _ = write!(
            rows,
            "\n  <tr>\n    <td align=\"center\">{}</td>\n    <td align=\"center\" style=\"min-width: 100px;\" id=\"size_{i}\">{}</td>\n  </tr>",
            escape_html(&record.title),
            escape_html(size),
        );
    }
    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <script type="text/javascript">
    function update() {{
      var xhr = new XMLHttpRequest();
      xhr.onreadystatechange = function() {{
        if (xhr.readyState === 4 && xhr.status === 200) {{
          var sizes = JSON.parse(xhr.responseText);
          for (var i = 0; i < sizes.length; i++) {{
            document.getElementById("size_" + i).innerText = sizes[i];
          }}
        }}
      }};
      xhr.open("GET", "/update");
      xhr.send();
    }}
    setInterval(update, {interval});
  </script>
</head>
<body>
<table border="1">
  <tr><th>File</th><th>Size</th></tr>{rows}
</table>
</body>
</html>
"#,
        interval = state.poll_interval.as_millis(),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

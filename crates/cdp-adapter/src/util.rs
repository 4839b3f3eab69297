use anyhow::{anyhow, Result};
use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};
use url::Url;

use crate::error::{AdapterError, AdapterErrorKind};

/// Extract the DevTools websocket URL from Chromium stderr output.
pub async fn extract_ws_url(child: &mut Child) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium process missing stderr handle"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut captured = Vec::new();

    let reader = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(ws) = parse_devtools_line(&line) {
                return Ok(ws);
            }
            captured.push(line);
        }
        Err(anyhow!(
            "chromium exited before exposing devtools websocket url. stderr preview: {}",
            captured
                .iter()
                .take(8)
                .cloned()
                .collect::<Vec<_>>()
                .join(" | ")
        ))
    };

    timeout(Duration::from_secs(20), reader)
        .await
        .map_err(|_| anyhow!("timed out waiting for chromium devtools websocket url"))?
}

/// `DevTools listening on ws://...` → the websocket URL.
pub fn parse_devtools_line(line: &str) -> Option<String> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then(|| ws.to_string())
}

pub fn validate_ws_url(raw: &str) -> Result<(), AdapterError> {
    let url = Url::parse(raw).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Unavailable)
            .with_hint(format!("invalid devtools websocket url {raw}: {err}"))
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(AdapterError::new(AdapterErrorKind::Unavailable)
            .with_hint(format!("devtools url must use ws/wss, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_devtools_banner() {
        let line = "DevTools listening on ws://127.0.0.1:39123/devtools/browser/7f1c";
        assert_eq!(
            parse_devtools_line(line).as_deref(),
            Some("ws://127.0.0.1:39123/devtools/browser/7f1c")
        );
        assert!(parse_devtools_line("[0101/000000.000:ERROR:gpu] oops").is_none());
    }

    #[test]
    fn rejects_http_endpoints() {
        assert!(validate_ws_url("ws://127.0.0.1:9222/devtools/browser/x").is_ok());
        let err = validate_ws_url("http://127.0.0.1:9222/json/version").unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Unavailable);
        assert!(validate_ws_url("not a url").is_err());
    }
}

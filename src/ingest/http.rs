//! HTTP MJPEG connector.
//!
//! Opens a streaming GET against a camera relay and hands the body reader to
//! the ingestion supervisor. The timeout bounds the connect phase and every
//! individual read, so a stalled relay counts as a failed stream. The body
//! itself has no length and is read until it fails or ends.

use anyhow::{anyhow, bail, Context, Result};
use std::io::Read;
use std::time::Duration;
use url::Url;

use super::supervisor::StreamConnector;

pub struct HttpMjpegConnector {
    url: String,
    agent: ureq::Agent,
}

impl HttpMjpegConnector {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("parse stream url '{}'", url))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => bail!("unsupported stream scheme '{}'; expected http(s)", other),
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Ok(Self {
            url: url.to_string(),
            agent,
        })
    }
}

impl StreamConnector for HttpMjpegConnector {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn connect(&mut self) -> Result<Box<dyn Read + Send>> {
        let response = match self.agent.get(&self.url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(anyhow!("stream returned status code {}", code));
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context("connect to mjpeg stream"));
            }
        };
        if response.status() != 200 {
            bail!("stream returned status code {}", response.status());
        }
        let content_type = response.header("Content-Type").unwrap_or("");
        if !content_type.to_lowercase().contains("multipart") {
            log::debug!(
                "stream {} has content type '{}'; scanning for jpeg markers anyway",
                self.url,
                content_type
            );
        }
        Ok(Box::new(response.into_reader()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        assert!(HttpMjpegConnector::new("rtsp://camera/stream", Duration::from_secs(1)).is_err());
        assert!(HttpMjpegConnector::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn accepts_http_urls() {
        let connector =
            HttpMjpegConnector::new("http://192.168.2.1:5000/camera/1", Duration::from_secs(10))
                .unwrap();
        assert_eq!(connector.describe(), "http://192.168.2.1:5000/camera/1");
    }
}

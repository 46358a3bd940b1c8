//! Verification backend client.
//!
//! Posts the frame that passed the dual check to the remote verification
//! API as multipart form data. At most one request is in flight per client;
//! a second submission while one is outstanding is rejected, not queued.

use std::io::Cursor;
use std::sync::Arc;

use facegate_core::{Frame, SessionError};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::Config;

/// Verdict returned by the verification API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Application-level status; anything but 200 is a rejection.
    #[serde(default = "ok_code")]
    pub code: u16,
    #[serde(rename = "isMatch", default)]
    pub is_match: bool,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

fn ok_code() -> u16 {
    200
}

impl Verdict {
    pub fn accepted(&self) -> bool {
        self.code == 200 && self.is_match
    }
}

#[derive(Clone)]
pub struct VerificationClient {
    client: reqwest::Client,
    url: String,
    token: String,
    address: String,
    in_flight: Arc<Semaphore>,
}

impl VerificationClient {
    pub fn new(config: &Config) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(config.backend_timeout())
            .build()
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: config.verify_url(),
            token: config.auth_token.clone(),
            address: config.address.clone(),
            in_flight: Arc::new(Semaphore::new(1)),
        })
    }

    /// Submit a JPEG capture. `address` overrides the configured one.
    ///
    /// Non-2xx responses and transport failures are `BackendUnavailable`;
    /// the caller decides whether to offer a retry.
    pub async fn submit(
        &self,
        jpeg: Vec<u8>,
        address: Option<&str>,
    ) -> Result<Verdict, SessionError> {
        let _permit = self
            .in_flight
            .try_acquire()
            .map_err(|_| SessionError::SubmissionInFlight)?;

        let address = address.unwrap_or(&self.address).to_string();
        let part = Part::bytes(jpeg)
            .file_name("capture.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| SessionError::InvalidInput(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("token", self.token.clone())
            .text("address", address.clone());

        tracing::info!(url = %self.url, address = %address, "submitting capture for verification");

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "verification request failed");
                SessionError::BackendUnavailable(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::error!(%status, "verification backend returned error status");
            return Err(SessionError::BackendUnavailable(format!(
                "server error: {status}"
            )));
        }

        let verdict: Verdict = resp.json().await.map_err(|e| {
            SessionError::BackendUnavailable(format!("malformed verdict: {e}"))
        })?;

        tracing::info!(
            accepted = verdict.accepted(),
            user_id = ?verdict.user_id,
            score = ?verdict.score,
            "verification verdict"
        );
        Ok(verdict)
    }

    /// Encode a raw frame and submit it.
    pub async fn submit_frame(
        &self,
        frame: &Frame,
        address: Option<&str>,
    ) -> Result<Verdict, SessionError> {
        let jpeg = encode_jpeg(frame)?;
        self.submit(jpeg, address).await
    }
}

/// Encode a packed RGBA8 frame as JPEG.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, SessionError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(SessionError::InvalidInput(format!(
            "frame {} has no pixels ({}x{})",
            frame.seq, frame.width, frame.height
        )));
    }
    let rgba = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| {
            SessionError::InvalidInput(format!(
                "frame {} buffer is {} bytes, expected {}",
                frame.seq,
                frame.data.len(),
                frame.width as usize * frame.height as usize * 4
            ))
        })?;
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, image::ImageFormat::Jpeg)
        .map_err(|e| SessionError::InvalidInput(format!("jpeg encode failed: {e}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve a single canned HTTP response after reading the full request.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
        delay: Duration,
    ) -> (String, oneshot::Receiver<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = oneshot::channel();

        tokio::spawn(async move {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let mut seen = Vec::new();
            let mut buf = vec![0u8; 16 * 1024];
            loop {
                let n = sock.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if seen.ends_with(b"--\r\n") || seen.ends_with(b"0\r\n\r\n") {
                    break;
                }
            }
            tokio::time::sleep(delay).await;
            let resp = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.shutdown().await;
            let _ = seen_tx.send(seen);
        });

        (format!("http://{addr}"), seen_rx)
    }

    fn client(url: String) -> VerificationClient {
        VerificationClient::new(&Config {
            backend_url: url,
            address: "Room 101".to_string(),
            backend_timeout_secs: 5,
            ..Config::default()
        })
        .unwrap()
    }

    const MATCH: &str = r#"{"code":200,"isMatch":true,"userId":"ldh","score":0.71,"msg":"Success","address":"Room 101"}"#;

    #[tokio::test]
    async fn test_submit_sends_multipart_and_parses_verdict() {
        let (url, seen) = serve_once("200 OK", MATCH, Duration::ZERO).await;
        let verdict = client(url).submit(vec![0xFF, 0xD8, 0xFF], None).await.unwrap();
        assert!(verdict.accepted());
        assert_eq!(verdict.user_id.as_deref(), Some("ldh"));

        let request = String::from_utf8_lossy(&seen.await.unwrap()).into_owned();
        assert!(request.starts_with("POST /api/face/verify"));
        assert!(request.contains("filename=\"capture.jpg\""));
        assert!(request.contains("name=\"token\""));
        assert!(request.contains("demo_token"));
        assert!(request.contains("Room 101"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_backend_unavailable() {
        let (url, _) = serve_once("503 Service Unavailable", "{}", Duration::ZERO).await;
        let err = client(url).submit(vec![1, 2, 3], None).await.unwrap_err();
        assert!(matches!(err, SessionError::BackendUnavailable(ref m) if m.contains("503")));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_application_rejection_is_a_verdict() {
        let (url, _) = serve_once(
            "200 OK",
            r#"{"code":400,"msg":"No face detected"}"#,
            Duration::ZERO,
        )
        .await;
        let verdict = client(url).submit(vec![1], Some("Lab")).await.unwrap();
        assert!(!verdict.accepted());
        assert_eq!(verdict.msg.as_deref(), Some("No face detected"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_backend_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(format!("http://{addr}"))
            .submit(vec![1], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::BackendUnavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_submission_while_in_flight_rejected() {
        let (url, _) = serve_once("200 OK", MATCH, Duration::from_millis(400)).await;
        let client = client(url);

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.submit(vec![1], None).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = client.submit(vec![2], None).await.unwrap_err();
        assert_eq!(err, SessionError::SubmissionInFlight);
        assert!(first.await.unwrap().unwrap().accepted());
    }

    #[test]
    fn test_encode_jpeg() {
        let frame = Frame::new(3, 4, 2, vec![128u8; 4 * 2 * 4]);
        let jpeg = encode_jpeg(&frame).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_jpeg_rejects_bad_buffers() {
        assert!(matches!(
            encode_jpeg(&Frame::empty(1)),
            Err(SessionError::InvalidInput(_))
        ));
        let short = Frame::new(2, 4, 4, vec![0u8; 10]);
        assert!(matches!(
            encode_jpeg(&short),
            Err(SessionError::InvalidInput(_))
        ));
    }
}

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, ClientBuilder, header::CONTENT_TYPE};

const OCR_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns a CAPTCHA image into a guess. `None` means the solver gave up.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, image: &[u8]) -> anyhow::Result<Option<String>>;
}

/// Hands the image to an HTTP OCR service and reads the guess back as plain text.
pub struct OcrServiceSolver {
    client: Client,
    endpoint: String,
}

impl OcrServiceSolver {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = ClientBuilder::new().timeout(OCR_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl CaptchaSolver for OcrServiceSolver {
    async fn solve(&self, image: &[u8]) -> anyhow::Result<Option<String>> {
        if image.is_empty() {
            anyhow::bail!("无法识别图像文件: empty body");
        }
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .with_context(|| format!("OCR service at {} unreachable", self.endpoint))?
            .error_for_status()?;
        let text = response.text().await?;
        debug!("OCR service answered {text:?}");
        Ok(normalize_guess(&text))
    }
}

/// Strips whitespace and quotes some OCR services wrap their answer in.
fn normalize_guess(raw: &str) -> Option<String> {
    let guess: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    (!guess.is_empty()).then_some(guess)
}

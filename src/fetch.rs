use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{info, warn};

use crate::domain::Accession;
use crate::error::KiraError;
use crate::fs_util;
use crate::normalize;
use crate::record::RunRecord;
use crate::sleeper::{Sleeper, ThreadSleeper};

pub const DEFAULT_METADATA_URL: &str =
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi?db=sra&id={accession}";

const TOO_MANY_REQUESTS: u16 = 429;
const MAX_JITTER_SECS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

pub trait MetadataTransport: Send + Sync {
    fn get(&self, accession: &Accession) -> Result<TransportResponse, KiraError>;
}

impl<T: MetadataTransport + ?Sized> MetadataTransport for Arc<T> {
    fn get(&self, accession: &Accession) -> Result<TransportResponse, KiraError> {
        (**self).get(accession)
    }
}

#[derive(Clone)]
pub struct SraHttpTransport {
    client: Client,
    url_template: String,
    api_key: Option<String>,
}

impl SraHttpTransport {
    pub fn new(url_template: &str, timeout: Duration) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-sra/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::SraHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| KiraError::SraHttp(err.to_string()))?;

        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            url_template: url_template.to_string(),
            api_key,
        })
    }

    pub fn url(&self, accession: &Accession) -> String {
        metadata_url(&self.url_template, accession, self.api_key.as_deref())
    }
}

impl MetadataTransport for SraHttpTransport {
    fn get(&self, accession: &Accession) -> Result<TransportResponse, KiraError> {
        let response = self
            .client
            .get(self.url(accession))
            .send()
            .map_err(|err| KiraError::SraHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| KiraError::SraHttp(err.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

pub fn metadata_url(template: &str, accession: &Accession, api_key: Option<&str>) -> String {
    let mut url = template.replace("{accession}", accession.as_str());
    if let Some(key) = api_key {
        let separator = if url.contains('?') { '&' } else { '?' };
        url.push(separator);
        url.push_str("api_key=");
        url.push_str(key);
    }
    url
}

/// The raw metadata document as returned by the archive.
#[derive(Debug, Clone)]
pub struct RawMetadata {
    pub accession: Accession,
    pub xml: String,
}

impl RawMetadata {
    pub fn normalize(&self, target: Option<&str>) -> Result<Vec<RunRecord>, KiraError> {
        normalize::normalize(&self.xml, target)
    }
}

/// Fetches the metadata document for one accession.
///
/// A `429 Too Many Requests` answer is retried forever, sleeping
/// `attempt + U(0, 2)` seconds before attempt `attempt + 1`. Any other
/// non-success status fails the call immediately.
pub struct MetadataFetcher<T: MetadataTransport> {
    transport: T,
    sleeper: Arc<dyn Sleeper>,
    jitter: Box<dyn Fn() -> f64 + Send + Sync>,
}

impl<T: MetadataTransport> MetadataFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sleeper: Arc::new(ThreadSleeper),
            jitter: Box::new(uniform_jitter),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter<F>(mut self, jitter: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.jitter = Box::new(jitter);
        self
    }

    /// Fetches the document and, when `raw_sink` is given, writes the body to
    /// it verbatim before returning.
    pub fn fetch(
        &self,
        accession: &Accession,
        raw_sink: Option<&Utf8Path>,
    ) -> Result<RawMetadata, KiraError> {
        let mut attempt = 1u32;
        loop {
            let response = self.transport.get(accession)?;
            match response.status {
                200..=299 => {
                    info!(accession = %accession, bytes = response.body.len(), "metadata fetched");
                    if let Some(path) = raw_sink {
                        fs_util::write_bytes_atomic(path, response.body.as_bytes())?;
                    }
                    return Ok(RawMetadata {
                        accession: accession.clone(),
                        xml: response.body,
                    });
                }
                TOO_MANY_REQUESTS => {
                    let delay = rate_limit_delay(attempt, (self.jitter)());
                    warn!(
                        accession = %accession,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    self.sleeper.sleep(delay);
                    attempt = attempt.saturating_add(1);
                }
                status => {
                    let message = response.body.trim();
                    let message = if message.is_empty() {
                        "SRA metadata request failed".to_string()
                    } else {
                        message.chars().take(512).collect()
                    };
                    return Err(KiraError::SraStatus { status, message });
                }
            }
        }
    }
}

pub fn rate_limit_delay(attempt: u32, jitter: f64) -> Duration {
    let jitter = if jitter.is_finite() {
        jitter.clamp(0.0, MAX_JITTER_SECS)
    } else {
        0.0
    };
    Duration::from_secs_f64(f64::from(attempt) + jitter)
}

fn uniform_jitter() -> f64 {
    rand::thread_rng().gen_range(0.0..MAX_JITTER_SECS)
}

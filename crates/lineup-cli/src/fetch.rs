//! Production implementations of the two external capabilities: HTTP image
//! download and the remote face-embedding service client.

use std::io::Cursor;
use std::time::Duration;

use image::DynamicImage;
use lineup_core::{EmbedError, Embedding, FaceEmbedder, FetchError, ImageFetcher};

/// Downloads candidate photos over HTTP and decodes them.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<DynamicImage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let bytes = response.bytes().map_err(|e| FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        image::load_from_memory(&bytes).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Client for an external face-embedding service.
///
/// POSTs the image as JPEG bytes; the service answers with a JSON array of
/// fixed-dimension vectors, one per detected face, in detection order. An
/// empty array means no face was found.
pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    dimension: usize,
}

impl RemoteEmbedder {
    pub fn new(endpoint: &str, dimension: usize, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            dimension,
        })
    }
}

impl FaceEmbedder for RemoteEmbedder {
    fn embed_faces(&self, image: &DynamicImage) -> Result<Vec<Embedding>, EmbedError> {
        let mut encoded = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut encoded, image::ImageFormat::Jpeg)
            .map_err(|e| EmbedError::Backend(format!("jpeg encode: {e}")))?;

        let vectors: Vec<Vec<f32>> = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(encoded.into_inner())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| EmbedError::Backend(e.to_string()))?
            .json()
            .map_err(|e| EmbedError::Backend(format!("bad response: {e}")))?;

        for v in &vectors {
            if v.len() != self.dimension {
                return Err(EmbedError::Dimension {
                    expected: self.dimension,
                    found: v.len(),
                });
            }
        }
        Ok(vectors.into_iter().map(Embedding::new).collect())
    }
}

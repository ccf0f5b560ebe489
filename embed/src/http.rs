use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{EmbedConfig, ModelConfig};
use crate::embed::Embedder;
use crate::error::EmbedError;

/// Default face models.
pub const MODEL_VGG_FACE: &str = "vgg-face";
pub const MODEL_ARCFACE: &str = "arcface";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5005";
const DEFAULT_DIM: usize = 4096;

/// Error code a face service returns when the image holds no face.
const CODE_NO_FACE: &str = "no_face";

/// Face embedding request body.
#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    /// Base64-encoded image bytes.
    image: String,
}

/// Face embedding response. Exactly one of the fields is set.
#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Option<Vec<f64>>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Embedder backed by an HTTP face embedding service.
///
/// Wire format: `POST {base_url}/embed` with `{"model", "image"}` (image is
/// base64); the reply is `{"embedding": [...]}` or
/// `{"error": {"code", "message"}}`. The code `no_face` maps to
/// [`EmbedError::NoFace`].
pub struct HttpEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: ModelConfig,
}

impl HttpEmbedder {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(EmbedConfig::default().with_base_url(base_url))
    }

    pub fn with_config(cfg: EmbedConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: cfg.api_key,
            base_url: if cfg.base_url.is_empty() {
                DEFAULT_BASE_URL.to_string()
            } else {
                cfg.base_url.trim_end_matches('/').to_string()
            },
            model: ModelConfig {
                model: if cfg.model.is_empty() {
                    MODEL_VGG_FACE.to_string()
                } else {
                    cfg.model
                },
                dimension: if cfg.dimension == 0 {
                    DEFAULT_DIM
                } else {
                    cfg.dimension
                },
            },
        }
    }

    /// Uses a caller-built client (custom timeouts, proxies).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

/// Turns a decoded service reply into a vector or a typed failure.
fn parse_response(body: EmbedResponse, expected_dim: usize) -> Result<Vec<f32>, EmbedError> {
    if let Some(err) = body.error {
        if err.code == CODE_NO_FACE {
            return Err(EmbedError::NoFace);
        }
        return Err(EmbedError::Api(format!("{}: {}", err.code, err.message)));
    }
    let Some(embedding) = body.embedding else {
        return Err(EmbedError::Api("response has neither embedding nor error".into()));
    };
    if embedding.len() != expected_dim {
        return Err(EmbedError::DimensionMismatch {
            expected: expected_dim,
            got: embedding.len(),
        });
    }
    // float64 -> f32 conversion.
    Ok(embedding.iter().map(|&v| v as f32).collect())
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        if image.is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let url = format!("{}/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model.model,
            image: STANDARD.encode(image),
        };

        let mut req = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let resp = req.send().await.map_err(|e| EmbedError::Api(e.to_string()))?;

        // Error replies (4xx) still carry a JSON body with a code.
        let status = resp.status();
        let text = resp.text().await.map_err(|e| EmbedError::Api(e.to_string()))?;
        let parsed: EmbedResponse = serde_json::from_str(&text)
            .map_err(|_| EmbedError::Api(format!("HTTP {status}: {text}")))?;
        parse_response(parsed, self.model.dimension)
    }

    fn model(&self) -> &ModelConfig {
        &self.model
    }
}

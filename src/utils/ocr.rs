// utils/ocr.rs
//! Extraction du NNI (numéro national d'identification) à partir du texte
//! reconnu sur une carte d'identité scannée.
//!
//! Le moteur OCR lui-même est un service tiers, vu à travers le trait
//! [`TextRecognizer`]. Un échec de reconnaissance est signalé à l'appelant,
//! qui propose alors la saisie manuelle ; il n'y a jamais de nouvelle tentative.
//!
//! Les images arrivent du formulaire sous forme de data URL
//! (`data:image/<type>;base64,...`), décodées par [`decode_data_url`].

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Suite isolée de 10 à 15 chiffres.
fn nni_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])([0-9]{10,15})(?:[^0-9]|$)").expect("motif NNI valide")
    })
}

/// Retourne le premier NNI trouvé dans le texte, `None` sinon.
pub fn extract_nni(text: &str) -> Option<String> {
    nni_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Un NNI saisi à la main : uniquement des chiffres, entre 10 et 15.
pub fn is_valid_nni(value: &str) -> bool {
    let value = value.trim();
    (10..=15).contains(&value.len()) && value.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Image illisible: {0}")]
    InvalidImage(String),
    #[error("Reconnaissance de texte échouée: {0}")]
    Recognition(String),
}

/// Moteur de reconnaissance de texte (service tiers).
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// Résultat d'un scan : le NNI s'il a été trouvé, et le texte brut reconnu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub nni: Option<String>,
    pub text: String,
}

/// Image décodée depuis une data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Décode une data URL `data:image/<type>;base64,<contenu>`.
pub fn decode_data_url(value: &str) -> Result<DecodedImage, OcrError> {
    let rest = value
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| OcrError::InvalidImage("data URL attendue".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| OcrError::InvalidImage("contenu absent".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| OcrError::InvalidImage("encodage base64 attendu".to_string()))?;
    if !mime.starts_with("image/") || mime.len() == "image/".len() {
        return Err(OcrError::InvalidImage(format!("type non supporté: {}", mime)));
    }

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| OcrError::InvalidImage(e.to_string()))?;
    if bytes.is_empty() {
        return Err(OcrError::InvalidImage("image vide".to_string()));
    }

    Ok(DecodedImage { mime: mime.to_string(), bytes })
}

/// Aucun moteur configuré : chaque scan échoue et renvoie à la saisie manuelle.
pub struct UnconfiguredRecognizer;

#[async_trait]
impl TextRecognizer for UnconfiguredRecognizer {
    async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
        Err(OcrError::Recognition("aucun service OCR configuré".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    text: String,
}

/// Service OCR distant : `POST {url}` avec `{"image": "<base64>"}`,
/// réponse `{"text": "..."}`.
pub struct HttpTextRecognizer {
    client: Client,
    url: String,
}

impl HttpTextRecognizer {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl TextRecognizer for HttpTextRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        let payload = json!({ "image": general_purpose::STANDARD.encode(image) });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OcrError::Recognition(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Recognition(format!("{}: {}", status, body)));
        }

        let body: RecognitionResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Recognition(e.to_string()))?;
        Ok(body.text)
    }
}

/// Scanne une carte d'identité et en extrait le NNI.
pub struct IdentityCardScanner {
    recognizer: Arc<dyn TextRecognizer>,
}

impl IdentityCardScanner {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Service distant si `ocr_service_url` est renseigné, sinon aucun moteur.
    pub fn from_url(ocr_service_url: Option<&str>) -> Self {
        match ocr_service_url {
            Some(url) => Self::new(Arc::new(HttpTextRecognizer::new(url))),
            None => Self::new(Arc::new(UnconfiguredRecognizer)),
        }
    }

    pub async fn scan(&self, image: &[u8]) -> Result<ScanResult, OcrError> {
        if image.is_empty() {
            return Err(OcrError::InvalidImage("image vide".to_string()));
        }

        let text = self.recognizer.recognize(image).await?;
        let nni = extract_nni(&text);
        if nni.is_none() {
            tracing::info!("Aucun NNI détecté, saisie manuelle requise");
        }

        Ok(ScanResult { nni, text })
    }

    pub async fn scan_data_url(&self, data_url: &str) -> Result<ScanResult, OcrError> {
        let image = decode_data_url(data_url)?;
        tracing::debug!(mime = %image.mime, size = image.bytes.len(), "Scan de carte d'identité");
        self.scan(&image.bytes).await
    }
}

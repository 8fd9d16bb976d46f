//! Token metering
//!
//! Deterministic, side-effect-free sizing of payloads against token budgets.
//! The estimator choice is observable so tests can assert which one ran.

use serde::{Deserialize, Serialize};

// ============================================================================
// PAYLOAD
// ============================================================================

/// Opaque payload held by the tier store and sized by the meter.
///
/// The core never inspects payload semantics; only the meter looks inside,
/// and only to count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Plain text
    Text(String),
    /// Structured record
    Json(serde_json::Value),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Payload {
    /// Canonical byte representation, used for content hashing.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Text(s) => s.as_bytes().to_vec(),
            Payload::Json(v) => v.to_string().into_bytes(),
            Payload::Bytes(b) => b.clone(),
        }
    }

    /// Borrow the text content, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Size of the canonical representation in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Json(v) => v.to_string().len(),
            Payload::Bytes(b) => b.len(),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

// ============================================================================
// METER SOURCE
// ============================================================================

/// Which estimator produced a token count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeterSource {
    /// A model-family heuristic ratio
    Model,
    /// The stable bytes/4 fallback
    Fallback,
}

// ============================================================================
// TOKEN METER TRAIT
// ============================================================================

/// Sizes payloads in tokens.
///
/// Contract: deterministic, pure, O(n) in payload size. Never errors;
/// malformed input yields an estimate >= 0.
pub trait TokenMeter: Send + Sync {
    /// Count tokens in a text.
    fn size_text(&self, text: &str) -> u32;

    /// Which estimator this meter is.
    fn source(&self) -> MeterSource;

    /// Model family the estimate targets (e.g., "gpt", "claude").
    fn model_family(&self) -> &str;

    /// Count tokens in any payload.
    ///
    /// `Bytes` payloads always take the bytes/4 rule: there is no text to
    /// apply a model ratio to.
    fn size(&self, payload: &Payload) -> u32 {
        match payload {
            Payload::Text(s) => self.size_text(s),
            Payload::Json(v) => self.size_text(&v.to_string()),
            Payload::Bytes(b) => bytes_fallback(b.len()),
        }
    }
}

/// The stable fallback rule: bytes / 4, rounded up.
fn bytes_fallback(len: usize) -> u32 {
    len.div_ceil(4) as u32
}

// ============================================================================
// HEURISTIC METER
// ============================================================================

/// Model-family heuristic meter using character-to-token ratios.
///
/// Fast, approximate counts without an actual tokenizer model.
#[derive(Debug, Clone)]
pub struct HeuristicMeter {
    /// Tokens per character ratio (model-specific)
    ratio: f32,
    /// Model family identifier
    model_family: String,
}

impl HeuristicMeter {
    /// Create a heuristic meter for a specific model.
    ///
    /// Uses empirically-derived ratios based on model family.
    pub fn for_model(model: &str) -> Self {
        let (ratio, family) = if model.contains("gpt-4") || model.contains("gpt-3.5") {
            (0.25, "gpt")
        } else if model.contains("claude") {
            (0.28, "claude")
        } else if model.contains("llama") || model.contains("mistral") {
            (0.27, "open-source")
        } else {
            // Conservative default
            (0.30, "unknown")
        };

        Self {
            ratio,
            model_family: family.to_string(),
        }
    }

    /// Create with a custom ratio.
    pub fn with_ratio(ratio: f32, model_family: impl Into<String>) -> Self {
        Self {
            ratio,
            model_family: model_family.into(),
        }
    }

    /// Get the current ratio.
    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}

impl Default for HeuristicMeter {
    fn default() -> Self {
        Self::for_model("claude")
    }
}

impl TokenMeter for HeuristicMeter {
    fn size_text(&self, text: &str) -> u32 {
        (text.len() as f32 * self.ratio).ceil() as u32
    }

    fn source(&self) -> MeterSource {
        MeterSource::Model
    }

    fn model_family(&self) -> &str {
        &self.model_family
    }
}

// ============================================================================
// FALLBACK METER
// ============================================================================

/// The stable fallback meter: bytes / 4 for everything.
///
/// Used when no model-specific tokenizer is available. The constant rule
/// keeps estimates reproducible across deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackMeter;

impl TokenMeter for FallbackMeter {
    fn size_text(&self, text: &str) -> u32 {
        bytes_fallback(text.len())
    }

    fn source(&self) -> MeterSource {
        MeterSource::Fallback
    }

    fn model_family(&self) -> &str {
        "fallback"
    }
}

// ============================================================================
// TESTS
// ============================================================================

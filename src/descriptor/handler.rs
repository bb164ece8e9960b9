//! Descriptor payloads and the pluggable handler capability
//!
//! A handler turns the encoded parent cell (for example a compact structure
//! code) into its object type, derives a [`Descriptor`] from it and compares
//! two descriptors. Handlers are supplied from outside the engine.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use super::errors::{DescriptorError, DescriptorResult};

/// Tagged descriptor payload
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// Bit fingerprint packed into 64-bit words
    BinaryFingerprint(Vec<u64>),
    /// Count vector
    IntVector(Vec<i32>),
    /// Real-valued vector
    FloatVector(Vec<f32>),
    /// Handler-specific bytes
    Opaque(Vec<u8>),
}

/// Variant tag of a [`Descriptor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    BinaryFingerprint,
    IntVector,
    FloatVector,
    Opaque,
}

impl Descriptor {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Descriptor::BinaryFingerprint(_) => DescriptorKind::BinaryFingerprint,
            Descriptor::IntVector(_) => DescriptorKind::IntVector,
            Descriptor::FloatVector(_) => DescriptorKind::FloatVector,
            Descriptor::Opaque(_) => DescriptorKind::Opaque,
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DescriptorKind::BinaryFingerprint => "binary_fingerprint",
            DescriptorKind::IntVector => "int_vector",
            DescriptorKind::FloatVector => "float_vector",
            DescriptorKind::Opaque => "opaque",
        };
        write!(f, "{}", name)
    }
}

/// Encoded parent cell handed to a handler
#[derive(Debug, Clone, Copy)]
pub struct ParentCell<'a> {
    /// Encoded parent payload
    pub encoded: &'a [u8],
    /// Coordinate side-data, present only for handlers that need it
    pub coordinates: Option<&'a [u8]>,
}

/// Descriptor handler capability
///
/// `Object` is the decoded form of a parent cell.
pub trait DescriptorHandler: Send + Sync + 'static {
    type Object;

    /// Short name, e.g. `FragFp`
    fn short_name(&self) -> &str;

    /// Version tag; a stored tag that differs marks the column outdated
    fn version(&self) -> &str;

    /// Payload variant produced by this handler
    fn kind(&self) -> DescriptorKind;

    /// Whether coordinate side-data must accompany the parent cell
    fn needs_coordinates(&self) -> bool {
        false
    }

    /// Decode a parent cell into the handler's object type
    fn decode_object(&self, parent: ParentCell<'_>) -> DescriptorResult<Self::Object>;

    /// Derive a descriptor from a decoded object
    fn create_descriptor(&self, object: &Self::Object) -> DescriptorResult<Descriptor>;

    /// Similarity in [0, 1]
    fn similarity(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        default_similarity(a, b)
    }

    /// Encode a descriptor as text
    fn encode(&self, descriptor: &Descriptor) -> String {
        encode_descriptor(descriptor)
    }

    /// Decode text produced by [`DescriptorHandler::encode`]
    fn decode(&self, encoded: &str) -> DescriptorResult<Descriptor> {
        decode_descriptor(self.kind(), encoded)
    }
}

/// Object-safe view of a [`DescriptorHandler`] used by the engine
pub trait AnyDescriptorHandler: Send + Sync {
    fn short_name(&self) -> &str;
    fn version(&self) -> &str;
    fn kind(&self) -> DescriptorKind;
    fn needs_coordinates(&self) -> bool;
    /// Decode the parent and create its descriptor
    fn compute(&self, parent: ParentCell<'_>) -> DescriptorResult<Descriptor>;
    fn similarity(&self, a: &Descriptor, b: &Descriptor) -> f32;
    fn encode(&self, descriptor: &Descriptor) -> String;
    fn decode(&self, encoded: &str) -> DescriptorResult<Descriptor>;
}

impl<H: DescriptorHandler> AnyDescriptorHandler for H {
    fn short_name(&self) -> &str {
        DescriptorHandler::short_name(self)
    }

    fn version(&self) -> &str {
        DescriptorHandler::version(self)
    }

    fn kind(&self) -> DescriptorKind {
        DescriptorHandler::kind(self)
    }

    fn needs_coordinates(&self) -> bool {
        DescriptorHandler::needs_coordinates(self)
    }

    fn compute(&self, parent: ParentCell<'_>) -> DescriptorResult<Descriptor> {
        let object = self.decode_object(parent)?;
        self.create_descriptor(&object)
    }

    fn similarity(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        DescriptorHandler::similarity(self, a, b).clamp(0.0, 1.0)
    }

    fn encode(&self, descriptor: &Descriptor) -> String {
        DescriptorHandler::encode(self, descriptor)
    }

    fn decode(&self, encoded: &str) -> DescriptorResult<Descriptor> {
        DescriptorHandler::decode(self, encoded)
    }
}

/// Handler shared between the owner and worker threads
pub type SharedHandler = Arc<dyn AnyDescriptorHandler>;

/// Text encoding of a descriptor
///
/// Fingerprints and opaque bytes are base64, vectors comma-separated.
pub fn encode_descriptor(descriptor: &Descriptor) -> String {
    match descriptor {
        Descriptor::BinaryFingerprint(words) => {
            let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
            STANDARD.encode(bytes)
        }
        Descriptor::IntVector(values) => join(values),
        Descriptor::FloatVector(values) => join(values),
        Descriptor::Opaque(bytes) => STANDARD.encode(bytes),
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn split<T: std::str::FromStr>(encoded: &str) -> DescriptorResult<Vec<T>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }
    encoded
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<T>()
                .map_err(|_| DescriptorError::Encoding(format!("bad vector element '{}'", part)))
        })
        .collect()
}

/// Inverse of [`encode_descriptor`] for a known kind
pub fn decode_descriptor(kind: DescriptorKind, encoded: &str) -> DescriptorResult<Descriptor> {
    match kind {
        DescriptorKind::BinaryFingerprint => {
            let bytes = STANDARD
                .decode(encoded)
                .map_err(|e| DescriptorError::Encoding(e.to_string()))?;
            if bytes.len() % 8 != 0 {
                return Err(DescriptorError::Encoding(format!(
                    "fingerprint length {} is not a multiple of 8",
                    bytes.len()
                )));
            }
            let words = bytes
                .chunks_exact(8)
                .map(|chunk| {
                    let mut word = [0u8; 8];
                    word.copy_from_slice(chunk);
                    u64::from_le_bytes(word)
                })
                .collect();
            Ok(Descriptor::BinaryFingerprint(words))
        }
        DescriptorKind::IntVector => split(encoded).map(Descriptor::IntVector),
        DescriptorKind::FloatVector => split(encoded).map(Descriptor::FloatVector),
        DescriptorKind::Opaque => STANDARD
            .decode(encoded)
            .map(Descriptor::Opaque)
            .map_err(|e| DescriptorError::Encoding(e.to_string())),
    }
}

/// Tanimoto coefficient of two bit fingerprints
pub fn tanimoto(a: &[u64], b: &[u64]) -> f32 {
    let mut shared = 0u32;
    let mut union = 0u32;
    for index in 0..a.len().max(b.len()) {
        let x = a.get(index).copied().unwrap_or(0);
        let y = b.get(index).copied().unwrap_or(0);
        shared += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    if union == 0 {
        0.0
    } else {
        shared as f32 / union as f32
    }
}

/// Sum of element minima over sum of element maxima
pub fn min_max_similarity(a: &[i32], b: &[i32]) -> f32 {
    let mut lower = 0i64;
    let mut upper = 0i64;
    for index in 0..a.len().max(b.len()) {
        let x = a.get(index).copied().unwrap_or(0).max(0) as i64;
        let y = b.get(index).copied().unwrap_or(0).max(0) as i64;
        lower += x.min(y);
        upper += x.max(y);
    }
    if upper == 0 {
        0.0
    } else {
        (lower as f64 / upper as f64) as f32
    }
}

/// `1 / (1 + euclidean distance)`
pub fn euclidean_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let distance: f32 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt();
    1.0 / (1.0 + distance)
}

/// Similarity by payload variant; mismatched variants are dissimilar
pub fn default_similarity(a: &Descriptor, b: &Descriptor) -> f32 {
    match (a, b) {
        (Descriptor::BinaryFingerprint(x), Descriptor::BinaryFingerprint(y)) => tanimoto(x, y),
        (Descriptor::IntVector(x), Descriptor::IntVector(y)) => min_max_similarity(x, y),
        (Descriptor::FloatVector(x), Descriptor::FloatVector(y)) => euclidean_similarity(x, y),
        (Descriptor::Opaque(x), Descriptor::Opaque(y)) => {
            if x == y {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

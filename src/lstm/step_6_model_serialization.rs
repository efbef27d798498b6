// External imports
use bincode::{Decode, Encode};
use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use log::info;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;
use tempfile::NamedTempFile;

// Internal imports
use super::step_1_tensor_preparation::MinMaxScaler;
use super::step_3_lstm_model_arch::{ModelArchitecture, TimeSeriesLstm};
use crate::error::{PredictorError, Result};

/// Bumped whenever the artifact layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Everything besides the weights needed to reuse a trained model
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelMetadata {
    pub version: String,
    pub timestamp: u64,
    pub architecture: ModelArchitecture,
    pub sequence_length: usize,
    pub feature_columns: Vec<String>,
    pub target_column: String,
    pub scaler: Option<MinMaxScaler>,
}

impl ModelMetadata {
    pub fn new(
        architecture: ModelArchitecture,
        sequence_length: usize,
        feature_columns: Vec<String>,
        target_column: String,
        scaler: Option<MinMaxScaler>,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            architecture,
            sequence_length,
            feature_columns,
            target_column,
            scaler,
        }
    }

    /// Same metadata with a fresh creation timestamp
    pub fn restamped(&self) -> Self {
        let mut metadata = self.clone();
        metadata.timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        metadata
    }
}

/// On-disk layout: metadata as JSON plus the binary weight record
#[derive(Encode, Decode)]
struct ArtifactEnvelope {
    format_version: u32,
    metadata_json: String,
    weights: Vec<u8>,
}

/// Serialises model and metadata into a single artifact buffer
pub fn encode_artifact<B: Backend>(model: &TimeSeriesLstm<B>, metadata: &ModelMetadata) -> Result<Vec<u8>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let weights = <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::record(
        &recorder,
        model.clone().into_record(),
        (),
    )
    .map_err(|e| PredictorError::Internal(format!("failed to record weights: {:?}", e)))?;

    let envelope = ArtifactEnvelope {
        format_version: ARTIFACT_FORMAT_VERSION,
        metadata_json: serde_json::to_string(metadata)?,
        weights,
    };
    bincode::encode_to_vec(envelope, bincode::config::standard())
        .map_err(|e| PredictorError::Internal(format!("failed to encode artifact: {}", e)))
}

/// Rebuilds model and metadata from an artifact buffer
pub fn decode_artifact<B: Backend>(
    bytes: &[u8],
    device: &B::Device,
) -> Result<(TimeSeriesLstm<B>, ModelMetadata)> {
    let (envelope, _): (ArtifactEnvelope, usize) =
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| PredictorError::ModelLoad(format!("unreadable artifact: {}", e)))?;
    if envelope.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(PredictorError::ModelLoad(format!(
            "unsupported artifact format {} (expected {})",
            envelope.format_version, ARTIFACT_FORMAT_VERSION
        )));
    }

    let metadata: ModelMetadata = serde_json::from_str(&envelope.metadata_json)
        .map_err(|e| PredictorError::ModelLoad(format!("invalid metadata: {}", e)))?;

    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::load(
        &recorder,
        envelope.weights,
        device,
    )
    .map_err(|e| PredictorError::ModelLoad(format!("invalid weights: {:?}", e)))?;

    let model = TimeSeriesLstm::new(&metadata.architecture, device).load_record(record);
    model
        .check_weights(&metadata.architecture)
        .map_err(|e| PredictorError::ModelLoad(format!("weights do not match metadata: {}", e)))?;
    check_metadata(&metadata)?;
    Ok((model, metadata))
}

/// Rejects metadata that could not drive a prediction
fn check_metadata(metadata: &ModelMetadata) -> Result<()> {
    if metadata.sequence_length == 0 {
        return Err(PredictorError::ModelLoad("sequence length is zero".to_string()));
    }
    if metadata.feature_columns.len() != metadata.architecture.input_size {
        return Err(PredictorError::ModelLoad(format!(
            "{} feature columns for a model with {} inputs",
            metadata.feature_columns.len(),
            metadata.architecture.input_size
        )));
    }

    let Some(scaler) = &metadata.scaler else {
        return Err(PredictorError::ModelLoad("scaler is missing".to_string()));
    };
    let uncovered = metadata
        .feature_columns
        .iter()
        .chain(std::iter::once(&metadata.target_column))
        .find(|column| scaler.column(column).is_none());
    if let Some(column) = uncovered {
        return Err(PredictorError::ModelLoad(format!("scaler has no range for '{}'", column)));
    }
    Ok(())
}

/// Writes bytes to `path` via a temp file in the same directory and a rename
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| PredictorError::Internal(format!("failed to move artifact into place: {}", e)))?;
    Ok(())
}

/// Save the model with metadata to a single artifact file
pub fn save_model_with_metadata<B: Backend>(
    model: &TimeSeriesLstm<B>,
    metadata: &ModelMetadata,
    path: impl AsRef<Path>,
) -> Result<()> {
    let bytes = encode_artifact(model, metadata)?;
    write_atomically(path.as_ref(), &bytes)?;
    info!("Model artifact written to {}", path.as_ref().display());
    Ok(())
}

/// Load the model and its metadata from an artifact file
pub fn load_model_with_metadata<B: Backend>(
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(TimeSeriesLstm<B>, ModelMetadata)> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        PredictorError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
    })?;
    decode_artifact(&bytes, device)
}

/// Check if an artifact exists and its metadata is readable
pub fn verify_model(path: impl AsRef<Path>) -> bool {
    let Ok(bytes) = std::fs::read(path.as_ref()) else {
        return false;
    };
    match bincode::decode_from_slice::<ArtifactEnvelope, _>(&bytes, bincode::config::standard()) {
        Ok((envelope, _)) => serde_json::from_str::<ModelMetadata>(&envelope.metadata_json).is_ok(),
        Err(_) => false,
    }
}

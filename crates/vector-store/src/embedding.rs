use crate::error::{Result, VectorStoreError};
use ndarray::{Array, Axis, Ix2, Ix3};
use once_cell::sync::OnceCell;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EmbeddingMode {
    Fast,
    Stub,
}

impl EmbeddingMode {
    fn from_env() -> Result<Self> {
        let raw = env::var("MATCHER_EMBEDDING_MODE")
            .unwrap_or_else(|_| "fast".to_string())
            .to_ascii_lowercase();
        match raw.as_str() {
            "fast" => Ok(Self::Fast),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported MATCHER_EMBEDDING_MODE '{other}' (expected 'fast' or 'stub')"
            ))),
        }
    }
}

const DEFAULT_MODEL_ID: &str = "minilm-l6";

/// Model id currently selected by the environment.
pub fn current_model_id() -> String {
    normalize_model_id(
        &env::var("MATCHER_EMBEDDING_MODEL").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string()),
    )
}

fn normalize_model_id(raw: &str) -> String {
    let id = raw.trim().to_ascii_lowercase();
    match id.as_str() {
        "all-minilm-l6-v2" => "minilm-l6".to_string(),
        "all-minilm-l12-v2" => "minilm-l12".to_string(),
        other => other.to_string(),
    }
}

#[derive(Clone)]
struct ModelSpec {
    id: String,
    onnx_rel_path: PathBuf,
    tokenizer_rel_path: PathBuf,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
}

impl ModelSpec {
    /// Resolve a model spec from `models/manifest.json`, falling back to the
    /// built-in default layout for the stock model.
    fn resolve(id: &str) -> Result<Self> {
        let base = model_dir();
        let manifest_path = base.join("manifest.json");

        if manifest_path.exists() {
            let raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
                VectorStoreError::EmbeddingError(format!(
                    "Failed to read models manifest {}: {e}",
                    manifest_path.display()
                ))
            })?;
            let manifest: ModelsManifest = serde_json::from_str(&raw).map_err(|e| {
                VectorStoreError::EmbeddingError(format!(
                    "Invalid models manifest {}: {e}",
                    manifest_path.display()
                ))
            })?;
            if manifest.schema_version != 1 {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Unsupported models manifest schema_version {} (expected 1)",
                    manifest.schema_version
                )));
            }

            let model = manifest
                .models
                .iter()
                .find(|m| m.id.eq_ignore_ascii_case(id))
                .ok_or_else(|| {
                    let available = manifest
                        .models
                        .iter()
                        .map(|m| m.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    VectorStoreError::EmbeddingError(format!(
                        "Unknown embedding model id '{id}'. Available: {available}"
                    ))
                })?;

            return Ok(Self {
                id: model.id.clone(),
                onnx_rel_path: PathBuf::from("model.onnx"),
                tokenizer_rel_path: PathBuf::from("tokenizer.json"),
                dimension: model.dimension,
                max_length: model.max_length,
                max_batch: model.max_batch,
            });
        }

        // No manifest: keep the stock model working out of the box.
        if id == DEFAULT_MODEL_ID {
            return Ok(Self {
                id: id.to_string(),
                onnx_rel_path: PathBuf::from("model.onnx"),
                tokenizer_rel_path: PathBuf::from("tokenizer.json"),
                dimension: 384,
                max_length: 256,
                max_batch: 32,
            });
        }

        Err(VectorStoreError::EmbeddingError(format!(
            "Unknown embedding model id '{id}' and no models manifest found at {}",
            manifest_path.display()
        )))
    }

    fn model_path(&self, base: &Path) -> PathBuf {
        base.join(&self.id).join(&self.onnx_rel_path)
    }

    fn tokenizer_path(&self, base: &Path) -> PathBuf {
        base.join(&self.id).join(&self.tokenizer_rel_path)
    }
}

#[derive(Debug, Deserialize)]
struct ModelsManifest {
    schema_version: u32,
    models: Vec<ManifestModel>,
}

#[derive(Debug, Deserialize)]
struct ManifestModel {
    id: String,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
}

/// Directory holding model assets (`<dir>/<model-id>/model.onnx` etc.).
pub fn model_dir() -> PathBuf {
    if let Ok(path) = env::var("MATCHER_MODEL_DIR") {
        return PathBuf::from(path);
    }

    // Prefer a repo-local `models/manifest.json` near the executable, then
    // upward from the current directory (workspace checkouts).
    if let Ok(exe) = env::current_exe() {
        if let Some(mut dir) = exe.parent().map(Path::to_path_buf) {
            loop {
                let candidate = dir.join("models");
                if candidate.join("manifest.json").exists() {
                    return candidate;
                }
                if !dir.pop() {
                    break;
                }
            }
        }
    }
    if let Ok(mut dir) = env::current_dir() {
        loop {
            let candidate = dir.join("models");
            if candidate.join("manifest.json").exists() {
                return candidate;
            }
            if !dir.pop() {
                break;
            }
        }
    }

    if let Ok(path) = env::var("XDG_CACHE_HOME") {
        return PathBuf::from(path).join("resume-matcher").join("models");
    }
    env::var("HOME")
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
        .join(".cache")
        .join("resume-matcher")
        .join("models")
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    max_batch: usize,
    dimension: usize,
}

impl OrtBackend {
    fn new(spec: &ModelSpec, base: &Path) -> Result<Self> {
        // Single-threaded tokenization keeps embeddings deterministic and
        // low-contention during large build runs.
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let model_path = spec.model_path(base);
        let tokenizer_path = spec.tokenizer_path(base);
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Model files for '{}' are missing. Expected ONNX at {} and tokenizer at {}. Set MATCHER_MODEL_DIR or place the assets under ./models.",
                spec.id,
                model_path.display(),
                tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        // One truncation policy, applied to corpus and query text alike.
        // Diverging truncation lengths silently degrade ranking quality.
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Tokenizer truncation failed: {e}"))
            })?;

        let (intra_threads, inter_threads) = default_ort_threads();
        let session = Session::builder()
            .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
            // Cap thread usage and disable busy-spinning so query-time
            // inference stays polite next to the rest of the service.
            .with_intra_threads(intra_threads)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set ORT intra threads: {e}"))
            })?
            .with_inter_threads(inter_threads)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set ORT inter threads: {e}"))
            })?
            .with_intra_op_spinning(false)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set ORT intra spinning: {e}"))
            })?
            .with_inter_op_spinning(false)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set ORT inter spinning: {e}"))
            })?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!(
                    "Failed to register CPU execution provider: {e}"
                ))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_file(&model_path)
            .map_err(|e| {
                VectorStoreError::EmbeddingError(format!("Failed to load ONNX model: {e}"))
            })?;

        log::info!(
            "Loaded ONNX model '{}' (dim {}, max_length {}, batch {})",
            spec.id,
            spec.dimension,
            spec.max_length,
            spec.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: spec.max_length,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
        })
    }

    fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("Tokenization failed: {e}"))
                })?;
            if encodings.is_empty() {
                continue;
            }

            let seq_len = encodings[0].len();
            if seq_len > self.max_length {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Tokenized length {} exceeds max_length {}",
                    seq_len, self.max_length
                )));
            }
            if encodings.iter().any(|e| e.len() != seq_len) {
                return Err(VectorStoreError::EmbeddingError(
                    "Inconsistent sequence lengths after padding".to_string(),
                ));
            }

            let (ids, masks, type_ids, mask_rows) = build_flat_tensors(&encodings, seq_len);
            let ids_array = Array::from_shape_vec((batch.len(), seq_len), ids)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("IDs shape error: {e}")))?;
            let mask_array = Array::from_shape_vec((batch.len(), seq_len), masks)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Mask shape error: {e}")))?;
            let type_array = Array::from_shape_vec((batch.len(), seq_len), type_ids)
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Types shape error: {e}")))?;

            let mut available: HashMap<String, DynTensor> = HashMap::new();
            available.insert(
                "input_ids".to_string(),
                Tensor::from_array(ids_array.into_dyn())
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
                    .upcast(),
            );
            available.insert(
                "attention_mask".to_string(),
                Tensor::from_array(mask_array.into_dyn())
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
                    .upcast(),
            );
            available.insert(
                "token_type_ids".to_string(),
                Tensor::from_array(type_array.into_dyn())
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("{e}")))?
                    .upcast(),
            );

            let array = {
                let mut session = self.session.lock().map_err(|_| {
                    VectorStoreError::EmbeddingError("Failed to lock ONNX session".into())
                })?;

                let mut feed: HashMap<String, DynTensor> = HashMap::new();
                for input in &session.inputs {
                    let key = input.name.clone();
                    match available.remove(&key) {
                        Some(value) => {
                            feed.insert(key, value);
                        }
                        None => {
                            return Err(VectorStoreError::EmbeddingError(format!(
                                "Unsupported ONNX input '{key}'"
                            )));
                        }
                    }
                }

                let outputs = session.run(SessionInputs::from(feed)).map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("ONNX forward failed: {e}"))
                })?;
                if outputs.len() == 0 {
                    return Err(VectorStoreError::EmbeddingError(
                        "ONNX returned no outputs".to_string(),
                    ));
                }
                outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(|e| {
                        VectorStoreError::EmbeddingError(format!(
                            "Failed to decode ONNX output: {e}"
                        ))
                    })?
                    .to_owned()
            };

            results.extend(embeddings_from_output(array, &mask_rows, self.dimension)?);
        }

        Ok(results)
    }
}

fn default_ort_threads() -> (usize, usize) {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let intra_threads = if cpus <= 4 {
        1
    } else if cpus <= 12 {
        2
    } else {
        4
    };
    (intra_threads, 1)
}

fn embeddings_from_output(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        // Some exported models pool internally and emit [batch, dim].
        2 => {
            let embeddings = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for row in embeddings.outer_iter() {
                let mut emb = row.to_owned().to_vec();
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        // Raw hidden states [batch, seq, dim] need attention-masked mean pooling.
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let attn = mask_rows
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                let mut emb = mean_pool(sample.view(), &attn);
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }
    Ok(out)
}

fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    if sample.is_empty() {
        return vec![];
    }

    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count == 0.0 {
        return sum;
    }
    for value in &mut sum {
        *value /= count;
    }
    sum
}

fn build_flat_tensors(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let encoding_ids = encoding.get_ids();
        let encoding_masks = encoding.get_attention_mask();
        let encoding_types = encoding.get_type_ids();

        for idx in 0..seq_len {
            ids.push(i64::from(*encoding_ids.get(idx).unwrap_or(&0)));
            masks.push(i64::from(*encoding_masks.get(idx).unwrap_or(&0)));
            type_ids.push(i64::from(*encoding_types.get(idx).unwrap_or(&0)));
        }

        mask_rows.push(
            encoding_masks
                .iter()
                .take(seq_len)
                .map(|v| i64::from(*v))
                .collect(),
        );
    }

    (ids, masks, type_ids, mask_rows)
}

fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(VectorStoreError::InvalidDimension {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Deterministic hash-based embedding for tests and offline development.
/// Same text always maps to the same unit vector, like the real model.
fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Clone)]
struct StubBackend {
    dimension: usize,
}

impl StubBackend {
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect()
    }
}

static BACKENDS: OnceCell<Mutex<HashMap<String, Arc<OrtBackend>>>> = OnceCell::new();

enum EmbeddingBackend {
    Ort(Arc<OrtBackend>),
    Stub(StubBackend),
}

/// Embedding model boundary: maps text to fixed-dimension unit vectors.
///
/// Deterministic for a fixed model version — the same text yields the same
/// vector regardless of call order or concurrency. One truncation policy is
/// shared by index builds and queries.
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    dimension: usize,
    model_id: String,
}

impl EmbeddingModel {
    /// Model selected by `MATCHER_EMBEDDING_MODEL` (or the stock default).
    pub fn new() -> Result<Self> {
        Self::new_for_model(&current_model_id())
    }

    pub fn new_for_model(model_id: &str) -> Result<Self> {
        let mode = EmbeddingMode::from_env()?;
        let id = normalize_model_id(model_id);
        let spec = ModelSpec::resolve(&id)?;

        if mode == EmbeddingMode::Stub {
            return Ok(Self {
                dimension: spec.dimension,
                model_id: spec.id,
                backend: EmbeddingBackend::Stub(StubBackend {
                    dimension: spec.dimension,
                }),
            });
        }

        let cache = BACKENDS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut guard = cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let backend = match guard.get(&spec.id) {
            Some(backend) => backend.clone(),
            None => {
                let backend = Arc::new(OrtBackend::new(&spec, &model_dir())?);
                guard.insert(spec.id.clone(), backend.clone());
                backend
            }
        };
        drop(guard);

        Ok(Self {
            dimension: spec.dimension,
            model_id: spec.id,
            backend: EmbeddingBackend::Ort(backend),
        })
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Model version fingerprint recorded in snapshot metadata.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Embed a single text. Empty or whitespace-only input is an error;
    /// over-long input truncates and succeeds.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(vec![text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }

    /// Embed many texts, chunked internally by the model's batch limit.
    pub async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Cannot embed empty or whitespace-only text (position {pos})"
            )));
        }

        let owned: Vec<String> = texts.into_iter().map(ToString::to_string).collect();
        match &self.backend {
            EmbeddingBackend::Stub(stub) => Ok(stub.embed_batch(&owned)),
            EmbeddingBackend::Ort(backend) => {
                let backend = backend.clone();
                spawn_blocking(move || backend.embed_batch_blocking(&owned))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))?
            }
        }
    }
}

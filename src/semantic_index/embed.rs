//! Embedding model abstraction.
//!
//! `embed(text) -> float[D]` is the only contract the rest of the engine
//! relies on (§6). Two implementations are provided: [`OrtEmbeddingModel`],
//! a local ONNX sentence-transformer with platform GPU acceleration, and
//! [`HashEmbeddingModel`], a deterministic dependency-free fixture used in
//! tests and as a fallback when no model directory is configured. The
//! hash-based variant is a test fixture, not a production path.

use crate::semantic_index::vector_store::normalize;
use anyhow::{Context, Result};
use ndarray::{Array2, Axis};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, info};

#[cfg(target_os = "windows")]
use tracing::warn;

#[cfg(target_os = "windows")]
use windows::Win32::Graphics::Dxgi::{CreateDXGIFactory1, IDXGIFactory1, DXGI_ERROR_NOT_FOUND};

/// A function `text -> float[D]`; dimensions are fixed per implementation.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>>;
    fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
    fn dimensions(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// ONNX Runtime embedding model with GPU acceleration.
pub struct OrtEmbeddingModel {
    session: Session,
    tokenizer: Tokenizer,
    dimensions: usize,
    model_name: String,
    max_length: usize,
}

impl OrtEmbeddingModel {
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        model_name: &str,
        cache_dir: Option<impl AsRef<Path>>,
    ) -> Result<Self> {
        info!("initializing OrtEmbeddingModel for {}", model_name);

        let mut tokenizer = Tokenizer::from_file(tokenizer_path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer from {:?}: {}", tokenizer_path.as_ref(), e))?;

        use tokenizers::{PaddingDirection, PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            direction: PaddingDirection::Right,
            pad_id: 0,
            pad_type_id: 0,
            pad_token: "[PAD]".to_string(),
            pad_to_multiple_of: None,
        }));

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: 512,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: tokenizers::TruncationDirection::Right,
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure tokenizer truncation: {}", e))?;

        let session =
            Self::create_session_with_gpu(model_path.as_ref(), cache_dir).context("failed to create ONNX Runtime session")?;

        let dimensions = 384; // BGE-Small-EN-V1.5
        let max_length = 512;

        Ok(Self {
            session,
            tokenizer,
            dimensions,
            model_name: model_name.to_string(),
            max_length,
        })
    }

    #[cfg(target_os = "windows")]
    fn select_best_directml_device() -> Result<i32> {
        unsafe {
            match CreateDXGIFactory1::<IDXGIFactory1>() {
                Ok(factory) => {
                    let mut best_device_id = 0;
                    let mut max_vram: usize = 0;
                    for index in 0..16 {
                        match factory.EnumAdapters1(index) {
                            Ok(adapter) => match adapter.GetDesc1() {
                                Ok(desc) => {
                                    let vram = desc.DedicatedVideoMemory;
                                    if vram > max_vram {
                                        max_vram = vram;
                                        best_device_id = index as i32;
                                    }
                                }
                                Err(e) => warn!("failed to get adapter {} description: {}", index, e),
                            },
                            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                            Err(e) => {
                                warn!("error enumerating adapter {}: {}", index, e);
                                break;
                            }
                        }
                    }
                    Ok(best_device_id)
                }
                Err(e) => {
                    warn!("failed to create DXGI factory: {}, using default adapter", e);
                    Ok(0)
                }
            }
        }
    }

    #[allow(unused_variables)]
    fn create_session_with_gpu(model_path: &Path, cache_dir: Option<impl AsRef<Path>>) -> Result<Session> {
        let force_cpu = std::env::var("CODECORTEX_FORCE_CPU")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        #[cfg(not(target_os = "macos"))]
        let mut builder = Session::builder()
            .context("failed to create SessionBuilder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)?;

        #[cfg(target_os = "macos")]
        let builder = Session::builder()
            .context("failed to create SessionBuilder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)?;

        #[cfg(target_os = "windows")]
        {
            if !force_cpu {
                use ort::execution_providers::DirectMLExecutionProvider;
                let device_id = Self::select_best_directml_device()?;
                builder = builder.with_execution_providers([
                    DirectMLExecutionProvider::default().with_device_id(device_id).build(),
                ])?;
            }
        }

        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            if !force_cpu {
                use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
                builder = builder.with_execution_providers([
                    TensorRTExecutionProvider::default().build(),
                    CUDAExecutionProvider::default().build(),
                ])?;
            }
        }

        #[cfg(target_os = "macos")]
        {
            info!("macOS: using optimized CPU execution (CoreML has poor transformer coverage)");
        }

        let session = builder
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ONNX model from {:?}", model_path))?;
        Ok(session)
    }

    pub fn encode_batch(&mut self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("tokenizing {} texts", texts.len());
        let encodings = self
            .tokenizer
            .encode_batch(texts, true)
            .map_err(|e| anyhow::anyhow!("failed to tokenize input texts: {}", e))?;

        let batch_size = encodings.len();
        let seq_length = encodings[0].len();

        let mut input_ids_vec = Vec::with_capacity(batch_size * seq_length);
        let mut attention_mask_vec = Vec::with_capacity(batch_size * seq_length);
        let mut token_type_ids_vec = Vec::with_capacity(batch_size * seq_length);

        for encoding in &encodings {
            input_ids_vec.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask_vec.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
            token_type_ids_vec.extend(encoding.get_type_ids().iter().map(|&t| t as i64));
        }

        let input_ids = Array2::from_shape_vec((batch_size, seq_length), input_ids_vec)
            .context("failed to create input_ids array")?;
        let attention_mask = Array2::from_shape_vec((batch_size, seq_length), attention_mask_vec)
            .context("failed to create attention_mask array")?;
        let token_type_ids = Array2::from_shape_vec((batch_size, seq_length), token_type_ids_vec)
            .context("failed to create token_type_ids array")?;

        let input_ids_tensor = Tensor::from_array(input_ids).context("failed to create input_ids tensor")?;
        let attention_mask_tensor =
            Tensor::from_array(attention_mask).context("failed to create attention_mask tensor")?;
        let token_type_ids_tensor =
            Tensor::from_array(token_type_ids).context("failed to create token_type_ids tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| anyhow::anyhow!("failed to run ONNX inference: {}", e))?;

        let embeddings_array = outputs["last_hidden_state"]
            .try_extract_array::<f32>()
            .context("failed to extract embeddings tensor")?;

        let mut embeddings = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let cls_embedding: Vec<f32> = embeddings_array
                .index_axis(Axis(0), i)
                .index_axis(Axis(0), 0)
                .to_owned()
                .into_raw_vec_and_offset()
                .0;
            embeddings.push(normalize(&cls_embedding));
        }
        Ok(embeddings)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl EmbeddingModel for OrtEmbeddingModel {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        self.encode_batch(vec![text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no embedding returned from encode_batch"))
    }

    fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.encode_batch(texts.to_vec())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic hash-based embedder. Not a production path: it carries no
/// semantic meaning beyond reproducing the same vector for the same text,
/// which is exactly what index/retriever tests need and nothing more.
pub struct HashEmbeddingModel {
    dimensions: usize,
}

impl HashEmbeddingModel {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl EmbeddingModel for HashEmbeddingModel {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimensions];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher_state: u64 = 1469598103934665603; // FNV offset basis
            for byte in token.bytes() {
                hasher_state ^= byte as u64;
                hasher_state = hasher_state.wrapping_mul(1099511628211);
            }
            let slot = (hasher_state as usize) % self.dimensions;
            let sign = if (hasher_state >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign / ((i + 1) as f32).sqrt();
        }
        Ok(normalize(&v))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hash-fixture"
    }
}

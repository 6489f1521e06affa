use anyhow::{anyhow, Context, Result};
use candle::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use std::fs;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use super::loader::{self, ModelFiles};
use super::{GenerationParams, TextGenerator};
use crate::config::{DTypeSpec, DeviceSpec, ModelConfig};
use crate::error::GenerationError;

const FALLBACK_EOS_TOKEN: &str = "</s>";

// ---------------------------------------------------------
// PUBLIC SERVICE
// ---------------------------------------------------------

/// Llama-family causal language model with its tokenizer. Immutable once
/// loaded; every generation call builds its own KV cache.
pub struct CausalLm {
    model: Llama,
    config: Config,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    eos_tokens: Vec<u32>,
    seed: u64,
}

impl CausalLm {
    pub async fn load(cfg: &ModelConfig) -> Result<Self> {
        let files = loader::resolve(cfg).await?;
        Self::from_files(&files, cfg)
    }

    pub fn from_files(files: &ModelFiles, cfg: &ModelConfig) -> Result<Self> {
        let device = select_device(cfg.device)?;
        let dtype = select_dtype(cfg.dtype, &device);
        info!(device = ?device, dtype = ?dtype, "loading causal LM");

        // ---- Tokenizer ----
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("tokenizer error ({}): {e}", files.tokenizer.display()))?;

        // ---- Config ----
        let raw_config: LlamaConfig = serde_json::from_slice(&fs::read(&files.config)?)
            .with_context(|| format!("parsing {}", files.config.display()))?;
        let config = raw_config.into_config(false);

        // ---- Weights ----
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };
        let model = Llama::load(vb, &config)?;

        info!(
            shards = files.weights.len(),
            layers = config.num_hidden_layers,
            vocab = config.vocab_size,
            "causal LM ready"
        );

        Ok(Self::from_parts(model, config, tokenizer, device, dtype, cfg.seed))
    }

    fn from_parts(
        model: Llama,
        config: Config,
        tokenizer: Tokenizer,
        device: Device,
        dtype: DType,
        seed: u64,
    ) -> Self {
        let eos_tokens = eos_token_ids(
            config.eos_token_id.as_ref(),
            tokenizer.token_to_id(FALLBACK_EOS_TOKEN),
        );
        if eos_tokens.is_empty() {
            warn!("no EOS token found; generation always runs to max_length");
        }

        Self {
            model,
            config,
            tokenizer,
            device,
            dtype,
            eos_tokens,
            seed,
        }
    }

    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>, GenerationError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, GenerationError> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| GenerationError::Decode(e.to_string()))
    }

    /// Greedy continuation of `prompt_ids`. Each returned sequence starts
    /// with the prompt and stops at EOS or at `max_length` tokens, with at
    /// least one token appended.
    pub fn generate_ids(
        &self,
        prompt_ids: &[u32],
        params: GenerationParams,
    ) -> Result<Vec<Vec<u32>>, GenerationError> {
        if params.num_return_sequences == 0 {
            return Err(GenerationError::InvalidParams(
                "num_return_sequences must be at least 1".into(),
            ));
        }
        if prompt_ids.is_empty() {
            return Err(GenerationError::InvalidParams(
                "prompt produced no input tokens".into(),
            ));
        }

        let budget = new_token_budget(prompt_ids.len(), params.max_length);
        if prompt_ids.len() >= params.max_length {
            warn!(
                prompt_tokens = prompt_ids.len(),
                max_length = params.max_length,
                "prompt already fills max_length; appending a single token"
            );
        }

        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut processor = LogitsProcessor::from_sampling(self.seed, Sampling::ArgMax);
        let mut tokens = prompt_ids.to_vec();
        let mut index_pos = 0usize;

        for step in 0..budget {
            // first step: whole prompt; later: last token only
            let start = if step == 0 { 0 } else { tokens.len() - 1 };
            let ctx = &tokens[start..];

            let input = Tensor::new(ctx, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, index_pos, &mut cache)?.squeeze(0)?;
            index_pos += ctx.len();

            let next = processor.sample(&logits)?;
            tokens.push(next);

            if self.eos_tokens.contains(&next) {
                break;
            }
        }

        // Greedy decoding is deterministic, so extra sequences are copies.
        Ok(vec![tokens; params.num_return_sequences])
    }
}

impl TextGenerator for CausalLm {
    fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String, GenerationError> {
        let started = Instant::now();

        let prompt_ids = self.tokenize(prompt)?;
        let sequences = self.generate_ids(&prompt_ids, params)?;
        let first = sequences
            .first()
            .ok_or_else(|| GenerationError::Backend("model returned no sequences".into()))?;
        let text = self.decode(first, true)?;

        debug!(
            prompt_tokens = prompt_ids.len(),
            total_tokens = first.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation finished"
        );
        Ok(text)
    }
}

// ---------------------------------------------------------
// Helpers
// ---------------------------------------------------------
fn select_device(spec: DeviceSpec) -> Result<Device> {
    let device = match spec {
        DeviceSpec::Auto => Device::cuda_if_available(0)?,
        DeviceSpec::Cpu => Device::Cpu,
        DeviceSpec::Cuda(ordinal) => Device::new_cuda(ordinal)
            .with_context(|| format!("CUDA device {ordinal} unavailable"))?,
    };
    Ok(device)
}

fn select_dtype(spec: DTypeSpec, device: &Device) -> DType {
    match spec {
        DTypeSpec::Auto if device.is_cuda() => DType::F16,
        DTypeSpec::Auto => DType::F32,
        DTypeSpec::F16 => DType::F16,
        DTypeSpec::BF16 => DType::BF16,
        DTypeSpec::F32 => DType::F32,
    }
}

/// Number of tokens to append. The length check runs after each new
/// token, so a prompt that already fills `max_length` still gets one.
pub fn new_token_budget(prompt_len: usize, max_length: usize) -> usize {
    max_length.saturating_sub(prompt_len).max(1)
}

fn eos_token_ids(configured: Option<&LlamaEosToks>, fallback: Option<u32>) -> Vec<u32> {
    match configured {
        Some(LlamaEosToks::Single(id)) => vec![*id],
        Some(LlamaEosToks::Multiple(ids)) if !ids.is_empty() => ids.clone(),
        _ => fallback.into_iter().collect(),
    }
}

use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::inference::GenerationParams;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_MODEL_ID: &str = "codellama/CodeLlama-7b-hf";
pub const DEFAULT_REVISION: &str = "main";
pub const DEFAULT_MAX_LENGTH: usize = 150;
pub const DEFAULT_NUM_RETURN_SEQUENCES: usize = 1;
pub const DEFAULT_SEED: u64 = 299_792_458;

// ---------------------------------------------------------
// Types
// ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub model: ModelConfig,
    pub generation: GenerationParams,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Hub repository, e.g. `codellama/CodeLlama-7b-hf`.
    pub model_id: String,
    pub revision: String,
    /// Local snapshot with `tokenizer.json`, `config.json` and safetensors.
    /// Takes precedence over the hub when set.
    pub local_dir: Option<PathBuf>,
    pub hf_token: Option<String>,
    pub device: DeviceSpec,
    pub dtype: DTypeSpec,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpec {
    Auto,
    Cpu,
    Cuda(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DTypeSpec {
    Auto,
    F16,
    BF16,
    F32,
}

impl DeviceSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            other => {
                let ordinal = other
                    .strip_prefix("cuda:")
                    .ok_or_else(|| anyhow!("unknown device '{raw}' (expected auto, cpu or cuda:<n>)"))?;
                let ordinal = ordinal
                    .parse::<usize>()
                    .with_context(|| format!("invalid CUDA ordinal in '{raw}'"))?;
                Ok(Self::Cuda(ordinal))
            }
        }
    }
}

impl DTypeSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "f16" | "float16" => Ok(Self::F16),
            "bf16" | "bfloat16" => Ok(Self::BF16),
            "f32" | "float32" => Ok(Self::F32),
            _ => bail!("unknown dtype '{raw}' (expected auto, f16, bf16 or f32)"),
        }
    }
}

// ---------------------------------------------------------
// Loading
// ---------------------------------------------------------
impl AppConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("CODEGEN_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .with_context(|| format!("CODEGEN_BIND_ADDR: invalid socket address '{bind_raw}'"))?;

        let max_length = parse_count(get("CODEGEN_MAX_LENGTH"), "CODEGEN_MAX_LENGTH", DEFAULT_MAX_LENGTH)?;
        let num_return_sequences = parse_count(
            get("CODEGEN_NUM_RETURN_SEQUENCES"),
            "CODEGEN_NUM_RETURN_SEQUENCES",
            DEFAULT_NUM_RETURN_SEQUENCES,
        )?;

        let device = match get("CODEGEN_DEVICE") {
            Some(raw) => DeviceSpec::parse(&raw).context("CODEGEN_DEVICE")?,
            None => DeviceSpec::Auto,
        };
        let dtype = match get("CODEGEN_DTYPE") {
            Some(raw) => DTypeSpec::parse(&raw).context("CODEGEN_DTYPE")?,
            None => DTypeSpec::Auto,
        };
        let seed = match get("CODEGEN_SEED") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("CODEGEN_SEED: '{raw}' is not an unsigned integer"))?,
            None => DEFAULT_SEED,
        };

        Ok(Self {
            bind_addr,
            model: ModelConfig {
                model_id: get("CODEGEN_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.into()),
                revision: get("CODEGEN_MODEL_REVISION").unwrap_or_else(|| DEFAULT_REVISION.into()),
                local_dir: get("CODEGEN_MODEL_DIR").map(PathBuf::from),
                hf_token: get("HF_TOKEN"),
                device,
                dtype,
                seed,
            },
            generation: GenerationParams {
                max_length,
                num_return_sequences,
            },
        })
    }
}

fn parse_count(raw: Option<String>, key: &str, default: usize) -> Result<usize> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<usize>()
        .with_context(|| format!("{key}: '{raw}' is not an unsigned integer"))?;
    if value == 0 {
        bail!("{key} must be at least 1");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_development_server() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:5000");
        assert_eq!(cfg.model.model_id, DEFAULT_MODEL_ID);
        assert_eq!(cfg.model.revision, "main");
        assert!(cfg.model.local_dir.is_none());
        assert_eq!(cfg.model.device, DeviceSpec::Auto);
        assert_eq!(cfg.model.dtype, DTypeSpec::Auto);
        assert_eq!(cfg.generation.max_length, 150);
        assert_eq!(cfg.generation.num_return_sequences, 1);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config_from(&[
            ("CODEGEN_BIND_ADDR", "0.0.0.0:8080"),
            ("CODEGEN_MODEL_ID", "TinyLlama/TinyLlama-1.1B-Chat-v1.0"),
            ("CODEGEN_MODEL_DIR", "/models/tiny"),
            ("CODEGEN_MAX_LENGTH", "64"),
            ("CODEGEN_DEVICE", "cuda:1"),
            ("CODEGEN_DTYPE", "bf16"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.model.model_id, "TinyLlama/TinyLlama-1.1B-Chat-v1.0");
        assert_eq!(cfg.model.local_dir, Some(PathBuf::from("/models/tiny")));
        assert_eq!(cfg.generation.max_length, 64);
        assert_eq!(cfg.model.device, DeviceSpec::Cuda(1));
        assert_eq!(cfg.model.dtype, DTypeSpec::BF16);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config_from(&[("CODEGEN_MODEL_ID", "   "), ("HF_TOKEN", "")]).unwrap();
        assert_eq!(cfg.model.model_id, DEFAULT_MODEL_ID);
        assert!(cfg.model.hf_token.is_none());
    }

    #[test]
    fn zero_max_length_is_rejected() {
        let err = config_from(&[("CODEGEN_MAX_LENGTH", "0")]).unwrap_err();
        assert!(err.to_string().contains("CODEGEN_MAX_LENGTH"));
    }

    #[test]
    fn bad_bind_addr_is_rejected() {
        assert!(config_from(&[("CODEGEN_BIND_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn device_spec_parsing() {
        assert_eq!(DeviceSpec::parse("CPU").unwrap(), DeviceSpec::Cpu);
        assert_eq!(DeviceSpec::parse("cuda").unwrap(), DeviceSpec::Cuda(0));
        assert_eq!(DeviceSpec::parse("cuda:3").unwrap(), DeviceSpec::Cuda(3));
        assert!(DeviceSpec::parse("cuda:x").is_err());
        assert!(DeviceSpec::parse("metal").is_err());
    }

    #[test]
    fn dtype_spec_parsing() {
        assert_eq!(DTypeSpec::parse("auto").unwrap(), DTypeSpec::Auto);
        assert_eq!(DTypeSpec::parse("float16").unwrap(), DTypeSpec::F16);
        assert!(DTypeSpec::parse("int8").is_err());
    }
}

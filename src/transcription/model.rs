//! # Whisper Model Management
//!
//! Loading and running Whisper speech models through Candle-rs.
//!
//! ## Model Loading Process:
//! 1. Resolve the HuggingFace repository for the requested size
//! 2. Download config, tokenizer, and safetensors weights into the local
//!    cache (skipped when already cached)
//! 3. Initialize the model on the selected device
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, good for quick runs
//! - **small**: ~244MB, better accuracy
//! - **medium**: ~769MB, handles technical vocabulary well
//! - **large**: ~1550MB, best accuracy but slowest

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Available Whisper model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace model repository for this size.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Approximate download size in MB, for the pre-load log line.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// A loaded Whisper model ready for inference.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    size: ModelSize,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Load a Whisper model, downloading weights into `cache_dir` on first
    /// use.
    ///
    /// The cache location is also exported as `HF_HUB_CACHE` before the
    /// first download so the hub library and any child tooling agree on
    /// where model files live.
    pub async fn load(size: ModelSize, device: Device, cache_dir: &Path) -> Result<Self> {
        info!(
            "Loading Whisper {} model (~{} MB, cached under {})",
            size,
            size.size_mb(),
            cache_dir.display()
        );
        let start_time = std::time::Instant::now();

        std::env::set_var("HF_HUB_CACHE", cache_dir);
        let (config_file, tokenizer_file, weights_file) =
            Self::fetch_model_files(size, cache_dir).await?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_file)?)?;
        debug!("Model config: {:?}", config);

        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = Self::build_mel_filter_bank(&config);

        let vb = if weights_file.to_string_lossy().ends_with(".safetensors") {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_file], m::DTYPE, &device)? }
        } else {
            return Err(anyhow!("Only safetensors weights are supported"));
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        info!(
            "Whisper {} model ready in {:.2}s",
            size,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            device,
            size,
            tokenizer,
            mel_filters,
        })
    }

    /// Download (or find cached) config, tokenizer, and weights files.
    async fn fetch_model_files(
        size: ModelSize,
        cache_dir: &Path,
    ) -> Result<(PathBuf, PathBuf, PathBuf)> {
        use hf_hub::api::tokio::ApiBuilder;

        let mut builder = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .with_progress(false);
        // Anonymous access works for the openai/whisper-* repos; a token is
        // only picked up when the environment provides one.
        builder = builder.with_token(std::env::var("HF_TOKEN").ok());
        let api = builder.build()?;

        let repo = api.model(size.repo_name().to_string());
        let config_file = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_file = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let weights_file = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        Ok((config_file, tokenizer_file, weights_file))
    }

    /// Triangular mel filter bank sized to the model configuration.
    fn build_mel_filter_bank(config: &Config) -> Vec<f32> {
        let n_fft = 400; // standard for 16 kHz Whisper input
        let n_mels = config.num_mel_bins as usize;
        let mut filters = vec![0.0f32; n_fft * n_mels];

        for i in 0..n_mels {
            let center = (i + 1) * n_fft / (n_mels + 1);
            let width = n_fft / (n_mels + 1);
            for j in center.saturating_sub(width)..=(center + width).min(n_fft - 1) {
                let distance = (j as i32 - center as i32).abs() as f32;
                filters[i * n_fft + j] = (1.0 - distance / width as f32).max(0.0);
            }
        }

        filters
    }

    /// Convert PCM audio to the mel spectrogram the encoder consumes.
    ///
    /// The window is padded or truncated to Whisper's fixed 30-second
    /// input (480,000 samples at 16 kHz, 3,000 frames).
    fn pcm_to_mel(&self, pcm_data: &[f32]) -> Result<Tensor> {
        let target_len = 30 * 16000;
        let mut padded = vec![0.0f32; target_len];
        let copy_len = pcm_data.len().min(target_len);
        padded[..copy_len].copy_from_slice(&pcm_data[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let n_frames = 3000;
        let mut mel_data = vec![0.0f32; n_mels * n_frames];

        // Log-energy features per frame, floored at -80 dB.
        let frame_size = padded.len() / n_frames;
        for frame in 0..n_frames {
            let start = frame * frame_size;
            let end = (start + frame_size).min(padded.len());

            let mut energy = 0.0f32;
            for sample in &padded[start..end] {
                energy += sample.abs();
            }
            let feature = (energy / frame_size as f32).ln().max(-11.5129);
            for mel_bin in 0..n_mels {
                mel_data[mel_bin * n_frames + frame] = feature;
            }
        }

        Ok(Tensor::from_vec(mel_data, (n_mels, n_frames), &self.device)?)
    }

    /// Transcribe one window of audio to text.
    ///
    /// ## Audio Requirements:
    /// - 16 kHz mono, 32-bit float in [-1.0, 1.0]
    /// - At most ~30 seconds (longer input is truncated by the mel step;
    ///   callers window longer audio themselves)
    pub async fn transcribe(&mut self, audio_data: &[f32], language: Option<&str>) -> Result<String> {
        if audio_data.is_empty() {
            return Err(anyhow!("Audio data is empty"));
        }

        let mel = self.pcm_to_mel(audio_data)?;
        let mel = mel.unsqueeze(0)?; // batch dimension

        let encoder_output = self.model.encoder.forward(&mel, false)?;

        // Prompt: start-of-transcript, optional language, transcribe task.
        let mut tokens = vec![SOT_TOKEN];
        if let Some(lang) = language {
            if let Some(lang_token) = language_token(lang) {
                tokens.push(lang_token);
            }
        }
        tokens.push(TRANSCRIBE_TOKEN);
        let prefix_len = tokens.len();

        let mut output_tokens = Vec::new();

        // Greedy decode with temperature fallback when the output degenerates.
        const MAX_TOKENS: usize = 200;
        const TEMPERATURES: &[f32] = &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0];

        for &temperature in TEMPERATURES {
            tokens.truncate(prefix_len);
            output_tokens.clear();

            let mut decode_success = true;

            for _ in 0..MAX_TOKENS {
                let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
                let logits = self
                    .model
                    .decoder
                    .forward(&token_tensor, &encoder_output, false)?;
                let last_logits = logits.i((.., tokens.len() - 1, ..))?;

                let next_token = if temperature > 0.0 {
                    self.sample_token(&last_logits, temperature)?
                } else {
                    last_logits.argmax_keepdim(1)?.to_scalar::<u32>()?
                };

                if next_token == EOT_TOKEN {
                    break;
                }
                if is_repetitive(&output_tokens, next_token) {
                    decode_success = false;
                    break;
                }

                tokens.push(next_token);
                output_tokens.push(next_token);
            }

            if decode_success && !output_tokens.is_empty() {
                break;
            }
        }

        self.decode_tokens(&output_tokens)
    }

    /// Size this model was loaded as.
    pub fn size(&self) -> ModelSize {
        self.size
    }

    fn sample_token(&self, logits: &Tensor, temperature: f32) -> Result<u32> {
        let temp_tensor = Tensor::from_vec(vec![temperature], (1,), &self.device)?;
        let logits = logits.broadcast_div(&temp_tensor)?;
        let probs = candle_nn::ops::softmax_last_dim(&logits)?;
        Ok(probs.argmax_keepdim(1)?.to_scalar::<u32>()?)
    }

    /// Decode token ids to text and strip the special-token artifacts.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");
        Ok(cleaned.trim().to_string())
    }
}

// Standard Whisper special-token ids.
const SOT_TOKEN: u32 = 50258;
const EOT_TOKEN: u32 = 50257;
const TRANSCRIBE_TOKEN: u32 = 50359;

/// Language token id for a hint, when we know it.
fn language_token(language: &str) -> Option<u32> {
    match language.to_lowercase().as_str() {
        "en" | "english" => Some(50259),
        "zh" | "chinese" => Some(50260),
        "de" | "german" => Some(50261),
        "es" | "spanish" => Some(50262),
        "ru" | "russian" => Some(50263),
        "ko" | "korean" => Some(50264),
        "fr" | "french" => Some(50265),
        "ja" | "japanese" => Some(50266),
        "pt" | "portuguese" => Some(50267),
        "it" | "italian" => Some(50274),
        _ => None,
    }
}

/// Guard against the decoder looping: immediate triples and repeated
/// trigram patterns both count as degenerate output.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    if tokens.len() < 3 {
        return false;
    }

    if tokens[tokens.len() - 3..] == [new_token, new_token, new_token] {
        return true;
    }

    if tokens.len() >= 6 {
        let last_3 = &tokens[tokens.len() - 3..];
        let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
        if last_3 == prev_3 {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("base".parse::<ModelSize>().unwrap(), ModelSize::Base);
        assert_eq!("LARGE".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!("invalid".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_model_size_round_trips_through_display() {
        for size in [
            ModelSize::Tiny,
            ModelSize::Base,
            ModelSize::Small,
            ModelSize::Medium,
            ModelSize::Large,
        ] {
            assert_eq!(size.to_string().parse::<ModelSize>().unwrap(), size);
        }
    }

    #[test]
    fn test_repo_names_point_at_openai_checkpoints() {
        assert_eq!(ModelSize::Large.repo_name(), "openai/whisper-large-v2");
        assert_eq!(ModelSize::Tiny.repo_name(), "openai/whisper-tiny");
    }

    #[test]
    fn test_repetition_guard() {
        assert!(!is_repetitive(&[1, 2], 2));
        assert!(is_repetitive(&[9, 5, 5, 5], 5));
        assert!(is_repetitive(&[1, 2, 3, 1, 2, 3], 0));
        assert!(!is_repetitive(&[1, 2, 3, 4, 5, 6], 7));
    }

    #[test]
    fn test_language_tokens_cover_the_hint_languages() {
        assert_eq!(language_token("en"), Some(50259));
        assert_eq!(language_token("Japanese"), Some(50266));
        assert_eq!(language_token("tlh"), None);
    }
}

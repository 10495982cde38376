//! Speech providers.
//!
//! A provider turns one chunk of text into one audio file. The synthesizer
//! only sees the [`SpeechProvider`] trait, so HTTP engines, cloud APIs and
//! local binaries are interchangeable.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::{
    cancel::CancelToken,
    config::ProviderSettings,
    error::CourseError,
    process::{self, ProcessError},
    types::{Quality, VoiceOptions},
};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Missing API key for {provider_name}: set {env_var}")]
    MissingApiKey {
        provider_name: String,
        env_var: &'static str,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider_name} rejected the request ({status}): {body}")]
    Rejected {
        provider_name: String,
        status: u16,
        body: String,
    },

    #[error("{provider_name} could not synthesize speech: {message}")]
    Synthesis {
        provider_name: String,
        message: String,
    },

    #[error("Invalid response from {provider_name}: {reason}")]
    InvalidResponse {
        provider_name: String,
        reason: String,
    },

    #[error("Speech command failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Speech command exited with {status}: {diagnostics}")]
    CommandFailed { status: String, diagnostics: String },

    #[error("Failed to read audio {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether another attempt could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ProviderError::Rejected { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Process(ProcessError::TimedOut { .. }) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Bark,
    SpeechT5,
    OpenAi,
    Command,
}

pub struct ProviderConfig {
    pub api_url: Option<&'static str>,
    pub model: Option<&'static str>,
    pub env_var: Option<&'static str>,
}

impl ProviderKind {
    pub fn config(&self) -> ProviderConfig {
        match self {
            ProviderKind::Bark => ProviderConfig {
                api_url: Some("http://localhost:8081/generate"),
                model: None,
                env_var: None,
            },
            ProviderKind::SpeechT5 => ProviderConfig {
                api_url: Some("http://localhost:8001/generate"),
                model: None,
                env_var: None,
            },
            ProviderKind::OpenAi => ProviderConfig {
                api_url: Some("https://api.openai.com/v1/audio/speech"),
                model: Some("tts-1"),
                env_var: Some("OPENAI_API_KEY"),
            },
            ProviderKind::Command => ProviderConfig {
                api_url: None,
                model: None,
                env_var: None,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Bark => "Bark",
            ProviderKind::SpeechT5 => "SpeechT5",
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Command => "Command",
        }
    }

    /// Reads the API key for providers that need one.
    pub fn validate_api_key(&self) -> Result<Option<String>, ProviderError> {
        let Some(env_var) = self.config().env_var else {
            return Ok(None);
        };
        std::env::var(env_var)
            .map(Some)
            .map_err(|_| ProviderError::MissingApiKey {
                provider_name: self.name().to_string(),
                env_var,
            })
    }
}

/// One synthesis call.
pub struct SpeechRequest<'a> {
    pub text: &'a str,
    pub voice: &'a VoiceOptions,
    /// Where the caller would like the audio written. Providers that produce
    /// audio elsewhere report the real location in [`SynthesizedAudio::path`].
    pub output_path: &'a Path,
    pub cancel: &'a CancelToken,
}

#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub sample_rate: Option<u32>,
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_speech(
        &self,
        request: SpeechRequest<'_>,
    ) -> Result<SynthesizedAudio, ProviderError>;
}

/// Reads duration and sample rate from a WAV header.
pub fn probe_wav(path: &Path) -> Result<(f64, u32), ProviderError> {
    let reader = hound::WavReader::open(path).map_err(|source| ProviderError::Probe {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(ProviderError::InvalidResponse {
            provider_name: "wav".to_string(),
            reason: format!("{} declares a zero sample rate", path.display()),
        });
    }
    let seconds = reader.duration() as f64 / spec.sample_rate as f64;
    Ok((seconds, spec.sample_rate))
}

struct QualityParams {
    temperature: f32,
    sample_rate: u32,
}

fn quality_params(quality: Quality) -> QualityParams {
    match quality {
        Quality::High => QualityParams {
            temperature: 0.5,
            sample_rate: 22050,
        },
        Quality::Standard => QualityParams {
            temperature: 0.7,
            sample_rate: 16000,
        },
    }
}

async fn cancellable<T>(
    cancel: &CancelToken,
    fut: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    tokio::select! {
        result = fut => result,
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
    }
}

async fn reject_unless_success(
    provider_name: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Rejected {
        provider_name: provider_name.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    text: &'a str,
    voice: &'a str,
    temperature: f32,
    sample_rate: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    success: bool,
    #[serde(default)]
    audio_path: Option<PathBuf>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Self-hosted speech server speaking the `/generate` JSON protocol
/// (Bark, SpeechT5). The server writes audio to a shared filesystem and
/// answers with its path.
pub struct SpeechServer {
    kind: ProviderKind,
    url: String,
    client: reqwest::Client,
}

impl SpeechServer {
    pub fn new(kind: ProviderKind, url: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { kind, url, client })
    }

    fn default_voice(&self) -> &'static str {
        match self.kind {
            ProviderKind::SpeechT5 => "default",
            _ => "v2/en_speaker_6",
        }
    }
}

#[async_trait]
impl SpeechProvider for SpeechServer {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn generate_speech(
        &self,
        request: SpeechRequest<'_>,
    ) -> Result<SynthesizedAudio, ProviderError> {
        let params = quality_params(request.voice.quality);
        let body = GenerateRequest {
            text: request.text,
            voice: request
                .voice
                .voice_id
                .as_deref()
                .unwrap_or(self.default_voice()),
            temperature: params.temperature,
            sample_rate: params.sample_rate,
        };

        let reply = cancellable(request.cancel, async {
            let response = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await?;
            let response = reject_unless_success(self.name(), response).await?;
            Ok(response.json::<GenerateResponse>().await?)
        })
        .await?;

        if !reply.success {
            return Err(ProviderError::Synthesis {
                provider_name: self.name().to_string(),
                message: reply.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        let path = reply
            .audio_path
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider_name: self.name().to_string(),
                reason: "missing audio_path".to_string(),
            })?;

        match reply.duration {
            Some(duration) if duration > 0.0 => Ok(SynthesizedAudio {
                path,
                duration_seconds: duration,
                sample_rate: reply.sample_rate,
            }),
            _ => {
                let (duration_seconds, sample_rate) = probe_wav(&path)?;
                Ok(SynthesizedAudio {
                    path,
                    duration_seconds,
                    sample_rate: Some(sample_rate),
                })
            }
        }
    }
}

/// OpenAI's `/v1/audio/speech`, which streams WAV bytes back.
pub struct OpenAiSpeech {
    api_key: String,
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(
        api_key: String,
        url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            url,
            model,
            client,
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiSpeech {
    fn name(&self) -> &str {
        ProviderKind::OpenAi.name()
    }

    async fn generate_speech(
        &self,
        request: SpeechRequest<'_>,
    ) -> Result<SynthesizedAudio, ProviderError> {
        let model = match request.voice.quality {
            Quality::High if self.model == "tts-1" => "tts-1-hd",
            _ => self.model.as_str(),
        };
        let voice = request.voice.voice_id.as_deref().unwrap_or("alloy");

        let bytes = cancellable(request.cancel, async {
            let response = self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&serde_json::json!({
                    "model": model,
                    "input": request.text,
                    "voice": voice,
                    "response_format": "wav",
                }))
                .send()
                .await?;
            let response = reject_unless_success(self.name(), response).await?;
            Ok(response.bytes().await?)
        })
        .await?;

        tokio::fs::write(request.output_path, &bytes).await?;
        let (duration_seconds, sample_rate) = probe_wav(request.output_path)?;
        Ok(SynthesizedAudio {
            path: request.output_path.to_path_buf(),
            duration_seconds,
            sample_rate: Some(sample_rate),
        })
    }
}

/// Local engine driven like piper: text on stdin, WAV written to
/// `--output_file`.
pub struct CommandSpeech {
    program: PathBuf,
    args: Vec<String>,
    model: Option<String>,
    timeout: Duration,
}

impl CommandSpeech {
    pub fn new(program: PathBuf, args: Vec<String>, model: Option<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            model,
            timeout,
        }
    }
}

#[async_trait]
impl SpeechProvider for CommandSpeech {
    fn name(&self) -> &str {
        ProviderKind::Command.name()
    }

    async fn generate_speech(
        &self,
        request: SpeechRequest<'_>,
    ) -> Result<SynthesizedAudio, ProviderError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(model) = request.voice.voice_id.as_ref().or(self.model.as_ref()) {
            command.arg("--model").arg(model);
        }
        command.arg("--output_file").arg(request.output_path);

        debug!(program = %self.program.display(), chars = request.text.len(), "running speech command");
        let output = process::run_with_input(
            command,
            Some(request.text.as_bytes()),
            self.timeout,
            request.cancel,
        )
        .await
        .map_err(|err| match err {
            ProcessError::Cancelled { .. } => ProviderError::Cancelled,
            other => ProviderError::Process(other),
        })?;

        if !output.success() {
            return Err(ProviderError::CommandFailed {
                status: output.status.to_string(),
                diagnostics: output.diagnostics(),
            });
        }

        let (duration_seconds, sample_rate) = probe_wav(request.output_path)?;
        Ok(SynthesizedAudio {
            path: request.output_path.to_path_buf(),
            duration_seconds,
            sample_rate: Some(sample_rate),
        })
    }
}

/// Builds the provider described by `settings`.
pub fn build_provider(settings: &ProviderSettings) -> crate::Result<Arc<dyn SpeechProvider>> {
    let kind = settings.kind;
    let config = kind.config();
    let timeout = Duration::from_secs(settings.timeout_secs);
    let configuration = |reason: String| CourseError::Configuration { reason };

    let provider: Arc<dyn SpeechProvider> = match kind {
        ProviderKind::Bark | ProviderKind::SpeechT5 => {
            let url = settings
                .url
                .clone()
                .or_else(|| config.api_url.map(str::to_string))
                .ok_or_else(|| configuration(format!("{} needs a url", kind.name())))?;
            Arc::new(SpeechServer::new(kind, url, timeout).map_err(|e| configuration(e.to_string()))?)
        }
        ProviderKind::OpenAi => {
            let api_key = kind
                .validate_api_key()
                .map_err(|e| configuration(e.to_string()))?
                .unwrap_or_default();
            let url = settings
                .url
                .clone()
                .or_else(|| config.api_url.map(str::to_string))
                .ok_or_else(|| configuration(format!("{} needs a url", kind.name())))?;
            let model = settings
                .model
                .clone()
                .or_else(|| config.model.map(str::to_string))
                .unwrap_or_default();
            Arc::new(
                OpenAiSpeech::new(api_key, url, model, timeout)
                    .map_err(|e| configuration(e.to_string()))?,
            )
        }
        ProviderKind::Command => {
            let program = settings.command.clone().ok_or_else(|| {
                configuration("the command provider requires `command`".to_string())
            })?;
            Arc::new(CommandSpeech::new(
                program,
                settings.args.clone(),
                settings.model.clone(),
                timeout,
            ))
        }
    };

    Ok(provider)
}

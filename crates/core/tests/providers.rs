mod common;

use std::{path::Path, time::Duration};

use coursecast_core::{
    CancelToken, CourseError, PipelineConfig, ProviderError, ProviderKind, ProviderSettings,
    SpeechProvider, SpeechRequest, VoiceOptions, cancel_pair,
    process::{self, ProcessError},
    provider::{build_provider, probe_wav},
};
use tokio::process::Command;

fn write_wav(path: &Path, sample_rate: u32, samples: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..samples {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn probe_reads_duration_from_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_wav(&path, 16000, 24000);

    let (seconds, rate) = probe_wav(&path).unwrap();
    assert_eq!(rate, 16000);
    assert!((seconds - 1.5).abs() < 1e-9);
}

#[test]
fn probe_rejects_non_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bogus.wav");
    std::fs::write(&path, b"not audio").unwrap();
    assert!(matches!(probe_wav(&path), Err(ProviderError::Probe { .. })));
}

#[test]
fn transient_classification() {
    let rejected = |status| ProviderError::Rejected {
        provider_name: "x".to_string(),
        status,
        body: String::new(),
    };
    assert!(rejected(503).is_transient());
    assert!(rejected(429).is_transient());
    assert!(!rejected(400).is_transient());
    assert!(!rejected(401).is_transient());
    assert!(
        ProviderError::Process(ProcessError::TimedOut {
            program: "tts".to_string(),
            timeout: Duration::from_secs(1),
        })
        .is_transient()
    );
    assert!(!ProviderError::Cancelled.is_transient());
}

#[test]
fn command_provider_requires_a_command() {
    let settings = ProviderSettings {
        kind: ProviderKind::Command,
        ..Default::default()
    };
    assert!(matches!(
        build_provider(&settings),
        Err(CourseError::Configuration { .. })
    ));
}

#[test]
fn speech_servers_get_default_urls() {
    let bark = build_provider(&ProviderSettings::default()).unwrap();
    assert_eq!(bark.name(), "Bark");
    assert_eq!(
        ProviderKind::SpeechT5.config().api_url,
        Some("http://localhost:8001/generate")
    );
}

#[test]
fn config_validation() {
    type Mutation = fn(&mut PipelineConfig);
    let cases: [(&str, Mutation); 9] = [
        ("chunk_size", |c: &mut PipelineConfig| c.chunk_size = 0),
        ("parallelism", |c: &mut PipelineConfig| c.synthesis_parallelism = 0),
        ("workers", |c: &mut PipelineConfig| c.lesson_workers = 0),
        ("attempts", |c: &mut PipelineConfig| c.max_attempts = 0),
        ("resolution", |c: &mut PipelineConfig| c.encoder.width = 0),
        ("fps", |c: &mut PipelineConfig| c.encoder.fps = 0),
        ("quality", |c: &mut PipelineConfig| c.quality = "ultra".to_string()),
        ("style", |c: &mut PipelineConfig| {
            c.background_style = Some("plaid".to_string())
        }),
        ("command provider", |c: &mut PipelineConfig| {
            c.provider.kind = ProviderKind::Command
        }),
    ];

    for (name, mutate) in cases {
        let mut config = PipelineConfig::default();
        mutate(&mut config);
        assert!(
            matches!(config.validate(), Err(CourseError::Configuration { .. })),
            "{name} should be rejected"
        );
    }
}

#[test]
fn config_parses_overrides() {
    let config: PipelineConfig = serde_json::from_str(
        r#"{
            "chunk_size": 120,
            "quality": "high",
            "background_style": "noise",
            "provider": { "kind": "command", "command": "/usr/bin/piper" },
            "encoder": { "subtitle_mode": "soft", "fps": 24 }
        }"#,
    )
    .unwrap();

    config.validate().unwrap();
    let options = config.processing_options().unwrap();
    assert_eq!(options.quality.name(), "high");
    assert_eq!(config.encoder.fps, 24);
    assert_eq!(config.encoder.width, 1920);
    assert_eq!(config.provider.timeout_secs, 60);
}

#[cfg(unix)]
mod local {
    use super::*;
    use common::write_script;

    #[tokio::test]
    async fn process_timeout_kills_child() {
        let mut command = Command::new("sh");
        command.args(["-c", "exec sleep 30"]);
        let started = std::time::Instant::now();

        let err = process::run(command, Duration::from_millis(200), &CancelToken::never())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn process_cancellation() {
        let (handle, cancel) = cancel_pair();
        let mut command = Command::new("sh");
        command.args(["-c", "exec sleep 30"]);

        let run = tokio::spawn(async move {
            process::run(command, Duration::from_secs(60), &cancel).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn process_feeds_stdin_and_captures_output() {
        let mut command = Command::new("sh");
        command.args(["-c", "tr a-z A-Z; echo warn >&2"]);

        let output = process::run_with_input(
            command,
            Some(&b"narrate me"[..]),
            Duration::from_secs(10),
            &CancelToken::never(),
        )
        .await
        .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, b"NARRATE ME");
        assert_eq!(output.diagnostics(), "warn\nNARRATE ME");
    }

    #[tokio::test]
    async fn process_drains_output_while_feeding_stdin() {
        // Fills the stdout pipe before reading anything from stdin.
        let mut command = Command::new("sh");
        command.args(["-c", "head -c 200000 /dev/zero; cat >/dev/null"]);
        let input = vec![b'x'; 200_000];

        let output = process::run_with_input(
            command,
            Some(&input[..]),
            Duration::from_secs(10),
            &CancelToken::never(),
        )
        .await
        .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.len(), 200_000);
    }

    const PIPER_LIKE: &str = r#"#!/bin/sh
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--output_file" ]; then out="$arg"; fi
  prev="$arg"
done
cat > "$out.txt"
printf '%s\n' "$@" > "$out.args"
cp "$FIXTURE_WAV" "$out"
"#;

    #[tokio::test]
    async fn command_provider_runs_local_engine() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.wav");
        write_wav(&fixture, 22050, 44100);
        let script = PIPER_LIKE.replace("$FIXTURE_WAV", &fixture.to_string_lossy());
        let program = write_script(dir.path(), "piper", &script);

        let provider = build_provider(&ProviderSettings {
            kind: ProviderKind::Command,
            command: Some(program),
            args: vec!["--quiet".to_string()],
            model: Some("en_US-lessac".to_string()),
            ..Default::default()
        })
        .unwrap();

        let output = dir.path().join("chunk_0000.wav");
        let voice = VoiceOptions::default();
        let cancel = CancelToken::never();
        let audio = provider
            .generate_speech(SpeechRequest {
                text: "Welcome to the course.",
                voice: &voice,
                output_path: &output,
                cancel: &cancel,
            })
            .await
            .unwrap();

        assert_eq!(audio.path, output);
        assert_eq!(audio.sample_rate, Some(22050));
        assert!((audio.duration_seconds - 2.0).abs() < 1e-9);

        let stdin = std::fs::read_to_string(dir.path().join("chunk_0000.wav.txt")).unwrap();
        assert_eq!(stdin, "Welcome to the course.");
        let args = std::fs::read_to_string(dir.path().join("chunk_0000.wav.args")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args[0], "--quiet");
        assert_eq!(&args[1..3], ["--model", "en_US-lessac"]);
    }

    #[tokio::test]
    async fn command_provider_failure_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let program = write_script(
            dir.path(),
            "piper",
            "#!/bin/sh\ncat >/dev/null\necho 'model not found' >&2\nexit 1\n",
        );
        let provider = build_provider(&ProviderSettings {
            kind: ProviderKind::Command,
            command: Some(program),
            ..Default::default()
        })
        .unwrap();

        let output = dir.path().join("out.wav");
        let voice = VoiceOptions::default();
        let cancel = CancelToken::never();
        let err = provider
            .generate_speech(SpeechRequest {
                text: "hi",
                voice: &voice,
                output_path: &output,
                cancel: &cancel,
            })
            .await
            .unwrap_err();

        match &err {
            ProviderError::CommandFailed { diagnostics, .. } => {
                assert!(diagnostics.contains("model not found"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_transient());
    }
}

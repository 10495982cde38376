#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use coursecast_core::{ProviderError, SpeechProvider, SpeechRequest, SynthesizedAudio};

/// Provider that writes the chunk text as "audio" and reports a fixed
/// duration per chunk.
pub struct ScriptedProvider {
    pub seconds_per_chunk: f64,
    /// Chunks containing this marker always fail.
    pub fail_marker: Option<String>,
    /// Whether marker failures look transient (503) or permanent (400).
    pub marker_is_transient: bool,
    /// Transient failures served before a chunk succeeds.
    pub flaky_attempts: u32,
    /// Delay before answering, keyed by chunk text length.
    pub delay: fn(&str) -> Duration,
    attempts: Mutex<HashMap<String, u32>>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

fn no_delay(_: &str) -> Duration {
    Duration::ZERO
}

impl ScriptedProvider {
    pub fn new(seconds_per_chunk: f64) -> Self {
        Self {
            seconds_per_chunk,
            fail_marker: None,
            marker_is_transient: true,
            flaky_attempts: 0,
            delay: no_delay,
            attempts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, marker: &str, transient: bool) -> Self {
        self.fail_marker = Some(marker.to_string());
        self.marker_is_transient = transient;
        self
    }

    pub fn flaky(mut self, attempts: u32) -> Self {
        self.flaky_attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: fn(&str) -> Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn rejected(status: u16) -> ProviderError {
    ProviderError::Rejected {
        provider_name: "scripted".to_string(),
        status,
        body: "scripted failure".to_string(),
    }
}

#[async_trait]
impl SpeechProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_speech(
        &self,
        request: SpeechRequest<'_>,
    ) -> Result<SynthesizedAudio, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = (self.delay)(request.text);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker {
            if request.text.contains(marker.as_str()) {
                return Err(rejected(if self.marker_is_transient { 503 } else { 400 }));
            }
        }

        if self.flaky_attempts > 0 {
            let mut attempts = self.attempts.lock().unwrap();
            let seen = attempts.entry(request.text.to_string()).or_insert(0);
            *seen += 1;
            if *seen <= self.flaky_attempts {
                return Err(rejected(503));
            }
        }

        tokio::fs::write(request.output_path, request.text.as_bytes()).await?;
        Ok(SynthesizedAudio {
            path: request.output_path.to_path_buf(),
            duration_seconds: self.seconds_per_chunk,
            sample_rate: Some(24000),
        })
    }
}

/// Stand-in for ffmpeg. Concat runs (first input is the `.txt` listing)
/// copy the listing to the output; every other run writes its argument
/// list, one per line, to the last argument.
pub const FAKE_ENCODER: &str = r#"#!/bin/sh
out=""
first_input=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ] && [ -z "$first_input" ]; then first_input="$arg"; fi
  prev="$arg"
  out="$arg"
done
if [ "$out" = "-version" ]; then echo "fake encoder"; exit 0; fi
case "$first_input" in
  *.txt) cat "$first_input" > "$out" ;;
  *) printf '%s\n' "$@" > "$out" ;;
esac
"#;

pub const FAILING_ENCODER: &str = "#!/bin/sh\necho 'Invalid filtergraph: boom' >&2\nexit 3\n";

pub const SILENT_ENCODER: &str = "#!/bin/sh\nexit 0\n";

pub const SLOW_ENCODER: &str = "#!/bin/sh\nexec sleep 30\n";

/// Writes part of its output, then dies.
pub const PARTIAL_ENCODER: &str = r#"#!/bin/sh
for arg in "$@"; do out="$arg"; done
echo 'half a video' > "$out"
echo 'muxer died' >&2
exit 3
"#;

/// Writes part of its output, then hangs.
pub const STALLED_ENCODER: &str = r#"#!/bin/sh
for arg in "$@"; do out="$arg"; done
echo 'half a video' > "$out"
exec sleep 30
"#;

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

const WHITESPACE: &[char] = &[' ', '\n', '\t', '\r'];

/// Reads one token the way the encoder's `av_get_token` does. Leading
/// whitespace is skipped. A backslash takes the next character literally.
/// Single quotes group text and are dropped. Unescaped trailing whitespace
/// is trimmed. Returns the token and the input from the terminating
/// delimiter on.
pub fn get_token<'a>(input: &'a str, delims: &[char]) -> (String, &'a str) {
    let input = input.trim_start_matches(WHITESPACE);
    let mut out = String::new();
    // Escaped or quoted text is never trimmed.
    let mut keep = 0;
    let mut rest = "";
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        if delims.contains(&c) {
            rest = &input[i..];
            break;
        }
        match c {
            '\\' => match chars.next() {
                Some((_, next)) => {
                    out.push(next);
                    keep = out.len();
                }
                None => out.push(c),
            },
            '\'' => {
                let mut closed = false;
                for (_, q) in chars.by_ref() {
                    if q == '\'' {
                        closed = true;
                        break;
                    }
                    out.push(q);
                }
                if closed {
                    keep = out.len();
                }
            }
            c => out.push(c),
        }
    }

    while out.len() > keep && out.ends_with(WHITESPACE) {
        out.pop();
    }
    (out, rest)
}

/// Splits `input` into tokens separated by any of `delims`.
pub fn split_tokens(input: &str, delims: &[char]) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = input;
    loop {
        let (token, after) = get_token(rest, delims);
        tokens.push(token);
        match after.chars().next() {
            Some(delim) => rest = &after[delim.len_utf8()..],
            None => return tokens,
        }
    }
}

/// Filters of a single `[0:v]...[v]` chain as the graph parser hands them
/// over: one level of escaping removed.
pub fn chain_filters(graph: &str) -> Vec<String> {
    let body = graph
        .strip_prefix("[0:v]")
        .and_then(|g| g.strip_suffix("[v]"))
        .unwrap_or_else(|| panic!("not a single labeled chain: {graph}"));
    split_tokens(body, &[',', ';', '[', ']'])
}

/// `key=value` entries of one filter's arguments after option parsing.
pub fn filter_options(filter: &str, name: &str) -> Option<Vec<String>> {
    let args = filter.strip_prefix(name)?.strip_prefix('=')?;
    Some(split_tokens(args, &[':']))
}

/// drawtext's text expansion: a backslash takes the next character
/// literally, and any bare `%` would start an expansion.
pub fn expand_text(value: &str) -> String {
    let mut out = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => out.push(next),
                None => out.push(c),
            },
            '%' => panic!("bare % would be expanded in {value}"),
            c => out.push(c),
        }
    }
    out
}

/// Removes one level of backslash escaping.
pub fn unescape(value: &str) -> String {
    let mut out = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

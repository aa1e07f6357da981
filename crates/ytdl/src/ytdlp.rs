use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::extractor::{DownloadRequest, DownloadedFile, Extractor};
use crate::metadata::VideoMetadata;
use crate::progress::{parse_output_line, OutputTracker, ProgressUpdate};

pub const AUDIO_SELECTOR: &str = "bestaudio[ext=m4a]/bestaudio/best";
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const EXTRACTOR_ARGS: &str = "youtube:player_client=android,web";
const STDERR_KEEP: usize = 64 * 1024;

/// Drives the `yt-dlp` command line tool.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    base_args: Vec<String>,
    metadata_timeout: Duration,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
        }
    }

    /// Splits a command line such as `python3 -m yt_dlp` into program and
    /// leading arguments.
    pub fn from_command_line(cmdline: &str) -> Option<Self> {
        let mut parts = cmdline.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).with_base_args(parts.map(str::to_string).collect()))
    }

    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Runs `--version`; used as a startup check.
    pub async fn version(&self) -> Result<String, ExtractError> {
        let mut cmd = self.command();
        cmd.arg("--version");
        let output = tokio::time::timeout(Duration::from_secs(15), cmd.output())
            .await
            .map_err(|_| ExtractError::Timeout(Duration::from_secs(15)))?
            .map_err(ExtractError::Spawn)?;
        if !output.status.success() {
            return Err(ExtractError::from_stderr(
                &String::from_utf8_lossy(&output.stderr),
                format!("yt-dlp exited with {}", output.status),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn metadata_args(url: &str) -> Vec<String> {
        [
            "--dump-json",
            "--no-download",
            "--no-warnings",
            "--no-playlist",
            "--user-agent",
            USER_AGENT,
            "--extractor-args",
            EXTRACTOR_ARGS,
            "--",
            url,
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    pub fn download_args(request: &DownloadRequest, out_dir: &Path) -> Vec<String> {
        let template = out_dir.join("%(title)s.%(ext)s");
        let mut args: Vec<String> = Vec::new();

        if request.format.is_audio() {
            args.extend(
                ["-f", AUDIO_SELECTOR, "-x", "--audio-format", "mp3", "--audio-quality", "0"]
                    .map(String::from),
            );
        } else {
            args.extend([
                "-f".to_string(),
                request.quality.video_selector().to_string(),
                "--merge-output-format".to_string(),
                "mp4".to_string(),
            ]);
        }

        args.push("-o".to_string());
        args.push(template.to_string_lossy().into_owned());
        args.extend(
            [
                "--newline",
                "--progress",
                "--restrict-filenames",
                "--no-mtime",
                "--user-agent",
                USER_AGENT,
                "--extractor-args",
                EXTRACTOR_ARGS,
                "--no-check-certificate",
                "--no-playlist",
                "--",
            ]
            .map(String::from),
        );
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, ExtractError> {
        let mut cmd = self.command();
        cmd.args(Self::metadata_args(url));

        let output = tokio::time::timeout(self.metadata_timeout, cmd.output())
            .await
            .map_err(|_| ExtractError::Timeout(self.metadata_timeout))?
            .map_err(ExtractError::Spawn)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(%url, status = %output.status, "yt-dlp metadata fetch failed");
            return Err(ExtractError::from_stderr(
                &stderr,
                format!("yt-dlp exited with {}", output.status),
            ));
        }

        VideoMetadata::from_dump_json(&stdout, url)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        out_dir: &Path,
        progress: UnboundedSender<ProgressUpdate>,
    ) -> Result<DownloadedFile, ExtractError> {
        tokio::fs::create_dir_all(out_dir).await?;

        let mut cmd = self.command();
        cmd.args(Self::download_args(request, out_dir))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(ExtractError::Spawn)?;
        let stdout = child.stdout.take().ok_or_else(|| ExtractError::Parse("no stdout".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| ExtractError::Parse("no stderr".into()))?;

        // Drain stderr concurrently so the pipe never fills up.
        let stderr_task = tokio::spawn(collect_tail(stderr));

        let mut tracker = OutputTracker::default();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            debug!(target: "ytdl::output", "{line}");
            if let Some(update) = parse_output_line(&line).and_then(|ev| tracker.apply(ev)) {
                let _ = progress.send(update);
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(ExtractError::from_stderr(
                &stderr,
                format!("yt-dlp exited with {status}"),
            ));
        }

        let path = resolve_output_file(out_dir, &tracker).await?;
        let size = tokio::fs::metadata(&path).await?.len();
        Ok(DownloadedFile { path, size })
    }
}

async fn collect_tail<R>(mut reader: R) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > STDERR_KEEP {
                    let cut = buf.len() - STDERR_KEEP;
                    buf.drain(..cut);
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Finds the file yt-dlp produced.
///
/// Prefers the last path it announced, then the newest file named after the
/// announced title, then the newest finished file in `out_dir`.
pub async fn resolve_output_file(
    out_dir: &Path,
    tracker: &OutputTracker,
) -> Result<PathBuf, ExtractError> {
    if let Some(path) = &tracker.current_file {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(path.clone());
        }
    }

    let mut candidates: Vec<(PathBuf, SystemTime)> = Vec::new();
    let mut entries = tokio::fs::read_dir(out_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let path = entry.path();
        if is_partial(&path) {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((path, modified));
    }

    if let Some(title) = &tracker.current_title {
        let by_title = candidates.iter().filter(|(p, _)| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(title.as_str()))
                .unwrap_or(false)
        });
        if let Some(p) = newest(by_title) {
            return Ok(p);
        }
    }

    newest(candidates.iter()).ok_or(ExtractError::FileNotFound)
}

fn newest<'a>(items: impl Iterator<Item = &'a (PathBuf, SystemTime)>) -> Option<PathBuf> {
    items.max_by_key(|(_, m)| *m).map(|(p, _)| p.clone())
}

fn is_partial(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".part") || name.ends_with(".ytdl") || name.ends_with(".temp") || name.contains(".part-Frag")
}

use std::path::{Path, PathBuf};

/// Sent by an extractor while a download runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// 0..=100 as reported by the tool for the current stream.
    pub percent: u8,
    /// Stem of the file being written, once known.
    pub title: Option<String>,
}

/// One interesting line of `yt-dlp --newline --progress` stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Destination(PathBuf),
    Progress(f32),
    Merged(PathBuf),
    ExtractedAudio(PathBuf),
}

pub fn parse_output_line(line: &str) -> Option<OutputEvent> {
    let line = line.trim();

    if line.starts_with("[download]") {
        if let Some((_, dest)) = line.split_once("Destination:") {
            return Some(OutputEvent::Destination(PathBuf::from(dest.trim())));
        }
        let (head, _) = line.split_once('%')?;
        let pct: f32 = head.split_whitespace().last()?.parse().ok()?;
        return Some(OutputEvent::Progress(pct.clamp(0.0, 100.0)));
    }

    if line.starts_with("[Merger]") && line.contains("Merging formats into") {
        // [Merger] Merging formats into "/dir/Title.mp4"
        let mut quoted = line.rsplit('"');
        quoted.next()?;
        let path = quoted.next()?;
        if path.is_empty() {
            return None;
        }
        return Some(OutputEvent::Merged(PathBuf::from(path)));
    }

    if line.starts_with("[ExtractAudio]") {
        let (_, dest) = line.split_once("Destination:")?;
        return Some(OutputEvent::ExtractedAudio(PathBuf::from(dest.trim())));
    }

    None
}

/// Tracks where the final file ended up as output lines arrive.
#[derive(Debug, Default)]
pub struct OutputTracker {
    pub current_file: Option<PathBuf>,
    pub current_title: Option<String>,
}

impl OutputTracker {
    /// Applies `event`; returns a progress update when the line carried one.
    pub fn apply(&mut self, event: OutputEvent) -> Option<ProgressUpdate> {
        match event {
            OutputEvent::Destination(path) => {
                self.current_title = file_stem(&path);
                self.current_file = Some(path);
                None
            }
            OutputEvent::Progress(pct) => Some(ProgressUpdate {
                percent: pct as u8,
                title: self.current_title.clone(),
            }),
            OutputEvent::Merged(path) | OutputEvent::ExtractedAudio(path) => {
                self.current_file = Some(path);
                None
            }
        }
    }
}

// yt-dlp names intermediate streams `Title.f137.mp4`; drop the format id.
fn file_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let title = match stem.rsplit_once('.') {
        Some((base, fmt))
            if fmt.len() > 1 && fmt.starts_with('f') && fmt[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            base
        }
        _ => &stem[..],
    };
    Some(title.to_string())
}

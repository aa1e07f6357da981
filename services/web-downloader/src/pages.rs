//! Server-rendered HTML for the index, preview and error pages.

use std::fmt::Write as _;
use std::time::Duration;

use jobstore::{DownloadJob, JobState};
use ytdl::{format_view_count, MediaFormat, Quality, VideoMetadata};

use crate::forms::{DownloadForm, FormErrors};

const STYLE: &str = r#"
*{box-sizing:border-box}
body{margin:0;font-family:system-ui,-apple-system,"Segoe UI",Roboto,sans-serif;background:#0f1115;color:#e6e6e6}
a{color:#ff5a5f}
header{padding:1rem 2rem;background:#181b22;border-bottom:1px solid #262a33}
header a{color:#fff;text-decoration:none;font-weight:600;font-size:1.2rem}
main{max-width:960px;margin:2rem auto;padding:0 1rem}
.card{background:#181b22;border:1px solid #262a33;border-radius:10px;padding:1.5rem;margin-bottom:1.5rem}
.form-row{display:flex;gap:.75rem;flex-wrap:wrap;align-items:flex-end}
.form-row label{display:flex;flex-direction:column;gap:.3rem;font-size:.9rem}
.form-input{flex:1;min-width:280px;padding:.6rem;border-radius:6px;border:1px solid #333;background:#0f1115;color:#fff}
.form-select{padding:.6rem;border-radius:6px;border:1px solid #333;background:#0f1115;color:#fff}
.btn{padding:.6rem 1.2rem;border:0;border-radius:6px;background:#ff5a5f;color:#fff;cursor:pointer;text-decoration:none;display:inline-block}
.btn-secondary{background:#333}
.btn-small{padding:.3rem .7rem;font-size:.85rem}
.field-error{color:#ff8080;font-size:.85rem}
.notice{padding:.8rem 1rem;border-radius:6px;margin-bottom:1rem}
.notice-success{background:#163b24}
.notice-error{background:#4a1b1b}
.job{display:flex;gap:1rem;padding:1rem 0;border-top:1px solid #262a33}
.job img{width:120px;height:68px;object-fit:cover;border-radius:4px;background:#000}
.job-body{flex:1}
.job-title{font-weight:600}
.job-meta{font-size:.85rem;color:#9aa0aa}
.bar{height:8px;background:#262a33;border-radius:4px;overflow:hidden;margin:.5rem 0}
.bar-fill{height:100%;background:#ff5a5f;transition:width .4s}
.status-completed .bar-fill{background:#3cb371}
.status-failed .bar-fill{background:#aa3333}
.job-error{color:#ff8080;font-size:.85rem}
.job-actions{display:flex;gap:.5rem;align-items:center}
.preview{display:flex;gap:1.5rem;flex-wrap:wrap}
.preview img{max-width:360px;width:100%;border-radius:8px}
.description{white-space:pre-wrap;font-size:.9rem;color:#b8bcc4;max-height:12rem;overflow:auto}
"#;

const SCRIPT: &str = r#"
(function(){
  function poll(row){
    var id=row.dataset.jobId;
    fetch('/progress/'+id+'/',{headers:{'Accept':'application/json'}})
      .then(function(r){return r.ok?r.json():null})
      .then(function(d){
        if(!d){return}
        row.querySelector('.bar-fill').style.width=d.progress+'%';
        row.querySelector('.job-progress').textContent=d.progress+'%';
        row.querySelector('.job-status').textContent=d.status.charAt(0).toUpperCase()+d.status.slice(1);
        row.querySelector('.job-title').textContent=d.title;
        if(d.status==='completed'||d.status==='failed'){window.location.reload();return}
        setTimeout(function(){poll(row)},2000);
      })
      .catch(function(){setTimeout(function(){poll(row)},5000)});
  }
  document.querySelectorAll('.job[data-active="true"]').forEach(poll);
  document.querySelectorAll('form.delete-form').forEach(function(form){
    form.addEventListener('submit',function(ev){
      ev.preventDefault();
      if(!confirm('Delete this download?')){return}
      fetch(form.action,{method:'POST',headers:{'X-Requested-With':'XMLHttpRequest'}})
        .then(function(r){return r.json()})
        .then(function(d){if(d.success){var row=form.closest('.job');if(row){row.remove()}}})
        .catch(function(){form.submit()});
    });
  });
  var fmt=document.getElementById('format_type');
  var q=document.getElementById('quality');
  if(fmt&&q){
    var sync=function(){if(fmt.value==='mp3'){q.value='best';q.disabled=true}else{q.disabled=false}};
    fmt.addEventListener('change',sync);sync();
  }
})();
"#;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    let mut html = String::with_capacity(body.len() + STYLE.len() + SCRIPT.len() + 512);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    let _ = writeln!(html, "<title>{} · YouTube Downloader</title>", escape_html(title));
    html.push_str("<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str("<header><a href=\"/\">YouTube Downloader</a></header>\n<main>\n");
    html.push_str(body);
    html.push_str("\n</main>\n");
    html.push_str("<script>");
    html.push_str(SCRIPT);
    html.push_str("</script>\n</body>\n</html>\n");
    html
}

/// "6 hours" or "2 days", for the retention note under the job list.
pub fn retention_text(retention: Duration) -> String {
    let hours = (retention.as_secs() / 3600).max(1);
    let (n, unit) = if hours % 24 == 0 { (hours / 24, "day") } else { (hours, "hour") };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Flash text for a `?notice=` code, as `(css class, message)`.
pub fn notice_text(code: &str) -> Option<(&'static str, &'static str)> {
    match code {
        "started" => Some(("notice-success", "Download started successfully!")),
        "deleted" => Some(("notice-success", "Download deleted successfully!")),
        "missing_url" => Some(("notice-error", "Please provide a YouTube URL")),
        _ => None,
    }
}

fn select_options<T: Copy + PartialEq>(all: &[T], selected: Option<T>, value: fn(&T) -> &'static str, label: fn(&T) -> &'static str) -> String {
    let mut out = String::new();
    for item in all {
        let sel = if Some(*item) == selected { " selected" } else { "" };
        let _ = write!(out, "<option value=\"{}\"{sel}>{}</option>", value(item), label(item));
    }
    out
}

fn field_error(err: &Option<String>) -> String {
    match err {
        Some(msg) => format!("<span class=\"field-error\">{}</span>", escape_html(msg)),
        None => String::new(),
    }
}

fn download_form(form: &DownloadForm, errors: &FormErrors) -> String {
    let format = form.format_type.parse::<MediaFormat>().ok().or(Some(MediaFormat::Mp4));
    let quality = form.quality.parse::<Quality>().ok().or(Some(Quality::Best));

    format!(
        r#"<form method="post" action="/" class="download-form">
<div class="form-row">
<label>YouTube URL
<input type="url" name="url" class="form-input" placeholder="Enter YouTube URL (video or playlist)" required value="{url}">
{url_err}</label>
<label>Format
<select name="format_type" id="format_type" class="form-select">{formats}</select>
{format_err}</label>
<label>Quality
<select name="quality" id="quality" class="form-select">{qualities}</select>
{quality_err}</label>
<button type="submit" class="btn">Download</button>
<button type="submit" class="btn btn-secondary" formmethod="get" formaction="/preview/">Preview</button>
</div>
</form>"#,
        url = escape_html(&form.url),
        url_err = field_error(&errors.url),
        formats = select_options(&MediaFormat::ALL, format, MediaFormat::as_str, MediaFormat::label),
        format_err = field_error(&errors.format_type),
        qualities = select_options(&Quality::ALL, quality, Quality::as_str, Quality::label),
        quality_err = field_error(&errors.quality),
    )
}

fn job_row(job: &DownloadJob) -> String {
    let thumb = match &job.thumbnail {
        Some(src) => format!("<img src=\"{}\" alt=\"\" loading=\"lazy\">", escape_html(src)),
        None => "<img alt=\"\">".to_string(),
    };

    let mut meta = vec![job.format.label().to_string()];
    if !job.format.is_audio() {
        meta.push(job.quality.label().to_string());
    }
    if job.duration > 0 {
        meta.push(job.duration_formatted());
    }
    let size = job.file_size_formatted();
    if !size.is_empty() {
        meta.push(size);
    }
    meta.push(job.created_at.format("%Y-%m-%d %H:%M UTC").to_string());

    let error = match &job.error_message {
        Some(msg) if job.state == JobState::Failed => {
            format!("<div class=\"job-error\">{}</div>", escape_html(msg))
        }
        _ => String::new(),
    };

    let download = if job.file_available() {
        format!("<a class=\"btn btn-small\" href=\"/download/{}/\">Download</a>", job.id)
    } else {
        String::new()
    };

    format!(
        r#"<div class="job status-{state}" data-job-id="{id}" data-active="{active}">
{thumb}
<div class="job-body">
<div class="job-title">{title}</div>
<div class="job-meta">{meta}</div>
<div class="bar"><div class="bar-fill" style="width:{progress}%"></div></div>
<div class="job-meta"><span class="job-status">{label}</span> · <span class="job-progress">{progress}%</span></div>
{error}
</div>
<div class="job-actions">{download}
<form method="post" action="/delete/{id}/" class="delete-form"><button type="submit" class="btn btn-small btn-secondary">Delete</button></form>
</div>
</div>"#,
        state = job.state.as_str(),
        label = job.state.label(),
        id = job.id,
        active = !job.state.is_terminal(),
        title = escape_html(job.display_title()),
        meta = escape_html(&meta.join(" · ")),
        progress = job.progress,
    )
}

pub struct IndexView<'a> {
    pub form: &'a DownloadForm,
    pub errors: &'a FormErrors,
    pub jobs: &'a [DownloadJob],
    pub notice: Option<&'a str>,
    pub session_short: &'a str,
    pub retention: Duration,
}

pub fn index_page(view: &IndexView<'_>) -> String {
    let mut body = String::new();

    if let Some((class, text)) = view.notice.and_then(notice_text) {
        let _ = write!(body, "<div class=\"notice {class}\">{text}</div>");
    }
    if !view.errors.is_empty() {
        body.push_str("<div class=\"notice notice-error\">Please fix the errors below.</div>");
    }

    body.push_str("<section class=\"card\"><h1>Download a video</h1>");
    body.push_str(&download_form(view.form, view.errors));
    body.push_str("</section>");

    let _ = write!(
        body,
        "<section class=\"card\"><h2>Your downloads</h2><div class=\"job-meta\">Session {}</div>",
        escape_html(view.session_short)
    );
    if view.jobs.is_empty() {
        body.push_str("<p class=\"job-meta\">No downloads yet.</p>");
    }
    for job in view.jobs {
        body.push_str(&job_row(job));
    }
    let _ = write!(
        body,
        "<p class=\"job-meta\">Files are removed automatically after {}.</p></section>",
        retention_text(view.retention)
    );

    layout("Home", &body)
}

pub fn preview_page(meta: &VideoMetadata, form: &DownloadForm) -> String {
    let thumb = meta
        .thumbnail
        .as_deref()
        .map(|src| format!("<img src=\"{}\" alt=\"Thumbnail\">", escape_html(src)))
        .unwrap_or_default();

    let mut facts = vec![
        format!("By {}", escape_html(&meta.uploader)),
        format!("Duration {}", escape_html(&meta.duration_string)),
        format_view_count(meta.view_count),
    ];
    let date = meta.upload_date_display();
    if !date.is_empty() {
        facts.push(format!("Uploaded {}", escape_html(&date)));
    }
    if meta.age_limit > 0 {
        facts.push(format!("Age limit {}+", meta.age_limit));
    }
    if meta.is_live {
        facts.push("Live stream (cannot be downloaded)".to_string());
    }

    let body = format!(
        r#"<section class="card">
<div class="preview">
{thumb}
<div>
<h1>{title}</h1>
<div class="job-meta">{facts}</div>
<p><a href="{page}" rel="noopener noreferrer" target="_blank">Open on YouTube</a></p>
</div>
</div>
<div class="description">{description}</div>
</section>
<section class="card"><h2>Download</h2>{form}</section>"#,
        title = escape_html(&meta.title),
        facts = facts.join(" · "),
        page = escape_html(&meta.webpage_url),
        description = escape_html(&meta.description),
        form = download_form(form, &FormErrors::default()),
    );

    layout(&meta.title, &body)
}

pub fn error_page(title: &str, message: &str) -> String {
    let body = format!(
        r#"<section class="card">
<h1>{title}</h1>
<p>{message}</p>
<p><a class="btn" href="/">Back to downloads</a></p>
</section>"#,
        title = escape_html(title),
        message = escape_html(message),
    );
    layout(title, &body)
}

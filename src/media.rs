//! Audio download and tag stamping.
//!
//! Downloads run through the same bounded-pool shape as enrichment; tag
//! writing is blocking file I/O and runs on the blocking thread pool.
//! Every failure is scoped to its one file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, Tag, TagExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::Record;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("output directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Tag values stamped onto a downloaded file.
#[derive(Debug, Clone)]
struct TrackTags {
    title: Option<String>,
    artist: Option<String>,
    comment: Option<String>,
}

impl TrackTags {
    fn from_record(record: &Record) -> Self {
        Self {
            title: record.str_field("title").map(str::to_string),
            artist: record.str_field("artist").map(str::to_string),
            comment: record
                .str_field(crate::enrich::DESCRIPTION_FIELD)
                .map(str::to_string),
        }
    }
}

/// Download every record's audio file into `out_dir`, optionally stamping
/// tags. Existing files are left alone. Returns the number of files
/// written; per-record failures are logged and skipped.
pub async fn download_tracks(
    records: &[Record],
    out_dir: &Path,
    concurrency: usize,
    timeout: Duration,
    write_tags: bool,
) -> Result<usize, MediaError> {
    tokio::fs::create_dir_all(out_dir).await?;
    let client = reqwest::Client::builder()
        .user_agent(crate::fetch::USER_AGENT)
        .timeout(timeout)
        .build()?;
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let mut tasks = JoinSet::new();
    for record in records {
        let Some(url) = record.str_field("url") else {
            warn!(id = %record.id, "record has no audio URL, skipping");
            continue;
        };
        let target = out_dir.join(file_name(record, url));
        let url = url.to_string();
        let tags = write_tags.then(|| TrackTags::from_record(record));
        let client = client.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return false,
            };
            download_one(&client, &url, target, tags).await
        });
    }

    let mut written = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(err) => warn!(%err, "download task failed to run"),
        }
    }
    Ok(written)
}

async fn download_one(
    client: &reqwest::Client,
    url: &str,
    target: PathBuf,
    tags: Option<TrackTags>,
) -> bool {
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        debug!(target = %target.display(), "already downloaded");
        return false;
    }
    let bytes = match fetch_bytes(client, url).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(url, %err, "audio fetch failed");
            return false;
        }
    };
    if let Err(err) = tokio::fs::write(&target, &bytes).await {
        warn!(target = %target.display(), %err, "could not write audio file");
        return false;
    }
    info!(target = %target.display(), bytes = bytes.len(), "downloaded");

    if let Some(tags) = tags {
        let tag_target = target.clone();
        let stamped =
            tokio::task::spawn_blocking(move || stamp_tags(&tag_target, &tags)).await;
        match stamped {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(target = %target.display(), %err, "tag stamping failed"),
            Err(err) => warn!(%err, "tag task failed to run"),
        }
    }
    true
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let bytes = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())?
        .bytes()
        .await?;
    Ok(bytes.to_vec())
}

fn stamp_tags(path: &Path, tags: &TrackTags) -> Result<(), lofty::error::LoftyError> {
    let mut file = Probe::open(path)?.read()?;
    if file.primary_tag().is_none() {
        file.insert_tag(Tag::new(file.primary_tag_type()));
    }
    if let Some(tag) = file.primary_tag_mut() {
        if let Some(title) = &tags.title {
            tag.set_title(title.clone());
        }
        if let Some(artist) = &tags.artist {
            tag.set_artist(artist.clone());
        }
        if let Some(comment) = &tags.comment {
            tag.set_comment(comment.clone());
        }
        tag.save_to_path(path, WriteOptions::default())?;
    }
    Ok(())
}

/// `Artist - Title.ext`, falling back to the record id, with
/// filesystem-hostile characters stripped.
fn file_name(record: &Record, url: &str) -> String {
    let ext = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 4 && ext.chars().all(char::is_alphanumeric))
        .unwrap_or("m4a");
    let stem = match (record.str_field("artist"), record.str_field("title")) {
        (Some(artist), Some(title)) => format!("{artist} - {title}"),
        (None, Some(title)) => title.to_string(),
        _ => record.id.clone(),
    };
    format!("{}.{ext}", sanitize(&stem))
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn record(artist: Option<&str>, title: Option<&str>) -> Record {
        let mut record = Record::new("m1");
        if let Some(artist) = artist {
            record.fields.insert("artist".into(), Value::from(artist));
        }
        if let Some(title) = title {
            record.fields.insert("title".into(), Value::from(title));
        }
        record
    }

    #[test]
    fn test_file_name_from_fields() {
        let r = record(Some("wangus"), Some("Basalt Fields"));
        assert_eq!(
            file_name(&r, "https://x/music/w16.m4a"),
            "wangus - Basalt Fields.m4a"
        );
    }

    #[test]
    fn test_file_name_falls_back_to_id() {
        let r = record(None, None);
        assert_eq!(file_name(&r, "https://x/w16.mp3?sig=abc"), "m1.mp3");
    }

    #[test]
    fn test_file_name_sanitizes() {
        let r = record(Some("a/b"), Some("c: d?"));
        assert_eq!(file_name(&r, "https://x/w16.m4a"), "a b - c d.m4a");
    }

    #[test]
    fn test_unrecognized_extension_defaults() {
        let r = record(Some("a"), Some("b"));
        assert_eq!(file_name(&r, "https://x/stream/listen"), "a - b.m4a");
    }
}

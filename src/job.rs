use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use derive_builder::{Builder, UninitializedFieldError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    descriptor::{self, MediaDescriptor, Metadata},
    duration::parse_duration,
    error::OdmError,
    fetch::{AssetFetcher, AssetKind, RetrySettings},
    fs_utils::{capped_filename, cleanup_filename, extension_from_url},
    license::acquire_license,
    playlist::{PlaylistWriter, header_lines, image_block, track_block},
};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_WAIT_BETWEEN_RETRIES: Duration = Duration::from_millis(500);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Everything needed to turn one `.odm` file into an audiobook on disk
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate", error = "JobBuilderError"))]
pub struct Job {
    /// The descriptor to download
    #[builder(setter(into))]
    odm_path: PathBuf,
    /// Where files are written. See `make_output_dir`.
    #[builder(setter(into))]
    output_dir: PathBuf,
    /// Write into a subdirectory of `output_dir` named after the title
    #[builder(default = false)]
    make_output_dir: bool,
    /// Parse and log the descriptor, then stop without network or file writes
    #[builder(default = false)]
    dry_run: bool,
    /// Remove the descriptor once the book has been downloaded
    #[builder(default = true)]
    delete_source: bool,
    /// Retries for each asset request. The license request is never retried.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
    #[builder(default = DEFAULT_WAIT_BETWEEN_RETRIES)]
    wait_between_retries: Duration,
    #[builder(default = DEFAULT_MAX_WAIT)]
    max_wait: Duration,
    #[builder(default = None)]
    connect_timeout: Option<Duration>,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing was requested or written
    DryRun {
        descriptor: MediaDescriptor,
        metadata: Metadata,
    },
    Completed(RunReport),
}

/// Files written by a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub output_dir: PathBuf,
    pub playlist: Option<PathBuf>,
    pub cover: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
    pub parts: Vec<PathBuf>,
}

impl Job {
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn run(&self) -> Result<RunOutcome, OdmError> {
        let (descriptor, metadata) = descriptor::load(&self.odm_path).await?;

        if self.dry_run {
            info!(data = ?descriptor, "data");
            info!(metadata = ?metadata, "metadata");
            return Ok(RunOutcome::DryRun {
                descriptor,
                metadata,
            });
        }

        info!(
            title = metadata.title.as_str(),
            content_type = metadata.content_type.as_str(),
            "Downloading"
        );

        let client = self.http_client()?;
        let license = acquire_license(&client, &descriptor).await?;

        let format = descriptor.format()?;
        let protocol = format.protocol()?;
        info!(name = format.name.as_str(), "selecting format");

        let book_name = book_name(&descriptor, &metadata);
        let output_dir = self.prepare_output_dir(&book_name).await?;

        let mut playlist =
            PlaylistWriter::create(output_dir.join(capped_filename(&book_name, ".m3u"))).await;
        playlist.write(&header_lines(&metadata)).await;

        let fetcher = AssetFetcher::new(client, &license, self.retry_settings())?;

        let cover = fetch_image(
            &fetcher,
            AssetKind::Cover,
            &metadata.cover_url,
            &output_dir,
            &mut playlist,
        )
        .await;
        let thumbnail = fetch_image(
            &fetcher,
            AssetKind::Thumbnail,
            &metadata.thumbnail_url,
            &output_dir,
            &mut playlist,
        )
        .await;

        let mut parts = Vec::new();
        for part in format.ordered_parts() {
            let filename = capped_filename(
                &format!("{} - {}", book_name, cleanup_filename(&part.name)),
                ".mp3",
            );
            let destination = output_dir.join(&filename);
            info!(
                name = part.name.as_str(),
                number = part.number,
                file = %destination.display(),
                "downloading part..."
            );

            // parts are essential, so every failure ends the run
            if let Err(failure) = fetcher
                .fetch(AssetKind::Part, &protocol.part_url(part), &destination)
                .await
            {
                let e = failure.into_inner();
                error!(part = part.name.as_str(), "error downloading: {}", e);
                playlist.finish().await;
                return Err(e);
            }

            let seconds = parse_duration(&part.duration).unwrap_or_else(|e| {
                error!(
                    duration = part.duration.as_str(),
                    part = part.name.as_str(),
                    "unable to interpret duration: {}",
                    e
                );
                0
            });
            playlist
                .write(&track_block(seconds, &metadata.title, &part.name, &filename))
                .await;
            parts.push(destination);
        }

        let playlist = playlist.finish().await;

        if self.delete_source {
            if let Err(e) = tokio::fs::remove_file(&self.odm_path).await {
                warn!("Failed to remove {}: {}", self.odm_path.display(), e);
            }
        }

        Ok(RunOutcome::Completed(RunReport {
            output_dir,
            playlist,
            cover,
            thumbnail,
            parts,
        }))
    }

    fn http_client(&self) -> Result<reqwest::Client, OdmError> {
        let mut client = reqwest::Client::builder();
        if let Some(timeout) = self.connect_timeout {
            client = client.connect_timeout(timeout);
        }
        Ok(client.build()?)
    }

    fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_retries: self.max_retries,
            wait_between_retries: self.wait_between_retries,
            max_wait: self.max_wait,
        }
    }

    async fn prepare_output_dir(&self, book_name: &str) -> Result<PathBuf, OdmError> {
        if self.make_output_dir {
            let dir = self.output_dir.join(book_name);
            info!(directory = %dir.display(), "creating output directory");
            tokio::fs::create_dir_all(&dir).await?;
            Ok(dir)
        } else {
            info!(directory = %self.output_dir.display(), "output directory");
            Ok(self.output_dir.clone())
        }
    }
}

/// File name stem shared by the playlist, the parts and the output subdirectory
fn book_name(descriptor: &MediaDescriptor, metadata: &Metadata) -> String {
    [metadata.title.as_str(), descriptor.content_id.as_str()]
        .into_iter()
        .map(cleanup_filename)
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "audiobook".to_string())
}

/// Cover and thumbnail are optional; a failed download leaves them out of the playlist
async fn fetch_image(
    fetcher: &AssetFetcher,
    kind: AssetKind,
    url: &str,
    output_dir: &Path,
    playlist: &mut PlaylistWriter,
) -> Option<PathBuf> {
    if url.is_empty() {
        return None;
    }
    let stem = match kind {
        AssetKind::Thumbnail => "thumb",
        _ => "cover",
    };
    let filename = format!("{stem}{}", extension_from_url(url));
    let destination = output_dir.join(&filename);

    match fetcher.fetch(kind, url, &destination).await {
        Ok(_) => {
            playlist.write(&image_block(&kind.to_string(), &filename)).await;
            Some(destination)
        }
        Err(failure) => {
            warn!("error downloading {}: {}", kind, failure.into_inner());
            None
        }
    }
}

impl JobBuilder {
    fn validate(&self) -> Result<(), JobBuilderError> {
        if self.odm_path.is_none() {
            return Err(JobBuilderError::MissingOdmPath);
        }
        if self.output_dir.is_none() {
            return Err(JobBuilderError::MissingOutputDir);
        }
        let wait = self
            .wait_between_retries
            .unwrap_or(DEFAULT_WAIT_BETWEEN_RETRIES);
        let max_wait = self.max_wait.unwrap_or(DEFAULT_MAX_WAIT);
        if max_wait < wait {
            return Err(JobBuilderError::InvalidRetryWait { wait, max_wait });
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum JobBuilderError {
    #[error("odm_path is required")]
    MissingOdmPath,
    #[error("output_dir is required")]
    MissingOutputDir,
    #[error("max_wait ({max_wait:?}) must not be shorter than wait_between_retries ({wait:?})")]
    InvalidRetryWait { wait: Duration, max_wait: Duration },
    /// Uninitialized field
    #[error("uninitialized field: {0}")]
    UninitializedField(String),
    /// Custom validation error
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl From<String> for JobBuilderError {
    fn from(s: String) -> Self {
        Self::ValidationError(s)
    }
}

impl From<UninitializedFieldError> for JobBuilderError {
    fn from(ufe: UninitializedFieldError) -> Self {
        Self::UninitializedField(ufe.to_string())
    }
}

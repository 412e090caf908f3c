use std::{fmt, path::Path, time::Duration};

use futures::StreamExt;
use indicatif::ProgressStyle;
use reqwest::{
    StatusCode,
    header::{HeaderValue, USER_AGENT},
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{Instrument, Span, debug, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::{
    error::OdmError,
    license::{CLIENT_ID, License, USER_AGENT_VALUE},
    retry_policies::{CappedExponentialRetry, NonSuccessIsTransient},
};

/// What is being downloaded. Decides whether a failure ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Cover,
    Thumbnail,
    Part,
}

impl AssetKind {
    /// A book without its cover is still a book
    pub fn is_essential(&self) -> bool {
        matches!(self, AssetKind::Part)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetKind::Cover => "cover",
            AssetKind::Thumbnail => "thumbnail",
            AssetKind::Part => "part",
        })
    }
}

#[derive(Debug)]
pub enum AssetFailure {
    /// Log it and carry on without the asset
    Recoverable(OdmError),
    /// The run cannot continue
    Fatal(OdmError),
}

impl AssetFailure {
    fn for_kind(kind: AssetKind, error: OdmError) -> Self {
        if kind.is_essential() {
            AssetFailure::Fatal(error)
        } else {
            AssetFailure::Recoverable(error)
        }
    }

    pub fn into_inner(self) -> OdmError {
        match self {
            AssetFailure::Recoverable(e) | AssetFailure::Fatal(e) => e,
        }
    }
}

/// Retry settings for asset requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub wait_between_retries: Duration,
    pub max_wait: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait_between_retries: Duration::from_millis(500),
            max_wait: Duration::from_secs(30),
        }
    }
}

/// Downloads the assets of one book with the license acquired for it.
pub struct AssetFetcher {
    client: ClientWithMiddleware,
    license: HeaderValue,
}

impl AssetFetcher {
    pub fn new(
        client: reqwest::Client,
        license: &License,
        retry: RetrySettings,
    ) -> Result<Self, OdmError> {
        let retry_policy = CappedExponentialRetry {
            max_n_retries: retry.max_retries,
            base_wait: retry.wait_between_retries,
            max_wait: retry.max_wait,
        };
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                retry_policy,
                NonSuccessIsTransient,
            ))
            .build();
        Ok(Self {
            client,
            license: license.header_value()?,
        })
    }

    /// Downloads `url` into `destination`, replacing whatever is there.
    /// Returns the number of bytes written.
    pub async fn fetch(
        &self,
        kind: AssetKind,
        url: &str,
        destination: &Path,
    ) -> Result<u64, AssetFailure> {
        let span = info_span!("download", kind = %kind, file = %destination.display());
        self.download_file(url, destination)
            .instrument(span)
            .await
            .map_err(|e| AssetFailure::for_kind(kind, e))
    }

    async fn download_file(&self, url: &str, destination: &Path) -> Result<u64, OdmError> {
        let response = self
            .client
            .get(url)
            .header("ClientId", CLIENT_ID)
            .header("License", self.license.clone())
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(OdmError::Download {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let current_span = Span::current();
        if let Some(length) = response.content_length() {
            current_span.pb_set_style(&progress_style());
            current_span.pb_set_length(length);
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(destination)
            .await?;
        let mut file = BufWriter::new(file);
        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            current_span.pb_inc(chunk.len() as u64);
        }
        file.flush().await?;

        debug!(url, bytes = written, "download finished");
        Ok(written)
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{span_child_prefix}{span_fields} [{wide_bar}] {bytes}/{total_bytes} {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

//! Sheet API transport + durable color-state storage for Reliquery.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reliquery_core::{CohortColor, ColorState, Palette};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "reliquery-storage";

pub const DEFAULT_API_BASE: &str = "https://api.smartsheet.com/2.0";

/// Persists the color-assignment cursor between runs.
#[async_trait]
pub trait ColorStateStore: Send + Sync {
    /// Never fails: a missing or unreadable state is a fresh start.
    async fn load(&self) -> ColorState;

    async fn save(&self, state: &ColorState) -> anyhow::Result<()>;
}

/// Single-line text file holding `index,last_seen,max_seen`.
#[derive(Debug, Clone)]
pub struct FileColorStateStore {
    path: PathBuf,
}

impl FileColorStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ColorStateStore for FileColorStateStore {
    async fn load(&self) -> ColorState {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no color state yet; starting fresh");
                return ColorState::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unreadable color state; starting fresh");
                return ColorState::default();
            }
        };
        ColorState::parse(&text).unwrap_or_else(|| {
            warn!(path = %self.path.display(), "malformed color state; starting fresh");
            ColorState::default()
        })
    }

    /// Writes to a temp file next to the target, then renames over it.
    async fn save(&self, state: &ColorState) -> anyhow::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating color state directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.color.tmp", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp color state file {}", temp_path.display()))?;
        let written = async {
            file.write_all(state.encode().as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err)
                .with_context(|| format!("writing temp color state file {}", temp_path.display()));
        }

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming color state {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            });
        }
        Ok(())
    }
}

/// Non-durable store, mainly for tests.
#[derive(Debug, Default)]
pub struct InMemoryColorStateStore {
    state: Mutex<ColorState>,
}

impl InMemoryColorStateStore {
    pub fn new(state: ColorState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl ColorStateStore for InMemoryColorStateStore {
    async fn load(&self) -> ColorState {
        self.state.lock().await.clone()
    }

    async fn save(&self, state: &ColorState) -> anyhow::Result<()> {
        *self.state.lock().await = state.clone();
        Ok(())
    }
}

/// Hands out a palette color for each newly created derived row.
#[derive(Clone)]
pub struct ColorAssigner {
    store: Arc<dyn ColorStateStore>,
    palette: Palette,
}

impl ColorAssigner {
    pub fn new(store: Arc<dyn ColorStateStore>, palette: Palette) -> Self {
        Self { store, palette }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Loads the cursor, applies the decision for `hire_date`, persists it, and
    /// returns the chosen color. Order-dependent: every call is a durable step.
    pub async fn decide_color(&self, hire_date: NaiveDate) -> anyhow::Result<CohortColor> {
        let mut state = self.store.load().await;
        let index = state.observe(hire_date, self.palette.colors().len());
        self.store
            .save(&state)
            .await
            .with_context(|| format!("persisting color decision for {hire_date}"))?;
        let color = self.palette.color_at(index);
        debug!(%hire_date, index, %color, "assigned cohort color");
        Ok(color)
    }

    pub async fn current(&self) -> ColorState {
        self.store.load().await
    }

    pub async fn reset(&self) -> anyhow::Result<()> {
        self.store.save(&ColorState::default()).await
    }
}

#[derive(Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for HttpClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &REDACTED)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Bearer-authenticated JSON client for the sheet API. One attempt per call.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &REDACTED)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let (url, body) = self.execute::<()>(Method::GET, path, query, None).await?;
        serde_json::from_slice(&body).map_err(|source| TransportError::Decode { url, source })
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), TransportError> {
        self.execute(Method::POST, path, &[], Some(body)).await.map(|_| ())
    }

    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), TransportError> {
        self.execute(Method::PUT, path, &[], Some(body)).await.map(|_| ())
    }

    pub async fn delete(&self, path: &str, query: &[(&str, String)]) -> Result<(), TransportError> {
        self.execute::<()>(Method::DELETE, path, query, None)
            .await
            .map(|_| ())
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<(String, Vec<u8>), TransportError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let span = tracing::info_span!("sheet_http", method = %method, url = %url);

        async {
            let mut request = self
                .client
                .request(method, &url)
                .bearer_auth(&self.api_key)
                .header(reqwest::header::ACCEPT, "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let resp = request.send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            debug!(status = status.as_u16(), "sheet api responded");

            if !status.is_success() {
                return Err(TransportError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }
            let bytes = resp.bytes().await?.to_vec();
            Ok((final_url, bytes))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(s: &str) -> NaiveDate {
        reliquery_core::parse_hire_date(s).expect("date")
    }

    #[tokio::test]
    async fn missing_state_file_is_a_fresh_start() {
        let dir = tempdir().expect("tempdir");
        let store = FileColorStateStore::new(dir.path().join(".color_data.txt"));
        assert_eq!(store.path(), dir.path().join(".color_data.txt"));
        assert_eq!(store.load().await, ColorState::default());
    }

    #[tokio::test]
    async fn malformed_state_file_is_a_fresh_start() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(".color_data.txt");
        std::fs::write(&path, "garbage").expect("write");
        let store = FileColorStateStore::new(&path);
        assert_eq!(store.load().await, ColorState::default());
    }

    #[tokio::test]
    async fn saved_state_survives_a_new_store_instance() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(".color_data.txt");
        let state = ColorState {
            color_index: 2,
            last_seen_hire_date: Some(day("2099-01-01")),
            max_hire_date_seen: Some(day("2099-02-01")),
        };
        FileColorStateStore::new(&path).save(&state).await.expect("save");

        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "2,2099-01-01,2099-02-01"
        );
        assert_eq!(FileColorStateStore::new(&path).load().await, state);

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().expect("parent"))
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn decide_color_cycles_by_cohort_change() {
        let assigner = ColorAssigner::new(
            Arc::new(InMemoryColorStateStore::default()),
            Palette::default(),
        );
        let d1 = day("2099-01-01");
        let d2 = day("2099-02-01");
        let mut colors = Vec::new();
        for date in [d1, d1, d2, d1] {
            colors.push(assigner.decide_color(date).await.expect("decide"));
        }
        let palette = Palette::default();
        assert_eq!(
            colors,
            vec![
                palette.color_at(1),
                palette.color_at(1),
                palette.color_at(2),
                palette.color_at(0)
            ]
        );
        let state = assigner.current().await;
        assert_eq!(state.color_index, 0);
        assert_eq!(state.max_hire_date_seen, Some(d2));
    }

    #[tokio::test]
    async fn decide_color_is_durable_across_assigners() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(".color_data.txt");
        let d1 = day("2099-01-01");

        let first = ColorAssigner::new(Arc::new(FileColorStateStore::new(&path)), Palette::default());
        assert_eq!(first.decide_color(d1).await.expect("decide"), CohortColor(8));

        let second = ColorAssigner::new(Arc::new(FileColorStateStore::new(&path)), Palette::default());
        assert_eq!(second.decide_color(d1).await.expect("decide"), CohortColor(8));
        assert_eq!(
            second.decide_color(day("2099-01-02")).await.expect("decide"),
            CohortColor(9)
        );

        second.reset().await.expect("reset");
        assert_eq!(first.current().await, ColorState::default());
    }

    #[test]
    fn debug_output_never_shows_the_api_key() {
        let config = HttpClientConfig {
            api_key: "sk-live-123".to_string(),
            ..Default::default()
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("sk-live-123"), "{shown}");
        assert!(shown.contains("<redacted>"));

        let client = ApiClient::new(config).expect("client");
        let shown = format!("{client:?}");
        assert!(!shown.contains("sk-live-123"), "{shown}");
        assert!(shown.contains("api.smartsheet.com"));
    }

    #[test]
    fn api_client_trims_trailing_slash() {
        let client = ApiClient::new(HttpClientConfig {
            base_url: "https://example.invalid/2.0/".to_string(),
            ..Default::default()
        })
        .expect("client");
        assert_eq!(client.base_url(), "https://example.invalid/2.0");
    }
}

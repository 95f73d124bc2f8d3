// src/fetch/hub.rs

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument};
use url::Url;

use super::DatasetSource;

/// Subset of the dataset-info response we care about.
#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

/// Pull the file list out of a `GET /api/datasets/{repo}/revision/{rev}` body.
pub fn parse_file_listing(body: &str) -> Result<Vec<String>> {
    let info: RepoInfo = serde_json::from_str(body).context("decoding repository info")?;
    Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
}

/// A dataset repository on a Hugging Face compatible hub.
pub struct HubSource {
    client: Client,
    endpoint: Url,
    repo_id: String,
    revision: String,
    token: Option<String>,
    cache_dir: PathBuf,
}

impl HubSource {
    pub fn new(
        endpoint: &str,
        repo_id: impl Into<String>,
        revision: impl Into<String>,
        token: Option<String>,
        cache_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("parsing endpoint {}", endpoint))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("merprep/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            repo_id: repo_id.into(),
            revision: revision.into(),
            token,
            cache_dir: cache_dir.into(),
        })
    }

    /// Endpoint path followed by `segments`, each percent-encoded on its own.
    fn url_with(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("endpoint {} cannot carry a path", self.endpoint))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_segments(&self) -> Result<Vec<&str>> {
        relative_segments(&self.repo_id).context("invalid repo_id")
    }

    pub fn listing_url(&self) -> Result<Url> {
        let mut segments = vec!["api", "datasets"];
        segments.extend(self.repo_segments()?);
        segments.extend(["revision", self.revision.as_str()]);
        self.url_with(&segments)
    }

    pub fn file_url(&self, file: &str) -> Result<Url> {
        let mut segments = vec!["datasets"];
        segments.extend(self.repo_segments()?);
        segments.extend(["resolve", self.revision.as_str()]);
        segments.extend(relative_segments(file)?);
        self.url_with(&segments)
    }

    /// `<cache>/datasets--<owner>--<name>/<revision>/<file>`
    pub fn cache_path(&self, file: &str) -> Result<PathBuf> {
        let mut path = self
            .cache_dir
            .join(format!("datasets--{}", self.repo_segments()?.join("--")));
        path.extend(relative_segments(&self.revision).context("invalid revision")?);
        path.extend(relative_segments(file)?);
        Ok(path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn get_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        debug!(%url, "GET");
        let bytes = self
            .authorized(self.client.get(url.clone()))
            .send()
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", url))?
            .bytes()
            .with_context(|| format!("reading body from {}", url))?;
        Ok(bytes.to_vec())
    }
}

/// Split a repository-relative path on `/`, refusing anything that could
/// step outside the cache directory.
fn relative_segments(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        bail!("unsafe repository path `{}`", path);
    }
    Ok(segments)
}

impl DatasetSource for HubSource {
    fn describe(&self) -> String {
        format!("{}@{} ({})", self.repo_id, self.revision, self.endpoint)
    }

    #[instrument(level = "info", skip(self), fields(repo = %self.repo_id))]
    fn list_files(&self) -> Result<Vec<String>> {
        let url = self.listing_url()?;
        let body = self.get_bytes(&url)?;
        let body = String::from_utf8(body).context("listing response is not UTF-8")?;
        parse_file_listing(&body)
    }

    #[instrument(level = "info", skip(self), fields(repo = %self.repo_id))]
    fn fetch(&self, file: &str) -> Result<PathBuf> {
        let dest = self.cache_path(file)?;
        if dest.is_file() {
            debug!(path = %dest.display(), "cache hit");
            return Ok(dest);
        }

        let url = self.file_url(file)?;
        let start = Instant::now();
        let bytes = self.get_bytes(&url)?;
        write_atomically(&dest, &bytes)?;
        info!(
            file,
            bytes = bytes.len(),
            elapsed = ?start.elapsed(),
            "downloaded"
        );
        Ok(dest)
    }
}

/// Write next to `dest` then rename, so a cut-off download never looks cached.
fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    fs::write(&partial, bytes).with_context(|| format!("writing {:?}", partial))?;
    fs::rename(&partial, dest).with_context(|| format!("moving {:?} into place", dest))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };
    use tempfile::tempdir;

    fn source(endpoint: &str, cache: &Path) -> Result<HubSource> {
        HubSource::new(
            endpoint,
            "MERChallenge/MER2025",
            "main",
            None,
            cache,
            Duration::from_secs(2),
        )
    }

    #[test]
    fn builds_listing_and_download_urls() -> Result<()> {
        let dir = tempdir()?;
        let hub = source("https://huggingface.co/", dir.path())?;
        assert_eq!(
            hub.listing_url()?.as_str(),
            "https://huggingface.co/api/datasets/MERChallenge/MER2025/revision/main"
        );
        assert_eq!(
            hub.file_url("track2_train_ovmerd.csv")?.as_str(),
            "https://huggingface.co/datasets/MERChallenge/MER2025/resolve/main/track2_train_ovmerd.csv"
        );
        Ok(())
    }

    #[test]
    fn endpoint_with_path_prefix_is_kept() -> Result<()> {
        let dir = tempdir()?;
        let hub = source("http://mirror.local/hf", dir.path())?;
        assert_eq!(
            hub.file_url("a.csv")?.as_str(),
            "http://mirror.local/hf/datasets/MERChallenge/MER2025/resolve/main/a.csv"
        );
        Ok(())
    }

    #[test]
    fn parses_sibling_listing() -> Result<()> {
        let body = r#"{"id":"MERChallenge/MER2025","siblings":[
            {"rfilename":".gitattributes"},
            {"rfilename":"subtitle_chieng.csv"},
            {"rfilename":"track2_train_ovmerd.csv"}
        ]}"#;
        assert_eq!(
            parse_file_listing(body)?,
            vec![".gitattributes", "subtitle_chieng.csv", "track2_train_ovmerd.csv"]
        );
        assert!(parse_file_listing("<html>").is_err());
        Ok(())
    }

    #[test]
    fn path_segments_are_escaped_and_confined() -> Result<()> {
        let dir = tempdir()?;
        let mut hub = source("https://huggingface.co", dir.path())?;
        assert_eq!(
            hub.file_url("extra/a#b?.csv")?.as_str(),
            "https://huggingface.co/datasets/MERChallenge/MER2025/resolve/main/extra/a%23b%3F.csv"
        );
        assert!(hub.file_url("../secrets.csv").is_err());
        assert!(hub.cache_path("../../etc/passwd").is_err());
        assert!(hub.cache_path("a//b.csv").is_err());
        assert_eq!(
            hub.cache_path("extra/a.csv")?,
            dir.path()
                .join("datasets--MERChallenge--MER2025")
                .join("main")
                .join("extra")
                .join("a.csv")
        );

        hub.revision = "refs/convert/parquet".into();
        assert_eq!(
            hub.listing_url()?.as_str(),
            "https://huggingface.co/api/datasets/MERChallenge/MER2025/revision/refs%2Fconvert%2Fparquet"
        );
        Ok(())
    }

    /// Answer one request per canned response on a loopback port and hand
    /// back the raw request heads in arrival order.
    fn serve(
        responses: Vec<(&'static str, Vec<u8>)>,
    ) -> std::io::Result<(String, thread::JoinHandle<std::io::Result<Vec<String>>>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let endpoint = format!("http://{}", listener.local_addr()?);
        let handle = thread::spawn(move || {
            let mut heads = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept()?;
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&chunk[..n]);
                }
                heads.push(String::from_utf8_lossy(&head).into_owned());
                write!(
                    stream,
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                )?;
                stream.write_all(&body)?;
                stream.flush()?;
            }
            Ok(heads)
        });
        Ok((endpoint, handle))
    }

    #[test]
    fn downloads_into_cache_with_bearer_token() -> Result<()> {
        let dir = tempdir()?;
        let listing = br#"{"siblings":[{"rfilename":"track2_train_ovmerd.csv"}]}"#.to_vec();
        let (endpoint, server) = serve(vec![
            ("200 OK", b"name,openset\nv1,happy\n".to_vec()),
            ("200 OK", listing),
            ("404 Not Found", b"missing".to_vec()),
        ])?;
        let hub = HubSource::new(
            &endpoint,
            "MERChallenge/MER2025",
            "main",
            Some("hf_secret".into()),
            dir.path(),
            Duration::from_secs(5),
        )?;

        let path = hub.fetch("track2_train_ovmerd.csv")?;
        assert_eq!(path, hub.cache_path("track2_train_ovmerd.csv")?);
        assert_eq!(fs::read_to_string(&path)?, "name,openset\nv1,happy\n");
        let partial = PathBuf::from(format!("{}.part", path.display()));
        assert!(!partial.exists());

        // second fetch is a cache hit, so the next request the server sees is the listing
        assert_eq!(hub.fetch("track2_train_ovmerd.csv")?, path);
        assert_eq!(hub.list_files()?, vec!["track2_train_ovmerd.csv"]);

        assert!(hub.fetch("absent.csv").is_err());
        assert!(!hub.cache_path("absent.csv")?.exists());

        let heads = server.join().expect("server thread panicked")?;
        assert_eq!(heads.len(), 3);
        assert!(heads[0]
            .starts_with("GET /datasets/MERChallenge/MER2025/resolve/main/track2_train_ovmerd.csv HTTP/1.1"));
        assert!(heads[1].starts_with("GET /api/datasets/MERChallenge/MER2025/revision/main HTTP/1.1"));
        for head in &heads {
            assert!(head
                .to_ascii_lowercase()
                .contains("authorization: bearer hf_secret"));
        }
        Ok(())
    }

    #[test]
    fn cached_file_is_served_without_network() -> Result<()> {
        let dir = tempdir()?;
        // nothing listens on port 9 of loopback
        let hub = source("http://127.0.0.1:9", dir.path())?;
        let cached = hub.cache_path("track2_train_ovmerd.csv")?;
        fs::create_dir_all(cached.parent().unwrap())?;
        fs::write(&cached, "name\nv1\n")?;

        assert_eq!(hub.fetch("track2_train_ovmerd.csv")?, cached);
        assert!(hub.fetch("missing.csv").is_err());
        assert!(hub.list_files().is_err());
        Ok(())
    }
}

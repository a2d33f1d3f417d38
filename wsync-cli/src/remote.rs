//! Remote selection and the bundled HTTP client.
//!
//! ```text
//! GET    {base}/api/w/{ws}/sync/export          -> {"files": {path: text}}
//! POST   {base}/api/w/{ws}/sync/{kind}/{path}   <- {"files": {...}}
//! PUT    {base}/api/w/{ws}/sync/{kind}/{path}   <- {"files": {...}}
//! DELETE {base}/api/w/{ws}/sync/{kind}/{path}
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wsync_core::{EntityKind, EntityPath};
use wsync_sync::{DirRemote, RemoteError, RemoteWorkspace};
use wsync_tree::FileMap;

use crate::commands::RemoteArgs;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the remote named by the CLI flags.
pub fn connect(args: &RemoteArgs) -> Result<Arc<dyn RemoteWorkspace>> {
    let base = args
        .base_url
        .as_deref()
        .context("no remote configured: pass --base-url or set WSYNC_BASE_URL")?;

    if let Some(dir) = base.strip_prefix("file://") {
        if dir.is_empty() {
            bail!("file:// URL needs a directory");
        }
        return Ok(Arc::new(DirRemote::new(dir)));
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        bail!("unsupported remote URL '{base}': expected http(s):// or file://");
    }
    let workspace = args
        .workspace
        .as_deref()
        .context("no workspace: pass --workspace or set WSYNC_WORKSPACE")?;
    if args.token.is_none() {
        tracing::warn!("no token configured, calling the remote anonymously");
    }
    Ok(Arc::new(HttpRemote::new(base, workspace, args.token.clone())))
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct FilesBody {
    files: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct HttpRemote {
    agent: ureq::Agent,
    base: String,
    workspace: String,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: &str, workspace: &str, token: Option<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base: base_url.trim_end_matches('/').to_string(),
            workspace: workspace.to_string(),
            token,
        }
    }

    fn export_url(&self) -> String {
        format!("{}/api/w/{}/sync/export", self.base, self.workspace)
    }

    fn entity_url(&self, kind: EntityKind, path: &EntityPath) -> String {
        format!(
            "{}/api/w/{}/sync/{}/{}",
            self.base,
            self.workspace,
            kind.as_str(),
            path
        )
    }

    /// Run one request on the blocking pool and return the response body.
    async fn send(
        &self,
        method: &'static str,
        url: String,
        body: Option<serde_json::Value>,
    ) -> Result<String, RemoteError> {
        let mut request = self.agent.request(method, &url);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        tracing::debug!(method, url = %url, "remote request");
        tokio::task::spawn_blocking(move || {
            let response = match body {
                Some(json) => request.send_json(json),
                None => request.call(),
            }
            .map_err(classify)?;
            response
                .into_string()
                .map_err(|e| RemoteError::Transient(format!("reading response: {e}")))
        })
        .await
        .map_err(|e| RemoteError::Transient(format!("task failed: {e}")))?
    }
}

#[async_trait]
impl RemoteWorkspace for HttpRemote {
    fn label(&self) -> String {
        format!("{}/w/{}", self.base, self.workspace)
    }

    async fn export(&self) -> Result<FileMap, RemoteError> {
        let text = self.send("GET", self.export_url(), None).await?;
        decode_files(&text)
    }

    async fn create_entity(
        &self,
        kind: EntityKind,
        path: &EntityPath,
        files: &FileMap,
    ) -> Result<(), RemoteError> {
        let body = encode_files(files)?;
        self.send("POST", self.entity_url(kind, path), Some(body)).await?;
        Ok(())
    }

    async fn update_entity(
        &self,
        kind: EntityKind,
        path: &EntityPath,
        files: &FileMap,
    ) -> Result<(), RemoteError> {
        let body = encode_files(files)?;
        self.send("PUT", self.entity_url(kind, path), Some(body)).await?;
        Ok(())
    }

    async fn delete_entity(&self, kind: EntityKind, path: &EntityPath) -> Result<(), RemoteError> {
        self.send("DELETE", self.entity_url(kind, path), None).await?;
        Ok(())
    }
}

fn classify(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response.into_string().unwrap_or_default();
            RemoteError::from_status(status, message)
        }
        ureq::Error::Transport(transport) => RemoteError::Transient(transport.to_string()),
    }
}

fn decode_files(text: &str) -> Result<FileMap, RemoteError> {
    let body: FilesBody = serde_json::from_str(text)
        .map_err(|e| RemoteError::InvalidResponse(format!("export body: {e}")))?;
    Ok(body
        .files
        .into_iter()
        .map(|(path, content)| (path, content.into_bytes()))
        .collect())
}

/// The contract carries text only; binary files are refused before sending.
fn encode_files(files: &FileMap) -> Result<serde_json::Value, RemoteError> {
    let mut out = BTreeMap::new();
    for (path, content) in files {
        let text = std::str::from_utf8(content).map_err(|_| RemoteError::Rejected {
            status: 415,
            message: format!("{path} is not UTF-8 text"),
        })?;
        out.insert(path.clone(), text.to_string());
    }
    serde_json::to_value(FilesBody { files: out })
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(base: Option<&str>, workspace: Option<&str>) -> RemoteArgs {
        RemoteArgs {
            base_url: base.map(str::to_string),
            workspace: workspace.map(str::to_string),
            token: None,
        }
    }

    #[test]
    fn urls_follow_the_contract() {
        let remote = HttpRemote::new("https://sync.example.com/", "acme", None);
        assert_eq!(
            remote.export_url(),
            "https://sync.example.com/api/w/acme/sync/export"
        );
        assert_eq!(
            remote.entity_url(EntityKind::RawApp, &EntityPath::from("f/dash")),
            "https://sync.example.com/api/w/acme/sync/raw_app/f/dash"
        );
    }

    #[test]
    fn status_errors_are_classified() {
        let denied = ureq::Response::new(401, "Unauthorized", "token expired").expect("response");
        assert!(classify(ureq::Error::Status(401, denied)).is_fatal());

        let down = ureq::Response::new(503, "Service Unavailable", "").expect("response");
        assert!(classify(ureq::Error::Status(503, down)).is_transient());

        let bad = ureq::Response::new(422, "Unprocessable Entity", "missing value")
            .expect("response");
        assert_eq!(
            classify(ureq::Error::Status(422, bad)),
            RemoteError::Rejected {
                status: 422,
                message: "missing value".to_string()
            }
        );
    }

    #[test]
    fn export_body_decodes_to_files() {
        let files = decode_files(r#"{"files": {"f/a.variable.yaml": "value: 1\n"}}"#)
            .expect("decode");
        assert_eq!(files["f/a.variable.yaml"], b"value: 1\n");
        assert!(matches!(
            decode_files("<html>"),
            Err(RemoteError::InvalidResponse(_))
        ));
    }

    #[test]
    fn binary_files_are_refused() {
        let files: FileMap = [("f/logo.png".to_string(), vec![0xff, 0x00])].into();
        assert!(matches!(
            encode_files(&files),
            Err(RemoteError::Rejected { status: 415, .. })
        ));
    }

    #[test]
    fn remote_selection() {
        let dir = connect(&args(Some("file:///srv/ws"), None)).expect("connect");
        assert_eq!(dir.label(), "file:///srv/ws");

        let http = connect(&args(Some("https://sync.example.com"), Some("acme"))).expect("connect");
        assert_eq!(http.label(), "https://sync.example.com/w/acme");

        assert!(connect(&args(None, None)).is_err());
        assert!(connect(&args(Some("https://sync.example.com"), None)).is_err());
        assert!(connect(&args(Some("ftp://host"), Some("acme"))).is_err());
    }
}

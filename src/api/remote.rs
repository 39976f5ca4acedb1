//! Purpose: Provide an HTTP client for the talabarteria v1 document protocol.
//! Exports: `RemoteClient`.
//! Role: Product repository that mirrors `LocalClient` against a `serve` instance.
//! Invariants: Request/response envelopes match the routes in `serve.rs`.
//! Invariants: Transport failures and 5xx responses surface as `StoreUnavailable`.
#![allow(clippy::result_large_err)]

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::store::{ApiResult, ProductStore};
use crate::core::collection::validate_collection_name;
use crate::core::draft::ValidatedProduct;
use crate::core::error::{Error, ErrorKind};
use crate::core::product::{COLLECTION, Product};

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    base_url: Url,
    collection: String,
    token: Option<String>,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct DocumentsEnvelope {
    documents: Vec<RemoteDocument>,
}

#[derive(Deserialize)]
struct DocumentEnvelope {
    document: RemoteDocument,
}

#[derive(Deserialize)]
struct RemoteDocument {
    id: String,
    #[serde(default)]
    data: Map<String, Value>,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    data: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: Option<String>,
    hint: Option<String>,
    id: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(RemoteClientInner {
                base_url,
                collection: COLLECTION.to_string(),
                token: None,
                agent,
            }),
        })
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        let token = Some(token.into());
        self.rebuild(|inner| inner.token = token)
    }

    pub fn with_collection(self, collection: impl Into<String>) -> ApiResult<Self> {
        let collection = collection.into();
        validate_collection_name(&collection)?;
        Ok(self.rebuild(|inner| inner.collection = collection))
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn rebuild(mut self, apply: impl FnOnce(&mut RemoteClientInner)) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            apply(inner);
            return self;
        }
        let mut inner = RemoteClientInner {
            base_url: self.inner.base_url.clone(),
            collection: self.inner.collection.clone(),
            token: self.inner.token.clone(),
            agent: self.inner.agent.clone(),
        };
        apply(&mut inner);
        self.inner = Arc::new(inner);
        self
    }

    fn documents_url(&self) -> ApiResult<Url> {
        build_url(
            &self.inner.base_url,
            &["v1", "collections", &self.inner.collection, "documents"],
        )
    }

    fn document_url(&self, id: &str) -> ApiResult<Url> {
        build_url(
            &self.inner.base_url,
            &["v1", "collections", &self.inner.collection, "documents", id],
        )
    }

    fn request_json<T, R>(&self, method: &str, url: &Url, body: Option<&T>) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let mut request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        let response = match body {
            None => request.call(),
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::StoreUnavailable)
                .with_message("request failed")
                .with_hint("Check that the server is running and reachable, then retry.")
                .with_source(err)),
        }
    }
}

impl ProductStore for RemoteClient {
    fn list_products(&self) -> ApiResult<Vec<Product>> {
        let url = self.documents_url()?;
        let envelope: DocumentsEnvelope = self.request_json::<(), _>("GET", &url, None)?;
        tracing::debug!(count = envelope.documents.len(), "listed remote products");
        Ok(envelope
            .documents
            .into_iter()
            .map(|document| Product::from_document(document.id, &document.data))
            .collect())
    }

    fn get_product(&self, id: &str) -> ApiResult<Product> {
        let url = self.document_url(id)?;
        let envelope: DocumentEnvelope = self
            .request_json::<(), _>("GET", &url, None)
            .map_err(|err| with_id(err, id))?;
        Ok(Product::from_document(
            envelope.document.id,
            &envelope.document.data,
        ))
    }

    fn create_product(&self, product: &ValidatedProduct) -> ApiResult<String> {
        let url = self.documents_url()?;
        let data = product.to_document();
        let envelope: DocumentEnvelope =
            self.request_json("POST", &url, Some(&WriteRequest { data: &data }))?;
        tracing::debug!(id = %envelope.document.id, "created remote product");
        Ok(envelope.document.id)
    }

    fn update_product(&self, id: &str, product: &ValidatedProduct) -> ApiResult<()> {
        let url = self.document_url(id)?;
        let data = product.to_document();
        let _envelope: DocumentEnvelope = self
            .request_json("PUT", &url, Some(&WriteRequest { data: &data }))
            .map_err(|err| with_id(err, id))?;
        Ok(())
    }

    fn delete_product(&self, id: &str) -> ApiResult<()> {
        let url = self.document_url(id)?;
        let _value: Value = self
            .request_json::<(), _>("DELETE", &url, None)
            .map_err(|err| with_id(err, id))?;
        Ok(())
    }
}

fn with_id(err: Error, id: &str) -> Error {
    if err.id().is_some() {
        err
    } else {
        err.with_id(id)
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid remote base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("remote base url must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Usage).with_message("remote base url must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("remote base url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::StoreUnavailable)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return error_from_remote(envelope.error);
    }
    let kind = error_kind_from_status(status);
    Error::new(kind).with_message(format!("remote error status {status}"))
}

fn error_from_remote(remote: RemoteError) -> Error {
    let mut err = Error::new(parse_error_kind(&remote.kind));
    if let Some(message) = remote.message {
        err = err.with_message(message);
    }
    if let Some(hint) = remote.hint {
        err = err.with_hint(hint);
    }
    if let Some(id) = remote.id {
        err = err.with_id(id);
    }
    err
}

fn parse_error_kind(kind: &str) -> ErrorKind {
    match kind {
        "Internal" => ErrorKind::Internal,
        "Usage" => ErrorKind::Usage,
        "NotFound" => ErrorKind::NotFound,
        "Validation" => ErrorKind::Validation,
        "ImageRequired" => ErrorKind::ImageRequired,
        "StoreUnavailable" => ErrorKind::StoreUnavailable,
        "Permission" => ErrorKind::Permission,
        "Corrupt" => ErrorKind::Corrupt,
        _ => ErrorKind::Internal,
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        500..=599 => ErrorKind::StoreUnavailable,
        _ => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        RemoteClient, build_url, error_kind_from_status, normalize_base_url, parse_error_kind,
    };
    use crate::api::ProductStore;
    use crate::core::error::ErrorKind;

    #[test]
    fn normalize_base_url_strips_trailing_slash_only() {
        let url = normalize_base_url("http://localhost:9800".to_string()).expect("url");
        assert_eq!(url.as_str(), "http://localhost:9800/");
        let err = normalize_base_url("http://localhost:9800/api".to_string()).expect_err("path");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = normalize_base_url("ftp://localhost".to_string()).expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn build_url_escapes_segments() {
        let base = normalize_base_url("http://localhost:9800".to_string()).expect("url");
        let url = build_url(&base, &["v1", "collections", "productos", "documents", "a b"])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:9800/v1/collections/productos/documents/a%20b"
        );
    }

    #[test]
    fn parse_error_kind_maps_known_values() {
        assert_eq!(parse_error_kind("NotFound"), ErrorKind::NotFound);
        assert_eq!(parse_error_kind("StoreUnavailable"), ErrorKind::StoreUnavailable);
        assert_eq!(parse_error_kind("Validation"), ErrorKind::Validation);
        assert_eq!(parse_error_kind("Mystery"), ErrorKind::Internal);
    }

    #[test]
    fn server_failures_are_store_unavailable() {
        assert_eq!(error_kind_from_status(503), ErrorKind::StoreUnavailable);
        assert_eq!(error_kind_from_status(404), ErrorKind::NotFound);
        assert_eq!(error_kind_from_status(401), ErrorKind::Permission);
    }

    #[test]
    fn unreachable_server_is_store_unavailable() {
        // Port 9 (discard) is closed on loopback in test environments.
        let client = RemoteClient::new("http://127.0.0.1:9").expect("client");
        let err = client.list_products().expect_err("unreachable");
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[test]
    fn remote_client_rejects_bad_collection() {
        let client = RemoteClient::new("http://localhost:9800").expect("client");
        let err = client
            .with_collection("a/b")
            .err()
            .expect("bad collection");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}

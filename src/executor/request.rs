//! Outbound request description and builder
//!
//! A [`Request`] describes one network operation: target path, method,
//! optional body, header overrides, and the per-call knobs (timeout,
//! retries, progress reporting). It is immutable once dispatched and owned
//! exclusively by the call that issued it.

use crate::error::{Error, Result};
use crate::progress::ProgressSender;
use std::collections::HashMap;
use std::time::Duration;

/// One outbound request/response operation
#[derive(Debug)]
pub struct Request {
    pub(crate) method: reqwest::Method,
    pub(crate) path: String,
    pub(crate) body: RequestBody,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retries: Option<u32>,
    pub(crate) progress: Option<ProgressSender>,
}

impl Request {
    fn new(method: reqwest::Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::None,
            headers: HashMap::new(),
            timeout: None,
            retries: None,
            progress: None,
        }
    }

    /// GET the given path (resolved against the configured base URL)
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::GET, path)
    }

    /// POST to the given path
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::POST, path)
    }

    /// PUT to the given path
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::PUT, path)
    }

    /// DELETE the given path
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Attach a multipart body
    ///
    /// The Content-Type header (including the multipart boundary) is left
    /// to the transport; explicit Content-Type overrides are ignored for
    /// multipart requests.
    pub fn multipart(mut self, spec: MultipartSpec) -> Self {
        self.body = RequestBody::Multipart(spec);
        self
    }

    /// Override or add a header for this call
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the per-call timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the retry count for this call
    ///
    /// `0` means attempt once with no retry. Callers issuing non-idempotent
    /// requests should set this explicitly; the executor does not inspect
    /// the HTTP method to suppress retries.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Attach a progress reporter for the response body
    ///
    /// Percentages are reported after each received chunk when the
    /// response carries a Content-Length; without one, reporting is
    /// silently disabled.
    pub fn progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub(crate) fn is_multipart(&self) -> bool {
        matches!(self.body, RequestBody::Multipart(_))
    }
}

/// Body attached to an outbound request
#[derive(Debug)]
pub(crate) enum RequestBody {
    /// No body
    None,
    /// Structured JSON payload
    Json(serde_json::Value),
    /// Multipart form (file uploads)
    Multipart(MultipartSpec),
}

/// Description of a multipart form body
///
/// Parts hold owned bytes so a retried attempt can rebuild the form from
/// scratch; a retried upload restarts from byte 0 (resumable uploads are
/// out of scope).
#[derive(Clone, Debug, Default)]
pub struct MultipartSpec {
    parts: Vec<MultipartPart>,
}

#[derive(Clone, Debug)]
struct MultipartPart {
    name: String,
    kind: PartKind,
}

#[derive(Clone, Debug)]
enum PartKind {
    Text(String),
    File {
        filename: String,
        content_type: Option<String>,
        data: Vec<u8>,
    },
}

impl MultipartSpec {
    /// Start an empty form
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            kind: PartKind::Text(value.into()),
        });
        self
    }

    /// Add a file field
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            kind: PartKind::File {
                filename: filename.into(),
                content_type: None,
                data: data.into(),
            },
        });
        self
    }

    /// Add a file field with an explicit part content type
    ///
    /// This sets the type of the individual part, not of the request; the
    /// request-level multipart Content-Type and boundary still come from
    /// the transport.
    pub fn file_with_type(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            kind: PartKind::File {
                filename: filename.into(),
                content_type: Some(content_type.into()),
                data: data.into(),
            },
        });
        self
    }

    /// Whether the form has no parts
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Build the transport-level form for one attempt
    pub(crate) fn to_form(&self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for part in &self.parts {
            match &part.kind {
                PartKind::Text(value) => {
                    form = form.text(part.name.clone(), value.clone());
                }
                PartKind::File {
                    filename,
                    content_type,
                    data,
                } => {
                    let mut file_part =
                        reqwest::multipart::Part::bytes(data.clone()).file_name(filename.clone());
                    if let Some(ct) = content_type {
                        file_part = file_part.mime_str(ct).map_err(|e| {
                            Error::Decode(format!("invalid part content type {ct:?}: {e}"))
                        })?;
                    }
                    form = form.part(part.name.clone(), file_part);
                }
            }
        }
        Ok(form)
    }
}

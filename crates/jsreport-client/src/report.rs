//! Rendered report returned by a successful render call.
//!
//! The content is a forward-only byte stream straight off the connection.
//! It can be consumed once: collect it with [`ReportContent::bytes`], pipe it
//! somewhere with [`ReportContent::copy_to`], read it through
//! [`ReportContent::into_reader`], or poll it as a [`Stream`]. Dropping the
//! [`Report`] releases the connection. The call's timeout and cancellation
//! token stay in force until the content is fully read.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;

use crate::api::CancelScope;
use crate::error::{ReportError, Result};

/// Output of a successful render.
#[derive(Debug)]
pub struct Report {
    pub content: ReportContent,
    pub meta: ReportMeta,
}

impl Report {
    pub fn new(content: ReportContent, meta: ReportMeta) -> Self {
        Self { content, meta }
    }

    /// Write the whole report to `path`, returning the number of bytes written.
    pub async fn save(self, path: impl AsRef<Path>) -> Result<u64> {
        let mut file = tokio::fs::File::create(path.as_ref())
            .await
            .map_err(ReportError::Io)?;
        let written = self.content.copy_to(&mut file).await?;
        file.flush().await.map_err(ReportError::Io)?;
        Ok(written)
    }
}

/// Forward-only report body.
pub struct ReportContent {
    inner: BoxStream<'static, Result<Bytes>>,
}

impl ReportContent {
    /// Wrap any byte stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Content already held in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::from_stream(stream::once(async move { Ok(bytes) }))
    }

    /// Body of a successful response, still bound to the call's scope: the
    /// configured timeout and the caller's token cut the stream off with
    /// [`ReportError::Cancelled`].
    pub(crate) fn from_response(response: reqwest::Response, scope: CancelScope) -> Self {
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ReportError::from))
            .boxed();
        Self::from_stream(scope.bind_stream(body))
    }

    /// Collect the remaining content into memory.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Collect the remaining content as text. Invalid UTF-8 is replaced.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Stream the remaining content into `writer`.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;
        while let Some(chunk) = self.inner.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await.map_err(ReportError::Io)?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    /// Adapt the content into a tokio [`AsyncRead`].
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(self.inner.map(|chunk| chunk.map_err(std::io::Error::other)))
    }
}

impl Stream for ReportContent {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ReportContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportContent").finish_non_exhaustive()
    }
}

/// Report metadata built from the response headers.
///
/// Keys are header names as received (lower-case on the wire through
/// `reqwest`); lookups are case-insensitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportMeta {
    entries: HashMap<String, String>,
}

impl ReportMeta {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.entries
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("content-type")
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.get("content-disposition")
    }

    /// Extension the server suggests for the output (`pdf`, `html`, ...).
    pub fn file_extension(&self) -> Option<&str> {
        self.get("file-extension")
    }

    pub fn report_id(&self) -> Option<&str> {
        self.get("report-id")
    }

    /// Link to a stored copy of the report, when the server kept one.
    pub fn permanent_link(&self) -> Option<&str> {
        self.get("permanent-link")
    }

    /// `filename` parameter of the content disposition.
    pub fn file_name(&self) -> Option<&str> {
        self.content_disposition()?
            .split(';')
            .filter_map(|part| part.trim().split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("filename"))
            .map(|(_, value)| value.trim().trim_matches('"'))
            .filter(|name| !name.is_empty())
    }
}

impl FromIterator<(String, String)> for ReportMeta {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use futures_util::Stream;

use crate::bridge::Connection;
use crate::driver::{LobChunk, LobKind, LobLocator};
use crate::error::SqlBridgeError;

use super::LOB_CHUNK_SIZE;
use super::accumulator::LobAccumulator;

/// Ties a locator to the row that vended it.
#[derive(Clone)]
pub(crate) struct LobContext {
    pub(crate) connection: Connection,
    pub(crate) row_generation: u64,
    pub(crate) cursor_generation: Arc<AtomicU64>,
}

impl LobContext {
    /// False once the cursor has moved past the owning row.
    pub(crate) fn is_current(&self) -> bool {
        self.cursor_generation.load(Ordering::Acquire) == self.row_generation
    }
}

enum Source {
    Inline(LobChunk),
    Locator {
        locator: LobLocator,
        context: LobContext,
    },
    Stream(BoxStream<'static, Result<LobChunk, SqlBridgeError>>),
}

struct LobState {
    kind: LobKind,
    source: Mutex<Option<Source>>,
}

impl LobState {
    fn new(kind: LobKind, source: Source) -> Arc<Self> {
        Arc::new(Self {
            kind,
            source: Mutex::new(Some(source)),
        })
    }

    fn take(&self) -> Result<Source, SqlBridgeError> {
        let taken = self
            .source
            .lock()
            .map_err(|_| SqlBridgeError::stale("LOB handle state was poisoned"))?
            .take();
        let source = taken.ok_or_else(|| {
            SqlBridgeError::stale(format!("{:?} handle was already consumed", self.kind))
        })?;
        if let Source::Locator { context, .. } = &source
            && !context.is_current()
        {
            return Err(SqlBridgeError::stale(format!(
                "{:?} belongs to a row the cursor has advanced past",
                self.kind
            )));
        }
        Ok(source)
    }

    fn chunks(&self) -> Result<BoxStream<'static, Result<LobChunk, SqlBridgeError>>, SqlBridgeError> {
        Ok(match self.take()? {
            Source::Inline(chunk) if chunk.is_empty() => stream::empty().boxed(),
            Source::Inline(chunk) => stream::once(async move { Ok(chunk) }).boxed(),
            Source::Locator { locator, context } => locator_stream(locator, context),
            Source::Stream(chunks) => chunks,
        })
    }

    async fn discard(&self) -> Result<(), SqlBridgeError> {
        if let Source::Locator { locator, context } = self.take()? {
            context.connection.free_lob(locator).await?;
        }
        Ok(())
    }

    async fn materialize(&self) -> Result<LobAccumulator, SqlBridgeError> {
        let mut chunks = self.chunks()?;
        let mut acc = LobAccumulator::new();
        while let Some(chunk) = chunks.next().await {
            acc.push(chunk?.as_bytes());
        }
        Ok(acc)
    }

    fn describe(&self) -> &'static str {
        match self.source.lock().ok().as_deref() {
            Some(Some(Source::Inline(_))) => "inline",
            Some(Some(Source::Locator { .. })) => "locator",
            Some(Some(Source::Stream(_))) => "stream",
            Some(None) => "consumed",
            None => "poisoned",
        }
    }
}

impl Drop for LobState {
    fn drop(&mut self) {
        if let Ok(slot) = self.source.get_mut()
            && let Some(Source::Locator { locator, context }) = slot.take()
            && context.is_current()
        {
            context.connection.free_lob_detached(locator);
        }
    }
}

/// Frees the locator when the read stream ends, fails or is dropped early.
struct LocatorGuard {
    locator: LobLocator,
    context: LobContext,
}

impl Drop for LocatorGuard {
    fn drop(&mut self) {
        self.context.connection.free_lob_detached(self.locator);
    }
}

/// One driver read per demanded chunk; ends on the first empty chunk.
fn locator_stream(
    locator: LobLocator,
    context: LobContext,
) -> BoxStream<'static, Result<LobChunk, SqlBridgeError>> {
    let guard = LocatorGuard { locator, context };
    stream::unfold(Some((guard, 0u64)), |state| async move {
        let (guard, offset) = state?;
        if !guard.context.is_current() {
            let err = SqlBridgeError::stale(format!(
                "{} belongs to a row the cursor has advanced past",
                guard.locator
            ));
            return Some((Err(err), None));
        }
        match guard
            .context
            .connection
            .read_lob(guard.locator, offset, LOB_CHUNK_SIZE)
            .await
        {
            Ok(chunk) if chunk.is_empty() => None,
            Ok(chunk) => {
                let next = offset + chunk.units() as u64;
                Some((Ok(chunk), Some((guard, next))))
            }
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}

/// Chunks to upload into a temporary LOB when a handle is bound as a parameter.
pub struct LobWriteSource {
    pub(crate) kind: LobKind,
    pub(crate) chunks: BoxStream<'static, Result<LobChunk, SqlBridgeError>>,
}

impl LobWriteSource {
    #[must_use]
    pub fn kind(&self) -> LobKind {
        self.kind
    }
}

impl fmt::Debug for LobWriteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LobWriteSource")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Binary large object.
///
/// A handle read from a row streams from the driver and can be consumed once; clones share
/// that single consumption. Handles built with [`Blob::from_stream`] upload their chunks when
/// bound.
#[derive(Clone)]
pub struct Blob {
    state: Arc<LobState>,
}

impl Blob {
    /// A BLOB whose content is produced by `chunks` when the handle is bound.
    pub fn from_stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<Bytes, SqlBridgeError>> + Send + 'static,
    {
        let chunks = chunks.map(|chunk| chunk.map(LobChunk::Bytes)).boxed();
        Self {
            state: LobState::new(LobKind::Blob, Source::Stream(chunks)),
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            state: LobState::new(LobKind::Blob, Source::Inline(LobChunk::Bytes(bytes.into()))),
        }
    }

    pub(crate) fn from_locator(locator: LobLocator, context: LobContext) -> Self {
        Self {
            state: LobState::new(LobKind::Blob, Source::Locator { locator, context }),
        }
    }

    /// Content as a lazy chunk stream.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::StaleResourceError`] if the handle was already consumed or its
    /// row was advanced past.
    pub fn stream(
        &self,
    ) -> Result<BoxStream<'static, Result<Bytes, SqlBridgeError>>, SqlBridgeError> {
        Ok(self
            .state
            .chunks()?
            .map(|chunk| {
                chunk.map(|chunk| match chunk {
                    LobChunk::Bytes(bytes) => bytes,
                    LobChunk::Text(text) => Bytes::from(text),
                })
            })
            .boxed())
    }

    /// Read the whole value into memory.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::StaleResourceError`] for a consumed or out-of-scope handle, or
    /// any error raised while reading chunks.
    pub async fn materialize(&self) -> Result<Bytes, SqlBridgeError> {
        Ok(self.state.materialize().await?.into_bytes())
    }

    /// Release the value without reading it.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::StaleResourceError`] if the handle was already consumed.
    pub async fn discard(&self) -> Result<(), SqlBridgeError> {
        self.state.discard().await
    }

    pub(crate) fn into_write_source(self) -> Result<LobWriteSource, SqlBridgeError> {
        Ok(LobWriteSource {
            kind: LobKind::Blob,
            chunks: self.state.chunks()?,
        })
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Blob").field(&self.state.describe()).finish()
    }
}

/// Character large object. Same consumption rules as [`Blob`].
#[derive(Clone)]
pub struct Clob {
    state: Arc<LobState>,
}

impl Clob {
    /// A CLOB whose content is produced by `chunks` when the handle is bound.
    pub fn from_stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<String, SqlBridgeError>> + Send + 'static,
    {
        let chunks = chunks.map(|chunk| chunk.map(LobChunk::Text)).boxed();
        Self {
            state: LobState::new(LobKind::Clob, Source::Stream(chunks)),
        }
    }

    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            state: LobState::new(LobKind::Clob, Source::Inline(LobChunk::Text(text.into()))),
        }
    }

    pub(crate) fn from_locator(locator: LobLocator, context: LobContext) -> Self {
        Self {
            state: LobState::new(LobKind::Clob, Source::Locator { locator, context }),
        }
    }

    /// Content as a lazy chunk stream.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::StaleResourceError`] if the handle was already consumed or its
    /// row was advanced past.
    pub fn stream(
        &self,
    ) -> Result<BoxStream<'static, Result<String, SqlBridgeError>>, SqlBridgeError> {
        Ok(self
            .state
            .chunks()?
            .map(|chunk| {
                chunk.and_then(|chunk| match chunk {
                    LobChunk::Text(text) => Ok(text),
                    LobChunk::Bytes(bytes) => String::from_utf8(bytes.to_vec()).map_err(|err| {
                        SqlBridgeError::unsupported(format!("CLOB chunk is not UTF-8: {err}"))
                    }),
                })
            })
            .boxed())
    }

    /// Read the whole value into memory.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::StaleResourceError`] for a consumed or out-of-scope handle, or
    /// any error raised while reading chunks.
    pub async fn materialize(&self) -> Result<String, SqlBridgeError> {
        self.state.materialize().await?.into_string()
    }

    /// Release the value without reading it.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::StaleResourceError`] if the handle was already consumed.
    pub async fn discard(&self) -> Result<(), SqlBridgeError> {
        self.state.discard().await
    }

    pub(crate) fn into_write_source(self) -> Result<LobWriteSource, SqlBridgeError> {
        Ok(LobWriteSource {
            kind: LobKind::Clob,
            chunks: self.state.chunks()?,
        })
    }
}

impl PartialEq for Clob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Clob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Clob").field(&self.state.describe()).finish()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    #[tokio::test]
    async fn inline_handles_are_single_use() {
        let clob = Clob::from_text("abc");
        let shared = clob.clone();
        assert_eq!(clob.materialize().await.unwrap(), "abc");
        let err = shared.materialize().await.unwrap_err();
        assert!(matches!(err, SqlBridgeError::StaleResourceError(_)));
    }

    #[tokio::test]
    async fn stream_sources_concatenate_in_order() {
        let parts = ["α", "βγ", "", "δ"].map(|s| Ok(s.to_owned()));
        let clob = Clob::from_stream(stream::iter(parts));
        assert_eq!(clob.materialize().await.unwrap(), "αβγδ");

        let blob = Blob::from_stream(stream::iter(Vec::<Result<Bytes, SqlBridgeError>>::new()));
        assert!(blob.materialize().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_errors_surface_from_materialize() {
        let parts = vec![
            Ok(Bytes::from_static(b"ok")),
            Err(SqlBridgeError::CommunicationError("reset".into())),
        ];
        let blob = Blob::from_stream(stream::iter(parts));
        let err = blob.materialize().await.unwrap_err();
        assert!(matches!(err, SqlBridgeError::CommunicationError(_)));
    }

    #[test]
    fn equality_is_identity() {
        let a = Blob::from_bytes(Bytes::from_static(b"x"));
        let b = Blob::from_bytes(Bytes::from_static(b"x"));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}

//! Bounded cache of recognition readers keyed by language set.
//!
//! Readers are expensive to build (model/data loading) and cheap to reuse.
//! All lookups, inserts and clears go through one mutex, so two requests for
//! the same uncached set never build it twice. When a new set arrives and the
//! cache is full, the whole cache is cleared rather than evicting one entry.

use crate::error::{EngineInferError, EngineInitError};
use crate::languages::LanguageSet;
use crate::normalize::NormalizedImage;
use crate::ocr::{Detection, EngineFactory, RecognitionEngine};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of live readers.
pub const READER_CACHE_CAPACITY: usize = 3;

/// One constructed recognizer bound to a language set. Never mutated after
/// construction.
pub struct ReaderHandle {
    languages: LanguageSet,
    engine: Box<dyn RecognitionEngine>,
    /// Present when the engine cannot serve concurrent calls.
    inference_lock: Option<Mutex<()>>,
}

impl ReaderHandle {
    pub fn new(languages: LanguageSet, engine: Box<dyn RecognitionEngine>) -> Self {
        let inference_lock = if engine.supports_concurrent_inference() {
            None
        } else {
            Some(Mutex::new(()))
        };
        Self {
            languages,
            engine,
            inference_lock,
        }
    }

    pub fn languages(&self) -> &LanguageSet {
        &self.languages
    }

    /// Run the engine, one call at a time unless it allows concurrency.
    pub fn infer(&self, image: &NormalizedImage) -> Result<Vec<Detection>, EngineInferError> {
        let _serialized = self.inference_lock.as_ref().map(|lock| lock.lock());
        self.engine.infer(image)
    }
}

impl std::fmt::Debug for ReaderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderHandle")
            .field("languages", &self.languages)
            .field("serialized", &self.inference_lock.is_some())
            .finish()
    }
}

/// Process-wide reader cache.
pub struct ReaderCache {
    factory: Arc<dyn EngineFactory>,
    capacity: usize,
    readers: Mutex<HashMap<LanguageSet, Arc<ReaderHandle>>>,
}

impl ReaderCache {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            capacity: READER_CACHE_CAPACITY,
            readers: Mutex::new(HashMap::new()),
        }
    }

    /// Get the reader for `languages`, building it on first use.
    ///
    /// If construction fails for anything other than `{en}`, one retry is
    /// made with `{en}`; the English reader is returned (and cached under
    /// `{en}`) on success.
    pub fn acquire(&self, languages: &LanguageSet) -> Result<Arc<ReaderHandle>, EngineInitError> {
        let mut readers = self.readers.lock();

        // Membership is checked under the guard, so a reader another request
        // just finished building is reused here.
        if let Some(handle) = readers.get(languages) {
            debug!("Reader cache hit for {}", languages);
            return Ok(handle.clone());
        }

        let cause = match self.construct(&mut readers, languages) {
            Ok(handle) => return Ok(handle),
            Err(e) if languages.is_english_only() => return Err(e),
            Err(e) => e,
        };

        warn!(
            "Reader initialisation failed for {}: {}; falling back to en",
            languages, cause
        );
        let english = LanguageSet::english();
        if let Some(handle) = readers.get(&english) {
            return Ok(handle.clone());
        }
        self.construct(&mut readers, &english)
            .map_err(|fallback| EngineInitError::FallbackFailed {
                requested: languages.clone(),
                cause: Box::new(cause),
                fallback: Box::new(fallback),
            })
    }

    /// Build a reader and insert it, clearing the cache first if it is full.
    fn construct(
        &self,
        readers: &mut HashMap<LanguageSet, Arc<ReaderHandle>>,
        languages: &LanguageSet,
    ) -> Result<Arc<ReaderHandle>, EngineInitError> {
        info!(
            "Initialising {} reader for {} ({} languages)",
            self.factory.name(),
            languages,
            languages.len()
        );
        let engine = self.factory.construct(languages)?;

        if readers.len() >= self.capacity {
            info!(
                "Reader cache full ({} entries), clearing before adding {}",
                readers.len(),
                languages
            );
            readers.clear();
        }

        let handle = Arc::new(ReaderHandle::new(languages.clone(), engine));
        readers.insert(languages.clone(), handle.clone());
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.readers.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every cached reader. Handles already given out stay usable.
    pub fn clear(&self) {
        self.readers.lock().clear();
    }

    /// Language sets currently cached, sorted.
    pub fn cached_languages(&self) -> Vec<LanguageSet> {
        let mut sets: Vec<LanguageSet> = self.readers.lock().keys().cloned().collect();
        sets.sort();
        sets
    }

    pub fn engine_available(&self) -> bool {
        self.factory.is_available()
    }
}

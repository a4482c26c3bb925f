// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR provider ownership.
//
// Providers are expensive to construct (model loading, binary probing), so the
// engine keeps one per backend for its whole lifetime. The cache creates them
// on first use and drops them on `teardown`. Providers that are not
// reentrant are wrapped so concurrent callers take turns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use image::DynamicImage;
use tracing::{debug, info};
use vibeparser_core::{OcrEngineKind, Result};
use vibeparser_document::{OcrOutput, OcrProvider, OcrRequest, create_provider};

type Factory = dyn Fn(OcrEngineKind) -> Result<Arc<dyn OcrProvider>> + Send + Sync;

/// A provider safe to call from any number of worker threads.
#[derive(Clone)]
pub struct SharedProvider {
    provider: Arc<dyn OcrProvider>,
    /// Present when the provider must not be entered concurrently.
    gate: Option<Arc<Mutex<()>>>,
}

impl SharedProvider {
    pub fn new(provider: Arc<dyn OcrProvider>) -> Self {
        let gate = (!provider.is_reentrant()).then(|| Arc::new(Mutex::new(())));
        Self { provider, gate }
    }

    pub fn name(&self) -> &'static str {
        self.provider.name()
    }

    /// Whether calls are serialised.
    pub fn is_serialised(&self) -> bool {
        self.gate.is_some()
    }

    pub fn recognize(&self, image: &DynamicImage, request: &OcrRequest) -> Result<OcrOutput> {
        match &self.gate {
            Some(gate) => {
                let _turn = gate.lock().unwrap_or_else(PoisonError::into_inner);
                self.provider.recognize(image, request)
            }
            None => self.provider.recognize(image, request),
        }
    }
}

/// Lazily-initialised providers, one per engine kind.
pub struct ProviderCache {
    factory: Box<Factory>,
    providers: Mutex<HashMap<OcrEngineKind, SharedProvider>>,
}

impl Default for ProviderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderCache {
    /// Providers built by [`create_provider`].
    pub fn new() -> Self {
        Self::with_factory(create_provider)
    }

    /// Providers built by `factory`.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(OcrEngineKind) -> Result<Arc<dyn OcrProvider>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// The same provider for every engine kind.
    pub fn fixed(provider: Arc<dyn OcrProvider>) -> Self {
        Self::with_factory(move |_| Ok(Arc::clone(&provider)))
    }

    /// The provider for `kind`, constructing it on first use.
    ///
    /// Construction failures are returned and not cached, so a later call
    /// retries (for instance after the user installs tesseract).
    pub fn get(&self, kind: OcrEngineKind) -> Result<SharedProvider> {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(shared) = providers.get(&kind) {
            debug!(%kind, provider = shared.name(), "Reusing OCR provider");
            return Ok(shared.clone());
        }

        let shared = SharedProvider::new((self.factory)(kind)?);
        info!(
            %kind,
            provider = shared.name(),
            serialised = shared.is_serialised(),
            "OCR provider initialised"
        );
        providers.insert(kind, shared.clone());
        Ok(shared)
    }

    pub fn is_initialised(&self, kind: OcrEngineKind) -> bool {
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&kind)
    }

    /// Drop every cached provider. Workers still holding a
    /// [`SharedProvider`] keep theirs alive until they finish.
    pub fn teardown(&self) {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        if !providers.is_empty() {
            info!(count = providers.len(), "Releasing OCR providers");
        }
        providers.clear();
    }
}

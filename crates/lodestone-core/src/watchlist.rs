//! Watchlist membership, reconciled with the remote store.
//!
//! Mutations are confirm-then-commit: the local list changes only after the
//! store acknowledges the add or remove. A failed call leaves it untouched.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::auth::SessionProvider;
use crate::taxonomy::{ErrorKind, ErrorRecord};
use crate::{Symbol, WatchlistItem};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ErrorRecord>> + Send + 'a>>;

/// Persisted watchlist backend.
pub trait WatchlistStore: Send + Sync {
    fn fetch_all(&self) -> StoreFuture<'_, Vec<WatchlistItem>>;

    fn add<'a>(&'a self, item: &'a WatchlistItem) -> StoreFuture<'a, ()>;

    fn remove<'a>(&'a self, symbol: &'a Symbol) -> StoreFuture<'a, ()>;
}

impl WatchlistStore for ApiClient {
    fn fetch_all(&self) -> StoreFuture<'_, Vec<WatchlistItem>> {
        Box::pin(self.get_watchlist())
    }

    fn add<'a>(&'a self, item: &'a WatchlistItem) -> StoreFuture<'a, ()> {
        Box::pin(self.add_watchlist_item(&item.symbol, &item.name))
    }

    fn remove<'a>(&'a self, symbol: &'a Symbol) -> StoreFuture<'a, ()> {
        Box::pin(self.remove_watchlist_item(symbol))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchlistError {
    #[error("sign in to manage the watchlist")]
    Unauthenticated,
    #[error("no entity is selected")]
    NoSelection,
    #[error("watchlist update failed: {0}")]
    Remote(ErrorRecord),
}

/// Snapshot of the local watchlist.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WatchlistState {
    pub items: Vec<WatchlistItem>,
    pub loading: bool,
}

#[derive(Default)]
struct Inner {
    items: Vec<WatchlistItem>,
    loading: bool,
    session_present: bool,
}

pub struct WatchlistSync {
    store: Arc<dyn WatchlistStore>,
    sessions: Arc<dyn SessionProvider>,
    inner: Mutex<Inner>,
}

impl WatchlistSync {
    pub fn new(store: Arc<dyn WatchlistStore>, sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            store,
            sessions,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Add `symbol` once the store confirms. Already listed symbols are not
    /// appended twice.
    pub async fn add(&self, symbol: &Symbol, name: &str) -> Result<(), WatchlistError> {
        if self.sessions.current_session().is_none() {
            return Err(WatchlistError::Unauthenticated);
        }

        let item = WatchlistItem::new(symbol.clone(), name);
        if let Err(error) = self.store.add(&item).await {
            warn!(symbol = %symbol, error = %error, "watchlist add failed");
            return Err(into_watchlist_error(error));
        }

        let mut inner = self.lock();
        if !inner.items.iter().any(|existing| existing.symbol == item.symbol) {
            inner.items.push(item);
        }
        info!(symbol = %symbol, "added to watchlist");
        Ok(())
    }

    /// Remove `symbol` once the store confirms. Unlisted symbols are a no-op.
    pub async fn remove(&self, symbol: &Symbol) -> Result<(), WatchlistError> {
        if !self.contains(symbol) {
            debug!(symbol = %symbol, "remove skipped, symbol not in watchlist");
            return Ok(());
        }
        if self.sessions.current_session().is_none() {
            return Err(WatchlistError::Unauthenticated);
        }

        if let Err(error) = self.store.remove(symbol).await {
            warn!(symbol = %symbol, error = %error, "watchlist remove failed");
            return Err(into_watchlist_error(error));
        }

        self.lock().items.retain(|item| &item.symbol != symbol);
        info!(symbol = %symbol, "removed from watchlist");
        Ok(())
    }

    /// Replace the local list with the store's contents.
    ///
    /// A failed fetch yields an empty list.
    pub async fn load(&self) -> Vec<WatchlistItem> {
        self.lock().loading = true;

        let fetched = match self.store.fetch_all().await {
            Ok(items) => items,
            Err(error) => {
                warn!(error = %error, "watchlist load failed");
                Vec::new()
            }
        };

        let mut items: Vec<WatchlistItem> = Vec::with_capacity(fetched.len());
        for item in fetched {
            if !items.iter().any(|existing| existing.symbol == item.symbol) {
                items.push(item);
            }
        }

        let mut inner = self.lock();
        inner.items = items.clone();
        inner.loading = false;
        items
    }

    /// Reconcile with the session provider: load after sign-in, clear after
    /// sign-out.
    pub async fn sync_session(&self) {
        let present = self.sessions.current_session().is_some();
        let was_present = {
            let mut inner = self.lock();
            let was_present = inner.session_present;
            inner.session_present = present;
            if was_present && !present {
                inner.items.clear();
                inner.loading = false;
            }
            was_present
        };

        if present && !was_present {
            self.load().await;
        }
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.lock().items.iter().any(|item| &item.symbol == symbol)
    }

    pub fn items(&self) -> Vec<WatchlistItem> {
        self.lock().items.clone()
    }

    pub fn state(&self) -> WatchlistState {
        let inner = self.lock();
        WatchlistState {
            items: inner.items.clone(),
            loading: inner.loading,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn into_watchlist_error(error: ErrorRecord) -> WatchlistError {
    match error.kind() {
        ErrorKind::Unauthenticated => WatchlistError::Unauthenticated,
        _ => WatchlistError::Remote(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{InMemorySessionProvider, Session};

    #[derive(Default)]
    struct RecordingStore {
        listed: Vec<WatchlistItem>,
        fail_with: Option<ErrorRecord>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn record(&self, call: String) -> Result<(), ErrorRecord> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
            match &self.fail_with {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl WatchlistStore for RecordingStore {
        fn fetch_all(&self) -> StoreFuture<'_, Vec<WatchlistItem>> {
            Box::pin(async move {
                self.record(String::from("fetch_all"))?;
                Ok(self.listed.clone())
            })
        }

        fn add<'a>(&'a self, item: &'a WatchlistItem) -> StoreFuture<'a, ()> {
            Box::pin(async move { self.record(format!("add {}", item.symbol)) })
        }

        fn remove<'a>(&'a self, symbol: &'a Symbol) -> StoreFuture<'a, ()> {
            Box::pin(async move { self.record(format!("remove {symbol}")) })
        }
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    fn signed_in() -> Arc<InMemorySessionProvider> {
        Arc::new(InMemorySessionProvider::signed_in(Session::new("ana", "jwt")))
    }

    #[tokio::test]
    async fn add_without_session_makes_no_remote_call() {
        let store = Arc::new(RecordingStore::default());
        let sync = WatchlistSync::new(store.clone(), Arc::new(InMemorySessionProvider::new()));

        let err = sync.add(&symbol("ABC"), "Abc Mining").await.expect_err("must fail");

        assert_eq!(err, WatchlistError::Unauthenticated);
        assert!(store.calls().is_empty());
        assert!(sync.items().is_empty());
    }

    #[tokio::test]
    async fn failed_add_leaves_list_unchanged() {
        let store = Arc::new(RecordingStore {
            fail_with: Some(ErrorRecord::new(
                ErrorKind::ServerError { status: 500 },
                "Server Error: 500",
                None,
                None,
            )),
            ..RecordingStore::default()
        });
        let sync = WatchlistSync::new(store, signed_in());

        let err = sync.add(&symbol("ABC"), "Abc Mining").await.expect_err("must fail");

        assert!(matches!(err, WatchlistError::Remote(_)));
        assert!(!sync.contains(&symbol("ABC")));
    }

    #[tokio::test]
    async fn load_deduplicates_and_clears_loading_flag() {
        let store = Arc::new(RecordingStore {
            listed: vec![
                WatchlistItem::new(symbol("ABC"), "Abc Mining"),
                WatchlistItem::new(symbol("XYZ"), "Xyz Energy"),
                WatchlistItem::new(symbol("ABC"), "Abc Mining (dup)"),
            ],
            ..RecordingStore::default()
        });
        let sync = WatchlistSync::new(store, signed_in());

        let items = sync.load().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Abc Mining");
        assert!(!sync.state().loading);
    }

    #[tokio::test]
    async fn sync_session_loads_on_sign_in_and_clears_on_sign_out() {
        let sessions = Arc::new(InMemorySessionProvider::new());
        let store = Arc::new(RecordingStore {
            listed: vec![WatchlistItem::new(symbol("ABC"), "Abc Mining")],
            ..RecordingStore::default()
        });
        let sync = WatchlistSync::new(store.clone(), sessions.clone());

        sync.sync_session().await;
        assert!(store.calls().is_empty());

        sessions.sign_in(Session::new("ana", "jwt"));
        sync.sync_session().await;
        assert_eq!(sync.items().len(), 1);

        sessions.sign_out();
        sync.sync_session().await;
        assert!(sync.items().is_empty());
        assert_eq!(store.calls(), vec![String::from("fetch_all")]);
    }
}

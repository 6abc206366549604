//! Registry of instrument books
//!
//! The set of symbols is fixed at construction, so lookups need no outer
//! lock; each book is its own synchronization unit.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{BookView, InstrumentBook, SyncState};
use crate::error::{MarketDataError, Result};

/// Shared handle to one instrument's book
pub type BookHandle = Arc<RwLock<InstrumentBook>>;

/// Books for every tracked symbol
#[derive(Debug, Default)]
pub struct BookRegistry {
    books: BTreeMap<String, BookHandle>,
}

impl BookRegistry {
    /// Create an unsynced book for each symbol
    pub fn new<S: AsRef<str>>(symbols: &[S], buffer_capacity: usize) -> Self {
        let books = symbols
            .iter()
            .map(|symbol| {
                let symbol = symbol.as_ref();
                (
                    symbol.to_string(),
                    Arc::new(RwLock::new(InstrumentBook::new(symbol, buffer_capacity))),
                )
            })
            .collect();
        Self { books }
    }

    pub fn get(&self, symbol: &str) -> Result<BookHandle> {
        self.books
            .get(symbol)
            .cloned()
            .ok_or_else(|| MarketDataError::UnknownInstrument(symbol.to_string()))
    }

    /// Tracked symbols in sorted order
    pub fn symbols(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BookHandle)> + '_ {
        self.books.iter().map(|(symbol, book)| (symbol.as_str(), book))
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Consistent copy of one book
    pub async fn view(&self, symbol: &str) -> Result<BookView> {
        let book = self.get(symbol)?;
        let view = book.read().await.view();
        Ok(view)
    }

    pub async fn sync_states(&self) -> Vec<(String, SyncState)> {
        let mut states = Vec::with_capacity(self.books.len());
        for (symbol, book) in &self.books {
            states.push((symbol.clone(), book.read().await.sync_state()));
        }
        states
    }

    /// Force a symbol back to unsynced after its update stream dropped
    pub async fn mark_disconnected(&self, symbol: &str) -> Result<()> {
        let book = self.get(symbol)?;
        book.write().await.mark_disconnected();
        Ok(())
    }
}

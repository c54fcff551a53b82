//! # Keyset Pagination
//!
//! Listings (pending shifts, unconciliated movements) are exposed as lazy
//! cursors instead of materialised vectors.
//!
//! ## How It Works
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Keyset Pager                                         │
//! │                                                                         │
//! │  Rows ordered by (timestamp, id):                                      │
//! │                                                                         │
//! │   (09:00,a) (09:00,b) (09:05,c) │ (09:07,d) (09:30,e) ...              │
//! │   └────────── page 1 ─────────┘ │                                      │
//! │                          cursor ┘  = (09:05, c)                         │
//! │                                                                         │
//! │  page 2: WHERE ts > '09:05' OR (ts = '09:05' AND id > 'c')             │
//! │                                                                         │
//! │  • next()      yields one item, fetching a page when the buffer empties│
//! │  • cursor()    position after the last yielded item (serialisable)     │
//! │  • restart()   back to the first row                                   │
//! │  • resume(c)   continue from a saved cursor                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No OFFSET is ever used, so a row settled or conciliated between pages
//! does not shift later rows out of the sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;

use crate::error::DbResult;

/// Position in a `(timestamp, id)` ordered listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub at: DateTime<Utc>,
    pub id: String,
}

/// A listing that can be fetched one keyset page at a time.
pub trait PageSource {
    type Item;

    /// Returns up to `limit` items strictly after `after`, in order.
    fn fetch_page(
        &self,
        after: Option<&PageCursor>,
        limit: u32,
    ) -> impl Future<Output = DbResult<Vec<Self::Item>>> + Send;

    /// The cursor that sorts at `item`.
    fn cursor_of(item: &Self::Item) -> PageCursor;
}

/// Lazy, restartable sequence over a [`PageSource`].
pub struct Pager<S: PageSource> {
    source: S,
    page_size: u32,
    buffer: VecDeque<S::Item>,
    /// Last item handed out by `next()`.
    yielded: Option<PageCursor>,
    /// Last item loaded into `buffer`.
    fetched: Option<PageCursor>,
    exhausted: bool,
}

impl<S: PageSource> Pager<S> {
    pub fn new(source: S, page_size: u32) -> Self {
        Pager {
            source,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            yielded: None,
            fetched: None,
            exhausted: false,
        }
    }

    /// Starts after a cursor previously returned by [`Pager::cursor`].
    pub fn resume(source: S, page_size: u32, cursor: PageCursor) -> Self {
        let mut pager = Pager::new(source, page_size);
        pager.yielded = Some(cursor.clone());
        pager.fetched = Some(cursor);
        pager
    }

    /// Yields the next item, or `None` once the listing is exhausted.
    ///
    /// A failed fetch leaves the position untouched, so calling again
    /// retries the same page.
    pub async fn next(&mut self) -> DbResult<Option<S::Item>> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self
                .source
                .fetch_page(self.fetched.as_ref(), self.page_size)
                .await?;

            if (page.len() as u32) < self.page_size {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.fetched = Some(S::cursor_of(last));
            }
            self.buffer.extend(page);
        }

        let item = self.buffer.pop_front();
        if let Some(item) = &item {
            self.yielded = Some(S::cursor_of(item));
        }
        Ok(item)
    }

    /// Drains the remaining items.
    pub async fn collect_remaining(&mut self) -> DbResult<Vec<S::Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Position after the last yielded item (`None` before the first).
    pub fn cursor(&self) -> Option<&PageCursor> {
        self.yielded.as_ref()
    }

    /// Rewinds to the start; the next call re-reads from the database.
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.yielded = None;
        self.fetched = None;
        self.exhausted = false;
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! List calls in Google APIs return one page of results and a continuation
//! token. The types in this module hide the tokens from the application.
//!
//! An [ItemPaginator] wraps a function to fetch one page, and returns the
//! items one at a time. A [Pager] drives the same paginator one page at a
//! time, which is useful when the application needs to save the continuation
//! token, for example, to serve paged results in a web application.
//!
//! The two modes cannot be mixed: once a paginator is used in one mode, any
//! call in the other mode returns an error.
//!
//! # Example
//! ```
//! # use google_api_gax::paginator::{ItemPaginator, Page};
//! # use google_api_gax::error::Error;
//! async fn sample() -> google_api_gax::Result<Vec<i32>> {
//!     let mut paginator = ItemPaginator::new("", |_page_size, token: String| async move {
//!         // A real client would send a request here.
//!         let page = match token.as_str() {
//!             "" => Page::new(vec![1, 2], "page-2"),
//!             _ => Page::new(vec![3], ""),
//!         };
//!         Ok::<_, Error>(page)
//!     });
//!     let mut items = Vec::new();
//!     while let Some(item) = paginator.next().await {
//!         items.push(item?);
//!     }
//!     Ok(items)
//! }
//! ```

use crate::Result;
use crate::error::Error;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

/// Describes a response from a list call.
pub trait PageableResponse {
    type PageItem: Send;

    /// The continuation token, empty when there are no more pages.
    fn next_page_token(&self) -> String;

    /// Consumes the response, returning the items in this page.
    fn items(self) -> Vec<Self::PageItem>;
}

/// A generic page of results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: String,
}

impl<T> Page<T> {
    pub fn new<V: Into<String>>(items: Vec<T>, next_page_token: V) -> Self {
        Self {
            items,
            next_page_token: next_page_token.into(),
        }
    }
}

impl<T: Send> PageableResponse for Page<T> {
    type PageItem = T;

    fn next_page_token(&self) -> String {
        self.next_page_token.clone()
    }

    fn items(self) -> Vec<T> {
        self.items
    }
}

/// Misuse of a paginator.
///
/// These errors are reported as the source of an [Error] where
/// [is_usage()][Error::is_usage] returns true.
#[derive(thiserror::Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum UsageError {
    #[error("cannot mix item iteration and page iteration over the same paginator")]
    MixedModes,
    #[error("the page size must be positive, got {0}")]
    InvalidPageSize(i32),
}

type Fetch<T> = Box<dyn FnMut(i32, String) -> BoxFuture<'static, Result<(Vec<T>, String)>> + Send>;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Mode {
    Items,
    Pages,
}

/// The pagination state shared by [ItemPaginator] and [Pager].
///
/// Holds the continuation token, the page size hint, and the items fetched
/// but not yet returned to the application. A failed fetch is terminal, the
/// error is returned again on every later call. Not safe for concurrent use,
/// a paginator must be driven by a single caller.
pub struct PageInfo<T> {
    token: String,
    max_size: i32,
    buffer: VecDeque<T>,
    fetch: Fetch<T>,
    mode: Option<Mode>,
    done: bool,
    error: Option<Arc<Error>>,
}

impl<T> PageInfo<T>
where
    T: Send + 'static,
{
    fn new<F, Fut, R>(token: String, mut fetch: F) -> Self
    where
        F: FnMut(i32, String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: PageableResponse<PageItem = T> + Send + 'static,
    {
        let fetch: Fetch<T> = Box::new(move |size, token| {
            let pending = fetch(size, token);
            Box::pin(async move {
                let response = pending.await?;
                let next = response.next_page_token();
                Ok((response.items(), next))
            })
        });
        Self {
            token,
            max_size: 0,
            buffer: VecDeque::new(),
            fetch,
            mode: None,
            done: false,
            error: None,
        }
    }

    /// The continuation token for the next fetch.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Changes the continuation token used in the next fetch.
    pub fn set_token<V: Into<String>>(&mut self, v: V) {
        self.token = v.into();
    }

    /// The page size hint used when iterating over items.
    ///
    /// Zero lets the service pick the page size.
    pub fn max_size(&self) -> i32 {
        self.max_size
    }

    /// Changes the page size hint used when iterating over items.
    pub fn set_max_size(&mut self, v: i32) {
        self.max_size = v;
    }

    /// The number of items fetched but not yet returned.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    async fn fill(&mut self, size: i32) -> Result<()> {
        tracing::debug!("fetching page with size={size}, token={:?}", self.token);
        match (self.fetch)(size, self.token.clone()).await {
            Ok((items, token)) => {
                self.buffer.extend(items);
                self.token = token;
                Ok(())
            }
            Err(e) => {
                tracing::debug!("fetching page failed: {e}");
                self.buffer.clear();
                let e = Arc::new(e);
                self.error = Some(e.clone());
                Err(Error::replay(&e))
            }
        }
    }

    fn recorded_error(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(Error::replay(e)),
            None => Ok(()),
        }
    }

    async fn next_item(&mut self) -> Option<Result<T>> {
        if self.mode == Some(Mode::Pages) {
            return Some(Err(Error::usage(UsageError::MixedModes)));
        }
        self.mode = Some(Mode::Items);
        if let Err(e) = self.recorded_error() {
            return Some(Err(e));
        }
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fill(self.max_size).await {
                return Some(Err(e));
            }
            // The last page may still have items, they are returned before
            // the paginator reports the end.
            if self.token.is_empty() {
                self.done = true;
            }
        }
    }

    async fn next_page(
        &mut self,
        page_size: i32,
        seed: Option<String>,
        dest: &mut Vec<T>,
    ) -> Result<String> {
        if self.mode == Some(Mode::Items) {
            return Err(Error::usage(UsageError::MixedModes));
        }
        if page_size <= 0 {
            return Err(Error::usage(UsageError::InvalidPageSize(page_size)));
        }
        self.mode = Some(Mode::Pages);
        self.recorded_error()?;
        if let Some(token) = seed {
            self.token = token;
        }
        if self.done {
            return Ok(String::new());
        }
        let want = page_size as usize;
        while self.buffer.len() < want {
            let size = (want - self.buffer.len()) as i32;
            self.fill(size).await?;
            if self.token.is_empty() {
                self.done = true;
                break;
            }
        }
        dest.extend(self.buffer.drain(..));
        Ok(self.token.clone())
    }
}

impl<T> std::fmt::Debug for PageInfo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageInfo")
            .field("token", &self.token)
            .field("max_size", &self.max_size)
            .field("remaining", &self.buffer.len())
            .field("mode", &self.mode)
            .field("done", &self.done)
            .field("error", &self.error)
            .finish()
    }
}

/// Types that expose their [PageInfo], so they can be used with a [Pager].
pub trait Pageable {
    type Item;

    fn page_info(&mut self) -> &mut PageInfo<Self::Item>;
}

/// Returns the items of a list call one at a time.
///
/// The paginator fetches a new page only when all the items of the previous
/// page have been returned. Once it returns `None` it always returns `None`.
/// After a failed fetch the paginator returns the same error on every call.
#[derive(Debug)]
pub struct ItemPaginator<T> {
    info: PageInfo<T>,
}

impl<T> ItemPaginator<T>
where
    T: Send + 'static,
{
    /// Creates a new paginator.
    ///
    /// # Parameters
    /// * `seed_token` - the token for the first fetch, use an empty string to
    ///   start from the first page.
    /// * `fetch` - fetches one page, given the page size hint and the
    ///   continuation token. A page size of zero lets the service choose.
    pub fn new<V, F, Fut, R>(seed_token: V, fetch: F) -> Self
    where
        V: Into<String>,
        F: FnMut(i32, String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: PageableResponse<PageItem = T> + Send + 'static,
    {
        Self {
            info: PageInfo::new(seed_token.into(), fetch),
        }
    }

    /// Returns the next item, `None` when there are no more items.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.info.next_item().await
    }

    /// The pagination state.
    pub fn page_info(&mut self) -> &mut PageInfo<T> {
        &mut self.info
    }

    /// Converts the paginator into a [futures::Stream] of items.
    #[cfg(feature = "unstable-stream")]
    pub fn into_stream(self) -> ItemStream<T> {
        // The stream ends after the first error.
        let stream = futures::stream::unfold(Some(self), |state| async move {
            let mut paginator = state?;
            match paginator.next().await? {
                Ok(item) => Some((Ok(item), Some(paginator))),
                Err(e) => Some((Err(e), None)),
            }
        });
        ItemStream {
            stream: Box::pin(stream),
        }
    }
}

impl<T> Pageable for ItemPaginator<T> {
    type Item = T;

    fn page_info(&mut self) -> &mut PageInfo<T> {
        &mut self.info
    }
}

/// Drives a paginator one page at a time.
///
/// # Example
/// ```
/// # use google_api_gax::paginator::{ItemPaginator, Page, Pager};
/// # use google_api_gax::error::Error;
/// async fn sample() -> google_api_gax::Result<()> {
///     let mut paginator = ItemPaginator::new("", |page_size, token: String| async move {
///         let start = token.parse::<i32>().unwrap_or(0);
///         let end = std::cmp::min(start + page_size, 5);
///         let next = if end == 5 { String::new() } else { end.to_string() };
///         Ok::<_, Error>(Page::new((start..end).collect::<Vec<_>>(), next))
///     });
///     let mut pager = Pager::new(&mut paginator, 2, "");
///     let mut page = Vec::new();
///     let token = pager.next_page(&mut page).await?;
///     println!("page={page:?}, resume with {token}");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Pager<'a, T> {
    info: &'a mut PageInfo<T>,
    page_size: i32,
    seed: Option<String>,
}

impl<'a, T> Pager<'a, T>
where
    T: Send + 'static,
{
    /// Creates a pager over `pageable`, starting at `page_token`.
    ///
    /// An empty `page_token` starts at the first page. The page size must be
    /// positive, otherwise [next_page][Pager::next_page] returns an error.
    pub fn new<P, V>(pageable: &'a mut P, page_size: i32, page_token: V) -> Self
    where
        P: Pageable<Item = T>,
        V: Into<String>,
    {
        Self {
            info: pageable.page_info(),
            page_size,
            seed: Some(page_token.into()),
        }
    }

    /// Fetches the next page, appending its items to `dest`.
    ///
    /// Fetches as many times as needed to return `page_size` items, unless
    /// the list ends first. Returns the continuation token for the following
    /// page, an empty token means there are no more pages.
    pub async fn next_page(&mut self, dest: &mut Vec<T>) -> Result<String> {
        self.info
            .next_page(self.page_size, self.seed.take(), dest)
            .await
    }
}

#[cfg(feature = "unstable-stream")]
pub use stream::ItemStream;

#[cfg(feature = "unstable-stream")]
mod stream {
    use crate::Result;
    use futures::Stream;
    use pin_project::pin_project;
    use std::pin::Pin;

    /// The items of a list call as a [futures::Stream].
    #[pin_project]
    pub struct ItemStream<T> {
        #[pin]
        pub(super) stream: Pin<Box<dyn Stream<Item = Result<T>> + Send>>,
    }

    impl<T> Stream for ItemStream<T> {
        type Item = Result<T>;

        fn poll_next(
            self: Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            self.project().stream.poll_next(cx)
        }
    }
}

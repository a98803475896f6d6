//! Lazy page-by-page traversal of device collections.
//!
//! StoreOnce Gen 3 splits large listings into pages. The first plain GET
//! returns the first page plus a `nextPageAvailable` marker and waypoint
//! cookies; follow-up pages are requested with `list=next` and those
//! cookies. [`Pager`] hides all of that: callers pull one item at a time
//! and pages are fetched on demand, with the usual expired-session
//! recovery applying to every page request.

use futures::Stream;
use reqwest::Method;
use tracing::warn;

use crate::error::RestResult;
use crate::rest::backend::Backend;
use crate::rest::client::Rest;
use crate::rest::options::{RequestBody, RequestOptions};
use crate::utils::xml::{first_text, fragments};
use crate::utils::CookieMap;

/// Items requested per continuation page.
/// Matches the largest page the Gen 3 REST service hands out.
const PAGE_SIZE: u32 = 1000;

/// Marker element the device uses to announce further pages.
const PAGE_MARKER: &str = "properties/nextPageAvailable";

#[derive(Debug, Clone, Copy, PartialEq)]
enum PageState {
    /// Nothing fetched yet.
    Initial,
    /// A page is loaded; `more` tells whether the device announced another.
    Loaded { more: bool },
    /// Iteration has ended, no more requests will be made.
    Done,
}

/// Lazy iterator over the elements of a paged device collection.
///
/// Borrows the client exclusively for its whole lifetime, so no other
/// request can interleave with the page fetches.
pub struct Pager<'a, B: Backend<Body = String>> {
    client: &'a mut Rest<B>,
    path: String,
    selector: String,
    filter: CookieMap,
    waypoint: CookieMap,
    page: Vec<String>,
    index: usize,
    state: PageState,
}

impl<'a, B: Backend<Body = String>> Pager<'a, B> {
    /// Next item, fetching the next page from the device when the current
    /// one is exhausted. `Ok(None)` means the collection is finished.
    pub async fn next(&mut self) -> RestResult<Option<String>> {
        loop {
            if self.index < self.page.len() {
                let item = std::mem::take(&mut self.page[self.index]);
                self.index += 1;
                return Ok(Some(item));
            }

            match self.state {
                PageState::Done => return Ok(None),
                PageState::Initial => self.load(false).await?,
                PageState::Loaded { more: false } => {
                    self.state = PageState::Done;
                    return Ok(None);
                }
                PageState::Loaded { more: true } => self.load(true).await?,
            }
        }
    }

    /// Fetch one page and refresh the pagination state.
    async fn load(&mut self, continuation: bool) -> RestResult<()> {
        let mut options = RequestOptions::new().with_cookies(&self.filter);
        if continuation {
            options = options
                .with_cookies(&self.waypoint)
                .with_param("list", "next")
                .with_param("count", PAGE_SIZE.to_string());
        }

        let exchange = match self
            .client
            .execute(Method::GET, &self.path, RequestBody::Empty, options)
            .await
        {
            Ok(exchange) => exchange,
            Err(err) => {
                self.state = PageState::Done;
                return Err(err);
            }
        };

        let body = exchange.body.unwrap_or_default();
        let more = match first_text(&body, PAGE_MARKER).as_deref() {
            Some("true") => {
                // Waypoint cookies only matter while the device promises
                // another page.
                self.waypoint = exchange.cookies;
                true
            }
            // A missing marker means a single-page answer.
            Some("false") | None => false,
            Some(other) => {
                warn!(
                    marker = other,
                    path = %self.path,
                    "unrecognized page marker, stopping after this page"
                );
                false
            }
        };

        self.page = fragments(&body, &self.selector);
        self.index = 0;

        if self.page.is_empty() {
            // No matching elements ends the iteration even when the marker
            // promised more.
            warn!(
                path = %self.path,
                selector = %self.selector,
                status = exchange.status,
                "no matching elements in device response, iteration stopped"
            );
            self.state = PageState::Done;
        } else {
            self.state = PageState::Loaded { more };
        }
        Ok(())
    }

    /// Consume the pager into a [`Stream`] of items.
    ///
    /// An error ends the stream after it is yielded.
    pub fn into_stream(self) -> impl Stream<Item = RestResult<String>> + 'a {
        futures::stream::unfold(self, |mut pager| async move {
            match pager.next().await {
                Ok(Some(item)) => Some((Ok(item), pager)),
                Ok(None) => None,
                Err(err) => Some((Err(err), pager)),
            }
        })
    }
}

impl<B: Backend<Body = String>> Rest<B> {
    /// Iterate over the elements selected by `selector` in the paged
    /// collection at `path`.
    pub fn iterate(&mut self, path: &str, selector: &str) -> Pager<'_, B> {
        self.iterate_filtered(path, selector, CookieMap::new())
    }

    /// Like [`Rest::iterate`], with filter cookies sent on every page
    /// request. Waypoint cookies win over filter cookies of the same name.
    pub fn iterate_filtered(
        &mut self,
        path: &str,
        selector: &str,
        filter: CookieMap,
    ) -> Pager<'_, B> {
        Pager {
            client: self,
            path: path.to_string(),
            selector: selector.to_string(),
            filter,
            waypoint: CookieMap::new(),
            page: Vec::new(),
            index: 0,
            state: PageState::Initial,
        }
    }
}

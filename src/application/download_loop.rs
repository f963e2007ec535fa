//! Paginated download loop shared by both portals
//!
//! Per page: count the download elements, fetch each one in order, then
//! follow the enabled "Next" control until there is none. A failed element
//! is logged and skipped; it never ends the run.

use std::time::Duration;

use tracing::{debug, info};

use crate::domain::{Portal, SessionState};
use crate::infrastructure::{BrowserResult, Locator, PortalPage, Scope, WaitState};

use super::session::{RunContext, SessionResult};

const SCROLL_TO_TOP: &str = "window.scrollTo(0, 0)";

/// Where the result table lives and how patient to be with it
#[derive(Debug, Clone)]
pub struct PortalLayout {
    pub download_links: Locator,
    pub next_page: Locator,
    /// Waited for before counting links on every page
    pub page_ready: Locator,
    pub page_ready_timeout: Duration,
    /// Table rows; the first one identifies the page currently shown
    pub rows: Locator,
    pub rows_timeout: Duration,
    pub link_visible_timeout: Duration,
    pub download_timeout: Duration,
    /// Jump back to the top of the document after paging (DataTables keeps the scroll offset)
    pub scroll_to_top: bool,
}

/// Walks the result pages of one run
pub struct PageDownloader<'a> {
    layout: &'a PortalLayout,
}

impl<'a> PageDownloader<'a> {
    pub fn new(layout: &'a PortalLayout) -> Self {
        Self { layout }
    }

    fn page_summary(portal: Portal, page_number: u32, count: usize) -> String {
        match portal {
            Portal::Nip => format!("Found {count} download buttons on page {page_number}"),
            Portal::Isw => format!("Page {page_number} – {count} download links found"),
        }
    }

    /// Download every element on every page; returns once there is no next page
    pub async fn run(&self, page: &mut dyn PortalPage, ctx: &mut RunContext) -> SessionResult<()> {
        let layout = self.layout;
        let mut page_number = 1u32;
        ctx.advance(SessionState::Paginating(page_number));

        loop {
            page.wait_for(&layout.page_ready, WaitState::Visible, layout.page_ready_timeout)
                .await?;
            let count = page.count(&layout.download_links).await?;
            let portal = ctx.portal();

            if portal == Portal::Nip {
                ctx.log.info(Self::page_summary(portal, page_number, count));
            }
            if count == 0 {
                ctx.log.warning("⚠️  no download buttons found on this page");
                break;
            }
            if portal == Portal::Isw {
                ctx.log.info(Self::page_summary(portal, page_number, count));
            }

            for index in 0..count {
                self.download_one(page, ctx, index).await;
            }

            if page.count(&layout.next_page).await? == 0 {
                debug!("No enabled next control after page {}", page_number);
                break;
            }

            page_number += 1;
            match portal {
                Portal::Nip => ctx.log.info(format!("➡️  Page {page_number}")),
                Portal::Isw => info!(target: "portal::isw", "➡️  Page {}", page_number),
            }
            // The old rows stay in place until the new page lands
            let first_row = page.text_content(&layout.rows, 0).await?;
            page.click(&layout.next_page, 0).await?;
            ctx.advance(SessionState::Paginating(page_number));
            page.wait_for_change(&layout.rows, first_row.as_deref(), layout.rows_timeout)
                .await?;

            if layout.scroll_to_top {
                page.evaluate(&Scope::Page, SCROLL_TO_TOP).await?;
            }
            page.wait_for(&layout.rows, WaitState::Visible, layout.rows_timeout)
                .await?;
        }

        ctx.advance(SessionState::Done);
        Ok(())
    }

    /// Fetch a single element; failures become a warning naming its 1-based position
    async fn download_one(&self, page: &mut dyn PortalPage, ctx: &mut RunContext, index: usize) {
        if let Err(e) = self.fetch(page, ctx, index).await {
            ctx.log
                .warning(format!("⚠️  Download failed for link {} — {}", index + 1, e));
        }
    }

    async fn fetch(
        &self,
        page: &mut dyn PortalPage,
        ctx: &mut RunContext,
        index: usize,
    ) -> SessionResult<()> {
        let links = &self.layout.download_links;
        self.reveal(page, links, index).await?;

        let pending = page
            .click_for_download(links, index, self.layout.download_timeout)
            .await?;
        let outcome = ctx.sink.save(pending).await?;

        let name = outcome.file.final_name.clone();
        ctx.saved.push(outcome.file);
        let total = ctx.total_saved();
        ctx.log.info(format!("⬇️  {total:>3} saved {name}"));
        Ok(())
    }

    async fn reveal(
        &self,
        page: &mut dyn PortalPage,
        links: &Locator,
        index: usize,
    ) -> BrowserResult<()> {
        page.wait_for_nth(links, index, WaitState::Visible, self.layout.link_visible_timeout)
            .await?;
        page.scroll_into_view(links, index).await
    }
}

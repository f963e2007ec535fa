//! NIP portal flow
//!
//! Login form, "Report → Transaction Report", a daterangepicker filter and a
//! DataTables-paginated result table with one download button per row.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{Portal, RunRequest, SessionState};
use crate::infrastructure::{Locator, PortalCredentials, PortalPage, Scope, TimeoutConfig, WaitState};

use super::download_loop::{PageDownloader, PortalLayout};
use super::session::{PortalSession, RunContext, SessionOutcome, SessionResult, within};

pub mod selectors {
    pub const LOGIN_PATH: &str = "main.jspx";
    pub const EMAIL: &str = "#email";
    pub const PASSWORD: &str = "#password";
    pub const LOGIN_BUTTON: &str = "button";
    pub const MENU_LINK: &str = "a";
    pub const DATE_FILTER: &str = "#settlementDateFilter";
    pub const RANGE_START: &str = "input[name='daterangepicker_start']";
    pub const RANGE_END: &str = "input[name='daterangepicker_end']";
    pub const APPLY_BUTTON: &str = "button";
    pub const DOWNLOAD_LINKS: &str = "a:has(i.fa-download), button:has(i.fa-download)";
    pub const NEXT_PAGE: &str = "li.paginate_button:not(.disabled) a";
    pub const TABLE_ROWS: &str = "tbody tr";
    pub const RELOAD_TABLE: &str = "window.transactionReportTable.reload()";
}

const REPORT_MENU: &str = "Report";
const TRANSACTION_REPORT: &str = "Transaction Report";
const LIST_HEADING: &str = "Transaction Report :: List";

/// Portal date format for the range picker
pub fn picker_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub struct NipSession {
    credentials: PortalCredentials,
    timeouts: TimeoutConfig,
}

impl NipSession {
    pub fn new(credentials: PortalCredentials, timeouts: TimeoutConfig) -> Self {
        Self {
            credentials,
            timeouts,
        }
    }

    pub fn layout(&self) -> PortalLayout {
        let rows = Locator::css(selectors::TABLE_ROWS);
        PortalLayout {
            download_links: Locator::css(selectors::DOWNLOAD_LINKS),
            next_page: Locator::css(selectors::NEXT_PAGE).with_text("Next"),
            page_ready: rows.clone(),
            page_ready_timeout: self.timeouts.row_refresh,
            rows,
            rows_timeout: self.timeouts.link_visible,
            link_visible_timeout: self.timeouts.link_visible,
            download_timeout: self.timeouts.nip_download,
            scroll_to_top: true,
        }
    }

    async fn login(&self, page: &mut dyn PortalPage) -> SessionResult<()> {
        let t = &self.timeouts;
        page.goto(&self.credentials.url_with_path(selectors::LOGIN_PATH), t.navigation)
            .await?;

        let email = Locator::css(selectors::EMAIL);
        page.wait_for(&email, WaitState::Visible, t.navigation).await?;
        page.fill(&email, &self.credentials.username).await?;
        page.fill(&Locator::css(selectors::PASSWORD), &self.credentials.password)
            .await?;
        page.click(&Locator::css(selectors::LOGIN_BUTTON).with_text("Login"), 0)
            .await?;
        Ok(())
    }

    async fn open_report_list(&self, page: &mut dyn PortalPage) -> SessionResult<()> {
        let t = &self.timeouts;
        for label in [REPORT_MENU, TRANSACTION_REPORT] {
            let link = Locator::css(selectors::MENU_LINK).with_text(label);
            page.wait_for(&link, WaitState::Visible, t.element).await?;
            page.click(&link, 0).await?;
        }

        let heading = Locator::css("body").with_text(LIST_HEADING);
        page.wait_for(&heading, WaitState::Attached, t.element).await?;
        Ok(())
    }

    async fn apply_date_range(
        &self,
        page: &mut dyn PortalPage,
        ctx: &mut RunContext,
        request: &RunRequest,
    ) -> SessionResult<()> {
        let t = &self.timeouts;
        let start = picker_date(request.start_date);
        let end = picker_date(request.end_date);
        ctx.log.info(format!("📅  From: {start}"));
        ctx.log.info(format!("📅  To:   {end}"));

        let filter = Locator::css(selectors::DATE_FILTER);
        page.wait_for(&filter, WaitState::Visible, t.element).await?;
        page.click(&filter, 0).await?;

        let range_start = Locator::css(selectors::RANGE_START);
        page.wait_for(&range_start, WaitState::Attached, t.element).await?;
        page.fill(&range_start, &start).await?;
        page.fill(&Locator::css(selectors::RANGE_END), &end).await?;

        let apply = Locator::css(selectors::APPLY_BUTTON).with_text("Apply");
        page.wait_for(&apply, WaitState::Visible, t.element).await?;
        page.click(&apply, 0).await?;

        page.evaluate(&Scope::Page, selectors::RELOAD_TABLE).await?;
        ctx.log.info("Reload triggered");
        Ok(())
    }
}

#[async_trait]
impl PortalSession for NipSession {
    fn portal(&self) -> Portal {
        Portal::Nip
    }

    async fn drive(
        &self,
        page: &mut dyn PortalPage,
        ctx: &mut RunContext,
        request: &RunRequest,
    ) -> SessionResult<SessionOutcome> {
        let t = &self.timeouts;

        ctx.log.info("Navigating to login …");
        within("login", t.login_step, self.login(page)).await?;
        ctx.advance(SessionState::LoggedIn);

        within("report menu", t.menu_step, self.open_report_list(page)).await?;
        ctx.advance(SessionState::ReportMenuOpen);

        within("date filter", t.filter_step, self.apply_date_range(page, ctx, request)).await?;
        ctx.advance(SessionState::DateRangeSet);

        let layout = self.layout();
        page.wait_for(&layout.download_links, WaitState::Visible, t.nip_table_ready)
            .await?;
        ctx.log.info("Table ready – starting downloads");
        ctx.advance(SessionState::TableLoaded);

        PageDownloader::new(&layout).run(page, ctx).await?;
        ctx.log_finished();
        Ok(SessionOutcome::Completed)
    }
}

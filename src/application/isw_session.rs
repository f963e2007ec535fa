//! ISW portal flow
//!
//! Passport login into a frameset page (`header`, `menu`, `body`). Navigation
//! happens in the menu frame; the search form and the result table live in
//! the body frame. An empty search ends the run with a retry prompt until the
//! caller has used up [`defaults::ISW_MAX_ATTEMPTS`].

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use crate::domain::{Portal, RunRequest, SessionState};
use crate::infrastructure::config::defaults;
use crate::infrastructure::{Locator, PortalCredentials, PortalPage, TimeoutConfig, WaitState};

use super::download_loop::{PageDownloader, PortalLayout};
use super::nip_session::picker_date;
use super::session::{PortalSession, RunContext, SessionOutcome, SessionResult, within};

pub mod selectors {
    pub const HEADER_FRAME: &str = "header";
    pub const MENU_FRAME: &str = "menu";
    pub const BODY_FRAME: &str = "body";
    pub const PASSPORT_BUTTON: &str = "a.passport-button";
    pub const USERNAME: &str = "#username";
    pub const PASSWORD: &str = "#password";
    pub const SIGN_IN_BUTTON: &str = "button.btn-dark-blue";
    pub const MENU_LINK: &str = "td.menuLink";
    pub const INNER_LINK: &str = "a.innerLink";
    pub const DATE_START: &str = "input[name='dateStart']";
    pub const DATE_END: &str = "input[name='dateEnd']";
    pub const REPORT_TYPE: &str = "select#reportTypeId";
    pub const SEARCH_BUTTON: &str = "input#search";
    pub const DOWNLOAD_LINKS: &str = "a[href*='reportDownload.do']";
    pub const NEXT_PAGE: &str = "a";
    pub const TABLE_ROWS: &str = "tbody tr";
}

pub const MISSING_MENU_FRAME: &str = "Could not find a frame containing the Reports menu!";
pub const TOO_OLD: &str =
    "You cannot download reports older than 90 days. Enter a date range within the last 90 days.";
pub const NO_REPORTS: &str = "No reports found for this type and date range.";
pub const ATTEMPTS_EXCEEDED: &str = "Maximum number of attempts exceeded.";
pub const RETRY_PROMPT: &str =
    "No reports found. Please choose to either try another report type or a different date range.";

pub struct IswSession {
    credentials: PortalCredentials,
    timeouts: TimeoutConfig,
    today: NaiveDate,
}

impl IswSession {
    pub fn new(credentials: PortalCredentials, timeouts: TimeoutConfig) -> Self {
        Self {
            credentials,
            timeouts,
            today: Local::now().date_naive(),
        }
    }

    /// Fix the date the 90-day window is measured from
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn layout(&self) -> PortalLayout {
        let rows = Locator::css(selectors::TABLE_ROWS).in_frame(selectors::BODY_FRAME);
        PortalLayout {
            page_ready: rows.clone(),
            download_links: Locator::css(selectors::DOWNLOAD_LINKS)
                .in_frame(selectors::BODY_FRAME),
            next_page: Locator::css(selectors::NEXT_PAGE)
                .with_text("Next")
                .in_frame(selectors::BODY_FRAME),
            page_ready_timeout: self.timeouts.isw_table_ready,
            rows,
            rows_timeout: self.timeouts.row_refresh,
            link_visible_timeout: self.timeouts.link_visible,
            download_timeout: self.timeouts.isw_download,
            scroll_to_top: false,
        }
    }

    /// True when the start date lies further back than the portal keeps reports
    pub fn is_too_old(&self, start_date: NaiveDate) -> bool {
        (self.today - start_date).num_days() > defaults::ISW_MAX_REPORT_AGE_DAYS
    }

    async fn login(&self, page: &mut dyn PortalPage) -> SessionResult<()> {
        let t = &self.timeouts;
        page.goto(self.credentials.portal_url.as_str(), t.navigation).await?;

        let passport = Locator::css(selectors::PASSPORT_BUTTON);
        page.wait_for(&passport, WaitState::Visible, t.navigation).await?;
        page.click(&passport, 0).await?;

        let username = Locator::css(selectors::USERNAME);
        let password = Locator::css(selectors::PASSWORD);
        page.wait_for(&username, WaitState::Visible, t.navigation).await?;
        page.wait_for(&password, WaitState::Visible, t.navigation).await?;
        page.fill(&username, &self.credentials.username).await?;
        page.fill(&password, &self.credentials.password).await?;
        page.click(&Locator::css(selectors::SIGN_IN_BUTTON).with_text("Sign in"), 0)
            .await?;
        Ok(())
    }

    /// Wait for the frameset; false when the menu frame never shows up
    async fn frames_ready(&self, page: &mut dyn PortalPage) -> SessionResult<bool> {
        let menu_body = Locator::css("body").in_frame(selectors::MENU_FRAME);
        if let Err(e) = page
            .wait_for(&menu_body, WaitState::Attached, self.timeouts.element)
            .await
        {
            debug!("Menu frame wait ended with: {}", e);
        }

        for frame in [selectors::HEADER_FRAME, selectors::BODY_FRAME] {
            if !page.has_frame(frame).await? {
                warn!(target: "portal::isw", "Frame '{}' is missing", frame);
            }
        }
        Ok(page.has_frame(selectors::MENU_FRAME).await?)
    }

    async fn open_reports_root(&self, page: &mut dyn PortalPage) -> SessionResult<()> {
        let t = &self.timeouts;
        let steps = [
            (selectors::MENU_LINK, "Reports"),
            (selectors::INNER_LINK, "Reports Root"),
        ];
        for (css, text) in steps {
            let link = Locator::css(css).with_text(text).in_frame(selectors::MENU_FRAME);
            page.wait_for(&link, WaitState::Visible, t.element).await?;
            page.click(&link, 0).await?;
        }
        Ok(())
    }

    async fn apply_filter(
        &self,
        page: &mut dyn PortalPage,
        ctx: &mut RunContext,
        request: &RunRequest,
        report_code: &str,
    ) -> SessionResult<()> {
        let t = &self.timeouts;
        let body = |css: &str| Locator::css(css).in_frame(selectors::BODY_FRAME);

        let start = body(selectors::DATE_START);
        let end = body(selectors::DATE_END);
        page.wait_for(&start, WaitState::Attached, t.element).await?;
        page.wait_for(&end, WaitState::Attached, t.element).await?;
        page.fill(&start, &picker_date(request.start_date)).await?;
        page.fill(&end, &picker_date(request.end_date)).await?;
        ctx.log.info("Calendar dates filled and applied");

        let report_type = body(selectors::REPORT_TYPE);
        page.wait_for(&report_type, WaitState::Attached, t.element).await?;
        page.select_option(&report_type, report_code).await?;
        ctx.log.info(format!("Report type set to: {report_code}"));

        page.click(&body(selectors::SEARCH_BUTTON), 0).await?;
        ctx.log.info("Search triggered by button click");
        Ok(())
    }

    /// Number of download links once the search has settled; zero if none appear in time
    async fn result_count(&self, page: &mut dyn PortalPage) -> SessionResult<usize> {
        let links = Locator::css(selectors::DOWNLOAD_LINKS).in_frame(selectors::BODY_FRAME);
        match page
            .wait_for(&links, WaitState::Attached, self.timeouts.isw_results)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_timeout() => return Ok(0),
            Err(e) => return Err(e.into()),
        }
        Ok(page.count(&links).await?)
    }

    fn no_results(&self, ctx: &mut RunContext, previous_attempts: u32) -> SessionOutcome {
        let attempts = previous_attempts.saturating_add(1);
        ctx.log.error(NO_REPORTS);

        let exhausted = attempts >= defaults::ISW_MAX_ATTEMPTS;
        if exhausted {
            ctx.log.error(ATTEMPTS_EXCEEDED);
        }
        ctx.advance(SessionState::Done);
        SessionOutcome::NoResults {
            attempts,
            exhausted,
        }
    }
}

#[async_trait]
impl PortalSession for IswSession {
    fn portal(&self) -> Portal {
        Portal::Isw
    }

    async fn drive(
        &self,
        page: &mut dyn PortalPage,
        ctx: &mut RunContext,
        request: &RunRequest,
    ) -> SessionResult<SessionOutcome> {
        let t = &self.timeouts;
        let report_code = request
            .report_type
            .map(|r| r.option_value())
            .unwrap_or_default();

        ctx.log.info("Navigating to login …");
        within("login", t.login_step, self.login(page)).await?;
        ctx.advance(SessionState::LoggedIn);

        if !self.frames_ready(page).await? {
            ctx.log.error(MISSING_MENU_FRAME);
            ctx.advance(SessionState::Failed);
            return Ok(SessionOutcome::Aborted {
                reason: MISSING_MENU_FRAME.to_string(),
            });
        }

        within("report menu", t.menu_step, self.open_reports_root(page)).await?;
        ctx.advance(SessionState::ReportMenuOpen);

        // Advisory only: the portal itself rejects the search if it minds
        if self.is_too_old(request.start_date) {
            ctx.log.error(TOO_OLD);
        }

        within(
            "search filter",
            t.filter_step,
            self.apply_filter(page, ctx, request, &report_code),
        )
        .await?;
        ctx.advance(SessionState::DateRangeSet);

        if self.result_count(page).await? == 0 {
            return Ok(self.no_results(ctx, request.previous_attempts));
        }
        ctx.log.info("Table reloaded – starting downloads");
        ctx.advance(SessionState::TableLoaded);

        let layout = self.layout();
        PageDownloader::new(&layout).run(page, ctx).await?;
        ctx.log_finished();
        Ok(SessionOutcome::Completed)
    }
}

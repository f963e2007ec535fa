//! Chromium driver over the DevTools protocol
//!
//! Element queries are evaluated as generated JavaScript against either the
//! top document or a named frame's document, which keeps frame-scoped lookups
//! and text filters uniform. Downloads are captured with the browser-level
//! download behaviour and its `downloadWillBegin` / `downloadProgress` events.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use super::{
    BrowserError, BrowserLauncher, BrowserResult, LaunchOptions, Locator, POLL_INTERVAL,
    PendingDownload, PortalPage, Scope, WaitState,
};

fn cdp_error(err: CdpError) -> BrowserError {
    match err {
        CdpError::JavascriptException(details) => BrowserError::Script(details.text.clone()),
        other => BrowserError::Protocol(other.to_string()),
    }
}

/// JSON-encode a value so it can be embedded in a script as a literal
fn js_literal(value: &str) -> String {
    Value::from(value).to_string()
}

/// Expression yielding the window of `scope`, or null when the frame is absent
fn window_expr(scope: &Scope) -> String {
    match scope {
        Scope::Page => "window".to_string(),
        Scope::Frame(name) => {
            let name = js_literal(name);
            format!(
                "(() => {{ try {{ \
                   if (window.frames[{name}]) return window.frames[{name}]; \
                   const el = document.querySelector('frame[name=' + JSON.stringify({name}) + '], iframe[name=' + JSON.stringify({name}) + ']'); \
                   return el ? el.contentWindow : null; \
                 }} catch (e) {{ return null; }} }})()"
            )
        }
    }
}

/// Wrap `body` so it runs with `els` bound to the elements matching `locator`.
/// `body` must return an object shaped like [`ScriptOutcome`].
fn element_script(locator: &Locator, body: &str) -> String {
    let text = locator.text().map_or_else(|| "null".to_string(), js_literal);
    format!(
        "(() => {{ \
           const win = {win}; \
           if (!win || !win.document) return {{ ok: false, reason: 'frame' }}; \
           const doc = win.document; \
           const text = {text}; \
           const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length) \
               && win.getComputedStyle(el).visibility !== 'hidden'; \
           const els = Array.from(doc.querySelectorAll({css})) \
               .filter((el) => text === null || (el.textContent || '').includes(text)); \
           {body} \
         }})()",
        win = window_expr(locator.scope()),
        css = js_literal(locator.css_selector()),
    )
}

#[derive(Debug, Default, Deserialize)]
struct ScriptOutcome {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    text: Option<String>,
}

/// Browser download behaviour: save into `staging_dir` and emit progress events
fn download_behavior(staging_dir: &Path) -> BrowserResult<SetDownloadBehaviorParams> {
    SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(staging_dir.to_string_lossy().into_owned())
        .events_enabled(true)
        .build()
        .map_err(BrowserError::Protocol)
}

/// Launches a local Chrome/Chromium per run
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: LaunchOptions) -> BrowserResult<Box<dyn PortalPage>> {
        let mut builder = BrowserConfig::builder().request_timeout(options.request_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The handler drives the websocket connection and must be polled for the whole session
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp_error)?;
        browser
            .execute(download_behavior(&options.staging_dir)?)
            .await
            .map_err(cdp_error)?;

        info!(
            "🚀 Browser launched (headless: {}, staging: {:?})",
            options.headless, options.staging_dir
        );

        Ok(Box::new(ChromiumPage {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler_task),
            staging_dir: options.staging_dir,
        }))
    }
}

/// A single Chromium tab plus the browser process that owns it
pub struct ChromiumPage {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    staging_dir: PathBuf,
}

impl ChromiumPage {
    fn page(&self) -> BrowserResult<&Page> {
        self.page.as_ref().ok_or(BrowserError::Closed)
    }

    fn browser(&self) -> BrowserResult<&Browser> {
        self.browser.as_ref().ok_or(BrowserError::Closed)
    }

    async fn run(&self, script: String) -> BrowserResult<ScriptOutcome> {
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Script)?;
        let result = self
            .page()?
            .evaluate_expression(params)
            .await
            .map_err(cdp_error)?;
        result
            .into_value::<ScriptOutcome>()
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    /// Run a script expected to act on the `index`-th element
    async fn act(&self, locator: &Locator, index: usize, body: &str) -> BrowserResult<()> {
        let body = format!(
            "const el = els[{index}]; \
             if (!el) return {{ ok: false, reason: 'missing' }}; \
             {body}"
        );
        let outcome = self.run(element_script(locator, &body)).await?;
        if outcome.ok {
            return Ok(());
        }
        match outcome.reason.as_deref() {
            Some("frame") => Err(frame_missing(locator.scope())),
            Some("missing") => Err(BrowserError::ElementNotFound {
                locator: locator.to_string(),
                index,
            }),
            other => Err(BrowserError::Script(format!(
                "action on {} failed: {}",
                locator,
                other.unwrap_or("unknown reason")
            ))),
        }
    }
}

fn frame_missing(scope: &Scope) -> BrowserError {
    match scope {
        Scope::Frame(name) => BrowserError::FrameNotFound(name.clone()),
        Scope::Page => BrowserError::Script("top document unavailable".to_string()),
    }
}

#[async_trait]
impl PortalPage for ChromiumPage {
    async fn goto(&mut self, url: &str, limit: Duration) -> BrowserResult<()> {
        let page = self.page()?;
        timeout(limit, page.goto(url))
            .await
            .map_err(|_| BrowserError::timeout(format!("navigation to {url}"), limit))?
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        limit: Duration,
    ) -> BrowserResult<()> {
        self.wait_for_nth(locator, 0, state, limit).await
    }

    async fn wait_for_nth(
        &mut self,
        locator: &Locator,
        index: usize,
        state: WaitState,
        limit: Duration,
    ) -> BrowserResult<()> {
        let check = match state {
            WaitState::Attached => "true",
            WaitState::Visible => "visible(el)",
        };
        let script = element_script(
            locator,
            &format!("const el = els[{index}]; return {{ ok: !!el && {check} }};"),
        );

        let deadline = Instant::now() + limit;
        loop {
            match self.run(script.clone()).await {
                Ok(outcome) if outcome.ok => return Ok(()),
                Ok(_) => {}
                // The document may be mid-navigation; keep polling until the deadline
                Err(e) => debug!("Wait on {} not ready yet: {}", locator, e),
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::timeout(locator, limit));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn count(&mut self, locator: &Locator) -> BrowserResult<usize> {
        let outcome = self
            .run(element_script(locator, "return { ok: true, count: els.length };"))
            .await?;
        if !outcome.ok {
            return Err(frame_missing(locator.scope()));
        }
        Ok(outcome.count.unwrap_or(0))
    }

    async fn text_content(
        &mut self,
        locator: &Locator,
        index: usize,
    ) -> BrowserResult<Option<String>> {
        let body = format!(
            "const el = els[{index}]; \
             return {{ ok: true, text: el ? (el.textContent || '') : null }};"
        );
        let outcome = self.run(element_script(locator, &body)).await?;
        if !outcome.ok {
            return Err(frame_missing(locator.scope()));
        }
        Ok(outcome.text)
    }

    async fn fill(&mut self, locator: &Locator, value: &str) -> BrowserResult<()> {
        let body = format!(
            "if (el.focus) el.focus(); \
             el.value = {value}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return {{ ok: true }};",
            value = js_literal(value)
        );
        self.act(locator, 0, &body).await
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> BrowserResult<()> {
        self.act(locator, index, "el.click(); return { ok: true };")
            .await
    }

    async fn select_option(&mut self, locator: &Locator, value: &str) -> BrowserResult<()> {
        let body = format!(
            "el.value = {value}; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return {{ ok: el.value === {value}, reason: 'option' }};",
            value = js_literal(value)
        );
        self.act(locator, 0, &body).await
    }

    async fn scroll_into_view(&mut self, locator: &Locator, index: usize) -> BrowserResult<()> {
        self.act(
            locator,
            index,
            "el.scrollIntoView({ block: 'center', inline: 'nearest' }); return { ok: true };",
        )
        .await
    }

    async fn evaluate(&mut self, scope: &Scope, script: &str) -> BrowserResult<()> {
        let wrapped = format!(
            "(() => {{ \
               const win = {win}; \
               if (!win) return {{ ok: false, reason: 'frame' }}; \
               win.eval({script}); \
               return {{ ok: true }}; \
             }})()",
            win = window_expr(scope),
            script = js_literal(script),
        );
        let outcome = self.run(wrapped).await?;
        if outcome.ok {
            Ok(())
        } else {
            Err(frame_missing(scope))
        }
    }

    async fn has_frame(&mut self, name: &str) -> BrowserResult<bool> {
        let script = format!(
            "(() => {{ const win = {win}; return {{ ok: !!win }}; }})()",
            win = window_expr(&Scope::Frame(name.to_string()))
        );
        Ok(self.run(script).await?.ok)
    }

    async fn click_for_download(
        &mut self,
        locator: &Locator,
        index: usize,
        limit: Duration,
    ) -> BrowserResult<PendingDownload> {
        // Download events are emitted on the browser target; subscribe before clicking
        let browser = self.browser()?;
        let mut begins = browser
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(cdp_error)?;
        let mut progress = browser
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(cdp_error)?;

        self.click(locator, index).await?;

        let staging_dir = self.staging_dir.clone();
        let completion = async move {
            let begin = begins.next().await.ok_or(BrowserError::Closed)?;
            debug!("Download started: {} ({})", begin.suggested_filename, begin.url);

            while let Some(event) = progress.next().await {
                if event.guid != begin.guid {
                    continue;
                }
                match &event.state {
                    DownloadProgressState::Completed => {
                        return Ok(PendingDownload {
                            suggested_filename: begin.suggested_filename.clone(),
                            path: staging_dir.join(&begin.suggested_filename),
                        });
                    }
                    DownloadProgressState::Canceled => {
                        return Err(BrowserError::DownloadCancelled(
                            begin.suggested_filename.clone(),
                        ));
                    }
                    DownloadProgressState::InProgress => {}
                }
            }
            Err(BrowserError::Closed)
        };

        timeout(limit, completion)
            .await
            .map_err(|_| BrowserError::timeout(format!("download from {locator}"), limit))?
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close failed: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Waiting for browser exit failed: {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        Ok(())
    }
}

//! Scripted in-memory portal shared by the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use report_downloader_lib::infrastructure::{
    AppConfig, BrowserError, BrowserLauncher, BrowserResult, LaunchOptions, Locator,
    PendingDownload, PortalPage, Scope, WaitState,
};

/// What the fake portal shows
#[derive(Debug, Clone)]
pub struct PortalScript {
    /// Download elements on each result page, in order
    pub pages: Vec<usize>,
    /// (0-based page, 0-based element) pairs whose download fails
    pub failing: HashSet<(usize, usize)>,
    pub frames: Vec<String>,
    /// CSS selectors that never appear
    pub missing: HashSet<String>,
    /// Overrides the generated file name of a (page, element) download
    pub file_names: HashMap<(usize, usize), String>,
    pub launch_fails: bool,
    /// How long after a Next click the following page replaces the current one
    pub page_switch_delay: Duration,
}

impl Default for PortalScript {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            failing: HashSet::new(),
            frames: vec!["header".into(), "menu".into(), "body".into()],
            missing: HashSet::new(),
            file_names: HashMap::new(),
            launch_fails: false,
            page_switch_delay: Duration::ZERO,
        }
    }
}

impl PortalScript {
    pub fn with_pages(pages: &[usize]) -> Self {
        Self {
            pages: pages.to_vec(),
            ..Self::default()
        }
    }

    pub fn failing_at(mut self, page: usize, element: usize) -> Self {
        self.failing.insert((page, element));
        self
    }

    pub fn without_frame(mut self, name: &str) -> Self {
        self.frames.retain(|f| f != name);
        self
    }

    pub fn without(mut self, css: &str) -> Self {
        self.missing.insert(css.to_string());
        self
    }

    pub fn switching_after(mut self, delay: Duration) -> Self {
        self.page_switch_delay = delay;
        self
    }

    pub fn file_name(&self, page: usize, element: usize) -> String {
        self.file_names
            .get(&(page, element))
            .cloned()
            .unwrap_or_else(|| format!("report_p{}_{}.csv", page + 1, element + 1))
    }
}

/// Everything the session did to the fake portal
#[derive(Debug, Default)]
pub struct PortalRecord {
    pub launches: usize,
    pub headless: Option<bool>,
    pub visited: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub selected: Vec<(String, String)>,
    pub scripts: Vec<String>,
    pub next_clicks: usize,
    pub download_attempts: usize,
    pub closed: bool,
}

#[derive(Clone, Default)]
pub struct MockLauncher {
    pub script: Arc<PortalScript>,
    pub record: Arc<Mutex<PortalRecord>>,
}

impl MockLauncher {
    pub fn new(script: PortalScript) -> Self {
        Self {
            script: Arc::new(script),
            record: Arc::new(Mutex::new(PortalRecord::default())),
        }
    }

    pub fn closed(&self) -> bool {
        self.record.lock().unwrap().closed
    }

    pub fn next_clicks(&self) -> usize {
        self.record.lock().unwrap().next_clicks
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, options: LaunchOptions) -> BrowserResult<Box<dyn PortalPage>> {
        {
            let mut record = self.record.lock().unwrap();
            record.launches += 1;
            record.headless = Some(options.headless);
        }
        if self.script.launch_fails {
            return Err(BrowserError::Launch("no browser binary".to_string()));
        }
        Ok(Box::new(MockPage {
            script: Arc::clone(&self.script),
            record: Arc::clone(&self.record),
            staging_dir: options.staging_dir,
            current_page: 0,
            pending_switch: None,
        }))
    }
}

pub struct MockPage {
    script: Arc<PortalScript>,
    record: Arc<Mutex<PortalRecord>>,
    staging_dir: PathBuf,
    current_page: usize,
    /// Page index the table turns into once the instant has passed
    pending_switch: Option<(usize, Instant)>,
}

impl MockPage {
    fn is_download(locator: &Locator) -> bool {
        let css = locator.css_selector();
        css.contains("fa-download") || css.contains("reportDownload.do")
    }

    fn is_next(locator: &Locator) -> bool {
        locator.text() == Some("Next")
    }

    /// Apply a Next click whose page has had time to arrive
    fn settle(&mut self) {
        if let Some((page, at)) = self.pending_switch {
            if Instant::now() >= at {
                self.current_page = page;
                self.pending_switch = None;
            }
        }
    }

    fn resolve(&mut self, locator: &Locator) -> BrowserResult<usize> {
        self.settle();
        if let Scope::Frame(name) = locator.scope() {
            if !self.script.frames.iter().any(|f| f == name) {
                return Err(BrowserError::FrameNotFound(name.clone()));
            }
        }
        if self.script.missing.contains(locator.css_selector()) {
            return Ok(0);
        }
        if Self::is_download(locator) {
            return Ok(self.script.pages.get(self.current_page).copied().unwrap_or(0));
        }
        if Self::is_next(locator) {
            return Ok(usize::from(self.current_page + 1 < self.script.pages.len()));
        }
        if locator.css_selector() == "tbody tr" {
            return Ok(usize::from(!self.script.pages.is_empty()));
        }
        Ok(1)
    }

    fn require(&mut self, locator: &Locator, index: usize) -> BrowserResult<()> {
        if index < self.resolve(locator)? {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound {
                locator: locator.to_string(),
                index,
            })
        }
    }
}

#[async_trait]
impl PortalPage for MockPage {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> BrowserResult<()> {
        self.record.lock().unwrap().visited.push(url.to_string());
        Ok(())
    }

    async fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> BrowserResult<()> {
        self.wait_for_nth(locator, 0, state, timeout).await
    }

    async fn wait_for_nth(
        &mut self,
        locator: &Locator,
        index: usize,
        _state: WaitState,
        timeout: Duration,
    ) -> BrowserResult<()> {
        match self.resolve(locator) {
            Ok(count) if index < count => Ok(()),
            _ => Err(BrowserError::timeout(locator, timeout)),
        }
    }

    async fn count(&mut self, locator: &Locator) -> BrowserResult<usize> {
        self.resolve(locator)
    }

    async fn text_content(
        &mut self,
        locator: &Locator,
        index: usize,
    ) -> BrowserResult<Option<String>> {
        if index >= self.resolve(locator)? {
            return Ok(None);
        }
        Ok(Some(format!(
            "{} #{} on page {}",
            locator.css_selector(),
            index + 1,
            self.current_page + 1
        )))
    }

    async fn fill(&mut self, locator: &Locator, value: &str) -> BrowserResult<()> {
        self.require(locator, 0)?;
        self.record
            .lock()
            .unwrap()
            .filled
            .push((locator.css_selector().to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> BrowserResult<()> {
        self.require(locator, index)?;
        if Self::is_next(locator) {
            let target = self.pending_switch.map_or(self.current_page, |(page, _)| page) + 1;
            self.pending_switch = Some((target, Instant::now() + self.script.page_switch_delay));
            self.settle();
            self.record.lock().unwrap().next_clicks += 1;
        }
        Ok(())
    }

    async fn select_option(&mut self, locator: &Locator, value: &str) -> BrowserResult<()> {
        self.require(locator, 0)?;
        self.record
            .lock()
            .unwrap()
            .selected
            .push((locator.css_selector().to_string(), value.to_string()));
        Ok(())
    }

    async fn scroll_into_view(&mut self, locator: &Locator, index: usize) -> BrowserResult<()> {
        self.require(locator, index)
    }

    async fn evaluate(&mut self, _scope: &Scope, script: &str) -> BrowserResult<()> {
        self.record.lock().unwrap().scripts.push(script.to_string());
        Ok(())
    }

    async fn has_frame(&mut self, name: &str) -> BrowserResult<bool> {
        Ok(self.script.frames.iter().any(|f| f == name))
    }

    async fn click_for_download(
        &mut self,
        locator: &Locator,
        index: usize,
        _timeout: Duration,
    ) -> BrowserResult<PendingDownload> {
        self.require(locator, index)?;
        self.record.lock().unwrap().download_attempts += 1;

        let page = self.current_page;
        if self.script.failing.contains(&(page, index)) {
            return Err(BrowserError::DownloadCancelled(format!(
                "element {} on page {}",
                index + 1,
                page + 1
            )));
        }

        let name = self.script.file_name(page, index);
        let path = self.staging_dir.join(format!("staged-{page}-{index}"));
        tokio::fs::write(&path, format!("page {page} element {index}\n")).await?;
        Ok(PendingDownload {
            suggested_filename: name,
            path,
        })
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.record.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Complete configuration saving into `download_dir`
pub fn test_config(download_dir: &Path) -> AppConfig {
    let values: HashMap<String, String> = [
        ("NIP_USER", "nip-user"),
        ("NIP_PW", "nip-secret"),
        ("NIP_PORTAL_URL", "https://nip.example.com"),
        ("ISW_USER", "isw-user"),
        ("ISW_PW", "isw-secret"),
        ("ISW_PORTAL_URL", "https://isw.example.com/login"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .chain([(
        "DOWNLOAD_DIR".to_string(),
        download_dir.display().to_string(),
    )])
    .collect();
    AppConfig::from_source(values).unwrap()
}

/// `⬇️` confirmation line for the `n`-th saved file
pub fn saved_line(n: usize, name: &str) -> String {
    format!("⬇️  {n:>3} saved {name}")
}

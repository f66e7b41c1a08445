use std::collections::{HashMap, VecDeque};

use analitica_core::{
    CatalogError, CatalogResult, CatalogService, CrawlerDefinition,
    CrawlerState, CrawlerStatus, DatabaseDefinition, DatabaseInfo, LastCrawl,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

/// Catalog operations, used to inject failures and inspect call history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogOp {
    GetDatabase,
    CreateDatabase,
    GetCrawler,
    CreateCrawler,
    UpdateCrawler,
    StartCrawler,
}

/// One observation returned by `get_crawler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlStep {
    pub state: CrawlerState,
    pub last_crawl: Option<LastCrawl>,
}

impl CrawlStep {
    pub fn running() -> Self {
        Self {
            state: CrawlerState::Running,
            last_crawl: None,
        }
    }

    pub fn stopping() -> Self {
        Self {
            state: CrawlerState::Stopping,
            last_crawl: None,
        }
    }

    pub fn ready(last_crawl: Option<LastCrawl>) -> Self {
        Self {
            state: CrawlerState::Ready,
            last_crawl,
        }
    }

    pub fn succeeded(created: u64, updated: u64, deleted: u64) -> Self {
        Self::ready(Some(LastCrawl {
            status: "SUCCEEDED".into(),
            error_message: None,
            tables_created: created,
            tables_updated: updated,
            tables_deleted: deleted,
        }))
    }

    pub fn failed(error_message: Option<&str>) -> Self {
        Self::ready(Some(LastCrawl {
            status: "FAILED".into(),
            error_message: error_message.map(Into::into),
            ..Default::default()
        }))
    }

    pub fn cancelled() -> Self {
        Self::ready(Some(LastCrawl {
            status: "CANCELLED".into(),
            ..Default::default()
        }))
    }
}

struct CrawlerEntry {
    def: CrawlerDefinition,
    state: CrawlerState,
    last_crawl: Option<LastCrawl>,
    script: VecDeque<CrawlStep>,
}

impl CrawlerEntry {
    fn new(def: CrawlerDefinition) -> Self {
        Self {
            def,
            state: CrawlerState::Ready,
            last_crawl: None,
            script: VecDeque::new(),
        }
    }

    /// Advance the script by one observation. The last step repeats.
    fn observe(&mut self) {
        let step = if self.script.len() > 1 {
            self.script.pop_front()
        } else {
            self.script.front().cloned()
        };
        if let Some(step) = step {
            self.state = step.state;
            self.last_crawl = step.last_crawl;
        }
    }
}

#[derive(Default)]
struct Inner {
    databases: HashMap<String, DatabaseInfo>,
    crawlers: HashMap<String, CrawlerEntry>,
    failures: HashMap<CatalogOp, CatalogError>,
    calls: Vec<CatalogOp>,
    starts: usize,
}

impl Inner {
    fn enter(&mut self, op: CatalogOp) -> CatalogResult<()> {
        self.calls.push(op);
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-process catalog.
///
/// Crawl progress is scripted: every `get_crawler` call consumes one
/// [`CrawlStep`] and the final step repeats forever. A crawler without a
/// script finishes instantly when started, reporting SUCCEEDED with zero
/// counts. Updating a crawler that is not READY fails with
/// [`CatalogError::AlreadyRunning`], as the managed service does.
#[derive(Default)]
pub struct MemCatalog {
    inner: Mutex<Inner>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, name: &str, description: Option<&str>) -> Self {
        self.inner.lock().databases.insert(
            name.to_owned(),
            DatabaseInfo {
                name: name.to_owned(),
                description: description.map(Into::into),
            },
        );
        self
    }

    pub fn with_crawler(self, def: CrawlerDefinition) -> Self {
        self.inner
            .lock()
            .crawlers
            .insert(def.name.clone(), CrawlerEntry::new(def));
        self
    }

    /// Queue observations for `crawler`. Ignored if the crawler does not
    /// exist yet.
    pub fn script_crawl(
        &self,
        crawler: &str,
        steps: impl IntoIterator<Item = CrawlStep>,
    ) {
        if let Some(entry) = self.inner.lock().crawlers.get_mut(crawler) {
            entry.script = steps.into_iter().collect();
        }
    }

    /// Fail the next call of `op` with `err`.
    pub fn fail_next(&self, op: CatalogOp, err: CatalogError) {
        self.inner.lock().failures.insert(op, err);
    }

    pub fn calls(&self) -> Vec<CatalogOp> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, op: CatalogOp) -> usize {
        self.inner.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// Number of accepted start requests.
    pub fn starts(&self) -> usize {
        self.inner.lock().starts
    }

    pub fn database(&self, name: &str) -> Option<DatabaseInfo> {
        self.inner.lock().databases.get(name).cloned()
    }

    pub fn crawler(&self, name: &str) -> Option<CrawlerDefinition> {
        self.inner.lock().crawlers.get(name).map(|e| e.def.clone())
    }
}

#[async_trait]
impl CatalogService for MemCatalog {
    async fn get_database(
        &self,
        name: &str,
    ) -> CatalogResult<Option<DatabaseInfo>> {
        let mut inner = self.inner.lock();
        inner.enter(CatalogOp::GetDatabase)?;
        Ok(inner.databases.get(name).cloned())
    }

    async fn create_database(
        &self,
        def: &DatabaseDefinition,
    ) -> CatalogResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(CatalogOp::CreateDatabase)?;
        if inner.databases.contains_key(&def.name) {
            return Err(CatalogError::AlreadyExists {
                entity: "database",
                name: def.name.clone(),
            });
        }
        inner.databases.insert(
            def.name.clone(),
            DatabaseInfo {
                name: def.name.clone(),
                description: Some(def.description.clone()),
            },
        );
        Ok(())
    }

    async fn get_crawler(
        &self,
        name: &str,
    ) -> CatalogResult<Option<CrawlerStatus>> {
        let mut inner = self.inner.lock();
        inner.enter(CatalogOp::GetCrawler)?;
        let Some(entry) = inner.crawlers.get_mut(name) else {
            return Ok(None);
        };
        entry.observe();
        debug!(crawler = name, state = %entry.state, "crawler observed");
        Ok(Some(CrawlerStatus {
            name: name.to_owned(),
            state: entry.state,
            last_crawl: entry.last_crawl.clone(),
        }))
    }

    async fn create_crawler(
        &self,
        def: &CrawlerDefinition,
    ) -> CatalogResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(CatalogOp::CreateCrawler)?;
        if inner.crawlers.contains_key(&def.name) {
            return Err(CatalogError::AlreadyExists {
                entity: "crawler",
                name: def.name.clone(),
            });
        }
        inner
            .crawlers
            .insert(def.name.clone(), CrawlerEntry::new(def.clone()));
        Ok(())
    }

    async fn update_crawler(
        &self,
        def: &CrawlerDefinition,
    ) -> CatalogResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(CatalogOp::UpdateCrawler)?;
        match inner.crawlers.get_mut(&def.name) {
            Some(entry) if entry.state != CrawlerState::Ready => {
                Err(CatalogError::AlreadyRunning {
                    name: def.name.clone(),
                })
            }
            Some(entry) => {
                entry.def = def.clone();
                Ok(())
            }
            None => Err(CatalogError::NotFound {
                entity: "crawler",
                name: def.name.clone(),
            }),
        }
    }

    async fn start_crawler(&self, name: &str) -> CatalogResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(CatalogOp::StartCrawler)?;
        let entry = inner.crawlers.get_mut(name).ok_or_else(|| {
            CatalogError::NotFound {
                entity: "crawler",
                name: name.to_owned(),
            }
        })?;

        if entry.state != CrawlerState::Ready {
            return Err(CatalogError::AlreadyRunning {
                name: name.to_owned(),
            });
        }

        if entry.script.is_empty() {
            entry.last_crawl = CrawlStep::succeeded(0, 0, 0).last_crawl;
        } else {
            entry.state = CrawlerState::Running;
        }
        inner.starts += 1;
        Ok(())
    }
}

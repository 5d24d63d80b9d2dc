use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::debug;

use crate::db::DatabaseConnection;
use crate::error::SyncError;

/// A named, callable write path exposed to the UI layer (spec §4.6). Keyed
/// by name in a `HashMap` rather than dispatched through a trait object
/// method lookup, so registering a command is a plain insert and calling
/// one is a plain hash lookup — no dynamic dispatch machinery for what is,
/// at the call site, always a known fixed set of names.
pub type Command = Arc<dyn Fn(DatabaseConnection, serde_json::Value) -> CommandFuture + Send + Sync>;
pub type CommandFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SyncError>> + Send>>;

/// The static description of a UI-facing repo: its commands and which
/// tables reading it depends on (spec §4.6).
#[derive(Clone)]
pub struct RepoDefinition {
    pub name: &'static str,
    pub watched_tables: Vec<String>,
    pub commands: HashMap<&'static str, Command>,
}

impl RepoDefinition {
    pub fn new(name: &'static str, watched_tables: Vec<String>) -> Self {
        Self { name, watched_tables, commands: HashMap::new() }
    }

    pub fn with_command(mut self, name: &'static str, command: Command) -> Self {
        self.commands.insert(name, command);
        self
    }
}

/// A live instance of a `RepoDefinition`, bumped every time one of its
/// watched tables changes so a UI layer re-renders (spec §4.6). The bump
/// counter is a `watch` channel rather than a full value cache: this
/// engine has no opinion on what a UI should read, only on when it's stale.
pub struct Repo {
    definition: RepoDefinition,
    revision: Arc<AtomicU64>,
    changed: watch::Sender<u64>,
}

impl Repo {
    fn new(definition: RepoDefinition) -> Self {
        let (changed, _) = watch::channel(0);
        Self { definition, revision: Arc::new(AtomicU64::new(0)), changed }
    }

    pub fn name(&self) -> &'static str {
        self.definition.name
    }

    pub fn watches(&self, table: &str) -> bool {
        self.definition.watched_tables.iter().any(|t| t == table)
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    fn bump(&self) {
        let next = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self.changed.send(next);
    }

    pub async fn run_command(
        &self,
        db: &DatabaseConnection,
        name: &str,
        args: serde_json::Value,
    ) -> Result<(), SyncError> {
        let command = self
            .definition
            .commands
            .get(name)
            .ok_or(SyncError::State("unknown command name"))?
            .clone();
        (*command)(db.clone(), args).await
    }
}

/// A handle to a registered `Repo`. Deregisters itself on drop rather than
/// relying on weak-map style memoization, since nothing here needs a repo
/// to survive past the last handle pointing at it (spec §9 redesign flag).
pub struct RepoHandle {
    repo: Arc<Repo>,
    registry: Arc<parking_lot::Mutex<Vec<Arc<Repo>>>>,
}

impl RepoHandle {
    pub fn repo(&self) -> &Arc<Repo> {
        &self.repo
    }
}

impl Drop for RepoHandle {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        registry.retain(|r| !Arc::ptr_eq(r, &self.repo));
    }
}

/// Owns every live `Repo` for one node and re-bumps the ones watching a
/// table whenever the coordinator reports that table changed (spec §4.6).
#[derive(Clone)]
pub struct UiSyncer {
    registry: Arc<parking_lot::Mutex<Vec<Arc<Repo>>>>,
}

impl UiSyncer {
    pub fn new() -> Self {
        Self { registry: Arc::new(parking_lot::Mutex::new(Vec::new())) }
    }

    pub fn register(&self, definition: RepoDefinition) -> RepoHandle {
        let repo = Arc::new(Repo::new(definition));
        self.registry.lock().push(repo.clone());
        RepoHandle { repo, registry: self.registry.clone() }
    }

    /// Bump every registered repo watching any of `tables`. Called by the
    /// coordinator whenever a merge or local write touches user tables.
    pub fn refresh_for_tables(&self, tables: &std::collections::HashSet<String>) {
        let registry = self.registry.lock();
        for repo in registry.iter() {
            if tables.iter().any(|t| repo.watches(t)) {
                debug!(repo = repo.name(), "bumping repo revision");
                repo.bump();
            }
        }
    }
}

impl Default for UiSyncer {
    fn default() -> Self {
        Self::new()
    }
}

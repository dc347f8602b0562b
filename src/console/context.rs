//! Hierarchical progress reporting
//!
//! A [`Context`] owns a tree of live scopes rendered as indicatif spinners.
//! Scope owners only mutate scope state; a single refresh loop per root
//! context reads that state and performs every terminal write, so concurrent
//! tasks never write to the output directly.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::VecDeque;
use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::console::join::{Joiner, Waiter};
use crate::console::status::Status;
use crate::{BenchError, Result};

const DEFAULT_REFRESH_RATE: Duration = Duration::from_millis(1);
const MAX_LOG_LINES: usize = 16;
const SUCCESS_ICON: &str = "✓";
const FAILURE_ICON: &str = "✗";

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Options shared by a context and every context forked from it
#[derive(Debug, Clone, PartialEq)]
pub struct ContextOptions {
    /// Period of the refresh loop
    pub refresh_rate: Duration,
    /// Whether `Status::log` output is shown
    pub verbose: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            refresh_rate: DEFAULT_REFRESH_RATE,
            verbose: false,
        }
    }
}

impl ContextOptions {
    pub fn with_refresh_rate(mut self, refresh_rate: Duration) -> Self {
        self.refresh_rate = refresh_rate;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Kind of a scope in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Named sub-operation created by [`Context::fork`]
    Progress,
    /// Single status line created by [`Context::run`]
    Status,
}

/// Completion state of a scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Running,
    Done,
    Failed(String),
}

/// Point-in-time copy of a scope, in display order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSnapshot {
    pub depth: usize,
    pub kind: ScopeKind,
    pub value: String,
    pub lines: Vec<String>,
    pub outcome: Outcome,
}

#[derive(Debug)]
struct ScopeState {
    value: String,
    lines: VecDeque<String>,
    outcome: Outcome,
    dirty: bool,
    finished: bool,
}

/// A node of the display tree
pub(crate) struct Scope {
    id: usize,
    depth: usize,
    kind: ScopeKind,
    parent: Option<Arc<Scope>>,
    bar: ProgressBar,
    // last bar of this scope's subtree, where the next child goes
    tail: Mutex<(usize, ProgressBar)>,
    state: Mutex<ScopeState>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Scope {
    pub(crate) fn set_value(&self, value: String) {
        let mut state = lock(&self.state);
        state.value = value;
        state.dirty = true;
    }

    pub(crate) fn value(&self) -> String {
        lock(&self.state).value.clone()
    }

    pub(crate) fn push_line(&self, line: String) {
        let mut state = lock(&self.state);
        if state.lines.len() == MAX_LOG_LINES {
            state.lines.pop_front();
        }
        state.lines.push_back(line);
        state.dirty = true;
    }

    fn complete(&self) {
        let mut state = lock(&self.state);
        state.outcome = Outcome::Done;
        state.dirty = true;
    }

    fn fail(&self, err: &BenchError) {
        let mut state = lock(&self.state);
        state.outcome = Outcome::Failed(err.to_string());
        state.dirty = true;
    }

    fn snapshot(&self) -> ScopeSnapshot {
        let state = lock(&self.state);
        ScopeSnapshot {
            depth: self.depth,
            kind: self.kind,
            value: state.value.clone(),
            lines: state.lines.iter().cloned().collect(),
            outcome: state.outcome.clone(),
        }
    }

    fn render(&self, done_style: &ProgressStyle) {
        let mut state = lock(&self.state);
        if state.finished {
            return;
        }
        if !state.dirty {
            self.bar.tick();
            return;
        }

        let indent = "  ".repeat(self.depth + 1);
        let mut text = match &state.outcome {
            Outcome::Running => state.value.clone(),
            Outcome::Done => format!("{} {}", SUCCESS_ICON, state.value),
            Outcome::Failed(err) => format!("{} {} ← {}", FAILURE_ICON, state.value, err),
        };
        for line in &state.lines {
            text.push('\n');
            text.push_str(&indent);
            text.push_str(line);
        }

        state.dirty = false;
        if state.outcome == Outcome::Running {
            self.bar.set_message(text);
        } else {
            state.finished = true;
            self.bar.set_style(done_style.clone());
            self.bar.finish_with_message(text);
        }
    }
}

/// Shared state behind a root context and all of its forks
struct Reporter {
    multi: MultiProgress,
    running_style: ProgressStyle,
    done_style: ProgressStyle,
    scopes: Mutex<Vec<Arc<Scope>>>,
    pending: Mutex<Vec<String>>,
    // printed lines bypass the draw target, which drops them when not a tty
    output: Mutex<Box<dyn Write + Send>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    refresher: Mutex<Option<JoinHandle<()>>>,
    shutdown: Notify,
    next_id: AtomicUsize,
}

impl Reporter {
    fn new(target: ProgressDrawTarget, output: Box<dyn Write + Send>) -> Self {
        let running_style = ProgressStyle::with_template("{prefix}{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let done_style = ProgressStyle::with_template("{prefix}{msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        Self {
            multi: MultiProgress::with_draw_target(target),
            running_style,
            done_style,
            scopes: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            output: Mutex::new(output),
            tasks: Mutex::new(Vec::new()),
            refresher: Mutex::new(None),
            shutdown: Notify::new(),
            next_id: AtomicUsize::new(0),
        }
    }

    fn start(self: &Arc<Self>, refresh_rate: Duration) {
        let reporter = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_rate.max(Duration::from_micros(100)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => reporter.flush(),
                    _ = reporter.shutdown.notified() => {
                        reporter.flush();
                        break;
                    }
                }
            }
        });
        *lock(&self.refresher) = Some(handle);
    }

    /// Insert a scope directly below its parent's subtree, or at the bottom
    /// for top-level scopes.
    fn new_scope(&self, parent: Option<&Arc<Scope>>, kind: ScopeKind, value: String) -> Arc<Scope> {
        let mut scopes = lock(&self.scopes);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let depth = parent.map(|p| p.depth + 1).unwrap_or(0);
        let bar = ProgressBar::new_spinner()
            .with_style(self.running_style.clone())
            .with_prefix("  ".repeat(depth))
            .with_message(value.clone());

        let bar = match parent {
            Some(parent) => {
                let (anchor_id, anchor) = lock(&parent.tail).clone();
                let bar = self.multi.insert_after(&anchor, bar);
                let mut cursor = Some(Arc::clone(parent));
                while let Some(scope) = cursor {
                    let mut tail = lock(&scope.tail);
                    if tail.0 != anchor_id {
                        break;
                    }
                    *tail = (id, bar.clone());
                    drop(tail);
                    cursor = scope.parent.clone();
                }
                bar
            }
            None => self.multi.add(bar),
        };

        let scope = Arc::new(Scope {
            id,
            depth,
            kind,
            parent: parent.cloned(),
            tail: Mutex::new((id, bar.clone())),
            bar,
            state: Mutex::new(ScopeState {
                value,
                lines: VecDeque::new(),
                outcome: Outcome::Running,
                dirty: true,
                finished: false,
            }),
        });

        // keep display order in the snapshot list as well
        let position = scopes
            .iter()
            .rposition(|s| is_within(s, parent))
            .map(|i| i + 1)
            .unwrap_or(scopes.len());
        scopes.insert(position, Arc::clone(&scope));
        scope
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn flush(&self) {
        let lines = std::mem::take(&mut *lock(&self.pending));
        if !lines.is_empty() {
            self.multi.suspend(|| self.write_lines(&lines));
        }
        let scopes = lock(&self.scopes).clone();
        for scope in scopes {
            scope.render(&self.done_style);
        }
    }

    fn write_lines(&self, lines: &[String]) {
        let mut output = lock(&self.output);
        for line in lines {
            if let Err(err) = writeln!(output, "{}", line) {
                tracing::warn!(error = %err, "failed to write console output");
                return;
            }
        }
        if let Err(err) = output.flush() {
            tracing::warn!(error = %err, "failed to flush console output");
        }
    }

    /// Await every tracked task, including ones started while draining.
    async fn drain(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.tasks));
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    tracing::warn!(error = %err, "progress task aborted");
                }
            }
        }
    }

    async fn stop(&self) {
        self.shutdown.notify_one();
        let handle = lock(&self.refresher).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn is_within(scope: &Arc<Scope>, ancestor: Option<&Arc<Scope>>) -> bool {
    let Some(ancestor) = ancestor else {
        return false;
    };
    let mut cursor = Some(Arc::clone(scope));
    while let Some(current) = cursor {
        if current.id == ancestor.id {
            return true;
        }
        cursor = current.parent.clone();
    }
    false
}

/// Handle for reporting progress; cheap to clone
#[derive(Clone)]
pub struct Context {
    options: ContextOptions,
    reporter: Arc<Reporter>,
    parent: Option<Arc<Scope>>,
    root: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("options", &self.options)
            .field("root", &self.root)
            .finish()
    }
}

impl Context {
    /// Create a root context drawing live scopes to `target` and printed
    /// lines to `output`, and start its refresh loop. Must be called from
    /// within a tokio runtime.
    pub fn new<W>(target: ProgressDrawTarget, output: W, options: ContextOptions) -> Self
    where
        W: Write + Send + 'static,
    {
        let reporter = Arc::new(Reporter::new(target, Box::new(output)));
        reporter.start(options.refresh_rate);
        Self {
            options,
            reporter,
            parent: None,
            root: true,
        }
    }

    /// Root context drawing to stdout. Printed lines reach stdout even
    /// when it is not a terminal.
    pub fn stdout(options: ContextOptions) -> Self {
        Self::new(ProgressDrawTarget::stdout(), std::io::stdout(), options)
    }

    /// Root context that tracks state without drawing or printing
    pub fn hidden(options: ContextOptions) -> Self {
        Self::new(ProgressDrawTarget::hidden(), std::io::sink(), options)
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Run `f` as a named sub-operation on its own task. Scopes created
    /// through the child context nest under this one.
    pub fn fork<T, F, Fut>(&self, description: impl Into<String>, f: F) -> Joiner<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let scope = self
            .reporter
            .new_scope(self.parent.as_ref(), ScopeKind::Progress, description.into());
        let child = Context {
            options: self.options.clone(),
            reporter: Arc::clone(&self.reporter),
            parent: Some(Arc::clone(&scope)),
            root: false,
        };

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let result = f(child).await;
            match &result {
                Ok(_) => scope.complete(),
                Err(err) => scope.fail(err),
            }
            let _ = tx.send(result);
        });
        self.reporter.track(handle);
        Joiner::new(rx)
    }

    /// Run `f` on its own task under a fresh status line.
    pub fn run<T, F, Fut>(&self, f: F) -> Waiter<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Status) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let scope = self
            .reporter
            .new_scope(self.parent.as_ref(), ScopeKind::Status, String::new());
        let status = Status::new(Arc::clone(&scope), self.options.verbose);

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let result = f(status).await;
            match &result {
                Ok(_) => scope.complete(),
                Err(err) => scope.fail(err),
            }
            let _ = tx.send(result);
        });
        self.reporter.track(handle);
        Waiter::new(rx)
    }

    /// Print text above the live scopes on the next refresh
    pub fn println(&self, text: impl AsRef<str>) {
        let mut pending = lock(&self.reporter.pending);
        pending.extend(text.as_ref().lines().map(str::to_string));
    }

    /// Copy of every scope in display order
    pub fn snapshot(&self) -> Vec<ScopeSnapshot> {
        lock(&self.reporter.scopes)
            .iter()
            .map(|scope| scope.snapshot())
            .collect()
    }

    /// Wait for every forked task to record its outcome, draw the final
    /// state and stop the refresh loop. A no-op on forked contexts.
    pub async fn close(&self) {
        if !self.root {
            return;
        }
        self.reporter.drain().await;
        self.reporter.stop().await;
    }
}

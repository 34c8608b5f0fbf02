//! Linking source files together through `.include` directives.
//!
//! The [`Linker`] starts at an entry file and follows every `.include` it finds,
//! producing a [`LinkedProgram`]: the set of parsed files, the resolved include edges,
//! and a lazy statement iterator ([`LinkedProgram::statements`]) which splices
//! each included file's statements in place of its `.include`.
//!
//! Files are located and parsed by a [`SourceProvider`]. Two are provided:
//! - [`FsProvider`]: reads files from the filesystem, searching a list of include directories,
//! - [`MemProvider`]: serves files from an in-memory map.
//!
//! Each included file is walked on its own thread. Include cycles are reported as
//! diagnostics on the `.include` which closes the cycle (in statement order from the
//! entry file) and are never followed. The order of statements does not depend on
//! how the threads are scheduled.
//!
//! # Example
//! ```
//! use sectasm::link::{Linker, MemProvider};
//! use std::path::Path;
//!
//! let provider = MemProvider::default()
//!     .with_file("main.s", ".include \"consts.s\"\n.word SIZE\n")
//!     .with_file("consts.s", ".equ SIZE, 16\n");
//!
//! let program = Linker::new(provider).link(Path::new("main.s")).unwrap();
//! assert_eq!(program.statements().count(), 3);
//! ```

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel as cbc;

use crate::ast::{DirectiveKind, Stmt};
use crate::err::{Diagnostic, NodeRef, Severity};
use crate::parse::lex::LexRules;
use crate::parse::{parse_file, SourceFile};

/// Locates and parses source files for the [`Linker`].
///
/// Providers are shared between linker threads. The linker does no caching,
/// so a provider may cache parsed files if it wishes.
pub trait SourceProvider: Send + Sync {
    /// Resolves the path of an `.include` (`relative`) found in the file at `base`.
    ///
    /// This returns `None` if no such file exists.
    fn resolve(&self, base: &Path, relative: &str) -> Option<PathBuf>;

    /// Reads and parses the file at a resolved path.
    fn parse(&self, path: &Path) -> Result<SourceFile, LinkErr>;
}

/// A [`SourceProvider`] which reads from the filesystem.
///
/// Includes are resolved relative to the including file's directory first,
/// then relative to each of the search paths, in order.
#[derive(Debug, Clone, Default)]
pub struct FsProvider {
    /// The rules used to tokenize files.
    pub rules: LexRules,
    /// Additional include directories.
    pub search_paths: Vec<PathBuf>,
}
impl SourceProvider for FsProvider {
    fn resolve(&self, base: &Path, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        if relative.is_absolute() {
            return Some(relative.to_path_buf()).filter(|p| p.is_file());
        }

        base.parent()
            .into_iter()
            .chain(self.search_paths.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(relative))
            .find(|p| p.is_file())
    }

    fn parse(&self, path: &Path) -> Result<SourceFile, LinkErr> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| LinkErr::Io { path: path.to_path_buf(), message: e.to_string() })?;
        Ok(parse_file(path, &src, &self.rules))
    }
}

/// A [`SourceProvider`] which serves files from memory.
///
/// Paths are normalized lexically (`.` and `..` components are collapsed).
#[derive(Debug, Clone, Default)]
pub struct MemProvider {
    /// The rules used to tokenize files.
    pub rules: LexRules,
    files: HashMap<PathBuf, Arc<str>>,
}
impl MemProvider {
    /// Creates an empty provider which tokenizes with the given rules.
    pub fn new(rules: LexRules) -> Self {
        Self { rules, files: HashMap::new() }
    }

    /// Adds a file.
    pub fn insert(&mut self, path: impl AsRef<Path>, src: &str) {
        self.files.insert(normalize(path.as_ref()), Arc::from(src));
    }

    /// Adds a file (builder style).
    pub fn with_file(mut self, path: impl AsRef<Path>, src: &str) -> Self {
        self.insert(path, src);
        self
    }
}
impl SourceProvider for MemProvider {
    fn resolve(&self, base: &Path, relative: &str) -> Option<PathBuf> {
        let joined = match base.parent() {
            Some(dir) => dir.join(relative),
            None => PathBuf::from(relative),
        };
        let path = normalize(&joined);
        self.files.contains_key(&path).then_some(path)
    }

    fn parse(&self, path: &Path) -> Result<SourceFile, LinkErr> {
        let src = self.files.get(&normalize(path))
            .ok_or_else(|| LinkErr::Io { path: path.to_path_buf(), message: "file not found".into() })?;
        Ok(parse_file(path, src, &self.rules))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {},
            Component::ParentDir => { out.pop(); },
            c => out.push(c),
        }
    }
    out
}

/// Errors which can occur while linking.
///
/// Some of these are fatal and abort linking ([`LinkErr::is_fatal`]).
/// The rest are reported as diagnostics on the `.include` they concern.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum LinkErr {
    /// A file could not be read (fatal).
    Io {
        /// The file.
        path: PathBuf,
        /// The reason.
        message: String,
    },
    /// A linker thread panicked (fatal).
    TaskPanicked,
    /// Linking was cancelled (fatal).
    Cancelled,
    /// An `.include` path did not resolve to a file.
    Unresolved(String),
    /// An `.include` would include a file which is currently being included.
    Cycle(PathBuf),
    /// An `.include` did not have exactly one plain string argument.
    MalformedInclude,
}
impl LinkErr {
    /// Whether this error aborts linking.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkErr::Io { .. } | LinkErr::TaskPanicked | LinkErr::Cancelled)
    }
}
impl std::fmt::Display for LinkErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkErr::Io { path, message } => write!(f, "could not read {}: {message}", path.display()),
            LinkErr::TaskPanicked => f.write_str("linker thread panicked"),
            LinkErr::Cancelled => f.write_str("linking was cancelled"),
            LinkErr::Unresolved(path) => write!(f, "could not find included file {path:?}"),
            LinkErr::Cycle(path) => write!(f, "circular include of {}", path.display()),
            LinkErr::MalformedInclude => f.write_str("malformed include"),
        }
    }
}
impl std::error::Error for LinkErr {}
impl crate::err::Error for LinkErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            LinkErr::Unresolved(_) => Some("check the path, or add its directory to the search paths".into()),
            LinkErr::Cycle(_) => Some("a file cannot (indirectly) include itself".into()),
            LinkErr::MalformedInclude => Some("an include takes one string literal, e.g. `.include \"file.s\"`".into()),
            _ => None,
        }
    }
}

/// An include edge, reported by the thread that walked the including file.
struct IncludeEdge {
    from: Arc<Path>,
    stmt: usize,
    span: Range<usize>,
    to: Arc<Path>,
}

enum Event {
    Parsed(SourceFile),
    Include(IncludeEdge),
    Diagnostic(Diagnostic),
    Failed(LinkErr),
}

#[derive(Default)]
struct TaskState {
    visited: HashSet<Arc<Path>>,
    tasks: Vec<JoinHandle<()>>,
}

struct Shared {
    provider: Arc<dyn SourceProvider>,
    state: Mutex<TaskState>,
    cancel: Arc<AtomicBool>,
    events: cbc::Sender<Event>,
}
impl Shared {
    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn send(&self, event: Event) {
        // The receiver lives until every task has been joined.
        let _ = self.events.send(event);
    }

    fn report(&self, err: LinkErr, file: &Arc<Path>, span: Range<usize>) {
        let diag = Diagnostic {
            span: Some(span),
            ..Diagnostic::from_err(&err, Severity::Error, Some(file), NodeRef::Include)
        };
        self.send(Event::Diagnostic(diag));
    }

    /// Walks the statements of a file, spawning a task for each new include.
    ///
    /// `chain` holds the files currently being included, ending with this file.
    fn walk(self: &Arc<Self>, file: SourceFile, chain: Vec<Arc<Path>>) {
        let path = Arc::clone(&file.path);
        tracing::trace!(path = %path.display(), depth = chain.len(), "walking file");

        for (i, stmt) in file.stmts.iter().enumerate() {
            if self.cancelled() { return; }
            if !is_include(stmt) { continue; }

            let Some((relative, span)) = stmt.include_path() else {
                let span = stmt.directive.as_ref().map_or(stmt.span.clone(), |d| d.span.clone());
                self.report(LinkErr::MalformedInclude, &path, span);
                continue;
            };
            let Some(target) = self.provider.resolve(&path, &relative) else {
                self.report(LinkErr::Unresolved(relative), &path, span);
                continue;
            };
            let target: Arc<Path> = Arc::from(target);

            self.send(Event::Include(IncludeEdge { from: Arc::clone(&path), stmt: i, span, to: Arc::clone(&target) }));
            // The edge is cut (and reported) once every edge is known.
            if chain.contains(&target) { continue; }

            // Optimistic check, so already walked files are not parsed again.
            // The task still has to claim the file for itself.
            if self.state().visited.contains(&target) { continue; }

            let parsed = match self.provider.parse(&target) {
                Ok(f) => f,
                Err(e) => {
                    self.cancel.store(true, Ordering::Relaxed);
                    self.send(Event::Failed(e));
                    return;
                }
            };

            let mut sub_chain = chain.clone();
            sub_chain.push(Arc::clone(&target));
            let shared = Arc::clone(self);
            let handle = std::thread::spawn(move || {
                if shared.cancelled() { return; }
                if !shared.state().visited.insert(Arc::clone(&target)) {
                    tracing::trace!(path = %target.display(), "file already claimed");
                    return;
                }
                shared.walk(parsed, sub_chain);
            });
            self.state().tasks.push(handle);
        }

        self.send(Event::Parsed(file));
    }
}

fn is_include(stmt: &Stmt) -> bool {
    stmt.directive.as_ref().is_some_and(|d| d.kind == DirectiveKind::Include)
}

/// Resolves includes, starting from an entry file.
pub struct Linker {
    provider: Arc<dyn SourceProvider>,
    cancel: Arc<AtomicBool>,
}
impl Linker {
    /// Creates a linker with the given source provider.
    pub fn new(provider: impl SourceProvider + 'static) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    /// Creates a linker with a shared source provider.
    pub fn from_shared(provider: Arc<dyn SourceProvider>) -> Self {
        Self { provider, cancel: Arc::new(AtomicBool::new(false)) }
    }

    /// Sets the flag which cancels linking when set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Links the program whose entry file is at `entry`.
    ///
    /// This only fails for fatal errors (see [`LinkErr::is_fatal`]).
    /// Other problems are collected in [`LinkedProgram::diagnostics`].
    pub fn link(&self, entry: &Path) -> Result<LinkedProgram, LinkErr> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(LinkErr::Cancelled);
        }
        let entry_file = self.provider.parse(entry)?;
        let entry_path = Arc::clone(&entry_file.path);

        let (tx, rx) = cbc::unbounded();
        let shared = Arc::new(Shared {
            provider: Arc::clone(&self.provider),
            state: Mutex::new(TaskState::default()),
            cancel: Arc::clone(&self.cancel),
            events: tx,
        });
        shared.state().visited.insert(Arc::clone(&entry_path));
        shared.walk(entry_file, vec![Arc::clone(&entry_path)]);

        // Tasks push their children's handles before finishing,
        // so once a round of tasks is joined, the next round is already queued.
        let mut failure = None;
        loop {
            let tasks = std::mem::take(&mut shared.state().tasks);
            if tasks.is_empty() { break; }

            tracing::trace!(tasks = tasks.len(), "joining link tasks");
            for task in tasks {
                if task.join().is_err() {
                    shared.cancel.store(true, Ordering::Relaxed);
                    failure.get_or_insert(LinkErr::TaskPanicked);
                }
            }
        }

        let mut files = vec![];
        let mut edges = vec![];
        let mut diagnostics = vec![];
        for event in rx.try_iter() {
            match event {
                Event::Parsed(f) => files.push(f),
                Event::Include(e) => edges.push(e),
                Event::Diagnostic(d) => diagnostics.push(d),
                Event::Failed(e) => { failure.get_or_insert(e); },
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        if shared.cancelled() {
            tracing::warn!("linking cancelled");
            return Err(LinkErr::Cancelled);
        }

        Ok(LinkedProgram::assemble_parts(&entry_path, files, edges, diagnostics))
    }
}

/// Reference to a statement in a [`LinkedProgram`].
#[derive(Debug, Clone, Copy)]
pub struct LinkedStmt<'a> {
    /// The file this statement is from.
    pub file: &'a SourceFile,
    /// The index of this statement in its file.
    pub index: usize,
    /// The statement.
    pub stmt: &'a Stmt,
}

/// The result of linking: every reachable file and the includes between them.
#[derive(Debug)]
pub struct LinkedProgram {
    // The entry file is always the first file.
    files: Vec<SourceFile>,
    includes: HashMap<(usize, usize), usize>,
    /// Diagnostics from linking (unresolved and circular includes).
    ///
    /// Diagnostics from parsing are kept in each [`SourceFile`].
    pub diagnostics: Vec<Diagnostic>,
}
impl LinkedProgram {
    fn assemble_parts(entry: &Arc<Path>, mut files: Vec<SourceFile>, edges: Vec<IncludeEdge>, mut diagnostics: Vec<Diagnostic>) -> Self {
        // Thread completion order is arbitrary, so sort everything.
        files.sort_by(|a, b| (&a.path != entry).cmp(&(&b.path != entry)).then_with(|| a.path.cmp(&b.path)));
        let ids: HashMap<_, _> = files.iter()
            .enumerate()
            .map(|(i, f)| (Arc::clone(&f.path), i))
            .collect();

        let mut graph: Vec<Vec<(usize, usize, Range<usize>)>> = vec![vec![]; files.len()];
        for e in edges {
            if let (Some(&from), Some(&to)) = (ids.get(&e.from), ids.get(&e.to)) {
                graph[from].push((e.stmt, to, e.span));
            }
        }
        for out in &mut graph {
            out.sort_by_key(|&(stmt, _, _)| stmt);
        }

        cut_cycles(&files, &mut graph, &mut diagnostics);

        let includes = graph.into_iter()
            .enumerate()
            .flat_map(|(from, out)| out.into_iter().map(move |(stmt, to, _)| ((from, stmt), to)))
            .collect();
        diagnostics.sort_by(|a, b| (&a.file, a.span.as_ref().map(|s| s.start)).cmp(&(&b.file, b.span.as_ref().map(|s| s.start))));

        tracing::debug!(files = files.len(), diagnostics = diagnostics.len(), "linked program");
        Self { files, includes, diagnostics }
    }

    /// The entry file.
    pub fn entry(&self) -> &SourceFile {
        &self.files[0]
    }

    /// All files of this program (the entry file first).
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// The file included by a given statement (`(file, stmt)` indices), if any.
    pub fn included_by(&self, file: usize, stmt: usize) -> Option<&SourceFile> {
        self.includes.get(&(file, stmt)).map(|&i| &self.files[i])
    }

    /// All diagnostics: from parsing every file, then from linking.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.files.iter()
            .flat_map(|f| &f.diagnostics)
            .chain(&self.diagnostics)
    }

    /// Iterates over every statement of the program in order.
    ///
    /// The statements of an included file come right after its `.include`.
    /// A file included twice is iterated twice. Every call starts a new iteration.
    pub fn statements(&self) -> Statements<'_> {
        Statements { program: self, stack: vec![(0, 0)] }
    }
}

/// Removes the back edges of a depth-first walk from the entry file, reporting each as a cycle.
///
/// Every include edge is known here and ordered by statement,
/// so which edge gets cut does not depend on which thread walked which file.
fn cut_cycles(files: &[SourceFile], graph: &mut [Vec<(usize, usize, Range<usize>)>], diagnostics: &mut Vec<Diagnostic>) {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Color { White, Gray, Black }

    fn visit(node: usize, colors: &mut [Color], graph: &mut [Vec<(usize, usize, Range<usize>)>], back: &mut Vec<(usize, usize)>) {
        colors[node] = Color::Gray;
        for i in 0..graph[node].len() {
            let to = graph[node][i].1;
            match colors[to] {
                Color::White => visit(to, colors, graph, back),
                Color::Gray => back.push((node, i)),
                Color::Black => {},
            }
        }
        colors[node] = Color::Black;
    }

    if files.is_empty() { return; }
    let mut colors = vec![Color::White; files.len()];
    let mut back = vec![];
    visit(0, &mut colors, graph, &mut back);

    // Remove back edges in reverse, so indices stay valid.
    for (node, i) in back.into_iter().rev() {
        let (_, to, span) = graph[node].remove(i);
        let err = LinkErr::Cycle(files[to].path.to_path_buf());
        diagnostics.push(Diagnostic {
            span: Some(span),
            ..Diagnostic::from_err(&err, Severity::Error, Some(&files[node].path), NodeRef::Include)
        });
    }
}

/// Iterator over the statements of a [`LinkedProgram`].
///
/// See [`LinkedProgram::statements`].
#[derive(Debug, Clone)]
pub struct Statements<'a> {
    program: &'a LinkedProgram,
    // (file, next statement)
    stack: Vec<(usize, usize)>,
}
impl<'a> Iterator for Statements<'a> {
    type Item = LinkedStmt<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            let (file_id, index) = *top;
            top.1 += 1;

            let file = &self.program.files[file_id];
            let Some(stmt) = file.stmts.get(index) else {
                self.stack.pop();
                continue;
            };
            if let Some(&to) = self.program.includes.get(&(file_id, index)) {
                self.stack.push((to, 0));
            }
            return Some(LinkedStmt { file, index, stmt });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{LinkErr, LinkedProgram, Linker, MemProvider, SourceProvider};
    use crate::parse::SourceFile;

    fn link(provider: MemProvider, entry: &str) -> LinkedProgram {
        Linker::new(provider).link(Path::new(entry)).unwrap()
    }

    /// The label names of the program's statements, in order.
    fn labels(program: &LinkedProgram) -> Vec<String> {
        program.statements()
            .filter_map(|s| s.stmt.label.as_ref())
            .map(|l| l.name.clone())
            .collect()
    }

    fn cycle_diagnostics(program: &LinkedProgram) -> usize {
        program.diagnostics.iter()
            .filter(|d| d.message.starts_with("circular include"))
            .count()
    }

    #[test]
    fn test_splice_order() {
        let provider = MemProvider::default()
            .with_file("main.s", "a:\n.include \"lib/b.s\"\nd:\n")
            .with_file("lib/b.s", "b:\n.include \"../c.s\"\n")
            .with_file("c.s", "c:\n");

        let program = link(provider, "main.s");
        assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
        assert_eq!(program.files().len(), 3);
        assert_eq!(program.entry().path.as_ref(), Path::new("main.s"));
        assert_eq!(labels(&program), ["a", "b", "c", "d"]);
        assert!(program.included_by(0, 1).is_some());
    }

    #[test]
    fn test_restartable() {
        let provider = MemProvider::default()
            .with_file("main.s", "x:\n.include \"y.s\"\nz:\n")
            .with_file("y.s", "y:\n");
        let program = link(provider, "main.s");

        assert_eq!(labels(&program), labels(&program));
        let mut it = program.statements();
        it.next();
        assert_eq!(program.statements().count(), 4);
        assert_eq!(it.count(), 3);
    }

    #[test]
    fn test_direct_cycle() {
        let provider = MemProvider::default()
            .with_file("a.s", "a:\n.include \"b.s\"\n")
            .with_file("b.s", "b:\n.include \"a.s\"\n");
        let program = link(provider, "a.s");

        assert_eq!(cycle_diagnostics(&program), 1);
        assert_eq!(labels(&program), ["a", "b"]);

        let diag = &program.diagnostics[0];
        assert!(diag.is_error());
        assert_eq!(diag.file.as_deref(), Some(Path::new("b.s")));
        assert_eq!(diag.span, Some(3..17));
    }

    #[test]
    fn test_self_include() {
        let provider = MemProvider::default()
            .with_file("a.s", ".include \"a.s\"\n");
        let program = link(provider, "a.s");
        assert_eq!(cycle_diagnostics(&program), 1);
        assert_eq!(program.statements().count(), 1);
    }

    #[test]
    fn test_sibling_cycle() {
        for _ in 0..16 {
            let provider = MemProvider::default()
                .with_file("x.s", ".include \"a.s\"\n.include \"b.s\"\n")
                .with_file("a.s", "a:\n.include \"b.s\"\n")
                .with_file("b.s", "b:\n.include \"a.s\"\n");
            let program = link(provider, "x.s");

            assert_eq!(cycle_diagnostics(&program), 1, "{:?}", program.diagnostics);
            assert_eq!(program.diagnostics[0].file.as_deref(), Some(Path::new("b.s")));
            assert_eq!(labels(&program), ["a", "b", "b", "a", "b"]);
        }
    }

    /// Delays resolving the includes of one file.
    struct SlowProvider {
        inner: MemProvider,
        slow: PathBuf,
    }
    impl SourceProvider for SlowProvider {
        fn resolve(&self, base: &Path, relative: &str) -> Option<PathBuf> {
            if base == self.slow.as_path() {
                std::thread::sleep(Duration::from_millis(100));
            }
            self.inner.resolve(base, relative)
        }

        fn parse(&self, path: &Path) -> Result<SourceFile, LinkErr> {
            self.inner.parse(path)
        }
    }

    #[test]
    fn test_cycle_independent_of_scheduling() {
        let files = MemProvider::default()
            .with_file("x.s", ".include \"p.s\"\n.include \"q.s\"\n")
            .with_file("p.s", "p:\n.include \"a.s\"\n")
            .with_file("q.s", "q:\n.include \"b.s\"\n")
            .with_file("a.s", "a:\n.include \"b.s\"\n")
            .with_file("b.s", "b:\n.include \"a.s\"\n");

        for slow in ["p.s", "q.s", "a.s", "b.s"] {
            let provider = SlowProvider { inner: files.clone(), slow: PathBuf::from(slow) };
            let program = Linker::new(provider).link(Path::new("x.s")).unwrap();

            assert_eq!(labels(&program), ["p", "a", "b", "q", "b"], "slow {slow}");
            let messages: Vec<_> = program.diagnostics.iter()
                .map(|d| (d.file.as_deref().map(Path::to_path_buf), d.message.clone()))
                .collect();
            assert_eq!(messages, [(Some(PathBuf::from("b.s")), "circular include of a.s".to_string())], "slow {slow}");
        }
    }

    #[test]
    fn test_diamond() {
        let provider = MemProvider::default()
            .with_file("main.s", ".include \"c.s\"\n.include \"d.s\"\n")
            .with_file("c.s", "c:\n.include \"a.s\"\n")
            .with_file("d.s", "d:\n.include \"a.s\"\n")
            .with_file("a.s", ".equ K, 1\n");
        let program = link(provider, "main.s");

        assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
        assert_eq!(program.files().len(), 4);
        assert_eq!(labels(&program), ["c", "d"]);

        let assigns = program.statements()
            .filter(|s| s.file.path.as_ref() == Path::new("a.s"))
            .count();
        assert_eq!(assigns, 2);
    }

    #[test]
    fn test_unresolved_and_malformed() {
        let provider = MemProvider::default()
            .with_file("main.s", "a:\n.include \"missing.s\"\n.include 12\nb:\n");
        let program = link(provider, "main.s");

        let messages: Vec<_> = program.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["could not find included file \"missing.s\"", "malformed include"]);
        assert_eq!(labels(&program), ["a", "b"]);
    }

    struct FailingProvider(MemProvider);
    impl SourceProvider for FailingProvider {
        fn resolve(&self, base: &Path, relative: &str) -> Option<PathBuf> {
            match relative {
                "broken.s" => Some(PathBuf::from("broken.s")),
                r => self.0.resolve(base, r),
            }
        }

        fn parse(&self, path: &Path) -> Result<SourceFile, LinkErr> {
            self.0.parse(path)
        }
    }

    #[test]
    fn test_fatal() {
        let provider = FailingProvider(MemProvider::default()
            .with_file("main.s", ".include \"ok.s\"\n")
            .with_file("ok.s", ".include \"broken.s\"\n"));
        let err = Linker::new(provider).link(Path::new("main.s")).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, LinkErr::Io { .. }));

        let err = Linker::new(MemProvider::default())
            .with_cancel_flag(Arc::new(AtomicBool::new(true)))
            .link(Path::new("main.s"))
            .unwrap_err();
        assert_eq!(err, LinkErr::Cancelled);
    }
}

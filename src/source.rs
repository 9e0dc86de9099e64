//! Source acquisition: the buffer manager that loads files and resolves
//! include paths, and the loader that expands file patterns and drives
//! parsing.
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::{
    lexer::SourceLocation,
    options::OptionBag,
    syntax::{self, SyntaxTree},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u32);

impl BufferId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct SourceBuffer {
    pub id: BufferId,
    pub path: PathBuf,
    pub text: String,
    pub library: Option<String>,
    pub included_from: Option<SourceLocation>,
}

#[derive(Default)]
struct Buffers {
    list: Vec<Arc<SourceBuffer>>,
    by_path: HashMap<PathBuf, BufferId>,
}

/// Owns all loaded source text. Buffers are immutable once loaded and
/// keyed by canonical path, so loading the same file twice hands back the
/// same buffer. Loading is internally synchronized; parse workers share a
/// `&SourceManager`.
#[derive(Default)]
pub struct SourceManager {
    buffers: RwLock<Buffers>,
    user_dirs: Vec<PathBuf>,
    system_dirs: Vec<PathBuf>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user include directory. Returns false if it does not
    /// exist (the caller decides whether that is fatal).
    pub fn add_user_directory(&mut self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        log::debug!("user include directory: {:?}", path);
        self.user_dirs.push(path.to_path_buf());
        true
    }

    pub fn add_system_directory(&mut self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        log::debug!("system include directory: {:?}", path);
        self.system_dirs.push(path.to_path_buf());
        true
    }

    /// Loads a file, reusing the existing buffer if the canonical path was
    /// seen before.
    pub fn load_file(
        &self,
        path: &Path,
        library: Option<String>,
        included_from: Option<SourceLocation>,
    ) -> Result<BufferId> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("unable to find or open file '{}'", path.display()))?;

        {
            let buffers = self.buffers.read().expect("source manager lock poisoned");
            if let Some(&id) = buffers.by_path.get(&canonical) {
                return Ok(id);
            }
        }

        let text = fs::read_to_string(&canonical)
            .with_context(|| format!("unable to find or open file '{}'", path.display()))?;
        log::debug!("loaded {:?} ({} bytes)", canonical, text.len());

        let mut buffers = self.buffers.write().expect("source manager lock poisoned");
        // Another worker may have raced us to it.
        if let Some(&id) = buffers.by_path.get(&canonical) {
            return Ok(id);
        }
        let id = BufferId(buffers.list.len() as u32);
        buffers.by_path.insert(canonical.clone(), id);
        buffers.list.push(Arc::new(SourceBuffer {
            id,
            path: canonical,
            text,
            library,
            included_from,
        }));
        Ok(id)
    }

    /// Registers in-memory text under a pseudo path. Used for tests and
    /// for synthesized buffers like command-line predefines.
    pub fn add_text(&self, name: &str, text: impl Into<String>) -> BufferId {
        let mut buffers = self.buffers.write().expect("source manager lock poisoned");
        let id = BufferId(buffers.list.len() as u32);
        buffers.by_path.insert(PathBuf::from(name), id);
        buffers.list.push(Arc::new(SourceBuffer {
            id,
            path: PathBuf::from(name),
            text: text.into(),
            library: None,
            included_from: None,
        }));
        id
    }

    pub fn buffer(&self, id: BufferId) -> Arc<SourceBuffer> {
        let buffers = self.buffers.read().expect("source manager lock poisoned");
        Arc::clone(&buffers.list[id.index()])
    }

    pub fn path(&self, id: BufferId) -> PathBuf {
        self.buffer(id).path.clone()
    }

    pub fn included_from(&self, id: BufferId) -> Option<SourceLocation> {
        self.buffer(id).included_from
    }

    pub fn line_text(&self, id: BufferId, line: u32) -> Option<String> {
        let buffer = self.buffer(id);
        buffer
            .text
            .lines()
            .nth(line.saturating_sub(1) as usize)
            .map(str::to_owned)
    }

    /// Finds the file referenced by an include directive. Quote includes
    /// search the including file's directory, then user directories, then
    /// system directories; angle includes search system directories only.
    pub fn resolve_include(
        &self,
        name: &str,
        includer_dir: Option<&Path>,
        is_system: bool,
    ) -> Option<PathBuf> {
        let local = if is_system { None } else { includer_dir };
        let user = if is_system { &[][..] } else { &self.user_dirs[..] };
        let candidates = local
            .into_iter()
            .chain(user.iter().map(PathBuf::as_path))
            .chain(self.system_dirs.iter().map(PathBuf::as_path));

        for dir in candidates {
            let potential = dir.join(name);
            log::trace!("trying to resolve include {:?} as {:?}", name, potential);
            if potential.exists() && !potential.is_dir() {
                log::debug!("resolved include {:?} to {:?}", name, potential);
                return Some(potential);
            }
        }
        log::debug!("failed to resolve include {:?}", name);
        None
    }
}

#[derive(Debug, Clone)]
struct FileEntry {
    pattern: String,
    base: Option<PathBuf>,
    library: Option<String>,
}

/// Collects the files to compile and turns them into loaded buffers or
/// parsed trees. Patterns are expanded lazily, at load time.
#[derive(Default)]
pub struct SourceLoader {
    entries: Vec<FileEntry>,
    search_dirs: Vec<PathBuf>,
    search_extensions: Vec<String>,
    excluded_exts: HashSet<String>,
}

impl SourceLoader {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            search_dirs: Vec::new(),
            search_extensions: vec!["v".to_owned(), "sv".to_owned()],
            excluded_exts: HashSet::new(),
        }
    }

    pub fn add_files(&mut self, pattern: &str, base: Option<&Path>) {
        self.entries.push(FileEntry {
            pattern: pattern.to_owned(),
            base: base.map(Path::to_path_buf),
            library: None,
        });
    }

    pub fn add_library_files(&mut self, library: &str, pattern: &str, base: Option<&Path>) {
        self.entries.push(FileEntry {
            pattern: pattern.to_owned(),
            base: base.map(Path::to_path_buf),
            library: Some(library.to_owned()),
        });
    }

    pub fn add_search_directories(&mut self, dirs: impl IntoIterator<Item = PathBuf>) {
        self.search_dirs.extend(dirs);
    }

    pub fn add_search_extensions(&mut self, exts: impl IntoIterator<Item = String>) {
        for ext in exts {
            self.search_extensions.push(ext.trim_start_matches('.').to_owned());
        }
    }

    pub fn add_excluded_extension(&mut self, ext: &str) {
        self.excluded_exts.insert(ext.trim_start_matches('.').to_owned());
    }

    pub fn has_files(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Expands all recorded patterns and loads the resulting files in
    /// order. Returns the buffers plus any load error messages.
    pub fn load_sources(&self, sm: &SourceManager) -> (Vec<BufferId>, Vec<String>) {
        let mut buffers = Vec::new();
        let mut errors = Vec::new();

        for entry in &self.entries {
            let resolved = match &entry.base {
                Some(base) if !Path::new(&entry.pattern).is_absolute() => {
                    base.join(&entry.pattern).display().to_string()
                }
                _ => entry.pattern.clone(),
            };

            let mut matched = Vec::new();
            if resolved.contains(['*', '?', '[']) {
                match glob::glob(&resolved) {
                    Ok(paths) => {
                        for path in paths.flatten() {
                            matched.push(path);
                        }
                    }
                    Err(err) => {
                        errors.push(format!("invalid file pattern '{}': {}", resolved, err));
                        continue;
                    }
                }
                if matched.is_empty() {
                    log::warn!("no files matched pattern {:?}", resolved);
                }
            } else {
                matched.push(PathBuf::from(&resolved));
            }

            for path in matched {
                // Extension exclusion applies to positional files only; -v
                // library files are taken as-is.
                if entry.library.is_none() {
                    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                        if self.excluded_exts.contains(ext) {
                            log::debug!("skipping {:?}: excluded extension", path);
                            continue;
                        }
                    }
                }
                match sm.load_file(&path, entry.library.clone(), None) {
                    Ok(id) => buffers.push(id),
                    Err(err) => errors.push(format!("error: {:#}", err)),
                }
            }
        }

        (buffers, errors)
    }

    /// Loads and parses everything. Parsing fans out over a worker pool
    /// when more than one thread is configured, but the returned trees are
    /// always in input order. Single-unit compiles are inherently
    /// sequential: all buffers share one macro table.
    pub fn load_and_parse_sources(
        &self,
        sm: &SourceManager,
        bag: &OptionBag,
    ) -> (Vec<SyntaxTree>, Vec<String>) {
        let (buffers, errors) = self.load_sources(sm);
        if buffers.is_empty() {
            return (Vec::new(), errors);
        }

        let (main, libraries): (Vec<_>, Vec<_>) = buffers
            .iter()
            .copied()
            .partition(|&id| sm.buffer(id).library.is_none());

        let mut trees = Vec::new();
        if bag.source.single_unit {
            let mut inherited = None;
            if !main.is_empty() {
                let unit = syntax::parse_unit(sm, &main, bag, None);
                if bag.source.libraries_inherit_macros {
                    inherited = Some(unit.macros.clone());
                }
                trees.push(unit.tree);
            }
            for id in libraries {
                trees.push(syntax::parse_unit(sm, &[id], bag, inherited.clone()).tree);
            }
        } else {
            let parse_one = |&id: &BufferId| syntax::parse_unit(sm, &[id], bag, None).tree;
            trees = match self.thread_pool(bag.source.num_threads) {
                Some(pool) => pool.install(|| buffers.par_iter().map(parse_one).collect()),
                None => buffers.iter().map(parse_one).collect(),
            };
        }

        (trees, errors)
    }

    fn thread_pool(&self, num_threads: usize) -> Option<rayon::ThreadPool> {
        if num_threads == 1 {
            return None;
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|err| log::warn!("failed to build thread pool: {}", err))
            .ok()
    }

    /// Looks for a missing module definition in the library search
    /// directories, trying each registered extension in turn.
    pub fn search_for_module(&self, name: &str, sm: &SourceManager) -> Option<ParsedLibraryFile> {
        for dir in &self.search_dirs {
            for ext in &self.search_extensions {
                let candidate = dir.join(format!("{}.{}", name, ext));
                if candidate.exists() && !candidate.is_dir() {
                    log::debug!("found module '{}' in {:?}", name, candidate);
                    match sm.load_file(&candidate, Some("work".to_owned()), None) {
                        Ok(id) => return Some(ParsedLibraryFile { buffer: id }),
                        Err(err) => {
                            log::warn!("failed to load {:?}: {:#}", candidate, err);
                        }
                    }
                }
            }
        }
        None
    }
}

pub struct ParsedLibraryFile {
    pub buffer: BufferId,
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn create_files<const N: usize>(dir: &Path, names: [&str; N]) -> Result<[PathBuf; N]> {
        let mut paths = [(); N].map(|_| PathBuf::new());
        for (name, path) in names.into_iter().zip(&mut paths) {
            let rel_path = dir.join(name);
            if let Some(parent) = rel_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&rel_path, "")?;
            *path = rel_path.canonicalize()?;
        }
        Ok(paths)
    }

    #[test]
    fn resolves_includes_in_search_order() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let user = temp_dir.path().join("user");
        let system = temp_dir.path().join("system");
        fs::create_dir(&user)?;
        fs::create_dir(&system)?;
        let [user_hdr] = create_files(&user, ["common.svh"])?;
        let [system_hdr, system_only] = create_files(&system, ["common.svh", "sys.svh"])?;

        let mut sm = SourceManager::new();
        assert!(sm.add_user_directory(&user));
        assert!(sm.add_system_directory(&system));
        assert!(!sm.add_user_directory(&temp_dir.path().join("missing")));

        let found = sm.resolve_include("common.svh", None, false).map(|p| p.canonicalize());
        assert_eq!(found.transpose()?, Some(user_hdr));
        let found = sm.resolve_include("common.svh", None, true).map(|p| p.canonicalize());
        assert_eq!(found.transpose()?, Some(system_hdr));
        let found = sm.resolve_include("sys.svh", None, false).map(|p| p.canonicalize());
        assert_eq!(found.transpose()?, Some(system_only));
        assert_eq!(sm.resolve_include("nope.svh", None, false), None);
        Ok(())
    }

    #[test]
    fn loading_same_file_twice_reuses_buffer() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let [file] = create_files(temp_dir.path(), ["a.sv"])?;

        let sm = SourceManager::new();
        let first = sm.load_file(&file, None, None)?;
        let second = sm.load_file(&file, None, None)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn excluded_extensions_skip_positional_files_only() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let [kept, skipped] = create_files(temp_dir.path(), ["a.sv", "b.vh"])?;

        let sm = SourceManager::new();
        let mut loader = SourceLoader::new();
        loader.add_excluded_extension("vh");
        loader.add_files(kept.to_str().expect("utf-8 temp path"), None);
        loader.add_files(skipped.to_str().expect("utf-8 temp path"), None);
        loader.add_library_files("work", skipped.to_str().expect("utf-8 temp path"), None);

        let (buffers, errors) = loader.load_sources(&sm);
        assert!(errors.is_empty());
        assert_eq!(buffers.len(), 2);
        assert_eq!(sm.buffer(buffers[0]).path, kept);
        assert_eq!(sm.buffer(buffers[1]).path, skipped);
        assert_eq!(sm.buffer(buffers[1]).library.as_deref(), Some("work"));
        Ok(())
    }

    #[test]
    fn missing_explicit_file_reports_error() {
        let sm = SourceManager::new();
        let mut loader = SourceLoader::new();
        loader.add_files("definitely/not/here.sv", None);
        let (buffers, errors) = loader.load_sources(&sm);
        assert!(buffers.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unable to find or open file"));
    }
}

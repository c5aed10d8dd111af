//! Path resolution: user selections into PAR2 jobs
//!
//! Create runs produce one job per selected folder plus one implicit job for
//! loosely selected files. Verify and repair runs produce one job per PAR2
//! set, found either directly or by scanning folders recursively.
//!
//! Sibling folders such as `Album CD1` / `Album CD2` get disc-labelled display
//! names (`Album – disc 1`). Those labels are cosmetic: the archive name passed
//! to par2 is always derived from the folder itself.

mod disc;

pub use disc::{DiscIndicator, DiscMatcher, KeywordDiscMatcher};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Job, Operation, Redundancy};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Fallback archive name when nothing better can be derived
const DEFAULT_ARCHIVE_NAME: &str = "parity";

/// Separator between album prefix and disc label in display names
const DISC_LABEL_SEPARATOR: &str = " – disc ";

/// Per-run options for [`PathResolver::resolve`]
#[derive(Clone, Debug)]
pub struct ResolveOptions {
    /// Operation of the run
    pub operation: Operation,
    /// Include files in subfolders of selected folders (create only)
    pub recursive: bool,
    /// Archive name override, honoured when the run has a single job (create only)
    pub archive_name: Option<String>,
    /// Recovery data amount (create only)
    pub redundancy: Redundancy,
    /// Block size in bytes, `None` for automatic (create only)
    pub block_size: Option<u32>,
}

impl ResolveOptions {
    /// Options for `operation` seeded from configuration defaults
    pub fn from_config(operation: Operation, config: &Config) -> Self {
        Self {
            operation,
            recursive: config.create.recursive,
            archive_name: None,
            redundancy: config.create.redundancy(),
            block_size: config.create.block_size_bytes(),
        }
    }
}

/// Turns user-selected files and folders into an ordered list of jobs
#[derive(Clone)]
pub struct PathResolver {
    matcher: Arc<dyn DiscMatcher>,
}

impl PathResolver {
    /// Create a resolver using the given disc matcher
    pub fn new(matcher: Arc<dyn DiscMatcher>) -> Self {
        Self { matcher }
    }

    /// Create a resolver with the keyword matcher described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Arc::new(KeywordDiscMatcher::from_config(
            &config.disc,
        )?)))
    }

    /// Resolve a selection into jobs
    ///
    /// Resolution only reads the filesystem; the same selection on an
    /// unchanged tree always yields the same jobs in the same order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the selection is empty, names a path
    /// that does not exist, or contains no eligible files.
    pub fn resolve(&self, selection: &[PathBuf], options: &ResolveOptions) -> Result<Vec<Job>> {
        if selection.is_empty() {
            return Err(Error::invalid_input("nothing selected"));
        }

        let mut absolute = Vec::with_capacity(selection.len());
        for path in selection {
            if !path.exists() {
                return Err(Error::invalid_path("selected path does not exist", path));
            }
            absolute.push(std::path::absolute(path)?);
        }

        match options.operation {
            Operation::Create => self.resolve_create(&absolute, options),
            Operation::Verify | Operation::Repair => resolve_par2_sets(&absolute, options.operation),
        }
    }

    fn resolve_create(&self, selection: &[PathBuf], options: &ResolveOptions) -> Result<Vec<Job>> {
        let mut folders: Vec<PathBuf> = Vec::new();
        let mut loose: Vec<PathBuf> = Vec::new();
        let mut seen = HashSet::new();

        for path in selection {
            if !seen.insert(path.clone()) {
                continue;
            }
            if path.is_dir() {
                folders.push(path.clone());
            } else if is_par2_file(path) {
                debug!(?path, "skipping selected .par2 file in create mode");
            } else {
                loose.push(path.clone());
            }
        }
        folders.sort();

        // target directory -> relative input files
        let mut targets: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

        for folder in &folders {
            let files = list_input_files(folder, options.recursive)?;
            if files.is_empty() {
                warn!(?folder, "folder contains no files to protect, skipping");
                continue;
            }
            targets.insert(folder.clone(), files);
        }

        if !loose.is_empty() {
            add_loose_files(&mut targets, &loose);
        }

        if targets.is_empty() {
            return Err(Error::invalid_input("the selection contains no files to protect"));
        }

        let user_archive = options
            .archive_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if user_archive.is_some() && targets.len() > 1 {
            warn!(
                targets = targets.len(),
                "multiple folders selected, using folder names as archive names"
            );
        }

        let target_paths: Vec<PathBuf> = targets.keys().cloned().collect();
        let labels = self.display_names(&target_paths);

        let jobs = targets
            .into_iter()
            .zip(labels)
            .map(|((target_path, input_files), label)| {
                let (archive_name, base_name) = match user_archive {
                    Some(name) if target_paths.len() == 1 => (name.to_string(), name.to_string()),
                    _ => (folder_archive_name(&target_path), label),
                };
                Job {
                    operation: Operation::Create,
                    base_name,
                    archive_name,
                    target_path,
                    input_files,
                    redundancy: Some(options.redundancy),
                    block_size: options.block_size,
                    main_par2_path: None,
                }
            })
            .collect::<Vec<_>>();

        debug!(jobs = jobs.len(), "resolved create jobs");
        Ok(jobs)
    }

    /// Display names for create targets, with disc labels for sibling groups
    ///
    /// `targets` must be sorted; the returned names are unique.
    fn display_names(&self, targets: &[PathBuf]) -> Vec<String> {
        struct Candidate {
            parent: PathBuf,
            indicator: DiscIndicator,
        }

        let candidates: Vec<Option<Candidate>> = targets
            .iter()
            .map(|target| {
                let name = folder_name(target)?;
                let indicator = self.matcher.match_disc(&name)?;
                Some(Candidate {
                    parent: target.parent().map(Path::to_path_buf).unwrap_or_default(),
                    indicator,
                })
            })
            .collect();

        let mut group_sizes: HashMap<(PathBuf, String), usize> = HashMap::new();
        for c in candidates.iter().flatten() {
            *group_sizes
                .entry((c.parent.clone(), c.indicator.prefix.to_lowercase()))
                .or_default() += 1;
        }

        // Display prefix of each group comes from its first member in path order
        let mut group_prefix: HashMap<(PathBuf, String), String> = HashMap::new();
        for c in candidates.iter().flatten() {
            group_prefix
                .entry((c.parent.clone(), c.indicator.prefix.to_lowercase()))
                .or_insert_with(|| {
                    if c.indicator.prefix.is_empty() {
                        folder_name(&c.parent).unwrap_or_default()
                    } else {
                        c.indicator.prefix.clone()
                    }
                });
        }

        let names: Vec<String> = targets
            .iter()
            .zip(&candidates)
            .map(|(target, candidate)| {
                let plain = folder_name(target).unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());
                let Some(c) = candidate else {
                    return plain;
                };
                let key = (c.parent.clone(), c.indicator.prefix.to_lowercase());
                let siblings = group_sizes.get(&key).copied().unwrap_or(0);
                let prefix = group_prefix.get(&key).cloned().unwrap_or_default();

                if prefix.is_empty() || (siblings < 2 && !c.indicator.prefix.is_empty()) {
                    plain
                } else {
                    format!("{}{}{}", prefix, DISC_LABEL_SEPARATOR, c.indicator.number)
                }
            })
            .collect();

        make_unique(names)
    }
}

/// Derive the set key of a PAR2 file name
///
/// Strips `.par2` and a trailing volume suffix: `Album.vol003+04.par2` and
/// `Album.par2` both yield `Album`.
pub fn par2_set_key(file_name: &str) -> String {
    let stem = strip_suffix_ignore_case(file_name, ".par2").unwrap_or(file_name);
    match volume_suffix_start(stem) {
        Some(idx) => stem[..idx].to_string(),
        None => stem.to_string(),
    }
}

/// Whether `file_name` is a PAR2 volume file (`*.volNN+MM.par2`)
pub fn is_volume_file(file_name: &str) -> bool {
    strip_suffix_ignore_case(file_name, ".par2")
        .map(|stem| volume_suffix_start(stem).is_some())
        .unwrap_or(false)
}

/// Whether `path` has a `.par2` extension (any case)
pub fn is_par2_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("par2"))
        .unwrap_or(false)
}

/// Byte index where a `.volNN+MM` (or `.volNN-MM`) suffix starts in `stem`
fn volume_suffix_start(stem: &str) -> Option<usize> {
    let lower = stem.to_ascii_lowercase();
    let idx = lower.rfind(".vol")?;
    let rest = &lower[idx + 4..];
    let sep = rest.find(['+', '-'])?;
    let (first, second) = (&rest[..sep], &rest[sep + 1..]);
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    (all_digits(first) && all_digits(second)).then_some(idx)
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

fn folder_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

fn folder_archive_name(target: &Path) -> String {
    folder_name(target).unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string())
}

/// Append ` (2)`, ` (3)`, ... to repeated names, keeping the first occurrence as is
fn make_unique(names: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = names.iter().cloned().collect();
    let mut seen: HashSet<String> = HashSet::new();

    names
        .into_iter()
        .map(|name| {
            if seen.insert(name.clone()) {
                return name;
            }
            let mut n = 2;
            loop {
                let candidate = format!("{} ({})", name, n);
                if taken.insert(candidate.clone()) {
                    seen.insert(candidate.clone());
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// Files to protect in `folder`, relative to it, sorted, excluding PAR2 files
fn list_input_files(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to read {}: {}",
                folder.display(),
                e
            )))
        })?;
        if !entry.file_type().is_file() || is_par2_file(entry.path()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(folder) {
            files.push(relative.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Fold loosely selected files into one implicit target
///
/// The target is the deepest directory containing every loose file. If that
/// directory is already a selected folder the files join its job.
fn add_loose_files(targets: &mut BTreeMap<PathBuf, Vec<PathBuf>>, loose: &[PathBuf]) {
    let parents: Vec<&Path> = loose
        .iter()
        .map(|f| f.parent().unwrap_or_else(|| Path::new("")))
        .collect();
    let mut root = parents[0].to_path_buf();
    for parent in &parents[1..] {
        while !parent.starts_with(&root) {
            if !root.pop() {
                break;
            }
        }
    }

    let entry = targets.entry(root.clone()).or_default();
    for file in loose {
        if let Ok(relative) = file.strip_prefix(&root) {
            let relative = relative.to_path_buf();
            if !entry.contains(&relative) {
                entry.push(relative);
            }
        }
    }
    entry.sort();
}

fn resolve_par2_sets(selection: &[PathBuf], operation: Operation) -> Result<Vec<Job>> {
    let mut mains: Vec<PathBuf> = Vec::new();
    let mut seen = HashSet::new();

    for path in selection {
        let found = if path.is_dir() {
            scan_par2_sets(path)?
        } else if is_par2_file(path) {
            vec![main_file_for(path)]
        } else {
            warn!(?path, "not a .par2 file, skipping");
            Vec::new()
        };

        for main in found {
            if seen.insert(main.clone()) {
                mains.push(main);
            }
        }
    }

    if mains.is_empty() {
        return Err(Error::invalid_input("no .par2 files found in the selection"));
    }

    let jobs: Vec<Job> = mains
        .into_iter()
        .map(|main| {
            let target_path = match main.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let file_name = main
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = par2_set_key(&file_name);
            let base_name = if key.is_empty() {
                folder_name(&target_path).unwrap_or(file_name)
            } else {
                key
            };
            Job {
                operation,
                base_name,
                archive_name: String::new(),
                target_path,
                input_files: Vec::new(),
                redundancy: None,
                block_size: None,
                main_par2_path: Some(main),
            }
        })
        .collect();

    debug!(jobs = jobs.len(), %operation, "resolved PAR2 set jobs");
    Ok(jobs)
}

/// Main file of the set a directly selected PAR2 file belongs to
fn main_file_for(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return path.to_path_buf();
    };
    if !is_volume_file(&name) {
        return path.to_path_buf();
    }
    let main = path.with_file_name(format!("{}.par2", par2_set_key(&name)));
    if main.is_file() { main } else { path.to_path_buf() }
}

/// One main PAR2 file per set found anywhere below `folder`, sorted
fn scan_par2_sets(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut groups: BTreeMap<(PathBuf, String), Vec<PathBuf>> = BTreeMap::new();

    for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to scan {}: {}",
                folder.display(),
                e
            )))
        })?;
        if !entry.file_type().is_file() || !is_par2_file(entry.path()) {
            continue;
        }
        let path = entry.path().to_path_buf();
        let name = entry.file_name().to_string_lossy().into_owned();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        groups.entry((dir, par2_set_key(&name))).or_default().push(path);
    }

    let mut mains: Vec<PathBuf> = groups
        .into_values()
        .filter_map(|mut files| {
            files.sort();
            let main = files.iter().position(|f| {
                f.file_name()
                    .map(|n| !is_volume_file(&n.to_string_lossy()))
                    .unwrap_or(false)
            });
            match main {
                Some(idx) => Some(files.swap_remove(idx)),
                None => files.into_iter().next(),
            }
        })
        .collect();
    mains.sort();
    Ok(mains)
}

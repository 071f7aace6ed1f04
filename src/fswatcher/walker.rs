//! Directory tree walker
//!
//! Lazily yields the directories below a root in pre-order, down to a
//! configurable depth. Symlinked directories are not followed. A directory is
//! only listed once the consumer asks for the next item after it, so a
//! consumer that cancels never pays for a listing it will not use.

use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("visiting {path}: {source}")]
    Visit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("opening dir {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Walk `root` down to `depth` levels below it; a negative depth is unbounded
pub fn walk(root: impl Into<PathBuf>, depth: i64) -> Walk {
    let levels = usize::try_from(depth).ok();
    Walk {
        stack: vec![(root.into(), levels)],
        pending: None,
        cancelled: false,
    }
}

/// Pre-order iterator over directories; errors for unreadable paths are
/// yielded in place and the walk continues with the next sibling
#[derive(Debug)]
pub struct Walk {
    /// Directories still to visit, with the number of levels allowed below them
    stack: Vec<(PathBuf, Option<usize>)>,
    /// Last yielded directory, listed on the next call
    pending: Option<(PathBuf, Option<usize>)>,
    cancelled: bool,
}

impl Walk {
    /// Stop the walk; no further directories are listed or yielded
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.stack.clear();
        self.pending = None;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn descend(&mut self, dir: PathBuf, levels: Option<usize>) -> Result<(), WalkError> {
        let child_levels = match levels {
            Some(0) => return Ok(()),
            Some(n) => Some(n - 1),
            None => None,
        };

        let entries = fs::read_dir(&dir).map_err(|source| WalkError::List {
            path: dir.clone(),
            source,
        })?;

        let mut children: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        children.sort();

        // Reversed so the smallest name is popped first
        self.stack
            .extend(children.into_iter().rev().map(|child| (child, child_levels)));
        Ok(())
    }
}

impl Iterator for Walk {
    type Item = Result<PathBuf, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancelled {
            return None;
        }

        if let Some((dir, levels)) = self.pending.take() {
            if let Err(err) = self.descend(dir, levels) {
                return Some(Err(err));
            }
        }

        let (dir, levels) = self.stack.pop()?;
        if let Err(source) = fs::metadata(&dir) {
            return Some(Err(WalkError::Visit { path: dir, source }));
        }

        self.pending = Some((dir.clone(), levels));
        Some(Ok(dir))
    }
}

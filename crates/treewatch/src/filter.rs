//! Entry filtering shared by the scanner and the change pipeline.
//!
//! The same filter decides both what the initial scan puts in the tree and
//! which change notifications are reported, so the mirror and the event
//! stream can never disagree about an entry's visibility.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::file_info::FileInfo;

type CustomFilter = Arc<dyn Fn(&FileInfo) -> bool + Send + Sync>;

/// Predicate over filesystem entries.
///
/// An empty filter matches everything. Extension checks apply to files only;
/// directories always pass them so a recursive watch can descend into any
/// directory whose contents may match.
#[derive(Clone, Default)]
pub struct EventFilter {
    include_extensions: Vec<String>,
    exclude_extensions: Vec<String>,
    exclude_hidden: bool,
    exclude_globs: Vec<Glob>,
    exclude_set: Option<GlobSet>,
    custom: Option<CustomFilter>,
}

impl EventFilter {
    /// Create a filter that matches every entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report files with one of these extensions (case-insensitive).
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.include_extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Never report files with one of these extensions (case-insensitive).
    pub fn without_extensions(mut self, extensions: Vec<String>) -> Self {
        self.exclude_extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Skip entries whose name starts with a dot.
    pub fn exclude_hidden(mut self) -> Self {
        self.exclude_hidden = true;
        self
    }

    /// Skip entries whose path matches any of these glob patterns.
    pub fn exclude_patterns(mut self, patterns: &[&str]) -> Result<Self> {
        let mut globs = Vec::with_capacity(patterns.len());
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)?;
            builder.add(glob.clone());
            globs.push(glob);
        }
        self.exclude_set = Some(builder.build()?);
        self.exclude_globs = globs;
        Ok(self)
    }

    /// Attach an arbitrary predicate; an entry must also satisfy it to match.
    pub fn with_custom<F>(mut self, f: F) -> Self
    where
        F: Fn(&FileInfo) -> bool + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(f));
        self
    }

    /// Whether `info` passes every configured check.
    pub fn matches(&self, info: &FileInfo) -> bool {
        if self.exclude_hidden {
            if let Some(name) = info.file_name() {
                if name.starts_with('.') {
                    return false;
                }
            }
        }

        if let Some(set) = &self.exclude_set {
            if set.is_match(&info.path) {
                return false;
            }
        }

        // Directories pass extension checks so recursion can reach
        // matching files below them.
        if !info.is_dir {
            let ext = info.extension();
            if !self.include_extensions.is_empty() {
                match &ext {
                    Some(e) if self.include_extensions.contains(e) => {}
                    _ => return false,
                }
            }
            if let Some(e) = &ext {
                if self.exclude_extensions.contains(e) {
                    return false;
                }
            }
        }

        if let Some(custom) = &self.custom {
            if !custom(info) {
                return false;
            }
        }

        true
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("include_extensions", &self.include_extensions)
            .field("exclude_extensions", &self.exclude_extensions)
            .field("exclude_hidden", &self.exclude_hidden)
            .field("exclude_globs", &self.exclude_globs)
            .field("custom", &self.custom.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

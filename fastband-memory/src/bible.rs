//! Bible section loader
//!
//! Lazy-load provider for FROZEN reference sections. Section ids are
//! pattern-checked and path-confined to the configured root; nothing outside
//! the root is ever read. Loaded sections cache into FROZEN and land in HOT
//! for use.

use crate::{MemoryEntry, TierStore};
use fastband_core::{
    EntryKey, EntryOrigin, FastbandError, FastbandResult, MemoryTier, Payload, SessionId,
    TokenMeter,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Pattern every section id must match before any path work happens.
static SECTION_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-./]{1,128}$").expect("static pattern compiles"));

// ============================================================================
// BIBLE LOADER
// ============================================================================

/// Lazy loader for FROZEN bible sections.
pub struct BibleLoader {
    root: PathBuf,
    summary_tokens: u32,
    meter: Arc<dyn TokenMeter>,
    store: Arc<TierStore>,
}

impl BibleLoader {
    /// Create a loader over a section root.
    pub fn new(
        root: impl Into<PathBuf>,
        summary_tokens: u32,
        meter: Arc<dyn TokenMeter>,
        store: Arc<TierStore>,
    ) -> Self {
        Self {
            root: root.into(),
            summary_tokens,
            meter,
            store,
        }
    }

    /// The configured section root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a section by id into HOT (and cache it in FROZEN).
    ///
    /// The id must match `^[A-Za-z0-9_\-./]{1,128}$` and resolve strictly
    /// within the root; anything else fails with `path_escape`. A missing
    /// section fails with `not_found`. Returns the HOT entry.
    pub fn load_section(
        &self,
        id: &str,
        owner: Option<SessionId>,
    ) -> FastbandResult<MemoryEntry> {
        self.validate_id(id)?;

        let frozen_key = EntryKey::new(format!("frozen/{id}"))
            .map_err(|_| FastbandError::PathEscape { id: id.to_string() })?;
        let hot_key = EntryKey::new(format!("bible/{id}"))
            .map_err(|_| FastbandError::PathEscape { id: id.to_string() })?;

        // FROZEN cache hit serves the text without touching the disk again.
        let text = match self.store.peek(&frozen_key)? {
            Some(cached) => match cached.payload.as_text() {
                Some(text) => text.to_string(),
                None => self.read_section(id)?,
            },
            None => {
                let text = self.read_section(id)?;
                let cost = self.meter.size_text(&text);
                self.store.put(
                    frozen_key,
                    Payload::Text(text.clone()),
                    MemoryTier::Frozen,
                    cost,
                    EntryOrigin::BibleSection,
                    None,
                )?;
                text
            }
        };

        let cost = self.meter.size_text(&text);
        self.store.put(
            hot_key.clone(),
            Payload::Text(text),
            MemoryTier::Hot,
            cost,
            EntryOrigin::BibleSection,
            owner,
        )?;

        debug!(section = id, tokens = cost, "bible section loaded");
        self.store
            .peek(&hot_key)?
            .ok_or_else(|| FastbandError::NotFound {
                resource: format!("section {id}"),
            })
    }

    /// Load the section backing a tool, addressed as `tools/<tool>`.
    pub fn load_for_tool(
        &self,
        tool: &str,
        owner: Option<SessionId>,
    ) -> FastbandResult<MemoryEntry> {
        self.load_section(&format!("tools/{tool}"), owner)
    }

    /// Bootstrap summary: a section listing bounded by the configured
    /// token cap. Full sections arrive only on demand.
    pub fn bootstrap(&self) -> FastbandResult<String> {
        let mut ids = self.list_sections()?;
        ids.sort();

        let mut summary = String::from("Reference sections available on demand:\n");
        let ellipsis = "- ...\n";
        let budget = self
            .summary_tokens
            .saturating_sub(self.meter.size_text(ellipsis));
        for id in ids {
            let line = format!("- {id}\n");
            if self.meter.size_text(&summary) + self.meter.size_text(&line) > budget {
                summary.push_str(ellipsis);
                break;
            }
            summary.push_str(&line);
        }
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    /// Lexical validation, before any filesystem access.
    fn validate_id(&self, id: &str) -> FastbandResult<()> {
        if !SECTION_ID_PATTERN.is_match(id) {
            return Err(FastbandError::PathEscape { id: id.to_string() });
        }
        let path = Path::new(id);
        let all_normal = path.components().all(|c| matches!(c, Component::Normal(_)));
        if !all_normal || id.starts_with('/') {
            return Err(FastbandError::PathEscape { id: id.to_string() });
        }
        Ok(())
    }

    /// Resolve and read a section file, confining it to the root.
    fn read_section(&self, id: &str) -> FastbandResult<String> {
        let candidate = self.root.join(id);
        let candidate = if candidate.is_file() {
            candidate
        } else {
            self.root.join(format!("{id}.md"))
        };

        if !candidate.is_file() {
            return Err(FastbandError::NotFound {
                resource: format!("section {id}"),
            });
        }

        // Belt and braces on top of the lexical check: the canonicalized
        // path must stay under the canonicalized root.
        let root = self
            .root
            .canonicalize()
            .map_err(|e| FastbandError::unavailable(format!("bible root: {e}")))?;
        let resolved = candidate
            .canonicalize()
            .map_err(|_| FastbandError::NotFound {
                resource: format!("section {id}"),
            })?;
        if !resolved.starts_with(&root) {
            return Err(FastbandError::PathEscape { id: id.to_string() });
        }

        std::fs::read_to_string(&resolved).map_err(|_| FastbandError::NotFound {
            resource: format!("section {id}"),
        })
    }

    /// Relative ids of every section file under the root.
    fn list_sections(&self) -> FastbandResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let id = rel.to_string_lossy().trim_end_matches(".md").to_string();
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TierBounds;
    use fastband_core::HeuristicMeter;
    use std::fs;

    fn make_loader(root: &Path) -> (BibleLoader, Arc<TierStore>) {
        let store = Arc::new(TierStore::new(TierBounds {
            hot_max_tokens: 80_000,
            cool_max_items: 100,
            cool_max_tokens: 50_000,
            cold_max_items: 500,
            cold_max_tokens: 200_000,
        }));
        let loader = BibleLoader::new(
            root,
            1_000,
            Arc::new(HeuristicMeter::default()),
            Arc::clone(&store),
        );
        (loader, store)
    }

    fn seed_sections(root: &Path) {
        fs::create_dir_all(root.join("tools")).unwrap();
        fs::write(root.join("conventions.md"), "Always run the linter.").unwrap();
        fs::write(root.join("tools/grep.md"), "How to search the tree.").unwrap();
    }

    #[test]
    fn test_load_section_lands_in_hot_and_frozen() {
        let dir = tempfile::tempdir().unwrap();
        seed_sections(dir.path());
        let (loader, store) = make_loader(dir.path());

        let entry = loader.load_section("conventions", None).unwrap();
        assert_eq!(entry.tier, MemoryTier::Hot);
        assert_eq!(
            entry.payload.as_text(),
            Some("Always run the linter.")
        );

        let frozen = store
            .peek(&EntryKey::new("frozen/conventions").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(frozen.tier, MemoryTier::Frozen);
    }

    #[test]
    fn test_load_for_tool_resolves_tools_prefix() {
        let dir = tempfile::tempdir().unwrap();
        seed_sections(dir.path());
        let (loader, _store) = make_loader(dir.path());

        let entry = loader.load_for_tool("grep", None).unwrap();
        assert_eq!(entry.payload.as_text(), Some("How to search the tree."));
    }

    #[test]
    fn test_second_load_serves_from_frozen_cache() {
        let dir = tempfile::tempdir().unwrap();
        seed_sections(dir.path());
        let (loader, _store) = make_loader(dir.path());

        loader.load_section("conventions", None).unwrap();
        // Remove the backing file; the cache must still serve it.
        fs::remove_file(dir.path().join("conventions.md")).unwrap();
        let entry = loader.load_section("conventions", None).unwrap();
        assert_eq!(entry.payload.as_text(), Some("Always run the linter."));
    }

    #[test]
    fn test_missing_section_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        seed_sections(dir.path());
        let (loader, _store) = make_loader(dir.path());

        let err = loader.load_section("nope", None).unwrap_err();
        assert!(matches!(err, FastbandError::NotFound { .. }));
    }

    #[test]
    fn test_escape_attempts_fail_before_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        seed_sections(dir.path());
        let (loader, _store) = make_loader(dir.path());

        for id in ["../secrets", "a/../../b", "/etc/passwd", "", "a b"] {
            let err = loader.load_section(id, None).unwrap_err();
            assert!(
                matches!(err, FastbandError::PathEscape { .. }),
                "{id:?} should be path_escape, got {err:?}"
            );
        }
    }

    #[test]
    fn test_bootstrap_lists_sections_within_cap() {
        let dir = tempfile::tempdir().unwrap();
        seed_sections(dir.path());
        let (loader, _store) = make_loader(dir.path());

        let summary = loader.bootstrap().unwrap();
        assert!(summary.contains("conventions"));
        assert!(summary.contains("tools/grep"));
        assert!(HeuristicMeter::default().size_text(&summary) <= 1_000);
    }

    #[test]
    fn test_bootstrap_truncates_at_token_cap() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        for i in 0..500 {
            fs::write(dir.path().join(format!("section-{i:03}.md")), "body").unwrap();
        }
        let store = Arc::new(TierStore::new(TierBounds {
            hot_max_tokens: 80_000,
            cool_max_items: 100,
            cool_max_tokens: 50_000,
            cold_max_items: 500,
            cold_max_tokens: 200_000,
        }));
        let loader = BibleLoader::new(
            dir.path(),
            100,
            Arc::new(HeuristicMeter::default()),
            store,
        );

        let summary = loader.bootstrap().unwrap();
        assert!(HeuristicMeter::default().size_text(&summary) <= 100);
        assert!(summary.ends_with("- ...\n"));
    }
}

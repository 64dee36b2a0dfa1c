use std::collections::HashSet;

use globset::{GlobBuilder, GlobMatcher};
use sweep_model::{Host, Server};

use crate::error::PanelError;
use crate::panel::PanelApi;

/// Directory a pattern lives in, with a trailing slash. Patterns without a
/// directory component are scoped to `/`.
pub fn scope_directory(pattern: &str) -> String {
    match pattern.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => format!("{dir}/"),
        _ => "/".to_string(),
    }
}

/// `*` also crosses `/`, same as shell fnmatch.
pub fn compile_pattern(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()?
        .compile_matcher())
}

/// Qualifies `names` with `directory` and keeps the ones any pattern matches.
/// Listing order is kept and duplicates are dropped.
pub fn match_listing(directory: &str, names: &[String], patterns: &[GlobMatcher]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut matched = Vec::new();
    for name in names {
        let path = format!("{directory}{name}");
        if let Some(pattern) = patterns.iter().find(|p| p.is_match(&path)) {
            tracing::debug!(pattern = %pattern.glob(), %path, "matched deletion pattern");
            if seen.insert(path.clone()) {
                matched.push(path);
            }
        }
    }
    matched
}

/// Resolves the server's deletion patterns against one live listing of the
/// first pattern's directory.
pub async fn resolve(
    panel: &dyn PanelApi,
    host: &Host,
    server: &Server,
) -> Result<Vec<String>, PanelError> {
    let Some(first) = server.files_to_delete.first() else {
        return Ok(Vec::new());
    };
    let directory = scope_directory(first);

    let patterns: Vec<GlobMatcher> = server
        .files_to_delete
        .iter()
        .filter_map(|p| match compile_pattern(p) {
            Ok(m) => Some(m),
            Err(err) => {
                tracing::warn!(server_id = %server.id, pattern = %p, %err, "skipping invalid deletion pattern");
                None
            }
        })
        .collect();

    let names = panel.list_directory(host, server, &directory).await?;
    let matched = match_listing(&directory, &names, &patterns);
    for path in &matched {
        tracing::info!(server_id = %server.id, %path, "matched file");
    }
    Ok(matched)
}

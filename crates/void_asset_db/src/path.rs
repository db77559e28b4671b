//! Path helpers for project-relative asset paths.
//!
//! Apart from [`resolve_root`], every function here is pure string
//! manipulation on forward-slash paths. Malformed input is returned unchanged
//! rather than reported as an error.

use std::path::{Path, PathBuf};

/// Extension of the per-asset sidecar file
pub const META_EXT: &str = ".meta";

/// Bundle of loose files that sit directly in the asset root
pub const ROOT_BUNDLE: &str = ".";

/// Absolute, symlink-free form of an asset root.
///
/// OS change notifications carry resolved absolute paths, so the index and
/// the watcher key everything off this form. A root that does not exist yet
/// is only made absolute against the working directory.
pub fn resolve_root(root: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(root) {
        return resolved;
    }
    if root.is_absolute() {
        return root.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(root))
        .unwrap_or_else(|_| root.to_path_buf())
}

/// Convert backslashes to forward slashes and collapse duplicate separators.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_slash = false;

    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if last_slash {
                continue;
            }
            last_slash = true;
        } else {
            last_slash = false;
        }
        out.push(c);
    }

    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Strip the asset root from a full path.
///
/// Returns `full_path` unchanged when it is shorter than the root or does not
/// live under it.
pub fn short_path(full_path: &str, asset_root: &str) -> String {
    if full_path.len() < asset_root.len() {
        return full_path.to_string();
    }

    let full = normalize(full_path);
    let root = normalize(asset_root);

    match full.strip_prefix(root.as_str()) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || root.ends_with('/') => {
            rest.trim_start_matches('/').to_string()
        }
        _ => full_path.to_string(),
    }
}

/// First segment of a short path, or `"."` for root-level entries.
pub fn bundle_name(path: &str) -> String {
    let path = normalize(path);
    let path = path.trim_start_matches('/');
    match path.split_once('/') {
        Some((first, _)) if !first.is_empty() => first.to_string(),
        _ => ROOT_BUNDLE.to_string(),
    }
}

/// File name including its extension.
pub fn file_name_ext(path: &str) -> String {
    let path = normalize(path);
    match path.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => path,
    }
}

/// File name with the last extension removed.
pub fn file_name_no_ext(path: &str) -> String {
    let name = file_name_ext(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Folder containing `path`, or an empty string for a bare file name.
pub fn folder_path(path: &str) -> String {
    let path = normalize(path);
    match path.rsplit_once('/') {
        Some((folder, _)) => folder.to_string(),
        None => String::new(),
    }
}

/// Lower-case extension without the dot.
pub fn extension(path: &str) -> String {
    let name = file_name_ext(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}

/// Sidecar path for an asset path.
pub fn meta_path(path: &str) -> String {
    format!("{}{}", path, META_EXT)
}

/// Whether `path` names a sidecar file.
pub fn is_meta(path: &str) -> bool {
    path.len() > META_EXT.len() && path.to_lowercase().ends_with(META_EXT)
}

/// Case-insensitive search of `pattern` inside `name`.
///
/// `?` matches any single character and `*` matches any run of characters.
/// The pattern may match anywhere in the name.
pub fn search_match(name: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }

    let name: Vec<char> = name.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    if !pattern.iter().any(|c| *c == '*' || *c == '?') {
        let needle: String = pattern.iter().collect();
        let hay: String = name.iter().collect();
        return hay.contains(&needle);
    }

    (0..=name.len()).any(|start| wildcard_prefix(&name[start..], &pattern))
}

/// Whether `pattern` matches some prefix of `text`.
fn wildcard_prefix(text: &[char], pattern: &[char]) -> bool {
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    loop {
        if p == pattern.len() {
            return true;
        }
        if t < text.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            if st >= text.len() {
                return false;
            }
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
}

//! Company-folder aliasing: keeps "JPMorgan" from becoming a sibling of an
//! existing "J.P. Morgan" folder.

use crate::classifier::Classifier;
use crate::papersort::layout::{Layout, split_path};
use crate::storage::{StorageDriver, join_path};
use std::collections::BTreeMap;

pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Returns the existing folder `new_name` should be filed under, if any.
/// Case-insensitive equality wins outright; otherwise the classifier is
/// asked, and its answer only counts if it names a listed folder.
pub fn find_matching_folder(
    classifier: &dyn Classifier,
    new_name: &str,
    existing: &[String],
) -> Option<String> {
    if existing.is_empty() {
        return None;
    }
    if let Some(exact) = existing.iter().find(|f| same_name(f, new_name)) {
        return Some(exact.clone());
    }
    let proposed = classifier.find_matching_folder(new_name, existing)?;
    let accepted = existing.iter().find(|f| same_name(f, &proposed)).cloned();
    if accepted.is_none() {
        tracing::warn!("ignoring folder match '{proposed}' for '{new_name}': not an existing folder");
    }
    accepted
}

/// Leaf folders (no subfolders) at or below `top`, mapped to their parent
/// path. Keyed by bare name because the classifier compares names; when two
/// leaves share a name, the first in walk order (sorted by path) wins and
/// the later one is not offered for matching.
pub fn gather_leaf_folders(driver: &dyn StorageDriver, top: &str) -> BTreeMap<String, String> {
    fn walk(driver: &dyn StorageDriver, current: &str, out: &mut BTreeMap<String, String>) {
        let subfolders = match driver.list_folders(current) {
            Ok(folders) => folders,
            Err(err) => {
                tracing::debug!("cannot list '{current}': {err}");
                return;
            }
        };
        if subfolders.is_empty() {
            let (parent, name) = current.rsplit_once('/').unwrap_or(("", current));
            if name.is_empty() {
                return;
            }
            match out.get(name) {
                Some(kept) => tracing::debug!("leaf '{current}' shadowed by '{kept}/{name}'"),
                None => {
                    out.insert(name.to_string(), parent.to_string());
                }
            }
            return;
        }
        for folder in subfolders {
            walk(driver, &join_path(current, &folder.name), out);
        }
    }

    let mut out = BTreeMap::new();
    walk(driver, top.trim_matches('/'), &mut out);
    out
}

/// Rewrites a `By company` path to reuse an existing equivalent folder found
/// anywhere under the same top-level category.
pub fn resolve_company_folder(
    layout: &Layout,
    driver: &dyn StorageDriver,
    classifier: &dyn Classifier,
    suggested_path: &str,
) -> String {
    if !layout.is_company_path(suggested_path) {
        return suggested_path.to_string();
    }
    let parts = split_path(suggested_path);
    let (Some(company), Some(top)) = (parts.last(), parts.first()) else {
        return suggested_path.to_string();
    };

    let folders = gather_leaf_folders(driver, top);
    if folders.is_empty() {
        return suggested_path.to_string();
    }
    let names: Vec<String> = folders.keys().cloned().collect();
    match find_matching_folder(classifier, company, &names) {
        Some(matched) if matched != *company => {
            let parent = folders.get(&matched).map(String::as_str).unwrap_or_default();
            let resolved = join_path(parent, &matched);
            tracing::info!("folder match: '{company}' -> '{resolved}'");
            resolved
        }
        _ => suggested_path.to_string(),
    }
}

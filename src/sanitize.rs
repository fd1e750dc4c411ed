// Post-parse pass: everything a raw extraction is not allowed to keep.
// Runs on every listing before it is attached to the crawl tree.

use tracing::{debug, info};
use url::Url;

use crate::listing::{DirArena, DirId, Listing};
use crate::remote;
use crate::utils;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "ftp", "ftps"];

/// Levels of ancestry inspected by the symlink check.
const SYMLINK_DEPTH: usize = 8;

/// Sanitize `listing`, parsed for the node `dir`. Returns `true` when the
/// listing structurally equals an ancestor (a symlink loop); the caller
/// must then drop it and mark the directory as an error.
pub fn sanitize(arena: &DirArena, dir: DirId, listing: &mut Listing, check_parents: bool) -> bool {
    let base = arena.get(dir).url.clone();

    for sub in &mut listing.subdirs {
        sub.url = utils::strip_sort_query(&sub.url);
    }

    if check_parents {
        listing
            .subdirs
            .retain(|sub| in_scope(&base, &sub.url, utils::same_host_and_directory_dir));
        listing
            .files
            .retain(|file| in_scope(&base, &file.url, utils::same_host_and_directory_file));
    }

    strip_fragments(listing);
    prune_dynamic_entries(arena, dir, listing);
    symlink_loop(arena, dir, listing)
}

fn in_scope(base: &Url, check: &Url, same_dir: fn(&Url, &Url) -> bool) -> bool {
    if remote::is_whitelisted_host(check) {
        return true;
    }
    if !ALLOWED_SCHEMES.contains(&check.scheme()) {
        debug!("Dropping {} (scheme)", check);
        return false;
    }
    if !same_dir(base, check) {
        debug!("Dropping {} (outside {})", check, base);
        return false;
    }
    true
}

/// HTTP(S) entry URLs never keep fragments; FTP(S) ones do (the fragment
/// can be part of the remote file name there).
fn strip_fragments(listing: &mut Listing) {
    fn cleanup(seen: &mut Vec<String>, url: &mut Url) -> bool {
        if matches!(url.scheme(), "http" | "https") && url.fragment().is_some() {
            url.set_fragment(None);
        }
        if seen.iter().any(|s| s == url.as_str()) {
            return false;
        }
        seen.push(url.to_string());
        true
    }
    let mut seen: Vec<String> = Vec::new();
    listing.subdirs.retain_mut(|sub| cleanup(&mut seen, &mut sub.url));
    seen.clear();
    listing.files.retain_mut(|file| cleanup(&mut seen, &mut file.url));
}

/// Linux pseudo-filesystems exposed over HTTP have no crawl value and
/// recurse forever. Recognize them by the directory name plus a telltale
/// child and drop the contents.
fn prune_dynamic_entries(arena: &DirArena, dir: DirId, listing: &mut Listing) {
    listing.files.retain(|file| file.name != "core");

    let name = arena.get(dir).name.as_str();
    let has_subdir = |wanted: &[&str]| {
        listing
            .subdirs
            .iter()
            .any(|sub| wanted.contains(&sub.name.as_str()))
    };
    let clear = match name {
        "dev" => has_subdir(&["bus", "cpu", "disk"]),
        "lib" => has_subdir(&["firmware", "modules"]),
        "proc" => listing
            .subdirs
            .iter()
            .any(|sub| !sub.name.is_empty() && sub.name.chars().all(|c| c.is_ascii_digit())),
        "run" => has_subdir(&["sudo", "user"]),
        "snap" => has_subdir(&["bin"]),
        "sys" => has_subdir(&["dev", "kernel"]),
        "var" => has_subdir(&["lib", "run"]),
        "usr" => {
            listing.subdirs.retain(|sub| {
                !matches!(
                    sub.name.as_str(),
                    "bin" | "include" | "lib" | "lib32" | "share" | "src"
                )
            });
            false
        }
        _ => false,
    };
    if clear {
        info!(
            "{} looks like a pseudo-filesystem, dropping its contents",
            arena.get(dir).url
        );
        listing.subdirs.clear();
        listing.files.clear();
    }
}

/// A directory whose contents exactly match an ancestor's is a filesystem
/// cycle or a virtual mirror; recursing into it never terminates.
fn symlink_loop(arena: &DirArena, dir: DirId, listing: &mut Listing) -> bool {
    if listing.is_empty() {
        return false;
    }
    for ancestor in arena.ancestors(dir).take(SYMLINK_DEPTH) {
        let node = arena.get(ancestor);
        let files_match = node.files.len() == listing.files.len()
            && node
                .files
                .iter()
                .zip(&listing.files)
                .all(|(a, b)| a.name == b.name && a.size == b.size);
        let subdirs_match = node.subdirs.len() == listing.subdirs.len()
            && node
                .subdirs
                .iter()
                .zip(&listing.subdirs)
                .all(|(a, b)| arena.get(*a).name == b.name);
        if files_match && subdirs_match {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{FileEntry, FileSize, SubdirEntry};

    fn arena_with_root(url: &str) -> (DirArena, DirId) {
        let mut arena = DirArena::new();
        let root = arena.alloc(Url::parse(url).unwrap(), None);
        (arena, root)
    }

    fn subdir(url: &str, name: &str) -> SubdirEntry {
        SubdirEntry::new(Url::parse(url).unwrap(), name.to_string())
    }

    fn file(url: &str, name: &str, size: u64) -> FileEntry {
        FileEntry::new(
            Url::parse(url).unwrap(),
            name.to_string(),
            Some(FileSize::Precise(size)),
        )
    }

    #[test]
    fn test_scope_drops_cross_host() {
        let (arena, root) = arena_with_root("http://h/p/");
        let mut listing = Listing::default();
        listing.push_subdir(subdir("http://h/p/ok/", "ok"));
        listing.push_subdir(subdir("http://evil/elsewhere/", "elsewhere"));
        listing.push_file(file("http://h/p/a.txt", "a.txt", 1));
        listing.push_file(file("http://h/other/b.txt", "b.txt", 1));
        listing.push_file(file("https://drive.google.com/uc?id=x", "drive.bin", 1));
        assert!(!sanitize(&arena, root, &mut listing, true));
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.files.len(), 2);
        assert_eq!(listing.files[1].name, "drive.bin");
    }

    #[test]
    fn test_scope_keeps_ftp() {
        let (arena, root) = arena_with_root("ftp://h/p/");
        let mut listing = Listing::default();
        listing.push_file(file("ftp://h/p/a.txt", "a.txt", 1));
        assert!(!sanitize(&arena, root, &mut listing, true));
        assert_eq!(listing.files.len(), 1);
    }

    #[test]
    fn test_fragment_stripped_and_deduped() {
        let (arena, root) = arena_with_root("http://h/p/");
        let mut listing = Listing::default();
        listing.push_file(file("http://h/p/a.txt#frag", "a.txt", 1));
        listing.push_file(file("http://h/p/a.txt", "a.txt", 1));
        assert!(!sanitize(&arena, root, &mut listing, true));
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].url.as_str(), "http://h/p/a.txt");
    }

    #[test]
    fn test_fragment_kept_on_ftp() {
        let (arena, root) = arena_with_root("ftp://h/p/");
        let mut listing = Listing::default();
        listing.push_file(file("ftp://h/p/a%23b", "a#b", 1));
        listing.push_file(file("ftp://h/p/c.txt#mid", "c.txt", 1));
        assert!(!sanitize(&arena, root, &mut listing, true));
        assert_eq!(listing.files.len(), 2);
        assert!(listing.files[1].url.as_str().contains('#'));
    }

    #[test]
    fn test_sort_query_stripped_from_subdirs() {
        let (arena, root) = arena_with_root("http://h/p/");
        let mut listing = Listing::default();
        listing.push_subdir(subdir("http://h/p/sub/?C=N;O=A", "sub"));
        assert!(!sanitize(&arena, root, &mut listing, true));
        assert_eq!(listing.subdirs[0].url.as_str(), "http://h/p/sub/");
    }

    #[test]
    fn test_proc_pruned() {
        let (mut arena, root) = arena_with_root("http://h/");
        let proc = arena.alloc(Url::parse("http://h/proc/").unwrap(), Some(root));
        let mut listing = Listing::default();
        listing.push_subdir(subdir("http://h/proc/1/", "1"));
        listing.push_subdir(subdir("http://h/proc/2/", "2"));
        listing.push_subdir(subdir("http://h/proc/self/", "self"));
        assert!(!sanitize(&arena, proc, &mut listing, true));
        assert!(listing.subdirs.is_empty());
        assert!(listing.files.is_empty());
    }

    #[test]
    fn test_usr_partial_prune() {
        let (mut arena, root) = arena_with_root("http://h/");
        let usr = arena.alloc(Url::parse("http://h/usr/").unwrap(), Some(root));
        let mut listing = Listing::default();
        listing.push_subdir(subdir("http://h/usr/bin/", "bin"));
        listing.push_subdir(subdir("http://h/usr/share/", "share"));
        listing.push_subdir(subdir("http://h/usr/games/", "games"));
        assert!(!sanitize(&arena, usr, &mut listing, true));
        assert_eq!(listing.subdirs.len(), 1);
        assert_eq!(listing.subdirs[0].name, "games");
    }

    #[test]
    fn test_core_file_removed() {
        let (arena, root) = arena_with_root("http://h/");
        let mut listing = Listing::default();
        listing.push_file(file("http://h/core", "core", 4096));
        listing.push_file(file("http://h/core.txt", "core.txt", 1));
        assert!(!sanitize(&arena, root, &mut listing, true));
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "core.txt");
    }

    #[test]
    fn test_symlink_loop_detected() {
        let (mut arena, root) = arena_with_root("http://h/a/");
        {
            let node = arena.get_mut(root);
            node.files = vec![file("http://h/a/x.txt", "x.txt", 10)];
        }
        let b = arena.alloc(Url::parse("http://h/a/b/").unwrap(), Some(root));
        arena.get_mut(root).subdirs.push(b);
        {
            // root lists exactly one subdir named b
            let sub = arena.get(root).subdirs[0];
            assert_eq!(arena.get(sub).name, "b");
        }
        // b parses to the same contents as root
        let mut listing = Listing::default();
        listing.push_subdir(subdir("http://h/a/b/b/", "b"));
        listing.push_file(file("http://h/a/b/x.txt", "x.txt", 10));
        assert!(sanitize(&arena, b, &mut listing, true));
    }

    #[test]
    fn test_different_contents_not_a_loop() {
        let (mut arena, root) = arena_with_root("http://h/a/");
        arena.get_mut(root).files = vec![file("http://h/a/x.txt", "x.txt", 10)];
        let b = arena.alloc(Url::parse("http://h/a/b/").unwrap(), Some(root));
        arena.get_mut(root).subdirs.push(b);
        let mut listing = Listing::default();
        listing.push_file(file("http://h/a/b/y.txt", "y.txt", 20));
        assert!(!sanitize(&arena, b, &mut listing, true));
        assert_eq!(listing.files.len(), 1);
    }

    #[test]
    fn test_sanitize_idempotent() {
        let (arena, root) = arena_with_root("http://h/p/");
        let mut listing = Listing::default();
        listing.push_subdir(subdir("http://h/p/sub/?C=N;O=A", "sub"));
        listing.push_file(file("http://h/p/a.txt#x", "a.txt", 1));
        sanitize(&arena, root, &mut listing, true);
        let subdirs = listing.subdirs.clone();
        let files = listing.files.clone();
        sanitize(&arena, root, &mut listing, true);
        assert_eq!(listing.subdirs, subdirs);
        assert_eq!(listing.files, files);
    }
}

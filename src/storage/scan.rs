//! Startup scan of a storage node's export root.
//!
//! Reports every file plus every empty directory, as namespace paths: a
//! leading `/`, the root prefix stripped, and a trailing `/` marking
//! directories. Non-empty directories are implied by their children and
//! are not listed.

use std::fs;
use std::io;
use std::path::Path;

pub fn scan_paths(root: &Path) -> io::Result<Vec<String>> {
    let mut paths = Vec::new();
    walk(root, root, &mut paths)?;
    paths.sort();
    Ok(paths)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if dir_is_empty(&path)? {
                out.push(namespace_path(root, &path, true));
            } else {
                walk(root, &path, out)?;
            }
        } else if file_type.is_file() {
            out.push(namespace_path(root, &path, false));
        }
    }
    Ok(())
}

fn dir_is_empty(dir: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

fn namespace_path(root: &Path, path: &Path, is_dir: bool) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut namespace = String::from("/");
    namespace.push_str(&relative.to_string_lossy());
    if is_dir {
        namespace.push('/');
    }
    namespace
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scan_reports_files_and_empty_dirs() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("docs/archive")).unwrap();
        fs::create_dir_all(root.path().join("empty")).unwrap();
        fs::write(root.path().join("docs/a.txt"), b"a").unwrap();
        fs::write(root.path().join("docs/archive/old.txt"), b"o").unwrap();
        fs::write(root.path().join("top.txt"), b"t").unwrap();

        let paths = scan_paths(root.path()).unwrap();
        assert_eq!(
            paths,
            vec![
                "/docs/a.txt".to_string(),
                "/docs/archive/old.txt".to_string(),
                "/empty/".to_string(),
                "/top.txt".to_string(),
            ]
        );
    }

    #[test]
    fn scan_of_empty_root_is_empty() {
        let root = TempDir::new().unwrap();
        assert!(scan_paths(root.path()).unwrap().is_empty());
    }
}

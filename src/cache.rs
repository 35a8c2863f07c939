//! Content-addressed processing cache: identifier -> SHA-256 hex digest, kept
//! sorted by identifier, persisted as one `IDENTIFIER HEXDIGEST` line per entry.

use crate::error::CacheError;
use crate::util::{create_with_backoff, open_with_backoff, remove_with_backoff, rename_with_backoff};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const DIGEST_CHUNK: usize = 64 * 1024;

/// SHA-256 of a file's bytes, streamed in fixed-size chunks.
pub fn digest(path: &Path) -> io::Result<String> {
    let mut file = open_with_backoff(path, 16, 50)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStore {
    path: PathBuf,
    entries: Vec<(String, String)>,
}

impl CacheStore {
    /// Empty store backed by `path` (nothing is read).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), entries: Vec::new() }
    }

    /// Read the store at `path`; a missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let mut store = Self::new(path);
        let file = match open_with_backoff(&store.path, 16, 50) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(store),
            Err(source) => return Err(CacheError::Io { path: store.path.clone(), source }),
        };
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| CacheError::Io { path: store.path.clone(), source })?;
            let malformed = || CacheError::Malformed { path: store.path.clone(), line: i + 1 };
            let (id, hash) = line.rsplit_once(' ').ok_or_else(malformed)?;
            if id.is_empty() || hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed());
            }
            store.entries.push((id.to_string(), hash.to_string()));
        }
        // later lines win on duplicate identifiers
        store.entries.reverse();
        store.entries.sort_by(|a, b| a.0.cmp(&b.0));
        store.entries.dedup_by(|a, b| a.0 == b.0);
        tracing::debug!(path = %store.path.display(), entries = store.entries.len(), "loaded cache");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, id: &str) -> Result<usize, usize> {
        self.entries.binary_search_by(|(k, _)| k.as_str().cmp(id))
    }

    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.position(id).ok().map(|i| self.entries[i].1.as_str())
    }

    /// Insert or replace, keeping the entries sorted and unique.
    pub fn upsert(&mut self, id: &str, hash: &str) -> Result<(), CacheError> {
        if id.is_empty() || id.contains(['\n', '\r']) {
            return Err(CacheError::InvalidIdentifier(id.to_string()));
        }
        match self.position(id) {
            Ok(i) => self.entries[i].1 = hash.to_string(),
            Err(i) => self.entries.insert(i, (id.to_string(), hash.to_string())),
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Write the store without ever leaving the live file truncated or absent.
    pub fn persist(&self) -> Result<(), CacheError> {
        self.commit(|path| {
            let mut w = BufWriter::new(create_with_backoff(path, 16, 50)?);
            for (id, hash) in &self.entries {
                writeln!(w, "{id} {hash}")?;
            }
            w.flush()?;
            w.get_ref().sync_all()
        })
    }

    /// Move the live file aside, run `write` against the live path, then drop the
    /// saved copy. On failure the partial file is removed and the saved copy restored.
    fn commit<F>(&self, write: F) -> Result<(), CacheError>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        let io_err = |path: &Path, source| CacheError::Io { path: path.to_path_buf(), source };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let tmp = self.tmp_path();
        let had_live = self.path.exists();
        if had_live {
            rename_with_backoff(&self.path, &tmp, 16, 50).map_err(|e| io_err(&self.path, e))?;
        }

        if let Err(e) = write(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "cache write failed; restoring previous cache");
            let _ = remove_with_backoff(&self.path, 16, 50);
            if had_live {
                rename_with_backoff(&tmp, &self.path, 16, 50).map_err(|e| io_err(&tmp, e))?;
            }
            return Err(io_err(&self.path, e));
        }

        if had_live {
            remove_with_backoff(&tmp, 16, 50).map_err(|e| io_err(&tmp, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H1: &str = "aa11";
    const H2: &str = "bb22";

    #[test]
    fn upsert_keeps_sorted_and_unique() {
        let mut c = CacheStore::new("unused");
        for id in ["m", "c", "x", "a", "c", "m"] {
            c.upsert(id, H1).unwrap();
        }
        c.upsert("c", H2).unwrap();
        let ids: Vec<&str> = c.entries().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(ids, ["a", "c", "m", "x"]);
        assert_eq!(c.lookup("c"), Some(H2));
        assert_eq!(c.lookup("b"), None);
    }

    #[test]
    fn identifiers_with_line_breaks_are_rejected() {
        let mut c = CacheStore::new("unused");
        assert!(matches!(c.upsert("a\nb", H1), Err(CacheError::InvalidIdentifier(_))));
        assert!(matches!(c.upsert("", H1), Err(CacheError::InvalidIdentifier(_))));
        assert!(c.is_empty());
    }

    #[test]
    fn failed_commit_restores_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("data.cache");
        let mut c = CacheStore::new(&p);
        c.upsert("keep.csv", H1).unwrap();
        c.persist().unwrap();
        let before = fs::read(&p).unwrap();

        c.upsert("new.csv", H2).unwrap();
        let err = c
            .commit(|path| {
                fs::write(path, b"half a li")?;
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            })
            .unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
        assert_eq!(fs::read(&p).unwrap(), before);
        assert!(!c.tmp_path().exists());
        assert_eq!(CacheStore::load(&p).unwrap().lookup("keep.csv"), Some(H1));
    }

    #[test]
    fn failed_first_commit_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("sub").join("data.cache");
        let c = CacheStore::new(&p);
        let _ = c.commit(|path| {
            fs::write(path, b"x")?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });
        assert!(!p.exists());
    }
}

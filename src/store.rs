// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Where finished artifacts live.
//!
//! The coordinator only ever asks a store three things: is this
//! fingerprint here, keep this artifact, and (on behalf of whoever
//! deletes images) forget this fingerprint.  It never evicts on its
//! own.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::artifact::Artifact;
use crate::errors::StoreError;
use crate::fingerprint::Fingerprint;
use crate::request::GenerationRequest;

/// A fingerprint-keyed artifact repository.
pub trait ArtifactStore: Send + Sync {
    /// The artifact stored under `fingerprint`, if any.
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, StoreError>;

    /// Keep `artifact` under its own fingerprint.  Storing the same
    /// fingerprint twice keeps one copy.
    fn store(&self, artifact: &Artifact) -> Result<(), StoreError>;

    /// Forget `fingerprint`.  Returns whether anything was there.
    fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError>;
}

/// A process-local store.  Artifacts live as long as the store does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: Mutex<HashMap<Fingerprint, Artifact>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.artifacts().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.artifacts().is_empty()
    }

    fn artifacts(&self) -> MutexGuard<HashMap<Fingerprint, Artifact>> {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArtifactStore for MemoryStore {
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, StoreError> {
        Ok(self.artifacts().get(fingerprint).cloned())
    }

    fn store(&self, artifact: &Artifact) -> Result<(), StoreError> {
        self.artifacts()
            .entry(artifact.fingerprint)
            .or_insert_with(|| artifact.clone());
        Ok(())
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        Ok(self.artifacts().remove(fingerprint).is_some())
    }
}

/// A directory of `<fingerprint>.png` images, each with a
/// `<fingerprint>.json` file holding the canonical parameters.
///
/// Both files are written under a temporary name and renamed into
/// place, image first.  The parameter file is the publish marker: an
/// entry without one does not exist as far as `lookup` is concerned.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Use `root`, creating it if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<DirectoryStore, StoreError> {
        fs::create_dir_all(root.as_ref())?;
        Ok(DirectoryStore {
            root: root.as_ref().to_path_buf(),
        })
    }

    /// Where the image for `fingerprint` lives, whether or not it has
    /// been rendered.
    pub fn image_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(format!("{}.png", fingerprint))
    }

    fn params_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(format!("{}.json", fingerprint))
    }
}

fn read_if_present<T>(result: io::Result<T>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(contents) => Ok(Some(contents)),
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut partial = OsString::from(path.as_os_str());
    partial.push(".partial");
    fs::write(&partial, contents)?;
    fs::rename(&partial, path)?;
    Ok(())
}

impl ArtifactStore for DirectoryStore {
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, StoreError> {
        let params = match read_if_present(fs::read_to_string(self.params_path(fingerprint)))? {
            Some(params) => params,
            None => return Ok(None),
        };
        let png = match read_if_present(fs::read(self.image_path(fingerprint)))? {
            Some(png) => png,
            None => return Ok(None),
        };
        let corrupt = |reason: String| StoreError::Corrupt {
            fingerprint: fingerprint.to_hex(),
            reason,
        };
        let request = GenerationRequest::from_canonical_form(&params)
            .map_err(|err| corrupt(format!("unreadable parameters: {}", err)))?;
        if Fingerprint::of(&request) != *fingerprint {
            return Err(corrupt("parameters do not match the fingerprint".to_string()));
        }
        Ok(Some(Artifact {
            fingerprint: *fingerprint,
            request,
            png: png.into(),
        }))
    }

    fn store(&self, artifact: &Artifact) -> Result<(), StoreError> {
        write_atomically(&self.image_path(&artifact.fingerprint), &artifact.png)?;
        write_atomically(
            &self.params_path(&artifact.fingerprint),
            artifact.request.canonical_form().as_bytes(),
        )
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        let had_params = remove_if_present(&self.params_path(fingerprint))?;
        let had_image = remove_if_present(&self.image_path(fingerprint))?;
        Ok(had_params || had_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> GenerationRequest {
        GenerationRequest {
            width: 8,
            height: 4,
            max_iterations: 20,
            ..GenerationRequest::default()
        }
    }

    fn artifact() -> Artifact {
        Artifact::new(small(), vec![0x89, b'P', b'N', b'G', 1, 2, 3])
    }

    fn exercise<S: ArtifactStore>(store: &S) {
        let a = artifact();
        assert_eq!(store.lookup(&a.fingerprint).unwrap(), None);
        store.store(&a).unwrap();
        store.store(&a).unwrap();
        assert_eq!(store.lookup(&a.fingerprint).unwrap(), Some(a.clone()));
        assert!(store.remove(&a.fingerprint).unwrap());
        assert!(!store.remove(&a.fingerprint).unwrap());
        assert_eq!(store.lookup(&a.fingerprint).unwrap(), None);
    }

    #[test]
    fn memory_store_lifecycle() {
        let store = MemoryStore::new();
        exercise(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn directory_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&DirectoryStore::open(dir.path().join("fractals")).unwrap());
    }

    #[test]
    fn directory_store_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let a = artifact();
        DirectoryStore::open(dir.path()).unwrap().store(&a).unwrap();
        let reopened = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(reopened.lookup(&a.fingerprint).unwrap(), Some(a.clone()));
        assert!(reopened.image_path(&a.fingerprint).ends_with(a.file_name()));
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn images_without_parameters_are_not_published() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let a = artifact();
        fs::write(store.image_path(&a.fingerprint), &a.png[..]).unwrap();
        assert_eq!(store.lookup(&a.fingerprint).unwrap(), None);
    }

    #[test]
    fn mismatched_parameters_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let a = artifact();
        store.store(&a).unwrap();
        let other = GenerationRequest { width: 9, ..small() };
        fs::write(store.params_path(&a.fingerprint), other.canonical_form()).unwrap();
        match store.lookup(&a.fingerprint) {
            Err(StoreError::Corrupt { fingerprint, .. }) => assert_eq!(fingerprint, a.fingerprint.to_hex()),
            other => panic!("expected a corrupt entry, got {:?}", other),
        }
    }
}

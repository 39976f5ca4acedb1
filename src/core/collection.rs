// Local document collection stored as one JSON file per collection.
// Writers serialize on an exclusive lock file and replace the data file by rename,
// so readers never observe a half-written collection and need no lock.
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use getrandom::fill as fill_random;
use libc::{EACCES, EPERM};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

pub const ID_LEN: usize = 20;
const ID_ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
// Largest multiple of 62 below 256; bytes at or above it are redrawn.
const ID_BYTE_LIMIT: u8 = 248;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    collection: String,
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Clone, Debug)]
pub struct Collection {
    dir: PathBuf,
    name: String,
}

impl Collection {
    pub fn open(dir: impl Into<PathBuf>, name: &str) -> Result<Self, Error> {
        validate_collection_name(name)?;
        Ok(Self {
            dir: dir.into(),
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.name))
    }

    /// All documents in insertion order; a missing file is an empty collection.
    pub fn list(&self) -> Result<Vec<Document>, Error> {
        Ok(self.read()?.documents)
    }

    pub fn get(&self, id: &str) -> Result<Document, Error> {
        self.read()?
            .documents
            .into_iter()
            .find(|document| document.id == id)
            .ok_or_else(|| not_found(id))
    }

    /// Stores `data` under a fresh id and returns that id.
    pub fn insert(&self, data: Map<String, Value>) -> Result<String, Error> {
        self.with_write(|file| {
            let id = loop {
                let candidate = generate_id()?;
                if !file.documents.iter().any(|document| document.id == candidate) {
                    break candidate;
                }
            };
            file.documents.push(Document {
                id: id.clone(),
                data,
            });
            Ok(id)
        })
    }

    /// Overwrites the whole document body at `id`.
    pub fn replace(&self, id: &str, data: Map<String, Value>) -> Result<Document, Error> {
        self.with_write(|file| {
            let document = file
                .documents
                .iter_mut()
                .find(|document| document.id == id)
                .ok_or_else(|| not_found(id))?;
            document.data = data;
            Ok(document.clone())
        })
    }

    /// Removes the document at `id`; returns whether one was there.
    pub fn remove(&self, id: &str) -> Result<bool, Error> {
        self.with_write(|file| {
            let before = file.documents.len();
            file.documents.retain(|document| document.id != id);
            Ok(file.documents.len() != before)
        })
    }

    fn read(&self) -> Result<CollectionFile, Error> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(CollectionFile {
                    collection: self.name.clone(),
                    documents: Vec::new(),
                });
            }
            Err(err) => {
                return Err(Error::new(map_io_error_kind(&err))
                    .with_message("failed to read collection")
                    .with_path(&path)
                    .with_source(err));
            }
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("collection file is not valid json")
                .with_path(&path)
                .with_source(err)
        })
    }

    fn with_write<T>(
        &self,
        apply: impl FnOnce(&mut CollectionFile) -> Result<T, Error>,
    ) -> Result<T, Error> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to create collection directory")
                .with_path(&self.dir)
                .with_source(err)
        })?;
        let _lock = WriteLock::acquire(&self.lock_path())?;
        let mut file = self.read()?;
        let out = apply(&mut file)?;
        self.write(&file)?;
        Ok(out)
    }

    fn write(&self, file: &CollectionFile) -> Result<(), Error> {
        let path = self.path();
        let tmp = self.dir.join(format!("{}.json.tmp", self.name));
        let bytes = serde_json::to_vec_pretty(file).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode collection")
                .with_source(err)
        })?;
        fs::write(&tmp, bytes).map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to write collection")
                .with_path(&tmp)
                .with_source(err)
        })?;
        fs::rename(&tmp, &path).map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to replace collection file")
                .with_path(&path)
                .with_source(err)
        })
    }
}

struct WriteLock {
    file: File,
}

impl WriteLock {
    fn acquire(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| {
                Error::new(map_io_error_kind(&err))
                    .with_message("failed to open collection lock")
                    .with_path(path)
                    .with_source(err)
            })?;
        file.lock_exclusive().map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_message("failed to lock collection")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Self { file })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub fn validate_collection_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::new(ErrorKind::Usage).with_message("collection name is empty or reserved"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("collection name must not contain path separators"));
    }
    Ok(())
}

/// Store-assigned document id: `ID_LEN` characters from `[A-Za-z0-9]`.
pub fn generate_id() -> Result<String, Error> {
    let mut id = String::with_capacity(ID_LEN);
    let mut bytes = [0u8; ID_LEN * 2];
    while id.len() < ID_LEN {
        fill_random(&mut bytes).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message(format!("failed to generate document id: {err}"))
        })?;
        for byte in bytes.iter().copied().filter(|byte| *byte < ID_BYTE_LIMIT) {
            id.push(char::from(ID_ALPHABET[usize::from(byte % 62)]));
            if id.len() == ID_LEN {
                break;
            }
        }
    }
    Ok(id)
}

fn not_found(id: &str) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message("document not found")
        .with_id(id)
}

fn map_io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::StoreUnavailable,
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::StoreUnavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::{Collection, ID_LEN, generate_id, lock_error_kind};
    use crate::core::error::ErrorKind;
    use serde_json::{Map, Value, json};

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn missing_file_is_empty_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let collection = Collection::open(dir.path().join("absent"), "productos").expect("open");
        assert!(collection.list().expect("list").is_empty());
    }

    #[test]
    fn insert_get_replace_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let collection = Collection::open(dir.path(), "productos").expect("open");

        let first = collection.insert(data(json!({"nombre": "Cinto"}))).expect("insert");
        let second = collection.insert(data(json!({"nombre": "Bolso"}))).expect("insert");
        assert_ne!(first, second);

        let listed = collection.list().expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first);
        assert_eq!(listed[1].id, second);

        let replaced = collection
            .replace(&first, data(json!({"nombre": "Cinto trenzado"})))
            .expect("replace");
        assert_eq!(replaced.data["nombre"], "Cinto trenzado");
        assert_eq!(collection.get(&first).expect("get").data["nombre"], "Cinto trenzado");

        assert!(collection.remove(&first).expect("remove"));
        assert!(!collection.remove(&first).expect("remove again"));
        assert_eq!(collection.list().expect("list").len(), 1);
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = Collection::open(dir.path(), "productos")
            .expect("open")
            .insert(data(json!({"cantidad": 3})))
            .expect("insert");
        let reopened = Collection::open(dir.path(), "productos").expect("reopen");
        assert_eq!(reopened.get(&id).expect("get").data["cantidad"], 3);
    }

    #[test]
    fn replace_missing_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let collection = Collection::open(dir.path(), "productos").expect("open");
        let err = collection
            .replace("nope", Map::new())
            .expect_err("missing document");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.id(), Some("nope"));
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("productos.json"), b"{not json").expect("write");
        let collection = Collection::open(dir.path(), "productos").expect("open");
        let err = collection.list().expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn collection_names_reject_separators() {
        for name in ["", "..", "a/b", r"a\b"] {
            let err = Collection::open(".scratch", name).expect_err("bad name");
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }

    #[test]
    fn ids_are_alphanumeric() {
        let id = generate_id().expect("id");
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|ch| ch.is_ascii_alphanumeric()));
    }

    #[test]
    fn lock_errors_map_to_expected_kinds() {
        let err = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(lock_error_kind(&err), ErrorKind::Permission);

        let err = std::io::Error::from_raw_os_error(libc::EAGAIN);
        assert_eq!(lock_error_kind(&err), ErrorKind::StoreUnavailable);
    }
}

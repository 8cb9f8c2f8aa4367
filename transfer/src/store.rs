//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! File storage behind the receive-side engines.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::rc::Rc;

/// Storage the receiving engines write into. Crash recovery needs size
/// queries and append-mode opens in addition to plain creation.
pub trait FileStore {
    /// The writable file handle type.
    type File: Read + Write + Seek;

    /// Creates (truncating) a file.
    fn create(&mut self, name: &str) -> io::Result<Self::File>;

    /// Opens a file for appending, returning the handle positioned at the
    /// end together with the existing size.
    fn open_append(&mut self, name: &str) -> io::Result<(Self::File, u64)>;

    /// Size of an existing file, or `None` when absent.
    fn existing_size(&self, name: &str) -> Option<u64>;
}

/// Production store: files under a download directory. Path components in
/// offered names are stripped to the final component.
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    directory: PathBuf,
}

impl DirectoryStore {
    /// Creates a store rooted at `directory`.
    #[must_use]
    pub fn new(directory: PathBuf) -> DirectoryStore {
        DirectoryStore { directory }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        let base = name
            .rsplit(['/', '\\'])
            .next()
            .filter(|component| !component.is_empty())
            .unwrap_or("NONAME.DAT");
        self.directory.join(base)
    }
}

impl FileStore for DirectoryStore {
    type File = std::fs::File;

    fn create(&mut self, name: &str) -> io::Result<Self::File> {
        std::fs::File::create(self.path_for(name))
    }

    fn open_append(&mut self, name: &str) -> io::Result<(Self::File, u64)> {
        let path = self.path_for(name);
        let size = std::fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok((file, size))
    }

    fn existing_size(&self, name: &str) -> Option<u64> {
        std::fs::metadata(self.path_for(name))
            .ok()
            .map(|meta| meta.len())
    }
}

/// Shared in-memory file used by [`MemoryStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryFile {
    data: Rc<RefCell<Vec<u8>>>,
    position: u64,
}

impl MemoryFile {
    /// The current contents.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.borrow();
        let position = usize::try_from(self.position).unwrap_or(usize::MAX);
        if position >= data.len() {
            return Ok(0);
        }
        let available = &data[position..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        drop(data);
        self.position += count as u64;
        Ok(count)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.borrow_mut();
        let position = usize::try_from(self.position).unwrap_or(usize::MAX);
        if position > data.len() {
            data.resize(position, 0);
        }
        let overlap = (data.len() - position).min(buf.len());
        data[position..position + overlap].copy_from_slice(&buf[..overlap]);
        data.extend_from_slice(&buf[overlap..]);
        drop(data);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.borrow().len() as u64;
        let next = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::End(delta) => len.saturating_add_signed(delta),
            SeekFrom::Current(delta) => self.position.saturating_add_signed(delta),
        };
        self.position = next;
        Ok(next)
    }
}

/// Test store keeping every file in memory. Handles share contents with
/// the store, so assertions can read what an engine wrote.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: HashMap<String, MemoryFile>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Pre-seeds a file (crash-recovery tests).
    pub fn seed(&mut self, name: &str, contents: &[u8]) {
        let file = MemoryFile {
            data: Rc::new(RefCell::new(contents.to_vec())),
            position: 0,
        };
        self.files.insert(name.to_string(), file);
    }

    /// The contents of a stored file.
    #[must_use]
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).map(MemoryFile::contents)
    }

    /// Names of all stored files.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

impl FileStore for MemoryStore {
    type File = MemoryFile;

    fn create(&mut self, name: &str) -> io::Result<Self::File> {
        let file = MemoryFile::default();
        self.files.insert(name.to_string(), file.clone());
        Ok(file)
    }

    fn open_append(&mut self, name: &str) -> io::Result<(Self::File, u64)> {
        let mut file = self
            .files
            .entry(name.to_string())
            .or_default()
            .clone();
        let size = file.data.borrow().len() as u64;
        file.position = size;
        Ok((file, size))
    }

    fn existing_size(&self, name: &str) -> Option<u64> {
        self.files
            .get(name)
            .map(|file| file.data.borrow().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_file_write_read_seek() {
        let mut store = MemoryStore::new();
        let mut file = store.create("a.bin").unwrap();
        file.write_all(b"hello").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 5];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(store.contents("a.bin").unwrap(), b"hello");
    }

    #[test]
    fn append_positions_at_end() {
        let mut store = MemoryStore::new();
        store.seed("a.bin", b"12345");
        let (mut file, size) = store.open_append("a.bin").unwrap();
        assert_eq!(size, 5);
        file.write_all(b"678").unwrap();
        assert_eq!(store.contents("a.bin").unwrap(), b"12345678");
    }

    #[test]
    fn directory_store_strips_path_components() {
        let store = DirectoryStore::new(PathBuf::from("/tmp/downloads"));
        assert_eq!(
            store.path_for("../../etc/passwd"),
            PathBuf::from("/tmp/downloads/passwd")
        );
        assert_eq!(
            store.path_for("C:\\evil\\name.txt"),
            PathBuf::from("/tmp/downloads/name.txt")
        );
    }
}

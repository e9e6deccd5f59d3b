//! Synthetic containers for tests.
//!
//! Bytes are laid out by hand rather than through the table encoders so
//! that reader and builder tests check against an independent writer.

use std::path::Path;

use bigfile_common::Endian;

use crate::header::{HEADER_SIZE, MAGIC};

pub(crate) struct FixtureFile {
    dir: i32,
    name: String,
    data: Vec<u8>,
}

impl FixtureFile {
    pub(crate) fn new(dir: i32, name: &str, data: &[u8]) -> Self {
        Self {
            dir,
            name: name.to_string(),
            data: data.to_vec(),
        }
    }
}

pub(crate) struct FixtureDir {
    name: String,
    parent: i32,
}

impl FixtureDir {
    pub(crate) fn root(name: &str) -> Self {
        Self::new(name, -1)
    }

    pub(crate) fn new(name: &str, parent: i32) -> Self {
        Self {
            name: name.to_string(),
            parent,
        }
    }
}

pub(crate) struct FixtureArchive {
    endian: Endian,
    capacity: u32,
    dirs: Vec<FixtureDir>,
    files: Vec<FixtureFile>,
    /// Opaque bytes between the directory table and the first file.
    padding: Vec<u8>,
}

impl FixtureArchive {
    pub(crate) fn new(endian: Endian) -> Self {
        Self {
            endian,
            capacity: 8,
            dirs: Vec::new(),
            files: Vec::new(),
            padding: Vec::new(),
        }
    }

    pub(crate) fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub(crate) fn dir(mut self, dir: FixtureDir) -> Self {
        self.dirs.push(dir);
        self
    }

    pub(crate) fn file(mut self, file: FixtureFile) -> Self {
        self.files.push(file);
        self
    }

    pub(crate) fn padding(mut self, padding: &[u8]) -> Self {
        self.padding = padding.to_vec();
        self
    }

    pub(crate) fn write_to(&self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let m = self.capacity as usize;
        let offset_table = HEADER_SIZE;
        let file_table = offset_table + m * 8;
        let dir_table = file_table + m * 84;
        let data_start = dir_table + m * 84 + self.padding.len();

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        for value in [
            0x24,                       // formatVersion
            self.files.len() as u32,    // fileCount
            self.dirs.len() as u32,     // directoryCount
            0x11,                       // unknown16
            0x22,                       // unknown20
            0x33,                       // unknown24
            0x44,                       // unknown28
            self.capacity,              // offsetTableMaxLength
            0x55,                       // unknown36
            0x7100_3ff9,                // initialKey
            self.files.len() as u32,    // fileCount2
            self.dirs.len() as u32,     // directoryCount2
            offset_table as u32,        // offsetTableOffset
            0x66,                       // unknown56
            0x77,                       // unknown60
            self.capacity.wrapping_sub(1),
        ] {
            self.push_u32(&mut out, value);
        }
        assert_eq!(out.len(), HEADER_SIZE);

        let mut data_offset = data_start;
        for (i, file) in self.files.iter().enumerate() {
            self.push_u32(&mut out, data_offset as u32);
            self.push_u32(&mut out, i as u32 * 7 + 1);
            data_offset += 4 + file.data.len();
        }
        out.resize(file_table, 0);

        for (i, file) in self.files.iter().enumerate() {
            let (next, prev) = sibling_links(&self.files, i, |f| f.dir);
            self.push_u32(&mut out, file.data.len() as u32);
            self.push_i32(&mut out, next);
            self.push_i32(&mut out, prev);
            self.push_i32(&mut out, file.dir);
            self.push_u32(&mut out, 1_600_000_000 + i as u32);
            push_name(&mut out, &file.name);
        }
        out.resize(dir_table, 0);

        for (i, dir) in self.dirs.iter().enumerate() {
            let first_file = first_index(self.files.iter().map(|f| f.dir), i);
            let first_subdir = first_index(self.dirs.iter().map(|d| d.parent), i);
            let (next, prev) = sibling_links(&self.dirs, i, |d| d.parent);
            self.push_i32(&mut out, first_file);
            self.push_i32(&mut out, first_subdir);
            self.push_i32(&mut out, next);
            self.push_i32(&mut out, prev);
            self.push_i32(&mut out, dir.parent);
            push_name(&mut out, &dir.name);
        }
        out.resize(dir_table + m * 84, 0);
        out.extend_from_slice(&self.padding);

        for file in &self.files {
            self.push_u32(&mut out, file.data.len() as u32);
            out.extend_from_slice(&file.data);
        }
        out
    }

    fn push_u32(&self, out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&self.endian.u32_bytes(value));
    }

    fn push_i32(&self, out: &mut Vec<u8>, value: i32) {
        self.push_u32(out, value as u32);
    }
}

fn push_name(out: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; 64];
    field[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&field);
}

fn first_index(owners: impl Iterator<Item = i32>, owner: usize) -> i32 {
    owners
        .enumerate()
        .find(|(_, o)| *o == owner as i32)
        .map_or(-1, |(i, _)| i as i32)
}

/// Next/previous entry with the same owner, or -1.
fn sibling_links<T>(items: &[T], i: usize, owner: impl Fn(&T) -> i32) -> (i32, i32) {
    let own = owner(&items[i]);
    let next = (i + 1..items.len())
        .find(|&j| owner(&items[j]) == own)
        .map_or(-1, |j| j as i32);
    let prev = (0..i)
        .rev()
        .find(|&j| owner(&items[j]) == own)
        .map_or(-1, |j| j as i32);
    (next, prev)
}

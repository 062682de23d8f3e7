//! Fixture repositories for integration tests
//!
//! Built with git2 so author dates, binary content and merge parents are
//! fully controlled. Extraction itself always goes through the git binary.

#![allow(dead_code)]

use git2::{Oid, Repository, Signature, Time};
use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;

/// 2018-10-09 10:34:56 UTC
pub const BASE_TIME: i64 = 1_539_081_296;

pub struct RepoFixture {
    pub dir: TempDir,
    pub repo: Repository,
}

impl RepoFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, path: impl AsRef<Path>, contents: &[u8]) -> &Self {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, contents).unwrap();
        self
    }

    /// Replace the index with the tree of commit `id`.
    pub fn reset_index(&self, id: Oid) {
        let tree = self.repo.find_commit(id).unwrap().tree().unwrap();
        let mut index = self.repo.index().unwrap();
        index.read_tree(&tree).unwrap();
        index.write().unwrap();
    }

    /// Stage `paths` and commit the whole index.
    ///
    /// `offset_minutes` is the author's timezone. `update_ref` is usually
    /// `Some("HEAD")`; pass `None` for commits on a detached side line.
    pub fn commit(
        &self,
        paths: &[&Path],
        secs: i64,
        offset_minutes: i32,
        parents: &[Oid],
        update_ref: Option<&str>,
    ) -> Oid {
        let mut index = self.repo.index().unwrap();
        for path in paths {
            index.add_path(path).unwrap();
        }
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();

        let sig = Signature::new("Test User", "test@example.com", &Time::new(secs, offset_minutes))
            .unwrap();
        let parents: Vec<_> = parents
            .iter()
            .map(|id| self.repo.find_commit(*id).unwrap())
            .collect();
        let parent_refs: Vec<_> = parents.iter().collect();

        self.repo
            .commit(update_ref, &sig, &sig, "commit", &tree, &parent_refs)
            .unwrap()
    }
}

/// Ids of the linear history used by most tests.
pub struct LinearHistory {
    pub fixture: RepoFixture,
    /// Adds f1.txt with 2 lines
    pub root: Oid,
    /// Rewrites f1.txt: +10 / -2
    pub a: Oid,
    /// Adds f2.txt (+5) and binary f3.bin
    pub b: Oid,
}

pub fn linear_history() -> LinearHistory {
    let fixture = RepoFixture::new();

    fixture.write("f1.txt", b"old1\nold2\n");
    let root = fixture.commit(&[Path::new("f1.txt")], BASE_TIME - 86_400, 0, &[], Some("HEAD"));

    let ten: String = (1..=10).map(|i| format!("line{}\n", i)).collect();
    fixture.write("f1.txt", ten.as_bytes());
    let a = fixture.commit(&[Path::new("f1.txt")], BASE_TIME, 120, &[root], Some("HEAD"));

    fixture.write("f2.txt", b"1\n2\n3\n4\n5\n");
    fixture.write("f3.bin", b"\x00\x01\x02binary\x00payload");
    let b = fixture.commit(
        &[Path::new("f2.txt"), Path::new("f3.bin")],
        BASE_TIME + 3_600,
        -300,
        &[a],
        Some("HEAD"),
    );

    LinearHistory {
        fixture,
        root,
        a,
        b,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRow {
    pub cid: String,
    pub created_at: String,
    pub files_touched: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
}

pub fn commit_rows(conn: &Connection) -> Vec<CommitRow> {
    let mut stmt = conn
        .prepare(
            "SELECT cid, created_at, files_touched, lines_added, lines_removed
             FROM commits ORDER BY rowid",
        )
        .unwrap();
    stmt.query_map([], |r| {
        Ok(CommitRow {
            cid: r.get(0)?,
            created_at: r.get(1)?,
            files_touched: r.get(2)?,
            lines_added: r.get(3)?,
            lines_removed: r.get(4)?,
        })
    })
    .unwrap()
    .collect::<rusqlite::Result<Vec<_>>>()
    .unwrap()
}

pub fn file_rows(conn: &Connection) -> Vec<(String, String, i64, i64)> {
    let mut stmt = conn
        .prepare("SELECT cid, filename, added, removed FROM files ORDER BY rowid")
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
}

pub fn row_for<'a>(rows: &'a [CommitRow], id: Oid) -> &'a CommitRow {
    let id = id.to_string();
    rows.iter()
        .find(|r| r.cid == id)
        .unwrap_or_else(|| panic!("no commits row for {}", id))
}

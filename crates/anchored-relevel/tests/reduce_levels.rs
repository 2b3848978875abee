#![expect(unused_crate_dependencies, reason = "these tests do not use every dependency")]

use std::{collections::BTreeSet, path::Path};

use anchored_vfs::{
    traits::{ReadableFilesystem as _, WritableFilesystem as _},
    MemoryFS,
};

use anchored_relevel::{
    Database, ErrorKind, Level, ManifestStore, OpenOptions, ReduceLevelsOptions, reduce_levels,
    validate,
};


/// Drives a database through the open, write, close, and migrate cycles that an operator
/// would go through.
struct ReduceLevelsTest {
    fs: MemoryFS,
    db: Option<Database<MemoryFS>>,
}

impl ReduceLevelsTest {
    fn new() -> Self {
        Self {
            fs: MemoryFS::new(),
            db: None,
        }
    }

    fn dir() -> &'static Path {
        Path::new("/reduce_levels_test")
    }

    fn open_db(&mut self, num_levels: u8, max_memtable_flush_level: u8) {
        assert!(self.db.is_none(), "close the database before reopening it");
        let options = OpenOptions {
            max_memtable_flush_level,
            ..OpenOptions::with_num_levels(num_levels)
        };
        self.db = Some(Database::open(self.fs.clone(), Self::dir(), options).unwrap());
    }

    fn db(&mut self) -> &mut Database<MemoryFS> {
        self.db.as_mut().unwrap()
    }

    fn put(&mut self, key: &str, value: &str) {
        self.db().put(key.as_bytes(), value.as_bytes()).unwrap();
    }

    fn get(&mut self, key: &str) -> Option<String> {
        self.db()
            .get(key.as_bytes())
            .unwrap()
            .map(|value| String::from_utf8(value).unwrap())
    }

    fn flush(&mut self) {
        self.db().flush_memtable().unwrap();
    }

    fn files_on_level(&mut self, level: u8) -> usize {
        self.db().files_at_level(Level::new(level))
    }

    fn close(&mut self) {
        self.db.take().unwrap().close().unwrap();
    }

    fn reduce_levels(&self, target_num_levels: u8) -> bool {
        let options = ReduceLevelsOptions {
            print_old_levels: true,
            ..ReduceLevelsOptions::new(target_num_levels)
        };
        let result = reduce_levels(&self.fs, Self::dir(), options);
        if let Ok(report) = &result {
            let manifest = ManifestStore::recover(&self.fs, Self::dir()).unwrap();
            assert_eq!(manifest.current_assignment().num_levels(), report.new_num_levels);
            validate(manifest.current_assignment(), target_num_levels).unwrap();
        }
        result.is_ok()
    }
}

#[test]
fn last_level() {
    let mut test = ReduceLevelsTest::new();
    test.open_db(4, 3);
    test.put("aaaa", "11111");
    test.flush();
    assert_eq!(test.files_on_level(3), 1);
    test.close();

    assert!(test.reduce_levels(3));
    test.open_db(3, 1);
    assert_eq!(test.files_on_level(2), 1);
    test.close();

    assert!(test.reduce_levels(2));
    test.open_db(2, 1);
    assert_eq!(test.files_on_level(1), 1);
    assert_eq!(test.get("aaaa").as_deref(), Some("11111"));
    test.close();
}

#[test]
fn top_level() {
    let mut test = ReduceLevelsTest::new();
    test.open_db(5, 0);
    test.put("aaaa", "11111");
    test.flush();
    assert_eq!(test.files_on_level(0), 1);
    test.close();

    for target in [4, 3, 2] {
        assert!(test.reduce_levels(target));
        test.open_db(target, 0);
        assert_eq!(test.files_on_level(0), 1);
        assert_eq!(test.get("aaaa").as_deref(), Some("11111"));
        test.close();
    }
}

#[test]
fn all_levels() {
    let mut test = ReduceLevelsTest::new();
    for (max_flush_level, key) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
        test.open_db(5, max_flush_level);
        test.put(key, &format!("{key}11111"));
        test.flush();
        assert_eq!(test.files_on_level(max_flush_level), 1);
        test.close();
    }

    for target in [4, 3, 2] {
        assert!(test.reduce_levels(target));
        test.open_db(target, 0);
        for key in ["a", "b", "c", "d"] {
            assert_eq!(test.get(key), Some(format!("{key}11111")));
        }
        // Files shallower than the last remaining level stay where they were.
        assert_eq!(test.files_on_level(target - 1), usize::from(6 - target));
        test.close();
    }
}

#[test]
fn overlapping_levels_are_merged() {
    let mut test = ReduceLevelsTest::new();
    test.open_db(4, 3);
    test.put("k1", "old");
    test.put("k2", "doomed");
    test.put("k3", "kept");
    test.close();

    test.open_db(4, 3);
    test.put("k1", "new");
    test.db().delete(b"k2").unwrap();
    test.close();

    test.open_db(4, 3);
    assert_eq!(test.files_on_level(2), 1);
    assert_eq!(test.files_on_level(3), 1);
    test.close();

    let report = reduce_levels(
        &test.fs,
        ReduceLevelsTest::dir(),
        ReduceLevelsOptions::new(3),
    ).unwrap();
    assert_eq!(report.num_merges, 1);
    assert_eq!(report.files_written, 1);
    assert_eq!(report.files_removed, 2);
    assert_eq!(report.files_per_level_after, [0, 0, 1]);

    test.open_db(3, 0);
    assert_eq!(test.get("k1").as_deref(), Some("new"));
    assert_eq!(test.get("k2"), None);
    assert_eq!(test.get("k3").as_deref(), Some("kept"));
    test.close();

    // Down to a single level, where the merged file is simply relabeled.
    let report = reduce_levels(
        &test.fs,
        ReduceLevelsTest::dir(),
        ReduceLevelsOptions::new(1),
    ).unwrap();
    assert_eq!((report.num_merges, report.num_moves), (0, 1));

    test.open_db(1, 0);
    assert_eq!(test.files_on_level(0), 1);
    assert_eq!(test.get("k1").as_deref(), Some("new"));
    assert_eq!(test.get("k2"), None);
    test.close();
}

#[test]
fn satisfied_target_changes_no_files() {
    let mut test = ReduceLevelsTest::new();
    test.open_db(5, 1);
    test.put("x", "1");
    test.close();

    let layout = |test: &ReduceLevelsTest| {
        let manifest = ManifestStore::recover(&test.fs, ReduceLevelsTest::dir()).unwrap();
        manifest
            .current_assignment()
            .iter_files()
            .map(|(level, file)| (level, file.file_number()))
            .collect::<Vec<_>>()
    };
    let before = layout(&test);

    // The database already fits, so only the level count is lowered.
    let report = reduce_levels(&test.fs, ReduceLevelsTest::dir(), ReduceLevelsOptions::new(3))
        .unwrap();
    assert!(report.is_noop());
    assert_eq!(report.new_num_levels, 3);
    assert_eq!(layout(&test), before);

    // A second run changes nothing, not even the manifest.
    let current = test.fs.read_file(&ReduceLevelsTest::dir().join("CURRENT")).unwrap();
    let report = reduce_levels(&test.fs, ReduceLevelsTest::dir(), ReduceLevelsOptions::new(3))
        .unwrap();
    assert!(report.is_noop());
    assert_eq!(report.old_num_levels, 3);
    assert_eq!(layout(&test), before);
    assert_eq!(test.fs.read_file(&ReduceLevelsTest::dir().join("CURRENT")).unwrap(), current);

    // The level count is never raised.
    let report = reduce_levels(&test.fs, ReduceLevelsTest::dir(), ReduceLevelsOptions::new(6))
        .unwrap();
    assert_eq!(report.new_num_levels, 3);
    assert_eq!(test.fs.read_file(&ReduceLevelsTest::dir().join("CURRENT")).unwrap(), current);
}

#[test]
fn bad_arguments_change_nothing() {
    let test = ReduceLevelsTest::new();

    let err = reduce_levels(&test.fs, ReduceLevelsTest::dir(), ReduceLevelsOptions::new(0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = reduce_levels(&test.fs, ReduceLevelsTest::dir(), ReduceLevelsOptions::new(2))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(test.fs.read_file(&ReduceLevelsTest::dir().join("CURRENT")).is_none());

    // An existing directory without a database is left as it was.
    test.fs.create_dir_all(ReduceLevelsTest::dir()).unwrap();
    test.fs.write_file(&ReduceLevelsTest::dir().join("notes.txt"), b"not a database");
    let listing = || {
        test.fs
            .children(ReduceLevelsTest::dir())
            .unwrap()
            .map(Result::unwrap)
            .collect::<BTreeSet<_>>()
    };
    let before = listing();

    let err = reduce_levels(&test.fs, ReduceLevelsTest::dir(), ReduceLevelsOptions::new(2))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(listing(), before);
    assert!(test.fs.read_file(&ReduceLevelsTest::dir().join("LOCK")).is_none());
}

#[test]
fn open_database_is_locked() {
    let mut test = ReduceLevelsTest::new();
    test.open_db(4, 3);
    test.put("aaaa", "11111");
    test.flush();

    let err = reduce_levels(&test.fs, ReduceLevelsTest::dir(), ReduceLevelsOptions::new(2))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Locked);

    // The database is still usable, and the migration works once it is closed.
    assert_eq!(test.get("aaaa").as_deref(), Some("11111"));
    test.close();
    assert!(test.reduce_levels(2));
}

#[test]
fn reopening_with_fewer_levels_needs_a_migration() {
    let mut test = ReduceLevelsTest::new();
    test.open_db(4, 3);
    test.put("aaaa", "11111");
    test.close();

    let options = OpenOptions::with_num_levels(3);
    let err = Database::open(test.fs.clone(), ReduceLevelsTest::dir(), options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(test.reduce_levels(3));
    test.open_db(3, 0);
    test.close();
}

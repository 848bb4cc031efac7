//! End-to-end tracker scenarios over real directory trees

use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use rstest::rstest;

use sextant_modules::{
    CodeUpdate, FileEvent, LookupResult, ModuleReader, ModuleTracker, ModuleUpdate, Overlay,
    Qualifier, SearchRoot, SearchRoots, Tracking,
};
use sextant_store::Store;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn explicit_relative(result: LookupResult) -> PathBuf {
    match result {
        LookupResult::Explicit(module_path) => module_path.raw().relative.clone(),
        other => panic!("expected an explicit module, got {other:?}"),
    }
}

#[test]
fn basic_translation() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/mod.py", "x = 1");

    let tracker = ModuleTracker::eager(SearchRoots::from_paths([dir.path()]));

    let result = tracker.look_up_qualifier(&Qualifier::from_dotted("pkg.mod"));
    assert_eq!(explicit_relative(result), PathBuf::from("pkg/mod.py"));
    assert_eq!(
        tracker.look_up_qualifier(&Qualifier::from_dotted("pkg")),
        LookupResult::Implicit
    );
    assert_eq!(
        tracker.look_up_qualifier(&Qualifier::from_dotted("absent")),
        LookupResult::NotFound
    );
}

#[test]
fn stub_beats_implementation_regardless_of_root_order() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    write(&first, "a.py", "implementation");
    write(&second, "a.pyi", "stub");

    let roots = SearchRoots::new(
        vec![SearchRoot::new(&first), SearchRoot::new(&second)],
        &[],
    )
    .unwrap();
    let tracker = ModuleTracker::eager(roots);

    let result = tracker.look_up_qualifier(&Qualifier::from_dotted("a"));
    assert_eq!(explicit_relative(result), PathBuf::from("a.pyi"));
}

#[test]
fn incremental_stub_shadowing() {
    let dir = tempfile::tempdir().unwrap();
    let stub_root = dir.path().join("stubs");
    let source_root = dir.path().join("sources");
    std::fs::create_dir_all(&stub_root).unwrap();
    write(&source_root, "a.py", "implementation");

    let roots = SearchRoots::new(
        vec![SearchRoot::new(&stub_root), SearchRoot::new(&source_root)],
        &[],
    )
    .unwrap();
    let mut tracker = ModuleTracker::eager(roots);
    assert_eq!(
        explicit_relative(tracker.look_up_qualifier(&Qualifier::from_dotted("a"))),
        PathBuf::from("a.py")
    );

    write(&stub_root, "a.pyi", "stub");
    let updates = tracker
        .process_events(vec![FileEvent::created_or_changed(stub_root.join("a.pyi"))])
        .unwrap();

    assert_eq!(updates.len(), 1);
    match &updates[0] {
        ModuleUpdate::Changed(module_path) => {
            assert_eq!(module_path.raw().relative, PathBuf::from("a.pyi"));
        }
        other => panic!("expected Changed for the new stub, got {other:?}"),
    }
    assert_eq!(
        explicit_relative(tracker.look_up_qualifier(&Qualifier::from_dotted("a"))),
        PathBuf::from("a.pyi")
    );
}

#[test]
fn lazy_tracker_skips_unqueried_events() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new();
    let mut tracker = ModuleTracker::lazy(SearchRoots::from_paths([dir.path()]), &store);

    write(dir.path(), "new/file.py", "x = 1");
    let updates = tracker
        .process_events(vec![FileEvent::created_or_changed(
            dir.path().join("new/file.py"),
        )])
        .unwrap();
    assert!(
        updates.is_empty(),
        "events for never-queried qualifiers must be skipped"
    );

    // The finder still discovers the file on demand.
    let result = tracker.look_up_qualifier(&Qualifier::from_dotted("new.file"));
    assert_eq!(explicit_relative(result), PathBuf::from("new/file.py"));
}

#[test]
fn lazy_tracker_reacts_to_events_for_queried_qualifiers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new();
    let mut tracker = ModuleTracker::lazy(SearchRoots::from_paths([dir.path()]), &store);

    assert_eq!(
        tracker.look_up_qualifier(&Qualifier::from_dotted("a.b")),
        LookupResult::NotFound
    );

    write(dir.path(), "a/b.py", "x = 1");
    let updates = tracker
        .process_events(vec![FileEvent::created_or_changed(dir.path().join("a/b.py"))])
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert!(matches!(&updates[0], ModuleUpdate::New(module_path)
        if module_path.qualifier() == &Qualifier::from_dotted("a.b")));
    assert_eq!(
        explicit_relative(tracker.look_up_qualifier(&Qualifier::from_dotted("a.b"))),
        PathBuf::from("a/b.py")
    );
}

#[rstest]
#[case("pkg.mod")]
#[case("pkg")]
#[case("pkg.sub")]
#[case("pkg.sub.leaf")]
#[case("top")]
#[case("absent.module")]
fn lazy_and_eager_trackers_agree(#[case] qualifier: &str) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/mod.py", "");
    write(dir.path(), "pkg/sub/__init__.py", "");
    write(dir.path(), "pkg/sub/leaf.py", "");
    write(dir.path(), "top.py", "");

    let roots = SearchRoots::from_paths([dir.path()]);
    let eager = ModuleTracker::new(roots.clone(), Tracking::Eager, &Store::new());
    let lazy = ModuleTracker::new(roots, Tracking::Lazy, &Store::new());

    let qualifier = Qualifier::from_dotted(qualifier);
    assert_eq!(
        eager.look_up_qualifier(&qualifier),
        lazy.look_up_qualifier(&qualifier),
        "trackers disagree on {qualifier}"
    );
}

#[test]
fn new_module_in_fresh_package_reports_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracker = ModuleTracker::eager(SearchRoots::from_paths([dir.path()]));

    write(dir.path(), "fresh/mod.py", "");
    let updates = tracker
        .process_events(vec![FileEvent::created_or_changed(
            dir.path().join("fresh/mod.py"),
        )])
        .unwrap();

    assert_eq!(updates.len(), 2);
    assert!(matches!(&updates[0], ModuleUpdate::New(module_path)
        if module_path.qualifier() == &Qualifier::from_dotted("fresh.mod")));
    // Explicit updates come first, then the namespace transition.
    assert_eq!(
        updates[1],
        ModuleUpdate::NewImplicit(Qualifier::from_dotted("fresh"))
    );
    assert_eq!(
        tracker.look_up_qualifier(&Qualifier::from_dotted("fresh")),
        LookupResult::Implicit
    );
}

#[test]
fn removing_last_module_deletes_package_namespace() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/only.py", "");
    let mut tracker = ModuleTracker::eager(SearchRoots::from_paths([dir.path()]));

    std::fs::remove_file(dir.path().join("pkg/only.py")).unwrap();
    let updates = tracker
        .process_events(vec![FileEvent::removed(dir.path().join("pkg/only.py"))])
        .unwrap();

    assert_eq!(
        updates,
        vec![
            ModuleUpdate::Delete(Qualifier::from_dotted("pkg.only")),
            ModuleUpdate::Delete(Qualifier::from_dotted("pkg")),
        ]
    );
    assert_eq!(
        tracker.look_up_qualifier(&Qualifier::from_dotted("pkg")),
        LookupResult::NotFound
    );
}

#[test]
fn explicit_event_suppresses_implicit_event_for_same_qualifier() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracker = ModuleTracker::eager(SearchRoots::from_paths([dir.path()]));

    write(dir.path(), "pkg/__init__.py", "");
    write(dir.path(), "pkg/mod.py", "");
    let updates = tracker
        .process_events(vec![
            FileEvent::created_or_changed(dir.path().join("pkg/__init__.py")),
            FileEvent::created_or_changed(dir.path().join("pkg/mod.py")),
        ])
        .unwrap();

    // `pkg` gained an index file (explicit New); the namespace transition
    // for `pkg` is suppressed in favor of it.
    assert_eq!(updates.len(), 2);
    assert!(matches!(&updates[0], ModuleUpdate::New(module_path)
        if module_path.qualifier() == &Qualifier::from_dotted("pkg")));
    assert!(matches!(&updates[1], ModuleUpdate::New(module_path)
        if module_path.qualifier() == &Qualifier::from_dotted("pkg.mod")));
}

#[test]
fn created_and_removed_in_one_batch_folds_to_changed() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracker = ModuleTracker::eager(SearchRoots::from_paths([dir.path()]));

    write(dir.path(), "flash.py", "");
    let path = dir.path().join("flash.py");
    std::fs::remove_file(&path).unwrap();
    let updates = tracker
        .process_events(vec![
            FileEvent::created_or_changed(&path),
            FileEvent::removed(&path),
        ])
        .unwrap();

    assert_eq!(updates.len(), 1);
    assert!(matches!(&updates[0], ModuleUpdate::Changed(module_path)
        if module_path.qualifier() == &Qualifier::from_dotted("flash")));
    assert_eq!(
        tracker.look_up_qualifier(&Qualifier::from_dotted("flash")),
        LookupResult::NotFound
    );
}

#[test]
fn code_of_module_path_reads_file_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "disk.py", "on_disk = True");
    write(dir.path(), "memory.py", "ignored = True");

    let tracker = ModuleTracker::eager(SearchRoots::from_paths([dir.path()]));
    let disk = match tracker.look_up_qualifier(&Qualifier::from_dotted("disk")) {
        LookupResult::Explicit(module_path) => module_path,
        other => panic!("unexpected {other:?}"),
    };
    let memory = match tracker.look_up_qualifier(&Qualifier::from_dotted("memory")) {
        LookupResult::Explicit(module_path) => module_path,
        other => panic!("unexpected {other:?}"),
    };

    let tracker = tracker
        .with_in_memory_sources([(memory.raw().clone(), "from_memory = True".to_owned())]);
    assert_eq!(tracker.code_of_module_path(&disk).unwrap(), "on_disk = True");
    assert_eq!(
        tracker.code_of_module_path(&memory).unwrap(),
        "from_memory = True"
    );

    std::fs::remove_file(dir.path().join("disk.py")).unwrap();
    assert!(tracker.code_of_module_path(&disk).is_err());
}

#[test]
fn overlay_shadows_and_falls_through() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/mod.py", "original = True");
    write(dir.path(), "pkg/other.py", "untouched = True");

    let roots = SearchRoots::from_paths([dir.path()]);
    let tracker = ModuleTracker::eager(roots.clone());
    let mut overlay = Overlay::new(tracker.read_only(), roots);

    let records = overlay.update_overlaid_code(vec![(
        dir.path().join("pkg/mod.py"),
        CodeUpdate::NewCode("overlaid = True".to_owned()),
    )]);
    assert_eq!(records.len(), 1);
    assert!(matches!(&records[0], ModuleUpdate::New(module_path)
        if module_path.qualifier() == &Qualifier::from_dotted("pkg.mod")));

    assert!(overlay.owns_qualifier(&Qualifier::from_dotted("pkg.mod")));
    assert!(!overlay.owns_qualifier(&Qualifier::from_dotted("pkg.other")));

    let overlaid = match overlay.look_up_qualifier(&Qualifier::from_dotted("pkg.mod")) {
        LookupResult::Explicit(module_path) => module_path,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(
        overlay.code_of_module_path(&overlaid).unwrap(),
        "overlaid = True"
    );

    // Untouched modules fall through to the parent tracker.
    let untouched = match overlay.look_up_qualifier(&Qualifier::from_dotted("pkg.other")) {
        LookupResult::Explicit(module_path) => module_path,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(
        overlay.code_of_module_path(&untouched).unwrap(),
        "untouched = True"
    );

    // Resetting drops the override but keeps the ownership claim.
    overlay.update_overlaid_code(vec![(
        dir.path().join("pkg/mod.py"),
        CodeUpdate::ResetCode,
    )]);
    assert_eq!(
        overlay.code_of_module_path(&overlaid).unwrap(),
        "original = True"
    );
    assert!(overlay.owns_qualifier(&Qualifier::from_dotted("pkg.mod")));
}

#[test]
fn winner_is_priority_minimum_after_updates() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    write(&second, "deep/nested/a.py", "");

    let roots = SearchRoots::new(
        vec![SearchRoot::new(&first), SearchRoot::new(&second)],
        &[],
    )
    .unwrap();
    std::fs::create_dir_all(&first).unwrap();
    let mut tracker = ModuleTracker::eager(roots);

    write(&second, "a.py", "");
    write(&first, "a.py", "");
    tracker
        .process_events(vec![
            FileEvent::created_or_changed(second.join("a.py")),
            FileEvent::created_or_changed(first.join("a.py")),
        ])
        .unwrap();

    // Same relative path length: the earlier root wins.
    let winner = match tracker.look_up_qualifier(&Qualifier::from_dotted("a")) {
        LookupResult::Explicit(module_path) => module_path,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(winner.raw().root_index, 0);
}

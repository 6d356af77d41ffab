//! Integration tests for save and strip


use mtag::{ContainerState, EngineConfig, FileContainer, TagError, TagValue};
use std::fs;
use std::sync::Arc;
use test_helpers::*;

#[test]
fn create_set_save_reopen() {
    let audio = audio_bytes(512);
    let fixture = Fixture::new("plain.mp3", &audio);

    let mut file = mtag::open(&fixture.path).unwrap();
    assert!(file.tag(None, false).unwrap().is_none());
    let tag = file.tag(None, true).unwrap().unwrap();
    assert_eq!(tag.format(), "ID3");
    tag.set("title", "X").unwrap();
    file.save().unwrap();
    assert_eq!(file.state(), ContainerState::Clean);
    assert_eq!(file.formats(), vec!["ID3"]);

    let written = fixture.read();
    assert!(written.starts_with(b"ID3"));
    assert!(written.ends_with(&audio));

    let mut reopened = mtag::open(&fixture.path).unwrap();
    let tag = reopened.tag(None, false).unwrap().unwrap();
    assert_eq!(tag.get("title"), Some(TagValue::from("X")));
}

#[test]
fn strip_removes_only_the_block() {
    let audio = audio_bytes(300);
    let v1 = id3v1_block(&[("title", "Trailer".into())]);
    let original = file_of(&[&id3v2_block(&[("title", "Song".into())]), &audio, &v1]);
    let fixture = Fixture::new("song.mp3", &original);

    let mut file = mtag::open(&fixture.path).unwrap();
    file.strip("ID3");
    file.save().unwrap();

    assert_eq!(fixture.read(), file_of(&[&audio, &v1]));
    assert_eq!(file.formats(), vec!["ID3v1"]);
}

#[test]
fn save_is_idempotent() {
    let original = file_of(&[
        &id3v2_block(&[("title", "Song".into())]),
        &audio_bytes(200),
        &ape_block(&[("Catalog", "CAT-1".into())]),
    ]);
    let fixture = Fixture::new("song.mp3", &original);

    let mut file = mtag::open(&fixture.path).unwrap();
    let tag = file.tag(None, false).unwrap().unwrap();
    tag.set("artist", "Someone").unwrap();
    file.save().unwrap();
    let first = fixture.read();
    file.save().unwrap();
    assert_eq!(fixture.read(), first);

    // A fresh container reading the same file writes the same bytes again
    let mut reopened = mtag::open(&fixture.path).unwrap();
    reopened.tag(Some("ID3"), false).unwrap().unwrap();
    reopened.tag(Some("APE"), false).unwrap().unwrap();
    reopened.save().unwrap();
    assert_eq!(fixture.read(), first);
}

#[test]
fn unread_blocks_are_copied_unchanged() {
    let audio = audio_bytes(256);
    let ape = ape_block(&[("title", "APE title".into()), ("Cover", vec![1_u8, 2, 3].into())]);
    let v1 = id3v1_block(&[("title", "v1 title".into()), ("genre", TagValue::Integer(12))]);
    let original = file_of(&[&id3v2_block(&[("title", "Old".into())]), &audio, &ape, &v1]);
    let fixture = Fixture::new("song.mp3", &original);

    let mut file = mtag::open(&fixture.path).unwrap();
    file.tag(Some("ID3"), false)
        .unwrap()
        .unwrap()
        .set("title", "New")
        .unwrap();
    file.save().unwrap();

    let written = fixture.read();
    assert!(written.ends_with(&file_of(&[&audio, &ape, &v1])));

    let mut reopened = mtag::open(&fixture.path).unwrap();
    assert_eq!(reopened.formats(), vec!["ID3", "APE", "ID3v1"]);
    let id3 = reopened.tag(Some("ID3"), false).unwrap().unwrap();
    assert_eq!(id3.get("title"), Some(TagValue::from("New")));
}

#[test]
fn unsupported_field_fails_save_and_leaves_file() {
    let original = file_of(&[&audio_bytes(200), &id3v1_block(&[("title", "Song".into())])]);
    let fixture = Fixture::new("song.mp3", &original);

    let mut file = mtag::open(&fixture.path).unwrap();
    let tag = file.tag(None, false).unwrap().unwrap();
    assert_eq!(tag.format(), "ID3v1");
    tag.set("composer", "Nobody").unwrap();

    let err = file.save().unwrap_err();
    assert!(matches!(err, TagError::UnsupportedField { ref key, .. } if key == "composer"));
    assert_eq!(fixture.read(), original);
    assert!(file.is_dirty());

    // Fixing the store lets the save go through
    tag.remove("composer").unwrap();
    file.save().unwrap();
    assert!(!file.is_dirty());
}

#[test]
fn file_changed_on_disk_is_not_overwritten() {
    let fixture = Fixture::new("song.mp3", &audio_bytes(128));
    let mut file = mtag::open(&fixture.path).unwrap();
    file.tag(None, true).unwrap().unwrap().set("title", "X").unwrap();

    let replaced = audio_bytes(64);
    fs::write(&fixture.path, &replaced).unwrap();

    assert!(matches!(file.save(), Err(TagError::Io(_))));
    assert_eq!(fixture.read(), replaced);
    assert!(file.is_dirty());
}

#[test]
fn blocks_are_placed_by_format() {
    let audio = audio_bytes(128);
    let fixture = Fixture::new("plain.mp3", &audio);

    let mut file = mtag::open(&fixture.path).unwrap();
    file.tag(Some("ID3v1"), true).unwrap().unwrap().set("title", "v1").unwrap();
    file.tag(Some("APE"), true).unwrap().unwrap().set("title", "ape").unwrap();
    file.tag(Some("ID3"), true).unwrap().unwrap().set("title", "id3").unwrap();
    file.save().unwrap();

    let written = fixture.read();
    assert!(written.starts_with(b"ID3"));
    assert_eq!(&written[written.len() - 128..written.len() - 125], b"TAG");

    let mut reopened = mtag::open(&fixture.path).unwrap();
    assert_eq!(reopened.formats(), vec!["ID3", "APE", "ID3v1"]);
    for (format, title) in [("ID3", "id3"), ("APE", "ape"), ("ID3v1", "v1")] {
        let tag = reopened.tag(Some(format), false).unwrap().unwrap();
        assert_eq!(tag.get("title"), Some(TagValue::from(title)), "{format}");
    }
}

#[test]
fn strip_then_recreate_writes_fresh_block() {
    let original = file_of(&[
        &id3v2_block(&[("title", "Old".into()), ("artist", "Old".into())]),
        &audio_bytes(64),
    ]);
    let fixture = Fixture::new("song.mp3", &original);

    let mut file = mtag::open(&fixture.path).unwrap();
    file.strip("ID3");
    let tag = file.tag(Some("ID3"), true).unwrap().unwrap();
    assert!(tag.is_empty());
    tag.set("title", "New").unwrap();
    file.save().unwrap();

    let mut reopened = mtag::open(&fixture.path).unwrap();
    let tag = reopened.tag(None, false).unwrap().unwrap();
    assert_eq!(tag.get("title"), Some(TagValue::from("New")));
    assert_eq!(tag.get("artist"), None);
}

#[test]
fn configured_id3v2_version_and_padding() {
    let fixture = Fixture::new("plain.mp3", &audio_bytes(64));
    let mut config = EngineConfig::default();
    config.id3v2.version = 3;
    config.id3v2.padding = 256;
    let registry = Arc::new(config.build_registry().unwrap());

    let mut file = FileContainer::open_with(&fixture.path, registry, &config).unwrap();
    file.tag(None, true).unwrap().unwrap().set("title", "Café").unwrap();
    file.save().unwrap();

    let written = fixture.read();
    assert_eq!(&written[..4], b"ID3\x03");
    assert!(written.len() > 256 + 64);

    let mut reopened = mtag::open(&fixture.path).unwrap();
    let tag = reopened.tag(None, false).unwrap().unwrap();
    assert_eq!(tag.get("title"), Some(TagValue::from("Café")));
}

#[test]
fn configured_default_format() {
    let fixture = Fixture::new("plain.mp3", &audio_bytes(64));
    let config = EngineConfig {
        default_format: "APE".to_string(),
        ..EngineConfig::default()
    };
    let registry = Arc::new(config.build_registry().unwrap());

    let mut file = FileContainer::open_with(&fixture.path, registry, &config).unwrap();
    let tag = file.tag(None, true).unwrap().unwrap();
    assert_eq!(tag.format(), "APE");
}

#[test]
fn numeric_text_reads_back_unchanged() {
    let fixture = Fixture::new("plain.mp3", &audio_bytes(64));
    let mut file = mtag::open(&fixture.path).unwrap();
    let tag = file.tag(None, true).unwrap().unwrap();
    tag.set("year", "2001").unwrap();
    tag.set("tracknumber", "3/12").unwrap();
    let before = tag.to_store();
    file.save().unwrap();

    let mut reopened = mtag::open(&fixture.path).unwrap();
    let tag = reopened.tag(None, false).unwrap().unwrap();
    assert_eq!(tag.to_store(), before);
    assert_eq!(tag.get("year"), Some(TagValue::Integer(2001)));
    assert_eq!(tag.get("tracknumber"), Some(TagValue::from("3/12")));
}

#[test]
fn id3v1_edits_keep_slot_order_through_save() {
    let original = file_of(&[&audio_bytes(64), &id3v1_block(&[("genre", TagValue::Integer(8))])]);
    let fixture = Fixture::new("song.mp3", &original);

    let mut file = mtag::open(&fixture.path).unwrap();
    let tag = file.tag(None, false).unwrap().unwrap();
    tag.set("artist", "B").unwrap();
    tag.set("title", "A").unwrap();
    let keys: Vec<_> = tag.fields().map(|(k, _)| k).collect();
    assert_eq!(keys, ["title", "artist", "genre"]);
    let before = tag.to_store();
    file.save().unwrap();

    let mut reopened = mtag::open(&fixture.path).unwrap();
    let tag = reopened.tag(Some("ID3v1"), false).unwrap().unwrap();
    assert_eq!(tag.to_store(), before);
}

/// ID3v2.4 tag holding two TIT2 frames
fn id3v2_with_repeated_title() -> Vec<u8> {
    let mut frames = Vec::new();
    for text in [&b"First"[..], &b"Second"[..]] {
        frames.extend_from_slice(b"TIT2");
        frames.extend_from_slice(&[0, 0, 0, text.len() as u8 + 1, 0, 0, 3]);
        frames.extend_from_slice(text);
    }
    let mut tag = b"ID3\x04\x00\x00\x00\x00\x00".to_vec();
    tag.push(frames.len() as u8);
    tag.extend(frames);
    tag
}

#[test]
fn dropped_entries_are_reported_until_saved() {
    let original = file_of(&[&id3v2_with_repeated_title(), &audio_bytes(64)]);
    let fixture = Fixture::new("song.mp3", &original);

    let mut file = mtag::open(&fixture.path).unwrap();
    assert!(file.dropped_entries("ID3").is_empty());
    let tag = file.tag(None, false).unwrap().unwrap();
    assert_eq!(tag.get("title"), Some(TagValue::from("First")));
    assert_eq!(file.dropped_entries("ID3"), vec!["TIT2"]);

    file.save().unwrap();
    assert!(file.dropped_entries("ID3").is_empty());

    let mut reopened = mtag::open(&fixture.path).unwrap();
    reopened.tag(None, false).unwrap().unwrap();
    assert!(reopened.dropped_entries("ID3").is_empty());
}

/// True when mode bits do not stop this process (running as root)
#[cfg(unix)]
fn ignores_mode_bits(path: &std::path::Path) -> bool {
    fs::OpenOptions::new().write(true).open(path).is_ok()
}

#[cfg(unix)]
#[test]
fn read_only_file_is_permission_denied() {
    use std::os::unix::fs::PermissionsExt;

    let original = audio_bytes(64);
    let fixture = Fixture::new("song.mp3", &original);
    fs::set_permissions(&fixture.path, fs::Permissions::from_mode(0o444)).unwrap();
    if ignores_mode_bits(&fixture.path) {
        return;
    }

    let mut file = mtag::open(&fixture.path).unwrap();
    file.tag(None, true).unwrap().unwrap().set("title", "X").unwrap();
    let err = file.save().unwrap_err();
    assert!(matches!(err, TagError::PermissionDenied(p) if p == fixture.path));
    assert_eq!(fixture.read(), original);
    assert!(file.is_dirty());
}

#[cfg(unix)]
#[test]
fn unreadable_file_is_permission_denied_on_open() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new("song.mp3", &audio_bytes(64));
    fs::set_permissions(&fixture.path, fs::Permissions::from_mode(0o000)).unwrap();
    if ignores_mode_bits(&fixture.path) {
        return;
    }

    let err = mtag::open(&fixture.path).unwrap_err();
    assert!(matches!(err, TagError::PermissionDenied(p) if p == fixture.path));
}

#[cfg(unix)]
#[test]
fn save_keeps_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new("song.mp3", &audio_bytes(64));
    fs::set_permissions(&fixture.path, fs::Permissions::from_mode(0o640)).unwrap();

    let mut file = mtag::open(&fixture.path).unwrap();
    file.tag(None, true).unwrap().unwrap().set("title", "X").unwrap();
    file.save().unwrap();

    let mode = fs::metadata(&fixture.path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
}

//! Property-based tests for the save cycle
//!
//! Uses proptest to check that audio bytes survive any open/mutate/save cycle
//! and that saving twice is byte-identical.


use mtag::TagValue;
use proptest::prelude::*;
use test_helpers::*;

// ===== Helpers =====

/// Audio bytes drawn from 0x80..=0xFF, which no tag signature uses
fn arbitrary_audio() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0x80_u8..=0xFF, 0..2048)
}

fn arbitrary_title() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ]{0,20}[A-Za-z0-9]"
}

/// Which of ID3v2 / APE / ID3v1 the starting file carries
fn arbitrary_layout() -> impl Strategy<Value = (bool, bool, bool)> {
    (any::<bool>(), any::<bool>(), any::<bool>())
}

fn build_file(audio: &[u8], (id3, ape, v1): (bool, bool, bool)) -> Vec<u8> {
    let mut data = Vec::new();
    if id3 {
        data.extend(id3v2_block(&[("title", "Original".into())]));
    }
    data.extend_from_slice(audio);
    if ape {
        data.extend(ape_block(&[("artist", "Original".into())]));
    }
    if v1 {
        data.extend(id3v1_block(&[("album", "Original".into())]));
    }
    data
}

// ===== Property Tests =====

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: bytes outside tag blocks are unchanged by a save cycle
    #[test]
    fn audio_survives_mutate_and_save(
        audio in arbitrary_audio(),
        layout in arbitrary_layout(),
        title in arbitrary_title(),
    ) {
        let fixture = Fixture::new("song.mp3", &build_file(&audio, layout));

        let mut file = mtag::open(&fixture.path).unwrap();
        let tag = file.tag(None, true).unwrap().unwrap();
        tag.set("title", title.as_str()).unwrap();
        file.save().unwrap();

        let mut reopened = mtag::open(&fixture.path).unwrap();
        let tag = reopened.tag(None, false).unwrap().unwrap();
        prop_assert_eq!(tag.get("title"), Some(TagValue::from(title.as_str())));

        // Stripping every block must leave exactly the audio
        let formats: Vec<String> = reopened.formats().iter().map(|f| f.to_string()).collect();
        for format in &formats {
            reopened.strip(format);
        }
        reopened.save().unwrap();
        prop_assert_eq!(fixture.read(), audio);
    }

    /// Property: saving twice without changes writes identical bytes
    #[test]
    fn save_twice_is_identical(
        audio in arbitrary_audio(),
        layout in arbitrary_layout(),
        title in arbitrary_title(),
    ) {
        let fixture = Fixture::new("song.mp3", &build_file(&audio, layout));

        let mut file = mtag::open(&fixture.path).unwrap();
        file.tag(None, true).unwrap().unwrap().set("title", title).unwrap();
        file.save().unwrap();
        let first = fixture.read();

        file.save().unwrap();
        prop_assert_eq!(fixture.read(), first);
    }
}

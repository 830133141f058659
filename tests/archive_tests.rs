use milo_import::{
    archive::{Archive, DirectoryLayout, SENTINEL},
    cursor::ByteOrder,
    skeleton::Matrix34,
    DecodeError, DecodeSession, ImportOptions, Platform, SceneRecorder,
};

mod common;
use common::{entry, trans_v8, trans_v9, ArchiveSpec};

#[test]
fn nested_directory_pairs_entries_with_payloads() {
    let data = ArchiveSpec::new(ByteOrder::Big, 28)
        .with(entry("Trans", "a.mesh", vec![1, 2, 3]))
        .with(entry("Tex", "b.tex", vec![4]))
        .build();
    let archive = Archive::parse(&data, Platform::Ps3, None).unwrap();
    assert_eq!(archive.directory.version, 28);
    assert_eq!(archive.directory.order, ByteOrder::Big);
    assert_eq!(archive.directory.layout, DirectoryLayout::Nested);
    assert_eq!(archive.root_kind(), Some("ObjectDir"));
    let names: Vec<_> = archive.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["root", "a.mesh", "b.tex"]);
    assert_eq!(archive.entries[1].payload, [1, 2, 3]);
    assert_eq!(archive.entries[2].payload, [4]);
    assert!(archive.surplus.is_empty());
    assert_eq!(archive.header.block_sizes.len(), 1);
}

#[test]
fn flat_little_endian_directory() {
    let data = ArchiveSpec::new(ByteOrder::Little, 10)
        .with(entry("Mesh", "bone_pelvis.mesh", trans_v8(ByteOrder::Little, &Matrix34::IDENTITY, "")))
        .build();
    let archive = Archive::parse(&data, Platform::Ps2, None).unwrap();
    assert_eq!(archive.directory.layout, DirectoryLayout::Flat);
    assert_eq!(archive.directory.order, ByteOrder::Little);
    assert_eq!(archive.root_kind(), None);
    assert_eq!(archive.entries.len(), 1);
    assert!(archive.directory.external_paths.is_empty());

    // old archives store bones as meshes
    let opts = ImportOptions::default();
    let mut rec = SceneRecorder::new();
    let report = DecodeSession::new(&opts, &mut rec)
        .unwrap()
        .decode_entries(&archive);
    assert_eq!(report.decoded, 1);
    assert!(rec.bones.contains_key("bone_pelvis.mesh"));
}

#[test]
fn nested9_directory() {
    let data = ArchiveSpec::new(ByteOrder::Big, 32)
        .with(entry("Trans", "x.mesh", trans_v9(ByteOrder::Big, &Matrix34::IDENTITY, "")))
        .build();
    let archive = Archive::parse(&data, Platform::Xbox360, None).unwrap();
    assert_eq!(archive.directory.layout, DirectoryLayout::Nested9);
    assert_eq!(archive.entries.len(), 2);
}

#[test]
fn fewer_payloads_than_entries_is_rejected() {
    let mut spec = ArchiveSpec::new(ByteOrder::Big, 28)
        .with(entry("Tex", "a.tex", vec![1]))
        .with(entry("Tex", "b.tex", vec![2]));
    spec.missing_payloads = 1;
    let err = Archive::parse(&spec.build(), Platform::Ps3, None).unwrap_err();
    assert!(matches!(err, DecodeError::MalformedDirectory(_)), "{err}");
    assert!(err.is_archive_fatal());
}

#[test]
fn surplus_payloads_are_reported() {
    let mut data = ArchiveSpec::new(ByteOrder::Big, 28)
        .with(entry("Tex", "a.tex", vec![1]))
        .build();
    data.extend(b"junk");
    data.extend(SENTINEL);
    let archive = Archive::parse(&data, Platform::Ps3, None).unwrap();
    assert_eq!(archive.entries.len(), 2);
    assert_eq!(archive.surplus, vec![&b"junk"[..]]);

    let opts = ImportOptions::default();
    let mut rec = SceneRecorder::new();
    let report = DecodeSession::new(&opts, &mut rec)
        .unwrap()
        .decode_entries(&archive);
    assert_eq!(report.surplus_payloads, 1);
}

#[test]
fn magic_is_checked() {
    let mut data = ArchiveSpec::new(ByteOrder::Big, 28).build();
    data[..4].copy_from_slice(&0xCBBE_DEAFu32.to_le_bytes());
    assert!(matches!(
        Archive::parse(&data, Platform::Ps3, None),
        Err(DecodeError::CompressedArchive(0xCBBE_DEAF))
    ));
    data[..4].copy_from_slice(b"RIFF");
    assert!(matches!(
        Archive::parse(&data, Platform::Ps3, None),
        Err(DecodeError::BadMagic(_))
    ));
}

#[test]
fn unknown_directory_version_is_malformed() {
    let data = ArchiveSpec::new(ByteOrder::Big, 99).build();
    assert!(matches!(
        Archive::parse(&data, Platform::Ps3, None),
        Err(DecodeError::MalformedDirectory(_))
    ));
}

#[test]
fn byte_order_override_pins_the_directory() {
    let data = ArchiveSpec::new(ByteOrder::Big, 28).build();
    assert!(Archive::parse(&data, Platform::Ps3, Some(ByteOrder::Big)).is_ok());
    assert!(Archive::parse(&data, Platform::Ps3, Some(ByteOrder::Little)).is_err());
}

#[test]
fn archive_files_are_found_and_mapped() {
    let dir = tempfile::tempdir().unwrap();
    let data = ArchiveSpec::new(ByteOrder::Big, 28)
        .with(entry("Tex", "a.tex", vec![1]))
        .build();
    std::fs::create_dir(dir.path().join("char")).unwrap();
    let path = dir.path().join("char/guitar.milo_xbox");
    std::fs::write(&path, &data).unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"hi").unwrap();

    let found = milo_import::find_archives(dir.path());
    assert_eq!(found, vec![path.clone()]);
    let file = milo_import::ArchiveFile::open(&path, Platform::Xbox360).unwrap();
    assert_eq!(file.bytes(), &data[..]);
    let archive = file.parse(None).unwrap();
    assert_eq!(archive.platform, Platform::Xbox360);
    assert_eq!(archive.entries.len(), 2);
}

use cafe_pack::{decode, encode, extract_to_dir, hash_name, pack_dir, ErrorKind, Sarc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn data_range(data: &[u8], index: usize) -> (usize, usize) {
    let entry = 0x20 + index * 0x10;
    let begin = u32::from_be_bytes(data[entry + 8..entry + 12].try_into().unwrap());
    let end = u32::from_be_bytes(data[entry + 12..entry + 16].try_into().unwrap());
    (begin as usize, end as usize)
}

#[test]
fn pack_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("a.txt"), b"abcd").unwrap();
    let b: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
    std::fs::write(dir.path().join("sub").join("b.txt"), &b).unwrap();

    let data = pack_dir(dir.path(), 256).unwrap();
    let sarc = Sarc::new(&data).unwrap();
    assert_eq!(sarc.file_count(), 2);
    assert_eq!(sarc.data_offset() % 256, 0);

    let mut expected = vec![("a.txt", hash_name(0x65, "a.txt")), ("sub/b.txt", hash_name(0x65, "sub/b.txt"))];
    expected.sort_by_key(|(_, hash)| *hash);
    for (index, (name, hash)) in expected.iter().enumerate() {
        assert_eq!(sarc.hash_at(index).unwrap(), *hash);
        assert_eq!(sarc.file_at(index).unwrap().name, Some(*name));
    }

    assert_eq!(sarc.get_file("a.txt").unwrap().unwrap().data, b"abcd");
    assert_eq!(sarc.get_file("sub/b.txt").unwrap().unwrap().data, &b[..]);
    assert!(sarc.get_file("c.txt").unwrap().is_none());

    let out = tempfile::tempdir().unwrap();
    extract_to_dir(&data, out.path()).unwrap();
    assert_eq!(std::fs::read(out.path().join("a.txt")).unwrap(), b"abcd");
    assert_eq!(std::fs::read(out.path().join("sub/b.txt")).unwrap(), b);
}

#[test]
fn wrong_magic_extracts_nothing() {
    let mut data = encode(vec![("a.txt", b"abcd".to_vec())], 0x100).unwrap();
    data[..4].copy_from_slice(b"CRAS");
    let err = decode(&data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);

    let out = tempfile::tempdir().unwrap();
    let err = extract_to_dir(&data, out.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn input_order_does_not_matter() {
    let files = vec![
        ("zeta.bin", vec![1u8; 17]),
        ("alpha.bin", vec![2u8; 3]),
        ("Actor/Pack/thing.sbactorpack", vec![3u8; 40]),
        ("m", vec![]),
    ];
    let mut reversed = files.clone();
    reversed.reverse();
    let forward = encode(files, 0x80).unwrap();
    assert_eq!(encode(reversed, 0x80).unwrap(), forward);

    let sarc = Sarc::new(&forward).unwrap();
    let hashes: Vec<u32> = (0..sarc.file_count())
        .map(|i| sarc.hash_at(i).unwrap())
        .collect();
    assert!(hashes.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn padding() {
    let sizes = [1usize, 0x100, 0x101, 0, 7];
    let files: Vec<_> = sizes
        .iter()
        .enumerate()
        .map(|(i, size)| (format!("file{}", i), vec![0xEEu8; *size]))
        .collect();
    let data = encode(files, 0x100).unwrap();
    let sarc = Sarc::new(&data).unwrap();
    let count = sarc.file_count();
    for index in 0..count {
        let (begin, end) = data_range(&data, index);
        assert_eq!(begin % 0x100, 0);
        if index + 1 < count {
            let (next, _) = data_range(&data, index + 1);
            let len = end - begin;
            assert_eq!(next - begin, (len + 0xFF) / 0x100 * 0x100);
            assert!(data[sarc.data_offset() + end..sarc.data_offset() + next]
                .iter()
                .all(|b| *b == 0));
        } else {
            assert_eq!(sarc.data_offset() + end, data.len());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roundtrip(
        files in prop::collection::btree_map("[a-z]{1,6}(/[a-z0-9_.]{1,8}){0,2}", prop::collection::vec(any::<u8>(), 0..64), 1..12),
        shift in 2u32..9,
    ) {
        let hashes: Vec<u32> = files.keys().map(|n| hash_name(0x65, n)).collect();
        let mut unique = hashes.clone();
        unique.sort();
        unique.dedup();
        prop_assume!(unique.len() == hashes.len());

        let data = encode(files.clone(), 1 << shift).unwrap();
        let decoded: BTreeMap<String, Vec<u8>> = decode(&data).unwrap().into_iter().collect();
        prop_assert_eq!(decoded, files);
    }
}

//! End-to-end: rows encoded with primary-key columns living in the key,
//! stored through the engine dispatch layer, scanned through table
//! cursors, decoded column by column.

use rustkv::{
    encode_key, encode_row, Col, Env, KeyInfo, KvCursor, KvStore, OpenFlags, RowReader, SeekDir,
    SeekResult, SortOrder, Storage, TableCursor, Value, ROOT_TABLE,
};

const PEOPLE: rustkv::TableId = 12;

fn engines() -> Vec<&'static str> {
    Env::default_env().engines().to_vec()
}

fn open(engine: &str) -> Storage {
    Storage::open(&Env::default_env(), Some(engine), OpenFlags::default()).unwrap()
}

/// Insert (id) -> (id in key, name, score) rows.
fn load_people(s: &Storage) {
    let rows: [(i64, &str, f64); 4] = [
        (1, "ada", 99.5),
        (2, "grace", 92.25),
        (5, "edsger", 90.0),
        (9, "alan", 88.5),
    ];
    for (id, name, score) in rows {
        let key = encode_key(PEOPLE, &[Value::Integer(id)], &KeyInfo::ascending(1)).unwrap();
        let name = Value::Text(name.to_string());
        let score = Value::Real(score);
        let row = encode_row(
            &[
                Col::InKey {
                    field: 0,
                    real: false,
                },
                Col::Val(&name),
                Col::Val(&score),
            ],
            None,
        )
        .unwrap();
        s.replace(&key, &row).unwrap();
    }
}

#[test]
fn test_scan_and_decode_rows() {
    for engine in engines() {
        let s = open(engine);
        load_people(&s);
        let mut c = TableCursor::new(s.open_cursor().unwrap(), PEOPLE);

        let mut seen = Vec::new();
        let mut more = c.first().unwrap();
        while more {
            let key = c.full_key().unwrap().to_vec();
            let row = c.data(0, None).unwrap().to_vec();
            let r = RowReader::new(&row, Some(&key)).unwrap();
            let id = match r.get(0).unwrap() {
                Value::Integer(v) => v,
                other => panic!("id column: {:?}", other),
            };
            let name = match r.get(1).unwrap() {
                Value::Text(t) => t,
                other => panic!("name column: {:?}", other),
            };
            seen.push((id, name));
            more = c.next().unwrap();
        }
        assert_eq!(
            seen,
            vec![
                (1, "ada".to_string()),
                (2, "grace".to_string()),
                (5, "edsger".to_string()),
                (9, "alan".to_string()),
            ],
            "{}",
            engine
        );
    }
}

#[test]
fn test_probe_seek_positions_on_neighbor() {
    for engine in engines() {
        let s = open(engine);
        load_people(&s);
        let mut c = TableCursor::new(s.open_cursor().unwrap(), PEOPLE);

        let probe = encode_key(ROOT_TABLE, &[Value::Integer(4)], &KeyInfo::ascending(1)).unwrap();
        assert_eq!(c.seek(&probe, SeekDir::Ge).unwrap(), SeekResult::Inexact);
        let key = c.full_key().unwrap().to_vec();
        let (tid, fields) = rustkv::decode_key(&key).unwrap();
        assert_eq!(tid, PEOPLE);
        assert_eq!(fields, vec![Value::Integer(5)], "{}", engine);

        assert_eq!(c.seek(&probe, SeekDir::Le).unwrap(), SeekResult::Inexact);
        let key = c.full_key().unwrap().to_vec();
        let (_, fields) = rustkv::decode_key(&key).unwrap();
        assert_eq!(fields, vec![Value::Integer(2)], "{}", engine);

        // LeFast promises only some entry at or below the probe.
        assert_ne!(
            c.seek(&probe, SeekDir::LeFast).unwrap(),
            SeekResult::NotFound,
            "{}",
            engine
        );
        assert!(c.full_key().unwrap() <= probe_key(4).as_slice());
    }
}

fn probe_key(id: i64) -> Vec<u8> {
    encode_key(PEOPLE, &[Value::Integer(id)], &KeyInfo::ascending(1)).unwrap()
}

#[test]
fn test_delete_then_walk_both_directions() {
    for engine in engines() {
        let s = open(engine);
        load_people(&s);
        let mut c = TableCursor::new(s.open_cursor().unwrap(), PEOPLE);

        let probe = encode_key(ROOT_TABLE, &[Value::Integer(2)], &KeyInfo::ascending(1)).unwrap();
        assert_eq!(c.seek(&probe, SeekDir::Eq).unwrap(), SeekResult::Found);
        c.delete().unwrap();
        // next() from the phantom visits the old successor.
        assert!(c.next().unwrap());
        let (_, fields) = rustkv::decode_key(&c.full_key().unwrap().to_vec()).unwrap();
        assert_eq!(fields, vec![Value::Integer(5)], "{}", engine);

        // Delete again and walk backwards to the old predecessor.
        c.delete().unwrap();
        assert!(c.prev().unwrap());
        let (_, fields) = rustkv::decode_key(&c.full_key().unwrap().to_vec()).unwrap();
        assert_eq!(fields, vec![Value::Integer(1)], "{}", engine);
    }
}

#[test]
fn test_row_changed_drives_decoder_cache() {
    for engine in engines() {
        let s = open(engine);
        load_people(&s);
        let mut c = TableCursor::new(s.open_cursor().unwrap(), PEOPLE);

        assert!(c.first().unwrap());
        assert!(c.row_changed(), "{}", engine);
        assert!(!c.row_changed(), "{}", engine);

        // Overwriting the row under the cursor raises the flag again and
        // the refetched bytes decode to the new value.
        let key = c.full_key().unwrap().to_vec();
        let name = Value::Text("ada lovelace".to_string());
        let row = encode_row(
            &[
                Col::InKey {
                    field: 0,
                    real: false,
                },
                Col::Val(&name),
            ],
            None,
        )
        .unwrap();
        s.replace(&key, &row).unwrap();

        assert!(c.row_changed(), "{}", engine);
        let bytes = c.data(0, None).unwrap().to_vec();
        let r = RowReader::new(&bytes, Some(&key)).unwrap();
        assert_eq!(r.get(1).unwrap(), Value::Text("ada lovelace".into()));
    }
}

#[test]
fn test_descending_index_scans_backwards() {
    // A two-field index (score DESC, id ASC): walking the table forward
    // yields descending scores.
    for engine in engines() {
        let s = open(engine);
        let info = KeyInfo {
            fields: vec![
                rustkv::KeyField {
                    order: SortOrder::Desc,
                    coll: rustkv::Collation::Binary,
                },
                rustkv::KeyField::default(),
            ],
        };
        let rows: [(f64, i64); 3] = [(88.5, 9), (99.5, 1), (92.25, 2)];
        for (score, id) in rows {
            let key = encode_key(
                30,
                &[Value::Real(score), Value::Integer(id)],
                &info,
            )
            .unwrap();
            s.replace(&key, b"").unwrap();
        }

        let mut c = TableCursor::new(s.open_cursor().unwrap(), 30);
        let mut scores = Vec::new();
        let mut more = c.first().unwrap();
        while more {
            let (_, fields) = rustkv::decode_key(&c.full_key().unwrap().to_vec()).unwrap();
            match fields[0] {
                Value::Real(f) => scores.push(f),
                Value::Integer(i) => scores.push(i as f64),
                ref other => panic!("score: {:?}", other),
            }
            more = c.next().unwrap();
        }
        assert_eq!(scores, vec![99.5, 92.25, 88.5], "{}", engine);
    }
}

#[test]
fn test_uniqueness_probe_with_short_key() {
    // An index on (name) with the id appended: a uniqueness check probes
    // with just the name prefix, which short_key measures.
    for engine in engines() {
        let s = open(engine);
        let info = KeyInfo::ascending(2);
        for (name, id) in [("ada", 1i64), ("grace", 2)] {
            let key = encode_key(
                40,
                &[Value::Text(name.into()), Value::Integer(id)],
                &info,
            )
            .unwrap();
            s.replace(&key, b"").unwrap();
        }

        let full = encode_key(
            40,
            &[Value::Text("grace".into()), Value::Integer(999)],
            &info,
        )
        .unwrap();
        let prefix_len = rustkv::short_key(&full, 1).unwrap();
        let mut c = s.open_cursor().unwrap();
        // Some entry with the same first field exists iff a Ge probe on
        // the truncated key lands on a key sharing that prefix.
        let r = c.seek(&full[..prefix_len], SeekDir::Ge).unwrap();
        assert_ne!(r, SeekResult::NotFound, "{}", engine);
        assert!(c.key().unwrap().starts_with(&full[..prefix_len]), "{}", engine);
    }
}

/*
 * Created on Sat Mar 18 2023
 *
 * This file is a part of resqld
 * resqld is a free and open-source Redis-wire-compatible database server
 * written by Sayan Nandan ("the Author") with the vision of running the
 * full Redis command surface on top of transactional SQL-shaped storage
 * without compromising on protocol fidelity or performance.
 *
 * Copyright (c) 2023, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    super::{
        error::StorageErrorKind, memory::MemoryEngine, Backend, BitfieldEncoding, BitfieldOp,
        DataOps, TypeTag,
    },
    std::time::Duration,
};

#[tokio::test]
async fn set_get_is_binary_safe() {
    let engine = MemoryEngine::new();
    let payload = b"\x00\x01\xff\xfe\r\n\x00tail".to_vec();
    engine.set(b"bin", payload.clone(), None, false).await.unwrap();
    assert_eq!(engine.get(b"bin").await.unwrap(), Some(payload));
    assert_eq!(engine.get(b"missing").await.unwrap(), None);
}

#[tokio::test]
async fn ttl_sentinels() {
    let engine = MemoryEngine::new();
    assert_eq!(engine.ttl(b"nope").await.unwrap(), -2);
    engine.set(b"k", b"v".to_vec(), None, false).await.unwrap();
    assert_eq!(engine.ttl(b"k").await.unwrap(), -1);
    engine
        .expire(b"k", Duration::from_secs(100))
        .await
        .unwrap();
    let ttl = engine.ttl(b"k").await.unwrap();
    assert!((99..=100).contains(&ttl), "ttl was {ttl}");
    assert!(engine.persist(b"k").await.unwrap());
    assert_eq!(engine.ttl(b"k").await.unwrap(), -1);
}

#[tokio::test]
async fn expired_key_reads_as_absent() {
    let engine = MemoryEngine::new();
    engine
        .set(b"gone", b"v".to_vec(), Some(Duration::from_millis(1)), false)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.get(b"gone").await.unwrap(), None);
    assert_eq!(engine.ttl(b"gone").await.unwrap(), -2);
    assert_eq!(engine.key_type(b"gone").await.unwrap(), TypeTag::None);
}

#[tokio::test]
async fn set_keepttl_preserves_the_deadline() {
    let engine = MemoryEngine::new();
    engine
        .set(b"k", b"v1".to_vec(), Some(Duration::from_secs(100)), false)
        .await
        .unwrap();
    engine.set(b"k", b"v2".to_vec(), None, true).await.unwrap();
    assert!(engine.ttl(b"k").await.unwrap() > 0);
    engine.set(b"k", b"v3".to_vec(), None, false).await.unwrap();
    assert_eq!(engine.ttl(b"k").await.unwrap(), -1);
}

#[tokio::test]
async fn incr_counts_and_rejects_garbage() {
    let engine = MemoryEngine::new();
    assert_eq!(engine.incr(b"ctr", 1).await.unwrap(), 1);
    assert_eq!(engine.incr(b"ctr", 10).await.unwrap(), 11);
    assert_eq!(engine.incr(b"ctr", -12).await.unwrap(), -1);
    engine.set(b"ctr", b"hi".to_vec(), None, false).await.unwrap();
    let e = engine.incr(b"ctr", 1).await.unwrap_err();
    assert_eq!(e.kind, StorageErrorKind::NotInteger);
    // overflow
    engine
        .set(b"big", i64::MAX.to_string().into_bytes(), None, false)
        .await
        .unwrap();
    let e = engine.incr(b"big", 1).await.unwrap_err();
    assert_eq!(e.kind, StorageErrorKind::NotInteger);
}

#[tokio::test]
async fn wrong_type_is_reported() {
    let engine = MemoryEngine::new();
    engine
        .l_push(b"list", vec![b"x".to_vec()])
        .await
        .unwrap();
    let e = engine.get(b"list").await.unwrap_err();
    assert_eq!(e.kind, StorageErrorKind::WrongType);
    let e = engine.incr(b"list", 1).await.unwrap_err();
    assert_eq!(e.kind, StorageErrorKind::WrongType);
    assert_eq!(engine.key_type(b"list").await.unwrap(), TypeTag::List);
}

#[tokio::test]
async fn list_push_pop_ordering() {
    let engine = MemoryEngine::new();
    engine
        .r_push(b"l", vec![b"a".to_vec(), b"b".to_vec()])
        .await
        .unwrap();
    engine.l_push(b"l", vec![b"z".to_vec()]).await.unwrap();
    assert_eq!(
        engine.l_range(b"l", 0, -1).await.unwrap(),
        vec![b"z".to_vec(), b"a".to_vec(), b"b".to_vec()]
    );
    assert_eq!(engine.l_pop(b"l").await.unwrap(), Some(b"z".to_vec()));
    assert_eq!(engine.r_pop(b"l").await.unwrap(), Some(b"b".to_vec()));
    assert_eq!(engine.l_len(b"l").await.unwrap(), 1);
    // popping the last element removes the key entirely
    engine.l_pop(b"l").await.unwrap();
    assert_eq!(engine.key_type(b"l").await.unwrap(), TypeTag::None);
}

#[tokio::test]
async fn list_insert_set_rem() {
    let engine = MemoryEngine::new();
    engine
        .r_push(b"l", vec![b"a".to_vec(), b"c".to_vec()])
        .await
        .unwrap();
    assert_eq!(
        engine
            .l_insert(b"l", true, b"c", b"b".to_vec())
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        engine.l_range(b"l", 0, -1).await.unwrap(),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
    );
    assert_eq!(
        engine
            .l_insert(b"l", false, b"missing", b"x".to_vec())
            .await
            .unwrap(),
        -1
    );
    engine.l_set(b"l", -1, b"C".to_vec()).await.unwrap();
    assert_eq!(engine.l_index(b"l", 2).await.unwrap(), Some(b"C".to_vec()));
    assert!(engine.l_set(b"l", 9, b"x".to_vec()).await.is_err());
    assert!(engine.l_set(b"nosuch", 0, b"x".to_vec()).await.is_err());
}

#[tokio::test]
async fn hash_basics() {
    let engine = MemoryEngine::new();
    assert_eq!(
        engine
            .h_set(
                b"h",
                vec![
                    (b"f1".to_vec(), b"v1".to_vec()),
                    (b"f2".to_vec(), b"v2".to_vec())
                ]
            )
            .await
            .unwrap(),
        2
    );
    // overwriting an existing field creates nothing
    assert_eq!(
        engine
            .h_set(b"h", vec![(b"f1".to_vec(), b"v1b".to_vec())])
            .await
            .unwrap(),
        0
    );
    assert_eq!(engine.h_get(b"h", b"f1").await.unwrap(), Some(b"v1b".to_vec()));
    assert_eq!(engine.h_len(b"h").await.unwrap(), 2);
    assert!(!engine
        .h_set_nx(b"h", b"f1", b"nope".to_vec())
        .await
        .unwrap());
    assert_eq!(engine.h_del(b"h", &[b"f1", b"zz"]).await.unwrap(), 1);
    // removing the last field removes the key
    engine.h_del(b"h", &[b"f2"]).await.unwrap();
    assert_eq!(engine.key_type(b"h").await.unwrap(), TypeTag::None);
}

#[tokio::test]
async fn zset_ordering_and_pop() {
    let engine = MemoryEngine::new();
    engine
        .z_add(
            b"z",
            vec![
                (2.0, b"two".to_vec()),
                (1.0, b"one".to_vec()),
                (3.0, b"three".to_vec()),
            ],
            false,
        )
        .await
        .unwrap();
    let range = engine.z_range(b"z", 0, -1, false).await.unwrap();
    let members: Vec<&[u8]> = range.iter().map(|(m, _)| m.as_slice()).collect();
    assert_eq!(members, vec![&b"one"[..], b"two", b"three"]);
    let rev = engine.z_range(b"z", 0, 0, true).await.unwrap();
    assert_eq!(rev[0].0, b"three".to_vec());
    let popped = engine.z_pop_min(b"z", 2).await.unwrap();
    assert_eq!(popped[0].0, b"one".to_vec());
    assert_eq!(popped[1].0, b"two".to_vec());
    assert_eq!(engine.z_card(b"z").await.unwrap(), 1);
}

#[tokio::test]
async fn zset_nx_add_and_ties() {
    let engine = MemoryEngine::new();
    engine
        .z_add(b"z", vec![(1.0, b"m".to_vec())], false)
        .await
        .unwrap();
    // nx must not touch the existing member
    engine
        .z_add(b"z", vec![(9.0, b"m".to_vec())], true)
        .await
        .unwrap();
    assert_eq!(engine.z_score(b"z", b"m").await.unwrap(), Some(1.0));
    // equal scores order lexicographically by member
    engine
        .z_add(
            b"z",
            vec![(1.0, b"a".to_vec()), (1.0, b"b".to_vec())],
            false,
        )
        .await
        .unwrap();
    let range = engine.z_range(b"z", 0, -1, false).await.unwrap();
    let members: Vec<&[u8]> = range.iter().map(|(m, _)| m.as_slice()).collect();
    assert_eq!(members, vec![&b"a"[..], b"b", b"m"]);
}

#[tokio::test]
async fn bitfield_wrap_semantics() {
    let engine = MemoryEngine::new();
    let enc = BitfieldEncoding {
        signed: false,
        bits: 8,
    };
    let replies = engine
        .bitfield(
            b"bf",
            &[
                BitfieldOp::Set {
                    enc,
                    offset: 0,
                    value: 255,
                },
                BitfieldOp::IncrBy {
                    enc,
                    offset: 0,
                    delta: 10,
                },
                BitfieldOp::Get { enc, offset: 0 },
            ],
        )
        .await
        .unwrap();
    // u8 wraps: 255 + 10 == 9
    assert_eq!(replies, vec![Some(0), Some(9), Some(9)]);
    let signed = BitfieldEncoding {
        signed: true,
        bits: 8,
    };
    let replies = engine
        .bitfield(
            b"bf2",
            &[
                BitfieldOp::Set {
                    enc: signed,
                    offset: 0,
                    value: 127,
                },
                BitfieldOp::IncrBy {
                    enc: signed,
                    offset: 0,
                    delta: 1,
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(replies, vec![Some(0), Some(-128)]);
}

#[tokio::test]
async fn hll_union_counts() {
    let engine = MemoryEngine::new();
    assert!(engine
        .pf_add(b"p1", vec![b"a".to_vec(), b"b".to_vec()])
        .await
        .unwrap());
    assert!(!engine.pf_add(b"p1", vec![b"a".to_vec()]).await.unwrap());
    engine
        .pf_add(b"p2", vec![b"b".to_vec(), b"c".to_vec()])
        .await
        .unwrap();
    assert_eq!(engine.pf_count(&[b"p1"]).await.unwrap(), 2);
    assert_eq!(engine.pf_count(&[b"p1", b"p2"]).await.unwrap(), 3);
    engine.pf_merge(b"dst", &[b"p1", b"p2"]).await.unwrap();
    assert_eq!(engine.pf_count(&[b"dst"]).await.unwrap(), 3);
}

#[tokio::test]
async fn transaction_commit_publishes_and_is_idempotent() {
    let engine = MemoryEngine::new();
    engine.set(b"seen", b"old".to_vec(), None, false).await.unwrap();
    let txn = engine.begin().await.unwrap();
    txn.set(b"seen", b"new".to_vec(), None, false).await.unwrap();
    txn.set(b"fresh", b"1".to_vec(), None, false).await.unwrap();
    // the snapshot is isolated until commit
    assert_eq!(engine.get(b"seen").await.unwrap(), Some(b"old".to_vec()));
    assert_eq!(engine.get(b"fresh").await.unwrap(), None);
    txn.commit().await.unwrap();
    assert_eq!(engine.get(b"seen").await.unwrap(), Some(b"new".to_vec()));
    assert_eq!(engine.get(b"fresh").await.unwrap(), Some(b"1".to_vec()));
    // second commit after success is a no-op
    txn.commit().await.unwrap();
}

#[tokio::test]
async fn transaction_rollback_discards() {
    let engine = MemoryEngine::new();
    let txn = engine.begin().await.unwrap();
    txn.set(b"ghost", b"1".to_vec(), None, false).await.unwrap();
    txn.rollback().await.unwrap();
    assert_eq!(engine.get(b"ghost").await.unwrap(), None);
    assert!(txn.commit().await.is_err());
}

#[tokio::test]
async fn keys_globbing_and_dbsize() {
    let engine = MemoryEngine::new();
    for key in ["user:1", "user:2", "other"] {
        engine
            .set(key.as_bytes(), b"v".to_vec(), None, false)
            .await
            .unwrap();
    }
    assert_eq!(engine.keys(b"user:*").await.unwrap().len(), 2);
    assert_eq!(engine.keys(b"*").await.unwrap().len(), 3);
    assert_eq!(engine.db_size().await.unwrap(), 3);
    engine.flush_db().await.unwrap();
    assert_eq!(engine.db_size().await.unwrap(), 0);
}

#[tokio::test]
async fn rename_and_copy() {
    let engine = MemoryEngine::new();
    assert_eq!(
        engine.rename(b"nosuch", b"dst").await.unwrap_err().kind,
        StorageErrorKind::KeyNotFound
    );
    engine.set(b"a", b"v".to_vec(), None, false).await.unwrap();
    engine.rename(b"a", b"b").await.unwrap();
    assert_eq!(engine.get(b"a").await.unwrap(), None);
    assert_eq!(engine.get(b"b").await.unwrap(), Some(b"v".to_vec()));
    assert!(engine.copy(b"b", b"c", false).await.unwrap());
    assert!(!engine.copy(b"b", b"c", false).await.unwrap());
    assert!(engine.copy(b"b", b"c", true).await.unwrap());
}

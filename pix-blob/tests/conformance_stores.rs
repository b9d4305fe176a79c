use bytes::Bytes;
use futures_util::StreamExt;
use tokio_test::{assert_err, assert_ok};

use pix_blob::{BlobError, ChunkStore, FsChunkStore, MemoryChunkStore, ObjectId};

const CHUNK: usize = 8;

/// Test factory functions
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

async fn write_in_pieces(store: &dyn ChunkStore, data: &[u8], piece: usize) -> ObjectId {
    let mut handle = store.begin_write().await.unwrap();
    for part in data.chunks(piece.max(1)) {
        store
            .write_chunk(&mut handle, Bytes::copy_from_slice(part))
            .await
            .unwrap();
    }
    store.commit_write(handle).await.unwrap()
}

async fn read_chunks(store: &dyn ChunkStore, id: &ObjectId) -> Vec<Bytes> {
    let mut stream = store.open_read(id).await.unwrap();
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk.unwrap());
    }
    chunks
}

async fn read_all(store: &dyn ChunkStore, id: &ObjectId) -> Vec<u8> {
    read_chunks(store, id).await.concat()
}

/// Round trip across chunk boundaries
async fn round_trip_preserves_bytes(store: &dyn ChunkStore) {
    for len in [1, CHUNK - 1, CHUNK, CHUNK + 1, 3 * CHUNK + 2, 100] {
        for piece in [1, 3, CHUNK, 64] {
            let data = pattern(len);
            let id = write_in_pieces(store, &data, piece).await;
            assert_eq!(read_all(store, &id).await, data, "len {} piece {}", len, piece);
        }
    }
}

/// Stored chunks have the fixed size, only the last may be short
async fn chunks_are_resegmented(store: &dyn ChunkStore) {
    let id = write_in_pieces(store, &pattern(3 * CHUNK + 2), 5).await;
    let sizes: Vec<usize> = read_chunks(store, &id).await.iter().map(Bytes::len).collect();
    assert_eq!(sizes, vec![CHUNK, CHUNK, CHUNK, 2]);
}

/// Empty objects are rejected and the reservation is released
async fn zero_byte_commit_is_incomplete(store: &dyn ChunkStore) {
    let mut handle = store.begin_write().await.unwrap();
    let id = handle.object_id().clone();
    store.write_chunk(&mut handle, Bytes::new()).await.unwrap();

    let err = assert_err!(store.commit_write(handle).await);
    assert!(matches!(err, BlobError::WriteIncomplete { .. }));
    assert!(matches!(
        store.open_read(&id).await,
        Err(BlobError::ObjectNotFound { .. })
    ));
    assert!(store.list_objects().await.unwrap().is_empty());
}

/// Aborted writes leave nothing behind
async fn abort_leaves_nothing(store: &dyn ChunkStore) {
    let mut handle = store.begin_write().await.unwrap();
    let id = handle.object_id().clone();
    for _ in 0..3 {
        store
            .write_chunk(&mut handle, Bytes::from(pattern(CHUNK)))
            .await
            .unwrap();
    }
    assert_ok!(store.abort_write(handle).await);

    assert!(matches!(
        store.open_read(&id).await,
        Err(BlobError::ObjectNotFound { .. })
    ));
    assert!(store.list_objects().await.unwrap().is_empty());
}

/// Writes in progress are invisible to readers
async fn pending_write_is_invisible(store: &dyn ChunkStore) {
    let mut handle = store.begin_write().await.unwrap();
    let id = handle.object_id().clone();
    store
        .write_chunk(&mut handle, Bytes::from(pattern(2 * CHUNK)))
        .await
        .unwrap();

    assert!(matches!(
        store.open_read(&id).await,
        Err(BlobError::ObjectNotFound { .. })
    ));
    assert!(store.list_objects().await.unwrap().is_empty());

    let committed = store.commit_write(handle).await.unwrap();
    assert_eq!(committed, id);
    assert_eq!(read_all(store, &id).await, pattern(2 * CHUNK));
}

/// Delete is complete and idempotent
async fn delete_is_idempotent(store: &dyn ChunkStore) {
    let id = write_in_pieces(store, &pattern(20), 7).await;

    assert_ok!(store.delete(&id).await);
    assert!(matches!(
        store.open_read(&id).await,
        Err(BlobError::ObjectNotFound { .. })
    ));
    assert_ok!(store.delete(&id).await);
    assert_ok!(store.delete(&ObjectId::from_string("obj_unknown".to_string())).await);
}

/// Every reservation gets its own id
async fn reserved_ids_are_unique(store: &dyn ChunkStore) {
    let handles = futures_util::future::join_all((0..32).map(|_| store.begin_write())).await;
    let mut ids: Vec<ObjectId> = handles
        .iter()
        .map(|h| h.as_ref().unwrap().object_id().clone())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 32);

    for handle in handles {
        store.abort_write(handle.unwrap()).await.unwrap();
    }
}

/// Interleaved writes to different objects never mix
async fn interleaved_writes_stay_separate(store: &dyn ChunkStore) {
    let mut a = store.begin_write().await.unwrap();
    let mut b = store.begin_write().await.unwrap();
    for i in 0..5u8 {
        store.write_chunk(&mut a, Bytes::from(vec![b'a'; 3 + i as usize])).await.unwrap();
        store.write_chunk(&mut b, Bytes::from(vec![b'b'; 5])).await.unwrap();
    }
    let a = store.commit_write(a).await.unwrap();
    let b = store.commit_write(b).await.unwrap();

    assert_ne!(a, b);
    assert_eq!(read_all(store, &a).await, vec![b'a'; 25]);
    assert_eq!(read_all(store, &b).await, vec![b'b'; 25]);

    let listed: Vec<ObjectId> = store
        .list_objects()
        .await
        .unwrap()
        .into_iter()
        .map(|info| info.id)
        .collect();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&a) && listed.contains(&b));
}

/// Reads can be reopened from the start
async fn reads_restart_from_the_beginning(store: &dyn ChunkStore) {
    let data = pattern(2 * CHUNK + 1);
    let id = write_in_pieces(store, &data, 4).await;

    let mut first = store.open_read(&id).await.unwrap();
    let head = first.next().await.unwrap().unwrap();
    assert_eq!(&head[..], &data[..CHUNK]);
    drop(first);

    assert_eq!(read_all(store, &id).await, data);
}

/// Object summaries report size and chunk count
async fn list_reports_object_info(store: &dyn ChunkStore) {
    let id = write_in_pieces(store, &pattern(2 * CHUNK + 3), 2 * CHUNK + 3).await;
    let infos = store.list_objects().await.unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].id, id);
    assert_eq!(infos[0].size_bytes, (2 * CHUNK + 3) as u64);
    assert_eq!(infos[0].chunk_count, 3);
}

macro_rules! conformance {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $name() {
                    let store = pix_blob::MemoryChunkStore::with_chunk_size(super::CHUNK);
                    super::$name(&store).await;
                }
            )*
        }

        mod fs {
            $(
                #[tokio::test]
                async fn $name() {
                    let dir = tempfile::tempdir().unwrap();
                    let store = pix_blob::FsChunkStore::open(dir.path())
                        .await
                        .unwrap()
                        .with_chunk_size(super::CHUNK);
                    super::$name(&store).await;
                }
            )*
        }
    };
}

conformance!(
    round_trip_preserves_bytes,
    chunks_are_resegmented,
    zero_byte_commit_is_incomplete,
    abort_leaves_nothing,
    pending_write_is_invisible,
    delete_is_idempotent,
    reserved_ids_are_unique,
    interleaved_writes_stay_separate,
    reads_restart_from_the_beginning,
    list_reports_object_info,
);

/// 12 MiB written as three 4 MiB pieces into a 1 MiB chunk store
async fn twelve_megabytes_in_one_megabyte_chunks(store: &dyn ChunkStore) {
    const MIB: usize = 1024 * 1024;
    let data = pattern(12 * MIB);

    let mut handle = store.begin_write().await.unwrap();
    for piece in data.chunks(4 * MIB) {
        store
            .write_chunk(&mut handle, Bytes::copy_from_slice(piece))
            .await
            .unwrap();
    }
    assert_eq!(handle.bytes_written(), (12 * MIB) as u64);
    let id = store.commit_write(handle).await.unwrap();

    let chunks = read_chunks(store, &id).await;
    assert_eq!(chunks.len(), 12);
    assert!(chunks.iter().all(|c| c.len() == MIB));
    assert!(chunks.concat() == data);
}

#[tokio::test]
async fn memory_twelve_megabytes_in_one_megabyte_chunks() {
    let store = MemoryChunkStore::with_chunk_size(1024 * 1024);
    twelve_megabytes_in_one_megabyte_chunks(&store).await;
}

#[tokio::test]
async fn fs_twelve_megabytes_in_one_megabyte_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsChunkStore::open(dir.path())
        .await
        .unwrap()
        .with_chunk_size(1024 * 1024);
    twelve_megabytes_in_one_megabyte_chunks(&store).await;
}

#[tokio::test]
async fn fs_store_survives_reopen_and_discards_interrupted_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsChunkStore::open(dir.path()).await.unwrap().with_chunk_size(CHUNK);

    let committed = write_in_pieces(&store, &pattern(30), 7).await;
    let mut interrupted = store.begin_write().await.unwrap();
    store
        .write_chunk(&mut interrupted, Bytes::from(pattern(3 * CHUNK)))
        .await
        .unwrap();
    let interrupted_dir = dir.path().join("pending").join(interrupted.object_id().as_str());
    assert!(interrupted_dir.exists());
    drop(store);

    let reopened = FsChunkStore::open(dir.path()).await.unwrap().with_chunk_size(CHUNK);
    assert!(!interrupted_dir.exists());
    assert_eq!(read_all(&reopened, &committed).await, pattern(30));
    assert_eq!(reopened.list_objects().await.unwrap().len(), 1);
}

#[tokio::test]
async fn fs_store_reports_corrupted_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsChunkStore::open(dir.path()).await.unwrap().with_chunk_size(CHUNK);
    let id = write_in_pieces(&store, &pattern(2 * CHUNK), CHUNK).await;

    let second = dir
        .path()
        .join("objects")
        .join(id.as_str())
        .join("00000001.chunk");
    let mut raw = std::fs::read(&second).unwrap();
    raw.truncate(raw.len() - 1);
    std::fs::write(&second, raw).unwrap();

    let mut stream = store.open_read(&id).await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn fs_store_rejects_path_like_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsChunkStore::open(dir.path()).await.unwrap();
    let sneaky = ObjectId::from_string("../objects".to_string());

    assert!(matches!(
        store.open_read(&sneaky).await,
        Err(BlobError::ObjectNotFound { .. })
    ));
    assert_ok!(store.delete(&sneaky).await);
    assert!(dir.path().join("objects").exists());
}

#[tokio::test]
async fn fs_failed_commit_releases_the_pending_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsChunkStore::open(dir.path()).await.unwrap().with_chunk_size(CHUNK);

    let mut handle = store.begin_write().await.unwrap();
    let id = handle.object_id().clone();
    store
        .write_chunk(&mut handle, Bytes::from(pattern(CHUNK + 3)))
        .await
        .unwrap();

    // A non-empty directory in the way makes the final rename fail
    let blocker = dir.path().join("objects").join(id.as_str());
    std::fs::create_dir_all(&blocker).unwrap();
    std::fs::write(blocker.join("occupied"), b"x").unwrap();

    assert_err!(store.commit_write(handle).await);
    assert!(!dir.path().join("pending").join(id.as_str()).exists());
}

//! Record framing and range streaming.

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use tempfile::TempDir;

    use crate::engine::tests::helpers::open;
    use crate::service::chunks::{range_body, record_frame};

    #[test]
    fn frame_is_key_newline_value() {
        assert_eq!(record_frame(b"key", b"value").as_ref(), b"key\nvalue");
        assert_eq!(record_frame(b"k", b"").as_ref(), b"k\n");
        // No escaping: consumers split on the first newline only.
        assert_eq!(record_frame(b"k", b"a\nb").as_ref(), b"k\na\nb");
    }

    #[tokio::test]
    async fn range_streams_records_up_to_exclusive_end() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());
        for key in [b"a", b"b", b"c", b"d"] {
            engine.upsert(key.to_vec(), b"v".to_vec()).unwrap();
        }

        let body = range_body(engine.clone(), b"a".to_vec(), Some(b"c".to_vec()));
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        // Records for "a" and "b"; "c" is the exclusive end, "d" beyond.
        assert_eq!(bytes.as_ref(), b"a\nvb\nv");
    }

    #[tokio::test]
    async fn unbounded_range_streams_to_the_last_key() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());
        for key in [b"a", b"b", b"c"] {
            engine.upsert(key.to_vec(), b"1".to_vec()).unwrap();
        }

        let body = range_body(engine.clone(), b"b".to_vec(), None);
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"b\n1c\n1");
    }

    #[tokio::test]
    async fn removed_keys_are_omitted_from_the_stream() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());
        engine.upsert(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.upsert(b"b".to_vec(), b"2".to_vec()).unwrap();
        engine.remove(b"a".to_vec()).unwrap();

        let body = range_body(engine.clone(), b"a".to_vec(), None);
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"b\n2");
    }

    #[tokio::test]
    async fn empty_range_is_an_empty_stream() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());
        let body = range_body(engine.clone(), b"x".to_vec(), None);
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }
}

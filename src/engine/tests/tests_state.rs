//! Replica-visible key state: present / removed / absent, with timestamps.

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::engine::tests::helpers::*;
    use crate::engine::KeyState;

    #[test]
    fn absent_key() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());
        assert_eq!(engine.state(b"ghost").unwrap(), KeyState::Absent);
    }

    #[test]
    fn present_carries_value_and_timestamp() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());
        engine.upsert(b"k".to_vec(), b"v".to_vec()).unwrap();

        match engine.state(b"k").unwrap() {
            KeyState::Present { timestamp, value } => {
                assert_eq!(value, b"v".to_vec());
                assert!(timestamp > 0);
            }
            other => panic!("expected Present, got {other:?}"),
        }
    }

    #[test]
    fn removed_reports_the_tombstone_timestamp() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());
        engine.upsert(b"k".to_vec(), b"v".to_vec()).unwrap();
        let written = match engine.state(b"k").unwrap() {
            KeyState::Present { timestamp, .. } => timestamp,
            other => panic!("expected Present, got {other:?}"),
        };

        engine.remove(b"k".to_vec()).unwrap();
        match engine.state(b"k").unwrap() {
            KeyState::Removed { timestamp } => assert!(timestamp > written),
            other => panic!("expected Removed, got {other:?}"),
        }
    }

    #[test]
    fn removed_state_survives_flush() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());
        engine.upsert(b"k".to_vec(), b"v".to_vec()).unwrap();
        engine.remove(b"k".to_vec()).unwrap();
        flush_and_wait(&engine);

        assert!(matches!(
            engine.state(b"k").unwrap(),
            KeyState::Removed { .. }
        ));
    }

    #[test]
    fn state_resolves_across_layers_by_timestamp() {
        let tmp = TempDir::new().unwrap();
        let engine = open(tmp.path());

        engine.upsert(b"k".to_vec(), b"old".to_vec()).unwrap();
        flush_and_wait(&engine);
        engine.upsert(b"k".to_vec(), b"new".to_vec()).unwrap();

        match engine.state(b"k").unwrap() {
            KeyState::Present { value, .. } => assert_eq!(value, b"new".to_vec()),
            other => panic!("expected Present, got {other:?}"),
        }
    }
}

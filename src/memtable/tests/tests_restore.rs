#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::iterator::{IteratorType, RecordIterator, Restore};
    use crate::memtable::tests::helpers::*;

    fn assert_restored(restore: &Restore, key: u64, version: u64) {
        assert_yield(restore.record().cloned(), key, version);
    }

    #[test]
    fn restore_after_insert_ahead_of_cursor() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 3, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        let first = cursor.next_key().unwrap().unwrap();
        assert_eq!(first.version(), 5);

        // A visible record lands between the cursor and the rest of the
        // scan while the reader is away.
        put(&mem, &format, 2, 7);

        // The cursor itself needs no re-anchor: the new key comes later
        // in iteration order and the normal advance picks it up.
        let restore = cursor.restore(Some(&first)).unwrap();
        assert!(!restore.moved());
        assert_restored(&restore, 1, 5);

        assert_yield(cursor.next_key().unwrap(), 2, 7);
        assert_yield(cursor.next_key().unwrap(), 3, 5);
        assert!(cursor.next_key().unwrap().is_none());
    }

    #[test]
    fn restore_on_stable_memtable_is_idempotent() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 2, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        let first = cursor.next_key().unwrap().unwrap();

        let one = cursor.restore(Some(&first)).unwrap();
        assert!(!one.moved());
        assert_restored(&one, 1, 5);

        let two = cursor.restore(Some(&first)).unwrap();
        assert!(!two.moved());
        assert_restored(&two, 1, 5);

        // The scan continues undisturbed.
        assert_yield(cursor.next_key().unwrap(), 2, 5);
    }

    #[test]
    fn restore_unstarted_without_hint_starts_the_search() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 2, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));

        let restore = cursor.restore(None).unwrap();
        assert!(!restore.moved());
        assert_restored(&restore, 1, 5);

        assert_yield(cursor.next_key().unwrap(), 2, 5);
    }

    #[test]
    fn restore_unstarted_skips_versions_the_caller_already_saw() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 10);
        let seen = put(&mem, &format, 1, 7);
        put(&mem, &format, 1, 3);
        put(&mem, &format, 2, 5);

        // A fresh cursor told "the last record I consumed was (1, 7)"
        // must resume at the strictly older (1, 3).
        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        let restore = cursor.restore(Some(&seen)).unwrap();

        assert!(restore.moved());
        assert_restored(&restore, 1, 3);

        assert_yield(cursor.next_key().unwrap(), 2, 5);
    }

    #[test]
    fn restore_unstarted_moves_to_next_key_when_no_older_version_remains() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        let seen = put(&mem, &format, 1, 10);
        put(&mem, &format, 2, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        let restore = cursor.restore(Some(&seen)).unwrap();

        assert!(restore.moved());
        assert_restored(&restore, 2, 5);
    }

    #[test]
    fn restore_unstarted_lands_on_hint_with_older_version_unmoved() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 10);
        put(&mem, &format, 2, 5);

        // The hint names a version newer than anything stored for the
        // key; the landing record is older, so the caller has not seen
        // it and the position counts as unchanged.
        let hint = rec(&format, 1, 12);
        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        let restore = cursor.restore(Some(&hint)).unwrap();

        assert!(!restore.moved());
        assert_restored(&restore, 1, 10);
    }

    #[test]
    fn restore_unstarted_eq_hint_out_of_range() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 2, 5);
        put(&mem, &format, 3, 5);

        // Re-entry from the hint lands outside the equality range: the
        // historical contract reports "moved" with no record.
        let hint = rec(&format, 1, 7);
        let mut cursor = open(&mem, IteratorType::Eq, search_key(&format, 1), view(10));
        let restore = cursor.restore(Some(&hint)).unwrap();

        assert!(restore.moved());
        assert!(restore.record().is_none());
    }

    #[test]
    fn restore_without_hint_rescans_from_the_opened_key() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 2, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        assert_yield(cursor.next_key().unwrap(), 1, 5);

        // A smaller key arrives; with no hint the cursor resets and the
        // scan starts over at the new head.
        put(&mem, &format, 0, 6);
        let restore = cursor.restore(None).unwrap();

        assert!(restore.moved());
        assert_restored(&restore, 0, 6);

        assert_yield(cursor.next_key().unwrap(), 1, 5);
        assert_yield(cursor.next_key().unwrap(), 2, 5);
    }

    #[test]
    fn restore_after_end_of_stream_revives_the_cursor() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        assert_yield(cursor.next_key().unwrap(), 1, 5);
        assert!(cursor.next_key().unwrap().is_none());

        put(&mem, &format, 2, 6);

        // With no current record the restore rescans from scratch.
        let restore = cursor.restore(None).unwrap();
        assert!(restore.moved());
        assert_restored(&restore, 1, 5);
    }

    #[test]
    fn restore_forward_adopts_inserts_between_hint_and_cursor() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 4, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        assert_yield(cursor.next_key().unwrap(), 1, 5);
        assert_yield(cursor.next_key().unwrap(), 4, 5);

        // The surrounding merge consumed (2, 6) from another source, so
        // the hint trails the cursor; a record landing between hint and
        // cursor must be adopted as the new position.
        let hint = rec(&format, 2, 6);
        put(&mem, &format, 3, 7);

        let restore = cursor.restore(Some(&hint)).unwrap();
        assert!(restore.moved());
        assert_restored(&restore, 3, 7);

        assert_yield(cursor.next_key().unwrap(), 4, 5);
        assert!(cursor.next_key().unwrap().is_none());
    }

    #[test]
    fn restore_forward_ignores_inserts_above_the_view() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 4, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        assert_yield(cursor.next_key().unwrap(), 1, 5);
        assert_yield(cursor.next_key().unwrap(), 4, 5);

        let hint = rec(&format, 2, 6);
        put(&mem, &format, 3, 20);

        let restore = cursor.restore(Some(&hint)).unwrap();
        assert!(!restore.moved());
        assert_restored(&restore, 4, 5);
    }

    #[test]
    fn restore_forward_never_returns_behind_the_hint() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 4, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        let first = cursor.next_key().unwrap().unwrap();
        assert_yield(Some(Arc::clone(&first)), 1, 5);
        assert_yield(cursor.next_key().unwrap(), 4, 5);

        // Records at or before the consumed position stay consumed.
        put(&mem, &format, 0, 7);

        let restore = cursor.restore(Some(&first)).unwrap();
        assert!(!restore.moved());
        assert_restored(&restore, 4, 5);
    }

    #[test]
    fn restore_backward_refuses_newer_version_of_consumed_key() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 2, 3);

        let mut cursor = open(&mem, IteratorType::Le, empty_key(&format), view(10));
        let seen = cursor.next_key().unwrap().unwrap();
        assert_yield(Some(Arc::clone(&seen)), 2, 3);

        // A newer version of the already-yielded key must not surface:
        // the reader would observe the same key twice.
        put(&mem, &format, 2, 7);

        let restore = cursor.restore(Some(&seen)).unwrap();
        assert!(!restore.moved());
        assert_restored(&restore, 2, 3);

        assert_yield(cursor.next_key().unwrap(), 1, 5);
    }

    #[test]
    fn restore_backward_promotes_to_newest_visible_when_hint_trails() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 3, 5);

        let mut cursor = open(&mem, IteratorType::Le, empty_key(&format), view(10));
        assert_yield(cursor.next_key().unwrap(), 3, 5);

        // The merge's last consumed record came from another source and
        // trails on a different key; a newer visible version of the
        // current key is then fair game.
        let hint = rec(&format, 2, 9);
        put(&mem, &format, 3, 7);

        let restore = cursor.restore(Some(&hint)).unwrap();
        assert!(restore.moved());
        assert_restored(&restore, 3, 7);
    }

    #[test]
    fn restore_reanchors_after_block_splits() {
        init_tracing();

        let (format, mem) = unsigned_memtable();

        // Enough records to span several blocks.
        for key in 0..80u64 {
            put(&mem, &format, key, key + 1);
        }

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(5000));
        for key in 0..10u64 {
            assert_yield(cursor.next_key().unwrap(), key, key + 1);
        }

        // A newer version for every key shifts and splits the blocks
        // under the cursor.
        for key in 0..80u64 {
            put(&mem, &format, key, 1000 + key);
        }

        // The drift check re-anchors exactly; the scan continues with the
        // next key's newest visible version.
        for key in 10..80u64 {
            assert_yield(cursor.next_key().unwrap(), key, 1000 + key);
        }
        assert!(cursor.next_key().unwrap().is_none());
    }

    #[test]
    fn restore_hint_reported_by_a_moved_cursor_is_copied_out() {
        init_tracing();

        let (format, mem) = unsigned_memtable();
        put(&mem, &format, 1, 5);
        put(&mem, &format, 4, 5);

        let mut cursor = open(&mem, IteratorType::Ge, empty_key(&format), view(10));
        assert_yield(cursor.next_key().unwrap(), 1, 5);
        assert_yield(cursor.next_key().unwrap(), 4, 5);

        let hint = rec(&format, 2, 6);
        put(&mem, &format, 3, 7);

        let restore = cursor.restore(Some(&hint)).unwrap();

        // The returned handle is an owned copy that outlives any further
        // memtable activity.
        let adopted = restore.record().cloned().unwrap();
        put(&mem, &format, 3, 9);
        assert_eq!(adopted.version(), 7);
    }
}

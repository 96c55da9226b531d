#[cfg(test)]
mod tests {
    use crate::region::{Region, RegionError};

    #[test]
    fn alloc_accumulates_used() {
        let region = Region::new();

        region.alloc(1024, 1).unwrap();
        region.alloc(2048, 1).unwrap();
        region.alloc(512, 2).unwrap();

        assert_eq!(region.used(), 3584);
    }

    #[test]
    fn quota_exhaustion_is_typed_and_leaves_state_unchanged() {
        let region = Region::with_quota(4096);

        region.alloc(4096, 1).unwrap();
        let err = region.alloc(1, 1).unwrap_err();

        assert!(matches!(
            err,
            RegionError::OutOfMemory {
                requested: 1,
                used: 4096,
                quota: 4096,
            }
        ));
        assert_eq!(region.used(), 4096);
    }

    #[test]
    fn release_retires_tags_at_or_below() {
        let region = Region::new();

        region.alloc(100, 1).unwrap();
        region.alloc(200, 2).unwrap();
        region.alloc(400, 3).unwrap();

        let released = region.release(2);
        assert_eq!(released, 300);
        assert_eq!(region.used(), 400);

        // Retiring the same range again is a no-op.
        assert_eq!(region.release(2), 0);
        assert_eq!(region.used(), 400);
    }

    #[test]
    fn release_frees_quota_for_new_grants() {
        let region = Region::with_quota(1000);

        region.alloc(1000, 1).unwrap();
        assert!(region.alloc(1, 2).is_err());

        region.release(1);
        region.alloc(600, 2).unwrap();
        assert_eq!(region.used(), 600);
    }

    #[test]
    fn release_of_max_tag_clears_everything() {
        let region = Region::new();

        region.alloc(100, 5).unwrap();
        region.alloc(100, u64::MAX).unwrap();

        assert_eq!(region.release(u64::MAX), 200);
        assert_eq!(region.used(), 0);
    }
}

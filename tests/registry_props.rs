use proptest::prelude::*;
use unit_harness::Registry;

fn name() -> impl Strategy<Value = String> {
    "[a-z_]{1,12}"
}

proptest! {
    #[test]
    fn retracking_never_duplicates(names in prop::collection::vec(name(), 1..20)) {
        let registry = Registry::default();
        for n in &names {
            registry.track_mock(n).unwrap();
        }
        for n in &names {
            registry.track_mock(n).unwrap();
        }
        let mut distinct = names.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(registry.mock_len(), distinct.len());
    }

    #[test]
    fn retracking_resets_count(hits in 1u32..50) {
        let registry = Registry::default();
        registry.track_stub("mark").unwrap();
        for _ in 0..hits {
            registry.stub_entered("mark");
        }
        prop_assert_eq!(registry.stub_count("mark"), hits);
        registry.track_stub("mark").unwrap();
        prop_assert_eq!(registry.stub_count("mark"), 0);
        prop_assert_eq!(registry.stub_len(), 1);
    }

    #[test]
    fn untracked_names_read_zero(n in name(), hits in 0u32..50) {
        let registry = Registry::default();
        registry.track_mock("fatal_error").unwrap();
        prop_assume!(n != "fatal_error");
        for _ in 0..hits {
            registry.mock_entered(&n);
        }
        prop_assert_eq!(registry.mock_count(&n), 0);
        prop_assert!(registry.snapshot().0.iter().all(|c| c.name != n));
    }

    #[test]
    fn bounded_table_rejects_overflow(capacity in 1usize..8) {
        let registry = Registry::new(Some(capacity), None);
        for i in 0..capacity {
            registry.track_mock(&format!("mock_{}", i)).unwrap();
        }
        prop_assert!(registry.track_mock("one_too_many").is_err());
        // retracking an existing name is not growth
        prop_assert!(registry.track_mock("mock_0").is_ok());
        prop_assert_eq!(registry.mock_len(), capacity);
    }
}

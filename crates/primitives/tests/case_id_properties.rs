//! Property tests for case identifier formatting and parsing

use proptest::prelude::*;
use tally_primitives::{CaseId, DatePrefix};

fn date_prefix() -> impl Strategy<Value = DatePrefix> {
    (0i32..=9999, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| DatePrefix::from_ymd(y, m, d).unwrap())
}

proptest! {
    #[test]
    fn display_parses_back(date in date_prefix(), count in 1u64..=i64::MAX as u64) {
        let id = CaseId::new(date, count).unwrap();
        let text = id.to_string();
        prop_assert_eq!(text.parse::<CaseId>().unwrap(), id);
    }

    #[test]
    fn display_shape(date in date_prefix(), count in 1u64..100_000) {
        let text = CaseId::new(date, count).unwrap().to_string();
        let (prefix, suffix) = text.split_once('-').unwrap();
        prop_assert_eq!(prefix.len(), 8);
        prop_assert_eq!(suffix.len(), count.to_string().len().max(4));
        prop_assert!(suffix.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn order_matches_date_then_count(
        a in date_prefix(), ca in 1u64..20_000,
        b in date_prefix(), cb in 1u64..20_000,
    ) {
        let x = CaseId::new(a, ca).unwrap();
        let y = CaseId::new(b, cb).unwrap();
        prop_assert_eq!(x.cmp(&y), (a, ca).cmp(&(b, cb)));
    }

    #[test]
    fn arbitrary_strings_never_panic(s in "\\PC{0,20}") {
        let _ = s.parse::<CaseId>();
    }
}

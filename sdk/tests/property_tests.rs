use proptest::prelude::*;
use sdk::errors::{EngineError, LltmErrorExt};
use sdk::{AccessList, Privacy};

// User hints are static text: they never repeat the error detail, which may
// contain memory content.
proptest! {
    #[test]
    fn test_error_user_hint_never_echoes_detail(detail in "[A-Z0-9]{12,40}") {
        let errs = vec![
            EngineError::Config(detail.clone()),
            EngineError::StoreInit(detail.clone()),
            EngineError::StoreWrite(detail.clone()),
            EngineError::StoreRead(detail.clone()),
            EngineError::InvalidDocument(detail.clone()),
            EngineError::LLMProvider(detail.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&detail));
            prop_assert!(err.to_string().contains(&detail));
        }
    }
}

// Whitespace and empty entries around commas never change the parsed list
proptest! {
    #[test]
    fn test_access_list_parse_ignores_padding(
        ids in prop::collection::btree_set("[a-z][a-z0-9_]{0,7}", 0..6),
        pad in " {0,3}",
    ) {
        let tight = ids.iter().cloned().collect::<Vec<_>>().join(",");
        let padded = ids
            .iter()
            .map(|id| format!("{0}{1}{0}", pad, id))
            .collect::<Vec<_>>()
            .join(",,");

        let expected: AccessList = ids.iter().cloned().collect();
        prop_assert_eq!(AccessList::parse(&tight), expected.clone());
        prop_assert_eq!(AccessList::parse(&padded), expected.clone());
        prop_assert_eq!(expected.len(), ids.len());
    }

    #[test]
    fn test_access_list_membership_is_exact(id in "[a-z]{2,8}") {
        let list = AccessList::parse(&id);
        prop_assert!(list.contains(&id));
        prop_assert!(!list.contains(&id[1..]));
        let suffixed = format!("{}x", id);
        prop_assert!(!list.contains(&suffixed));
        prop_assert!(!list.contains(&id.to_uppercase()));
    }

    #[test]
    fn test_privacy_parse_is_case_insensitive(
        level in prop::sample::select(vec!["public", "private", "shared"]),
        upper in any::<bool>(),
    ) {
        let input = if upper { level.to_uppercase() } else { level.to_string() };
        let parsed: Privacy = input.parse().unwrap();
        prop_assert_eq!(parsed.as_str(), level);
    }
}

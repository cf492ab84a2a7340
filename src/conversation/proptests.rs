//! Property-based tests for the log and its projection

use super::*;
use crate::display::project;
use crate::tools::{LIST_MENU_ITEMS, SHOW_MENU_ITEM, SHOW_PURCHASE};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn arb_tool_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(LIST_MENU_ITEMS.to_string()),
        Just(SHOW_MENU_ITEM.to_string()),
        Just(SHOW_PURCHASE.to_string()),
        "[a-z_]{1,10}",
    ]
}

fn arb_entry() -> impl Strategy<Value = LogEntry> {
    prop_oneof![
        "[a-zA-Z ]{0,20}".prop_map(|text| LogEntry::user(text)),
        "[a-zA-Z ]{0,20}".prop_map(|text| LogEntry::assistant(text)),
        "[a-zA-Z ]{0,20}".prop_map(|text| LogEntry::system(text)),
        arb_tool_name().prop_map(|name| LogEntry::tool_call("call", name, json!({}))),
        (arb_tool_name(), 0u32..100).prop_map(|(name, n)| {
            LogEntry::tool_result("call", name, json!({"name": "Shroomami", "price": n}))
        }),
    ]
}

fn arb_conversation() -> impl Strategy<Value = Conversation> {
    proptest::collection::vec(arb_entry(), 0..30).prop_map(|entries| Conversation {
        session_id: "prop".to_string(),
        entries,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    // Projection is a pure function of the log
    #[test]
    fn prop_project_is_deterministic(conv in arb_conversation()) {
        prop_assert_eq!(project(&conv), project(&conv));
        let reparsed: Conversation =
            serde_json::from_str(&serde_json::to_string(&conv).unwrap()).unwrap();
        prop_assert_eq!(project(&reparsed), project(&conv));
    }

    // One row per visible entry, tool entries counting their results
    #[test]
    fn prop_project_counts_visible_entries(conv in arb_conversation()) {
        let expected: usize = conv
            .entries
            .iter()
            .map(|entry| match entry.role {
                Role::System => 0,
                Role::Tool => entry
                    .parts()
                    .iter()
                    .filter(|part| matches!(part, ContentPart::ToolResult { .. }))
                    .count(),
                Role::User | Role::Assistant => 1,
            })
            .sum();
        let display = project(&conv);
        prop_assert_eq!(display.len(), expected);

        let mut ids: Vec<_> = display.iter().map(|d| d.id.clone()).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), display.len());
    }

    // Successive updates inside a turn never shrink the log
    #[test]
    fn prop_log_length_monotonic_within_turn(
        batches in proptest::collection::vec(proptest::collection::vec(arb_entry(), 0..4), 1..8),
    ) {
        let log = Arc::new(ConversationLog::new(
            Conversation::new("prop"),
            Arc::new(NoopCommitHook),
        ));
        let turn = log.begin_turn().unwrap();
        let mut last_len = 0;
        for batch in batches {
            turn.append(batch).unwrap();
            let len = log.get().len();
            prop_assert!(len >= last_len);
            last_len = len;

            // Dropping the tail is always refused
            if len > 0 {
                let mut shorter = (*log.get()).clone();
                shorter.entries.pop();
                prop_assert!(turn.update(shorter).is_err());
                prop_assert_eq!(log.get().len(), len);
            }
        }
    }
}

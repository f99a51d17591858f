//! Property-based tests for budget chunking

use proptest::prelude::*;
use summit::budget::{ContextBudget, CHARS_PER_UNIT, CONTINUATION_MARKER, DISCRETE_SEPARATOR};

/// Dropping each later chunk's overlap and concatenating gives the input back
#[test]
fn test_contiguous_chunks_reconstruct_input() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &("[a-z0-9 \n]{0,2000}", 1usize..64, 0usize..64),
            |(text, window, overlap)| {
                let budget = ContextBudget::new(4096);
                let chunks = budget.chunk_contiguous(&text, window, overlap);

                if text.is_empty() {
                    prop_assert!(chunks.is_empty());
                    return Ok(());
                }

                let skip = overlap.min(window - 1) * CHARS_PER_UNIT;
                let mut rebuilt = String::new();
                for (index, chunk) in chunks.iter().enumerate() {
                    let drop = if index == 0 { 0 } else { skip };
                    rebuilt.extend(chunk.chars().skip(drop));
                }
                prop_assert_eq!(rebuilt, text);

                // Only the last chunk may exceed a window, and by less than half of one
                let window_chars = window * CHARS_PER_UNIT;
                for chunk in &chunks[..chunks.len() - 1] {
                    prop_assert_eq!(chunk.chars().count(), window_chars);
                }
                prop_assert!(chunks[chunks.len() - 1].chars().count() < window_chars + window_chars / 2 + 1);

                Ok(())
            },
        )
        .unwrap();
}

/// Items are never split, reordered or dropped, and every group fits
#[test]
fn test_discrete_groups_keep_items_whole() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(prop::collection::vec("[a-z ]{1,120}", 0..60), 1usize..40),
            |(items, threshold)| {
                let budget = ContextBudget::new(4096);
                let groups = budget.group_discrete(&items, threshold);

                let mut flattened = Vec::new();
                for group in &groups {
                    prop_assert!(!group.items.is_empty());
                    if group.truncated {
                        prop_assert_eq!(group.items.len(), 1);
                        let item = &group.items[0];
                        prop_assert!(item.ends_with(CONTINUATION_MARKER));
                        if threshold > budget.size(CONTINUATION_MARKER) {
                            prop_assert!(budget.size(item) <= threshold);
                        }
                        flattened.push(item.trim_end_matches(CONTINUATION_MARKER).to_string());
                    } else {
                        prop_assert!(budget.size(&group.render()) <= threshold);
                        flattened.extend(group.items.iter().cloned());
                    }
                }

                prop_assert_eq!(flattened.len(), items.len());
                for (kept, original) in flattened.iter().zip(&items) {
                    if budget.size(original) > threshold {
                        prop_assert!(original.starts_with(kept.as_str()));
                        prop_assert_eq!(
                            kept.chars().count(),
                            budget.truncation_units(threshold) * CHARS_PER_UNIT
                        );
                    } else {
                        prop_assert_eq!(kept, original);
                    }
                }

                Ok(())
            },
        )
        .unwrap();
}

/// Groups rendered with the separator are exactly the items joined in order
#[test]
fn test_group_render_joins_with_separator() {
    let budget = ContextBudget::new(4096);
    let items = ["alpha", "beta", "gamma"];
    let groups = budget.group_discrete(&items, 100);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].render(), items.join(DISCRETE_SEPARATOR));
}

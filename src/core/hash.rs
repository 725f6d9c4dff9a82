use super::slots::NavigationState;

/// Parses a hash fragment (`#3`, `3`, empty) into a 0-based step.
///
/// Anything that is not a positive integer is treated as "no step".
pub fn parse_step(fragment: Option<&str>) -> Option<usize> {
    let raw = fragment?.trim().trim_start_matches('#').trim();
    match raw.parse::<usize>() {
        Ok(number) if number >= 1 => Some(number - 1),
        _ => None,
    }
}

/// 1-based fragment text for a 0-based step, `None` for the summary.
pub fn format_step(step: Option<usize>) -> Option<String> {
    step.map(|index| (index + 1).to_string())
}

pub fn parse_state(fragment: Option<&str>, max_slots: usize) -> NavigationState {
    NavigationState::from_step(parse_step(fragment), max_slots)
}

/// Step that follows slot `index`, or `None` once the last slot is done.
pub fn next_step(index: usize, max_slots: usize) -> Option<usize> {
    if index + 1 < max_slots {
        Some(index + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_are_one_based() {
        assert_eq!(parse_step(Some("#1")), Some(0));
        assert_eq!(parse_step(Some("3")), Some(2));
        assert_eq!(parse_step(Some("#0")), None);
        assert_eq!(parse_step(Some("#")), None);
        assert_eq!(parse_step(Some("#two")), None);
        assert_eq!(parse_step(None), None);
        assert_eq!(format_step(Some(0)).as_deref(), Some("1"));
        assert_eq!(format_step(None), None);
    }

    #[test]
    fn state_respects_max_slots() {
        assert_eq!(parse_state(Some("#1"), 3), NavigationState::EditingSlot(0));
        assert_eq!(parse_state(Some("#4"), 3), NavigationState::Summary);
        assert_eq!(parse_state(None, 3), NavigationState::Summary);
    }

    #[test]
    fn last_slot_advances_to_summary() {
        assert_eq!(next_step(0, 3), Some(1));
        assert_eq!(next_step(2, 3), None);
    }
}

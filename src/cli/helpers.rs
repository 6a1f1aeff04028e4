//! Shared helper functions for CLI commands.

/// Shorten `s` to at most `max` characters, ending in "..." when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("snake", 10), "snake");
        assert_eq!(truncate("snake-game-deluxe", 10), "snake-g...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }
}

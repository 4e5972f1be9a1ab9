// Identity color for a player, cycled from a palette sized to room capacity
pub fn player_color(player_id: u32) -> String {
    const PALETTE: [&str; 8] = [
        "#4f8fea", "#e2504c", "#53b86a", "#9a5fd0", "#e8923d", "#45c5c9", "#d459a8", "#d4c94f",
    ];
    PALETTE[(player_id as usize - 1) % PALETTE.len()].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_colors_distinct_within_capacity() {
        let colors: Vec<String> = (1..=8).map(player_color).collect();
        for (i, color) in colors.iter().enumerate() {
            for other in colors.iter().skip(i + 1) {
                assert_ne!(color, other);
            }
        }
    }

    #[test]
    fn test_player_color_cycles() {
        assert_eq!(player_color(1), player_color(9));
    }
}

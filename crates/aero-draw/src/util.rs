/// Trimmed value of `name`, or `None` when unset or not unicode.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_owned())
}

/// `1`, `true`, `yes` and `on` (any case) enable a toggle; anything else,
/// including an unset variable, leaves it off.
pub(crate) fn env_var_truthy(name: &str) -> bool {
    env_value(name).is_some_and(|v| {
        ["1", "true", "yes", "on"]
            .iter()
            .any(|t| v.eq_ignore_ascii_case(t))
    })
}

pub(crate) fn env_var_usize(name: &str) -> Option<usize> {
    env_value(name)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_toggles_parse_common_spellings() {
        std::env::set_var("AERO_DRAW_TEST_TRUTHY", " Yes ");
        std::env::set_var("AERO_DRAW_TEST_ON", "ON");
        std::env::set_var("AERO_DRAW_TEST_FALSY", "0");
        std::env::set_var("AERO_DRAW_TEST_COUNT", " 512 ");
        assert!(env_var_truthy("AERO_DRAW_TEST_TRUTHY"));
        assert!(env_var_truthy("AERO_DRAW_TEST_ON"));
        assert!(!env_var_truthy("AERO_DRAW_TEST_FALSY"));
        assert!(!env_var_truthy("AERO_DRAW_TEST_UNSET"));
        assert_eq!(env_var_usize("AERO_DRAW_TEST_COUNT"), Some(512));
        assert_eq!(env_var_usize("AERO_DRAW_TEST_TRUTHY"), None);
    }
}

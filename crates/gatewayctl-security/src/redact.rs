/// Number of leading characters kept when a secret is logged.
const VISIBLE_PREFIX: usize = 4;

/// Shorten a secret to a short prefix suitable for logs.
///
/// Values no longer than the prefix are fully masked.
pub fn redact(value: &str) -> String {
    if value.chars().count() <= VISIBLE_PREFIX {
        return "***".to_string();
    }
    let prefix: String = value.chars().take(VISIBLE_PREFIX).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_prefix() {
        assert_eq!(redact("secret123"), "secr***");
        assert_eq!(redact("abcd"), "***");
        assert_eq!(redact(""), "***");
        assert_eq!(redact("ñandú-key"), "ñand***");
    }
}

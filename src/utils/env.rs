/// Get environment variable with LESSONFORGE_ prefix, falling back to unprefixed version
///
/// Checks `LESSONFORGE_{key}` first, then `{key}`, so platform-provided
/// variables such as `PORT` or `DATABASE_URL` work without renaming.
///
/// # Examples
///
/// ```rust
/// use lessonforge::utils::get_env_with_prefix;
///
/// // Checks LESSONFORGE_STRIPE_PRO_PRICE_ID first, then STRIPE_PRO_PRICE_ID
/// let price = get_env_with_prefix("STRIPE_PRO_PRICE_ID");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("LESSONFORGE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse a comma separated environment value into trimmed, non-empty items.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

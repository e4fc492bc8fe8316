/// Get environment variable with USER_SWITCHER_ prefix, falling back to unprefixed version
///
/// Checks `USER_SWITCHER_{key}` first, then `{key}`, so shared variables such
/// as `APP_ENV` can be overridden for the switcher alone.
///
/// # Examples
///
/// ```rust
/// use user_switcher::utils::get_env_with_prefix;
///
/// // Checks USER_SWITCHER_ENABLED first, then ENABLED
/// let enabled = get_env_with_prefix("ENABLED");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("USER_SWITCHER_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

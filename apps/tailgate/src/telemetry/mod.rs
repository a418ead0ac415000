pub mod logging;

fn env_truthy(var: &str) -> Option<bool> {
    std::env::var(var).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

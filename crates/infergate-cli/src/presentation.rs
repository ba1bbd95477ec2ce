//! Table formatting for CLI output.

use std::fmt::Write;

use infergate_core::ModelConfig;

/// Truncates a string to `max_len` characters, adding "..." if needed.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Render models as a fixed-width table.
pub fn model_table(models: &[ModelConfig]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20} {:<11} {:<32} {:<22} {}",
        "MODEL", "PROVIDER", "UPSTREAM", "CAPABILITIES", "CACHE"
    );
    let _ = writeln!(out, "{}", "-".repeat(96));

    for model in models {
        let capabilities = model
            .capabilities
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let cache = if model.cache_policy.enabled {
            format!("{}s/{}", model.cache_policy.ttl.as_secs(), model.cache_policy.max_size)
        } else {
            "off".to_string()
        };
        let _ = writeln!(
            out,
            "{:<20} {:<11} {:<32} {:<22} {}",
            truncate_string(&model.model_id, 20),
            model.provider_type.as_str(),
            truncate_string(&model.native_model_name, 32),
            truncate_string(&capabilities, 22),
            cache
        );
    }
    out
}

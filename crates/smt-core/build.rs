fn main() {
    // Validate embedded TOML files at compile time.
    validate_settings(
        "src/default_settings.toml",
        include_str!("src/default_settings.toml"),
    );
}

fn validate_settings(path: &str, content: &str) {
    let value = match content.parse::<toml::Value>() {
        Ok(v) => v,
        Err(e) => panic!("{path} contains invalid TOML: {e}"),
    };
    for section in ["search", "chart", "unknown", "nbest"] {
        if value.get(section).and_then(|v| v.as_table()).is_none() {
            panic!("{path} is missing the [{section}] section");
        }
    }
}

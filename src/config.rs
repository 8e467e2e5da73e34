//! Configuration for the harness generator.

use crate::mode::Mode;

/// Configuration for one generation pass.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Mode used when a benchmark declares none.
    pub default_mode: Mode,
    /// Subpackage generated classes are placed in, below the user package.
    pub generated_package_suffix: String,
    /// Padding fields per padded layer of a fixture wrapper.
    pub padding_fields: usize,
    /// Register soft force-inline hints for user benchmark and helper methods.
    pub force_inline_helpers: bool,
    /// Generate only benchmark classes matching this glob.
    pub filter: Option<String>,
    /// Target sample density for sample-time mode, per millisecond of
    /// measurement time.
    pub samples_per_ms: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            default_mode: Mode::Throughput,
            generated_package_suffix: "generated".to_string(),
            padding_fields: 256,
            force_inline_helpers: true,
            filter: None,
            samples_per_ms: 20,
        }
    }
}

impl GeneratorConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from environment variables.
    ///
    /// Supported variables:
    /// - `MICROBENCH_DEFAULT_MODE`: mode for benchmarks without one (default: thrpt)
    /// - `MICROBENCH_GENERATED_SUFFIX`: generated subpackage (default: generated)
    /// - `MICROBENCH_PADDING`: padding fields per layer (default: 256)
    /// - `MICROBENCH_FORCE_INLINE`: register force-inline hints (default: true)
    /// - `MICROBENCH_FILTER`: glob over benchmark class names
    /// - `MICROBENCH_SAMPLES_PER_MS`: sample-time density (default: 20)
    ///
    /// Values that fail to parse are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("MICROBENCH_DEFAULT_MODE") {
            if let Ok(mode) = v.parse::<Mode>() {
                if mode != Mode::All {
                    cfg.default_mode = mode;
                }
            }
        }
        if let Ok(v) = std::env::var("MICROBENCH_GENERATED_SUFFIX") {
            if is_identifier(&v) {
                cfg.generated_package_suffix = v;
            }
        }
        if let Ok(v) = std::env::var("MICROBENCH_PADDING") {
            if let Ok(n) = v.parse() {
                cfg.padding_fields = n;
            }
        }
        if let Ok(v) = std::env::var("MICROBENCH_FORCE_INLINE") {
            cfg.force_inline_helpers = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Ok(v) = std::env::var("MICROBENCH_FILTER") {
            if !v.is_empty() {
                cfg.filter = Some(v);
            }
        }
        if let Ok(v) = std::env::var("MICROBENCH_SAMPLES_PER_MS") {
            if let Ok(n) = v.parse::<u32>() {
                if n > 0 {
                    cfg.samples_per_ms = n;
                }
            }
        }

        cfg
    }

    /// Set the mode used when a benchmark declares none.
    pub fn default_mode(mut self, mode: Mode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Set the generated subpackage name.
    pub fn generated_package_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.generated_package_suffix = suffix.into();
        self
    }

    /// Set the padding field count per padded layer.
    pub fn padding_fields(mut self, n: usize) -> Self {
        self.padding_fields = n;
        self
    }

    pub fn force_inline_helpers(mut self, v: bool) -> Self {
        self.force_inline_helpers = v;
        self
    }

    /// Set filter pattern.
    pub fn filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Clear filter pattern.
    pub fn no_filter(mut self) -> Self {
        self.filter = None;
        self
    }

    pub fn samples_per_ms(mut self, n: u32) -> Self {
        self.samples_per_ms = n.max(1);
        self
    }

    /// Whether a benchmark class passes the configured filter.
    pub fn accepts(&self, class_name: &str) -> bool {
        self.filter
            .as_deref()
            .map_or(true, |pattern| matches_glob(class_name, pattern))
    }
}

/// Case-insensitive glob match with `*` wildcards. Without a wildcard the
/// pattern matches as a substring.
pub fn matches_glob(text: &str, pattern: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();

    if !pattern.contains('*') {
        return text.contains(&pattern);
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut remaining = text.as_str();

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            // anchored at the start
            match remaining.strip_prefix(part) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            // anchored at the end
            return remaining.ends_with(part);
        } else if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }
    true
}

/// ASCII identifier: letter or underscore, then letters, digits, underscores.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_defaults_when_env_not_set() {
        let cfg = GeneratorConfig::default();
        assert_eq!(cfg.default_mode, Mode::Throughput);
        assert_eq!(cfg.generated_package_suffix, "generated");
        assert_eq!(cfg.padding_fields, 256);
        assert!(cfg.force_inline_helpers);
        assert!(cfg.filter.is_none());
    }

    #[test]
    fn should_build_config_with_builder() {
        let cfg = GeneratorConfig::new()
            .default_mode(Mode::AverageTime)
            .padding_fields(16)
            .filter("org.bench.*")
            .samples_per_ms(0);

        assert_eq!(cfg.default_mode, Mode::AverageTime);
        assert_eq!(cfg.padding_fields, 16);
        assert_eq!(cfg.filter.as_deref(), Some("org.bench.*"));
        assert_eq!(cfg.samples_per_ms, 1);
    }

    #[test]
    fn should_match_glob_patterns() {
        assert!(matches_glob("org.bench.MyBench", "org.bench.*"));
        assert!(matches_glob("org.bench.MyBench", "*mybench"));
        assert!(matches_glob("org.bench.MyBench", "org*my*"));
        assert!(matches_glob("org.bench.MyBench", "bench"));
        assert!(!matches_glob("org.bench.MyBench", "*other*"));
        assert!(!matches_glob("org.bench.MyBench", "bench*"));
    }

    #[test]
    fn should_accept_everything_when_no_filter() {
        let cfg = GeneratorConfig::new();
        assert!(cfg.accepts("anything"));
        let cfg = cfg.filter("*.Fast*");
        assert!(cfg.accepts("org.FastBench"));
        assert!(!cfg.accepts("org.SlowBench"));
    }

    #[test]
    fn should_recognize_identifiers() {
        assert!(is_identifier("g"));
        assert!(is_identifier("_pingpong2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}

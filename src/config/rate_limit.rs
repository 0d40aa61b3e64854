use std::env;

/// One quota cell is replenished every `replenish_seconds`; up to `burst_size`
/// requests may be spent at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub replenish_seconds: u64,
    pub burst_size: u32,
}

impl RateLimitRule {
    const fn new(replenish_seconds: u64, burst_size: u32) -> Self {
        Self {
            replenish_seconds,
            burst_size,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth: RateLimitRule,
    pub general: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 5 requests per minute
            auth: RateLimitRule::new(12, 5),
            // 100 requests per 15 minutes
            general: RateLimitRule::new(9, 100),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = super::parse_bool_env("RATE_LIMIT_ENABLED", cfg.enabled);

        if let Ok(raw) = env::var("RATE_LIMIT_CONFIG") {
            match parse_rate_limit_config(&raw) {
                Ok(parsed) => cfg = cfg.apply_partial(parsed),
                Err(err) => {
                    tracing::warn!("Invalid RATE_LIMIT_CONFIG '{}': {}", raw, err);
                }
            }
        }

        cfg
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn apply_partial(mut self, parsed: PartialRateLimitConfig) -> Self {
        if let Some(rule) = parsed.global {
            self.auth = rule;
            self.general = rule;
        }
        if let Some(rule) = parsed.auth {
            self.auth = rule;
        }
        if let Some(rule) = parsed.general {
            self.general = rule;
        }
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PartialRateLimitConfig {
    global: Option<RateLimitRule>,
    auth: Option<RateLimitRule>,
    general: Option<RateLimitRule>,
}

fn parse_rate_limit_config(raw: &str) -> Result<PartialRateLimitConfig, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }

    // "12:5" applies to every group.
    if !trimmed.contains('=') {
        let rule = parse_rule(trimmed)?;
        return Ok(PartialRateLimitConfig {
            global: Some(rule),
            ..Default::default()
        });
    }

    // "auth=12:5,general=9:100"
    let mut parsed = PartialRateLimitConfig::default();
    for item in trimmed.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (name, raw_rule) = item
            .split_once('=')
            .ok_or_else(|| format!("invalid item '{}', expected name=seconds:burst", item))?;
        let rule = parse_rule(raw_rule.trim())?;
        match name.trim().to_ascii_lowercase().as_str() {
            "auth" => parsed.auth = Some(rule),
            "general" | "api" => parsed.general = Some(rule),
            other => {
                return Err(format!("unknown group '{}', expected auth/general", other));
            }
        }
    }

    Ok(parsed)
}

fn parse_rule(raw: &str) -> Result<RateLimitRule, String> {
    let (seconds_raw, burst_raw) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid rule '{}', expected seconds:burst", raw))?;

    let replenish_seconds: u64 = seconds_raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid replenish interval '{}'", seconds_raw.trim()))?;
    let burst_size: u32 = burst_raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid burst_size '{}'", burst_raw.trim()))?;

    if replenish_seconds == 0 {
        return Err("replenish interval must be > 0".to_string());
    }
    if burst_size == 0 {
        return Err("burst_size must be > 0".to_string());
    }

    Ok(RateLimitRule::new(replenish_seconds, burst_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_global_rule() {
        let parsed = parse_rate_limit_config("12:24").unwrap();
        assert_eq!(parsed.global, Some(RateLimitRule::new(12, 24)));
        assert_eq!(parsed.auth, None);
    }

    #[test]
    fn parse_grouped_rules() {
        let parsed = parse_rate_limit_config("auth=1:2, general=3:4").unwrap();
        assert_eq!(parsed.auth, Some(RateLimitRule::new(1, 2)));
        assert_eq!(parsed.general, Some(RateLimitRule::new(3, 4)));
    }

    #[test]
    fn grouped_rule_overrides_global_default() {
        let cfg = RateLimitConfig::default()
            .apply_partial(parse_rate_limit_config("auth=60:1").unwrap());
        assert_eq!(cfg.auth, RateLimitRule::new(60, 1));
        assert_eq!(cfg.general, RateLimitConfig::default().general);
    }

    #[test]
    fn parse_unknown_group() {
        let err = parse_rate_limit_config("admin=1:1").unwrap_err();
        assert!(err.contains("unknown group"));
    }

    #[test]
    fn parse_invalid_rule() {
        let err = parse_rate_limit_config("auth=abc").unwrap_err();
        assert!(err.contains("invalid rule"));
    }

    #[test]
    fn zero_burst_rejected() {
        assert!(parse_rule("5:0").is_err());
    }
}

//! Minimal `--flag value` / `--flag` argument parsing shared across
//! subcommands, in the spirit of `aethercore-node`'s hand-rolled
//! `parse_config_path` loop rather than a declarative parser.

use std::collections::BTreeMap;

pub struct Flags {
    values: BTreeMap<String, String>,
}

impl Flags {
    /// Parse `args` (already stripped of the binary name and subcommand)
    /// into a flag map. A flag followed by a token that itself starts with
    /// `--` (or end of args) is treated as a boolean flag with value `"true"`.
    pub fn parse(args: &[String]) -> Flags {
        let mut values = BTreeMap::new();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            if let Some(name) = arg.strip_prefix("--") {
                let next_is_value = args
                    .get(i + 1)
                    .map(|v| !v.starts_with("--"))
                    .unwrap_or(false);
                if next_is_value {
                    values.insert(name.to_string(), args[i + 1].clone());
                    i += 2;
                    continue;
                }
                values.insert(name.to_string(), "true".to_string());
            }
            i += 1;
        }
        Flags { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    pub fn require(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("missing required --{name} argument"))
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some("true") | Some(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_value_flags() {
        let args: Vec<String> = vec!["--config".into(), "cfg.json".into(), "--policy-must-match".into()];
        let flags = Flags::parse(&args);
        assert_eq!(flags.get("config"), Some("cfg.json"));
        assert!(flags.flag("policy-must-match"));
    }

    #[test]
    fn require_fails_for_missing_flag() {
        let flags = Flags::parse(&[]);
        assert!(flags.require("config").is_err());
    }
}

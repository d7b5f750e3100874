use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_USER_ID: i64 = 1;
const DEFAULT_DUE_WINDOW_DAYS: i64 = 7;
const DEFAULT_UPCOMING_WINDOW_DAYS: i64 = 14;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which dashboard the binary assembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => bail!("unknown role '{other}', expected admin, teacher or student"),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub role: Role,
    /// Stands in for the logged-in student until authentication exists.
    pub student_id: i64,
    pub teacher_id: i64,
    pub due_window_days: i64,
    pub upcoming_window_days: i64,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            role: Role::Student,
            student_id: DEFAULT_USER_ID,
            teacher_id: DEFAULT_USER_ID,
            due_window_days: DEFAULT_DUE_WINDOW_DAYS,
            upcoming_window_days: DEFAULT_UPCOMING_WINDOW_DAYS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unparseable numbers fall back to
    /// their defaults; an unknown role is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|val| val.trim().parse::<i64>().ok());
        let window = |key: &str| number(key).filter(|days| *days >= 0);

        let api_url = lookup("SCHOLARHUB_API_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.api_url);
        let role = match lookup("SCHOLARHUB_ROLE") {
            Some(role) => role.parse().context("Invalid SCHOLARHUB_ROLE")?,
            None => defaults.role,
        };
        let timeout = lookup("SCHOLARHUB_TIMEOUT_SECS")
            .and_then(|val| val.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Ok(Self {
            api_url,
            role,
            student_id: number("SCHOLARHUB_STUDENT_ID").unwrap_or(defaults.student_id),
            teacher_id: number("SCHOLARHUB_TEACHER_ID").unwrap_or(defaults.teacher_id),
            due_window_days: window("SCHOLARHUB_DUE_WINDOW_DAYS").unwrap_or(defaults.due_window_days),
            upcoming_window_days: window("SCHOLARHUB_UPCOMING_WINDOW_DAYS")
                .unwrap_or(defaults.upcoming_window_days),
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
    }

    #[test]
    fn values_are_read_and_bad_numbers_ignored() {
        let config = Config::from_lookup(lookup(&[
            ("SCHOLARHUB_API_URL", "http://school.test/api/"),
            ("SCHOLARHUB_ROLE", "Teacher"),
            ("SCHOLARHUB_STUDENT_ID", "abc"),
            ("SCHOLARHUB_TEACHER_ID", "4"),
            ("SCHOLARHUB_TIMEOUT_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "http://school.test/api");
        assert_eq!(config.role, Role::Teacher);
        assert_eq!(config.student_id, 1);
        assert_eq!(config.teacher_id, 4);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn negative_windows_fall_back_and_large_ones_are_kept() {
        let config = Config::from_lookup(lookup(&[
            ("SCHOLARHUB_DUE_WINDOW_DAYS", "-5"),
            ("SCHOLARHUB_UPCOMING_WINDOW_DAYS", "9223372036854775807"),
        ]))
        .unwrap();
        assert_eq!(config.due_window_days, 7);
        assert_eq!(config.upcoming_window_days, i64::MAX);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = Config::from_lookup(lookup(&[("SCHOLARHUB_ROLE", "parent")])).unwrap_err();
        assert!(format!("{err:#}").contains("unknown role 'parent'"));
    }
}

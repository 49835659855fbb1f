use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::ChatId, errors::Error, store::MAX_TICKET_TEXT_CHARS, Result};

/// Typed configuration for the bot, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub notification_channel_id: ChatId,
    pub database_path: PathBuf,

    // Staff directory
    pub seed_staff_ids: Vec<i64>,
    pub staff_refresh_interval: Duration,
    pub schedule_poll: Duration,

    // Ticket drafts
    pub album_quiet_period: Duration,
    pub ticket_text_min_len: usize,
    pub ticket_text_max_len: usize,
    pub ticket_page_size: u32,

    // Presentation
    pub display_utc_offset_hours: i32,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

/// Bounds applied to ticket body text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextLimits {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            min_len: 5,
            max_len: 500,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let notification_channel_id = env_i64("NOTIFICATION_CHANNEL_ID")
            .map(ChatId)
            .ok_or_else(|| {
                Error::Config(
                    "NOTIFICATION_CHANNEL_ID environment variable is required (numeric)"
                        .to_string(),
                )
            })?;

        let database_path =
            PathBuf::from(env_str("DATABASE_PATH").unwrap_or("data/database.db".to_string()));
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let seed_staff_ids = parse_csv_i64(env_str("STAFF_IDS"));
        let staff_refresh_interval =
            Duration::from_secs(env_u64("STAFF_REFRESH_HOURS").unwrap_or(12).max(1) * 3600);
        let schedule_poll = Duration::from_secs(env_u64("SCHEDULE_POLL_SECS").unwrap_or(60).max(1));

        let album_quiet_period = Duration::from_millis(env_u64("ALBUM_QUIET_MS").unwrap_or(800));
        let defaults = TextLimits::default();
        let ticket_text_min_len = env_usize("TICKET_TEXT_MIN_LEN").unwrap_or(defaults.min_len);
        let ticket_text_max_len = env_usize("TICKET_TEXT_MAX_LEN").unwrap_or(defaults.max_len);
        check_text_limits(ticket_text_min_len, ticket_text_max_len)?;
        let ticket_page_size = env_u32("TICKET_PAGE_SIZE").unwrap_or(5).clamp(1, 20);

        let display_utc_offset_hours = env_i32("DISPLAY_UTC_OFFSET_HOURS")
            .unwrap_or(8)
            .clamp(-12, 14);

        let audit_log_path =
            PathBuf::from(env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/hdb-audit.log".to_string()));
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            bot_token,
            notification_channel_id,
            database_path,
            seed_staff_ids,
            staff_refresh_interval,
            schedule_poll,
            album_quiet_period,
            ticket_text_min_len,
            ticket_text_max_len,
            ticket_page_size,
            display_utc_offset_hours,
            audit_log_path,
            audit_log_json,
        })
    }

    pub fn text_limits(&self) -> TextLimits {
        TextLimits {
            min_len: self.ticket_text_min_len,
            max_len: self.ticket_text_max_len,
        }
    }
}

/// Draft limits must fit inside what the store accepts.
fn check_text_limits(min_len: usize, max_len: usize) -> Result<()> {
    if min_len > max_len {
        return Err(Error::Config(format!(
            "TICKET_TEXT_MIN_LEN ({min_len}) exceeds TICKET_TEXT_MAX_LEN ({max_len})"
        )));
    }
    if max_len > MAX_TICKET_TEXT_CHARS {
        return Err(Error::Config(format!(
            "TICKET_TEXT_MAX_LEN ({max_len}) exceeds the stored limit of {MAX_TICKET_TEXT_CHARS}"
        )));
    }
    Ok(())
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_i32(key: &str) -> Option<i32> {
    env_str(key).and_then(|s| s.trim().parse::<i32>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_ids_skip_garbage() {
        let ids = parse_csv_i64(Some(" 1, 2,,abc, -100500 ".to_string()));
        assert_eq!(ids, vec![1, 2, -100500]);
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn bool_flags() {
        assert!(parse_bool("YES"));
        assert!(parse_bool(" on "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn default_text_limits() {
        let l = TextLimits::default();
        assert_eq!((l.min_len, l.max_len), (5, 500));
    }

    #[test]
    fn text_limits_must_fit_the_store() {
        let l = TextLimits::default();
        assert!(check_text_limits(l.min_len, l.max_len).is_ok());
        assert!(check_text_limits(5, MAX_TICKET_TEXT_CHARS).is_ok());
        assert!(matches!(
            check_text_limits(5, MAX_TICKET_TEXT_CHARS + 1),
            Err(Error::Config(_))
        ));
        assert!(matches!(check_text_limits(10, 9), Err(Error::Config(_))));
    }
}

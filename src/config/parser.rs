//! Configuration file parsing (HOCON format).

use std::fs;
use std::path::Path;

use hocon::HoconLoader;

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Load configuration from a HOCON file.
///
/// Reading and parsing are separate steps so a missing file is reported as such.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    load_config_str(&content)
}

/// Load configuration from a HOCON string.
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    let parse_error = |e: hocon::Error| ConfigError::ParseError {
        message: e.to_string(),
    };
    HoconLoader::new()
        .load_str(content)
        .map_err(parse_error)?
        .resolve()
        .map_err(parse_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
        discord {
          token = "abc.def"
          guild_id = "315278744572919808"
        }
        irc {
          server = "irc.example.net:6697"
          use_tls = true
          listener_name = "DiscordBot"
          webirc_password = "secret"
        }
        channel_mappings {
          "315278744572919809" = "#general"
          "316038111811600387" = "#bottest"
        }
    "##;

    #[test]
    fn test_load_sample() {
        let config = load_config_str(SAMPLE).unwrap();
        assert_eq!(config.discord.token, "abc.def");
        assert_eq!(config.irc.server, "irc.example.net:6697");
        assert!(config.irc.use_tls);
        assert!(config.irc.presence_notices);
        assert!(!config.debug);
        assert_eq!(config.channel_mappings.len(), 2);
        assert_eq!(
            config.channel_mappings.get("316038111811600387").map(String::as_str),
            Some("#bottest")
        );
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = load_config_str("discord { token = \"x\", guild_id = \"1\" }").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config("/nonexistent/dib.conf").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}

//! IRC line parsing and the handful of commands the bridge sends.

/// A parsed server line. IRCv3 message tags are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    pub prefix: Option<String>,
    /// Uppercased command or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
}

impl IrcLine {
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(|c| c == '\r' || c == '\n');

        if rest.starts_with('@') {
            let (_, after) = rest.split_once(' ')?;
            rest = after.trim_start_matches(' ');
        }

        let prefix = match rest.strip_prefix(':') {
            Some(prefixed) => {
                let (prefix, after) = prefixed.split_once(' ')?;
                rest = after.trim_start_matches(' ');
                Some(prefix.to_string())
            }
            None => None,
        };

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        prefix.split(|c| c == '!' || c == '@').next()
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

pub fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

/// Text of a CTCP ACTION (`/me`), if `text` is one.
pub fn ctcp_action(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('\u{1}')?;
    let inner = inner.strip_suffix('\u{1}').unwrap_or(inner);
    inner.strip_prefix("ACTION ")
}

pub fn is_ctcp(text: &str) -> bool {
    text.starts_with('\u{1}')
}

/// Remove mIRC bold/colour/italic/underline/reverse/reset codes.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\u{2}' | '\u{f}' | '\u{11}' | '\u{16}' | '\u{1d}' | '\u{1e}' | '\u{1f}' => {}
            '\u{3}' => {
                // \x03[fg[,bg]] with up to two digits each
                let mut foreground = 0;
                while foreground < 2 && chars.next_if(|c| c.is_ascii_digit()).is_some() {
                    foreground += 1;
                }
                let mut lookahead = chars.clone();
                if foreground > 0
                    && lookahead.next() == Some(',')
                    && lookahead.next().map_or(false, |c| c.is_ascii_digit())
                {
                    chars.next();
                    for _ in 0..2 {
                        if chars.next_if(|c| c.is_ascii_digit()).is_none() {
                            break;
                        }
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out
}

pub fn nick(nick: &str) -> String {
    format!("NICK {}", nick)
}

pub fn user(username: &str, realname: &str) -> String {
    format!("USER {} 0 * :{}", username, realname)
}

pub fn webirc(password: &str, gateway: &str, hostname: &str, ip: &str) -> String {
    format!("WEBIRC {} {} {} {}", password, gateway, hostname, ip)
}

pub fn join(channel: &str) -> String {
    format!("JOIN {}", channel)
}

pub fn pong(token: &str) -> String {
    format!("PONG :{}", token)
}

pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {} :{}", target, text)
}

pub fn notice(target: &str, text: &str) -> String {
    format!("NOTICE {} :{}", target, text)
}

pub fn quit(reason: &str) -> String {
    format!("QUIT :{}", reason)
}

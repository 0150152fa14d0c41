use std::collections::BTreeSet;

use bb8_common::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    UserDenied,
    ChannelDenied,
}

impl Access {
    /// Reply sent back to the chat when the request is refused.
    pub fn denial_message(&self) -> Option<&'static str> {
        match self {
            Self::Granted => None,
            Self::UserDenied => Some("You don't have enough permissions"),
            Self::ChannelDenied => Some("This channel doesn't have enough permissions"),
        }
    }
}

/// Membership checks over the `users`, `channels` and `admins` settings.
/// Empty `users` or `channels` lists do not restrict anything.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy<'a> {
    users: &'a BTreeSet<String>,
    channels: &'a BTreeSet<String>,
    admins: &'a BTreeSet<String>,
}

impl<'a> AccessPolicy<'a> {
    pub fn from_settings(settings: &'a Settings) -> Self {
        Self {
            users: &settings.users,
            channels: &settings.channels,
            admins: &settings.admins,
        }
    }

    pub fn check(&self, user: &str, channel: &str) -> Access {
        if self.admins.contains(user) {
            return Access::Granted;
        }
        if !self.users.is_empty() && !self.users.contains(user) {
            return Access::UserDenied;
        }
        if !self.channels.is_empty() && !self.channels.contains(channel) {
            return Access::ChannelDenied;
        }
        Access::Granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb8_common::Config;

    fn settings(raw: &str) -> Settings {
        Config::parse(raw).expect("config").settings().clone()
    }

    #[test]
    fn open_policy_grants_everyone() {
        let settings = settings("");
        let policy = AccessPolicy::from_settings(&settings);
        assert_eq!(policy.check("anyone", "anywhere"), Access::Granted);
    }

    #[test]
    fn user_list_is_checked_before_channels() {
        let settings = settings(
            "[settings]\nusers = [\"U1\"]\nchannels = [\"C1\"]\nadmins = [\"ADMIN\"]\n",
        );
        let policy = AccessPolicy::from_settings(&settings);
        assert_eq!(policy.check("U1", "C1"), Access::Granted);
        assert_eq!(policy.check("U2", "C2"), Access::UserDenied);
        assert_eq!(policy.check("U1", "C2"), Access::ChannelDenied);
        assert_eq!(policy.check("ADMIN", "C2"), Access::Granted);
        assert_eq!(
            Access::ChannelDenied.denial_message(),
            Some("This channel doesn't have enough permissions")
        );
    }
}
